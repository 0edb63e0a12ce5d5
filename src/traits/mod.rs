//! # Backend Traits
//!
//! The capability interface every storage backend view implements.
//!
//! ## Trait Layers
//!
//! ```text
//! BackendRead + BackendWrite + BackendDir = Backend
//! ```
//!
//! | Trait | Methods |
//! |-------|---------|
//! | [`BackendRead`] | `exists`, `is_dir`, `size`, `read`, `open_read` |
//! | [`BackendWrite`] | `write`, `write_from`, `remove`, `create_dir_all`, `finish` |
//! | [`BackendDir`] | `walk_files` |
//!
//! ## View Lifecycle
//!
//! A backend value is a *view*: opened immediately before one logical
//! operation, used for it, finished, and dropped. Views are never held
//! between public calls. The directory view is a thin wrapper over the host
//! filesystem; the archive view stages changes in memory and rewrites the
//! container in [`BackendWrite::finish`].
//!
//! ## Blanket Implementation
//!
//! ```rust
//! use anystore::{Backend, BackendDir, BackendRead, BackendWrite, StorageError, WriteMode};
//! use std::io::Read;
//!
//! struct Empty;
//!
//! # impl BackendRead for Empty {
//! #     fn exists(&mut self, _: &str) -> Result<bool, StorageError> { Ok(false) }
//! #     fn is_dir(&mut self, _: &str) -> Result<bool, StorageError> { Ok(false) }
//! #     fn size(&mut self, _: &str) -> Result<u64, StorageError> { Ok(0) }
//! #     fn read(&mut self, _: &str) -> Result<Vec<u8>, StorageError> { Ok(vec![]) }
//! #     fn open_read(&mut self, _: &str) -> Result<Box<dyn Read + '_>, StorageError> { Ok(Box::new(std::io::empty())) }
//! # }
//! # impl BackendWrite for Empty {
//! #     fn write(&mut self, _: &str, _: &[u8], _: WriteMode) -> Result<(), StorageError> { Ok(()) }
//! #     fn write_from(&mut self, _: &str, _: &mut dyn Read, _: WriteMode) -> Result<u64, StorageError> { Ok(0) }
//! #     fn remove(&mut self, _: &str) -> Result<(), StorageError> { Ok(()) }
//! #     fn create_dir_all(&mut self, _: &str) -> Result<(), StorageError> { Ok(()) }
//! #     fn finish(&mut self) -> Result<(), StorageError> { Ok(()) }
//! # }
//! # impl BackendDir for Empty {
//! #     fn walk_files(&mut self) -> Result<Vec<String>, StorageError> { Ok(vec![]) }
//! # }
//! // Empty now implements Backend.
//! fn use_backend(_backend: &mut dyn Backend) {}
//! use_backend(&mut Empty);
//! ```

mod backend_dir;
mod backend_read;
mod backend_write;

pub use backend_dir::BackendDir;
pub use backend_read::BackendRead;
pub use backend_write::{BackendWrite, COPY_CHUNK};

/// A complete backend view: read, write and enumerate.
///
/// Automatically implemented for any type implementing the three component
/// traits.
pub trait Backend: BackendRead + BackendWrite + BackendDir {}

impl<T: BackendRead + BackendWrite + BackendDir> Backend for T {}
