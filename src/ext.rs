//! # Extension Traits
//!
//! Convenience methods for backend views.
//!
//! ## Overview
//!
//! [`BackendExt`] provides the composite operations resources are built
//! from. They are default methods with a blanket implementation, so any
//! [`Backend`] gets them for free, including `dyn Backend`.
//!
//! ## Available Methods
//!
//! | Method | Description |
//! |--------|-------------|
//! | [`is_file`](BackendExt::is_file) | Check if a key is a regular file |
//! | [`file_size`](BackendExt::file_size) | Size in bytes, `0` for directories |
//! | [`read_to_string_with`](BackendExt::read_to_string_with) | Read and decode text |
//! | [`write_resolved`](BackendExt::write_resolved) | Create parents, pick the mode, write |
//! | [`write_from_resolved`](BackendExt::write_from_resolved) | Same, from a stream |
//!
//! ## JSON Support (Feature-Gated)
//!
//! With the `serde` feature enabled, [`Resource`](crate::Resource) gains
//! `read_json` and `write_json`.
//!
//! Enable with:
//! ```toml
//! [dependencies]
//! anystore = { version = "0.1", features = ["serde"] }
//! ```

use std::io::Read;

use crate::traits::{Backend, BackendRead, BackendWrite};
use crate::{Charset, StorageError, WriteMode};

/// Extension methods for any backend view.
///
/// Keys are normalized in-root keys, as for the core traits.
///
/// # Example
///
/// ```rust
/// use anystore::{Backend, BackendExt, Charset, StorageError};
///
/// fn load_notes(backend: &mut dyn Backend) -> Result<Option<String>, StorageError> {
///     if backend.is_file("notes.txt")? {
///         return backend.read_to_string_with("notes.txt", Charset::utf_8()).map(Some);
///     }
///     Ok(None)
/// }
/// ```
pub trait BackendExt: Backend {
    /// Check if the key points to a regular file.
    ///
    /// Returns `Ok(false)` if the key doesn't exist (not an error).
    fn is_file(&mut self, key: &str) -> Result<bool, StorageError> {
        Ok(self.exists(key)? && !self.is_dir(key)?)
    }

    /// Size of a file in bytes; directories report `0` on every backend.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the key doesn't exist.
    fn file_size(&mut self, key: &str) -> Result<u64, StorageError> {
        if self.is_dir(key)? {
            return Ok(0);
        }
        self.size(key)
    }

    /// Read an entry and decode it with `charset`.
    fn read_to_string_with(&mut self, key: &str, charset: Charset) -> Result<String, StorageError> {
        let bytes = self.read(key)?;
        Ok(charset.decode(&bytes))
    }

    /// Create missing parent directories of `key`.
    fn create_parents(&mut self, key: &str) -> Result<(), StorageError> {
        match key.rsplit_once('/') {
            Some((parent, _)) if !parent.is_empty() => self.create_dir_all(parent),
            _ => Ok(()),
        }
    }

    /// Write `data`, creating the entry and its parents when absent.
    ///
    /// An existing entry is truncated, or appended to when `append` is set.
    /// The existence check and the write are separate steps.
    fn write_resolved(&mut self, key: &str, data: &[u8], append: bool) -> Result<(), StorageError> {
        self.create_parents(key)?;
        let mode = WriteMode::resolve(self.exists(key)?, append);
        self.write(key, data, mode)
    }

    /// Streaming counterpart of [`write_resolved`](Self::write_resolved).
    ///
    /// Returns the number of bytes copied.
    fn write_from_resolved(
        &mut self,
        key: &str,
        reader: &mut dyn Read,
        append: bool,
    ) -> Result<u64, StorageError> {
        self.create_parents(key)?;
        let mode = WriteMode::resolve(self.exists(key)?, append);
        self.write_from(key, reader, mode)
    }
}

// Blanket implementation - any Backend gets BackendExt for free
impl<B: Backend + ?Sized> BackendExt for B {}
