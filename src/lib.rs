//! # anystore
//!
//! Uniform storage over **directory trees** and **zip archives**, with
//! debounced deferred writes.
//!
//! Callers address, enumerate, read and write named resources without
//! knowing which backend sits under a root. Deferred writes are coalesced
//! per resource, and every synchronous operation observes the latest
//! requested content.
//!
//! ---
//!
//! ## Quick Start
//!
//! ```rust
//! use anystore::{Storage, StorageType};
//!
//! # fn main() -> Result<(), anystore::StorageError> {
//! let dir = tempfile::tempdir().unwrap();
//!
//! // Backend type is inferred: `.zip` / `.jar` roots are archives.
//! let site = Storage::new(dir.path().join("site.zip"))?;
//! assert_eq!(site.storage_type(), StorageType::Archive);
//!
//! let index = site.get_resource("pages/index.html");
//! index.write_str("<h1>Hi</h1>", false)?;
//! assert_eq!(index.read_to_string()?, "<h1>Hi</h1>");
//!
//! // Debounced: only the last content is written.
//! for hits in 1..=100 {
//!     site.get_resource("stats/hits.txt").write_deferred_str(hits.to_string())?;
//! }
//! // ...but reads see it immediately.
//! assert_eq!(site.get_resource("stats/hits.txt").read_to_string()?, "100");
//!
//! assert_eq!(site.find_resources("**.{html,txt}")?.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ---
//!
//! ## Core Types
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Storage`] | A root with a resolved backend type and charset |
//! | [`Resource`] | Handle to one path inside a storage |
//! | [`StorageError`] | Error type with context |
//! | [`GlobMatcher`](glob::GlobMatcher) | Compiled glob used by enumeration |
//! | [`DeferredScheduler`](deferred::DeferredScheduler) | Debouncing write scheduler |
//! | [`Backend`] | Capability interface of a backend view |
//!
//! ---
//!
//! ## Backend Traits
//!
//! ```text
//! BackendRead + BackendWrite + BackendDir = Backend
//! ```
//!
//! [`DirectoryBackend`] maps onto the host filesystem. [`ArchiveBackend`]
//! maps onto a zip container opened for a single operation and rewritten
//! when that operation changed anything.
//!
//! ---
//!
//! ## Glob Syntax
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | `*` | any run of characters except `/` |
//! | `**` | any run of characters including `/` |
//! | `?` | one character except `/` |
//! | `[a-z]`, `[!abc]` | one character from (or not from) a class |
//! | `{a,b}` | either alternative |
//! | `\x` | `x` literally |
//!
//! Matching is anchored and case-insensitive.
//!
//! ---
//!
//! ## Thread Safety
//!
//! [`Storage`] and [`Resource`] are `Send + Sync` handles. Backend views are
//! never shared, but two threads must not operate on the same *archive* root
//! at once; serializing those calls is the caller's job.
//!
//! ---
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `serde` | `Resource::read_json` / `write_json`, serde derives for [`StorageType`] |

// Private modules
mod backend;
mod error;
mod ext;
mod resource;
mod storage;
mod traits;
mod types;

// Public modules
pub mod config;
pub mod deferred;
pub mod glob;
pub mod path;

// Public re-exports - error types
pub use error::StorageError;

// Public re-exports - core types
pub use types::{Charset, StorageType, WriteMode};

// Public re-exports - storage handles
pub use resource::Resource;
pub use storage::{Storage, StorageBuilder};

// Public re-exports - backend traits
pub use traits::{Backend, BackendDir, BackendRead, BackendWrite, COPY_CHUNK};

// Public re-exports - backends
pub use backend::{
    ArchiveBackend, DirectoryBackend, ZIP_EMPTY_MAGIC, ZIP_MAGIC, detect_type, is_archive_file,
};

// Public re-exports - infrastructure
pub use ext::BackendExt;
