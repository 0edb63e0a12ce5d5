//! Enumeration for storage backends.

use crate::StorageError;

/// Tree enumeration for a storage backend view.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn BackendDir`.
pub trait BackendDir: Send {
    /// Walk the whole tree under the root and list every regular file.
    ///
    /// Entries are normalized in-root keys in the backend's natural
    /// visitation order, which is neither sorted nor stable across calls.
    fn walk_files(&mut self) -> Result<Vec<String>, StorageError>;
}
