//! Write operations for storage backends.

use std::io::Read;

use crate::{StorageError, WriteMode};

/// Chunk size for streamed writes.
pub const COPY_CHUNK: usize = 4096;

/// Write operations for a storage backend view.
///
/// Changes may be staged by the view and only become durable in
/// [`finish`](Self::finish); callers must finish every view they mutate.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn BackendWrite`.
pub trait BackendWrite: Send {
    /// Write data to an entry according to `mode`.
    ///
    /// Parent directories must exist. Use [`create_dir_all`](Self::create_dir_all)
    /// first.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the parent directory does not exist
    /// - [`StorageError::Io`] if the path is a directory or writing fails
    fn write(&mut self, path: &str, data: &[u8], mode: WriteMode) -> Result<(), StorageError>;

    /// Copy a stream into an entry in [`COPY_CHUNK`]-sized pieces.
    ///
    /// Returns the number of bytes copied.
    fn write_from(
        &mut self,
        path: &str,
        reader: &mut dyn Read,
        mode: WriteMode,
    ) -> Result<u64, StorageError>;

    /// Remove an entry and, for directories, everything beneath it.
    ///
    /// Removing an absent entry is a no-op.
    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    /// Create a directory and all missing ancestors. Idempotent.
    fn create_dir_all(&mut self, path: &str) -> Result<(), StorageError>;

    /// Make staged changes durable and release the view's resources.
    fn finish(&mut self) -> Result<(), StorageError>;
}
