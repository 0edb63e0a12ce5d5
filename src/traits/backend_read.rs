//! Read operations for storage backends.

use std::io::Read;

use crate::StorageError;

/// Read operations for a storage backend view.
///
/// Paths are normalized in-root keys (`"dir/file.txt"`); the empty key is
/// the root itself.
///
/// Methods take `&mut self`: a view serves exactly one logical operation
/// and is never shared, so no interior mutability is needed.
///
/// # Object Safety
///
/// This trait is object-safe and can be used as `dyn BackendRead`.
pub trait BackendRead: Send {
    /// Check if an entry (file or directory) exists.
    ///
    /// Returns `Ok(false)` if it does not; errors only for unexpected failures.
    fn exists(&mut self, path: &str) -> Result<bool, StorageError>;

    /// Check if the entry is a directory. Absent entries are not directories.
    fn is_dir(&mut self, path: &str) -> Result<bool, StorageError>;

    /// Size of an entry in bytes.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the path does not exist
    fn size(&mut self, path: &str) -> Result<u64, StorageError>;

    /// Read entire entry contents as bytes.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the path does not exist
    /// - [`StorageError::Io`] if the path is a directory or reading fails
    fn read(&mut self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Open an entry for streaming reads.
    ///
    /// The reader borrows the view; it must be dropped before the view is finished.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the path does not exist
    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + '_>, StorageError>;
}
