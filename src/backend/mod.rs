//! # Backends
//!
//! The two concrete backend views and the logic that decides which one a
//! storage root uses.
//!
//! ## Type Detection
//!
//! | Root on disk | Requested | Result |
//! |--------------|-----------|--------|
//! | directory | none / directory | [`StorageType::Directory`] |
//! | file with zip magic | none / archive | [`StorageType::Archive`] |
//! | anything else | any | [`StorageError::TypeMismatch`] |
//! | absent | explicit | the explicit type |
//! | absent | none | archive if the name ends in `.zip` or `.jar`, else directory |

mod archive;
mod directory;

pub use archive::ArchiveBackend;
pub use directory::DirectoryBackend;

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use crate::traits::Backend;
use crate::{StorageError, StorageType};

/// Leading bytes of a zip container with at least one entry.
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Leading bytes of an empty zip container.
pub const ZIP_EMPTY_MAGIC: [u8; 4] = [0x50, 0x4B, 0x05, 0x06];

const ARCHIVE_SUFFIXES: [&str; 2] = [".zip", ".jar"];

/// `true` if `path` is a readable file starting with zip magic bytes.
pub fn is_archive_file(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    match File::open(path).and_then(|mut f| f.read_exact(&mut magic)) {
        Ok(()) => magic == ZIP_MAGIC || magic == ZIP_EMPTY_MAGIC,
        Err(_) => false,
    }
}

/// Decide the backend type for `root`.
///
/// # Errors
///
/// - [`StorageError::TypeMismatch`] if the root exists but is neither a
///   directory nor an archive, or contradicts `requested`
pub fn detect_type(
    root: &Path,
    requested: Option<StorageType>,
) -> Result<StorageType, StorageError> {
    let mismatch = |reason: String| StorageError::TypeMismatch {
        path: root.to_path_buf(),
        reason,
    };

    if root.exists() {
        let actual = if root.is_dir() {
            StorageType::Directory
        } else if is_archive_file(root) {
            StorageType::Archive
        } else {
            return Err(mismatch(
                "only directory or archive roots are supported".to_string(),
            ));
        };
        return match requested {
            Some(requested) if requested != actual => Err(mismatch(format!(
                "requested {requested} storage but the root is {actual}"
            ))),
            _ => Ok(actual),
        };
    }

    Ok(requested.unwrap_or_else(|| {
        let name = root.to_string_lossy();
        if ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            StorageType::Archive
        } else {
            StorageType::Directory
        }
    }))
}

/// Open a fresh view on `root`, materializing it if absent.
pub fn open(root: &Path, storage_type: StorageType) -> Result<Box<dyn Backend>, StorageError> {
    Ok(match storage_type {
        StorageType::Directory => Box::new(DirectoryBackend::open(root)?),
        StorageType::Archive => Box::new(ArchiveBackend::open(root)?),
    })
}

/// Remove the whole root from the host filesystem.
pub fn destroy(root: &Path, storage_type: StorageType) -> Result<(), StorageError> {
    tracing::debug!(root = %root.display(), %storage_type, "removing storage root");
    match storage_type {
        StorageType::Directory => {
            fs::remove_dir_all(root).map_err(|e| StorageError::io("remove_dir_all", root, e))
        }
        StorageType::Archive => {
            fs::remove_file(root).map_err(|e| StorageError::io("remove_file", root, e))
        }
    }
}
