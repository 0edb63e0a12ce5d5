//! Error types for storage roots, resources and deferred writes.

use std::path::{Path, PathBuf};

/// Storage error type with contextual variants.
///
/// Every failure surfaced by this crate is one of these variants. The
/// I/O-flavoured ones (`NotFound`, `Io`, `Archive`, `Processor`) wrap
/// failures of the underlying backend; the rest describe misuse that is
/// detected before any I/O happens.
///
/// # Examples
///
/// ```rust
/// use anystore::StorageError;
/// use std::path::PathBuf;
///
/// let err = StorageError::NotFound { path: PathBuf::from("/missing.txt") };
/// assert_eq!(err.to_string(), "not found: /missing.txt");
/// ```
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    // Backend failures
    /// Path does not exist.
    #[error("not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// I/O error with context.
    #[error("{operation} failed for {path}: {source}")]
    Io {
        /// The operation that failed.
        operation: &'static str,
        /// The path involved in the operation.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The archive container could not be read or written.
    #[error("{operation} failed for archive {path}: {source}")]
    Archive {
        /// The operation that failed.
        operation: &'static str,
        /// The archive file.
        path: PathBuf,
        /// The underlying archive codec error.
        #[source]
        source: zip::result::ZipError,
    },

    /// A caller-supplied stream processor failed.
    #[error("stream processor failed for {path}: {reason}")]
    Processor {
        /// The resource being read.
        path: PathBuf,
        /// What the processor reported.
        reason: String,
    },

    // Misuse
    /// Malformed glob pattern.
    #[error("{reason} near index {index} in glob '{pattern}'")]
    PatternSyntax {
        /// The offending pattern.
        pattern: String,
        /// Character index where the problem was detected.
        index: usize,
        /// Description of the problem.
        reason: &'static str,
    },

    /// The root is not of the requested (or any supported) backend type.
    #[error("type mismatch for {path}: {reason}")]
    TypeMismatch {
        /// The storage root.
        path: PathBuf,
        /// Description of the conflict.
        reason: String,
    },

    /// A single-result lookup matched more than one resource.
    #[error("found {} resources in storage '{root}' with glob '{glob}':\n{}", .matches.len(), .matches.join("\n"))]
    AmbiguousMatch {
        /// The storage root that was searched.
        root: String,
        /// The glob used for the lookup.
        glob: String,
        /// One line per match: path and URI.
        matches: Vec<String>,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

impl StorageError {
    /// Wrap an I/O error, promoting `ErrorKind::NotFound` to [`StorageError::NotFound`].
    pub fn io(operation: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        let path = path.as_ref().to_path_buf();
        match source.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound { path },
            _ => StorageError::Io {
                operation,
                path,
                source,
            },
        }
    }

    /// Wrap an archive codec error.
    pub fn archive(
        operation: &'static str,
        path: impl AsRef<Path>,
        source: zip::result::ZipError,
    ) -> Self {
        match source {
            zip::result::ZipError::FileNotFound => StorageError::NotFound {
                path: path.as_ref().to_path_buf(),
            },
            zip::result::ZipError::Io(e) => StorageError::io(operation, path, e),
            source => StorageError::Archive {
                operation,
                path: path.as_ref().to_path_buf(),
                source,
            },
        }
    }

    /// Returns `true` for [`StorageError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
