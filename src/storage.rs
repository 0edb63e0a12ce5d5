//! # Storage
//!
//! A root location with a resolved backend type and charset.
//!
//! A [`Storage`] is a cheap, clonable handle. It never holds a backend open:
//! every operation opens a fresh view, performs one logical action and
//! finishes the view before returning.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::glob::GlobMatcher;
use crate::path::{absolutize, display_path, normalize_path, storage_uri};
use crate::traits::{Backend, BackendDir, BackendWrite};
use crate::{Charset, Resource, StorageError, StorageType, backend, config, deferred};

struct StorageInner {
    path: PathBuf,
    uri: String,
    storage_type: StorageType,
    charset: Charset,
}

/// Handle to a directory or archive storage root.
///
/// Two storages are equal when their canonical URIs are equal, regardless
/// of charset.
///
/// # Example
///
/// ```rust
/// use anystore::{Storage, StorageType};
///
/// # fn main() -> Result<(), anystore::StorageError> {
/// let dir = tempfile::tempdir().unwrap();
/// let storage = Storage::new(dir.path().join("bundle.zip"))?;
/// assert_eq!(storage.storage_type(), StorageType::Archive);
///
/// storage.get_resource("docs/readme.txt").write_str("hello", false)?;
/// assert_eq!(storage.find_resources("**.txt")?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

/// Builder for a [`Storage`] with an explicit type or charset.
#[derive(Debug, Clone)]
pub struct StorageBuilder {
    root: PathBuf,
    storage_type: Option<StorageType>,
    charset: Option<Charset>,
}

impl StorageBuilder {
    /// Require a backend type instead of inferring it.
    pub fn storage_type(mut self, storage_type: StorageType) -> Self {
        self.storage_type = Some(storage_type);
        self
    }

    /// Charset for text reads and writes. Defaults to the configured charset.
    pub fn charset(mut self, charset: Charset) -> Self {
        self.charset = Some(charset);
        self
    }

    /// Resolve the root and backend type.
    ///
    /// # Errors
    ///
    /// - [`StorageError::TypeMismatch`] if the root exists and is not a
    ///   directory or archive, or contradicts the requested type
    /// - [`StorageError::Io`] if the current directory cannot be read
    pub fn build(self) -> Result<Storage, StorageError> {
        let path = absolutize(&self.root.to_string_lossy())?;
        let storage_type = backend::detect_type(&path, self.storage_type)?;
        let charset = self.charset.unwrap_or(config::get().charset);
        Ok(Storage {
            inner: Arc::new(StorageInner {
                uri: storage_uri(&path),
                path,
                storage_type,
                charset,
            }),
        })
    }
}

impl Storage {
    /// Open a storage, inferring its backend type.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::builder(root).build()
    }

    /// Open a storage with an explicit backend type.
    pub fn with_type(root: impl AsRef<Path>, storage_type: StorageType) -> Result<Self, StorageError> {
        Self::builder(root).storage_type(storage_type).build()
    }

    /// Start building a storage.
    pub fn builder(root: impl AsRef<Path>) -> StorageBuilder {
        StorageBuilder {
            root: root.as_ref().to_path_buf(),
            storage_type: None,
            charset: None,
        }
    }

    /// Absolute, normalized root.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Canonical identity, `file:/<root>`.
    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// Resolved backend type.
    pub fn storage_type(&self) -> StorageType {
        self.inner.storage_type
    }

    /// Charset used for text reads and writes.
    pub fn charset(&self) -> Charset {
        self.inner.charset
    }

    /// Whether the root exists, after applying this storage's pending writes.
    pub fn exists(&self) -> Result<bool, StorageError> {
        deferred::flush_storage(self.uri())?;
        Ok(self.root_exists())
    }

    /// Remove the whole root and everything in it.
    ///
    /// Pending deferred writes are applied first. The handle stays valid and
    /// a later write recreates the root.
    pub fn delete(&self) -> Result<(), StorageError> {
        deferred::flush_storage(self.uri())?;
        if self.root_exists() {
            backend::destroy(self.path(), self.storage_type())?;
        }
        Ok(())
    }

    /// A handle to `path` inside this storage. The entry need not exist.
    pub fn get_resource(&self, path: &str) -> Resource {
        Resource::new(self.clone(), normalize_path(path))
    }

    /// Every regular file whose root-relative path matches `glob`.
    ///
    /// Order follows the backend's walk and is not sorted. A missing root
    /// yields an empty list.
    ///
    /// # Errors
    ///
    /// - [`StorageError::PatternSyntax`] for a malformed glob
    /// - backend errors from opening or walking the root
    pub fn find_resources(&self, glob: &str) -> Result<Vec<Resource>, StorageError> {
        deferred::flush_storage(self.uri())?;
        if !self.root_exists() {
            return Ok(Vec::new());
        }
        let matcher = GlobMatcher::compile(glob)?;
        let files = self.run_in_backend(|backend| backend.walk_files())?;
        let found: Vec<Resource> = files
            .iter()
            .filter(|key| matcher.matches(key))
            .map(|key| self.get_resource(key))
            .collect();
        tracing::debug!(
            storage = %self.uri(),
            glob,
            scanned = files.len(),
            matched = found.len(),
            "enumerated resources"
        );
        Ok(found)
    }

    /// The single resource matching `glob`, if any.
    ///
    /// # Errors
    ///
    /// - [`StorageError::AmbiguousMatch`] if two or more resources match
    pub fn find_resource(&self, glob: &str) -> Result<Option<Resource>, StorageError> {
        let mut found = self.find_resources(glob)?;
        match found.len() {
            0 | 1 => Ok(found.pop()),
            _ => Err(StorageError::AmbiguousMatch {
                root: display_path(self.path()),
                glob: glob.to_string(),
                matches: found
                    .iter()
                    .map(|r| format!("{} {}", r.path(), r.uri()))
                    .collect(),
            }),
        }
    }

    /// Existence of the physical root, without flushing.
    pub(crate) fn root_exists(&self) -> bool {
        self.inner.path.exists()
    }

    /// Run `op` against a fresh backend view and commit it.
    ///
    /// Staged changes of a failed operation are discarded with the view.
    pub(crate) fn run_in_backend<T>(
        &self,
        op: impl FnOnce(&mut dyn Backend) -> Result<T, StorageError>,
    ) -> Result<T, StorageError> {
        let mut view = backend::open(self.path(), self.storage_type())?;
        let value = op(view.as_mut())?;
        view.finish()?;
        Ok(value)
    }
}

impl PartialEq for Storage {
    fn eq(&self, other: &Self) -> bool {
        self.uri() == other.uri()
    }
}

impl Eq for Storage {}

impl Hash for Storage {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri().hash(state);
    }
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("path", &self.inner.path)
            .field("storage_type", &self.inner.storage_type)
            .field("charset", &self.inner.charset)
            .finish()
    }
}

impl fmt::Display for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (exists: {}, type: {})",
            display_path(self.path()),
            self.root_exists(),
            self.storage_type()
        )
    }
}
