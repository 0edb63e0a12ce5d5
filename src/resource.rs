//! # Resource
//!
//! A handle to one path inside a [`Storage`].
//!
//! Every operation first applies any deferred write pending for this
//! resource, so reads always observe the most recently requested content.
//!
//! ## Operations
//!
//! | Method | Behavior on a missing entry |
//! |--------|-----------------------------|
//! | [`exists`](Resource::exists) | `Ok(false)` |
//! | [`size`](Resource::size) | `NotFound` |
//! | [`delete`](Resource::delete) | no-op |
//! | [`read_to_bytes`](Resource::read_to_bytes) / [`read_to_string`](Resource::read_to_string) / [`read_from_stream`](Resource::read_from_stream) | `NotFound` |
//! | [`write_str`](Resource::write_str) / [`write_bytes`](Resource::write_bytes) / [`write_from_reader`](Resource::write_from_reader) | created with parents |
//! | [`write_deferred`](Resource::write_deferred) | created when the write runs |

use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::deferred::{self, DeferredWriteTask};
use crate::ext::BackendExt;
use crate::path::{archive_resource_uri, directory_resource_uri, relative_key};
use crate::traits::{BackendRead, BackendWrite};
use crate::{Storage, StorageError, StorageType};

/// Handle to a path inside a storage; the entry may not exist yet.
///
/// Identity is the canonical URI: `file:/<root>/<path>` for directory
/// storages and `jar:/file:/<root>!/<path>` for archives.
///
/// # Example
///
/// ```rust
/// use anystore::Storage;
///
/// # fn main() -> Result<(), anystore::StorageError> {
/// let dir = tempfile::tempdir().unwrap();
/// let storage = Storage::new(dir.path())?;
/// let log = storage.get_resource("logs/app.log");
///
/// log.write_str("A", false)?;
/// log.write_str("B", true)?;
/// assert_eq!(log.read_to_string()?, "AB");
/// assert_eq!(log.name(), "app");
/// assert_eq!(log.extension(), "log");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Resource {
    storage: Storage,
    path: String,
    uri: OnceLock<String>,
    full_name: OnceLock<String>,
    name: OnceLock<String>,
    extension: OnceLock<String>,
}

impl Resource {
    pub(crate) fn new(storage: Storage, path: String) -> Self {
        Self {
            storage,
            path,
            uri: OnceLock::new(),
            full_name: OnceLock::new(),
            name: OnceLock::new(),
            extension: OnceLock::new(),
        }
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// The owning storage.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Normalized path as given to [`Storage::get_resource`].
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Canonical identity.
    pub fn uri(&self) -> &str {
        self.uri.get_or_init(|| match self.storage.storage_type() {
            StorageType::Directory => directory_resource_uri(self.storage.path(), &self.path),
            StorageType::Archive => archive_resource_uri(self.storage.path(), &self.path),
        })
    }

    /// Last path segment, e.g. `file.txt`.
    pub fn full_name(&self) -> &str {
        self.full_name.get_or_init(|| {
            self.path
                .rsplit_once('/')
                .map_or(self.path.as_str(), |(_, last)| last)
                .to_string()
        })
    }

    /// Last path segment without its extension, e.g. `file`.
    pub fn name(&self) -> &str {
        self.name.get_or_init(|| {
            let full = self.full_name();
            full.rsplit_once('.').map_or(full, |(name, _)| name).to_string()
        })
    }

    /// Text after the last `.` of the last segment, or `""`.
    pub fn extension(&self) -> &str {
        self.extension.get_or_init(|| {
            self.full_name()
                .rsplit_once('.')
                .map_or("", |(_, ext)| ext)
                .to_string()
        })
    }

    fn key(&self) -> &str {
        relative_key(&self.path)
    }

    /// Host-side location used in error context.
    pub(crate) fn location(&self) -> PathBuf {
        self.storage.path().join(self.key())
    }

    fn flush(&self) -> Result<(), StorageError> {
        deferred::flush_resource(self.uri())
    }

    fn missing(&self) -> StorageError {
        StorageError::NotFound {
            path: self.location(),
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether the entry exists. `false` when the storage root is absent.
    pub fn exists(&self) -> Result<bool, StorageError> {
        self.flush()?;
        if !self.storage.root_exists() {
            return Ok(false);
        }
        let key = self.key();
        self.storage.run_in_backend(|backend| backend.exists(key))
    }

    /// Size in bytes.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the entry does not exist
    pub fn size(&self) -> Result<u64, StorageError> {
        self.flush()?;
        if !self.storage.root_exists() {
            return Err(self.missing());
        }
        let key = self.key();
        self.storage.run_in_backend(|backend| backend.file_size(key))
    }

    /// Remove the entry and anything beneath it. Absent entries are ignored.
    pub fn delete(&self) -> Result<(), StorageError> {
        self.flush()?;
        if !self.storage.root_exists() {
            return Ok(());
        }
        let key = self.key();
        self.storage.run_in_backend(|backend| backend.remove(key))
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Read the whole entry.
    pub fn read_to_bytes(&self) -> Result<Vec<u8>, StorageError> {
        self.flush()?;
        if !self.storage.root_exists() {
            return Err(self.missing());
        }
        let key = self.key();
        self.storage.run_in_backend(|backend| backend.read(key))
    }

    /// Read the whole entry and decode it with the storage charset.
    pub fn read_to_string(&self) -> Result<String, StorageError> {
        self.flush()?;
        if !self.storage.root_exists() {
            return Err(self.missing());
        }
        let key = self.key();
        let charset = self.storage.charset();
        self.storage
            .run_in_backend(|backend| backend.read_to_string_with(key, charset))
    }

    /// Hand a live stream over the entry to `processor`.
    ///
    /// # Errors
    ///
    /// - [`StorageError::NotFound`] if the entry does not exist
    /// - [`StorageError::Processor`] carrying the processor's own error text
    ///
    /// # Example
    ///
    /// ```rust
    /// use anystore::Storage;
    /// use std::io::{BufRead, BufReader};
    ///
    /// # fn main() -> Result<(), anystore::StorageError> {
    /// let dir = tempfile::tempdir().unwrap();
    /// let csv = Storage::new(dir.path())?.get_resource("data.csv");
    /// csv.write_str("a,b\nc,d\n", false)?;
    /// let rows = csv.read_from_stream(|stream| {
    ///     Ok::<_, std::io::Error>(BufReader::new(stream).lines().count())
    /// })?;
    /// assert_eq!(rows, 2);
    /// # Ok(())
    /// # }
    /// ```
    pub fn read_from_stream<T, E>(
        &self,
        processor: impl FnOnce(&mut dyn Read) -> Result<T, E>,
    ) -> Result<T, StorageError>
    where
        E: fmt::Display,
    {
        self.flush()?;
        if !self.storage.root_exists() {
            return Err(self.missing());
        }
        let key = self.key();
        self.storage.run_in_backend(|backend| {
            let mut stream = backend.open_read(key)?;
            processor(&mut *stream).map_err(|e| StorageError::Processor {
                path: self.location(),
                reason: e.to_string(),
            })
        })
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Write text encoded with the storage charset.
    ///
    /// A missing entry is created together with its parent directories; an
    /// existing one is truncated, or appended to when `append` is set.
    pub fn write_str(&self, text: &str, append: bool) -> Result<(), StorageError> {
        self.write_bytes(&self.storage.charset().encode(text), append)
    }

    /// Write raw bytes. Same mode rules as [`write_str`](Self::write_str).
    pub fn write_bytes(&self, content: &[u8], append: bool) -> Result<(), StorageError> {
        self.flush()?;
        self.write_now(content, append)
    }

    /// Copy a stream into the entry in fixed-size chunks.
    ///
    /// Returns the number of bytes copied.
    pub fn write_from_reader(&self, reader: &mut dyn Read, append: bool) -> Result<u64, StorageError> {
        self.flush()?;
        let key = self.key();
        self.storage
            .run_in_backend(|backend| backend.write_from_resolved(key, reader, append))
    }

    /// Write without consulting pending deferred writes.
    pub(crate) fn write_now(&self, content: &[u8], append: bool) -> Result<(), StorageError> {
        let key = self.key();
        self.storage
            .run_in_backend(|backend| backend.write_resolved(key, content, append))
    }

    // ========================================================================
    // Deferred writes
    // ========================================================================

    /// Replace the content after the configured delay.
    ///
    /// A later deferred write to the same resource supersedes this one and
    /// restarts the delay. Any synchronous operation on the resource applies
    /// the pending write first.
    pub fn write_deferred(&self, content: impl Into<Vec<u8>>) -> Result<(), StorageError> {
        let content = content.into();
        self.write_deferred_with(move || content)
    }

    /// Deferred counterpart of [`write_str`](Self::write_str) with `append = false`.
    pub fn write_deferred_str(&self, text: impl Into<String>) -> Result<(), StorageError> {
        let text = text.into();
        let charset = self.storage.charset();
        self.write_deferred_with(move || charset.encode(&text))
    }

    /// Defer a write whose content is produced by `supplier` when it runs.
    ///
    /// The supplier runs at most once, and never if a newer deferred write
    /// replaces it first.
    pub fn write_deferred_with(
        &self,
        supplier: impl FnOnce() -> Vec<u8> + Send + 'static,
    ) -> Result<(), StorageError> {
        deferred::schedule(DeferredWriteTask::new(self.clone(), supplier))
    }
}

// ============================================================================
// JSON Support (Feature-Gated)
// ============================================================================

#[cfg(feature = "serde")]
mod json {
    use super::*;
    use serde::{Serialize, de::DeserializeOwned};

    impl Resource {
        /// Read the entry and deserialize it as JSON.
        ///
        /// # Errors
        ///
        /// - [`StorageError::NotFound`] if the entry does not exist
        /// - [`StorageError::Deserialization`] if JSON parsing failed
        pub fn read_json<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
            let text = self.read_to_string()?;
            serde_json::from_str(&text).map_err(|e| StorageError::Deserialization(e.to_string()))
        }

        /// Serialize a value as pretty-printed JSON and replace the entry with it.
        ///
        /// # Errors
        ///
        /// - [`StorageError::Serialization`] if serialization failed
        pub fn write_json<T: Serialize>(&self, value: &T) -> Result<(), StorageError> {
            let json = serde_json::to_string_pretty(value)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            self.write_str(&json, false)
        }
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.uri() == other.uri()
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri().hash(state);
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("path", &self.path)
            .field("uri", &self.uri())
            .finish()
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path, self.uri())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn resource(dir: &TempDir, path: &str) -> Resource {
        Storage::new(dir.path()).unwrap().get_resource(path)
    }

    #[test]
    fn name_parts() {
        let dir = TempDir::new().unwrap();
        let r = resource(&dir, "/dir/file.txt");
        assert_eq!(r.full_name(), "file.txt");
        assert_eq!(r.name(), "file");
        assert_eq!(r.extension(), "txt");

        let r = resource(&dir, "dir/archive.tar.gz");
        assert_eq!(r.name(), "archive.tar");
        assert_eq!(r.extension(), "gz");

        let r = resource(&dir, "README");
        assert_eq!(r.name(), "README");
        assert_eq!(r.extension(), "");
    }

    #[test]
    fn path_is_normalized() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resource(&dir, r"a\b\c.txt\").path(), "a/b/c.txt");
    }

    #[test]
    fn leading_slash_shares_identity() {
        let dir = TempDir::new().unwrap();
        assert_eq!(resource(&dir, "/a.txt"), resource(&dir, "a.txt"));
    }

    #[test]
    fn archive_uri_form() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("bundle.zip")).unwrap();
        let r = storage.get_resource("x/y.txt");
        assert!(r.uri().starts_with("jar:/file:/"));
        assert!(r.uri().ends_with("bundle.zip!/x/y.txt"));
    }

    #[test]
    fn queries_on_missing_root_do_not_create_it() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("lazy")).unwrap();
        let r = storage.get_resource("a.txt");
        assert!(!r.exists().unwrap());
        assert!(r.size().unwrap_err().is_not_found());
        assert!(r.read_to_bytes().unwrap_err().is_not_found());
        r.delete().unwrap();
        assert!(!storage.root_exists());
    }

    #[test]
    fn processor_errors_are_wrapped() {
        let dir = TempDir::new().unwrap();
        let r = resource(&dir, "f.txt");
        r.write_str("x", false).unwrap();
        let err = r
            .read_from_stream(|_| Err::<(), _>("bad header"))
            .unwrap_err();
        assert!(matches!(err, StorageError::Processor { ref reason, .. } if reason == "bad header"));
    }

    #[test]
    fn latin1_storage_round_trips_text() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::builder(dir.path())
            .charset(crate::Charset::for_label("latin1").unwrap())
            .build()
            .unwrap();
        let r = storage.get_resource("l.txt");
        r.write_str("café", false).unwrap();
        assert_eq!(r.size().unwrap(), 4);
        assert_eq!(r.read_to_string().unwrap(), "café");
    }

    #[test]
    fn display_does_no_io() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("lazy")).unwrap();
        let text = storage.get_resource("a.txt").to_string();
        assert!(text.starts_with("a.txt ("));
        assert!(!storage.root_exists());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_round_trip() {
        let dir = TempDir::new().unwrap();
        let r = resource(&dir, "conf/settings.json");
        let value = serde_json::json!({ "name": "demo", "retries": 3 });
        r.write_json(&value).unwrap();
        let back: serde_json::Value = r.read_json().unwrap();
        assert_eq!(back, value);
    }

    proptest! {
        #[test]
        fn name_and_extension_recompose(
            dirs in proptest::collection::vec("[a-z]{1,6}", 0..3),
            stem in "[a-z]{0,6}",
            ext in proptest::option::of("[a-z]{1,4}"),
        ) {
            let dir = TempDir::new().unwrap();
            let mut path = dirs.join("/");
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(&stem);
            if let Some(ext) = &ext {
                path.push('.');
                path.push_str(ext);
            }
            prop_assume!(!path.is_empty());
            let r = resource(&dir, &path);
            if r.extension().is_empty() {
                prop_assert_eq!(r.name(), r.full_name());
            } else {
                prop_assert_eq!(format!("{}.{}", r.name(), r.extension()), r.full_name());
            }
        }
    }
}
