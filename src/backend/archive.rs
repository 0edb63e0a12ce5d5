//! Zip-archive backend.
//!
//! A view reads straight from the container and stages every mutation in
//! memory. [`BackendWrite::finish`] commits the staged changes by writing a
//! fresh container to a temporary file next to the original (untouched
//! entries are raw-copied, not recompressed) and persisting it over the
//! container. A failed commit leaves no temporary file behind.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::path::{normalize_path, relative_key};
use crate::traits::{BackendDir, BackendRead, BackendWrite, COPY_CHUNK};
use crate::{StorageError, WriteMode};

/// Largest read buffer preallocated from a size the container claims.
const MAX_PREALLOC: u64 = 1 << 20;

/// An entry as recorded in the container's central directory.
#[derive(Debug, Clone, Copy)]
struct Original {
    index: usize,
    is_dir: bool,
    size: u64,
}

/// A change not yet committed to the container.
#[derive(Debug)]
enum Staged {
    File(Vec<u8>),
    Dir,
}

/// Backend view over one zip container.
pub struct ArchiveBackend {
    path: PathBuf,
    archive: Option<ZipArchive<File>>,
    originals: BTreeMap<String, Original>,
    staged: BTreeMap<String, Staged>,
    removed: BTreeSet<String>,
    dirty: bool,
}

/// `true` if `name` is `prefix` itself or lies beneath it.
fn is_under(name: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || name == prefix
        || (name.len() > prefix.len()
            && name.starts_with(prefix)
            && name.as_bytes()[prefix.len()] == b'/')
}

/// Initial capacity for reading an entry recorded as `size` bytes.
fn capacity_hint(size: u64) -> usize {
    usize::try_from(size.min(MAX_PREALLOC)).unwrap_or(0)
}

fn not_a_file(path: &Path, key: &str) -> StorageError {
    StorageError::io(
        "read",
        path.join(key),
        std::io::Error::new(ErrorKind::InvalidInput, "entry is a directory"),
    )
}

impl ArchiveBackend {
    /// Open a view on the container at `path`.
    ///
    /// A missing container is created empty, along with its parent directories.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if !path.exists() {
            create_empty(path)?;
        }
        let file = File::open(path).map_err(|e| StorageError::io("open_archive", path, e))?;
        let mut archive =
            ZipArchive::new(file).map_err(|e| StorageError::archive("open_archive", path, e))?;

        let mut originals = BTreeMap::new();
        for index in 0..archive.len() {
            let entry = archive
                .by_index_raw(index)
                .map_err(|e| StorageError::archive("read_index", path, e))?;
            let key = relative_key(&normalize_path(entry.name())).to_string();
            if key.is_empty() {
                continue;
            }
            originals.insert(
                key,
                Original {
                    index,
                    is_dir: entry.is_dir(),
                    size: entry.size(),
                },
            );
        }

        Ok(Self {
            path: path.to_path_buf(),
            archive: Some(archive),
            originals,
            staged: BTreeMap::new(),
            removed: BTreeSet::new(),
            dirty: false,
        })
    }

    fn archive(&mut self) -> Result<&mut ZipArchive<File>, StorageError> {
        let path = &self.path;
        self.archive.as_mut().ok_or_else(|| {
            StorageError::io(
                "access",
                path,
                std::io::Error::new(ErrorKind::Other, "archive view already finished"),
            )
        })
    }

    fn is_removed(&self, key: &str) -> bool {
        self.removed.iter().any(|prefix| is_under(key, prefix))
    }

    /// The committed entry for `key`, unless a staged change hides it.
    fn original(&self, key: &str) -> Option<Original> {
        if self.staged.contains_key(key) || self.is_removed(key) {
            return None;
        }
        self.originals.get(key).copied()
    }

    /// `true` if some visible entry lies strictly beneath `key`.
    fn has_children(&self, key: &str) -> bool {
        let prefix = format!("{key}/");
        self.staged.keys().any(|name| name.starts_with(&prefix))
            || self
                .originals
                .keys()
                .any(|name| name.starts_with(&prefix) && !self.is_removed(name))
    }

    fn current_content(&mut self, key: &str) -> Result<Vec<u8>, StorageError> {
        if let Some(staged) = self.staged.get(key) {
            return match staged {
                Staged::File(bytes) => Ok(bytes.clone()),
                Staged::Dir => Err(not_a_file(&self.path, key)),
            };
        }
        match self.original(key) {
            Some(original) if original.is_dir => Err(not_a_file(&self.path, key)),
            Some(original) => {
                let path = self.path.clone();
                let mut entry = self
                    .archive()?
                    .by_index(original.index)
                    .map_err(|e| StorageError::archive("read", &path, e))?;
                let mut bytes = Vec::with_capacity(capacity_hint(original.size));
                entry
                    .read_to_end(&mut bytes)
                    .map_err(|e| StorageError::io("read", path.join(key), e))?;
                Ok(bytes)
            }
            None if self.has_children(key) => Err(not_a_file(&self.path, key)),
            None => Err(StorageError::NotFound {
                path: self.path.join(key),
            }),
        }
    }

    /// Stage `data` as the new content of `key`, taking ownership of it.
    fn write_owned(
        &mut self,
        key: &str,
        data: Vec<u8>,
        mode: WriteMode,
    ) -> Result<(), StorageError> {
        if !self.parent_exists(key)? {
            return Err(StorageError::NotFound {
                path: self.path.join(key),
            });
        }
        if self.is_dir(key)? {
            return Err(not_a_file(&self.path, key));
        }
        let content = match mode {
            WriteMode::Append if self.exists(key)? => {
                let mut existing = self.current_content(key)?;
                existing.extend_from_slice(&data);
                existing
            }
            _ => data,
        };
        self.staged.insert(key.to_string(), Staged::File(content));
        self.dirty = true;
        Ok(())
    }

    fn parent_exists(&mut self, key: &str) -> Result<bool, StorageError> {
        match key.rsplit_once('/') {
            Some((parent, _)) => self.exists(parent),
            None => Ok(true),
        }
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        let options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut keep: Vec<usize> = self
            .originals
            .iter()
            .filter(|(key, _)| !self.staged.contains_key(*key) && !self.is_removed(key))
            .map(|(_, original)| original.index)
            .collect();
        keep.sort_unstable();

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let file = NamedTempFile::new_in(dir).map_err(|e| StorageError::io("create", dir, e))?;
        let temp = file.path().to_path_buf();
        let mut writer = ZipWriter::new(BufWriter::new(file));
        {
            let path = self.path.clone();
            let archive = self.archive()?;
            for index in keep {
                let entry = archive
                    .by_index_raw(index)
                    .map_err(|e| StorageError::archive("copy_entry", &path, e))?;
                writer
                    .raw_copy_file(entry)
                    .map_err(|e| StorageError::archive("copy_entry", &temp, e))?;
            }
        }
        for (key, staged) in &self.staged {
            match staged {
                Staged::Dir => writer
                    .add_directory(format!("{key}/"), options)
                    .map_err(|e| StorageError::archive("add_directory", &temp, e))?,
                Staged::File(bytes) => {
                    writer
                        .start_file(key.as_str(), options)
                        .map_err(|e| StorageError::archive("start_file", &temp, e))?;
                    writer
                        .write_all(bytes)
                        .map_err(|e| StorageError::io("write", &temp, e))?;
                }
            }
        }
        let file = writer
            .finish()
            .map_err(|e| StorageError::archive("finish", &temp, e))?
            .into_inner()
            .map_err(|e| StorageError::io("flush", &temp, e.into_error()))?;

        // Temp files are created owner-only; keep the container's mode.
        if let Ok(meta) = fs::metadata(&self.path) {
            if let Err(error) = file.as_file().set_permissions(meta.permissions()) {
                tracing::debug!(%error, archive = %self.path.display(), "could not copy permissions");
            }
        }

        // The source handle must be closed before the container is replaced.
        self.archive = None;
        file.persist(&self.path)
            .map_err(|e| StorageError::io("rename", &self.path, e.error))?;
        tracing::debug!(
            archive = %self.path.display(),
            staged = self.staged.len(),
            removed = self.removed.len(),
            "committed archive changes"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ArchiveBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveBackend")
            .field("path", &self.path)
            .field("entries", &self.originals.len())
            .field("staged", &self.staged.len())
            .field("removed", &self.removed)
            .finish()
    }
}

/// Write an empty container (end-of-central-directory record only).
fn create_empty(path: &Path) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| StorageError::io("create_dir_all", parent, e))?;
    }
    tracing::debug!(archive = %path.display(), "creating empty archive");
    let file = File::create(path).map_err(|e| StorageError::io("create", path, e))?;
    ZipWriter::new(file)
        .finish()
        .map_err(|e| StorageError::archive("create", path, e))?;
    Ok(())
}

impl BackendRead for ArchiveBackend {
    fn exists(&mut self, path: &str) -> Result<bool, StorageError> {
        Ok(path.is_empty()
            || self.staged.contains_key(path)
            || self.original(path).is_some()
            || self.has_children(path))
    }

    fn is_dir(&mut self, path: &str) -> Result<bool, StorageError> {
        if path.is_empty() {
            return Ok(true);
        }
        Ok(match self.staged.get(path) {
            Some(Staged::Dir) => true,
            Some(Staged::File(_)) => false,
            None => match self.original(path) {
                Some(original) => original.is_dir,
                None => self.has_children(path),
            },
        })
    }

    fn size(&mut self, path: &str) -> Result<u64, StorageError> {
        match self.staged.get(path) {
            Some(Staged::File(bytes)) => return Ok(bytes.len() as u64),
            Some(Staged::Dir) => return Ok(0),
            None => {}
        }
        match self.original(path) {
            Some(original) => Ok(if original.is_dir { 0 } else { original.size }),
            None if path.is_empty() || self.has_children(path) => Ok(0),
            None => Err(StorageError::NotFound {
                path: self.path.join(path),
            }),
        }
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.current_content(path)
    }

    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + '_>, StorageError> {
        match self.staged.get(path) {
            Some(Staged::File(bytes)) => return Ok(Box::new(Cursor::new(bytes.clone()))),
            Some(Staged::Dir) => return Err(not_a_file(&self.path, path)),
            None => {}
        }
        match self.original(path) {
            Some(original) if !original.is_dir => {
                let archive_path = self.path.clone();
                let entry = self
                    .archive()?
                    .by_index(original.index)
                    .map_err(|e| StorageError::archive("open_read", &archive_path, e))?;
                Ok(Box::new(entry))
            }
            Some(_) => Err(not_a_file(&self.path, path)),
            None => Err(StorageError::NotFound {
                path: self.path.join(path),
            }),
        }
    }
}

impl BackendWrite for ArchiveBackend {
    fn write(&mut self, path: &str, data: &[u8], mode: WriteMode) -> Result<(), StorageError> {
        self.write_owned(path, data.to_vec(), mode)
    }

    fn write_from(
        &mut self,
        path: &str,
        reader: &mut dyn Read,
        mode: WriteMode,
    ) -> Result<u64, StorageError> {
        let mut incoming = Vec::new();
        let mut buffer = [0u8; COPY_CHUNK];
        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(StorageError::io("read_source", self.path.join(path), e)),
            };
            incoming.extend_from_slice(&buffer[..n]);
        }
        let copied = incoming.len() as u64;
        self.write_owned(path, incoming, mode)?;
        Ok(copied)
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        if !self.exists(path)? {
            return Ok(());
        }
        self.staged.retain(|name, _| !is_under(name, path));
        self.removed.insert(path.to_string());
        self.dirty = true;
        Ok(())
    }

    fn create_dir_all(&mut self, path: &str) -> Result<(), StorageError> {
        let mut end = 0;
        while end < path.len() {
            end = path[end..]
                .find('/')
                .map(|i| end + i)
                .unwrap_or(path.len());
            let prefix = &path[..end];
            if !self.exists(prefix)? {
                self.staged.insert(prefix.to_string(), Staged::Dir);
                self.dirty = true;
            } else if !self.is_dir(prefix)? {
                return Err(StorageError::io(
                    "create_dir_all",
                    self.path.join(prefix),
                    std::io::Error::new(ErrorKind::AlreadyExists, "entry is a file"),
                ));
            }
            end += 1;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StorageError> {
        if !self.dirty {
            return Ok(());
        }
        self.commit()?;
        self.dirty = false;
        Ok(())
    }
}

impl BackendDir for ArchiveBackend {
    fn walk_files(&mut self) -> Result<Vec<String>, StorageError> {
        let mut originals: Vec<(&String, &Original)> = self
            .originals
            .iter()
            .filter(|(key, original)| {
                !original.is_dir && !self.staged.contains_key(*key) && !self.is_removed(key)
            })
            .collect();
        originals.sort_by_key(|(_, original)| original.index);

        let staged = self.staged.iter().filter_map(|(key, staged)| match staged {
            Staged::File(_) => Some(key.clone()),
            Staged::Dir => None,
        });
        Ok(originals
            .into_iter()
            .map(|(key, _)| key.clone())
            .chain(staged)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn archive_path(dir: &TempDir) -> PathBuf {
        dir.path().join("nested/store.zip")
    }

    fn reopen(path: &Path) -> ArchiveBackend {
        ArchiveBackend::open(path).unwrap()
    }

    /// Names in the directory holding `path`.
    fn entries_beside(path: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn open_creates_empty_container_with_magic() {
        let dir = TempDir::new().unwrap();
        let path = archive_path(&dir);
        ArchiveBackend::open(&path).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], &[0x50, 0x4B, 0x05, 0x06]);
    }

    #[test]
    fn staged_writes_are_visible_before_finish() {
        let dir = TempDir::new().unwrap();
        let mut view = ArchiveBackend::open(&archive_path(&dir)).unwrap();
        view.create_dir_all("a/b").unwrap();
        view.write("a/b/c.txt", b"hi", WriteMode::Create).unwrap();
        assert!(view.exists("a").unwrap());
        assert!(view.is_dir("a/b").unwrap());
        assert_eq!(view.read("a/b/c.txt").unwrap(), b"hi");
        assert_eq!(view.size("a/b/c.txt").unwrap(), 2);
    }

    #[test]
    fn finish_commits_and_preserves_existing_entries() {
        let dir = TempDir::new().unwrap();
        let path = archive_path(&dir);

        let mut view = ArchiveBackend::open(&path).unwrap();
        view.write("one.txt", b"1", WriteMode::Create).unwrap();
        view.finish().unwrap();

        let mut view = reopen(&path);
        view.write("two.txt", b"2", WriteMode::Create).unwrap();
        view.finish().unwrap();

        let mut view = reopen(&path);
        assert_eq!(view.read("one.txt").unwrap(), b"1");
        assert_eq!(view.read("two.txt").unwrap(), b"2");
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], &[0x50, 0x4B, 0x03, 0x04]);
        assert_eq!(entries_beside(&path), vec!["store.zip".to_string()]);
    }

    #[test]
    fn failed_commit_leaves_no_temporary_file() {
        let dir = TempDir::new().unwrap();
        let path = archive_path(&dir);
        let mut view = ArchiveBackend::open(&path).unwrap();
        view.write("f.txt", b"x", WriteMode::Create).unwrap();

        // A non-empty directory in place of the container makes the final
        // rename fail.
        fs::remove_file(&path).unwrap();
        fs::create_dir_all(path.join("occupied")).unwrap();

        assert!(view.finish().is_err());
        assert_eq!(entries_beside(&path), vec!["store.zip".to_string()]);
    }

    #[test]
    fn streamed_append_extends_staged_content() {
        let dir = TempDir::new().unwrap();
        let mut view = ArchiveBackend::open(&archive_path(&dir)).unwrap();
        let big = vec![7u8; COPY_CHUNK * 2 + 5];
        assert_eq!(
            view.write_from("s.bin", &mut big.as_slice(), WriteMode::Create)
                .unwrap(),
            big.len() as u64
        );
        view.write_from("s.bin", &mut &b"tail"[..], WriteMode::Append)
            .unwrap();
        let content = view.read("s.bin").unwrap();
        assert_eq!(content.len(), big.len() + 4);
        assert!(content.ends_with(b"tail"));
    }

    #[test]
    fn read_does_not_trust_recorded_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lying.zip");
        let mut writer = ZipWriter::new(File::create(&path).unwrap());
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("f.txt", stored).unwrap();
        writer.write_all(b"small").unwrap();
        writer.finish().unwrap();

        // Claim ~2 GiB of uncompressed data in the central directory.
        let mut bytes = fs::read(&path).unwrap();
        let header = bytes
            .windows(4)
            .position(|w| w == [0x50, 0x4B, 0x01, 0x02])
            .unwrap();
        bytes[header + 24..header + 28].copy_from_slice(&0x7FFF_FFF0u32.to_le_bytes());
        fs::write(&path, &bytes).unwrap();

        let mut view = reopen(&path);
        assert_eq!(view.size("f.txt").unwrap(), 0x7FFF_FFF0);
        assert_eq!(view.read("f.txt").unwrap(), b"small");
    }

    #[test]
    fn capacity_hint_is_capped() {
        assert_eq!(capacity_hint(5), 5);
        assert_eq!(capacity_hint(u64::MAX), MAX_PREALLOC as usize);
    }

    #[test]
    fn append_extends_committed_content() {
        let dir = TempDir::new().unwrap();
        let path = archive_path(&dir);

        let mut view = ArchiveBackend::open(&path).unwrap();
        view.write("f.txt", b"A", WriteMode::Create).unwrap();
        view.finish().unwrap();

        let mut view = reopen(&path);
        view.write("f.txt", b"B", WriteMode::Append).unwrap();
        view.finish().unwrap();

        let mut view = reopen(&path);
        let mut text = String::new();
        view.open_read("f.txt")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "AB");
    }

    #[test]
    fn remove_hides_subtree_and_commits() {
        let dir = TempDir::new().unwrap();
        let path = archive_path(&dir);

        let mut view = ArchiveBackend::open(&path).unwrap();
        view.create_dir_all("d").unwrap();
        view.write("d/x.txt", b"x", WriteMode::Create).unwrap();
        view.write("keep.txt", b"k", WriteMode::Create).unwrap();
        view.finish().unwrap();

        let mut view = reopen(&path);
        view.remove("d").unwrap();
        assert!(!view.exists("d/x.txt").unwrap());
        view.finish().unwrap();

        let mut view = reopen(&path);
        assert!(!view.exists("d").unwrap());
        assert_eq!(view.walk_files().unwrap(), vec!["keep.txt".to_string()]);
    }

    #[test]
    fn write_after_remove_is_visible() {
        let dir = TempDir::new().unwrap();
        let mut view = ArchiveBackend::open(&archive_path(&dir)).unwrap();
        view.write("f.txt", b"old", WriteMode::Create).unwrap();
        view.remove("f.txt").unwrap();
        view.write("f.txt", b"new", WriteMode::Create).unwrap();
        assert_eq!(view.read("f.txt").unwrap(), b"new");
    }

    #[test]
    fn missing_parent_and_missing_entry() {
        let dir = TempDir::new().unwrap();
        let mut view = ArchiveBackend::open(&archive_path(&dir)).unwrap();
        assert!(view.write("no/f.txt", b"x", WriteMode::Create).unwrap_err().is_not_found());
        assert!(view.read("absent").unwrap_err().is_not_found());
        assert!(view.size("absent").unwrap_err().is_not_found());
        view.remove("absent").unwrap();
    }

    #[test]
    fn unmodified_view_leaves_container_untouched() {
        let dir = TempDir::new().unwrap();
        let path = archive_path(&dir);
        ArchiveBackend::open(&path).unwrap();
        let before = fs::metadata(&path).unwrap().modified().unwrap();
        let mut view = reopen(&path);
        view.exists("x").unwrap();
        view.finish().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn is_under_respects_segment_boundaries() {
        assert!(is_under("a/b", "a"));
        assert!(is_under("a", "a"));
        assert!(!is_under("ab", "a"));
        assert!(is_under("anything", ""));
    }
}
