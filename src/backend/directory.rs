//! Directory-tree backend over the host filesystem.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::path::normalize_path;
use crate::traits::{BackendDir, BackendRead, BackendWrite, COPY_CHUNK};
use crate::{StorageError, WriteMode};

/// Backend view rooted at a host directory.
#[derive(Debug)]
pub struct DirectoryBackend {
    root: PathBuf,
}

impl DirectoryBackend {
    /// Open a view on `root`, creating the directory chain if it is missing.
    pub fn open(root: &Path) -> Result<Self, StorageError> {
        if !root.exists() {
            tracing::debug!(root = %root.display(), "creating directory root");
            fs::create_dir_all(root).map_err(|e| StorageError::io("create_dir_all", root, e))?;
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        if path.is_empty() {
            self.root.clone()
        } else {
            self.root.join(path)
        }
    }

    fn open_for(&self, path: &Path, mode: WriteMode) -> Result<File, StorageError> {
        let mut options = OpenOptions::new();
        match mode {
            WriteMode::Create => options.write(true).create(true).truncate(true),
            WriteMode::Truncate => options.write(true).truncate(true),
            WriteMode::Append => options.append(true),
        };
        options
            .open(path)
            .map_err(|e| StorageError::io("open_write", path, e))
    }
}

impl BackendRead for DirectoryBackend {
    fn exists(&mut self, path: &str) -> Result<bool, StorageError> {
        let full = self.resolve(path);
        full.try_exists()
            .map_err(|e| StorageError::io("exists", &full, e))
    }

    fn is_dir(&mut self, path: &str) -> Result<bool, StorageError> {
        let full = self.resolve(path);
        match fs::metadata(&full) {
            Ok(m) => Ok(m.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io("metadata", &full, e)),
        }
    }

    fn size(&mut self, path: &str) -> Result<u64, StorageError> {
        let full = self.resolve(path);
        fs::metadata(&full)
            .map(|m| m.len())
            .map_err(|e| StorageError::io("metadata", &full, e))
    }

    fn read(&mut self, path: &str) -> Result<Vec<u8>, StorageError> {
        let full = self.resolve(path);
        fs::read(&full).map_err(|e| StorageError::io("read", &full, e))
    }

    fn open_read(&mut self, path: &str) -> Result<Box<dyn Read + '_>, StorageError> {
        let full = self.resolve(path);
        let file = File::open(&full).map_err(|e| StorageError::io("open_read", &full, e))?;
        Ok(Box::new(file))
    }
}

impl BackendWrite for DirectoryBackend {
    fn write(&mut self, path: &str, data: &[u8], mode: WriteMode) -> Result<(), StorageError> {
        let full = self.resolve(path);
        let mut file = self.open_for(&full, mode)?;
        file.write_all(data)
            .map_err(|e| StorageError::io("write", &full, e))
    }

    fn write_from(
        &mut self,
        path: &str,
        reader: &mut dyn Read,
        mode: WriteMode,
    ) -> Result<u64, StorageError> {
        let full = self.resolve(path);
        let mut file = self.open_for(&full, mode)?;
        let mut buffer = [0u8; COPY_CHUNK];
        let mut copied = 0u64;
        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(StorageError::io("read_source", &full, e)),
            };
            file.write_all(&buffer[..n])
                .map_err(|e| StorageError::io("write", &full, e))?;
            copied += n as u64;
        }
        Ok(copied)
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path);
        let metadata = match fs::symlink_metadata(&full) {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StorageError::io("metadata", &full, e)),
        };
        if metadata.is_dir() {
            fs::remove_dir_all(&full).map_err(|e| StorageError::io("remove_dir_all", &full, e))
        } else {
            fs::remove_file(&full).map_err(|e| StorageError::io("remove_file", &full, e))
        }
    }

    fn create_dir_all(&mut self, path: &str) -> Result<(), StorageError> {
        let full = self.resolve(path);
        fs::create_dir_all(&full).map_err(|e| StorageError::io("create_dir_all", &full, e))
    }

    fn finish(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

impl BackendDir for DirectoryBackend {
    fn walk_files(&mut self) -> Result<Vec<String>, StorageError> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                StorageError::io("walk", path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let key = normalize_path(&relative.to_string_lossy());
            if !key.is_empty() {
                files.push(key);
            }
        }
        Ok(files)
    }
}
