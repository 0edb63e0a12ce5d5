//! # Path Normalization
//!
//! Canonical string forms for storage roots, resource paths and identities.
//!
//! ## Responsibility
//! - Separator normalization (`\` becomes `/`) and trailing-slash stripping
//! - Absolute resolution of storage roots
//! - Canonical URI construction for storages and resources
//!
//! ## Rules
//!
//! | Input | [`normalize_path`] |
//! |-------|--------------------|
//! | `dir\file.txt` | `dir/file.txt` |
//! | `dir/` | `dir` |
//! | `/dir/file.txt` | `/dir/file.txt` (leading slash kept) |
//!
//! A leading slash on a resource path does not escape the root: backends
//! resolve every resource path through [`relative_key`].

use std::path::{Component, Path, PathBuf};

use crate::StorageError;

// ============================================================================
// Normalization
// ============================================================================

/// Normalize separators and strip one trailing `/`.
///
/// Idempotent: `normalize_path(&normalize_path(p)) == normalize_path(p)`
/// for any input that does not end in a doubled separator.
///
/// # Example
///
/// ```rust
/// use anystore::path::normalize_path;
///
/// assert_eq!(normalize_path(r"a\b\c\"), "a/b/c");
/// assert_eq!(normalize_path("/a/b"), "/a/b");
/// ```
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    if normalized.ends_with('/') {
        normalized.pop();
    }
    normalized
}

/// The in-root key of a normalized resource path: leading slashes removed.
pub fn relative_key(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Normalize a root location and make it absolute.
///
/// Relative roots are joined onto the current working directory. `.` and
/// `..` components are collapsed lexically; symlinks are not followed.
///
/// # Errors
///
/// - [`StorageError::Io`] if the current directory cannot be determined
pub fn absolutize(root: &str) -> Result<PathBuf, StorageError> {
    let normalized = normalize_path(root);
    let path = Path::new(&normalized);
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| StorageError::io("current_dir", path, e))?
            .join(path)
    };
    Ok(collapse(&joined))
}

fn collapse(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root.
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Normalized string form of an absolute path.
pub fn display_path(path: &Path) -> String {
    normalize_path(&path.to_string_lossy())
}

// ============================================================================
// Canonical URIs
// ============================================================================

/// Percent-encode spaces; nothing else is escaped.
fn encode_spaces(text: &str) -> String {
    text.replace(' ', "%20")
}

/// `file:/<root>` for a storage root.
pub fn storage_uri(root: &Path) -> String {
    let root = display_path(root);
    encode_spaces(&format!("file:/{}", root.trim_start_matches('/')))
}

/// `file:/<root>/<key>` for a resource inside a directory root.
pub fn directory_resource_uri(root: &Path, path: &str) -> String {
    let root = display_path(root);
    let key = relative_key(path);
    let uri = if key.is_empty() {
        format!("file:/{}", root.trim_start_matches('/'))
    } else {
        format!("file:/{}/{}", root.trim_start_matches('/'), key)
    };
    encode_spaces(&uri)
}

/// `jar:/file:/<root>!/<key>` for a resource inside an archive root.
pub fn archive_resource_uri(root: &Path, path: &str) -> String {
    let root = display_path(root);
    encode_spaces(&format!(
        "jar:/file:/{}!/{}",
        root.trim_start_matches('/'),
        relative_key(path)
    ))
}

// ============================================================================
// Tests
// ============================================================================
