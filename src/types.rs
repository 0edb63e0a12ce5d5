//! Core types shared by storages, resources and backends.

use std::fmt;

use encoding_rs::Encoding;

/// Backend variant behind a storage root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum StorageType {
    /// A plain directory tree on the host filesystem.
    Directory,
    /// A zip-style archive file.
    Archive,
}

impl StorageType {
    /// Lowercase name used in messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Directory => "directory",
            StorageType::Archive => "archive",
        }
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text encoding used when resources are written from or read into strings.
///
/// Wraps an [`encoding_rs::Encoding`]. Decoding is lossy: malformed input is
/// replaced with U+FFFD rather than failing the read.
///
/// # Example
///
/// ```rust
/// use anystore::Charset;
///
/// let latin1 = Charset::for_label("latin1").unwrap();
/// assert_eq!(latin1.encode("é"), vec![0xE9]);
/// assert_eq!(latin1.decode(&[0xE9]), "é");
/// ```
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Charset(&'static Encoding);

impl Charset {
    /// UTF-8, the default for every storage.
    pub fn utf_8() -> Self {
        Charset(encoding_rs::UTF_8)
    }

    /// Look up a charset by its WHATWG label (`"utf-8"`, `"latin1"`, `"utf-16le"`, ...).
    ///
    /// Returns `None` for unknown labels.
    pub fn for_label(label: &str) -> Option<Self> {
        Encoding::for_label(label.trim().as_bytes()).map(Charset)
    }

    /// Canonical name of the encoding.
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Encode text into bytes.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        // encoding_rs only encodes into ASCII-compatible encodings.
        if self.0 == encoding_rs::UTF_16LE {
            return text.encode_utf16().flat_map(u16::to_le_bytes).collect();
        }
        if self.0 == encoding_rs::UTF_16BE {
            return text.encode_utf16().flat_map(u16::to_be_bytes).collect();
        }
        let (bytes, _, _) = self.0.encode(text);
        bytes.into_owned()
    }

    /// Decode bytes into text without BOM sniffing.
    pub fn decode(&self, bytes: &[u8]) -> String {
        let (text, _) = self.0.decode_without_bom_handling(bytes);
        text.into_owned()
    }
}

impl Default for Charset {
    fn default() -> Self {
        Charset::utf_8()
    }
}

impl fmt::Debug for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Charset").field(&self.name()).finish()
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a write treats the target entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Target is absent: create it.
    Create,
    /// Target exists: discard old content.
    Truncate,
    /// Target exists: keep old content and add to the end.
    Append,
}

impl WriteMode {
    /// Pick the mode from the current existence of the target and the caller's flag.
    ///
    /// The existence check and the write that follows are not atomic; a
    /// concurrent external writer can slip in between.
    pub fn resolve(exists: bool, append: bool) -> Self {
        match (exists, append) {
            (false, _) => WriteMode::Create,
            (true, false) => WriteMode::Truncate,
            (true, true) => WriteMode::Append,
        }
    }
}
