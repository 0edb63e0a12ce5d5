//! # Glob Matching
//!
//! Compiles path globs into anchored, case-insensitive matchers.
//!
//! ## Syntax
//!
//! | Pattern | Matches |
//! |---------|---------|
//! | `*` | zero or more characters, not crossing `/` |
//! | `**` | zero or more characters, crossing `/` |
//! | `?` | exactly one character other than `/` |
//! | `[abc]`, `[a-z]` | one character from the class (never `/`) |
//! | `[!abc]` | one character not in the class (never `/`) |
//! | `{a,b,c}` | any of the alternatives (not nestable) |
//! | `\x` | the character `x`, literally |
//!
//! Inside a class a leading `-` or `^` (after an optional `!`) is literal,
//! as is a trailing `-`.
//!
//! The whole candidate path must match. A glob without `**` (or a leading
//! `*`) therefore only selects entries whose every segment it spells out:
//!
//! ```rust
//! use anystore::glob::GlobMatcher;
//!
//! let m = GlobMatcher::compile("*.txt").unwrap();
//! assert!(m.matches("john.TXT"));
//! assert!(!m.matches("first/john.txt"));
//!
//! let m = GlobMatcher::compile("**/*.{txt,md}").unwrap();
//! assert!(m.matches("first/john.md"));
//! ```

use std::fmt;

use regex::Regex;

use crate::StorageError;

/// A compiled glob.
///
/// Matchers are not cached; each enumeration compiles its own.
#[derive(Debug, Clone)]
pub struct GlobMatcher {
    glob: String,
    regex: Regex,
}

impl GlobMatcher {
    /// Compile a glob pattern.
    ///
    /// # Errors
    ///
    /// - [`StorageError::PatternSyntax`] with the character index of the
    ///   problem: dangling `\`, unterminated or empty `[...]`, `/` inside a
    ///   class, out-of-order range, nested or unterminated `{`.
    pub fn compile(glob: &str) -> Result<Self, StorageError> {
        let source = translate(glob)?;
        let regex = Regex::new(&source).map_err(|_| StorageError::PatternSyntax {
            pattern: glob.to_string(),
            index: 0,
            reason: "pattern too complex",
        })?;
        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    /// Test a normalized relative path against the glob.
    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    /// The source glob.
    pub fn as_str(&self) -> &str {
        &self.glob
    }
}

impl fmt::Display for GlobMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "glob: {} (regex: {})", self.glob, self.regex.as_str())
    }
}

// ============================================================================
// Translation
// ============================================================================

/// Characters with meaning inside a regex class.
const CLASS_META: &[char] = &['\\', '[', ']', '&', '-', '~', '^'];

fn syntax_error(glob: &str, index: usize, reason: &'static str) -> StorageError {
    StorageError::PatternSyntax {
        pattern: glob.to_string(),
        index,
        reason,
    }
}

fn push_literal(regex: &mut String, c: char) {
    let mut buf = [0u8; 4];
    regex.push_str(&regex::escape(c.encode_utf8(&mut buf)));
}

fn push_class_char(class: &mut String, c: char) {
    if CLASS_META.contains(&c) {
        class.push('\\');
    }
    class.push(c);
}

fn translate(glob: &str) -> Result<String, StorageError> {
    let chars: Vec<char> = glob.chars().collect();
    let mut regex = String::from("(?is)^");
    let mut in_group = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            '\\' => {
                let Some(&next) = chars.get(i) else {
                    return Err(syntax_error(glob, i - 1, "no character to escape"));
                };
                push_literal(&mut regex, next);
                i += 1;
            }
            '/' => regex.push('/'),
            '[' => i = translate_class(glob, &chars, i, &mut regex)?,
            '{' => {
                if in_group {
                    return Err(syntax_error(glob, i - 1, "cannot nest groups"));
                }
                regex.push_str("(?:(?:");
                in_group = true;
            }
            '}' if in_group => {
                regex.push_str("))");
                in_group = false;
            }
            ',' if in_group => regex.push_str(")|(?:"),
            '*' => {
                if chars.get(i) == Some(&'*') {
                    regex.push_str(".*");
                    i += 1;
                } else {
                    regex.push_str("[^/]*");
                }
            }
            '?' => regex.push_str("[^/]"),
            other => push_literal(&mut regex, other),
        }
    }

    if in_group {
        return Err(syntax_error(glob, chars.len().saturating_sub(1), "missing '}'"));
    }
    regex.push('$');
    Ok(regex)
}

/// Translate a `[...]` class starting just after the `[` at `start`.
/// Returns the index just past the closing `]`.
fn translate_class(
    glob: &str,
    chars: &[char],
    start: usize,
    regex: &mut String,
) -> Result<usize, StorageError> {
    let mut i = start;
    let mut negated = false;
    let mut body = String::new();

    if chars.get(i) == Some(&'!') {
        negated = true;
        i += 1;
    }
    if let Some(&(c @ ('-' | '^'))) = chars.get(i) {
        push_class_char(&mut body, c);
        i += 1;
    }

    let mut range_start: Option<char> = None;
    let mut closed = false;
    while i < chars.len() {
        let c = chars[i];
        i += 1;
        match c {
            ']' => {
                closed = true;
                break;
            }
            '/' => return Err(syntax_error(glob, i - 1, "explicit name separator in class")),
            '-' => {
                let Some(low) = range_start.take() else {
                    return Err(syntax_error(glob, i - 1, "invalid range"));
                };
                match chars.get(i) {
                    None => break,
                    Some(']') => {
                        // trailing '-' is literal
                        push_class_char(&mut body, '-');
                        i += 1;
                        closed = true;
                        break;
                    }
                    Some(&high) => {
                        if high == '/' {
                            return Err(syntax_error(glob, i, "explicit name separator in class"));
                        }
                        if high < low {
                            return Err(syntax_error(glob, i - 2, "invalid range"));
                        }
                        body.push('-');
                        push_class_char(&mut body, high);
                        i += 1;
                    }
                }
            }
            other => {
                push_class_char(&mut body, other);
                range_start = Some(other);
            }
        }
    }

    if !closed {
        return Err(syntax_error(glob, i.saturating_sub(1), "missing ']'"));
    }
    if body.is_empty() {
        return Err(syntax_error(glob, i - 1, "empty character class"));
    }

    regex.push_str("[[^/]&&[");
    if negated {
        regex.push('^');
    }
    regex.push_str(&body);
    regex.push_str("]]");
    Ok(i)
}

// ============================================================================
// Tests
// ============================================================================
