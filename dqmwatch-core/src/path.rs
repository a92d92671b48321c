//! Slash-separated directory paths.

use core::fmt;

/// A normalized directory path.
///
/// Normalization collapses `//` into `/` and drops `/./` segments. A path
/// starting with `/` is absolute and resolves from the root; any other path
/// resolves from the current directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct DirPath {
    path: String,
}

impl DirPath {
    /// Create and normalize a path.
    pub fn new(path: impl Into<String>) -> Self {
        let mut path = path.into();
        while path.contains("//") {
            path = path.replace("//", "/");
        }
        while path.contains("/./") {
            path = path.replace("/./", "/");
        }
        Self { path }
    }

    /// The normalized path string.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Whether the path contains only allowed characters.
    pub fn is_valid(&self) -> bool {
        !contains_special_characters(&self.path)
    }

    /// Whether the path starts at the root.
    pub fn is_absolute(&self) -> bool {
        self.path.starts_with('/')
    }

    /// Non-empty segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('/').filter(|s| !s.is_empty())
    }

    /// Append `other` with exactly one separator between the two.
    pub fn join(&self, other: impl AsRef<str>) -> DirPath {
        let other = other.as_ref();
        if other.is_empty() {
            return self.clone();
        }
        if self.path.is_empty() {
            return DirPath::new(other);
        }
        let head = self.path.trim_end_matches('/');
        let tail = other.trim_start_matches('/');
        DirPath::new(format!("{head}/{tail}"))
    }
}

impl fmt::Display for DirPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl From<&str> for DirPath {
    fn from(path: &str) -> Self {
        DirPath::new(path)
    }
}

impl From<String> for DirPath {
    fn from(path: String) -> Self {
        DirPath::new(path)
    }
}

/// Whether `name` has characters outside `[A-Za-z0-9_-./ ]`.
pub fn contains_special_characters(name: &str) -> bool {
    name.chars()
        .any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ' ')))
}

/// Whether `name` can name a directory or an object.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/') && !contains_special_characters(name)
}
