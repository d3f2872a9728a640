//! Read-only bundle of per-platform tool resources.
//!
//! A bundle is a tiny virtual filesystem addressed by `/`-separated relative
//! paths. `""` is the root. Only the current platform's resources are ever
//! visible; the build script never compiles in another platform's files.
//!
//! # Architecture
//!
//! - [`ResourceBundle`]: the trait the extractor consumes
//! - [`EmbeddedBundle`]: files compiled into the binary (or assembled in memory)
//! - [`DirectoryBundle`]: the same layout served from disk
//! - [`Walk`]: lazy depth-first traversal shared by all implementations

use std::borrow::Cow;

use crate::error::{Error, Result};

mod directory;
mod embedded;
mod walk;

pub use directory::DirectoryBundle;
pub use embedded::{BundledFile, EmbeddedBundle};
pub use walk::Walk;

/// One file or directory inside a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BundleEntry {
    /// Bundle-relative path, `/`-separated, no leading slash.
    pub path: String,
    pub is_directory: bool,
    /// Whether the source file carried an executable bit at build time.
    /// Always `false` for directories.
    pub executable: bool,
}

impl BundleEntry {
    pub fn file(path: impl Into<String>, executable: bool) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
            executable,
        }
    }

    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_directory: true,
            executable: false,
        }
    }

    /// Last path segment.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Read-only access to bundled resources.
///
/// Implementations are immutable after construction and safe to share
/// between threads without locking.
pub trait ResourceBundle: Send + Sync {
    /// Direct children of `dir`, sorted by name.
    ///
    /// Fails with [`Error::NotFound`] if `dir` does not exist or is a file.
    fn list(&self, dir: &str) -> Result<Vec<BundleEntry>>;

    /// Contents of the file at `path`.
    ///
    /// Fails with [`Error::NotFound`] if `path` is absent or a directory.
    fn read(&self, path: &str) -> Result<Cow<'_, [u8]>>;

    /// Depth-first, name-ordered traversal of everything below `root`.
    fn walk(&self, root: &str) -> Result<Walk<'_>>;
}

/// Normalizes a bundle path: backslashes become `/`, empty and `.` segments
/// are dropped. Absolute paths and `..` segments are rejected.
pub fn normalize_path(name: &str) -> Result<String> {
    let invalid = |reason| Error::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.starts_with(['/', '\\']) || has_drive_prefix(name) {
        return Err(invalid("absolute paths are not allowed"));
    }

    let mut segments = Vec::new();
    for segment in name.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid("parent directory references are not allowed")),
            s => segments.push(s),
        }
    }

    Ok(segments.join("/"))
}

fn has_drive_prefix(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Splits a normalized path into `(parent, leaf)`. The parent of a
/// top-level entry is `""`.
pub fn split_parent(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((parent, leaf)) => (parent, leaf),
        None => ("", path),
    }
}
