use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{normalize_path, BundleEntry, ResourceBundle, Walk};
use crate::error::{Error, Result};
use crate::platform::Platform;

/// A bundle served from an on-disk directory with the same layout as the
/// embedded one.
///
/// Useful during development to swap tools without rebuilding. Hidden
/// entries (leading `.`) are ignored, matching the build script.
#[derive(Debug, Clone)]
pub struct DirectoryBundle {
    root: PathBuf,
}

impl DirectoryBundle {
    /// Serves `root` directly.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Serves `{base}/{platform dir}`, e.g. `bundle/linux-x64`.
    pub fn for_platform(base: impl AsRef<Path>, platform: Platform) -> Self {
        Self::new(base.as_ref().join(platform.bundle_dir_name()))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, normalized: &str) -> PathBuf {
        normalized
            .split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, segment| acc.join(segment))
    }

    fn not_found(&self, name: &str) -> Error {
        Error::NotFound {
            name: name.to_string(),
            location: format!("bundle directory {}", self.root.display()),
        }
    }

    fn map_io(&self, name: &str, path: &Path, e: io::Error) -> Error {
        if e.kind() == io::ErrorKind::NotFound {
            self.not_found(name)
        } else {
            Error::io("Failed to read bundle", path, e)
        }
    }
}

impl ResourceBundle for DirectoryBundle {
    fn list(&self, dir: &str) -> Result<Vec<BundleEntry>> {
        let dir = normalize_path(dir)?;
        let path = self.resolve(&dir);

        let metadata = fs::metadata(&path).map_err(|e| self.map_io(&dir, &path, e))?;
        if !metadata.is_dir() {
            return Err(self.not_found(&dir));
        }

        let read_dir = fs::read_dir(&path).map_err(|e| self.map_io(&dir, &path, e))?;
        let mut entries = Vec::new();

        for item in read_dir {
            let item = item.map_err(|e| Error::io("Failed to list bundle", &path, e))?;
            let name = item.file_name();
            let name = name.to_string_lossy();
            if name.starts_with('.') {
                continue;
            }

            let child_path = item.path();
            let file_type = match item.file_type() {
                Ok(file_type) => file_type,
                Err(e) => {
                    debug!("Skipping unreadable bundle entry {}: {}", child_path.display(), e);
                    continue;
                }
            };

            // Symlinks to files are served as the file they point to. Symlinks
            // to directories are never descended into, so a walk stays finite.
            let metadata = match fs::metadata(&child_path) {
                Ok(metadata) => metadata,
                Err(e) => {
                    debug!("Skipping unreadable bundle entry {}: {}", child_path.display(), e);
                    continue;
                }
            };

            let rel = if dir.is_empty() {
                name.into_owned()
            } else {
                format!("{dir}/{name}")
            };

            if file_type.is_dir() {
                entries.push(BundleEntry::directory(rel));
            } else if metadata.is_file() {
                entries.push(BundleEntry::file(rel, is_executable(&metadata)));
            } else if file_type.is_symlink() {
                debug!("Skipping directory symlink {}", child_path.display());
            }
        }

        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    fn read(&self, path: &str) -> Result<Cow<'_, [u8]>> {
        let normalized = normalize_path(path)?;
        let full = self.resolve(&normalized);

        if normalized.is_empty() || full.is_dir() {
            return Err(self.not_found(&normalized));
        }

        fs::read(&full)
            .map(Cow::Owned)
            .map_err(|e| self.map_io(&normalized, &full, e))
    }

    fn walk(&self, root: &str) -> Result<Walk<'_>> {
        Walk::new(self, root)
    }
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn layout() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir_all(root.join("suite/lib")).unwrap();
        fs::write(root.join("suite/helper.bin"), b"helper").unwrap();
        fs::write(root.join("suite/lib/data.bin"), b"data").unwrap();
        fs::write(root.join("tool.bin"), b"0123456789").unwrap();
        fs::write(root.join(".gitkeep"), b"").unwrap();
        temp_dir
    }

    #[test]
    fn test_list_skips_hidden_and_sorts() {
        let temp_dir = layout();
        let bundle = DirectoryBundle::new(temp_dir.path());

        let names: Vec<_> = bundle
            .list("")
            .unwrap()
            .into_iter()
            .map(|e| (e.path, e.is_directory))
            .collect();
        assert_eq!(
            names,
            vec![("suite".to_string(), true), ("tool.bin".to_string(), false)]
        );
    }

    #[test]
    fn test_read_and_missing() {
        let temp_dir = layout();
        let bundle = DirectoryBundle::new(temp_dir.path());

        assert_eq!(bundle.read("suite/lib/data.bin").unwrap().as_ref(), b"data");
        assert!(bundle.read("suite").unwrap_err().is_not_found());
        assert!(bundle.read("nope.bin").unwrap_err().is_not_found());
        assert!(bundle.list("nope").unwrap_err().is_not_found());
        assert!(bundle.list("tool.bin").unwrap_err().is_not_found());
    }

    #[test]
    fn test_walk_matches_layout() {
        let temp_dir = layout();
        let bundle = DirectoryBundle::new(temp_dir.path());

        let walked: Vec<String> = bundle
            .walk("suite")
            .unwrap()
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(walked, vec!["helper.bin", "lib", "lib/data.bin"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit_is_reported() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = layout();
        let tool = temp_dir.path().join("tool.bin");
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

        let bundle = DirectoryBundle::new(temp_dir.path());
        let entry = bundle
            .list("")
            .unwrap()
            .into_iter()
            .find(|e| e.path == "tool.bin")
            .unwrap();
        assert!(entry.executable);
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_symlink_cycle_is_not_followed() {
        use std::os::unix::fs::symlink;

        let temp_dir = layout();
        let root = temp_dir.path();
        symlink("..", root.join("suite/lib/loop")).unwrap();
        symlink("data.bin", root.join("suite/lib/alias.bin")).unwrap();

        let bundle = DirectoryBundle::new(root);
        let walked: Vec<String> = bundle
            .walk("suite")
            .unwrap()
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(
            walked,
            vec!["helper.bin", "lib", "lib/alias.bin", "lib/data.bin"]
        );
        assert_eq!(bundle.read("suite/lib/alias.bin").unwrap().as_ref(), b"data");
    }

    #[test]
    fn test_for_platform_joins_dir_name() {
        let bundle = DirectoryBundle::for_platform("/opt/bundle", Platform::LinuxX64);
        assert!(bundle.root().ends_with("linux-x64"));
    }
}
