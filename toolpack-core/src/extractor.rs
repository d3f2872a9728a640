//! Materializes bundled resources onto disk.
//!
//! Single executables are copied to a unique file under the temp root.
//! Executables with side-by-side support files live in a bundle
//! subdirectory; requesting `dir/tool` copies the whole `dir` subtree into a
//! unique temp directory so the tool finds its libraries and data next to it.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::bundle::{normalize_path, split_parent, ResourceBundle};
use crate::error::{Error, Result};
use crate::platform::PlatformAdapter;
use crate::workspace::{CleanupHandle, ExtractionWorkspace, WorkspaceGuard};

/// An extracted resource: where it is, and how to remove it.
#[derive(Debug, Clone)]
pub struct Materialized {
    /// Absolute path of the requested file.
    pub path: PathBuf,
    pub cleanup: CleanupHandle,
}

/// Copies bundle resources into fresh workspaces.
///
/// Holds no mutable state, so one extractor can serve any number of
/// concurrent callers; every call gets its own uniquely named workspace.
#[derive(Clone)]
pub struct Extractor {
    bundle: Arc<dyn ResourceBundle>,
    platform: Arc<dyn PlatformAdapter>,
}

impl Extractor {
    pub fn new(bundle: Arc<dyn ResourceBundle>, platform: Arc<dyn PlatformAdapter>) -> Self {
        Self { bundle, platform }
    }

    pub fn bundle(&self) -> &dyn ResourceBundle {
        self.bundle.as_ref()
    }

    pub fn platform(&self) -> &dyn PlatformAdapter {
        self.platform.as_ref()
    }

    /// Extracts `name`, as a tree if it has a directory component and as a
    /// single file otherwise.
    pub fn materialize(&self, name: &str) -> Result<Materialized> {
        let normalized = normalize_path(name)?;
        if normalized.is_empty() {
            return Err(Error::InvalidName {
                name: name.to_string(),
                reason: "empty name",
            });
        }

        if normalized.contains('/') {
            self.materialize_tree(&normalized)
        } else {
            self.materialize_file(&normalized)
        }
    }

    /// Copies one bundled file to `{temp_root}/{stem}-{uuid}{ext}` and marks
    /// it executable.
    ///
    /// Nothing is left on disk if any step fails.
    pub fn materialize_file(&self, name: &str) -> Result<Materialized> {
        self.materialize_file_through(name, |file| file)
    }

    /// `materialize_file`, writing the content through `sink(file)`.
    fn materialize_file_through<W, F>(&self, name: &str, sink: F) -> Result<Materialized>
    where
        W: Write,
        F: FnOnce(File) -> W,
    {
        let name = normalize_path(name)?;
        let data = self.bundle.read(&name)?;

        let temp_root = self.platform.temp_root()?;
        let (_, leaf) = split_parent(&name);
        let (workspace, file) = ExtractionWorkspace::create_file(&temp_root, leaf)?;
        let guard = WorkspaceGuard::new(workspace);

        write_and_close(sink(file), &data, guard.root())?;
        self.platform.ensure_executable(guard.root())?;

        let path = guard.root().to_path_buf();
        info!(
            resource = %name,
            path = %path.display(),
            bytes = data.len(),
            "Extracted bundled file"
        );

        Ok(Materialized {
            path,
            cleanup: guard.commit(),
        })
    }

    /// Copies the bundle directory containing `name` into a unique temp
    /// directory and returns the path of `name` inside the copy.
    ///
    /// `"suite/helper.bin"` copies all of `suite/` (including `suite/lib/...`)
    /// and returns `{temp_root}/suite-{uuid}/helper.bin`. If anything fails
    /// partway the partial copy is removed.
    pub fn materialize_tree(&self, name: &str) -> Result<Materialized> {
        let name = normalize_path(name)?;
        let (prefix, leaf) = split_parent(&name);
        if prefix.is_empty() {
            return Err(Error::InvalidName {
                name,
                reason: "tree extraction needs a directory component",
            });
        }

        // Check before touching disk so a missing tool is a clean NotFound.
        let leaf_is_file = self
            .bundle
            .list(prefix)?
            .iter()
            .any(|entry| !entry.is_directory && entry.name() == leaf);
        if !leaf_is_file {
            return Err(Error::not_in_bundle(name.as_str()));
        }

        let temp_root = self.platform.temp_root()?;
        let (_, dir_stem) = split_parent(prefix);
        let guard = WorkspaceGuard::new(ExtractionWorkspace::create_dir(&temp_root, dir_stem)?);

        let (dirs, files) = self.copy_tree(prefix, guard.root())?;

        let path = join_relative(guard.root(), leaf);
        self.platform.ensure_executable(&path)?;

        info!(
            resource = %name,
            path = %path.display(),
            dirs,
            files,
            "Extracted bundled tree"
        );

        Ok(Materialized {
            path,
            cleanup: guard.commit(),
        })
    }

    fn copy_tree(&self, prefix: &str, dest_root: &Path) -> Result<(usize, usize)> {
        let mut dirs = 0;
        let mut files = 0;

        for item in self.bundle.walk(prefix)? {
            let (rel, entry) = item.map_err(vanished_mid_walk)?;
            let dest = join_relative(dest_root, &rel);

            if entry.is_directory {
                fs::create_dir(&dest)
                    .map_err(|e| Error::io("Failed to create directory", &dest, e))?;
                dirs += 1;
                continue;
            }

            let data = self.bundle.read(&entry.path).map_err(vanished_mid_walk)?;
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&dest)
                .map_err(|e| Error::io("Failed to create", &dest, e))?;
            write_and_close(file, &data, &dest)?;

            if entry.executable {
                self.platform.ensure_executable(&dest)?;
            }

            debug!("Extracted {} -> {}", entry.path, dest.display());
            files += 1;
        }

        Ok((dirs, files))
    }
}

/// Writes `data` and closes the file before returning, so it can be removed
/// or executed on every platform.
fn write_and_close<W: Write>(mut writer: W, data: &[u8], path: &Path) -> Result<()> {
    writer
        .write_all(data)
        .and_then(|()| writer.flush())
        .map_err(|e| Error::io("Failed to write", path, e))
}

fn join_relative(root: &Path, rel: &str) -> PathBuf {
    rel.split('/')
        .filter(|s| !s.is_empty())
        .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
}

/// A bundle entry that disappears after the walk started is an environment
/// failure, not a missing tool; it must not trigger the system fallback.
fn vanished_mid_walk(e: Error) -> Error {
    match e {
        Error::NotFound { name, location } => Error::io(
            format!("Bundle entry vanished during extraction from {location}"),
            name,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ),
        other => other,
    }
}
