//! Extraction workspaces and their cleanup handles.
//!
//! Every extraction writes into a fresh, uniquely named file or directory
//! under the temp root. While extraction is in progress the workspace is
//! held by a [`WorkspaceGuard`], which removes it on drop; a successful
//! extraction commits the guard into a [`CleanupHandle`] for the caller.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Fresh names tried before giving up on an `AlreadyExists` collision.
const CREATE_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkspaceKind {
    File,
    Directory,
}

/// A uniquely named temp file or directory tree owned by one extraction.
#[derive(Debug)]
pub struct ExtractionWorkspace {
    root: PathBuf,
    kind: WorkspaceKind,
    created_at: DateTime<Utc>,
    alive: AtomicBool,
}

impl ExtractionWorkspace {
    /// Creates `{temp_root}/{stem}-{uuid}{.ext}` exclusively and returns it
    /// with the open file.
    pub(crate) fn create_file(temp_root: &Path, file_name: &str) -> Result<(Self, File)> {
        let (stem, ext) = split_extension(file_name);
        let mut last_err = None;

        for _ in 0..CREATE_ATTEMPTS {
            let path = temp_root.join(unique_name(stem, ext));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((Self::new(path, WorkspaceKind::File), file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last_err = Some((path, e)),
                Err(e) => return Err(Error::io("Failed to create workspace file", path, e)),
            }
        }

        Err(exhausted(temp_root, last_err))
    }

    /// Creates `{temp_root}/{stem}-{uuid}/` exclusively.
    pub(crate) fn create_dir(temp_root: &Path, stem: &str) -> Result<Self> {
        let mut last_err = None;

        for _ in 0..CREATE_ATTEMPTS {
            let path = temp_root.join(unique_name(stem, ""));
            match fs::create_dir(&path) {
                Ok(()) => return Ok(Self::new(path, WorkspaceKind::Directory)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => last_err = Some((path, e)),
                Err(e) => return Err(Error::io("Failed to create workspace directory", path, e)),
            }
        }

        Err(exhausted(temp_root, last_err))
    }

    fn new(root: PathBuf, kind: WorkspaceKind) -> Self {
        debug!(path = %root.display(), ?kind, "Created workspace");
        Self {
            root,
            kind,
            created_at: Utc::now(),
            alive: AtomicBool::new(true),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind(&self) -> WorkspaceKind {
        self.kind
    }

    /// Creation time, for diagnostics.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Removes the workspace from disk. Only the first call does anything.
    /// Failures are logged, not returned.
    fn remove(&self) {
        if !self.alive.swap(false, Ordering::AcqRel) {
            return;
        }

        let result = match self.kind {
            WorkspaceKind::File => fs::remove_file(&self.root),
            WorkspaceKind::Directory => fs::remove_dir_all(&self.root),
        };

        match result {
            Ok(()) => debug!(path = %self.root.display(), "Removed workspace"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.root.display(), "Workspace already gone");
            }
            Err(e) => warn!(
                "Failed to remove workspace {} (created {}): {}",
                self.root.display(),
                self.created_at.to_rfc3339(),
                e
            ),
        }
    }
}

/// Owns a workspace during extraction and removes it unless committed.
pub(crate) struct WorkspaceGuard {
    workspace: Option<Arc<ExtractionWorkspace>>,
}

impl WorkspaceGuard {
    pub(crate) fn new(workspace: ExtractionWorkspace) -> Self {
        Self {
            workspace: Some(Arc::new(workspace)),
        }
    }

    pub(crate) fn root(&self) -> &Path {
        self.workspace
            .as_deref()
            .map(ExtractionWorkspace::root)
            .unwrap_or_else(|| Path::new(""))
    }

    /// Hands the workspace to the caller.
    pub(crate) fn commit(mut self) -> CleanupHandle {
        CleanupHandle {
            workspace: self.workspace.take(),
        }
    }
}

impl Drop for WorkspaceGuard {
    fn drop(&mut self) {
        if let Some(workspace) = self.workspace.take() {
            debug!(path = %workspace.root().display(), "Rolling back workspace");
            workspace.remove();
        }
    }
}

/// Removes the workspace it is paired with.
///
/// Idempotent: the first [`cleanup`](Self::cleanup) removes the workspace,
/// later calls (on this handle or any clone) do nothing. A handle for a
/// system-path tool owns nothing and is always a no-op.
///
/// Dropping a handle does *not* remove the workspace. Call `cleanup` once the
/// process using the extracted file has fully exited; removing it while the
/// process still has the file open is undefined on some platforms.
#[derive(Debug, Clone, Default)]
pub struct CleanupHandle {
    workspace: Option<Arc<ExtractionWorkspace>>,
}

impl CleanupHandle {
    /// A handle that owns nothing.
    pub fn noop() -> Self {
        Self::default()
    }

    pub fn is_noop(&self) -> bool {
        self.workspace.is_none()
    }

    pub fn workspace(&self) -> Option<&ExtractionWorkspace> {
        self.workspace.as_deref()
    }

    /// Removes the workspace. Never fails; removal errors are logged.
    pub fn cleanup(&self) {
        if let Some(workspace) = &self.workspace {
            workspace.remove();
        }
    }
}

fn unique_name(stem: &str, ext: &str) -> String {
    format!("{}-{}{}", stem, Uuid::new_v4().simple(), ext)
}

/// Splits `"tool.exe"` into `("tool", ".exe")`. Leading-dot names keep the
/// dot in the stem.
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if idx > 0 => file_name.split_at(idx),
        _ => (file_name, ""),
    }
}

fn exhausted(temp_root: &Path, last_err: Option<(PathBuf, io::Error)>) -> Error {
    match last_err {
        Some((path, e)) => Error::io("Could not find a free workspace name", path, e),
        None => Error::io(
            "Could not find a free workspace name",
            temp_root,
            io::Error::from(io::ErrorKind::AlreadyExists),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("tool.exe"), ("tool", ".exe"));
        assert_eq!(split_extension("tool"), ("tool", ""));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(split_extension(".hidden"), (".hidden", ""));
    }

    #[test]
    fn test_file_workspace_keeps_extension() {
        let temp_dir = TempDir::new().unwrap();
        let (workspace, _file) =
            ExtractionWorkspace::create_file(temp_dir.path(), "tool.exe").unwrap();

        let name = workspace.root().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("tool-"), "{name}");
        assert!(name.ends_with(".exe"), "{name}");
        assert_eq!(workspace.kind(), WorkspaceKind::File);
        assert!(workspace.is_alive());
    }

    #[test]
    fn test_names_are_unique() {
        let temp_dir = TempDir::new().unwrap();
        let a = ExtractionWorkspace::create_dir(temp_dir.path(), "suite").unwrap();
        let b = ExtractionWorkspace::create_dir(temp_dir.path(), "suite").unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn test_guard_rolls_back_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = ExtractionWorkspace::create_dir(temp_dir.path(), "suite").unwrap();
        let root = workspace.root().to_path_buf();
        fs::write(root.join("partial.bin"), b"x").unwrap();

        drop(WorkspaceGuard::new(workspace));
        assert!(!root.exists());
    }

    #[test]
    fn test_committed_workspace_survives_until_cleanup() {
        let temp_dir = TempDir::new().unwrap();
        let (workspace, file) = ExtractionWorkspace::create_file(temp_dir.path(), "tool").unwrap();
        drop(file);
        let root = workspace.root().to_path_buf();

        let handle = WorkspaceGuard::new(workspace).commit();
        assert!(root.exists());
        assert!(!handle.is_noop());

        handle.cleanup();
        assert!(!root.exists());
        assert!(!handle.workspace().unwrap().is_alive());
    }

    #[test]
    fn test_cleanup_is_idempotent_across_clones() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = ExtractionWorkspace::create_dir(temp_dir.path(), "suite").unwrap();
        let root = workspace.root().to_path_buf();

        let handle = WorkspaceGuard::new(workspace).commit();
        let clone = handle.clone();

        handle.cleanup();
        handle.cleanup();
        clone.cleanup();
        assert!(!root.exists());
    }

    #[test]
    fn test_cleanup_does_not_touch_other_workspaces() {
        let temp_dir = TempDir::new().unwrap();
        let create = || ExtractionWorkspace::create_dir(temp_dir.path(), "a").unwrap();
        let first = WorkspaceGuard::new(create()).commit();
        let second = WorkspaceGuard::new(create()).commit();

        first.cleanup();
        first.cleanup();

        let second_root = second.workspace().unwrap().root();
        assert!(second_root.exists());
        second.cleanup();
    }

    #[test]
    fn test_noop_handle() {
        let handle = CleanupHandle::noop();
        assert!(handle.is_noop());
        handle.cleanup();
        handle.cleanup();
    }

    #[test]
    fn test_cleanup_tolerates_externally_removed_workspace() {
        let temp_dir = TempDir::new().unwrap();
        let workspace = ExtractionWorkspace::create_dir(temp_dir.path(), "gone").unwrap();
        let handle = WorkspaceGuard::new(workspace).commit();

        fs::remove_dir_all(handle.workspace().unwrap().root()).unwrap();
        handle.cleanup();
    }
}
