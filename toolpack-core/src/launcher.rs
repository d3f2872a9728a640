//! Turns a logical tool name into a ready-to-run child process.
//!
//! The `ProcessLauncher` is the main entry point. It coordinates the
//! extractor (bundled copy first) and the system search path (fallback),
//! then hands back a configured [`ProcessDescriptor`] together with the
//! cleanup handle the caller releases after the process exits.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::bundle::{normalize_path, split_parent, DirectoryBundle, EmbeddedBundle, ResourceBundle};
use crate::config::LauncherConfig;
use crate::error::{Error, Result};
use crate::extractor::Extractor;
use crate::platform::{NativePlatform, Platform};
use crate::process::ProcessDescriptor;
use crate::workspace::CleanupHandle;

// ============================================================================
// Resolution Result
// ============================================================================

/// Where a tool was found.
#[derive(Debug, Clone)]
pub enum ResolvedExecutable {
    /// Extracted from the bundle; the workspace must be released after use.
    Bundled { path: PathBuf, cleanup: CleanupHandle },
    /// A pre-existing system binary the launcher does not own.
    System { path: PathBuf },
}

impl ResolvedExecutable {
    pub fn path(&self) -> &Path {
        match self {
            Self::Bundled { path, .. } | Self::System { path } => path,
        }
    }

    pub fn is_bundled(&self) -> bool {
        matches!(self, Self::Bundled { .. })
    }

    /// Splits into the executable path and its cleanup handle (a no-op
    /// handle for system binaries).
    pub fn into_parts(self) -> (PathBuf, CleanupHandle) {
        match self {
            Self::Bundled { path, cleanup } => (path, cleanup),
            Self::System { path } => (path, CleanupHandle::noop()),
        }
    }
}

// ============================================================================
// Launched Tool
// ============================================================================

/// A configured process plus the workspace it runs from.
///
/// The caller starts the process, waits for it (or cancels it), and calls
/// `cleanup.cleanup()` only after it has fully exited. [`run`](Self::run)
/// does all three in that order.
#[derive(Debug)]
pub struct LaunchedTool {
    pub descriptor: ProcessDescriptor,
    pub cleanup: CleanupHandle,
}

impl LaunchedTool {
    /// Runs the process to completion (or cancellation), then releases the
    /// workspace.
    pub async fn run(self) -> Result<ExitStatus> {
        let result = self.descriptor.run().await;
        self.cleanup.cleanup();
        result
    }
}

// ============================================================================
// Process Launcher
// ============================================================================

/// Resolves and launches bundled tools, falling back to the system path.
///
/// Cheap to clone and safe to share across threads and tasks.
#[derive(Clone)]
pub struct ProcessLauncher {
    extractor: Extractor,
    system_fallback: bool,
    search_path: Option<OsString>,
}

impl ProcessLauncher {
    /// Creates a launcher with system fallback on `PATH` enabled.
    pub fn new(extractor: Extractor) -> Self {
        Self {
            extractor,
            system_fallback: true,
            search_path: None,
        }
    }

    /// Builds the production launcher: the embedded bundle (or this
    /// platform's directory under the configured bundle root) and the native
    /// platform adapter.
    pub fn from_config(config: &LauncherConfig) -> Self {
        let bundle: Arc<dyn ResourceBundle> = match &config.bundle_dir {
            Some(dir) => {
                let bundle = match Platform::detect() {
                    Some(platform) => DirectoryBundle::for_platform(dir, platform),
                    None => DirectoryBundle::new(dir),
                };
                info!(dir = %bundle.root().display(), "Using on-disk bundle");
                Arc::new(bundle)
            }
            None => Arc::new(EmbeddedBundle::for_current_platform()),
        };
        let platform = Arc::new(NativePlatform::new(config));

        let mut launcher = Self::new(Extractor::new(bundle, platform))
            .with_system_fallback(config.system_fallback);
        if let Some(path) = &config.search_path {
            launcher = launcher.with_search_path(path);
        }
        launcher
    }

    pub fn with_system_fallback(mut self, enabled: bool) -> Self {
        self.system_fallback = enabled;
        self
    }

    /// Searches `paths` (a `PATH`-style list) instead of `PATH` on fallback.
    pub fn with_search_path(mut self, paths: impl Into<OsString>) -> Self {
        self.search_path = Some(paths.into());
        self
    }

    pub fn extractor(&self) -> &Extractor {
        &self.extractor
    }

    /// Finds `tool`, extracting it from the bundle if present.
    ///
    /// Only a "not in the bundle" failure falls back to the system search
    /// path; any other extraction error is returned as-is. When both lookups
    /// fail the error carries both causes.
    pub fn resolve(&self, tool: &str) -> Result<ResolvedExecutable> {
        let name = logical_name(tool)?;
        let suffix = self.extractor.platform().executable_suffix();
        let bundled_name = format!("{name}{suffix}");

        let embedded = match self.extractor.materialize(&bundled_name) {
            Ok(materialized) => {
                return Ok(ResolvedExecutable::Bundled {
                    path: materialized.path,
                    cleanup: materialized.cleanup,
                })
            }
            Err(e) if e.is_not_found() && self.system_fallback => e,
            Err(e) => return Err(e),
        };

        debug!(tool = %name, "Not bundled, searching system path");

        // The system lookup applies its own suffix rules (PATHEXT).
        let (_, leaf) = split_parent(&name);
        match self.lookup_system(leaf) {
            Ok(path) => {
                info!(tool = %name, path = %path.display(), "Using system executable");
                Ok(ResolvedExecutable::System { path })
            }
            Err(system) => Err(Error::Resolution {
                tool: name,
                embedded: Box::new(embedded),
                system,
            }),
        }
    }

    /// Resolves `tool` and prepares a process for it, bound to `token`.
    ///
    /// Returns [`Error::Cancelled`] if `token` is cancelled before or during
    /// resolution; in that case no workspace is left behind.
    pub fn launch<I, S>(&self, tool: &str, args: I, token: CancellationToken) -> Result<LaunchedTool>
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        if token.is_cancelled() {
            return Err(Error::Cancelled {
                tool: tool.to_string(),
            });
        }

        let (path, cleanup) = self.resolve(tool)?.into_parts();

        if token.is_cancelled() {
            cleanup.cleanup();
            return Err(Error::Cancelled {
                tool: tool.to_string(),
            });
        }

        let mut descriptor = ProcessDescriptor::new(path, args).with_cancellation(token);
        self.extractor.platform().configure_process(&mut descriptor);

        info!(
            tool = %tool,
            path = %descriptor.program().display(),
            bundled = !cleanup.is_noop(),
            "Prepared tool launch"
        );

        Ok(LaunchedTool {
            descriptor,
            cleanup,
        })
    }

    fn lookup_system(&self, name: &str) -> std::result::Result<PathBuf, which::Error> {
        match &self.search_path {
            Some(paths) => {
                // The cwd only matters for names with a path separator, which
                // a leaf never has.
                let cwd = std::env::current_dir().unwrap_or_default();
                which::which_in(name, Some(paths), cwd)
            }
            None => which::which(name),
        }
    }
}

fn logical_name(tool: &str) -> Result<String> {
    let name = normalize_path(tool)?;
    if name.is_empty() {
        return Err(Error::InvalidName {
            name: tool.to_string(),
            reason: "empty name",
        });
    }
    Ok(name)
}
