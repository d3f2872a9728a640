//! Operating-system facts needed to extract and launch tools.
//!
//! Extraction workspaces live under a per-application temp root:
//!
//! - Linux: `$XDG_RUNTIME_DIR/toolpack/`, else `/tmp/toolpack/`
//! - macOS: `/var/folders/.../toolpack/` (per-user temp via `std::env::temp_dir`)
//! - Windows: `%ProgramData%\toolpack\`, else `%LOCALAPPDATA%\toolpack\`,
//!   else `%TEMP%\toolpack\`
//!
//! An explicit `temp_root` in [`LauncherConfig`] replaces the whole chain.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LauncherConfig;
use crate::error::{Error, Result};
use crate::process::ProcessDescriptor;

/// Environment variables consulted, in order, for the temp root base.
#[cfg(windows)]
pub const TEMP_ROOT_ENV_VARS: &[&str] = &["ProgramData", "LOCALAPPDATA"];
#[cfg(not(windows))]
pub const TEMP_ROOT_ENV_VARS: &[&str] = &["XDG_RUNTIME_DIR"];

/// `CREATE_NO_WINDOW`: the child gets no console window.
pub const CREATE_NO_WINDOW: u32 = 0x0800_0000;

// ============================================================================
// Platform Detection
// ============================================================================

/// A supported OS + architecture pair. Each has its own bundle directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    LinuxX64,
    LinuxArm64,
    MacosX64,
    MacosArm64,
    WindowsX64,
}

impl Platform {
    /// Detects the platform this binary was compiled for.
    ///
    /// Returns `None` if the platform is unsupported.
    pub fn detect() -> Option<Self> {
        #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
        {
            Some(Platform::LinuxX64)
        }
        #[cfg(all(target_os = "linux", target_arch = "aarch64"))]
        {
            Some(Platform::LinuxArm64)
        }
        #[cfg(all(target_os = "macos", target_arch = "x86_64"))]
        {
            Some(Platform::MacosX64)
        }
        #[cfg(all(target_os = "macos", target_arch = "aarch64"))]
        {
            Some(Platform::MacosArm64)
        }
        #[cfg(all(target_os = "windows", target_arch = "x86_64"))]
        {
            Some(Platform::WindowsX64)
        }
        #[cfg(not(any(
            all(target_os = "linux", target_arch = "x86_64"),
            all(target_os = "linux", target_arch = "aarch64"),
            all(target_os = "macos", target_arch = "x86_64"),
            all(target_os = "macos", target_arch = "aarch64"),
            all(target_os = "windows", target_arch = "x86_64"),
        )))]
        {
            None
        }
    }

    /// Name of this platform's directory in the bundle source tree.
    pub fn bundle_dir_name(&self) -> &'static str {
        match self {
            Self::LinuxX64 => "linux-x64",
            Self::LinuxArm64 => "linux-arm64",
            Self::MacosX64 => "macos-x64",
            Self::MacosArm64 => "macos-arm64",
            Self::WindowsX64 => "windows-x64",
        }
    }

    /// Returns a human-readable description of the platform.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::LinuxX64 => "Linux (x86_64)",
            Self::LinuxArm64 => "Linux (ARM64)",
            Self::MacosX64 => "macOS (Intel)",
            Self::MacosArm64 => "macOS (Apple Silicon)",
            Self::WindowsX64 => "Windows (x86_64)",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

// ============================================================================
// Platform Adapter
// ============================================================================

/// OS-specific lookups used by the extractor and launcher.
///
/// Implementations hold no mutable state; every method is idempotent.
pub trait PlatformAdapter: Send + Sync {
    /// Scratch directory under which every extraction workspace is created.
    /// Created with owner-only permissions if it does not exist yet.
    fn temp_root(&self) -> Result<PathBuf>;

    /// Native executable file suffix: `".exe"` on Windows, empty elsewhere.
    fn executable_suffix(&self) -> &str;

    /// Applies process-creation attributes for this OS to `descriptor`.
    fn configure_process(&self, descriptor: &mut ProcessDescriptor);

    /// Marks `path` executable. No-op where executability is extension-based.
    fn ensure_executable(&self, path: &Path) -> Result<()>;
}

/// The adapter for the OS this binary runs on.
#[derive(Debug, Clone)]
pub struct NativePlatform {
    temp_root: PathBuf,
}

impl NativePlatform {
    /// Resolves the temp root from `config` and the process environment.
    pub fn new(config: &LauncherConfig) -> Self {
        let temp_root = resolve_temp_root(
            config,
            TEMP_ROOT_ENV_VARS,
            |key| std::env::var_os(key),
            std::env::temp_dir(),
        );
        debug!(temp_root = %temp_root.display(), "Resolved temp root");
        Self { temp_root }
    }

    /// Uses `temp_root` verbatim.
    pub fn with_temp_root(temp_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
        }
    }
}

impl Default for NativePlatform {
    fn default() -> Self {
        Self::new(&LauncherConfig::default())
    }
}

impl PlatformAdapter for NativePlatform {
    fn temp_root(&self) -> Result<PathBuf> {
        create_private_dir(&self.temp_root)?;
        Ok(self.temp_root.clone())
    }

    fn executable_suffix(&self) -> &str {
        std::env::consts::EXE_SUFFIX
    }

    #[allow(unused_variables)]
    fn configure_process(&self, descriptor: &mut ProcessDescriptor) {
        #[cfg(windows)]
        {
            descriptor.attributes_mut().creation_flags |= CREATE_NO_WINDOW;
        }
        #[cfg(unix)]
        {
            descriptor.attributes_mut().new_process_group = true;
        }
    }

    fn ensure_executable(&self, path: &Path) -> Result<()> {
        make_executable(path)
    }
}

// ============================================================================
// Temp Root Resolution
// ============================================================================

/// Picks the temp root: the configured override, else the first non-empty
/// variable in `env_vars` joined with the app dir, else `default_base` joined
/// with the app dir.
pub fn resolve_temp_root<F>(
    config: &LauncherConfig,
    env_vars: &[&str],
    lookup: F,
    default_base: PathBuf,
) -> PathBuf
where
    F: Fn(&str) -> Option<OsString>,
{
    if let Some(root) = &config.temp_root {
        return root.clone();
    }

    let base = env_vars
        .iter()
        .filter_map(|key| lookup(key))
        .find(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or(default_base);

    base.join(&config.app_dir_name)
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(path)
        .map_err(|e| Error::io("Failed to create temp root", path, e))
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::io("Failed to create temp root", path, e))
}

// ============================================================================
// Unix Permissions
// ============================================================================

/// Sets executable permission on a file (Unix only).
///
/// On Windows, this is a no-op.
#[allow(unused_variables)]
pub fn make_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let metadata = std::fs::metadata(path).map_err(|source| Error::Permission {
            path: path.to_path_buf(),
            source,
        })?;

        let mut permissions = metadata.permissions();
        let current_mode = permissions.mode();
        permissions.set_mode(current_mode | 0o755);

        std::fs::set_permissions(path, permissions).map_err(|source| Error::Permission {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Set executable permission on {}", path.display());
    }

    Ok(())
}
