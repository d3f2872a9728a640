//! Toolpack Core Library
//!
//! Ships helper executables (and the directory trees some of them need)
//! inside the host binary, extracts them on demand and runs them as child
//! processes. It includes:
//!
//! - Resource bundles: the files embedded at build time, or an on-disk
//!   directory with the same layout
//! - Extraction into uniquely named temp workspaces with idempotent cleanup
//! - Tool resolution with fallback to the system search path
//! - Process launching with platform creation attributes and cancellation
//! - Launcher configuration (config file and environment overrides)

pub mod bundle;
pub mod config;
pub mod error;
pub mod extractor;
pub mod launcher;
pub mod platform;
pub mod process;
pub mod workspace;

// Re-exports for convenience
pub use config::LauncherConfig;
pub use error::{Error, Result};

// Re-export bundles
pub use bundle::{BundleEntry, DirectoryBundle, EmbeddedBundle, ResourceBundle, Walk};

// Re-export extraction and launching
pub use extractor::{Extractor, Materialized};
pub use launcher::{LaunchedTool, ProcessLauncher, ResolvedExecutable};
pub use workspace::CleanupHandle;

// Re-export platform support
pub use platform::{NativePlatform, Platform, PlatformAdapter};
pub use process::{CreationAttributes, ProcessDescriptor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn exports_are_accessible() {
        fn _check_types(
            _bundle: &dyn ResourceBundle,
            _platform: &dyn PlatformAdapter,
            _extractor: &Extractor,
            _launcher: &ProcessLauncher,
            _resolved: &ResolvedExecutable,
            _descriptor: &ProcessDescriptor,
            _cleanup: &CleanupHandle,
            _config: &LauncherConfig,
        ) {
        }
    }

    #[test]
    fn production_launcher_builds_from_defaults() {
        let launcher = ProcessLauncher::from_config(&LauncherConfig::default());
        let root = launcher.extractor().bundle().list("").unwrap();
        assert_eq!(
            root.is_empty(),
            EmbeddedBundle::for_current_platform().is_empty()
        );
    }
}
