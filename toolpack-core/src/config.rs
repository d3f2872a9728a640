//! Launcher configuration.
//!
//! Settings are layered, later sources winning:
//!
//! 1. built-in defaults
//! 2. `{config_dir}/toolpack/config.json`, if present
//! 3. `TOOLPACK_*` environment variables

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Default application directory name under the temp root base.
pub const DEFAULT_APP_DIR: &str = "toolpack";

/// Config file name inside `{config_dir}/toolpack/`.
const CONFIG_FILE_NAME: &str = "config.json";

pub const ENV_TEMP_ROOT: &str = "TOOLPACK_TEMP_ROOT";
pub const ENV_BUNDLE_DIR: &str = "TOOLPACK_BUNDLE_DIR";
pub const ENV_SYSTEM_FALLBACK: &str = "TOOLPACK_SYSTEM_FALLBACK";
pub const ENV_SEARCH_PATH: &str = "TOOLPACK_SEARCH_PATH";

/// Launcher settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherConfig {
    /// Directory name appended to the platform temp base.
    pub app_dir_name: String,

    /// Use this directory as the temp root verbatim, skipping the platform
    /// fallback chain.
    pub temp_root: Option<PathBuf>,

    /// Serve tools from this on-disk bundle instead of the embedded one.
    pub bundle_dir: Option<PathBuf>,

    /// Search the system executable path when a tool is not bundled.
    pub system_fallback: bool,

    /// `PATH`-style list used for fallback lookups instead of `PATH`.
    pub search_path: Option<String>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            app_dir_name: DEFAULT_APP_DIR.to_string(),
            temp_root: None,
            bundle_dir: None,
            system_fallback: true,
            search_path: None,
        }
    }
}

impl LauncherConfig {
    /// Loads defaults, then the user config file, then the process environment.
    pub fn load() -> Result<Self> {
        let mut config = match default_config_path() {
            Some(path) if path.is_file() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var_os(key));
        Ok(config)
    }

    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::io("Failed to read config", path, e))?;

        let config: Self = serde_json::from_str(&content).map_err(|e| Error::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        debug!(path = %path.display(), "Loaded launcher config");
        Ok(config)
    }

    /// Overlays `TOOLPACK_*` variables read through `lookup`. Empty values are
    /// ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<OsString>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(root) = get(ENV_TEMP_ROOT) {
            self.temp_root = Some(PathBuf::from(root));
        }
        if let Some(dir) = get(ENV_BUNDLE_DIR) {
            self.bundle_dir = Some(PathBuf::from(dir));
        }
        if let Some(flag) = get(ENV_SYSTEM_FALLBACK) {
            self.system_fallback = !is_falsy(&flag.to_string_lossy());
        }
        if let Some(path) = get(ENV_SEARCH_PATH) {
            self.search_path = Some(path.to_string_lossy().into_owned());
        }
    }
}

/// Returns `{config_dir}/toolpack/config.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(DEFAULT_APP_DIR).join(CONFIG_FILE_NAME))
}

fn is_falsy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<OsString> {
        let map: HashMap<String, OsString> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = LauncherConfig::default();
        assert_eq!(config.app_dir_name, "toolpack");
        assert!(config.system_fallback);
        assert!(config.temp_root.is_none());
        assert!(config.bundle_dir.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = LauncherConfig::default();
        config.apply_env(env_from(&[
            (ENV_TEMP_ROOT, "/scratch/tp"),
            (ENV_SYSTEM_FALLBACK, "off"),
            (ENV_SEARCH_PATH, "/opt/tools/bin"),
        ]));

        assert_eq!(config.temp_root, Some(PathBuf::from("/scratch/tp")));
        assert!(!config.system_fallback);
        assert_eq!(config.search_path.as_deref(), Some("/opt/tools/bin"));
        assert!(config.bundle_dir.is_none());
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = LauncherConfig::default();
        config.apply_env(env_from(&[(ENV_TEMP_ROOT, ""), (ENV_SYSTEM_FALLBACK, "")]));

        assert!(config.temp_root.is_none());
        assert!(config.system_fallback);
    }

    #[test]
    fn test_fallback_truthy_values_keep_it_enabled() {
        for value in ["1", "true", "yes", "anything"] {
            let mut config = LauncherConfig::default();
            config.apply_env(env_from(&[(ENV_SYSTEM_FALLBACK, value)]));
            assert!(config.system_fallback, "value {value:?} should enable");
        }
    }

    #[test]
    fn test_from_file_partial() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, r#"{ "system_fallback": false }"#).unwrap();

        let config = LauncherConfig::from_file(&path).unwrap();
        assert!(!config.system_fallback);
        assert_eq!(config.app_dir_name, DEFAULT_APP_DIR);
    }

    #[test]
    fn test_from_file_invalid_json() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = LauncherConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, Error::Config { .. }), "got {err:?}");
    }
}
