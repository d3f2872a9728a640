//! Error types for extraction, resolution and launching.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{name} not found in {location}")]
    NotFound { name: String, location: String },

    #[error("Invalid tool name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("{context} ({}): {source}", path.display())]
    Io {
        context: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to mark {} executable: {source}", path.display())]
    Permission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not resolve {tool}: bundled lookup failed ({embedded}); system lookup failed ({system})")]
    Resolution {
        tool: String,
        embedded: Box<Error>,
        system: which::Error,
    },

    #[error("Launch of {tool} was cancelled")]
    Cancelled { tool: String },

    #[error("Failed to spawn {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid configuration in {}: {message}", path.display())]
    Config { path: PathBuf, message: String },
}

impl Error {
    pub(crate) fn io(context: impl Into<String>, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_in_bundle(name: impl Into<String>) -> Self {
        Self::NotFound {
            name: name.into(),
            location: "bundle".to_string(),
        }
    }

    /// True when the error means "the bundle does not have this", which is the
    /// only condition that permits falling back to the system search path.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_error_mentions_both_causes() {
        let err = Error::Resolution {
            tool: "transcoder".to_string(),
            embedded: Box::new(Error::not_in_bundle("transcoder")),
            system: which::Error::CannotFindBinaryPath,
        };

        let msg = err.to_string();
        assert!(msg.contains("transcoder"));
        assert!(msg.contains("bundle"));
        assert!(msg.contains("system lookup failed"));
    }

    #[test]
    fn test_io_error_includes_path_and_cause() {
        let err = Error::io(
            "Failed to write",
            "/tmp/toolpack/x",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );

        let msg = err.to_string();
        assert!(msg.contains("/tmp/toolpack/x"));
        assert!(msg.contains("disk full"));
        assert!(!err.is_not_found());
    }
}
