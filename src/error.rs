//! Unified error handling for chatseize
//!
//! This module defines domain-specific error types that provide better
//! context and debugging information than generic `anyhow::Error`.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Main error type for acquisition operations
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Required external artifact (payload, utility) is absent
    #[error("Missing dependency '{what}' at {}", path.display())]
    DependencyMissing { what: &'static str, path: PathBuf },

    /// No authorized device on the control channel
    #[error("No authorized device detected")]
    DeviceNotDetected,

    /// Authenticated decryption failed tag verification
    #[error("Integrity failure: key does not match container or data is corrupt")]
    Integrity,

    /// Input shorter than the fixed container/key layout requires
    #[error("Truncated {what}: need at least {need} bytes, got {got}")]
    TruncatedInput {
        what: &'static str,
        need: usize,
        got: usize,
    },

    /// A UI tree page or element could not be parsed
    #[error("UI tree parse error: {0}")]
    ParseNoise(String),

    /// File I/O error
    #[error("File I/O error for '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Generic error for cases not covered above
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias for acquisition operations
pub type Result<T> = std::result::Result<T, AcquireError>;

impl AcquireError {
    /// Check if this error is a decryption integrity failure
    pub fn is_integrity(&self) -> bool {
        matches!(self, AcquireError::Integrity)
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            AcquireError::DeviceNotDetected => {
                "No device found. Check the cable and confirm USB debugging is authorized."
                    .to_string()
            }
            AcquireError::Integrity => {
                "Tag verification failed. The key does not match this container; try key \
                 material from another source."
                    .to_string()
            }
            AcquireError::DependencyMissing { what, path } => {
                format!("Place '{}' at {} and rerun.", what, path.display())
            }
            _ => self.to_string(),
        }
    }
}

/// Convert IO errors with path context
impl AcquireError {
    pub fn from_io_error(path: impl Into<String>, error: io::Error) -> Self {
        AcquireError::IoError {
            path: path.into(),
            source: error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AcquireError::ParseNoise("unexpected end of tag".to_string());
        assert_eq!(err.to_string(), "UI tree parse error: unexpected end of tag");
    }

    #[test]
    fn test_is_integrity() {
        assert!(AcquireError::Integrity.is_integrity());
        assert!(!AcquireError::DeviceNotDetected.is_integrity());
    }

    #[test]
    fn test_user_message() {
        let err = AcquireError::Integrity;
        assert!(err.user_message().contains("another source"));

        let err = AcquireError::DependencyMissing {
            what: "abe.jar",
            path: PathBuf::from("bin/payloads/abe.jar"),
        };
        assert!(err.user_message().contains("abe.jar"));
    }

    #[test]
    fn test_truncated_display() {
        let err = AcquireError::TruncatedInput {
            what: "container",
            need: 207,
            got: 64,
        };
        assert_eq!(
            err.to_string(),
            "Truncated container: need at least 207 bytes, got 64"
        );
    }
}
