//! Error types for taskflow
//!
//! Exit codes:
//! - 0: Success
//! - 2: User error (bad arguments, unknown task, rejected dependency)
//! - 4: Operation failed (file IO, JSON, config parsing)

use std::path::PathBuf;
use thiserror::Error;

use crate::graph::DependencyError;

/// Exit codes for the `tf` binary
pub mod exit_codes {
    pub const USER_ERROR: i32 = 2;
    pub const OPERATION_FAILED: i32 = 4;
}

/// Error type for everything outside the in-memory core.
#[derive(Error, Debug)]
pub enum Error {
    // User errors (exit code 2)
    #[error("{0}")]
    TaskNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Dependency rejected: {0}")]
    Dependency(#[from] DependencyError),

    // Operation failures (exit code 4)
    #[error("Invalid configuration in {path}: {source}")]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Corrupt task store: {0}")]
    CorruptStore(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::TaskNotFound(_) | Error::InvalidArgument(_) | Error::Dependency(_) => {
                exit_codes::USER_ERROR
            }
            Error::Config { .. } | Error::CorruptStore(_) | Error::Io(_) | Error::Json(_) => {
                exit_codes::OPERATION_FAILED
            }
        }
    }
}

/// Result type alias for taskflow operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_by_category() {
        assert_eq!(Error::InvalidArgument("x".into()).exit_code(), exit_codes::USER_ERROR);
        assert_eq!(Error::Dependency(DependencyError::SelfDependency).exit_code(), exit_codes::USER_ERROR);
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk");
        assert_eq!(Error::from(io).exit_code(), exit_codes::OPERATION_FAILED);
        assert_eq!(Error::CorruptStore("x".into()).exit_code(), exit_codes::OPERATION_FAILED);
    }
}
