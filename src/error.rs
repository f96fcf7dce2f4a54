//! Failures that map to a specific process exit code.
//!
//! Everything else surfaces as a plain `anyhow::Error` and exits with 1.

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExitError {
    #[error("{count} configuration problem(s) found")]
    Validation { count: usize },

    #[error("{kind} configuration file not found: {}", path.display())]
    ConfigNotFound { kind: &'static str, path: PathBuf },

    #[error("Parameters file not found: {}", path.display())]
    ParametersNotFound { path: PathBuf },

    #[error("Required Azure resources are missing")]
    ResourcesMissing,
}

impl ExitError {
    pub const fn code(&self) -> u8 {
        match self {
            Self::Validation { .. } => 1,
            Self::ConfigNotFound { .. } => 2,
            Self::ParametersNotFound { .. } => 3,
            Self::ResourcesMissing => 4,
        }
    }
}

/// Numeric exit status for an error returned from a command.
pub fn status_of(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<ExitError>().map_or(1, ExitError::code)
}

/// Exit code for an error returned from a command.
pub fn exit_code(err: &anyhow::Error) -> ExitCode {
    ExitCode::from(status_of(err))
}
