//! Error types for Azure operations.
//!
//! Errors are categorized so callers can decide whether an operation is worth
//! retrying and what advice to show the user.

use serde::Deserialize;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for Azure operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of Azure errors for retry logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport failures, throttling and server errors (transient, retryable).
    Network,
    /// Credentials missing, rejected, or lacking permission.
    Auth,
    /// Resource does not exist.
    NotFound,
    /// Resource is in a state that conflicts with the request.
    Conflict,
    /// Unexpected response body or malformed input.
    Format,
    /// Local file system failure.
    Io,
    /// A template deployment did not succeed.
    Deployment,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network or service availability issue",
            Self::Auth => "Authentication or authorization failure",
            Self::NotFound => "Resource not found",
            Self::Conflict => "Resource state conflict",
            Self::Format => "Invalid data",
            Self::Io => "File system error",
            Self::Deployment => "Template deployment failed",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check your internet connection and try again",
            Self::Auth => {
                "Check the service principal in the credentials file and its role assignments"
            }
            Self::NotFound => "Verify the subscription, resource group and resource names",
            Self::Conflict => "Wait for pending operations on the resource to finish",
            Self::Format => "Check the input files and the API response",
            Self::Io => "Check that the path exists and is readable",
            Self::Deployment => {
                "Check the deployment operations of the resource group in the Azure portal"
            }
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to Azure.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Credentials file does not exist.
    #[error("unable to find credentials file: {}", path.display())]
    CredentialsNotFound {
        /// Expected location of the file.
        path: PathBuf,
    },

    /// Subscription has no section in the credentials file.
    #[error("unable to find subscription \"{subscription}\" in auth file: {}", path.display())]
    SubscriptionNotFound {
        /// Subscription id that was requested.
        subscription: String,
        /// Credentials file that was searched.
        path: PathBuf,
    },

    /// A required credential key is missing.
    #[error("subscription \"{subscription}\" is missing \"{field}\" in the credentials file")]
    MissingCredential {
        /// Subscription section.
        subscription: String,
        /// Missing key.
        field: &'static str,
    },

    /// Credentials file could not be parsed.
    #[error("invalid credentials file {}: {message}", path.display())]
    InvalidCredentials {
        /// Credentials file.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Token request was rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Storage account exposes no access keys.
    #[error("storage account {0} has no access keys")]
    NoStorageKeys(String),

    /// Request signing failed.
    #[error("failed to sign request: {0}")]
    Signing(String),

    /// IO error during file operations.
    #[error("IO error at {}: {source}", path.display())]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Invalid response from API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// Deployment finished in a state other than `Succeeded`.
    #[error("deployment {name} finished as {state}: {message}")]
    DeploymentFailed {
        /// Deployment name.
        name: String,
        /// Final provisioning state.
        state: String,
        /// Error reported by Azure.
        message: String,
    },

    /// Deployment was still running when polling gave up.
    #[error("deployment {name} is still {state} after {waited_secs}s")]
    DeploymentTimeout {
        /// Deployment name.
        name: String,
        /// Last provisioning state seen.
        state: String,
        /// Seconds spent waiting.
        waited_secs: u64,
    },

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Create an HTTP error from a non-success response body.
    ///
    /// Azure reports failures as `{"error": {"code": .., "message": ..}}`;
    /// the code and message are kept when present.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.error.describe())
            .unwrap_or_else(|| format!("HTTP {status}"));
        Self::http(message, Some(status))
    }

    /// HTTP status code, when the error came from a response.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => *status,
            _ => None,
        }
    }

    /// Get the error category for retry logic.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Http { status: None, .. } => ErrorCategory::Network,
            Error::Http {
                status: Some(code), ..
            } => match code {
                401 | 403 => ErrorCategory::Auth,
                404 => ErrorCategory::NotFound,
                409 | 412 => ErrorCategory::Conflict,
                408 | 429 | 500..=599 => ErrorCategory::Network,
                _ => ErrorCategory::Other,
            },
            Error::CredentialsNotFound { .. }
            | Error::SubscriptionNotFound { .. }
            | Error::MissingCredential { .. }
            | Error::Auth(_) => ErrorCategory::Auth,
            Error::InvalidCredentials { .. } | Error::InvalidResponse(_) | Error::Signing(_) => {
                ErrorCategory::Format
            }
            Error::NoStorageKeys(_) => ErrorCategory::NotFound,
            Error::DeploymentFailed { .. } | Error::DeploymentTimeout { .. } => {
                ErrorCategory::Deployment
            }
            Error::Io { .. } => ErrorCategory::Io,
            Error::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl ErrorDetail {
    fn describe(self) -> Option<String> {
        match (self.code, self.message) {
            (Some(code), Some(message)) => Some(format!("{code}: {message}")),
            (None, Some(message)) => Some(message),
            (Some(code), None) => Some(code),
            (None, None) => None,
        }
    }
}

/// Pass a success response through, or turn the response into an error
/// carrying Azure's message.
pub(crate) fn check_status(
    mut response: ureq::http::Response<ureq::Body>,
) -> Result<ureq::http::Response<ureq::Body>> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.body_mut().read_to_string().unwrap_or_default();
    Err(Error::from_response(status, &body))
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
