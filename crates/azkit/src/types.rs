//! Core types shared by the client and its backends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Public Azure cloud login endpoint.
pub const LOGIN_ENDPOINT: &str = "https://login.microsoftonline.com";

/// Public Azure cloud Resource Manager endpoint.
pub const MANAGEMENT_ENDPOINT: &str = "https://management.azure.com";

/// DNS suffix of the blob service for storage accounts.
pub const BLOB_SUFFIX: &str = "blob.core.windows.net";

/// Service endpoints for one Azure cloud.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// OAuth2 authority, without tenant.
    pub login: String,
    /// Resource Manager base URL.
    pub management: String,
    /// Blob service DNS suffix.
    pub blob_suffix: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: LOGIN_ENDPOINT.to_string(),
            management: MANAGEMENT_ENDPOINT.to_string(),
            blob_suffix: BLOB_SUFFIX.to_string(),
        }
    }
}

impl Endpoints {
    /// Base URL of the blob service for a storage account.
    #[must_use]
    pub fn blob_service(&self, account: &str) -> String {
        format!("https://{account}.{}", self.blob_suffix)
    }

    /// Public URL of a blob.
    #[must_use]
    pub fn blob_url(&self, account: &str, container: &str, blob: &str) -> String {
        format!("{}/{container}/{blob}", self.blob_service(account))
    }
}

/// A resource group as returned by Resource Manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceGroup {
    /// Resource group name.
    pub name: String,
    /// Azure region.
    pub location: String,
    /// Provisioning state reported by Azure, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

/// An access key of a storage account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageKey {
    /// Key name (`key1`, `key2`).
    pub key_name: String,
    /// Base64 encoded key.
    pub value: String,
    /// Permissions granted by the key.
    #[serde(default)]
    pub permissions: String,
}

/// Deployment mode of an ARM template deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeploymentMode {
    /// Leave unmanaged resources in the group untouched.
    #[default]
    Incremental,
    /// Delete resources not present in the template.
    Complete,
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incremental => write!(f, "Incremental"),
            Self::Complete => write!(f, "Complete"),
        }
    }
}

/// A template deployment linked to a template stored at a URI.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentRequest {
    /// URI of the main template.
    pub template_uri: String,
    /// Value of the `parameters` member of an ARM parameters file.
    pub parameters: serde_json::Value,
    /// Deployment mode.
    pub mode: DeploymentMode,
}

impl DeploymentRequest {
    /// Create an incremental deployment of a linked template.
    pub fn linked(template_uri: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            template_uri: template_uri.into(),
            parameters,
            mode: DeploymentMode::Incremental,
        }
    }

    /// Request body for `PUT .../deployments/{name}`.
    #[must_use]
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({
            "properties": {
                "mode": self.mode.to_string(),
                "parameters": self.parameters,
                "templateLink": {
                    "uri": self.template_uri,
                },
            },
        })
    }
}

/// Provisioning state of a template deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentStatus {
    /// `properties.provisioningState`, e.g. `Running` or `Succeeded`.
    pub state: String,
    /// Error reported by Azure for a failed deployment.
    pub error: Option<String>,
}

impl DeploymentStatus {
    /// A status without error details.
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            error: None,
        }
    }

    /// A failed status carrying Azure's error message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: "Failed".to_string(),
            error: Some(message.into()),
        }
    }

    /// Whether the deployment has stopped running.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.state.as_str(), "Succeeded" | "Failed" | "Canceled")
    }

    /// Whether the deployment finished successfully.
    #[must_use]
    pub fn is_succeeded(&self) -> bool {
        self.state == "Succeeded"
    }
}

/// Destination container for blob uploads, with the key used to sign them.
#[derive(Clone, PartialEq, Eq)]
pub struct BlobTarget {
    /// Storage account name.
    pub account: String,
    /// Container name.
    pub container: String,
    /// Base64 encoded account key.
    pub key: String,
}

impl fmt::Debug for BlobTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobTarget")
            .field("account", &self.account)
            .field("container", &self.container)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Configuration for retrying transient failures.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_factor: f64,
    /// Maximum delay between retries
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(2),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with custom settings.
    pub fn new(max_attempts: u32, base_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff_factor,
            max_delay: Duration::from_secs(30),
        }
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = delay.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Create a config that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }
}

/// How long and how often to check a running deployment.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the second status check
    pub base_delay: Duration,
    /// Multiplier applied to the delay after every check
    pub backoff_factor: f64,
    /// Maximum delay between checks
    pub max_delay: Duration,
    /// Give up once this much time has passed
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            backoff_factor: 1.5,
            max_delay: Duration::from_secs(30),
            timeout: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl PollConfig {
    /// Delay after the given check (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }

    /// Check again without waiting.
    pub fn immediate() -> Self {
        Self {
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_status() {
        assert!(!DeploymentStatus::new("Running").is_terminal());
        assert!(!DeploymentStatus::new("Accepted").is_terminal());
        assert!(DeploymentStatus::new("Succeeded").is_succeeded());
        assert!(DeploymentStatus::new("Canceled").is_terminal());

        let failed = DeploymentStatus::failed("quota exceeded");
        assert!(failed.is_terminal());
        assert!(!failed.is_succeeded());
        assert_eq!(failed.error.as_deref(), Some("quota exceeded"));
    }

    #[test]
    fn test_poll_config_delay() {
        let config = PollConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(5));
        assert_eq!(config.delay_for_attempt(20), Duration::from_secs(30));
        assert_eq!(PollConfig::immediate().delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn test_blob_url() {
        let endpoints = Endpoints::default();
        assert_eq!(
            endpoints.blob_url("chefama", "templates", "mainTemplate.json"),
            "https://chefama.blob.core.windows.net/templates/mainTemplate.json"
        );
    }

    #[test]
    fn test_deployment_body() {
        let request = DeploymentRequest::linked(
            "https://chefama.blob.core.windows.net/templates/mainTemplate.json",
            serde_json::json!({ "prefix": { "value": "inspec" } }),
        );
        let body = request.to_body();
        assert_eq!(body["properties"]["mode"], "Incremental");
        assert_eq!(
            body["properties"]["templateLink"]["uri"],
            "https://chefama.blob.core.windows.net/templates/mainTemplate.json"
        );
        assert_eq!(
            body["properties"]["parameters"]["prefix"]["value"],
            "inspec"
        );
    }

    #[test]
    fn test_storage_key_deserialize() {
        let key: StorageKey =
            serde_json::from_str(r#"{"keyName":"key1","value":"abc=","permissions":"FULL"}"#)
                .unwrap();
        assert_eq!(key.key_name, "key1");
        assert_eq!(key.value, "abc=");
    }

    #[test]
    fn test_blob_target_debug_redacts_key() {
        let target = BlobTarget {
            account: "chefama".to_string(),
            container: "templates".to_string(),
            key: "c2VjcmV0".to_string(),
        };
        let debug = format!("{target:?}");
        assert!(debug.contains("chefama"));
        assert!(!debug.contains("c2VjcmV0"));
    }

    #[test]
    fn test_retry_config_delay() {
        let config = RetryConfig::new(5, Duration::from_secs(1), 2.0);
        assert_eq!(config.delay_for_attempt(0), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(4));
    }

    #[test]
    fn test_retry_config_max_delay() {
        let config = RetryConfig {
            max_delay: Duration::from_secs(5),
            ..RetryConfig::new(5, Duration::from_secs(2), 2.0)
        };
        assert_eq!(config.delay_for_attempt(4), Duration::from_secs(5));
    }
}
