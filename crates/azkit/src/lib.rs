//! # azkit
//!
//! Blocking client for the parts of Azure needed to ship a Managed
//! Application: resource groups, template deployments, storage account
//! checks and block blob uploads.
//!
//! ## Example
//!
//! ```no_run
//! use azkit::{Client, Credentials};
//! use std::path::Path;
//!
//! let subscription = "00000000-0000-0000-0000-000000000000";
//! let path = Path::new("/home/me/.azure/credentials");
//! let creds = Credentials::from_file(path, subscription).expect("credentials");
//! let client = Client::connect(&creds, subscription).expect("login");
//!
//! if !client.resource_group_exists("chef-ama-1").unwrap() {
//!     client.create_resource_group("chef-ama-1", "eastus").unwrap();
//! }
//! ```
//!
//! ## Testing
//!
//! [`MockBackend`] keeps resource groups, deployments and blobs in memory:
//!
//! ```
//! use azkit::{Client, MockBackend};
//!
//! let mock = MockBackend::new();
//! let client = Client::with_backend(Box::new(mock.clone()));
//! client.create_resource_group("chef-ama-1", "eastus").unwrap();
//! assert_eq!(mock.resource_groups(), vec!["chef-ama-1"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod auth;
pub mod backend;
pub mod blob;
pub mod error;
pub mod retry;
pub mod types;

pub use auth::{AccessToken, Credentials};
pub use backend::{Backend, MockBackend, RecordedDeployment};
pub use error::{Error, ErrorCategory, Result};
pub use types::{
    BlobTarget, DeploymentMode, DeploymentRequest, DeploymentStatus, Endpoints, PollConfig,
    ResourceGroup, RetryConfig, StorageKey,
};

use backend::rest::{self, RestBackend};
use retry::{LogCallback, with_retry};
use std::thread;
use std::time::Instant;

/// High-level client for Azure operations.
///
/// Every call goes through the configured [`RetryConfig`], so throttling and
/// transient server errors are retried with backoff.
pub struct Client {
    backend: Box<dyn Backend>,
    retry: RetryConfig,
    poll: PollConfig,
}

impl Client {
    /// Log in with service principal credentials against the public cloud.
    pub fn connect(credentials: &Credentials, subscription: &str) -> Result<Self> {
        Self::connect_to(&Endpoints::default(), credentials, subscription)
    }

    /// Log in against a specific set of endpoints.
    pub fn connect_to(
        endpoints: &Endpoints,
        credentials: &Credentials,
        subscription: &str,
    ) -> Result<Self> {
        let agent = rest::agent();
        let token = auth::acquire_token(
            &agent,
            &endpoints.login,
            credentials,
            auth::MANAGEMENT_RESOURCE,
        )?;
        log::debug!("Authenticated as {}", credentials.client_id);

        let backend = RestBackend::new(agent, endpoints.clone(), subscription, token);
        Ok(Self::with_backend(Box::new(backend)))
    }

    /// Create a client with a custom backend (useful for testing).
    #[must_use]
    pub fn with_backend(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
        }
    }

    /// Replace the retry configuration.
    #[must_use]
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the deployment polling configuration.
    #[must_use]
    pub fn poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    fn call<T>(&self, operation: impl FnMut() -> Result<T>) -> Result<T> {
        with_retry(&self.retry, Some(&LogCallback), operation)
    }

    // =========================================================================
    // Resource groups
    // =========================================================================

    /// Whether a resource group exists.
    pub fn resource_group_exists(&self, name: &str) -> Result<bool> {
        self.call(|| self.backend.resource_group_exists(name))
    }

    /// Request deletion of a resource group without waiting for it to finish.
    pub fn delete_resource_group(&self, name: &str) -> Result<()> {
        self.call(|| self.backend.delete_resource_group(name))
    }

    /// Create (or update) a resource group.
    pub fn create_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup> {
        self.call(|| self.backend.create_resource_group(name, location))
    }

    // =========================================================================
    // Deployments
    // =========================================================================

    /// Start a template deployment.
    pub fn create_deployment(
        &self,
        group: &str,
        name: &str,
        request: &DeploymentRequest,
    ) -> Result<()> {
        self.call(|| self.backend.create_deployment(group, name, request))
    }

    /// Check a deployment until it stops running.
    ///
    /// Returns the final status when it succeeded, and
    /// [`Error::DeploymentFailed`] when it failed or was canceled.
    pub fn wait_for_deployment(&self, group: &str, name: &str) -> Result<DeploymentStatus> {
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            let status = self.call(|| self.backend.deployment_state(group, name))?;
            if status.is_succeeded() {
                return Ok(status);
            }
            if status.is_terminal() {
                return Err(Error::DeploymentFailed {
                    name: name.to_string(),
                    message: status
                        .error
                        .unwrap_or_else(|| "no error details reported".to_string()),
                    state: status.state,
                });
            }

            let waited = started.elapsed();
            if waited >= self.poll.timeout {
                return Err(Error::DeploymentTimeout {
                    name: name.to_string(),
                    state: status.state,
                    waited_secs: waited.as_secs(),
                });
            }

            let delay = self.poll.delay_for_attempt(attempt);
            log::debug!(
                "Deployment {name} is {}, checking again in {}s",
                status.state,
                delay.as_secs()
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }

    /// Start a template deployment and wait for its outcome.
    pub fn deploy(
        &self,
        group: &str,
        name: &str,
        request: &DeploymentRequest,
    ) -> Result<DeploymentStatus> {
        self.create_deployment(group, name, request)?;
        self.wait_for_deployment(group, name)
    }

    // =========================================================================
    // Storage
    // =========================================================================

    /// Whether a storage account exists.
    pub fn storage_account_exists(&self, account: &str) -> Result<bool> {
        self.call(|| self.backend.storage_account_exists(account))
    }

    /// Whether a blob container exists.
    pub fn container_exists(&self, group: &str, account: &str, container: &str) -> Result<bool> {
        self.call(|| self.backend.container_exists(group, account, container))
    }

    /// First access key of a storage account.
    pub fn storage_key(&self, group: &str, account: &str) -> Result<String> {
        let keys = self.call(|| self.backend.list_storage_keys(group, account))?;
        keys.into_iter()
            .next()
            .map(|k| k.value)
            .ok_or_else(|| Error::NoStorageKeys(account.to_string()))
    }

    /// Upload a block blob.
    pub fn upload_blob(&self, target: &BlobTarget, name: &str, data: &[u8]) -> Result<()> {
        self.call(|| self.backend.upload_blob(target, name, data))
    }
}
