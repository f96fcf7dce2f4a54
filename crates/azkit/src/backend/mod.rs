//! Backend trait and implementations for talking to Azure.
//!
//! [`rest::RestBackend`] calls the Resource Manager and Blob Storage REST
//! APIs. [`MockBackend`] keeps everything in memory for tests:
//!
//! ```
//! use azkit::backend::{Backend, MockBackend};
//!
//! let mock = MockBackend::new();
//! mock.create_resource_group("chef-ama-1", "eastus").unwrap();
//! assert!(mock.resource_group_exists("chef-ama-1").unwrap());
//! ```

pub mod rest;

use crate::error::{Error, Result};
use crate::types::{BlobTarget, DeploymentRequest, DeploymentStatus, ResourceGroup, StorageKey};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Operations the deployment tooling needs from Azure.
///
/// Implementations must be shareable across threads; blob uploads are
/// issued in parallel.
pub trait Backend: Send + Sync {
    /// Whether a resource group exists in the subscription.
    fn resource_group_exists(&self, name: &str) -> Result<bool>;

    /// Request deletion of a resource group.
    ///
    /// Returns once Azure has accepted the request; deletion continues
    /// asynchronously.
    fn delete_resource_group(&self, name: &str) -> Result<()>;

    /// Create (or update) a resource group.
    fn create_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup>;

    /// Start a template deployment into a resource group.
    fn create_deployment(&self, group: &str, name: &str, request: &DeploymentRequest)
    -> Result<()>;

    /// Current provisioning state of a deployment.
    fn deployment_state(&self, group: &str, name: &str) -> Result<DeploymentStatus>;

    /// Whether a storage account with this globally unique name exists.
    fn storage_account_exists(&self, account: &str) -> Result<bool>;

    /// Whether a blob container exists in a storage account.
    fn container_exists(&self, group: &str, account: &str, container: &str) -> Result<bool>;

    /// List the access keys of a storage account.
    fn list_storage_keys(&self, group: &str, account: &str) -> Result<Vec<StorageKey>>;

    /// Upload `data` as a block blob named `name`.
    fn upload_blob(&self, target: &BlobTarget, name: &str, data: &[u8]) -> Result<()>;
}

/// A deployment recorded by [`MockBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedDeployment {
    /// Target resource group.
    pub group: String,
    /// Deployment name.
    pub name: String,
    /// Deployment request.
    pub request: DeploymentRequest,
}

#[derive(Debug, Default)]
struct MockState {
    groups: BTreeMap<String, String>,
    deleted_groups: Vec<String>,
    failing_creates: BTreeSet<String>,
    failing_deletes: BTreeSet<String>,
    deployments: Vec<RecordedDeployment>,
    outcomes: BTreeMap<String, VecDeque<DeploymentStatus>>,
    accounts: BTreeSet<String>,
    containers: BTreeSet<(String, String, String)>,
    keys: BTreeMap<String, Vec<StorageKey>>,
    blobs: BTreeMap<String, Vec<u8>>,
    failing_blobs: BTreeSet<String>,
}

/// In-memory backend for testing without network access.
///
/// Clones share state, so a test can keep a handle after boxing one into a
/// [`Client`](crate::Client). Deployments succeed on the first status check
/// unless [`MockBackend::script_deployment`] says otherwise.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    /// Create an empty mock backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Add an existing resource group.
    pub fn add_resource_group(&self, name: &str, location: &str) {
        self.state()
            .groups
            .insert(name.to_string(), location.to_string());
    }

    /// Add a storage account with one container and a single key.
    pub fn add_storage(&self, group: &str, account: &str, container: &str, key: &str) {
        let mut state = self.state();
        state.accounts.insert(account.to_string());
        state.containers.insert((
            group.to_string(),
            account.to_string(),
            container.to_string(),
        ));
        state.keys.insert(
            account.to_string(),
            vec![StorageKey {
                key_name: "key1".to_string(),
                value: key.to_string(),
                permissions: "FULL".to_string(),
            }],
        );
    }

    /// Make creation of the named resource group fail.
    pub fn fail_create_group(&self, name: &str) {
        self.state().failing_creates.insert(name.to_string());
    }

    /// Make deletion of the named resource group fail.
    pub fn fail_delete_group(&self, name: &str) {
        self.state().failing_deletes.insert(name.to_string());
    }

    /// Statuses returned by successive checks of the named deployment.
    ///
    /// The last status is repeated once the others have been returned.
    pub fn script_deployment(&self, name: &str, statuses: Vec<DeploymentStatus>) {
        self.state()
            .outcomes
            .insert(name.to_string(), statuses.into());
    }

    /// Make uploads of the named blob fail.
    pub fn fail_blob(&self, name: &str) {
        self.state().failing_blobs.insert(name.to_string());
    }

    /// Names of existing resource groups.
    pub fn resource_groups(&self) -> Vec<String> {
        self.state().groups.keys().cloned().collect()
    }

    /// Location of an existing resource group.
    pub fn resource_group_location(&self, name: &str) -> Option<String> {
        self.state().groups.get(name).cloned()
    }

    /// Resource groups deleted so far, in order.
    pub fn deleted_resource_groups(&self) -> Vec<String> {
        self.state().deleted_groups.clone()
    }

    /// Deployments created so far, in order.
    pub fn deployments(&self) -> Vec<RecordedDeployment> {
        self.state().deployments.clone()
    }

    /// Content of an uploaded blob, keyed as `container/name`.
    pub fn blob(&self, container: &str, name: &str) -> Option<Vec<u8>> {
        let key = format!("{container}/{name}");
        self.state().blobs.get(&key).cloned()
    }

    /// Keys (`container/name`) of all uploaded blobs.
    pub fn blob_names(&self) -> Vec<String> {
        self.state().blobs.keys().cloned().collect()
    }
}

impl Backend for MockBackend {
    fn resource_group_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state().groups.contains_key(name))
    }

    fn delete_resource_group(&self, name: &str) -> Result<()> {
        let mut state = self.state();
        if state.failing_deletes.contains(name) {
            let message = format!("AuthorizationFailed: cannot delete {name}");
            return Err(Error::http(message, Some(403)));
        }
        if state.groups.remove(name).is_none() {
            let message = format!("resource group {name} not found");
            return Err(Error::http(message, Some(404)));
        }
        state.deleted_groups.push(name.to_string());
        Ok(())
    }

    fn create_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup> {
        let mut state = self.state();
        if state.failing_creates.contains(name) {
            let message = format!("LocationNotAvailableForResourceGroup: {location}");
            return Err(Error::http(message, Some(400)));
        }
        state.groups.insert(name.to_string(), location.to_string());
        Ok(ResourceGroup {
            name: name.to_string(),
            location: location.to_string(),
            provisioning_state: Some("Succeeded".to_string()),
        })
    }

    fn create_deployment(
        &self,
        group: &str,
        name: &str,
        request: &DeploymentRequest,
    ) -> Result<()> {
        let mut state = self.state();
        if !state.groups.contains_key(group) {
            let message = format!("resource group {group} not found");
            return Err(Error::http(message, Some(404)));
        }
        state.deployments.push(RecordedDeployment {
            group: group.to_string(),
            name: name.to_string(),
            request: request.clone(),
        });
        Ok(())
    }

    fn deployment_state(&self, group: &str, name: &str) -> Result<DeploymentStatus> {
        let mut state = self.state();
        let exists = state
            .deployments
            .iter()
            .any(|d| d.group == group && d.name == name);
        if !exists {
            let message = format!("deployment {name} not found");
            return Err(Error::http(message, Some(404)));
        }

        let Some(statuses) = state.outcomes.get_mut(name) else {
            return Ok(DeploymentStatus::new("Succeeded"));
        };
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(status.unwrap_or_else(|| DeploymentStatus::new("Succeeded")))
    }

    fn storage_account_exists(&self, account: &str) -> Result<bool> {
        Ok(self.state().accounts.contains(account))
    }

    fn container_exists(&self, group: &str, account: &str, container: &str) -> Result<bool> {
        Ok(self.state().containers.contains(&(
            group.to_string(),
            account.to_string(),
            container.to_string(),
        )))
    }

    fn list_storage_keys(&self, _group: &str, account: &str) -> Result<Vec<StorageKey>> {
        let keys = self.state().keys.get(account).cloned();
        let message = format!("storage account {account} not found");
        keys.ok_or_else(|| Error::http(message, Some(404)))
    }

    fn upload_blob(&self, target: &BlobTarget, name: &str, data: &[u8]) -> Result<()> {
        let mut state = self.state();
        if state.failing_blobs.contains(name) {
            return Err(Error::http(format!("upload of {name} rejected"), Some(403)));
        }
        state
            .blobs
            .insert(format!("{}/{}", target.container, name), data.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> BlobTarget {
        BlobTarget {
            account: "chefama".to_string(),
            container: "templates".to_string(),
            key: "a2V5".to_string(),
        }
    }

    fn request() -> DeploymentRequest {
        DeploymentRequest::linked("https://x/mainTemplate.json", serde_json::json!({}))
    }

    #[test]
    fn test_mock_resource_group_lifecycle() {
        let mock = MockBackend::new();
        assert!(!mock.resource_group_exists("chef-ama-1").unwrap());

        mock.create_resource_group("chef-ama-1", "eastus").unwrap();
        assert!(mock.resource_group_exists("chef-ama-1").unwrap());
        assert_eq!(
            mock.resource_group_location("chef-ama-1").as_deref(),
            Some("eastus")
        );

        mock.delete_resource_group("chef-ama-1").unwrap();
        assert!(!mock.resource_group_exists("chef-ama-1").unwrap());
        assert_eq!(mock.deleted_resource_groups(), vec!["chef-ama-1"]);
    }

    #[test]
    fn test_mock_delete_missing_group() {
        let mock = MockBackend::new();
        let err = mock.delete_resource_group("missing").unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_mock_failing_group_operations() {
        let mock = MockBackend::new();
        mock.add_resource_group("chef-ama-1", "eastus");
        mock.fail_delete_group("chef-ama-1");
        mock.fail_create_group("chef-ama-2");

        let err = mock.delete_resource_group("chef-ama-1").unwrap_err();
        assert_eq!(err.status(), Some(403));
        assert!(mock.resource_group_exists("chef-ama-1").unwrap());

        assert!(mock.create_resource_group("chef-ama-2", "eastus").is_err());
        assert!(!mock.resource_group_exists("chef-ama-2").unwrap());
    }

    #[test]
    fn test_mock_deployment_requires_group() {
        let mock = MockBackend::new();
        assert!(mock.create_deployment("missing", "d", &request()).is_err());

        mock.add_resource_group("chef-ama-2", "westus");
        mock.create_deployment("chef-ama-2", "d", &request()).unwrap();
        assert_eq!(mock.deployments().len(), 1);
        assert_eq!(mock.deployments()[0].group, "chef-ama-2");
    }

    #[test]
    fn test_mock_deployment_state() {
        let mock = MockBackend::new();
        mock.add_resource_group("chef-ama-2", "westus");
        assert!(mock.deployment_state("chef-ama-2", "d").is_err());

        mock.script_deployment(
            "d",
            vec![
                DeploymentStatus::new("Running"),
                DeploymentStatus::failed("quota exceeded"),
            ],
        );
        mock.create_deployment("chef-ama-2", "d", &request()).unwrap();

        let first = mock.deployment_state("chef-ama-2", "d").unwrap();
        assert_eq!(first.state, "Running");
        let last = mock.deployment_state("chef-ama-2", "d").unwrap();
        assert_eq!(last, DeploymentStatus::failed("quota exceeded"));
        assert_eq!(mock.deployment_state("chef-ama-2", "d").unwrap(), last);
    }

    #[test]
    fn test_mock_storage() {
        let mock = MockBackend::new();
        mock.add_storage("storage-rg", "chefama", "templates", "a2V5");

        assert!(mock.storage_account_exists("chefama").unwrap());
        let exists = |container| mock.container_exists("storage-rg", "chefama", container);
        assert!(exists("templates").unwrap());
        assert!(!exists("other").unwrap());

        let keys = mock.list_storage_keys("storage-rg", "chefama").unwrap();
        assert_eq!(keys[0].value, "a2V5");
    }

    #[test]
    fn test_mock_upload() {
        let mock = MockBackend::new();
        mock.upload_blob(&target(), "nested/a.json", b"{}").unwrap();
        let blob = mock.blob("templates", "nested/a.json");
        assert_eq!(blob, Some(b"{}".to_vec()));

        mock.fail_blob("b.json");
        assert!(mock.upload_blob(&target(), "b.json", b"{}").is_err());
        assert_eq!(mock.blob_names(), vec!["templates/nested/a.json"]);
    }

    #[test]
    fn test_mock_clones_share_state() {
        let mock = MockBackend::new();
        let handle = mock.clone();
        mock.add_resource_group("shared", "eastus");
        assert_eq!(handle.resource_groups(), vec!["shared"]);
    }
}
