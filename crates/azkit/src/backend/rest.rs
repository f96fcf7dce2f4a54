//! Azure REST backend.
//!
//! Resource Manager calls are authorized with a service principal bearer
//! token; blob uploads are signed with the storage account key.

use crate::auth::AccessToken;
use crate::backend::Backend;
use crate::blob::{self, STORAGE_API_VERSION, SharedKey, SignedRequest};
use crate::error::{Result, check_status};
use crate::types::{
    BlobTarget, DeploymentRequest, DeploymentStatus, Endpoints, ResourceGroup, StorageKey,
};
use serde::Deserialize;

/// API version for `Microsoft.Resources`.
const RESOURCES_API_VERSION: &str = "2021-04-01";

/// API version for `Microsoft.Storage`.
const STORAGE_MGMT_API_VERSION: &str = "2023-01-01";

/// HTTP agent that hands error responses back to the caller.
///
/// Azure explains failures in the response body, which is lost when the
/// status is turned into a transport error.
#[must_use]
pub fn agent() -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .build()
        .into()
}

/// Azure REST backend bound to one subscription.
pub struct RestBackend {
    agent: ureq::Agent,
    endpoints: Endpoints,
    subscription: String,
    token: AccessToken,
}

impl RestBackend {
    /// Create a backend for `subscription` using an already acquired token.
    pub fn new(
        agent: ureq::Agent,
        endpoints: Endpoints,
        subscription: impl Into<String>,
        token: AccessToken,
    ) -> Self {
        Self {
            agent,
            endpoints,
            subscription: subscription.into(),
            token,
        }
    }

    fn subscription_url(&self) -> String {
        format!(
            "{}/subscriptions/{}",
            self.endpoints.management.trim_end_matches('/'),
            self.subscription
        )
    }

    fn resource_group_url(&self, name: &str) -> String {
        format!(
            "{}/resourcegroups/{}?api-version={RESOURCES_API_VERSION}",
            self.subscription_url(),
            urlencoding::encode(name)
        )
    }

    fn deployment_url(&self, group: &str, name: &str) -> String {
        format!(
            "{}/resourcegroups/{}/providers/Microsoft.Resources/deployments/{}?api-version={RESOURCES_API_VERSION}",
            self.subscription_url(),
            urlencoding::encode(group),
            urlencoding::encode(name)
        )
    }

    fn name_availability_url(&self) -> String {
        format!(
            "{}/providers/Microsoft.Storage/checkNameAvailability?api-version={STORAGE_MGMT_API_VERSION}",
            self.subscription_url()
        )
    }

    fn storage_account_url(&self, group: &str, account: &str) -> String {
        format!(
            "{}/resourceGroups/{}/providers/Microsoft.Storage/storageAccounts/{}",
            self.subscription_url(),
            urlencoding::encode(group),
            urlencoding::encode(account)
        )
    }

    fn container_url(&self, group: &str, account: &str, container: &str) -> String {
        format!(
            "{}/blobServices/default/containers/{}?api-version={STORAGE_MGMT_API_VERSION}",
            self.storage_account_url(group, account),
            urlencoding::encode(container)
        )
    }

    fn list_keys_url(&self, group: &str, account: &str) -> String {
        format!(
            "{}/listKeys?api-version={STORAGE_MGMT_API_VERSION}",
            self.storage_account_url(group, account)
        )
    }

    /// GET `url`, mapping 404 to `false`.
    fn exists(&self, url: &str) -> Result<bool> {
        let response = self
            .agent
            .get(url)
            .header("Authorization", self.token.bearer())
            .call()?;
        if response.status() == 404 {
            return Ok(false);
        }
        check_status(response)?;
        Ok(true)
    }
}

impl Backend for RestBackend {
    fn resource_group_exists(&self, name: &str) -> Result<bool> {
        self.exists(&self.resource_group_url(name))
    }

    fn delete_resource_group(&self, name: &str) -> Result<()> {
        let url = self.resource_group_url(name);
        let response = self
            .agent
            .delete(&url)
            .header("Authorization", self.token.bearer())
            .call()?;
        check_status(response)?;
        Ok(())
    }

    fn create_resource_group(&self, name: &str, location: &str) -> Result<ResourceGroup> {
        let url = self.resource_group_url(name);
        let body = serde_json::json!({ "location": location });

        let response = self
            .agent
            .put(&url)
            .header("Authorization", self.token.bearer())
            .send_json(&body)?;
        let resource_group: ArmResourceGroup = check_status(response)?.body_mut().read_json()?;

        Ok(resource_group.into())
    }

    fn create_deployment(
        &self,
        group: &str,
        name: &str,
        request: &DeploymentRequest,
    ) -> Result<()> {
        let url = self.deployment_url(group, name);
        let response = self
            .agent
            .put(&url)
            .header("Authorization", self.token.bearer())
            .send_json(request.to_body())?;
        check_status(response)?;
        Ok(())
    }

    fn deployment_state(&self, group: &str, name: &str) -> Result<DeploymentStatus> {
        let url = self.deployment_url(group, name);
        let response = self
            .agent
            .get(&url)
            .header("Authorization", self.token.bearer())
            .call()?;
        let deployment: ArmDeployment = check_status(response)?.body_mut().read_json()?;

        Ok(deployment.into())
    }

    fn storage_account_exists(&self, account: &str) -> Result<bool> {
        let url = self.name_availability_url();
        let body = serde_json::json!({
            "name": account,
            "type": "Microsoft.Storage/storageAccounts",
        });

        let response = self
            .agent
            .post(&url)
            .header("Authorization", self.token.bearer())
            .send_json(&body)?;
        let availability: NameAvailability = check_status(response)?.body_mut().read_json()?;

        Ok(!availability.name_available)
    }

    fn container_exists(&self, group: &str, account: &str, container: &str) -> Result<bool> {
        self.exists(&self.container_url(group, account, container))
    }

    fn list_storage_keys(&self, group: &str, account: &str) -> Result<Vec<StorageKey>> {
        let url = self.list_keys_url(group, account);
        let response = self
            .agent
            .post(&url)
            .header("Authorization", self.token.bearer())
            .send_empty()?;
        let list: KeyList = check_status(response)?.body_mut().read_json()?;

        Ok(list.keys)
    }

    fn upload_blob(&self, target: &BlobTarget, name: &str, data: &[u8]) -> Result<()> {
        let signer = SharedKey::new(&target.account, &target.key)?;
        let path = format!(
            "/{}/{}",
            urlencoding::encode(&target.container),
            blob::encode_blob_path(name)
        );
        let url = format!("{}{}", self.endpoints.blob_service(&target.account), path);
        let content_type = blob::content_type_for(name);

        let ms_headers = [
            ("x-ms-blob-type", "BlockBlob".to_string()),
            ("x-ms-date", blob::http_date(chrono::Utc::now())),
            ("x-ms-version", STORAGE_API_VERSION.to_string()),
        ];
        let authorization = signer.authorization(&SignedRequest {
            method: "PUT",
            content_length: data.len(),
            content_type,
            ms_headers: &ms_headers,
            path: &path,
        })?;

        let mut request = self
            .agent
            .put(&url)
            .header("Authorization", authorization)
            .header("Content-Type", content_type);
        for (header, value) in &ms_headers {
            request = request.header(*header, value.as_str());
        }
        check_status(request.send(data)?)?;

        log::debug!("Uploaded {} bytes to {}", data.len(), url);
        Ok(())
    }
}

// =============================================================================
// Resource Manager response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ArmResourceGroup {
    name: String,
    location: String,
    #[serde(default)]
    properties: Option<ArmResourceGroupProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmResourceGroupProperties {
    provisioning_state: Option<String>,
}

impl From<ArmResourceGroup> for ResourceGroup {
    fn from(rg: ArmResourceGroup) -> Self {
        Self {
            name: rg.name,
            location: rg.location,
            provisioning_state: rg.properties.and_then(|p| p.provisioning_state),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ArmDeployment {
    properties: ArmDeploymentProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArmDeploymentProperties {
    provisioning_state: String,
    #[serde(default)]
    error: Option<ArmError>,
}

#[derive(Debug, Deserialize)]
struct ArmError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: Vec<ArmError>,
}

impl ArmError {
    /// `code: message`, followed by the messages of nested errors.
    fn describe(&self) -> String {
        let head = match (self.code.is_empty(), self.message.is_empty()) {
            (false, false) => format!("{}: {}", self.code, self.message),
            (false, true) => self.code.clone(),
            _ => self.message.clone(),
        };
        let mut parts = vec![head];
        parts.extend(self.details.iter().map(Self::describe));
        parts.retain(|part| !part.is_empty());
        parts.join("; ")
    }
}

impl From<ArmDeployment> for DeploymentStatus {
    fn from(deployment: ArmDeployment) -> Self {
        let properties = deployment.properties;
        Self {
            state: properties.provisioning_state,
            error: properties.error.map(|e| e.describe()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NameAvailability {
    name_available: bool,
}

#[derive(Debug, Deserialize)]
struct KeyList {
    #[serde(default)]
    keys: Vec<StorageKey>,
}
