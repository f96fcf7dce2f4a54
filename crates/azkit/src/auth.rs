//! Service principal credentials and token acquisition.
//!
//! Credentials live in an INI file (by default `~/.azure/credentials`) with
//! one section per subscription id:
//!
//! ```ini
//! [00000000-0000-0000-0000-000000000000]
//! client_id = ...
//! client_secret = ...
//! tenant_id = ...
//! ```

use crate::error::{Error, Result};
use ini::Ini;
use serde::Deserialize;
use std::fmt;
use std::path::Path;

/// Resource identifier for Azure Resource Manager tokens.
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";

/// Service principal credentials for one subscription.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Application (client) id.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
    /// Directory (tenant) id.
    pub tenant_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

impl Credentials {
    /// Read the credentials for `subscription` from an INI file.
    pub fn from_file(path: &Path, subscription: &str) -> Result<Self> {
        if !path.exists() {
            return Err(Error::CredentialsNotFound {
                path: path.to_path_buf(),
            });
        }

        let conf = Ini::load_from_file(path).map_err(|e| Error::InvalidCredentials {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let section = conf
            .section(Some(subscription))
            .ok_or_else(|| Error::SubscriptionNotFound {
                subscription: subscription.to_string(),
                path: path.to_path_buf(),
            })?;

        let field = |name: &'static str| -> Result<String> {
            section
                .get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| Error::MissingCredential {
                    subscription: subscription.to_string(),
                    field: name,
                })
        };

        Ok(Self {
            client_id: field("client_id")?,
            client_secret: field("client_secret")?,
            tenant_id: field("tenant_id")?,
        })
    }
}

/// A bearer token for Azure REST calls.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
}

impl AccessToken {
    /// Wrap a raw token.
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.secret)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Describe a rejected token request from the OAuth2 error body.
fn token_error(status: u16, body: &str) -> String {
    let Ok(err) = serde_json::from_str::<TokenError>(body) else {
        return format!("token request rejected with HTTP {status}");
    };
    let reason = match err.error_description {
        Some(description) => format!("{}: {description}", err.error),
        None => err.error,
    };
    format!("token request rejected with HTTP {status}: {reason}")
}

/// Token endpoint for a tenant.
pub(crate) fn token_url(login_base: &str, tenant_id: &str) -> String {
    format!(
        "{}/{}/oauth2/token",
        login_base.trim_end_matches('/'),
        tenant_id
    )
}

/// Obtain a token through the OAuth2 client credentials flow.
pub fn acquire_token(
    agent: &ureq::Agent,
    login_base: &str,
    credentials: &Credentials,
    resource: &str,
) -> Result<AccessToken> {
    let url = token_url(login_base, &credentials.tenant_id);
    log::debug!("Requesting token for {} from {url}", credentials.client_id);

    let mut response = agent.post(&url).send_form([
        ("grant_type", "client_credentials"),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("resource", resource),
    ])?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.body_mut().read_to_string().unwrap_or_default();
        return Err(Error::Auth(token_error(status, &body)));
    }

    let token: TokenResponse = response.body_mut().read_json()?;
    Ok(AccessToken::new(token.access_token))
}
