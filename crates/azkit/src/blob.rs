//! Blob service request signing.
//!
//! Uploads are authorized with the storage account key using the SharedKey
//! scheme: an HMAC-SHA256 over a canonical description of the request.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Blob service REST API version sent in `x-ms-version`.
pub const STORAGE_API_VERSION: &str = "2021-08-06";

type HmacSha256 = Hmac<Sha256>;

/// The parts of a blob request covered by the signature.
#[derive(Debug, Clone)]
pub struct SignedRequest<'a> {
    /// HTTP method.
    pub method: &'a str,
    /// Body length in bytes.
    pub content_length: usize,
    /// `Content-Type` header value.
    pub content_type: &'a str,
    /// `x-ms-*` headers sent with the request.
    pub ms_headers: &'a [(&'a str, String)],
    /// Encoded URL path, starting with `/`.
    pub path: &'a str,
}

/// SharedKey signer for one storage account.
pub struct SharedKey {
    account: String,
    key: Vec<u8>,
}

impl SharedKey {
    /// Create a signer from the base64 account key.
    pub fn new(account: impl Into<String>, key: &str) -> Result<Self> {
        let key = STANDARD
            .decode(key.trim())
            .map_err(|e| Error::Signing(format!("account key is not valid base64: {e}")))?;
        Ok(Self {
            account: account.into(),
            key,
        })
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self, request: &SignedRequest<'_>) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| Error::Signing(e.to_string()))?;
        mac.update(self.string_to_sign(request).as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!("SharedKey {}:{}", self.account, signature))
    }

    fn string_to_sign(&self, request: &SignedRequest<'_>) -> String {
        // Zero length is signed as an empty string.
        let content_length = if request.content_length == 0 {
            String::new()
        } else {
            request.content_length.to_string()
        };

        let mut headers: Vec<(String, &str)> = request
            .ms_headers
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value.trim()))
            .filter(|(name, _)| name.starts_with("x-ms-"))
            .collect();
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = String::new();
        out.push_str(request.method);
        out.push('\n');
        // Content-Encoding, Content-Language
        out.push_str("\n\n");
        out.push_str(&content_length);
        out.push('\n');
        // Content-MD5
        out.push('\n');
        out.push_str(request.content_type);
        out.push('\n');
        // Date, If-Modified-Since, If-Match, If-None-Match, If-Unmodified-Since, Range
        out.push_str("\n\n\n\n\n\n");
        for (name, value) in headers {
            out.push_str(&name);
            out.push(':');
            out.push_str(value);
            out.push('\n');
        }
        out.push('/');
        out.push_str(&self.account);
        out.push_str(request.path);
        out
    }
}

/// Percent-encode a blob name, keeping `/` as the virtual directory separator.
pub fn encode_blob_path(name: &str) -> String {
    name.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Format a timestamp for the `x-ms-date` header.
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Content type to store with a blob, from its extension.
pub fn content_type_for(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        Some("sh") | Some("rb") | Some("txt") | Some("md") => "text/plain",
        Some("js") => "application/javascript",
        Some("ps1") => "text/plain",
        _ => "application/octet-stream",
    }
}
