//! Minimal HTTP client for the Vault logical API.
//!
//! Only the handful of calls the fetcher needs: login, token lookup, logical
//! reads of secret paths and logical writes to PKI issuance paths. Responses
//! are returned as raw JSON so callers decide what a well-formed payload is.

use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::error::VaultError;
use crate::secrets::SecretString;

const TOKEN_HEADER: &str = "X-Vault-Token";

/// Connection settings shared by every client derived from one another.
#[derive(Debug, Clone)]
pub struct VaultSettings {
    /// Vault server address (e.g., "https://vault.example.com:8200")
    pub address: String,

    /// Verify the server certificate
    pub tls_verify: bool,

    pub connect_timeout: Duration,

    pub request_timeout: Duration,
}

impl VaultSettings {
    pub fn new(address: impl Into<String>, tls_verify: bool) -> Self {
        Self {
            address: address.into().trim_end_matches('/').to_string(),
            tls_verify,
            connect_timeout: Duration::from_secs(3),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// HTTP client bound to one Vault server and, once authenticated, one token.
#[derive(Clone)]
pub struct VaultClient {
    http: Client,
    settings: VaultSettings,
    token: Option<SecretString>,
}

impl std::fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultClient")
            .field("address", &self.settings.address)
            .field("tls_verify", &self.settings.tls_verify)
            .field("authenticated", &self.token.is_some())
            .finish()
    }
}

impl VaultClient {
    /// Create an unauthenticated client.
    pub fn new(settings: VaultSettings) -> Result<Self, VaultError> {
        let http = Self::builder(&settings)
            .build()
            .map_err(|e| VaultError::setup(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, settings, token: None })
    }

    /// Copy of this client that presents the given PEM (certificate and
    /// private key) during the TLS handshake.
    pub fn with_identity(&self, pem: &[u8]) -> Result<Self, VaultError> {
        let identity = reqwest::Identity::from_pem(pem)
            .map_err(|e| VaultError::setup(format!("Invalid client certificate: {}", e)))?;

        let http = Self::builder(&self.settings)
            .identity(identity)
            .build()
            .map_err(|e| VaultError::setup(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { http, settings: self.settings.clone(), token: self.token.clone() })
    }

    /// Copy of this client that sends `token` with every request.
    pub fn with_token(&self, token: SecretString) -> Self {
        Self { http: self.http.clone(), settings: self.settings.clone(), token: Some(token) }
    }

    pub fn address(&self) -> &str {
        &self.settings.address
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// `GET /v1/<path>`
    pub async fn get(&self, path: &str) -> Result<Value, VaultError> {
        self.send(Method::GET, path, None).await
    }

    /// `POST /v1/<path>`
    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<Value, VaultError> {
        self.send(Method::POST, path, body).await
    }

    /// `PUT /v1/<path>`
    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, VaultError> {
        self.send(Method::PUT, path, Some(body)).await
    }

    fn builder(settings: &VaultSettings) -> reqwest::ClientBuilder {
        Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .danger_accept_invalid_certs(!settings.tls_verify)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.settings.address, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.header(TOKEN_HEADER, token.expose_secret()),
            None => builder,
        }
    }

    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, VaultError> {
        let url = self.url(path);
        debug!(method = %method, url = %url, "Vault request");

        let mut builder = self.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|source| VaultError::Connection { url: self.settings.address.clone(), source })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|source| VaultError::Connection { url: self.settings.address.clone(), source })?;

        debug!(url = %url, status = status.as_u16(), "Vault response");

        if !status.is_success() {
            return Err(VaultError::Status {
                url: self.settings.address.clone(),
                status: status.as_u16(),
                errors: extract_errors(&text),
            });
        }

        // 204 No Content and friends
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&text)
            .map_err(|_| VaultError::Decode { url: self.settings.address.clone(), body: text })
    }
}

/// Pull the `errors` array out of a Vault error body, falling back to the raw
/// body when it is not the usual shape.
fn extract_errors(body: &str) -> Vec<String> {
    let parsed: Option<Vec<String>> = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.get("errors")?.as_array().map(|errors| {
            errors
                .iter()
                .map(|e| e.as_str().map(str::to_string).unwrap_or_else(|| e.to_string()))
                .collect()
        })
    });

    match parsed {
        Some(errors) => errors,
        None if body.trim().is_empty() => Vec::new(),
        None => vec![body.trim().to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_trim_trailing_slash() {
        let settings = VaultSettings::new("https://vault.example.com:8200/", true);
        assert_eq!(settings.address, "https://vault.example.com:8200");
        assert_eq!(settings.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_url_building() {
        let client = VaultClient::new(VaultSettings::new("http://127.0.0.1:8200", true)).unwrap();
        assert_eq!(client.url("secret/apps/foo"), "http://127.0.0.1:8200/v1/secret/apps/foo");
        assert_eq!(client.url("/auth/cert/login"), "http://127.0.0.1:8200/v1/auth/cert/login");
    }

    #[test]
    fn test_with_token_marks_authenticated() {
        let client = VaultClient::new(VaultSettings::new("http://127.0.0.1:8200", true)).unwrap();
        assert!(!client.is_authenticated());
        let client = client.with_token(SecretString::new("sometoken"));
        assert!(client.is_authenticated());
        assert!(!format!("{:?}", client).contains("sometoken"));
    }

    #[test]
    fn test_extract_errors() {
        assert_eq!(
            extract_errors(r#"{"errors":["sample error"]}"#),
            vec!["sample error".to_string()]
        );
        assert_eq!(extract_errors("upstream timeout"), vec!["upstream timeout".to_string()]);
        assert!(extract_errors("").is_empty());
        assert!(extract_errors(r#"{"errors":[]}"#).is_empty());
    }

    #[test]
    fn test_invalid_identity_is_setup_error() {
        let client = VaultClient::new(VaultSettings::new("http://127.0.0.1:8200", true)).unwrap();
        let err = client.with_identity(b"not a pem").unwrap_err();
        assert!(matches!(err, VaultError::Setup(_)));
    }
}
