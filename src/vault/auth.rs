//! Login strategies against the Vault server.
//!
//! Each strategy turns locally mounted material (a token file, a client
//! certificate, a service-account JWT) into a [`Credential`]. The fetcher
//! authenticates exactly once per process.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::client::VaultClient;
use crate::config::{AuthSettings, AuthType};
use crate::errors::{FetchError, Result};
use crate::secrets::SecretString;

/// Bearer token plus whatever the auth backend told us about it.
#[derive(Debug, Clone)]
pub struct Credential {
    pub token: SecretString,
    pub policies: Vec<String>,
    pub metadata: Value,
}

impl Credential {
    /// Parse the `auth` block returned by a login endpoint.
    fn from_login(login_path: &str, response: &Value) -> Result<Self> {
        let auth = response
            .get("auth")
            .filter(|auth| auth.is_object())
            .ok_or_else(|| FetchError::authentication(format!("{} returned no auth block", login_path), None))?;

        let token = auth
            .get("client_token")
            .and_then(Value::as_str)
            .ok_or_else(|| FetchError::authentication(format!("{} returned no client token", login_path), None))?;

        Ok(Self {
            token: SecretString::new(token),
            policies: string_list(auth.get("policies")),
            metadata: auth.get("metadata").cloned().unwrap_or(Value::Null),
        })
    }
}

/// A way of obtaining a [`Credential`] from Vault.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// The auth type this strategy implements
    fn auth_type(&self) -> AuthType;

    /// Log in using `client`, which carries no token yet.
    async fn authenticate(&self, client: &VaultClient) -> Result<Credential>;
}

/// Pick the strategy matching the configured auth type.
pub fn strategy_for(settings: &AuthSettings) -> Box<dyn AuthStrategy> {
    match settings.auth_type {
        AuthType::Token => Box::new(TokenAuth::new(settings.auth_file.clone().unwrap_or_default())),
        AuthType::Cert => Box::new(CertAuth::new(
            settings.auth_file.clone().unwrap_or_default(),
            settings.auth_path.clone(),
        )),
        AuthType::Kubernetes => Box::new(KubernetesAuth::new(
            settings.serviceaccount_dir.clone(),
            settings.role.clone().unwrap_or_default(),
            settings.auth_path.clone(),
        )),
    }
}

/// Run `strategy` and log what Vault granted.
pub async fn authenticate(strategy: &dyn AuthStrategy, client: &VaultClient) -> Result<Credential> {
    let credential = strategy.authenticate(client).await?;

    info!(
        auth_type = %strategy.auth_type(),
        policies = ?credential.policies,
        metadata = %credential.metadata,
        "Authenticated with Vault Server"
    );

    Ok(credential)
}

/// Static token read from a file, verified with `auth/token/lookup-self`.
///
/// A file holding an X.509 certificate instead of a token is handed over to
/// [`CertAuth`] on the default `cert` mount.
pub struct TokenAuth {
    auth_file: PathBuf,
}

impl TokenAuth {
    pub fn new(auth_file: impl Into<PathBuf>) -> Self {
        Self { auth_file: auth_file.into() }
    }
}

#[async_trait]
impl AuthStrategy for TokenAuth {
    fn auth_type(&self) -> AuthType {
        AuthType::Token
    }

    async fn authenticate(&self, client: &VaultClient) -> Result<Credential> {
        let contents = read_auth_file(&self.auth_file)?;

        if contains_certificate(&contents) {
            debug!(path = %self.auth_file.display(), "Auth file holds a certificate, using cert login");
            return CertAuth::new(&self.auth_file, AuthType::Cert.default_path())
                .authenticate(client)
                .await;
        }

        let text = String::from_utf8(contents)
            .map_err(|_| FetchError::config(format!("authfile {} is not valid UTF-8", self.auth_file.display())))?;
        let token = SecretString::new(text.trim());

        let response = client
            .with_token(token.clone())
            .get("auth/token/lookup-self")
            .await
            .map_err(|e| FetchError::authentication("token lookup failed", Some(e)))?;

        let data = response
            .get("data")
            .filter(|data| data.is_object())
            .ok_or_else(|| FetchError::authentication("token lookup returned no data", None))?;

        let token = data.get("id").and_then(Value::as_str).map(SecretString::new).unwrap_or(token);

        Ok(Credential {
            token,
            policies: string_list(data.get("policies")),
            metadata: data.get("meta").cloned().unwrap_or(Value::Null),
        })
    }
}

/// TLS client-certificate login.
pub struct CertAuth {
    auth_file: PathBuf,
    auth_path: String,
}

impl CertAuth {
    pub fn new(auth_file: impl Into<PathBuf>, auth_path: impl Into<String>) -> Self {
        Self { auth_file: auth_file.into(), auth_path: auth_path.into() }
    }
}

#[async_trait]
impl AuthStrategy for CertAuth {
    fn auth_type(&self) -> AuthType {
        AuthType::Cert
    }

    async fn authenticate(&self, client: &VaultClient) -> Result<Credential> {
        let pem = read_auth_file(&self.auth_file)?;
        let login_path = format!("auth/{}/login", self.auth_path);

        let response = client
            .with_identity(&pem)
            .map_err(|e| FetchError::config(e.to_string()))?
            .post(&login_path, None)
            .await
            .map_err(|e| FetchError::authentication(format!("login at {} failed", login_path), Some(e)))?;

        Credential::from_login(&login_path, &response)
    }
}

/// Kubernetes service-account login.
pub struct KubernetesAuth {
    serviceaccount_dir: PathBuf,
    role: String,
    auth_path: String,
}

impl KubernetesAuth {
    pub fn new(
        serviceaccount_dir: impl Into<PathBuf>,
        role: impl Into<String>,
        auth_path: impl Into<String>,
    ) -> Self {
        Self { serviceaccount_dir: serviceaccount_dir.into(), role: role.into(), auth_path: auth_path.into() }
    }
}

#[async_trait]
impl AuthStrategy for KubernetesAuth {
    fn auth_type(&self) -> AuthType {
        AuthType::Kubernetes
    }

    async fn authenticate(&self, client: &VaultClient) -> Result<Credential> {
        if !self.serviceaccount_dir.is_dir() {
            return Err(FetchError::config(format!(
                "serviceaccount dir {} not found",
                self.serviceaccount_dir.display()
            )));
        }

        let jwt_path = self.serviceaccount_dir.join("token");
        let jwt = std::fs::read_to_string(&jwt_path)
            .map(|s| SecretString::new(s.trim()))
            .map_err(|e| FetchError::io(format!("reading {}", jwt_path.display()), e))?;

        let login_path = format!("auth/{}/login", self.auth_path);
        let body = json!({ "role": self.role, "jwt": jwt.expose_secret() });

        let response = client
            .post(&login_path, Some(&body))
            .await
            .map_err(|e| FetchError::authentication(format!("login at {} failed", login_path), Some(e)))?;

        Credential::from_login(&login_path, &response)
    }
}

fn read_auth_file(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(FetchError::config(format!("authfile {} not found", path.display())));
    }
    std::fs::read(path).map_err(|e| FetchError::io(format!("reading {}", path.display()), e))
}

/// Whether `contents` holds at least one parseable PEM certificate.
fn contains_certificate(contents: &[u8]) -> bool {
    x509_parser::pem::Pem::iter_from_buffer(contents)
        .filter_map(|pem| pem.ok())
        .any(|pem| pem.label == "CERTIFICATE" && pem.parse_x509().is_ok())
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}
