//! # Configuration Management
//!
//! Runtime configuration for one fetch pass. The binary builds a
//! [`FetcherConfig`] from command line flags and environment variables
//! (see `crate::cli`); [`FetcherConfig::validate`] then rejects anything that
//! would make the pass fail, before a single network call is made.

pub mod manifest;

use std::fmt;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use validator::Validate;

use crate::errors::{FetchError, Result};
use crate::secrets::KvLayout;
use crate::vault::RetryPolicy;

pub use manifest::{CertificateRequest, Manifest, SecretRequest};

/// Default location of the mounted service-account material.
pub const DEFAULT_SERVICEACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Supported Vault login mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    Token,
    Cert,
    Kubernetes,
}

impl AuthType {
    /// Auth mount used when no explicit auth path is configured.
    pub fn default_path(&self) -> &'static str {
        match self {
            AuthType::Token => "token",
            AuthType::Cert => "cert",
            AuthType::Kubernetes => "kubernetes",
        }
    }
}

impl fmt::Display for AuthType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.default_path())
    }
}

impl FromStr for AuthType {
    type Err = FetchError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token" => Ok(AuthType::Token),
            "cert" => Ok(AuthType::Cert),
            "kubernetes" | "kubernetes-serviceaccount" => Ok(AuthType::Kubernetes),
            other => Err(FetchError::config(format!("Unsupported Vault Auth Type: {}", other))),
        }
    }
}

/// Everything an auth strategy needs.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub auth_type: AuthType,
    /// Mount of the auth backend, e.g. `kubernetes` in `auth/kubernetes/login`
    pub auth_path: String,
    /// Role presented by the service-account login
    pub role: Option<String>,
    /// Token or client-certificate file
    pub auth_file: Option<PathBuf>,
    pub serviceaccount_dir: PathBuf,
}

/// Where the secret and certificate requests are declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    /// A downward-API file of `secret/NAME="path"` and `pki/name="path?query"` lines
    Annotations(PathBuf),
    /// Environment variables whose names start with the given prefixes
    Environment { secret_prefix: String, pki_prefix: String },
}

impl ManifestSource {
    /// Decide the manifest mode.
    ///
    /// An existing annotations file always wins. Without one, both env
    /// prefixes must be set; anything else is a configuration error.
    pub fn resolve(
        annotations: Option<PathBuf>,
        secret_prefix: Option<String>,
        pki_prefix: Option<String>,
    ) -> Result<Self> {
        if let Some(path) = annotations.filter(|p| p.is_file()) {
            return Ok(ManifestSource::Annotations(path));
        }

        match (secret_prefix.filter(|p| !p.is_empty()), pki_prefix.filter(|p| !p.is_empty())) {
            (Some(secret_prefix), Some(pki_prefix)) => {
                Ok(ManifestSource::Environment { secret_prefix, pki_prefix })
            }
            _ => Err(FetchError::config("must specify either annotations file or env/pki prefixes")),
        }
    }
}

/// Validated settings for one fetch pass.
#[derive(Debug, Clone, Validate)]
pub struct FetcherConfig {
    #[validate(length(min = 1, message = "vault address not found"))]
    pub vault_address: String,

    pub tls_verify: bool,

    /// KV mount, e.g. `secret`
    #[validate(length(min = 1, message = "vault mount cannot be empty"))]
    pub mount: String,

    /// Path prefix inside the mount, e.g. `apps`
    pub prefix: String,

    /// KV version 2 layout (`<mount>/data/<prefix>/<key>`)
    pub kv_v2: bool,

    pub auth: AuthSettings,

    pub manifest: ManifestSource,

    /// Shared volume the output tree is written to
    pub output_dir: PathBuf,

    /// Base URL of the Kubernetes API server
    #[validate(length(min = 1, message = "api_url is null"))]
    pub api_url: String,

    pub pod_ip: Option<Ipv4Addr>,

    pub pod_hostname: Option<String>,

    #[validate(range(min = 1, max = 100, message = "retry attempts must be between 1 and 100"))]
    pub retry_attempts: u32,

    pub retry_delay: Duration,
}

impl FetcherConfig {
    /// Check field constraints and the filesystem preconditions.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(FetchError::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        url::Url::parse(&self.vault_address)
            .map_err(|e| FetchError::config(format!("invalid vault address {}: {}", self.vault_address, e)))?;
        url::Url::parse(&self.api_url)
            .map_err(|e| FetchError::config(format!("invalid api_url {}: {}", self.api_url, e)))?;

        if !self.auth.serviceaccount_dir.is_dir() {
            return Err(FetchError::config(format!(
                "serviceaccount dir {} not found",
                self.auth.serviceaccount_dir.display()
            )));
        }

        match self.auth.auth_type {
            AuthType::Token | AuthType::Cert => {
                if !self.auth.auth_file.as_ref().is_some_and(|p| p.is_file()) {
                    return Err(FetchError::config("authfile not found"));
                }
            }
            AuthType::Kubernetes => {
                if self.auth.role.as_deref().map_or(true, str::is_empty) {
                    return Err(FetchError::config("kubernetes auth requires a role"));
                }
            }
        }

        if !self.output_dir.is_dir() {
            return Err(FetchError::config(format!(
                "output dir {} not found",
                self.output_dir.display()
            )));
        }

        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, self.retry_delay)
    }

    /// Where secrets live inside the store.
    pub fn kv_layout(&self) -> KvLayout {
        KvLayout { mount: self.mount.clone(), prefix: self.prefix.clone(), kv_v2: self.kv_v2 }
    }
}
