//! # Command Line Interface
//!
//! Flags for the `secret-fetcher` binary. Every flag can also be set through
//! the environment variable named next to it, which is how the container is
//! normally configured.

use clap::Parser;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{AuthSettings, AuthType, FetcherConfig, ManifestSource, DEFAULT_SERVICEACCOUNT_DIR};
use crate::errors::{FetchError, Result};
use crate::observability::LogFormat;

#[derive(Parser, Debug, Clone)]
#[command(name = "secret-fetcher")]
#[command(about = "Fetch secrets and certificates from Vault into a shared volume")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct FetcherArgs {
    /// Vault server address
    #[arg(long, env = "VAULT_ADDR")]
    pub vault_addr: Option<String>,

    /// token, cert or kubernetes
    #[arg(long, env = "VAULT_AUTH_TYPE", default_value = "token")]
    pub vault_auth_type: String,

    /// Auth backend mount, defaults to the auth type
    #[arg(long, env = "VAULT_AUTH_PATH")]
    pub vault_auth_path: Option<String>,

    /// Role for kubernetes auth
    #[arg(long, env = "VAULT_AUTH_ROLE")]
    pub vault_auth_role: Option<String>,

    /// Token or client certificate file
    #[arg(long, env = "VAULT_AUTH_FILE")]
    pub vault_auth_file: Option<PathBuf>,

    /// Verify the Vault server certificate
    #[arg(long, env = "VAULT_TLS_VERIFY", default_value_t = true, action = clap::ArgAction::Set)]
    pub vault_tls_verify: bool,

    #[arg(long, env = "VAULT_MOUNT", default_value = "secret")]
    pub vault_mount: String,

    #[arg(long, env = "VAULT_PREFIX", default_value = "apps")]
    pub vault_prefix: String,

    /// Read from a KV version 2 mount
    #[arg(long, env = "VAULT_KV_V2", default_value_t = false, action = clap::ArgAction::Set)]
    pub vault_kv_v2: bool,

    /// Directory the secrets are written to
    #[arg(long, env = "SIDECAR_SECRET_PATH", default_value = "/secrets")]
    pub output_path: PathBuf,

    #[arg(long, env = "SERVICEACCOUNT_DIR", default_value = DEFAULT_SERVICEACCOUNT_DIR)]
    pub serviceaccount_dir: PathBuf,

    /// Downward-API annotations file
    #[arg(long, env = "SECRET_ANNOTATIONS")]
    pub annotations: Option<PathBuf>,

    /// Env var prefix declaring secrets (without annotations file)
    #[arg(long, env = "SECRET_ENV_PREFIX")]
    pub secret_env_prefix: Option<String>,

    /// Env var prefix declaring certificates (without annotations file)
    #[arg(long, env = "PKI_ENV_PREFIX")]
    pub pki_env_prefix: Option<String>,

    #[arg(long, env = "POD_IP")]
    pub pod_ip: Option<Ipv4Addr>,

    #[arg(long, env = "POD_HOSTNAME")]
    pub pod_hostname: Option<String>,

    /// Kubernetes API URL, defaults to https://$KUBERNETES_PORT_443_TCP_ADDR
    #[arg(long, env = "KUBERNETES_API_URL")]
    pub kubernetes_api_url: Option<String>,

    /// Attempts per request when Vault rate limits
    #[arg(long, env = "VAULT_RETRY_ATTEMPTS", default_value_t = 5)]
    pub retry_attempts: u32,

    /// Delay between rate-limited attempts
    #[arg(long, env = "VAULT_RETRY_DELAY_MS", default_value_t = 1000)]
    pub retry_delay_ms: u64,

    /// json or text
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl FetcherArgs {
    pub fn log_format(&self) -> Result<LogFormat> {
        self.log_format.parse()
    }

    /// Turn flags into a [`FetcherConfig`]. Validation happens later, in
    /// [`FetcherConfig::validate`].
    pub fn into_config(self) -> Result<FetcherConfig> {
        let auth_type: AuthType = self.vault_auth_type.parse()?;
        let manifest = ManifestSource::resolve(self.annotations, self.secret_env_prefix, self.pki_env_prefix)?;

        let api_url = self
            .kubernetes_api_url
            .or_else(|| std::env::var("KUBERNETES_PORT_443_TCP_ADDR").ok().map(|addr| format!("https://{}", addr)))
            .unwrap_or_default();

        Ok(FetcherConfig {
            vault_address: self.vault_addr.unwrap_or_default(),
            tls_verify: self.vault_tls_verify,
            mount: self.vault_mount,
            prefix: self.vault_prefix,
            kv_v2: self.vault_kv_v2,
            auth: AuthSettings {
                auth_type,
                auth_path: self.vault_auth_path.unwrap_or_else(|| auth_type.default_path().to_string()),
                role: self.vault_auth_role,
                auth_file: self.vault_auth_file,
                serviceaccount_dir: self.serviceaccount_dir,
            },
            manifest,
            output_dir: self.output_path,
            api_url,
            pod_ip: self.pod_ip,
            pod_hostname: self.pod_hostname,
            retry_attempts: self.retry_attempts,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        })
    }
}

impl TryFrom<FetcherArgs> for FetcherConfig {
    type Error = FetchError;

    fn try_from(args: FetcherArgs) -> Result<Self> {
        args.into_config()
    }
}
