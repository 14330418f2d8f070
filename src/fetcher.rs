//! One fetch-and-signal pass.
//!
//! [`Fetcher::new`] performs every local check (configuration, manifest,
//! service-account material) so configuration errors surface before any
//! network call. [`Fetcher::run`] then authenticates, resolves secrets and
//! certificates, looks up the host IP and only then writes the output tree.

use tracing::{info, instrument};

use crate::config::{FetcherConfig, Manifest};
use crate::errors::{FetchError, Result};
use crate::kube::ClusterMetadataClient;
use crate::output::{BootstrapValues, OutputWriter};
use crate::pki::CertificateIssuer;
use crate::pod::PodIdentity;
use crate::secrets::SecretResolver;
use crate::vault::{authenticate, strategy_for, VaultClient, VaultSettings};

pub struct Fetcher {
    config: FetcherConfig,
    manifest: Manifest,
    pod: PodIdentity,
    cluster: ClusterMetadataClient,
    client: VaultClient,
}

impl Fetcher {
    /// Validate everything that can be checked without the network.
    pub fn new(config: FetcherConfig) -> Result<Self> {
        config.validate()?;

        let manifest = Manifest::load(&config.manifest)?;
        info!(keys = ?manifest.secret_names(), "secrets found");
        info!(keys = ?manifest.certificate_names(), "PKI found");

        let cluster =
            ClusterMetadataClient::from_serviceaccount_dir(&config.api_url, &config.auth.serviceaccount_dir)?;

        let client = VaultClient::new(VaultSettings::new(config.vault_address.clone(), config.tls_verify))
            .map_err(|e| FetchError::config(e.to_string()))?;

        let pod = PodIdentity::discover(config.pod_ip, config.pod_hostname.clone());

        Ok(Self { config, manifest, pod, cluster, client })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Authenticate, resolve, write. Nothing is written unless every secret
    /// and every certificate was obtained. When both passes fail, both sets
    /// of failures are reported together, secrets first.
    #[instrument(skip(self), fields(vault = %self.config.vault_address, output = %self.config.output_dir.display()))]
    pub async fn run(self) -> Result<()> {
        let strategy = strategy_for(&self.config.auth);
        let credential = authenticate(strategy.as_ref(), &self.client).await?;
        let client = self.client.with_token(credential.token);

        let retry = self.config.retry_policy();
        let resolver = SecretResolver::new(client.clone(), self.config.kv_layout(), retry);
        let issuer = CertificateIssuer::new(client, retry, self.pod.clone());

        let (secrets, certificates) =
            tokio::join!(resolver.resolve(&self.manifest.secrets), issuer.issue(&self.manifest.certificates));
        let (secrets, certificates) = match (secrets?.into_result(), certificates.into_result()) {
            (Ok(secrets), Ok(certificates)) => (secrets, certificates),
            (Err(e), Ok(_)) | (Ok(_), Err(e)) => return Err(e),
            (Err(secret_failures), Err(certificate_failures)) => {
                return Err(FetchError::Aggregate {
                    heading: "Errors fetching secrets and certificates".to_string(),
                    failures: vec![secret_failures, certificate_failures],
                })
            }
        };

        let host_ip = self.cluster.host_ip(&self.pod.hostname).await?;

        OutputWriter::new(&self.config.output_dir).write(
            &secrets,
            &certificates,
            &BootstrapValues::new(host_ip),
        )?;

        info!(secrets = secrets.len(), certificates = certificates.len(), "Fetch complete");
        Ok(())
    }
}
