//! Issuance of declared certificates from Vault PKI roles.

use futures::future::join_all;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use super::params::build_request_body;
use crate::config::CertificateRequest;
use crate::errors::{FetchError, Result};
use crate::pod::PodIdentity;
use crate::secrets::SecretString;
use crate::vault::{RetryPolicy, VaultClient, VaultError};

/// The `data` block of a successful issue response.
#[derive(Clone, Deserialize)]
pub struct CertBundle {
    /// PEM-encoded X.509 certificate
    pub certificate: String,

    /// PEM-encoded private key (redacted in logs)
    pub private_key: SecretString,

    /// e.g. `rsa` or `ec`
    pub private_key_type: String,

    /// PEM-encoded issuing CA certificate
    pub issuing_ca: String,

    /// Intermediate chain, absent for certificates issued by a root
    #[serde(default)]
    pub ca_chain: Option<Vec<String>>,

    pub serial_number: String,

    /// Unix timestamp, written out as decimal text
    #[serde(deserialize_with = "deserialize_expiration")]
    pub expiration: String,
}

impl CertBundle {
    /// CA chain as a single PEM document.
    pub fn ca_chain_pem(&self) -> Option<String> {
        self.ca_chain.as_ref().map(|chain| chain.join("\n"))
    }
}

impl std::fmt::Debug for CertBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertBundle")
            .field("certificate", &format!("[{} bytes PEM]", self.certificate.len()))
            .field("private_key", &self.private_key)
            .field("private_key_type", &self.private_key_type)
            .field("ca_chain", &self.ca_chain.as_ref().map(Vec::len))
            .field("serial_number", &self.serial_number)
            .field("expiration", &self.expiration)
            .finish()
    }
}

fn deserialize_expiration<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s),
        other => Err(serde::de::Error::custom(format!("invalid expiration {}", other))),
    }
}

/// Issued bundles and failures of one issuance pass, in request order.
#[derive(Debug, Default)]
pub struct IssueOutcome {
    pub bundles: Vec<(String, CertBundle)>,
    pub failures: Vec<FetchError>,
}

impl IssueOutcome {
    pub fn into_result(self) -> Result<Vec<(String, CertBundle)>> {
        FetchError::from_failures("Errors issuing certificates", self.failures)?;
        Ok(self.bundles)
    }
}

/// Requests every declared certificate.
pub struct CertificateIssuer {
    client: VaultClient,
    retry: RetryPolicy,
    pod: PodIdentity,
}

impl CertificateIssuer {
    pub fn new(client: VaultClient, retry: RetryPolicy, pod: PodIdentity) -> Self {
        Self { client, retry, pod }
    }

    /// Issue all `requests` concurrently. No requests, no work.
    pub async fn issue(&self, requests: &[CertificateRequest]) -> IssueOutcome {
        let mut outcome = IssueOutcome::default();
        if requests.is_empty() {
            return outcome;
        }

        let results = join_all(requests.iter().map(|request| self.issue_one(request))).await;

        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(bundle) => outcome.bundles.push((request.name.clone(), bundle)),
                Err(e) => outcome.failures.push(e),
            }
        }

        debug!(
            issued = outcome.bundles.len(),
            failed = outcome.failures.len(),
            "Certificate issuance finished"
        );
        outcome
    }

    async fn issue_one(&self, request: &CertificateRequest) -> Result<CertBundle> {
        let body = Value::Object(build_request_body(&request.name, &request.parameters, &self.pod)?);
        let path = request.issuance_path.as_str();

        let client = &self.client;
        let payload = &body;
        let response = self
            .retry
            .run(path, move || client.put(path, payload), |e: &VaultError| e.is_rate_limited())
            .await
            .map_err(|e| FetchError::upstream(format!("Error writing to {}", path), e))?;

        let data = response
            .get("data")
            .filter(|d| d.is_object())
            .ok_or_else(|| FetchError::protocol(path, response.to_string()))?;

        CertBundle::deserialize(data).map_err(|e| FetchError::protocol(path, format!("{} ({})", data, e)))
    }
}
