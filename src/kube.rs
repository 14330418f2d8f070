//! Host IP lookup through the Kubernetes API.

use reqwest::Client;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::errors::{FetchError, Result};
use crate::secrets::SecretString;

/// Reads the pod's `status.hostIP` using the mounted service account.
#[derive(Debug, Clone)]
pub struct ClusterMetadataClient {
    http: Client,
    api_url: String,
    token: SecretString,
    namespace: String,
}

impl ClusterMetadataClient {
    /// Build a client from `token`, `namespace` and optional `ca.crt` in the
    /// service-account directory.
    pub fn from_serviceaccount_dir(api_url: &str, dir: &Path) -> Result<Self> {
        let token = read_required(dir, "token")?;
        let namespace = read_required(dir, "namespace")?;

        let mut builder = Client::builder().connect_timeout(Duration::from_secs(3)).timeout(Duration::from_secs(5));

        let ca_path = dir.join("ca.crt");
        if ca_path.is_file() {
            let pem = std::fs::read(&ca_path)
                .map_err(|e| FetchError::io(format!("reading {}", ca_path.display()), e))?;
            let ca = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| FetchError::config(format!("invalid {}: {}", ca_path.display(), e)))?;
            builder = builder.add_root_certificate(ca);
        }

        let http = builder
            .build()
            .map_err(|e| FetchError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: api_url.trim_end_matches('/').to_string(),
            token: SecretString::new(token),
            namespace,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// IP of the node running pod `pod_name`.
    pub async fn host_ip(&self, pod_name: &str) -> Result<String> {
        let url = format!("{}/api/v1/namespaces/{}/pods", self.api_url, self.namespace);
        let selector = format!("metadata.name={}", pod_name);
        debug!(url = %url, selector = %selector, "Looking up host IP");

        let response = self
            .http
            .get(&url)
            .query(&[("fieldSelector", selector.as_str())])
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| FetchError::cluster_metadata(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::cluster_metadata(format!("{} responded with {}: {}", url, status, body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| FetchError::cluster_metadata(format!("unreadable response from {}: {}", url, e)))?;

        host_ip_from_pod_list(&body)
            .ok_or_else(|| FetchError::cluster_metadata(format!("no status.hostIP for pod {} in {}", pod_name, body)))
    }
}

fn host_ip_from_pod_list(body: &Value) -> Option<String> {
    body.pointer("/items/0/status/hostIP").and_then(Value::as_str).map(str::to_string)
}

fn read_required(dir: &Path, name: &str) -> Result<String> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(FetchError::config(format!("{} not found", path.display())));
    }
    std::fs::read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| FetchError::io(format!("reading {}", path.display()), e))
}
