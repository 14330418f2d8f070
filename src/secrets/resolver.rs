//! Resolution of declared secrets against the KV store.

use futures::future::join_all;
use serde_json::Value;
use tracing::debug;

use super::types::SecretString;
use crate::config::SecretRequest;
use crate::errors::{FetchError, Result};
use crate::vault::{RetryPolicy, VaultClient, VaultError};

/// Keys are split into at most this many path segments; any `/` left in the
/// last one is literal.
const KEY_PARTS: usize = 4;

/// Percent-encode the `/` characters that belong to the last key segment.
///
/// `a/b/c/d/e` becomes `a/b/c/d%2Fe`. Keys with fewer than four segments are
/// returned unchanged.
pub fn normalize_key(key: &str) -> String {
    let mut parts: Vec<String> = key.splitn(KEY_PARTS, '/').map(str::to_string).collect();
    if let Some(last) = parts.last_mut() {
        *last = last.replace('/', "%2F");
    }
    parts.join("/")
}

/// Mount, prefix and KV version of the secret store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvLayout {
    pub mount: String,
    pub prefix: String,
    pub kv_v2: bool,
}

impl KvLayout {
    /// Logical path of a normalized key.
    pub fn key_path(&self, key: &str) -> String {
        let mount = self.mount.trim_matches('/');
        let prefix = self.prefix.trim_matches('/');

        let mut parts = vec![mount];
        if self.kv_v2 {
            parts.push("data");
        }
        if !prefix.is_empty() {
            parts.push(prefix);
        }
        parts.push(key);
        parts.join("/")
    }

    /// Pull the secret out of a read response.
    ///
    /// KV v1 keeps it at `data.vault`, v2 at `data.data.vault`.
    fn extract(&self, key: &str, response: &Value) -> Result<SecretString> {
        let bad_results = || FetchError::protocol(key, response.to_string());

        let data = response.get("data").filter(|d| d.is_object()).ok_or_else(bad_results)?;
        let data = if self.kv_v2 {
            data.get("data").filter(|d| d.is_object()).ok_or_else(bad_results)?
        } else {
            data
        };

        match data.get("vault") {
            Some(Value::String(value)) => Ok(SecretString::new(value.as_str())),
            Some(Value::Null) | None => Err(bad_results()),
            Some(other) => Ok(SecretString::new(other.to_string())),
        }
    }
}

/// Successes and failures of one resolution pass, in request order.
#[derive(Debug, Default)]
pub struct ResolveOutcome {
    pub values: Vec<(String, SecretString)>,
    pub failures: Vec<FetchError>,
}

impl ResolveOutcome {
    /// All values, or the failures collapsed into one error.
    pub fn into_result(self) -> Result<Vec<(String, SecretString)>> {
        FetchError::from_failures("Errors reading secrets", self.failures)?;
        Ok(self.values)
    }
}

/// Reads every declared secret, retrying rate-limited responses.
pub struct SecretResolver {
    client: VaultClient,
    layout: KvLayout,
    retry: RetryPolicy,
}

impl SecretResolver {
    /// `client` must already carry a token.
    pub fn new(client: VaultClient, layout: KvLayout, retry: RetryPolicy) -> Self {
        Self { client, layout, retry }
    }

    /// Read all `requests` concurrently.
    ///
    /// Per-request failures are collected, not returned early, so the caller
    /// can report every broken key at once. An empty request set is a
    /// configuration error.
    pub async fn resolve(&self, requests: &[SecretRequest]) -> Result<ResolveOutcome> {
        if requests.is_empty() {
            return Err(FetchError::config("no secrets requested"));
        }

        let results = join_all(requests.iter().map(|request| self.read(request))).await;

        let mut outcome = ResolveOutcome::default();
        for (request, result) in requests.iter().zip(results) {
            match result {
                Ok(value) => outcome.values.push((request.name.clone(), value)),
                Err(e) => outcome.failures.push(e),
            }
        }

        debug!(
            resolved = outcome.values.len(),
            failed = outcome.failures.len(),
            "Secret resolution finished"
        );
        Ok(outcome)
    }

    async fn read(&self, request: &SecretRequest) -> Result<SecretString> {
        let key = normalize_key(&request.store_path);
        let path = self.layout.key_path(&key);

        let client = &self.client;
        let target = path.as_str();
        let response = self
            .retry
            .run(target, move || client.get(target), |e: &VaultError| e.is_rate_limited())
            .await
            .map_err(|e| FetchError::upstream(format!("Error reading key {} ({})", key, request.name), e))?;

        self.layout.extract(&key, &response)
    }
}
