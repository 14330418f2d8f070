//! Transport-level errors raised while talking to the Vault server.

use thiserror::Error;

/// HTTP status Vault uses to signal rate limiting.
pub const RATE_LIMITED: u16 = 429;

/// Errors produced by [`super::VaultClient`] requests.
#[derive(Error, Debug)]
pub enum VaultError {
    /// The request never produced an HTTP response.
    #[error("The Vault server at `{url}' is not reachable: {source}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("The Vault server at `{url}' responded with a {status}.\n{}", format_errors(.errors))]
    Status { url: String, status: u16, errors: Vec<String> },

    /// A 2xx response whose body was not JSON.
    #[error("The Vault server at `{url}' returned an unreadable body: {body}")]
    Decode { url: String, body: String },

    /// The client could not be constructed (bad identity, bad CA, bad address).
    #[error("Invalid Vault client configuration: {0}")]
    Setup(String),
}

impl VaultError {
    /// Create a setup error.
    pub fn setup(message: impl Into<String>) -> Self {
        Self::Setup(message.into())
    }

    /// HTTP status of the failed response, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the server asked us to slow down (HTTP 429).
    pub fn is_rate_limited(&self) -> bool {
        self.status() == Some(RATE_LIMITED)
    }
}

fn format_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        "Please see the server logs for more information.".to_string()
    } else {
        errors.iter().map(|e| format!("  * {}", e)).collect::<Vec<_>>().join("\n")
    }
}
