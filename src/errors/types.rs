//! # Error Types
//!
//! Error taxonomy for a fetch pass, using `thiserror`.

use crate::vault::VaultError;

/// Custom result type for fetcher operations
pub type Result<T> = std::result::Result<T, FetchError>;

/// Main error type for the secret fetcher
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// Missing files or directories, empty manifests, unknown auth types.
    /// Always raised before any network call.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Login against the secret store failed
    #[error("Authentication error: {message}{}", detail(.source))]
    Authentication {
        message: String,
        #[source]
        source: Option<VaultError>,
    },

    /// A per-request failure reported by the secret store, annotated with the
    /// request that caused it
    #[error("{context}\n{source}")]
    Upstream {
        context: String,
        #[source]
        source: VaultError,
    },

    /// A success response lacking the expected structured payload
    #[error("Bad results returned from vault server for {target}: {body}")]
    Protocol { target: String, body: String },

    /// More than one per-request failure from a single resolution pass
    #[error("{heading}:\n{}", list_failures(.failures))]
    Aggregate { heading: String, failures: Vec<FetchError> },

    /// The cluster API could not tell us the pod's host IP
    #[error("Cluster metadata error: {message}")]
    ClusterMetadata { message: String },

    /// Writing the output tree failed
    #[error("I/O error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an authentication error carrying the store's detail
    pub fn authentication<S: Into<String>>(message: S, source: Option<VaultError>) -> Self {
        Self::Authentication { message: message.into(), source }
    }

    /// Annotate a store error with the request it belongs to
    pub fn upstream<S: Into<String>>(context: S, source: VaultError) -> Self {
        Self::Upstream { context: context.into(), source }
    }

    /// Create a protocol error for a malformed success response
    pub fn protocol<T: Into<String>, B: Into<String>>(target: T, body: B) -> Self {
        Self::Protocol { target: target.into(), body: body.into() }
    }

    /// Create a cluster metadata error
    pub fn cluster_metadata<S: Into<String>>(message: S) -> Self {
        Self::ClusterMetadata { message: message.into() }
    }

    /// Wrap an I/O error with the path or operation that failed
    pub fn io<S: Into<String>>(context: S, source: std::io::Error) -> Self {
        Self::Io { context: context.into(), source }
    }

    /// Collapse the failures of one resolution pass.
    ///
    /// No failures is success. A single failure is returned as-is so its full
    /// detail survives; several are listed together under `heading`.
    pub fn from_failures<S: Into<String>>(heading: S, mut failures: Vec<FetchError>) -> Result<()> {
        match failures.len() {
            0 => Ok(()),
            1 => Err(failures.remove(0)),
            _ => Err(Self::Aggregate { heading: heading.into(), failures }),
        }
    }

    /// Short class name used when listing aggregated failures
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Config { .. } => "ConfigurationError",
            FetchError::Authentication { .. } => "AuthenticationError",
            FetchError::Upstream { source, .. } if source.is_rate_limited() => {
                "TransientServerError"
            }
            FetchError::Upstream { .. } => "UpstreamError",
            FetchError::Protocol { .. } => "UpstreamProtocolError",
            FetchError::Aggregate { .. } => "AggregateFetchError",
            FetchError::ClusterMetadata { .. } => "ClusterMetadataError",
            FetchError::Io { .. } => "IoError",
        }
    }
}

impl From<validator::ValidationErrors> for FetchError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string()))
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect();
        messages.sort();

        Self::config(messages.join("; "))
    }
}

fn detail(source: &Option<VaultError>) -> String {
    source.as_ref().map(|e| format!("\n{}", e)).unwrap_or_default()
}

fn list_failures(failures: &[FetchError]) -> String {
    failures.iter().map(|e| format!("{}: {}", e.kind(), e)).collect::<Vec<_>>().join("\n")
}
