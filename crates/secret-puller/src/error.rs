use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the puller.
#[derive(Error, Debug)]
pub enum PullerError {
    /// The fetcher did not write its sentinel in time.
    #[error("Timed out after {waited_ms}ms waiting for {path}")]
    Timeout { path: PathBuf, waited_ms: u64 },

    /// The sentinel is absent, so the directory may still be half-written.
    #[error("Secrets are not ready: {path} does not exist")]
    NotReady { path: PathBuf },

    /// [`crate::install_global`] was called twice.
    #[error("A global environment provider is already installed")]
    AlreadyInstalled,

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PullerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, PullerError>;
