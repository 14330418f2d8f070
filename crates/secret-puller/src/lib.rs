//! # Secret Puller
//!
//! Application-side half of the secret sidecar. The fetcher container writes
//! one file per secret into a shared volume and finishes with a `.done`
//! sentinel; this crate waits for that sentinel and serves the files merged
//! over the inherited environment.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use secret_puller::{environment, install_global, EnvironmentProvider, SecretView};
//!
//! let view = Arc::new(SecretView::after_handshake("/secrets", Duration::from_secs(60))?);
//! install_global(view.clone())?;
//!
//! let url = environment().get_or_default("DATABASE_URL", "postgres://localhost/dev");
//! # Ok::<(), secret_puller::PullerError>(())
//! ```

pub mod environment;
pub mod error;
pub mod handshake;
pub mod view;

pub use environment::{environment, install_global, is_global_installed, EnvironmentProvider, ProcessEnvironment};
pub use error::{PullerError, Result};
pub use handshake::{wait_for_sentinel, HandshakeState, HandshakeWaiter, DEFAULT_POLL_INTERVAL, SENTINEL};
pub use view::{SecretView, DEFAULT_SECRETS_DIR};
