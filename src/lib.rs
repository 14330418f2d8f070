//! # Secret Sidecar
//!
//! Fetcher half of the Kubernetes secret sidecar. Runs as an init or sidecar
//! container next to an application and performs one pass:
//!
//! ```text
//! AuthStrategy → SecretResolver + CertificateIssuer → OutputWriter → .done
//! ```
//!
//! The application side lives in the `secret-puller` crate, which waits for
//! the `.done` sentinel and exposes the written files merged with the
//! process environment.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use clap::Parser;
//! use secret_sidecar::{cli::FetcherArgs, Fetcher, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = FetcherArgs::parse().into_config()?;
//!     Fetcher::new(config)?.run().await
//! }
//! ```

pub mod cli;
pub mod config;
pub mod errors;
pub mod fetcher;
pub mod kube;
pub mod observability;
pub mod output;
pub mod pki;
pub mod pod;
pub mod secrets;
pub mod vault;

pub use config::FetcherConfig;
pub use errors::{FetchError, Result};
pub use fetcher::Fetcher;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
