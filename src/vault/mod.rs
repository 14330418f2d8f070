//! # Vault
//!
//! HTTP plumbing for the Vault server: the client, login strategies, the
//! transport error type and the rate-limit retry policy.

pub mod auth;
pub mod client;
pub mod error;
pub mod retry;

pub use auth::{authenticate, strategy_for, AuthStrategy, CertAuth, Credential, KubernetesAuth, TokenAuth};
pub use client::{VaultClient, VaultSettings};
pub use error::VaultError;
pub use retry::RetryPolicy;
