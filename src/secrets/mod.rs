//! Secret resolution.
//!
//! Declared secrets are read from a KV mount of the Vault server and kept as
//! [`SecretString`] values until the output writer puts them on disk.
//!
//! # Key normalization
//!
//! Store keys are split into at most four segments. Any `/` inside the fourth
//! segment is percent-encoded so keys can embed things like URLs:
//!
//! ```rust
//! use secret_sidecar::secrets::normalize_key;
//!
//! assert_eq!(normalize_key("a/b/c/d/e"), "a/b/c/d%2Fe");
//! ```

pub mod resolver;
pub mod types;

pub use resolver::{normalize_key, KvLayout, ResolveOutcome, SecretResolver};
pub use types::SecretString;
