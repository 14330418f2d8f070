//! # Observability
//!
//! Logging setup for the fetcher binary. Library code only emits `tracing`
//! events and never installs a subscriber itself.

pub mod logging;

pub use logging::{init_logging, LogFormat};
