//! # Error Handling
//!
//! Error types for the fetcher, defined with `thiserror`.

pub mod types;

pub use types::{FetchError, Result};
