//! PKI certificate issuance.

pub mod issuer;
pub mod params;

pub use issuer::{CertBundle, CertificateIssuer, IssueOutcome};
pub use params::build_request_body;
