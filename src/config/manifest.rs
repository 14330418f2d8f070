//! Declared secret and certificate requests.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use super::ManifestSource;
use crate::errors::{FetchError, Result};

const SECRET_PREFIX: &str = "secret/";
const PKI_PREFIX: &str = "pki/";

/// Name reserved for the certificate output directory.
pub const PKI_DIR: &str = "pki";

/// One secret to read: output file `name`, store key `store_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretRequest {
    pub name: String,
    pub store_path: String,
}

/// One certificate to issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRequest {
    pub name: String,
    /// Logical path of the issuing role, e.g. `pki/issue/example-dot-com`
    pub issuance_path: String,
    /// Query parameters of the declared URI; repeated keys keep every value
    pub parameters: BTreeMap<String, Vec<String>>,
}

impl CertificateRequest {
    /// Split `uri` (`path?query`) into issuance path and parameter multimap.
    pub fn parse(name: impl Into<String>, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, query),
            None => (uri, ""),
        };

        let mut parameters: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            parameters.entry(key.into_owned()).or_default().push(value.into_owned());
        }

        Self { name: name.into(), issuance_path: path.trim_start_matches('/').to_string(), parameters }
    }
}

/// The full request set of one fetch pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub secrets: Vec<SecretRequest>,
    pub certificates: Vec<CertificateRequest>,
}

impl Manifest {
    /// Read and validate the manifest from its configured source.
    pub fn load(source: &ManifestSource) -> Result<Self> {
        let manifest = match source {
            ManifestSource::Annotations(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| FetchError::io(format!("reading {}", path.display()), e))?;
                Self::from_annotations(&text)?
            }
            ManifestSource::Environment { secret_prefix, pki_prefix } => {
                Self::from_env_vars(std::env::vars(), secret_prefix, pki_prefix)
            }
        };

        manifest.validate(&source_label(source))?;
        Ok(manifest)
    }

    /// Parse `secret/NAME="path"` and `pki/name="path?query"` lines.
    pub fn from_annotations(text: &str) -> Result<Self> {
        let mut manifest = Manifest::default();

        for line in text.lines().map(|l| l.trim_end_matches('\r')) {
            if let Some(rest) = line.strip_prefix(SECRET_PREFIX) {
                let (name, path) = split_annotation(line, rest)?;
                manifest.secrets.push(SecretRequest { name, store_path: path });
            } else if let Some(rest) = line.strip_prefix(PKI_PREFIX) {
                let (name, path) = split_annotation(line, rest)?;
                manifest.certificates.push(CertificateRequest::parse(name, &path));
            }
        }

        Ok(manifest)
    }

    /// Collect requests from variables named `<secret_prefix>NAME` and
    /// `<pki_prefix>name`.
    pub fn from_env_vars<I>(vars: I, secret_prefix: &str, pki_prefix: &str) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut manifest = Manifest::default();

        for (key, value) in vars {
            if let Some(name) = key.strip_prefix(secret_prefix) {
                manifest.secrets.push(SecretRequest { name: name.to_string(), store_path: value });
            } else if let Some(name) = key.strip_prefix(pki_prefix) {
                manifest.certificates.push(CertificateRequest::parse(name, &value));
            }
        }

        manifest.secrets.sort_by(|a, b| a.name.cmp(&b.name));
        manifest.certificates.sort_by(|a, b| a.name.cmp(&b.name));
        manifest
    }

    /// Reject empty secret sets, unsafe names and duplicates.
    pub fn validate(&self, source: &str) -> Result<()> {
        if self.secrets.is_empty() {
            return Err(FetchError::config(format!("{} contains no secrets", source)));
        }

        let mut seen = HashSet::new();
        for request in &self.secrets {
            validate_secret_name(&request.name)?;
            if request.store_path.is_empty() {
                return Err(FetchError::config(format!("secret {} has an empty path", request.name)));
            }
            if !seen.insert(request.name.as_str()) {
                return Err(FetchError::config(format!("duplicate request name {}", request.name)));
            }
        }

        for request in &self.certificates {
            validate_certificate_name(&request.name)?;
            if request.issuance_path.is_empty() {
                return Err(FetchError::config(format!("certificate {} has an empty path", request.name)));
            }
            if !seen.insert(request.name.as_str()) {
                return Err(FetchError::config(format!("duplicate request name {}", request.name)));
            }
        }

        Ok(())
    }

    pub fn secret_names(&self) -> Vec<&str> {
        self.secrets.iter().map(|r| r.name.as_str()).collect()
    }

    pub fn certificate_names(&self) -> Vec<&str> {
        self.certificates.iter().map(|r| r.name.as_str()).collect()
    }
}

fn source_label(source: &ManifestSource) -> String {
    match source {
        ManifestSource::Annotations(path) => path.display().to_string(),
        ManifestSource::Environment { secret_prefix, .. } => format!("environment ({}*)", secret_prefix),
    }
}

// `rest` is the line with its prefix removed
fn split_annotation(line: &str, rest: &str) -> Result<(String, String)> {
    let (name, path) = rest
        .split_once('=')
        .ok_or_else(|| FetchError::config(format!("invalid annotation line: {}", line)))?;
    Ok((name.trim().to_string(), path.replace('"', "").trim().to_string()))
}

fn validate_secret_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FetchError::config("secret name cannot be empty"));
    }
    if name.contains('/') || name.starts_with('.') || name == PKI_DIR {
        return Err(FetchError::config(format!("invalid secret name {}", name)));
    }
    Ok(())
}

fn validate_certificate_name(name: &str) -> Result<()> {
    let path = Path::new(name);
    let unsafe_segment = name
        .split('/')
        .any(|segment| segment.is_empty() || segment.starts_with('.'));

    if name.is_empty() || path.is_absolute() || unsafe_segment {
        return Err(FetchError::config(format!("invalid certificate name {}", name)));
    }
    Ok(())
}
