//! Output tree on the shared volume.
//!
//! Layout under the output directory:
//!
//! ```text
//! LINK_LOCAL_IP, CONSUL_URL, HOST_IP   bootstrap values
//! <SECRET_NAME>                        one file per resolved secret
//! pki/<name>/certificate.pem ...       one directory per certificate
//! .done                                sentinel, written last
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::errors::{FetchError, Result};
use crate::pki::CertBundle;
use crate::secrets::SecretString;

/// Name of the completion sentinel.
pub const SENTINEL: &str = ".done";

/// Link-local address every node answers on.
pub const LINK_LOCAL_IP: &str = "169.254.1.1";

/// Values synthesized by the fetcher itself. Declared secrets with the same
/// names overwrite them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapValues {
    pub host_ip: String,
}

impl BootstrapValues {
    pub fn new(host_ip: impl Into<String>) -> Self {
        Self { host_ip: host_ip.into() }
    }

    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("LINK_LOCAL_IP", LINK_LOCAL_IP.to_string()),
            ("CONSUL_URL", format!("http://{}:8500", LINK_LOCAL_IP)),
            ("HOST_IP", self.host_ip.clone()),
        ]
    }
}

/// Writes one fetch pass worth of results.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    root: PathBuf,
}

impl OutputWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist everything, then the sentinel.
    ///
    /// Bootstrap values go first so a declared secret of the same name
    /// replaces them. Any I/O failure aborts before the sentinel is written.
    pub fn write(
        &self,
        secrets: &[(String, SecretString)],
        certificates: &[(String, CertBundle)],
        bootstrap: &BootstrapValues,
    ) -> Result<()> {
        for (name, value) in bootstrap.entries() {
            self.write_file(&self.root.join(name), value.as_bytes())?;
        }

        for (name, value) in secrets {
            self.write_file(&self.root.join(name), value.expose_secret().as_bytes())?;
        }
        info!(keys = ?secrets.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(), "secrets written");

        if !certificates.is_empty() {
            for (name, bundle) in certificates {
                self.write_certificate(name, bundle)?;
            }
            info!(
                keys = ?certificates.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>(),
                "PKI certificates written"
            );
        }

        self.write_sentinel()
    }

    fn write_certificate(&self, name: &str, bundle: &CertBundle) -> Result<()> {
        let dir = self.root.join("pki").join(name);
        fs::create_dir_all(&dir).map_err(|e| FetchError::io(format!("creating {}", dir.display()), e))?;

        self.write_file(&dir.join("certificate.pem"), bundle.certificate.as_bytes())?;
        self.write_file(&dir.join("private_key.pem"), bundle.private_key.expose_secret().as_bytes())?;
        self.write_file(&dir.join("private_key_type"), bundle.private_key_type.as_bytes())?;
        self.write_file(&dir.join("issuing_ca.pem"), bundle.issuing_ca.as_bytes())?;
        if let Some(chain) = bundle.ca_chain_pem() {
            self.write_file(&dir.join("ca_chain.pem"), chain.as_bytes())?;
        }
        self.write_file(&dir.join("serial_number"), bundle.serial_number.as_bytes())?;
        self.write_file(&dir.join("expiration"), bundle.expiration.as_bytes())
    }

    fn write_sentinel(&self) -> Result<()> {
        let timestamp = chrono::Utc::now().to_rfc3339();
        self.write_file(&self.root.join(SENTINEL), timestamp.as_bytes())
    }

    fn write_file(&self, path: &Path, contents: &[u8]) -> Result<()> {
        fs::write(path, contents).map_err(|e| FetchError::io(format!("Error writing to {}", path.display()), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;
    use tempfile::TempDir;

    fn bundle(chain: bool) -> CertBundle {
        let mut data = json!({
            "certificate": "CERT",
            "private_key": "KEY",
            "private_key_type": "rsa",
            "issuing_ca": "CA",
            "serial_number": "01:02",
            "expiration": 1654105687
        });
        if chain {
            data["ca_chain"] = json!(["A", "B"]);
        }
        CertBundle::deserialize(&data).unwrap()
    }

    fn read(dir: &TempDir, name: &str) -> String {
        fs::read_to_string(dir.path().join(name)).unwrap()
    }

    #[test]
    fn test_writes_secrets_bootstrap_and_sentinel() {
        let dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(dir.path());

        writer
            .write(&[("FOO".to_string(), SecretString::new("bar"))], &[], &BootstrapValues::new("10.0.0.7"))
            .unwrap();

        assert_eq!(read(&dir, "FOO"), "bar");
        assert_eq!(read(&dir, "LINK_LOCAL_IP"), "169.254.1.1");
        assert_eq!(read(&dir, "CONSUL_URL"), "http://169.254.1.1:8500");
        assert_eq!(read(&dir, "HOST_IP"), "10.0.0.7");
        assert!(chrono::DateTime::parse_from_rfc3339(&read(&dir, SENTINEL)).is_ok());
        assert!(!dir.path().join("pki").exists());
    }

    #[test]
    fn test_declared_secret_overrides_bootstrap_value() {
        let dir = TempDir::new().unwrap();
        let secrets = vec![("CONSUL_URL".to_string(), SecretString::new("http://consul.internal:8500"))];

        OutputWriter::new(dir.path()).write(&secrets, &[], &BootstrapValues::new("10.0.0.7")).unwrap();

        assert_eq!(read(&dir, "CONSUL_URL"), "http://consul.internal:8500");
    }

    #[test]
    fn test_certificate_layout() {
        let dir = TempDir::new().unwrap();
        let certificates = vec![
            ("web".to_string(), bundle(true)),
            ("internal/db".to_string(), bundle(false)),
        ];

        OutputWriter::new(dir.path())
            .write(&[("FOO".to_string(), SecretString::new("bar"))], &certificates, &BootstrapValues::new("h"))
            .unwrap();

        assert_eq!(read(&dir, "pki/web/certificate.pem"), "CERT");
        assert_eq!(read(&dir, "pki/web/private_key.pem"), "KEY");
        assert_eq!(read(&dir, "pki/web/private_key_type"), "rsa");
        assert_eq!(read(&dir, "pki/web/issuing_ca.pem"), "CA");
        assert_eq!(read(&dir, "pki/web/ca_chain.pem"), "A\nB");
        assert_eq!(read(&dir, "pki/web/serial_number"), "01:02");
        assert_eq!(read(&dir, "pki/web/expiration"), "1654105687");
        assert_eq!(read(&dir, "pki/internal/db/certificate.pem"), "CERT");
        assert!(!dir.path().join("pki/internal/db/ca_chain.pem").exists());
    }

    #[test]
    fn test_io_failure_leaves_no_sentinel() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("missing");
        let err = OutputWriter::new(&root)
            .write(&[("FOO".to_string(), SecretString::new("bar"))], &[], &BootstrapValues::new("h"))
            .unwrap_err();

        assert!(matches!(err, FetchError::Io { .. }));
        assert!(!root.join(SENTINEL).exists());
    }
}
