//! Global provider installation. Kept in its own test binary because the
//! installation is process-wide and irreversible.

use secret_puller::{
    environment, install_global, is_global_installed, EnvironmentProvider, PullerError, SecretView, SENTINEL,
};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn test_install_global_once() {
    std::env::set_var("GLOBAL_ENV_INHERITED", "inherited");

    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("GLOBAL_ENV_SECRET"), "s3cr3t\n").unwrap();
    fs::write(dir.path().join(SENTINEL), "now").unwrap();

    // Before installation lookups go to the process environment
    assert!(!is_global_installed());
    assert!(environment().get("GLOBAL_ENV_SECRET").is_none());
    assert_eq!(environment().get("GLOBAL_ENV_INHERITED").as_deref(), Some("inherited"));

    let view = Arc::new(SecretView::after_handshake(dir.path(), Duration::from_secs(1)).unwrap());
    install_global(view.clone()).unwrap();

    assert!(is_global_installed());
    assert_eq!(environment().get("GLOBAL_ENV_SECRET").as_deref(), Some("s3cr3t"));
    assert_eq!(environment().get("GLOBAL_ENV_INHERITED").as_deref(), Some("inherited"));

    // Secret values stay out of the real environment
    assert!(std::env::var("GLOBAL_ENV_SECRET").is_err());

    view.set("GLOBAL_ENV_SECRET", "rotated");
    assert_eq!(environment().get("GLOBAL_ENV_SECRET").as_deref(), Some("rotated"));

    let err = install_global(SecretView::open(dir.path())).unwrap_err();
    assert!(matches!(err, PullerError::AlreadyInstalled));
}
