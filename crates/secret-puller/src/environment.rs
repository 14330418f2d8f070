//! Process-wide choice of where environment lookups go.
//!
//! Code that reads configuration calls [`environment()`] instead of
//! `std::env::var`. By default that is the inherited process environment;
//! an application may install a [`SecretView`] once at startup so the same
//! lookups also see the sidecar's secrets.

use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::error::{PullerError, Result};
use crate::view::SecretView;

/// Read access to key/value configuration.
pub trait EnvironmentProvider: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn snapshot(&self) -> BTreeMap<String, String>;

    fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// The environment the process was started with.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl EnvironmentProvider for ProcessEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        std::env::vars().collect()
    }
}

impl EnvironmentProvider for SecretView {
    fn get(&self, key: &str) -> Option<String> {
        SecretView::get(self, key)
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        SecretView::snapshot(self)
    }

    fn contains(&self, key: &str) -> bool {
        SecretView::contains(self, key)
    }
}

impl<T: EnvironmentProvider + ?Sized> EnvironmentProvider for Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn snapshot(&self) -> BTreeMap<String, String> {
        (**self).snapshot()
    }

    fn contains(&self, key: &str) -> bool {
        (**self).contains(key)
    }
}

static GLOBAL: OnceCell<Box<dyn EnvironmentProvider>> = OnceCell::new();
static PROCESS: ProcessEnvironment = ProcessEnvironment;

/// Make `provider` the target of [`environment()`] for the rest of the
/// process. Succeeds at most once.
pub fn install_global<P>(provider: P) -> Result<()>
where
    P: EnvironmentProvider + 'static,
{
    GLOBAL.set(Box::new(provider)).map_err(|_| PullerError::AlreadyInstalled)?;
    info!("Installed global environment provider");
    Ok(())
}

/// The installed provider, or the process environment if none was installed.
pub fn environment() -> &'static dyn EnvironmentProvider {
    match GLOBAL.get() {
        Some(provider) => provider.as_ref(),
        None => &PROCESS,
    }
}

pub fn is_global_installed() -> bool {
    GLOBAL.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_environment() {
        std::env::set_var("SECRET_PULLER_PROCESS_ENV", "1");
        let env = ProcessEnvironment;

        assert_eq!(env.get("SECRET_PULLER_PROCESS_ENV").as_deref(), Some("1"));
        assert!(env.contains("SECRET_PULLER_PROCESS_ENV"));
        assert_eq!(env.get_or_default("SECRET_PULLER_PROCESS_ABSENT", "x"), "x");
        assert!(env.snapshot().contains_key("SECRET_PULLER_PROCESS_ENV"));
        std::env::remove_var("SECRET_PULLER_PROCESS_ENV");
    }

    #[test]
    fn test_shared_view_as_provider() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("SECRET_PULLER_SHARED"), "value").unwrap();
        std::fs::write(dir.path().join(crate::SENTINEL), "now").unwrap();

        let view = Arc::new(SecretView::open(dir.path()));
        let provider: &dyn EnvironmentProvider = &view;

        assert_eq!(provider.get("SECRET_PULLER_SHARED").as_deref(), Some("value"));
        view.set("SECRET_PULLER_SHARED", "changed");
        assert_eq!(provider.get("SECRET_PULLER_SHARED").as_deref(), Some("changed"));
    }
}
