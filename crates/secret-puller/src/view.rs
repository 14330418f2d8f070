//! Merged view of the secrets directory over the process environment.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PullerError, Result};
use crate::handshake::{HandshakeWaiter, SENTINEL};

/// Directory the fetcher writes into in the standard pod layout.
pub const DEFAULT_SECRETS_DIR: &str = "/secrets";

#[derive(Debug, Default)]
struct State {
    merged: BTreeMap<String, String>,
    /// Keys that came from the secrets directory
    secret_keys: HashSet<String>,
}

impl State {
    fn environment_only() -> Self {
        Self { merged: std::env::vars().collect(), secret_keys: HashSet::new() }
    }
}

/// Key/value view: secret files win over inherited environment variables.
///
/// Built on the first access after the fetcher's sentinel exists and cached
/// for the lifetime of the view. Before that, accesses see the process
/// environment only and nothing is cached. Writes to
/// keys that came from the secrets directory stay in the view and never
/// reach the process environment, so secrets do not leak into subprocesses.
#[derive(Debug)]
pub struct SecretView {
    dir: PathBuf,
    state: Mutex<Option<State>>,
}

impl SecretView {
    /// View over `dir`, loaded lazily. Does not wait for the sentinel, but
    /// never reads the directory before it exists.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), state: Mutex::new(None) }
    }

    /// Wait for the fetcher's sentinel, then load strictly.
    pub fn after_handshake(dir: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let view = Self::open(dir);
        HandshakeWaiter::new(&view.dir, timeout).wait()?;
        view.preload()?;
        Ok(view)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Build the cache now, failing on any unreadable secret file or when
    /// the sentinel is absent.
    pub fn preload(&self) -> Result<()> {
        let mut guard = self.lock();
        if guard.is_none() {
            if !self.is_ready() {
                return Err(PullerError::NotReady { path: self.dir.join(SENTINEL) });
            }
            *guard = Some(build_state(&self.dir, true)?);
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.with_state(|state| state.merged.get(key).cloned())
    }

    pub fn get_or_default(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.with_state(|state| state.merged.contains_key(key))
    }

    /// Whether `key` came from the secrets directory.
    pub fn is_secret(&self, key: &str) -> bool {
        self.with_state(|state| state.secret_keys.contains(key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.with_state(|state| state.merged.keys().cloned().collect())
    }

    pub fn entries(&self) -> Vec<(String, String)> {
        self.with_state(|state| state.merged.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Independent copy of the current contents.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.with_state(|state| state.merged.clone())
    }

    /// Update `key`. Non-secret keys are also exported to the process
    /// environment.
    pub fn set(&self, key: &str, value: &str) {
        self.with_state(|state| {
            if !state.secret_keys.contains(key) {
                std::env::set_var(key, value);
            }
            state.merged.insert(key.to_string(), value.to_string());
        })
    }

    /// Remove `key` from the view and from the process environment.
    pub fn delete(&self, key: &str) -> Option<String> {
        self.with_state(|state| {
            std::env::remove_var(key);
            state.merged.remove(key)
        })
    }

    /// Whether the fetcher has finished writing.
    pub fn is_ready(&self) -> bool {
        self.dir.join(SENTINEL).exists()
    }

    fn lock(&self) -> MutexGuard<'_, Option<State>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut guard = self.lock();
        if guard.is_none() && !self.is_ready() {
            debug!(dir = %self.dir.display(), "Secrets sentinel absent, using environment only");
            return f(&mut State::environment_only());
        }

        // Lazy loading has no caller to report to; unreadable files are
        // skipped with a warning instead.
        let state = guard.get_or_insert_with(|| {
            build_state(&self.dir, false).unwrap_or_else(|e| {
                warn!(dir = %self.dir.display(), error = %e, "Secrets directory unreadable, using environment only");
                State::environment_only()
            })
        });
        f(state)
    }
}

fn build_state(dir: &Path, strict: bool) -> Result<State> {
    let secrets = read_secrets(dir, strict)?;
    debug!(dir = %dir.display(), count = secrets.len(), "Loaded secrets");

    let secret_keys = secrets.keys().cloned().collect();
    let mut merged: BTreeMap<String, String> = std::env::vars().collect();
    merged.extend(secrets);

    Ok(State { merged, secret_keys })
}

/// Read every regular, non-hidden file of `dir`. A missing directory is an
/// empty secret set.
pub fn read_secrets(dir: &Path, strict: bool) -> Result<BTreeMap<String, String>> {
    let mut secrets = BTreeMap::new();
    if !dir.is_dir() {
        return Ok(secrets);
    }

    let entries = fs::read_dir(dir).map_err(|e| PullerError::io(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PullerError::io(dir, e))?;
        let path = entry.path();

        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        // Protocol metadata such as the sentinel
        if name.starts_with('.') {
            continue;
        }
        // Follows symlinks, skips the pki/ tree
        if !path.is_file() {
            continue;
        }

        match fs::read_to_string(&path) {
            Ok(contents) => {
                secrets.insert(name, contents.trim_end().to_string());
            }
            Err(e) if strict => return Err(PullerError::io(path, e)),
            Err(e) => warn!(path = %path.display(), error = %e, "Skipping unreadable secret file"),
        }
    }

    Ok(secrets)
}
