//! Waiting for the fetcher's completion sentinel.
//!
//! The fetcher writes `.done` after every other file. Its presence is the
//! only signal that the directory is complete; file contents are never used
//! to infer completion.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::error::{PullerError, Result};

/// Name of the sentinel file written last by the fetcher.
pub const SENTINEL: &str = ".done";

/// Fixed interval between two sentinel checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Waiting,
    Ready,
    Failed,
}

/// Blocking poll for the sentinel with a hard deadline.
///
/// `Waiting` moves to `Ready` when the sentinel is seen and to `Failed` when
/// the deadline passes first. Both are terminal.
#[derive(Debug)]
pub struct HandshakeWaiter {
    dir: PathBuf,
    timeout: Duration,
    poll_interval: Duration,
    state: HandshakeState,
}

impl HandshakeWaiter {
    pub fn new(dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self { dir: dir.into(), timeout, poll_interval: DEFAULT_POLL_INTERVAL, state: HandshakeState::Waiting }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    pub fn sentinel_path(&self) -> PathBuf {
        self.dir.join(SENTINEL)
    }

    /// Block the calling thread until the sentinel exists or the timeout
    /// expires.
    pub fn wait(&mut self) -> Result<()> {
        let sentinel = self.sentinel_path();

        match self.state {
            HandshakeState::Ready => return Ok(()),
            HandshakeState::Failed => return Err(self.timeout_error(sentinel)),
            HandshakeState::Waiting => {}
        }

        let started = Instant::now();
        loop {
            if sentinel.exists() {
                self.state = HandshakeState::Ready;
                debug!(path = %sentinel.display(), waited_ms = started.elapsed().as_millis() as u64, "secrets ready");
                return Ok(());
            }

            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                self.state = HandshakeState::Failed;
                return Err(self.timeout_error(sentinel));
            }

            info!(path = %sentinel.display(), "waiting for secrets sentinel");
            thread::sleep(self.poll_interval.min(self.timeout - elapsed));
        }
    }

    fn timeout_error(&self, path: PathBuf) -> PullerError {
        PullerError::Timeout { path, waited_ms: self.timeout.as_millis() as u64 }
    }
}

/// Wait for `dir/.done` with the default poll interval.
pub fn wait_for_sentinel(dir: impl AsRef<Path>, timeout: Duration) -> Result<()> {
    HandshakeWaiter::new(dir.as_ref(), timeout).wait()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    #[test]
    fn test_sentinel_already_present() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SENTINEL), "2024-01-01T00:00:00Z").unwrap();

        let mut waiter = HandshakeWaiter::new(dir.path(), Duration::from_millis(50));
        assert_eq!(waiter.state(), HandshakeState::Waiting);
        waiter.wait().unwrap();
        assert_eq!(waiter.state(), HandshakeState::Ready);
    }

    #[test]
    #[traced_test]
    fn test_timeout_is_terminal_and_logged() {
        let dir = TempDir::new().unwrap();
        let mut waiter =
            HandshakeWaiter::new(dir.path(), Duration::from_millis(30)).with_poll_interval(Duration::from_millis(5));

        let err = waiter.wait().unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(waiter.state(), HandshakeState::Failed);
        assert!(logs_contain("waiting for secrets sentinel"));

        // A late sentinel does not revive a failed waiter.
        std::fs::write(dir.path().join(SENTINEL), "late").unwrap();
        assert!(waiter.wait().unwrap_err().is_timeout());
    }

    #[test]
    fn test_missing_directory_times_out() {
        let err = wait_for_sentinel("/nonexistent/secrets", Duration::from_millis(10)).unwrap_err();
        assert!(matches!(err, PullerError::Timeout { waited_ms: 10, .. }));
    }
}
