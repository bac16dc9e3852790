//! Lockspace manager: wraps an external lock daemon to acquire and release
//! a single host-scoped lease protecting the whiteboard.
//!
//! Grounded on `acquire_whiteboard_lock`/`release_whiteboard_lock` in the
//! original broker. The lock daemon itself (`sanlock`) is an external
//! collaborator, modeled the same way as the hypervisor RPC client: a
//! trait with a production stub (no real transport specified) and an
//! in-memory fake for tests.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::constants::{LOCKSPACE_NAME, WAIT_FOR_STORAGE_DELAY, WAIT_FOR_STORAGE_RETRY};
use crate::error::BrokerError;

/// Errno-shaped failure from `add_lockspace`/`rem_lockspace`, mirroring
/// `sanlock.SanlockException.errno`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockDaemonError {
    pub errno: Option<i32>,
}

impl LockDaemonError {
    pub fn with_errno(errno: i32) -> Self {
        Self { errno: Some(errno) }
    }
}

pub trait LockDaemon: Send + Sync {
    fn add_lockspace(&self, name: &str, host_id: u64, lease_path: &str) -> Result<(), LockDaemonError>;
    fn rem_lockspace(&self, name: &str, host_id: u64, lease_path: &str) -> Result<(), LockDaemonError>;
}

/// No real lock-daemon transport is specified; this always reports the
/// daemon as unreachable, matching the framing of the hypervisor RPC
/// client as an external collaborator specified only at the interface
/// level.
pub struct UnavailableLockDaemon;

impl LockDaemon for UnavailableLockDaemon {
    fn add_lockspace(&self, _name: &str, _host_id: u64, _lease_path: &str) -> Result<(), LockDaemonError> {
        Err(LockDaemonError { errno: None })
    }

    fn rem_lockspace(&self, _name: &str, _host_id: u64, _lease_path: &str) -> Result<(), LockDaemonError> {
        Err(LockDaemonError { errno: None })
    }
}

/// A handle tying `acquired` to the `(host_id, lease_path)` pair it was
/// constructed with; dropping it releases the lease, so a broker that is
/// dropped mid-run cannot leak a held lease.
pub struct LockspaceHandle {
    daemon: Arc<dyn LockDaemon>,
    host_id: u64,
    lease_path: String,
}

impl Drop for LockspaceHandle {
    fn drop(&mut self) {
        if let Err(e) = self.daemon.rem_lockspace(LOCKSPACE_NAME, self.host_id, &self.lease_path) {
            log::warn!("failed to release lockspace lease for host {}: {:?}", self.host_id, e);
        }
    }
}

pub struct LockspaceManager {
    daemon: Arc<dyn LockDaemon>,
    retry_delay: Duration,
}

impl LockspaceManager {
    pub fn new(daemon: Arc<dyn LockDaemon>) -> Self {
        Self { daemon, retry_delay: Duration::from_secs(WAIT_FOR_STORAGE_DELAY) }
    }

    /// Same as `new`, but with an explicit retry delay; used by tests that
    /// want to exercise the retry budget without sleeping for real.
    pub fn with_retry_delay(daemon: Arc<dyn LockDaemon>, retry_delay: Duration) -> Self {
        Self { daemon, retry_delay }
    }

    /// Acquires the whiteboard lease for `host_id` at `lease_path`,
    /// retrying transient failures up to `WAIT_FOR_STORAGE_RETRY` times.
    pub fn acquire(&self, host_id: u64, lease_path: &str) -> Result<LockspaceHandle, BrokerError> {
        for attempt in 0..WAIT_FOR_STORAGE_RETRY {
            match self.daemon.add_lockspace(LOCKSPACE_NAME, host_id, lease_path) {
                Ok(()) => {
                    log::info!("acquired lock on host id {host_id}");
                    return Ok(LockspaceHandle {
                        daemon: self.daemon.clone(),
                        host_id,
                        lease_path: lease_path.to_string(),
                    });
                }
                Err(LockDaemonError { errno: Some(libc::EEXIST) }) => {
                    log::debug!("host already holds lock");
                    return Ok(LockspaceHandle {
                        daemon: self.daemon.clone(),
                        host_id,
                        lease_path: lease_path.to_string(),
                    });
                }
                Err(LockDaemonError { errno: Some(libc::EINVAL) }) => {
                    log::error!("cannot get lock on host id {host_id}: host already holds lock on a different host id");
                    return Err(BrokerError::SanlockHostIdConflict { host_id });
                }
                Err(LockDaemonError { errno: Some(libc::EINTR) }) => {
                    log::warn!("cannot get lock on host id {host_id}: sanlock operation interrupted (will retry)");
                }
                Err(LockDaemonError { errno: Some(libc::EINPROGRESS) }) => {
                    log::warn!("cannot get lock on host id {host_id}: sanlock operation in progress (will retry)");
                }
                Err(LockDaemonError { errno: Some(libc::ENOENT) }) => {
                    log::warn!("cannot get lock on host id {host_id}: the lock file '{lease_path}' is missing (will retry)");
                }
                Err(e) => {
                    log::warn!("cannot get lock on host id {host_id}: {e:?} (will retry)");
                }
            }

            if attempt + 1 < WAIT_FOR_STORAGE_RETRY {
                thread::sleep(self.retry_delay);
            }
        }

        Err(BrokerError::SanlockInitializationError)
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    /// A lock daemon whose `add_lockspace` responses are scripted in
    /// advance, so tests can exercise the retry budget deterministically.
    pub struct ScriptedLockDaemon {
        responses: Mutex<Vec<Result<(), LockDaemonError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedLockDaemon {
        pub fn new(responses: Vec<Result<(), LockDaemonError>>) -> Self {
            Self { responses: Mutex::new(responses), calls: Mutex::new(0) }
        }

        pub fn call_count(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    impl LockDaemon for ScriptedLockDaemon {
        fn add_lockspace(&self, _name: &str, _host_id: u64, _lease_path: &str) -> Result<(), LockDaemonError> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Err(LockDaemonError { errno: None })
            } else {
                responses.remove(0)
            }
        }

        fn rem_lockspace(&self, _name: &str, _host_id: u64, _lease_path: &str) -> Result<(), LockDaemonError> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::ScriptedLockDaemon;
    use super::*;

    #[test]
    fn acquire_succeeds_immediately_on_first_try() {
        let daemon = Arc::new(ScriptedLockDaemon::new(vec![Ok(())]));
        let manager = LockspaceManager::with_retry_delay(daemon.clone(), Duration::from_millis(0));
        let handle = manager.acquire(7, "/tmp/lease").unwrap();
        assert_eq!(daemon.call_count(), 1);
        drop(handle);
    }

    #[test]
    fn eexist_is_treated_as_success() {
        let daemon = Arc::new(ScriptedLockDaemon::new(vec![Err(LockDaemonError::with_errno(libc::EEXIST))]));
        let manager = LockspaceManager::with_retry_delay(daemon.clone(), Duration::from_millis(0));
        assert!(manager.acquire(7, "/tmp/lease").is_ok());
    }

    #[test]
    fn einval_is_fatal_and_does_not_retry() {
        let daemon = Arc::new(ScriptedLockDaemon::new(vec![Err(LockDaemonError::with_errno(libc::EINVAL))]));
        let manager = LockspaceManager::with_retry_delay(daemon.clone(), Duration::from_millis(0));
        assert!(matches!(manager.acquire(7, "/tmp/lease"), Err(BrokerError::SanlockHostIdConflict { host_id: 7 })));
        assert_eq!(daemon.call_count(), 1);
    }

    /// Scenario S6: `add_lockspace` fails with EINTR `k` times then
    /// succeeds; `acquire` succeeds and emits exactly `k+1` calls.
    #[test]
    fn transient_eintr_retries_then_succeeds() {
        let k = 2;
        let mut responses: Vec<Result<(), LockDaemonError>> =
            (0..k).map(|_| Err(LockDaemonError::with_errno(libc::EINTR))).collect();
        responses.push(Ok(()));

        let daemon = Arc::new(ScriptedLockDaemon::new(responses));
        let manager = LockspaceManager::with_retry_delay(daemon.clone(), Duration::from_millis(0));
        assert!(manager.acquire(7, "/tmp/lease").is_ok());
        assert_eq!(daemon.call_count(), (k + 1) as u32);
    }

    #[test]
    fn exhausting_the_retry_budget_is_fatal() {
        let responses = (0..WAIT_FOR_STORAGE_RETRY).map(|_| Err(LockDaemonError::with_errno(libc::EINTR))).collect();
        let daemon = Arc::new(ScriptedLockDaemon::new(responses));
        let manager = LockspaceManager::with_retry_delay(daemon.clone(), Duration::from_millis(0));
        assert!(matches!(manager.acquire(7, "/tmp/lease"), Err(BrokerError::SanlockInitializationError)));
        assert_eq!(daemon.call_count(), WAIT_FOR_STORAGE_RETRY);
    }
}
