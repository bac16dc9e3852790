//! Domain-monitor lifecycle, delegated to the hypervisor RPC surface.
//!
//! Grounded on `start_domain_monitor`/`stop_domain_monitor`/
//! `_get_domain_monitor_status` in the original broker. The hypervisor is
//! an external collaborator specified only at the interface level: the
//! production implementation is a stub returning `ServiceNotUp`, and a
//! fully working in-memory fake is provided for tests.

use std::thread;
use std::time::Duration;

use crate::constants::{DOMAIN_MONITOR_POLL_INTERVAL_SECS, MAX_DOMAIN_MONITOR_WAIT_SECS};
use crate::error::BrokerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainMonitorStatus {
    None,
    Pending,
    Acquired,
}

#[derive(Debug, Clone)]
pub struct RepoStats {
    pub acquired: bool,
}

/// The hypervisor/storage-pool RPC surface the broker depends on for
/// domain-monitor lifecycle and storage-connection management.
pub trait DomainMonitorClient: Send + Sync {
    fn start_monitoring_domain(&self, sd_uuid: &str, host_id: u64) -> Result<(), BrokerError>;
    fn stop_monitoring_domain(&self, sd_uuid: &str) -> Result<(), BrokerError>;
    fn get_storage_repo_stats(&self, sd_uuid: &str) -> Result<Option<RepoStats>, BrokerError>;
    fn connect_storage_server(&self) -> Result<(), BrokerError>;
    fn disconnect_storage_server(&self) -> Result<(), BrokerError>;
    fn get_stats(&self, sd_uuid: &str) -> Result<Option<RepoStats>, BrokerError>;
}

/// No real RPC transport is specified; every call reports the service as
/// down, matching the spec's framing of the hypervisor as an external
/// collaborator described only at the interface level.
pub struct UnavailableDomainMonitorClient;

impl DomainMonitorClient for UnavailableDomainMonitorClient {
    fn start_monitoring_domain(&self, _sd_uuid: &str, _host_id: u64) -> Result<(), BrokerError> {
        Err(BrokerError::ServiceNotUp)
    }

    fn stop_monitoring_domain(&self, _sd_uuid: &str) -> Result<(), BrokerError> {
        Err(BrokerError::ServiceNotUp)
    }

    fn get_storage_repo_stats(&self, _sd_uuid: &str) -> Result<Option<RepoStats>, BrokerError> {
        Err(BrokerError::ServiceNotUp)
    }

    fn connect_storage_server(&self) -> Result<(), BrokerError> {
        Err(BrokerError::ServiceNotUp)
    }

    fn disconnect_storage_server(&self) -> Result<(), BrokerError> {
        Err(BrokerError::ServiceNotUp)
    }

    fn get_stats(&self, _sd_uuid: &str) -> Result<Option<RepoStats>, BrokerError> {
        Err(BrokerError::ServiceNotUp)
    }
}

fn status_of(stats: Option<RepoStats>) -> DomainMonitorStatus {
    match stats {
        None => DomainMonitorStatus::None,
        Some(RepoStats { acquired: true }) => DomainMonitorStatus::Acquired,
        Some(RepoStats { acquired: false }) => DomainMonitorStatus::Pending,
    }
}

/// Requests domain monitoring for `sd_uuid`/`host_id` and polls until the
/// domain reaches `ACQUIRED` or `MAX_DOMAIN_MONITOR_WAIT_SECS` elapses.
pub fn start_domain_monitor(
    client: &dyn DomainMonitorClient,
    sd_uuid: &str,
    host_id: u64,
) -> Result<(), BrokerError> {
    let mut status = status_of(client.get_storage_repo_stats(sd_uuid)?);

    if status == DomainMonitorStatus::None {
        client.start_monitoring_domain(sd_uuid, host_id)?;
        log::info!("started domain monitor for {sd_uuid}");
        status = status_of(client.get_storage_repo_stats(sd_uuid)?);
    }

    let mut waited = 0u64;
    while status != DomainMonitorStatus::Acquired && waited <= MAX_DOMAIN_MONITOR_WAIT_SECS {
        waited += DOMAIN_MONITOR_POLL_INTERVAL_SECS;
        thread::sleep(Duration::from_secs(DOMAIN_MONITOR_POLL_INTERVAL_SECS));
        status = status_of(client.get_storage_repo_stats(sd_uuid)?);
    }

    if status == DomainMonitorStatus::Acquired {
        log::debug!("domain {sd_uuid} is being monitored");
        Ok(())
    } else {
        log::error!("timed out waiting for domain monitor acquisition (sd_uuid={sd_uuid}, host_id={host_id})");
        Err(BrokerError::RequestErrorMsg(format!(
            "failed to start monitoring domain (sd_uuid={sd_uuid}, host_id={host_id}): timeout during domain acquisition"
        )))
    }
}

/// Requests monitoring to stop; RPC failures are logged and swallowed, per
/// the original's `except ServerError` handling around `stopMonitoringDomain`.
pub fn stop_domain_monitor(client: &dyn DomainMonitorClient, sd_uuid: &str) {
    match client.get_storage_repo_stats(sd_uuid) {
        Ok(stats) if status_of(stats.clone()) == DomainMonitorStatus::None => {}
        Ok(_) => {
            if let Err(e) = client.stop_monitoring_domain(sd_uuid) {
                log::info!("failed to stop monitoring domain: {e}");
            }
        }
        Err(e) => log::info!("failed to stop monitoring domain: {e}"),
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod fake {
    use super::*;
    use std::sync::Mutex;

    /// An in-memory domain monitor whose acquisition status advances by
    /// one step (`None` → `Pending` → `Acquired`) each time its repo
    /// stats are polled after `start_monitoring_domain` is called.
    pub struct InMemoryDomainMonitorClient {
        status: Mutex<DomainMonitorStatus>,
        steps_to_acquire: Mutex<u32>,
    }

    impl InMemoryDomainMonitorClient {
        pub fn new(steps_to_acquire: u32) -> Self {
            Self { status: Mutex::new(DomainMonitorStatus::None), steps_to_acquire: Mutex::new(steps_to_acquire) }
        }
    }

    impl DomainMonitorClient for InMemoryDomainMonitorClient {
        fn start_monitoring_domain(&self, _sd_uuid: &str, _host_id: u64) -> Result<(), BrokerError> {
            *self.status.lock().unwrap() = DomainMonitorStatus::Pending;
            Ok(())
        }

        fn stop_monitoring_domain(&self, _sd_uuid: &str) -> Result<(), BrokerError> {
            *self.status.lock().unwrap() = DomainMonitorStatus::None;
            Ok(())
        }

        fn get_storage_repo_stats(&self, _sd_uuid: &str) -> Result<Option<RepoStats>, BrokerError> {
            let mut status = self.status.lock().unwrap();
            if *status == DomainMonitorStatus::Pending {
                let mut steps = self.steps_to_acquire.lock().unwrap();
                if *steps == 0 {
                    *status = DomainMonitorStatus::Acquired;
                } else {
                    *steps -= 1;
                }
            }
            Ok(match *status {
                DomainMonitorStatus::None => None,
                DomainMonitorStatus::Pending => Some(RepoStats { acquired: false }),
                DomainMonitorStatus::Acquired => Some(RepoStats { acquired: true }),
            })
        }

        fn connect_storage_server(&self) -> Result<(), BrokerError> {
            Ok(())
        }

        fn disconnect_storage_server(&self) -> Result<(), BrokerError> {
            Ok(())
        }

        fn get_stats(&self, sd_uuid: &str) -> Result<Option<RepoStats>, BrokerError> {
            self.get_storage_repo_stats(sd_uuid)
        }
    }
}
