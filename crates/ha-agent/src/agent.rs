//! The bounded retry loop and heartbeat driver, grounded in
//! `Agent._run_agent`/`Agent.run` from the original agent module.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use whiteboard_backend::command_runner::SystemCommandRunner;
use whiteboard_backend::{Backend, FilesystemBackend};
use whiteboard_broker::{
    BrokerError, DomainMonitorClient, LockDaemon, StorageBroker, UnavailableDomainMonitorClient, UnavailableLockDaemon,
};
use whiteboard_client::SERVICE_TYPE;
use whiteboard_core::constants::HOST_SEGMENT_BYTES;

use crate::constants::{AGENT_START_RETRIES, AGENT_START_RETRY_WAIT_SECS, HEARTBEAT_INTERVAL_SECS};
use crate::heartbeat::HeartbeatPayload;
use crate::shutdown::shutdown_requested;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("agent failed to start after {0} attempts")]
    RetriesExhausted(u32),
}

/// Builds the production broker for `sd_uuid`: no real lock daemon or
/// hypervisor RPC transport is specified, so both collaborators are
/// wired to their `Unavailable*` stubs, matching the rest of the
/// whiteboard's treatment of out-of-process services.
fn connect_broker(sd_uuid: &str) -> Result<StorageBroker, BrokerError> {
    let backend = FilesystemBackend::new(sd_uuid, "nfs", Arc::new(SystemCommandRunner));
    let lock_daemon: Arc<dyn LockDaemon> = Arc::new(UnavailableLockDaemon);
    let domain_monitor: Arc<dyn DomainMonitorClient> = Arc::new(UnavailableDomainMonitorClient);
    StorageBroker::new(Backend::Filesystem(backend), sd_uuid, lock_daemon, domain_monitor)
}

/// Runs one attempt of the agent: connects the broker, acquires the
/// lockspace lease, starts domain monitoring, then writes `host_id`'s
/// slot every `HEARTBEAT_INTERVAL_SECS` until a shutdown is requested or
/// the broker reports a fatal error.
fn run_once(sd_uuid: &str, host_id: u64, payload: &dyn HeartbeatPayload) -> Result<(), AgentError> {
    let broker = connect_broker(sd_uuid)?;

    let lease_path = broker
        .get_service_path("lockspace")
        .ok_or_else(|| BrokerError::RequestErrorMsg("lockspace service is not known to this backend".to_string()))?;
    broker.acquire_whiteboard_lock(host_id, &lease_path)?;
    broker.start_domain_monitor(host_id)?;

    log::info!("agent started for host {host_id} on domain {sd_uuid}");

    while !shutdown_requested() {
        broker.put_stats(SERVICE_TYPE, host_id, &payload.build())?;
        thread::sleep(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    }

    log::info!("shutdown requested, stopping agent for host {host_id}");
    broker.stop_domain_monitor();
    broker.release_whiteboard_lock();
    Ok(())
}

/// The outer bounded-retry loop: up to `AGENT_START_RETRIES` attempts at
/// `run_once`, separated by `AGENT_START_RETRY_WAIT_SECS`, abandoned
/// early if a shutdown is already requested.
pub fn run_agent(sd_uuid: &str, host_id: u64, payload: &dyn HeartbeatPayload) -> Result<(), AgentError> {
    for attempt in 1..=AGENT_START_RETRIES {
        match run_once(sd_uuid, host_id, payload) {
            Ok(()) => return Ok(()),
            Err(e) if shutdown_requested() => {
                log::info!("agent exiting during shutdown: {e}");
                return Ok(());
            }
            Err(e) => {
                log::error!("agent attempt {attempt}/{AGENT_START_RETRIES} failed: {e}");
                if attempt < AGENT_START_RETRIES {
                    thread::sleep(Duration::from_secs(AGENT_START_RETRY_WAIT_SECS));
                }
            }
        }
    }

    Err(AgentError::RetriesExhausted(AGENT_START_RETRIES))
}

/// Whether every host slot in the metadata region is currently absent.
fn metadata_region_is_clean(broker: &StorageBroker) -> Result<bool, BrokerError> {
    Ok(broker.get_raw_stats(SERVICE_TYPE)?.is_empty())
}

/// Purges the metadata region by zeroing every host slot. Refuses to run
/// against a region that already holds host records unless `force` is
/// set, matching the CLI's `--cleanup`/`--force-cleanup` split.
pub fn cleanup(sd_uuid: &str, force: bool) -> Result<(), AgentError> {
    let broker = connect_broker(sd_uuid)?;

    if !force && !metadata_region_is_clean(&broker)? {
        return Err(AgentError::Broker(BrokerError::RequestErrorMsg(
            "metadata region is not clean; pass --force-cleanup to override".to_string(),
        )));
    }

    let zero_slot = vec![0u8; HOST_SEGMENT_BYTES];
    for host_id in 0..=whiteboard_core::constants::MAX_HOST_ID_SCAN as u64 {
        broker.put_stats(SERVICE_TYPE, host_id, &zero_slot)?;
    }

    log::info!("cleaned up metadata region for domain {sd_uuid}");
    Ok(())
}
