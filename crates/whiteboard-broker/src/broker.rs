//! The whiteboard storage broker: the public façade tying a storage
//! backend, the lockspace manager, the liveness cache, and domain-monitor
//! lifecycle together behind one storage-access mutex.
//!
//! Grounded on `StorageBroker` in the original broker module.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use whiteboard_backend::Backend;
use whiteboard_core::aligned_buffer::AlignedBuffer;
use whiteboard_core::constants::{HOST_ALIVE_TIMEOUT_SECS, HOST_SEGMENT_BYTES, MAX_HOST_ID_SCAN};
use whiteboard_core::io;

use crate::domain_monitor::{self, DomainMonitorClient};
use crate::error::BrokerError;
use crate::liveness_cache::LivenessCache;
use crate::lockspace::{LockDaemon, LockspaceHandle, LockspaceManager};

/// Public façade over one storage backend: per-service filename
/// resolution, per-host slot read/write, liveness cache, and lockspace
/// lease acquisition. All storage I/O is serialized through
/// `storage_access_lock`, mirroring the original's single
/// `threading.Lock`.
pub struct StorageBroker {
    backend: Mutex<Backend>,
    storage_access_lock: Mutex<()>,
    liveness: LivenessCache,
    lockspace: LockspaceManager,
    lease_handle: Mutex<Option<LockspaceHandle>>,
    domain_monitor: Arc<dyn DomainMonitorClient>,
    pub sd_uuid: String,
}

impl StorageBroker {
    /// Connects `backend` (domain discovery, LV symlink materialization,
    /// etc.) and wraps it in a broker. This is the normal construction
    /// path used by the agent, which only knows a storage domain's
    /// identity, not an already-resolved path.
    pub fn new(
        mut backend: Backend,
        sd_uuid: impl Into<String>,
        lock_daemon: Arc<dyn LockDaemon>,
        domain_monitor: Arc<dyn DomainMonitorClient>,
    ) -> Result<Self, BrokerError> {
        backend.connect()?;
        Ok(Self::from_connected_backend(backend, sd_uuid, lock_daemon, domain_monitor))
    }

    /// Wraps a backend that is already positioned at its storage path
    /// (e.g. `FilesystemBackend::at_path`), skipping the domain-discovery
    /// `connect()` call. Used by the client view's direct-access path,
    /// which is handed an explicit path rather than a service type to
    /// resolve through the usual `SD_MOUNT_PARENT` scan.
    pub fn from_connected_backend(
        backend: Backend,
        sd_uuid: impl Into<String>,
        lock_daemon: Arc<dyn LockDaemon>,
        domain_monitor: Arc<dyn DomainMonitorClient>,
    ) -> Self {
        Self {
            backend: Mutex::new(backend),
            storage_access_lock: Mutex::new(()),
            liveness: LivenessCache::new(),
            lockspace: LockspaceManager::new(lock_daemon),
            lease_handle: Mutex::new(None),
            domain_monitor,
            sd_uuid: sd_uuid.into(),
        }
    }

    /// Returns the full path to the file or device backing `service`.
    pub fn get_service_path(&self, service: &str) -> Option<String> {
        self.backend.lock().unwrap().filename(service).map(|(path, _)| path)
    }

    fn resolve(&self, service: &str) -> Result<(String, u64, bool), BrokerError> {
        let backend = self.backend.lock().unwrap();
        let (path, offset) = backend.filename(service).ok_or_else(|| {
            BrokerError::RequestErrorMsg(format!("service {service} is not known to this backend"))
        })?;
        Ok((path, offset, backend.direct_io()))
    }

    /// Reads every present slot of `service`, keyed by host id (slot
    /// index). A slot is absent when its first byte is `0x00`.
    pub fn get_raw_stats(&self, service: &str) -> Result<BTreeMap<u64, Vec<u8>>, BrokerError> {
        let (path, base_offset, direct_io) = self.resolve(service)?;

        let _guard = self.storage_access_lock.lock().unwrap();
        let read_size = HOST_SEGMENT_BYTES * (MAX_HOST_ID_SCAN + 1);
        let mut buffer = AlignedBuffer::new(read_size)
            .map_err(|e| BrokerError::RequestErrorMsg(format!("failed to allocate aligned buffer: {e}")))?;

        let fd = io::open_read(&path, direct_io)?;
        io::seek(fd, base_offset)?;
        let result = io::read_exact(fd, &mut buffer.as_mut_slice()[..read_size]);
        io::close(fd);
        result?;

        let data = &buffer.as_slice()[..read_size];
        Ok(data
            .chunks_exact(HOST_SEGMENT_BYTES)
            .enumerate()
            .filter(|(_, chunk)| chunk[0] != 0)
            .map(|(i, chunk)| (i as u64, chunk.to_vec()))
            .collect())
    }

    /// Same as `get_raw_stats`, but with host ids stringified for an
    /// external channel, matching `get_all_stats_for_service_type`.
    pub fn get_all_stats(&self, service: &str) -> Result<BTreeMap<String, Vec<u8>>, BrokerError> {
        Ok(self
            .get_raw_stats(service)?
            .into_iter()
            .map(|(host_id, data)| (host_id.to_string(), data))
            .collect())
    }

    /// Writes `payload` into `host_id`'s slot of `service`, right-padded
    /// with zeros to `HOST_SEGMENT_BYTES`. Payloads larger than one slot
    /// are rejected.
    pub fn put_stats(&self, service: &str, host_id: u64, payload: &[u8]) -> Result<(), BrokerError> {
        if payload.len() > HOST_SEGMENT_BYTES {
            return Err(BrokerError::RequestErrorMsg(format!(
                "payload of {} bytes exceeds one host slot ({HOST_SEGMENT_BYTES} bytes)",
                payload.len()
            )));
        }

        let (path, base_offset, direct_io) = self.resolve(service)?;
        let offset = base_offset + host_id * HOST_SEGMENT_BYTES as u64;

        let _guard = self.storage_access_lock.lock().unwrap();
        let mut buffer = AlignedBuffer::new(HOST_SEGMENT_BYTES)
            .map_err(|e| BrokerError::RequestErrorMsg(format!("failed to allocate aligned buffer: {e}")))?;
        buffer.as_mut_slice()[..payload.len()].copy_from_slice(payload);

        let fd = io::open_write(&path, direct_io)?;
        io::seek(fd, offset)?;
        let result = io::uninterruptible_write(fd, &buffer.as_slice()[..HOST_SEGMENT_BYTES]);
        io::close(fd);
        result?;
        Ok(())
    }

    pub fn push_hosts_state(&self, service: &str, hosts: Vec<u64>) {
        self.liveness.push_hosts_state(service, hosts);
    }

    pub fn is_host_alive(&self, service: &str) -> Vec<u64> {
        self.liveness.is_host_alive(service)
    }

    /// Idempotent: if a lease is already held, this returns immediately
    /// without issuing another `add_lockspace` call, so a second acquire
    /// for the same host cannot briefly release the lease out from under
    /// whichever caller already holds it (acquiring a *new* handle would
    /// drop the old one first, running `rem_lockspace`, before the new
    /// `add_lockspace`'s EEXIST-as-success path had a chance to run).
    pub fn acquire_whiteboard_lock(&self, host_id: u64, lease_path: &str) -> Result<(), BrokerError> {
        let mut handle = self.lease_handle.lock().unwrap();
        if handle.is_some() {
            return Ok(());
        }
        *handle = Some(self.lockspace.acquire(host_id, lease_path)?);
        Ok(())
    }

    pub fn release_whiteboard_lock(&self) {
        *self.lease_handle.lock().unwrap() = None;
    }

    pub fn start_domain_monitor(&self, host_id: u64) -> Result<(), BrokerError> {
        domain_monitor::start_domain_monitor(self.domain_monitor.as_ref(), &self.sd_uuid, host_id)
    }

    pub fn stop_domain_monitor(&self) {
        domain_monitor::stop_domain_monitor(self.domain_monitor.as_ref(), &self.sd_uuid);
    }
}

/// `HOST_ALIVE_TIMEOUT_SECS` re-exported at the broker level since it
/// governs both the liveness cache and the client view's score logic.
pub const ALIVE_TIMEOUT_SECS: u64 = HOST_ALIVE_TIMEOUT_SECS;
