//! Read-only client view over the whiteboard: parses raw per-host byte
//! slots into host-id → field-map dictionaries.
//!
//! Grounded on `HAClient` in the original client module (`get_all_stats`,
//! `get_all_stats_direct`, `set_global_md_flag`, `get_local_host_score`).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use whiteboard_backend::command_runner::SystemCommandRunner;
use whiteboard_backend::{Backend, FilesystemBackend};
use whiteboard_broker::{BrokerError, DomainMonitorClient, LockDaemon, StorageBroker, UnavailableDomainMonitorClient, UnavailableLockDaemon};
use whiteboard_core::constants::HOST_ALIVE_TIMEOUT_SECS;

use crate::record::{GlobalRecord, HostRecord};

pub const SERVICE_TYPE: &str = "metadata";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatMode {
    All,
    Host,
    Global,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("unknown metadata flag: {0}")]
    UnknownFlag(String),
}

/// A view over a set of already-parsed slots: global metadata at key 0,
/// host records keyed by host id. Mirrors `_parse_stats`'s return shape.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub global: Option<GlobalRecord>,
    pub hosts: BTreeMap<u64, HostRecord>,
}

fn parse_stats(raw: BTreeMap<u64, Vec<u8>>, mode: StatMode) -> Stats {
    let mut stats = Stats::default();
    for (slot_index, data) in raw {
        if slot_index == 0 {
            if mode != StatMode::Host {
                stats.global = Some(GlobalRecord::parse(&data));
            }
        } else if mode != StatMode::Global {
            match HostRecord::parse(slot_index, &data) {
                Ok(record) => {
                    stats.hosts.insert(record.host_id, record);
                }
                Err(e) => log::error!("failed to parse host record for slot {slot_index}: {e}"),
            }
        }
    }
    stats
}

/// Registry of global metadata flags `set_global_md_flag` accepts,
/// each with an optional normalization applied before storage.
fn normalize_flag(flag: &str, value: &str) -> Result<String, ClientError> {
    match flag {
        "maintenance" => match value.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Ok("True".to_string()),
            "false" | "0" | "no" => Ok("False".to_string()),
            other => Err(ClientError::UnknownFlag(format!("maintenance={other}"))),
        },
        "stopped" => Ok(value.to_string()),
        _ => Err(ClientError::UnknownFlag(flag.to_string())),
    }
}

/// Reads all stats from an already-constructed broker, parses them, and
/// filters by `mode`.
pub fn get_all_stats(broker: &StorageBroker, mode: StatMode) -> Result<Stats, ClientError> {
    let raw = broker.get_raw_stats(SERVICE_TYPE)?;
    Ok(parse_stats(raw, mode))
}

/// Like `get_all_stats`, but constructs its own broker directly over
/// `dom_path` rather than going through a channel to a running broker —
/// the direct-access counterpart to `get_all_stats_direct`, given its own
/// explicit `(dom_path, service_type, mode)` signature.
pub fn get_all_stats_direct(dom_path: &str, service_type: &str, mode: StatMode) -> Result<Stats, ClientError> {
    let storage_path = std::path::Path::new(dom_path).join("ha_agent");
    let backend = FilesystemBackend::at_path("direct", "nfs", storage_path, Arc::new(SystemCommandRunner));

    let lock_daemon: Arc<dyn LockDaemon> = Arc::new(UnavailableLockDaemon);
    let domain_monitor: Arc<dyn DomainMonitorClient> = Arc::new(UnavailableDomainMonitorClient);
    let broker = StorageBroker::from_connected_backend(Backend::Filesystem(backend), "direct", lock_daemon, domain_monitor);

    let raw = broker.get_raw_stats(service_type)?;
    Ok(parse_stats(raw, mode))
}

/// Reads slot 0, sets `flag` to `value` (after flag-specific
/// normalization), re-encodes, and writes it back.
pub fn set_global_md_flag(broker: &StorageBroker, flag: &str, value: &str) -> Result<(), ClientError> {
    let normalized = normalize_flag(flag, value)?;

    let raw = broker.get_raw_stats(SERVICE_TYPE)?;
    let mut global = match raw.get(&0) {
        Some(data) => GlobalRecord::parse(data),
        None => GlobalRecord::default(),
    };
    global.fields.insert(flag.to_string(), normalized);

    broker.put_stats(SERVICE_TYPE, 0, &global.encode())?;
    Ok(())
}

/// Returns `host_id`'s score if its last report is within
/// `HOST_ALIVE_TIMEOUT_SECS` of wall-clock now, else 0. Parse errors are
/// logged and treated as a zero score, matching the original's swallow-
/// and-log handling of `MetadataError`.
pub fn get_local_host_score(broker: &StorageBroker, host_id: u64) -> Result<u64, ClientError> {
    let raw = broker.get_raw_stats(SERVICE_TYPE)?;
    let Some(data) = raw.get(&host_id) else {
        return Ok(0);
    };

    let record = match HostRecord::parse(host_id, data) {
        Ok(r) => r,
        Err(e) => {
            log::error!("{e}");
            return Ok(0);
        }
    };

    let host_ts = match record.host_ts() {
        Ok(ts) => ts,
        Err(e) => {
            log::error!("{e}");
            return Ok(0);
        }
    };

    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs();
    if host_ts + HOST_ALIVE_TIMEOUT_SECS >= now {
        Ok(record.score())
    } else {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use whiteboard_backend::command_runner::fake::FakeCommandRunner;
    use whiteboard_broker::domain_monitor::fake::InMemoryDomainMonitorClient;
    use whiteboard_broker::lockspace::fake::ScriptedLockDaemon;

    fn broker_over(tmp: &tempfile::TempDir) -> StorageBroker {
        use std::fs::File;
        use std::io::{Seek, SeekFrom, Write};
        let metadata_path = tmp.path().join("metadata");
        let mut f = File::create(&metadata_path).unwrap();
        f.seek(SeekFrom::Start(1024 * 1024 - 1)).unwrap();
        f.write_all(&[0]).unwrap();
        drop(f);

        let runner = Arc::new(FakeCommandRunner::new());
        let backend = FilesystemBackend::at_path("sd-uuid", "nfs", tmp.path().to_path_buf(), runner);
        StorageBroker::from_connected_backend(
            Backend::Filesystem(backend),
            "sd-uuid",
            Arc::new(ScriptedLockDaemon::new(vec![Ok(())])),
            Arc::new(InMemoryDomainMonitorClient::new(0)),
        )
    }

    #[test]
    fn get_all_stats_splits_global_and_host_records() {
        let tmp = tempfile::TempDir::new().unwrap();
        let broker = broker_over(&tmp);

        broker.put_stats(SERVICE_TYPE, 0, b"maintenance=False").unwrap();
        broker.put_stats(SERVICE_TYPE, 3, b"host-id=3\nhost-ts=100\nscore=500").unwrap();

        let stats = get_all_stats(&broker, StatMode::All).unwrap();
        assert!(stats.global.is_some());
        assert_eq!(stats.hosts.len(), 1);
        assert_eq!(stats.hosts[&3].score(), 500);
    }

    #[test]
    fn host_mode_filters_out_global_record() {
        let tmp = tempfile::TempDir::new().unwrap();
        let broker = broker_over(&tmp);
        broker.put_stats(SERVICE_TYPE, 0, b"maintenance=False").unwrap();

        let stats = get_all_stats(&broker, StatMode::Host).unwrap();
        assert!(stats.global.is_none());
    }

    #[test]
    fn set_global_md_flag_preserves_other_fields() {
        let tmp = tempfile::TempDir::new().unwrap();
        let broker = broker_over(&tmp);

        broker.put_stats(SERVICE_TYPE, 0, b"stopped=False").unwrap();
        set_global_md_flag(&broker, "maintenance", "true").unwrap();

        let stats = get_all_stats(&broker, StatMode::Global).unwrap();
        let global = stats.global.unwrap();
        assert_eq!(global.fields.get("stopped").map(String::as_str), Some("False"));
        assert_eq!(global.fields.get("maintenance").map(String::as_str), Some("True"));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let broker = broker_over(&tmp);
        assert!(matches!(set_global_md_flag(&broker, "bogus", "1"), Err(ClientError::UnknownFlag(_))));
    }

    #[test]
    fn local_host_score_is_zero_when_stale() {
        let tmp = tempfile::TempDir::new().unwrap();
        let broker = broker_over(&tmp);
        broker.put_stats(SERVICE_TYPE, 4, b"host-id=4\nhost-ts=1\nscore=900").unwrap();
        assert_eq!(get_local_host_score(&broker, 4).unwrap(), 0);
    }

    #[test]
    fn local_host_score_is_zero_when_absent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let broker = broker_over(&tmp);
        assert_eq!(get_local_host_score(&broker, 9).unwrap(), 0);
    }
}
