//! End-to-end scenarios driving the filesystem backend, the broker, and
//! the client view together over a real (temp-directory) file tree,
//! rather than each crate's unit-level fakes in isolation.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;

use tempfile::TempDir;

use whiteboard_backend::command_runner::fake::FakeCommandRunner;
use whiteboard_backend::{Backend, FilesystemBackend};
use whiteboard_broker::domain_monitor::fake::InMemoryDomainMonitorClient;
use whiteboard_broker::lockspace::fake::ScriptedLockDaemon;
use whiteboard_broker::StorageBroker;
use whiteboard_client::{get_all_stats, get_local_host_score, set_global_md_flag, StatMode, SERVICE_TYPE};

fn domain_with_service(service: &str, size: u64) -> TempDir {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join(service);
    let mut f = File::create(path).unwrap();
    f.seek(SeekFrom::Start(size - 1)).unwrap();
    f.write_all(&[0]).unwrap();
    tmp
}

fn broker_over(tmp: &TempDir) -> StorageBroker {
    let runner = Arc::new(FakeCommandRunner::new());
    let backend = FilesystemBackend::at_path("sd-uuid", "nfs", tmp.path().to_path_buf(), runner);
    StorageBroker::from_connected_backend(
        Backend::Filesystem(backend),
        "sd-uuid",
        Arc::new(ScriptedLockDaemon::new(vec![Ok(())])),
        Arc::new(InMemoryDomainMonitorClient::new(0)),
    )
}

/// Two hosts heartbeat independently; the client view reports both
/// records and leaves the other host's slot untouched.
#[test]
fn two_hosts_heartbeat_without_interfering() {
    let tmp = domain_with_service("metadata", 1024 * 1024);
    let broker = broker_over(&tmp);

    broker.put_stats(SERVICE_TYPE, 1, b"host-id=1\nhost-ts=1000\nscore=100").unwrap();
    broker.put_stats(SERVICE_TYPE, 2, b"host-id=2\nhost-ts=1000\nscore=200").unwrap();

    let stats = get_all_stats(&broker, StatMode::Host).unwrap();
    assert_eq!(stats.hosts.len(), 2);
    assert_eq!(stats.hosts[&1].score(), 100);
    assert_eq!(stats.hosts[&2].score(), 200);
}

/// Setting a global flag through the client view round-trips through
/// the broker's raw slot storage and is visible to a fresh read.
#[test]
fn global_flag_round_trips_through_the_broker() {
    let tmp = domain_with_service("metadata", 1024 * 1024);
    let broker = broker_over(&tmp);

    set_global_md_flag(&broker, "maintenance", "true").unwrap();
    let stats = get_all_stats(&broker, StatMode::Global).unwrap();
    assert_eq!(stats.global.unwrap().fields.get("maintenance").map(String::as_str), Some("True"));

    set_global_md_flag(&broker, "stopped", "False").unwrap();
    let stats = get_all_stats(&broker, StatMode::Global).unwrap();
    let global = stats.global.unwrap();
    assert_eq!(global.fields.get("maintenance").map(String::as_str), Some("True"));
    assert_eq!(global.fields.get("stopped").map(String::as_str), Some("False"));
}

/// A host's score is visible immediately after it reports, and reads as
/// zero once its timestamp falls outside the liveness window.
#[test]
fn local_host_score_reflects_freshness() {
    let tmp = domain_with_service("metadata", 1024 * 1024);
    let broker = broker_over(&tmp);

    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
    broker.put_stats(SERVICE_TYPE, 5, format!("host-id=5\nhost-ts={now}\nscore=750").as_bytes()).unwrap();
    assert_eq!(get_local_host_score(&broker, 5).unwrap(), 750);

    broker.put_stats(SERVICE_TYPE, 5, b"host-id=5\nhost-ts=1\nscore=750").unwrap();
    assert_eq!(get_local_host_score(&broker, 5).unwrap(), 0);
}

/// The lockspace lease is acquired over the lockspace service path and
/// released on drop, without disturbing the metadata service.
#[test]
fn lockspace_lease_lifecycle_does_not_touch_metadata() {
    let tmp = domain_with_service("metadata", 1024 * 1024);
    let lockspace_path = tmp.path().join("lockspace");
    File::create(&lockspace_path).unwrap();
    let broker = broker_over(&tmp);

    let lease_path = broker.get_service_path("lockspace").unwrap();
    broker.acquire_whiteboard_lock(1, &lease_path).unwrap();
    broker.release_whiteboard_lock();

    assert!(get_all_stats(&broker, StatMode::All).unwrap().hosts.is_empty());
}
