//! Maps service-type to the most recent "who is alive" report pushed by an
//! agent, aged out by `HOST_ALIVE_TIMEOUT_SECS`.
//!
//! Grounded on `StorageBroker.push_hosts_state`/`is_host_alive`; uses
//! `std::time::Instant` for the monotonic clock the original gets from
//! `lib.monotonic`.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use whiteboard_core::constants::HOST_ALIVE_TIMEOUT_SECS;

#[derive(Default)]
pub struct LivenessCache {
    entries: Mutex<HashMap<String, (Instant, Vec<u64>)>>,
}

impl LivenessCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_hosts_state(&self, service_type: &str, hosts: Vec<u64>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(service_type.to_string(), (Instant::now(), hosts));
    }

    /// Returns the last-pushed host list for `service_type`, or an empty
    /// list if nothing was ever pushed or the newest entry is stale.
    pub fn is_host_alive(&self, service_type: &str) -> Vec<u64> {
        let entries = self.entries.lock().unwrap();
        match entries.get(service_type) {
            Some((pushed_at, hosts)) if pushed_at.elapsed().as_secs() <= HOST_ALIVE_TIMEOUT_SECS => hosts.clone(),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_push_is_returned() {
        let cache = LivenessCache::new();
        cache.push_hosts_state("metadata", vec![1, 2, 3]);
        assert_eq!(cache.is_host_alive("metadata"), vec![1, 2, 3]);
    }

    #[test]
    fn unknown_service_type_is_empty() {
        let cache = LivenessCache::new();
        assert_eq!(cache.is_host_alive("metadata"), Vec::<u64>::new());
    }

    #[test]
    fn stale_entry_is_treated_as_absent() {
        let cache = LivenessCache::new();
        cache.entries.lock().unwrap().insert(
            "metadata".to_string(),
            (Instant::now() - std::time::Duration::from_secs(HOST_ALIVE_TIMEOUT_SECS + 1), vec![7]),
        );
        assert_eq!(cache.is_host_alive("metadata"), Vec::<u64>::new());
    }
}
