//! Timeouts and retry budgets for the lockspace manager and domain monitor.

/// Name of the lockspace the whiteboard lease is acquired under.
pub const LOCKSPACE_NAME: &str = "hosted-engine";

/// Seconds slept between `add_lockspace` retries on a transient failure.
pub const WAIT_FOR_STORAGE_DELAY: u64 = 5;

/// Maximum number of `add_lockspace` attempts before giving up.
pub const WAIT_FOR_STORAGE_RETRY: u32 = 5;

/// Seconds between `getStorageRepoStats` polls while waiting for a domain
/// monitor to reach `ACQUIRED`.
pub const DOMAIN_MONITOR_POLL_INTERVAL_SECS: u64 = 5;

/// Absolute timeout for a domain monitor to reach `ACQUIRED`.
pub const MAX_DOMAIN_MONITOR_WAIT_SECS: u64 = 600;
