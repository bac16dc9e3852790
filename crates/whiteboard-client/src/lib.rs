//! Read-only client view over the whiteboard: parses raw per-host byte
//! slots into host-id → field-map dictionaries, using either a running
//! broker or direct storage access.

pub mod client;
pub mod codec;
pub mod record;

pub use client::{get_all_stats, get_all_stats_direct, get_local_host_score, set_global_md_flag, ClientError, StatMode, Stats, SERVICE_TYPE};
pub use record::{GlobalRecord, HostRecord, MetadataError};
