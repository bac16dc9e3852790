//! Fixed sizes and timeouts shared by every component of the whiteboard.

/// Size in bytes of a single per-host slot within the metadata service.
pub const HOST_SEGMENT_BYTES: usize = 4096;

/// The highest host id the whiteboard will scan for on a full read.
/// Slot 0 is reserved for global metadata, so `MAX_HOST_ID_SCAN + 1` slots
/// are read in total.
pub const MAX_HOST_ID_SCAN: usize = 250;

/// Liveness reports older than this are treated as if the host never
/// reported at all.
pub const HOST_ALIVE_TIMEOUT_SECS: u64 = 45;

/// Atomic block size of the underlying storage; also the size of one
/// info-block on the block backend.
pub const BLOCK_SIZE: usize = 512;

/// Maximum length, in bytes, of a service name (the info-block name field
/// minus its one length-prefix byte).
pub const MAX_SERVICE_NAME_LEN: usize = 63;
