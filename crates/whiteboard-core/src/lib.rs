//! Core, dependency-light building blocks for the whiteboard storage
//! broker: fixed sizes, the aligned-buffer I/O primitive, raw-fd helpers,
//! and the block-backend's info-block codec.
//!
//! Everything here is bytes-in/bytes-out (design note: "untyped payload
//! bytes"): no component in this crate understands what a slot's contents
//! mean, only how big they are and where they live.

pub mod aligned_buffer;
pub mod constants;
pub mod info_block;
pub mod io;
pub mod service;

pub use aligned_buffer::{AlignedBuffer, AlignedBufferError};
pub use constants::{
    BLOCK_SIZE, HOST_ALIVE_TIMEOUT_SECS, HOST_SEGMENT_BYTES, MAX_HOST_ID_SCAN, MAX_SERVICE_NAME_LEN,
};
pub use info_block::{encode_info_block, parse_info_block, InfoBlock, InfoBlockError};
pub use service::ServiceName;
