//! Textual `key=value` metadata codec for whiteboard slots.
//!
//! Grounded on the shape `client.py`/`metadata.py` impose on a slot's
//! bytes (the original module wasn't retrievable, so the wire format
//! below follows the data model's description directly): `\n`-separated
//! `key=value` pairs, the record terminated before the first NUL byte
//! (the rest of the 4096-byte slot is zero padding written by the
//! broker, not part of the record).

use std::collections::BTreeMap;

/// Encodes `fields` as `key=value` pairs separated by `\n`, in key order
/// for reproducible output. Does not pad to a slot size; `put_stats`
/// handles that.
pub fn encode(fields: &BTreeMap<String, String>) -> Vec<u8> {
    fields
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("\n")
        .into_bytes()
}

/// Decodes a slot's raw bytes into its `key=value` fields, stopping at
/// the first NUL byte (the zero-padded tail of the slot).
pub fn decode(raw: &[u8]) -> BTreeMap<String, String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let text = String::from_utf8_lossy(&raw[..end]);

    text.split('\n')
        .filter(|line| !line.is_empty())
        .filter_map(|line| line.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
