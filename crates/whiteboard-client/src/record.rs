//! Typed projections over a decoded slot's `key=value` fields.
//!
//! Only `host-id` and `host-ts` get typed accessors, per the data model:
//! everything else (scores, other flags) is an opaque string field the
//! caller is responsible for interpreting.

use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("slot is missing required field {0}")]
    MissingField(&'static str),
    #[error("field {field} has a non-numeric value: {value}")]
    NotNumeric { field: &'static str, value: String },
}

/// A parsed host record (slots 1..=MAX_HOST_ID_SCAN).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub host_id: u64,
    pub fields: BTreeMap<String, String>,
}

impl HostRecord {
    pub fn parse(slot_index: u64, raw: &[u8]) -> Result<Self, MetadataError> {
        let fields = crate::codec::decode(raw);
        let host_id = match fields.get("host-id") {
            Some(v) => v
                .parse()
                .map_err(|_| MetadataError::NotNumeric { field: "host-id", value: v.clone() })?,
            None => slot_index,
        };
        Ok(Self { host_id, fields })
    }

    pub fn host_ts(&self) -> Result<u64, MetadataError> {
        let raw = self.fields.get("host-ts").ok_or(MetadataError::MissingField("host-ts"))?;
        raw.parse().map_err(|_| MetadataError::NotNumeric { field: "host-ts", value: raw.clone() })
    }

    /// The `score` field, defaulting to 0 when absent or unparseable —
    /// score semantics are out of scope, so this is a best-effort read.
    pub fn score(&self) -> u64 {
        self.fields.get("score").and_then(|v| v.parse().ok()).unwrap_or(0)
    }
}

/// A parsed global record (slot 0).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalRecord {
    pub fields: BTreeMap<String, String>,
}

impl GlobalRecord {
    pub fn parse(raw: &[u8]) -> Self {
        Self { fields: crate::codec::decode(raw) }
    }

    pub fn encode(&self) -> Vec<u8> {
        crate::codec::encode(&self.fields)
    }
}
