//! The heartbeat payload hook: VM-placement decisions (what to write
//! beyond "I am alive", when to start/stop the engine VM) are out of
//! scope, so the loop only asks a caller-supplied implementation to
//! produce each tick's bytes.

/// Produces the payload written to this host's slot on every heartbeat.
pub trait HeartbeatPayload: Send + Sync {
    fn build(&self) -> Vec<u8>;
}

/// A minimal payload carrying only `host-id`/`host-ts`, used when no
/// richer placement logic is wired in.
pub struct AlivePayload {
    pub host_id: u64,
}

impl HeartbeatPayload for AlivePayload {
    fn build(&self) -> Vec<u8> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs();
        let mut fields = std::collections::BTreeMap::new();
        fields.insert("host-id".to_string(), self.host_id.to_string());
        fields.insert("host-ts".to_string(), now.to_string());
        whiteboard_client::codec::encode(&fields)
    }
}
