//! A validated service name: a short string (≤63 bytes) naming a region on
//! shared storage, e.g. `hosted-engine.metadata` or `hosted-engine.lockspace`.

use crate::constants::MAX_SERVICE_NAME_LEN;

#[derive(Debug, thiserror::Error)]
#[error("service name {0:?} exceeds {MAX_SERVICE_NAME_LEN} bytes")]
pub struct ServiceNameTooLong(String);

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServiceName(String);

impl ServiceName {
    pub fn new(name: impl Into<String>) -> Result<Self, ServiceNameTooLong> {
        let name = name.into();
        if name.len() > MAX_SERVICE_NAME_LEN {
            return Err(ServiceNameTooLong(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ServiceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_overlong_names() {
        let name: String = "x".repeat(64);
        assert!(ServiceName::new(name).is_err());
    }

    #[test]
    fn accepts_boundary_length() {
        let name: String = "x".repeat(63);
        assert!(ServiceName::new(name).is_ok());
    }
}
