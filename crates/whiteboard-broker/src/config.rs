//! Environment-driven configuration, grounded in `env/config.py`'s flat key
//! set but reshaped into a typed struct with no silent defaults for
//! required keys, matching how the rest of the retrieval pack reads
//! process configuration.

use std::collections::HashMap;
use std::env;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required configuration key: {0}")]
    MissingKey(&'static str),
    #[error("unrecognized domain_type: {0}")]
    UnknownDomainType(String),
    #[error("host_id is not a valid integer: {0}")]
    InvalidHostId(String),
    #[error("malformed iscsi path blacklist entry: {0}")]
    InvalidIscsiBlacklist(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainType {
    Nfs,
    Nfs3,
    Nfs4,
    Glusterfs,
    Posixfs,
    Iscsi,
    Fc,
}

impl DomainType {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "nfs" => Ok(DomainType::Nfs),
            "nfs3" => Ok(DomainType::Nfs3),
            "nfs4" => Ok(DomainType::Nfs4),
            "glusterfs" => Ok(DomainType::Glusterfs),
            "posixfs" => Ok(DomainType::Posixfs),
            "iscsi" => Ok(DomainType::Iscsi),
            "fc" => Ok(DomainType::Fc),
            other => Err(ConfigError::UnknownDomainType(other.to_string())),
        }
    }

    /// Whether this domain type is served by the filesystem backend's
    /// `glusterSD` path rather than the plain mount-parent scan.
    pub fn is_glusterfs(self) -> bool {
        matches!(self, DomainType::Glusterfs)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub sd_uuid: String,
    pub sp_uuid: String,
    pub domain_type: DomainType,
    pub metadata_image_uuid: String,
    pub metadata_volume_uuid: String,
    pub lockspace_image_uuid: String,
    pub lockspace_volume_uuid: String,
    pub host_id: u64,
    pub iscsi_path_blacklist: Vec<(String, String)>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_map(&env::vars().collect())
    }

    /// Builds a `Config` from an explicit key/value map instead of the
    /// process environment, so tests don't need to mutate global state.
    pub fn from_map(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            vars.get(key).cloned().ok_or(ConfigError::MissingKey(key))
        };

        let domain_type = DomainType::parse(&required("domain_type")?)?;
        let host_id: u64 = required("host_id")?
            .parse()
            .map_err(|_| ConfigError::InvalidHostId(vars.get("host_id").cloned().unwrap_or_default()))?;

        let iscsi_path_blacklist = match vars.get("iscsi_path_blacklist") {
            Some(raw) if !raw.is_empty() => parse_iscsi_blacklist(raw)?,
            _ => Vec::new(),
        };

        Ok(Config {
            sd_uuid: required("sd_uuid")?,
            sp_uuid: required("sp_uuid")?,
            domain_type,
            metadata_image_uuid: required("metadata_image_uuid")?,
            metadata_volume_uuid: required("metadata_volume_uuid")?,
            lockspace_image_uuid: required("lockspace_image_uuid")?,
            lockspace_volume_uuid: required("lockspace_volume_uuid")?,
            host_id,
            iscsi_path_blacklist,
        })
    }
}

/// Parses `"iface<>portal,iface<>portal,…"` into pairs.
fn parse_iscsi_blacklist(raw: &str) -> Result<Vec<(String, String)>, ConfigError> {
    raw.split(',')
        .map(|entry| {
            entry
                .split_once("<>")
                .map(|(iface, portal)| (iface.to_string(), portal.to_string()))
                .ok_or_else(|| ConfigError::InvalidIscsiBlacklist(entry.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        [
            ("sd_uuid", "sd-1"),
            ("sp_uuid", "sp-1"),
            ("domain_type", "nfs"),
            ("metadata_image_uuid", "mdimg"),
            ("metadata_volume_uuid", "mdvol"),
            ("lockspace_image_uuid", "lsimg"),
            ("lockspace_volume_uuid", "lsvol"),
            ("host_id", "3"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn parses_a_complete_environment() {
        let cfg = Config::from_map(&base_vars()).unwrap();
        assert_eq!(cfg.sd_uuid, "sd-1");
        assert_eq!(cfg.host_id, 3);
        assert_eq!(cfg.domain_type, DomainType::Nfs);
        assert!(cfg.iscsi_path_blacklist.is_empty());
    }

    #[test]
    fn missing_required_key_is_a_typed_error() {
        let mut vars = base_vars();
        vars.remove("sd_uuid");
        assert!(matches!(Config::from_map(&vars), Err(ConfigError::MissingKey("sd_uuid"))));
    }

    #[test]
    fn unknown_domain_type_is_rejected() {
        let mut vars = base_vars();
        vars.insert("domain_type".to_string(), "nope".to_string());
        assert!(matches!(Config::from_map(&vars), Err(ConfigError::UnknownDomainType(_))));
    }

    #[test]
    fn iscsi_blacklist_parses_pairs() {
        let mut vars = base_vars();
        vars.insert("iscsi_path_blacklist".to_string(), "eth0<>10.0.0.1,eth1<>10.0.0.2".to_string());
        let cfg = Config::from_map(&vars).unwrap();
        assert_eq!(
            cfg.iscsi_path_blacklist,
            vec![("eth0".to_string(), "10.0.0.1".to_string()), ("eth1".to_string(), "10.0.0.2".to_string())]
        );
    }
}
