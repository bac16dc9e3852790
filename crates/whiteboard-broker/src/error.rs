//! Broker-level error kinds, grounded in the original broker's exception
//! hierarchy (`RequestError`, `SanlockInitializationError`, `ServiceNotUp`,
//! `DuplicateStorageConnection`) plus the ambient `ConfigError`.

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("failed to connect storage backend: {0}")]
    ConnectionError(#[from] whiteboard_backend::BackendError),
    #[error("failed to disconnect storage backend: {0}")]
    DisconnectionError(whiteboard_backend::BackendError),
    #[error("storage request failed: {0}")]
    RequestError(#[from] whiteboard_core::io::IoError),
    #[error("{0}")]
    RequestErrorMsg(String),
    #[error("failed to acquire lockspace: retry budget exhausted")]
    SanlockInitializationError,
    #[error("failed to acquire lockspace: host {host_id} already holds a lock on a different host id")]
    SanlockHostIdConflict { host_id: u64 },
    #[error("external lock/domain-monitor daemon is not running")]
    ServiceNotUp,
    #[error("storage domain {sd_uuid} is already connected at a different path")]
    DuplicateStorageConnection { sd_uuid: String },
    #[error("unknown global metadata flag: {0}")]
    UnknownFlag(String),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
