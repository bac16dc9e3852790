//! Storage backends: a closed variant over the two concrete backends the
//! broker can be built on top of (design note: "dynamic dispatch across
//! backends" → monomorphic enum instead of a trait object).

pub mod block_backend;
pub mod command_runner;
pub mod constants;
pub mod fs_backend;

pub use block_backend::{BlockBackend, BlockBackendError};
pub use command_runner::{CommandError, CommandOutput, CommandRunner, SystemCommandRunner};
pub use fs_backend::{FilesystemBackend, FsBackendError};

use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error(transparent)]
    Filesystem(#[from] FsBackendError),
    #[error(transparent)]
    Block(#[from] BlockBackendError),
}

/// The storage backend a broker is built on: either a filesystem/LV tree
/// or a raw block device carved up by the info-block table.
pub enum Backend {
    Filesystem(FilesystemBackend),
    Block(BlockBackend),
}

impl Backend {
    pub fn connect(&mut self) -> Result<(), BackendError> {
        match self {
            Backend::Filesystem(b) => b.connect().map_err(Into::into),
            Backend::Block(b) => b.connect().map_err(Into::into),
        }
    }

    pub fn disconnect(&mut self) -> Result<(), BackendError> {
        match self {
            Backend::Filesystem(b) => {
                b.disconnect();
                Ok(())
            }
            Backend::Block(b) => b.disconnect().map_err(Into::into),
        }
    }

    pub fn filename(&self, service: &str) -> Option<(String, u64)> {
        match self {
            Backend::Filesystem(b) => b.filename(service),
            Backend::Block(b) => b.filename(service),
        }
    }

    pub fn create(&mut self, service_map: &BTreeMap<String, u64>) -> Result<(), BackendError> {
        match self {
            Backend::Filesystem(b) => b.create(service_map).map_err(Into::into),
            Backend::Block(b) => b.create(service_map).map_err(Into::into),
        }
    }

    pub fn direct_io(&self) -> bool {
        match self {
            Backend::Filesystem(b) => b.direct_io(),
            Backend::Block(b) => b.direct_io(),
        }
    }
}
