//! Block backend: a raw block device carved into named services by a
//! chained info-block table at its head, materialized as device-mapper
//! linear devices.
//!
//! Grounded on `BlockBackend` in the original broker (`parse_meta_block`,
//! `get_services`, `compute_dm_table`, `create_info_blocks`), with the
//! distilled spec's Open Question resolved: `connect()` here iterates the
//! service map's entries (name, pieces) rather than the original's
//! accidental string-unpacking.

use std::collections::{BTreeMap, HashSet};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use positioned_io::{RandomAccessFile, ReadAt, WriteAt};

use whiteboard_core::constants::BLOCK_SIZE;
use whiteboard_core::info_block::{encode_info_block, parse_info_block, InfoBlockError};

use crate::command_runner::{CommandError, CommandRunner};

#[derive(Debug, thiserror::Error)]
pub enum BlockBackendError {
    #[error("CRC for info block at index {0} does not match its content")]
    Corrupted(u64),
    #[error("info block chain looped back to index {0} without terminating")]
    ChainLoop(u64),
    #[error(transparent)]
    InfoBlock(#[from] InfoBlockError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Command(#[from] CommandError),
}

pub type Pieces = Vec<(u64, u64)>;

pub struct BlockBackend {
    block_dev_path: String,
    dm_prefix: String,
    services: BTreeMap<String, Pieces>,
    command_runner: Arc<dyn CommandRunner>,
}

impl BlockBackend {
    pub fn new(block_dev_path: impl Into<String>, dm_prefix: impl Into<String>, command_runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            block_dev_path: block_dev_path.into(),
            dm_prefix: dm_prefix.into(),
            services: BTreeMap::new(),
            command_runner,
        }
    }

    pub fn direct_io(&self) -> bool {
        true
    }

    fn dm_name(&self, service: &str) -> String {
        format!("{}/{}", self.dm_prefix, service)
    }

    /// Read the info-block table from the device and assemble the
    /// service → pieces mapping, following the single chain that threads
    /// through every info-block starting at index 0.
    fn read_service_table(&self) -> Result<BTreeMap<String, Pieces>, BlockBackendError> {
        let file = RandomAccessFile::open(&self.block_dev_path)?;

        let mut services: BTreeMap<String, Pieces> = BTreeMap::new();
        let mut visited = HashSet::new();
        let mut index: u64 = 0;

        loop {
            if !visited.insert(index) {
                return Err(BlockBackendError::ChainLoop(index));
            }

            let mut raw = [0u8; BLOCK_SIZE];
            file.read_exact_at(index * BLOCK_SIZE as u64, &mut raw)?;
            let parsed = parse_info_block(&raw)?;
            if !parsed.valid {
                return Err(BlockBackendError::Corrupted(index));
            }

            services.entry(parsed.name.clone()).or_default().extend(parsed.pieces.iter().copied());

            if parsed.next == 0 {
                break;
            }
            index = parsed.next;
        }

        Ok(services)
    }

    /// `"<log> <len> linear <device> <phys>"` lines, logical offsets
    /// advancing by each piece's length, units of 512-byte sectors.
    pub fn compute_dm_table(&self, pieces: &[(u64, u64)]) -> String {
        let mut lines = Vec::with_capacity(pieces.len());
        let mut log_start = 0u64;
        for &(start, size) in pieces {
            lines.push(format!("{log_start} {size} linear {} {start}", self.block_dev_path));
            log_start += size;
        }
        lines.join("\n")
    }

    fn dm_create(&self, service: &str, table: &str) -> Result<(), BlockBackendError> {
        log::debug!("creating dm device {} with table: {table}", self.dm_name(service));
        self.command_runner.run("dmsetup", &["create", &self.dm_name(service)], Some(table.as_bytes()))?;
        Ok(())
    }

    fn dm_remove(&self, service: &str) -> Result<(), BlockBackendError> {
        log::debug!("removing dm device {}", self.dm_name(service));
        self.command_runner.run("dmsetup", &["remove", &self.dm_name(service)], None)?;
        Ok(())
    }

    pub fn connect(&mut self) -> Result<(), BlockBackendError> {
        let services = self.read_service_table()?;
        log::info!("connecting block backend {} ({} services)", self.block_dev_path, services.len());

        for (name, pieces) in services.iter() {
            let table = self.compute_dm_table(pieces);
            self.dm_create(name, &table)?;
        }

        self.services = services;
        Ok(())
    }

    pub fn disconnect(&mut self) -> Result<(), BlockBackendError> {
        log::info!("disconnecting block backend {}", self.block_dev_path);
        for name in self.services.keys() {
            self.dm_remove(name)?;
        }
        Ok(())
    }

    pub fn filename(&self, service: &str) -> Option<(String, u64)> {
        if !self.services.contains_key(service) {
            return None;
        }
        Some((PathBuf::from("/dev/mapper").join(self.dm_name(service)).to_string_lossy().into_owned(), 0))
    }

    fn block_count(size_bytes: u64) -> u64 {
        size_bytes.div_ceil(BLOCK_SIZE as u64)
    }

    /// Build the chained info-block table for `service_map`: smaller
    /// services come first, each gets one info-block with a single piece,
    /// and the chain's `next` links thread consecutively through every
    /// block, wrapping the last one back to 0.
    pub fn create_info_blocks(service_map: &BTreeMap<String, u64>) -> Result<Vec<[u8; BLOCK_SIZE]>, InfoBlockError> {
        let n = service_map.len() as u64;
        let mut sorted: Vec<(&String, &u64)> = service_map.iter().collect();
        sorted.sort_by_key(|(_, &size)| size);

        let mut data_start = n;
        let mut blocks = Vec::with_capacity(sorted.len());
        for (idx, (service, &size)) in sorted.into_iter().enumerate() {
            let idx = idx as u64;
            let next_id = if idx + 1 < n { idx + 1 } else { 0 };
            let block_len = Self::block_count(size);
            blocks.push(encode_info_block(next_id, service, &[(data_start, block_len)])?);
            data_start += block_len;
        }
        Ok(blocks)
    }

    pub fn create(&mut self, service_map: &BTreeMap<String, u64>) -> Result<(), BlockBackendError> {
        let blocks = Self::create_info_blocks(service_map)?;

        let mut dev = OpenOptions::new().write(true).open(&self.block_dev_path)?;
        for (idx, block) in blocks.iter().enumerate() {
            dev.write_all_at(idx as u64 * BLOCK_SIZE as u64, block)?;
        }

        self.disconnect()?;
        self.connect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command_runner::fake::FakeCommandRunner;
    use std::io::Write;
    use tempfile::NamedTempFile;
    use whiteboard_core::info_block::encode_info_block;

    fn backend(path: &str) -> BlockBackend {
        BlockBackend::new(path, "ha_agent", Arc::new(FakeCommandRunner::new()))
    }

    #[test]
    fn create_info_blocks_matches_scenario_s3() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 300u64);
        map.insert("b".to_string(), 512u64);
        map.insert("c".to_string(), 52_428_800u64);

        let blocks = BlockBackend::create_info_blocks(&map).unwrap();
        assert_eq!(blocks.len(), 3);

        let a = parse_info_block(&blocks[0]).unwrap();
        assert_eq!((a.name.as_str(), a.pieces.as_slice(), a.next), ("a", &[(3, 1)][..], 1));

        let b = parse_info_block(&blocks[1]).unwrap();
        assert_eq!((b.name.as_str(), b.pieces.as_slice(), b.next), ("b", &[(4, 1)][..], 2));

        let c = parse_info_block(&blocks[2]).unwrap();
        assert_eq!((c.name.as_str(), c.pieces.as_slice(), c.next), ("c", &[(5, 102_400)][..], 0));
    }

    #[test]
    fn dm_table_composition_matches_scenario_s5() {
        let b = backend("/dev/null");
        let table = b.compute_dm_table(&[(1, 100), (102, 100)]);
        assert_eq!(table, "0 100 linear /dev/null 1\n100 100 linear /dev/null 102");
    }

    #[test]
    fn connect_reads_chained_services_from_device() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut map = BTreeMap::new();
        map.insert("test".to_string(), 100u64 * BLOCK_SIZE as u64);
        map.insert("test2".to_string(), 200u64 * BLOCK_SIZE as u64);

        let blocks = BlockBackend::create_info_blocks(&map).unwrap();
        let mut f = file.reopen().unwrap();
        for block in &blocks {
            f.write_all(block).unwrap();
        }
        std::io::Write::flush(&mut f).unwrap();

        let mut b = backend(&path);
        b.connect().unwrap();

        assert!(b.filename("test").is_some());
        assert!(b.filename("test2").is_some());
        assert!(b.filename("missing").is_none());
    }

    #[test]
    fn corrupted_block_refuses_to_connect() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut block = encode_info_block(0, "test", &[(1, 100)]).unwrap();
        block[20] ^= 0xFF;

        let mut f = file.reopen().unwrap();
        f.write_all(&block).unwrap();
        std::io::Write::flush(&mut f).unwrap();

        let mut b = backend(&path);
        assert!(matches!(b.connect(), Err(BlockBackendError::Corrupted(0))));
    }

    #[test]
    fn dmsetup_invoked_with_the_computed_table() {
        let file = NamedTempFile::new().unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let mut map = BTreeMap::new();
        map.insert("test".to_string(), 100u64 * BLOCK_SIZE as u64);

        let blocks = BlockBackend::create_info_blocks(&map).unwrap();
        let mut f = file.reopen().unwrap();
        for block in &blocks {
            f.write_all(block).unwrap();
        }
        std::io::Write::flush(&mut f).unwrap();

        let runner = Arc::new(FakeCommandRunner::new());
        let mut b = BlockBackend::new(&path, "ha_agent", runner.clone());
        b.connect().unwrap();

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].program, "dmsetup");
        assert_eq!(invocations[0].args, vec!["create", "ha_agent/test"]);
    }
}
