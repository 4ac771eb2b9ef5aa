//! In-memory block storage implementation

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::cid::IpldCid;
use crate::error::{RepoError, Result};
use crate::storage::{Block, BlockStore};

/// In-memory block storage using BTreeMap
///
/// Built once from a block sequence (usually a [`CarReader`]) and never
/// mutated afterwards. `Bytes` payloads share the archive buffer, so building
/// the store does not copy block data.
///
/// If the same CID appears more than once, the block inserted last wins.
///
/// [`CarReader`]: crate::car::CarReader
#[derive(Debug, Clone, Default)]
pub struct MemoryBlockStore {
    blocks: BTreeMap<IpldCid, Bytes>,
}

impl MemoryBlockStore {
    /// Create new store from a map of blocks
    pub fn new_from_blocks(blocks: BTreeMap<IpldCid, Bytes>) -> Self {
        Self { blocks }
    }

    /// Consume a block sequence and index it by CID
    ///
    /// The first error in the sequence aborts construction; no partial store
    /// is returned.
    pub fn build<I>(blocks: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Block>>,
    {
        Self::build_inner(blocks, false)
    }

    /// Like [`build`](Self::build), but also check every payload against its CID
    ///
    /// A block whose payload does not hash to its CID fails the whole build
    /// with [`IntegrityMismatch`](crate::RepoErrorKind::IntegrityMismatch).
    pub fn build_verified<I>(blocks: I) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Block>>,
    {
        Self::build_inner(blocks, true)
    }

    fn build_inner<I>(blocks: I, verify: bool) -> Result<Self>
    where
        I: IntoIterator<Item = Result<Block>>,
    {
        let mut map = BTreeMap::new();
        let mut duplicates = 0usize;
        for block in blocks {
            let block = block?;
            if verify && !block.verify() {
                return Err(RepoError::integrity(&block.cid));
            }
            if map.insert(block.cid, block.data).is_some() {
                duplicates += 1;
                tracing::debug!(cid = %block.cid, "duplicate block in archive, keeping the later copy");
            }
        }
        tracing::debug!(blocks = map.len(), duplicates, verified = verify, "built block store");
        Ok(Self { blocks: map })
    }

    /// Get a block with its CID
    pub fn get_block(&self, cid: &IpldCid) -> Result<Block> {
        self.get(cid).map(|data| Block::new(*cid, data))
    }

    /// All blocks, in CID order
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks
            .iter()
            .map(|(cid, data)| Block::new(*cid, data.clone()))
    }

    /// All CIDs, in order
    pub fn cids(&self) -> impl Iterator<Item = &IpldCid> {
        self.blocks.keys()
    }
}

impl BlockStore for MemoryBlockStore {
    fn get(&self, cid: &IpldCid) -> Result<Bytes> {
        self.blocks
            .get(cid)
            .cloned()
            .ok_or_else(|| RepoError::unknown_cid(cid))
    }

    fn has(&self, cid: &IpldCid) -> bool {
        self.blocks.contains_key(cid)
    }

    fn len(&self) -> usize {
        self.blocks.len()
    }
}
