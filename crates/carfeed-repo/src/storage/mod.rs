//! Block storage for MST nodes, commits, and record data

use bytes::Bytes;

use crate::cid::{IpldCid, verify};
use crate::data::{Data, decode_all};
use crate::error::Result;

pub mod memory;

pub use memory::MemoryBlockStore;

/// A CID paired with its raw payload
///
/// The payload is kept encoded; decode it with [`Block::decode`] when needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    /// Content identifier
    pub cid: IpldCid,
    /// Encoded payload
    pub data: Bytes,
}

impl Block {
    /// Pair a CID with a payload
    pub fn new(cid: IpldCid, data: impl Into<Bytes>) -> Self {
        Self {
            cid,
            data: data.into(),
        }
    }

    /// Whether the payload hashes to this block's CID
    pub fn verify(&self) -> bool {
        verify(&self.cid, &self.data)
    }

    /// Decode the payload as a single DAG-CBOR item
    pub fn decode(&self) -> Result<Data> {
        decode_all(&self.data).map_err(|e| e.with_context(format!("block {}", self.cid)))
    }
}

/// Read-only, CID-keyed block lookup
///
/// The MST walker only ever reads, so the trait has no write side. Stores are
/// built once and shared by reference for the lifetime of a traversal.
///
/// # Example
///
/// ```rust,ignore
/// use carfeed_repo::storage::{BlockStore, MemoryBlockStore};
/// use carfeed_repo::car::CarReader;
///
/// let reader = CarReader::new(bytes)?;
/// let root = reader.header().root()?;
/// let store = MemoryBlockStore::build(reader)?;
/// let commit = store.get_data(&root)?;
/// ```
pub trait BlockStore {
    /// Get a block payload by CID
    ///
    /// Fails with [`UnknownCid`](crate::RepoErrorKind::UnknownCid) if the block
    /// is not present.
    fn get(&self, cid: &IpldCid) -> Result<Bytes>;

    /// Check if a block exists without retrieving it
    fn has(&self, cid: &IpldCid) -> bool;

    /// Number of blocks held
    fn len(&self) -> usize;

    /// Whether the store holds no blocks
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a block and decode its payload
    fn get_data(&self, cid: &IpldCid) -> Result<Data> {
        let bytes = self.get(cid)?;
        decode_all(&bytes).map_err(|e| e.with_context(format!("block {}", cid)))
    }
}
