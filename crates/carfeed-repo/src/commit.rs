//! Commit structures for AT Protocol repositories.
//!
//! The commit is the block named by the archive root. Only the fields needed to
//! locate and describe the record tree are read; the signature is ignored.

use smol_str::SmolStr;

use crate::cid::{IpldCid, compute_cid};
use crate::data::Data;
use crate::error::{MstError, RepoError, Result};
use crate::storage::{Block, BlockStore};

/// Repository commit object
///
/// Stored as a block in CAR files, identified by its CID. `data` points at
/// the MST root; everything else is informational and may be absent in
/// older or hand-built archives.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Commit {
    /// Repository DID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<SmolStr>,

    /// Commit version (2 or 3 in the wild)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,

    /// MST root CID
    pub data: IpldCid,

    /// Revision TID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rev: Option<SmolStr>,

    /// Previous commit CID (None for initial commit)
    pub prev: Option<IpldCid>,
}

impl Commit {
    /// Create a commit that only points at an MST root
    pub fn new(data: IpldCid) -> Self {
        Self {
            did: None,
            version: None,
            data,
            rev: None,
            prev: None,
        }
    }

    /// Narrow a decoded root block into a commit
    ///
    /// `data` must be a CID link. Optional fields that are present with the
    /// wrong type are rejected rather than ignored.
    pub fn from_data(value: &Data) -> Result<Self> {
        let obj = value
            .as_object()
            .map_err(|e| MstError::InvalidCommit(e.to_string()))?;
        let invalid = |e: crate::data::ConversionError| MstError::InvalidCommit(e.to_string());

        let data = obj.get_cid_link("data").map_err(invalid)?;
        let did = match obj.get("did") {
            None | Some(Data::Null) => None,
            Some(_) => Some(SmolStr::new(obj.get_str("did").map_err(invalid)?)),
        };
        let rev = match obj.get("rev") {
            None | Some(Data::Null) => None,
            Some(_) => Some(SmolStr::new(obj.get_str("rev").map_err(invalid)?)),
        };
        let version = match obj.get("version") {
            None | Some(Data::Null) => None,
            Some(_) => Some(obj.get_integer("version").map_err(invalid)?),
        };
        let prev = obj.get_opt_cid_link("prev").map_err(invalid)?;

        Ok(Self {
            did,
            version,
            data,
            rev,
            prev,
        })
    }

    /// Load and decode the commit stored under `root`
    pub fn load<S: BlockStore + ?Sized>(store: &S, root: &IpldCid) -> Result<Self> {
        let value = store.get_data(root)?;
        let commit = Self::from_data(&value)
            .map_err(|e| e.with_context(format!("commit block {}", root)))?;
        tracing::debug!(
            root = %root,
            did = commit.did.as_deref().unwrap_or("-"),
            rev = commit.rev.as_deref().unwrap_or("-"),
            mst_root = %commit.data,
            "loaded commit"
        );
        Ok(commit)
    }

    /// Get the MST root CID
    pub fn data(&self) -> &IpldCid {
        &self.data
    }

    /// Get the repository DID
    pub fn did(&self) -> Option<&str> {
        self.did.as_deref()
    }

    /// Get the revision
    pub fn rev(&self) -> Option<&str> {
        self.rev.as_deref()
    }

    /// Serialize to DAG-CBOR
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        serde_ipld_dagcbor::to_vec(self).map_err(RepoError::malformed_encoding)
    }

    /// Serialize and pair with its CID
    pub fn to_block(&self) -> Result<Block> {
        let bytes = self.to_cbor()?;
        Ok(Block::new(compute_cid(&bytes), bytes))
    }
}

/// Load the commit stored under `root`
pub fn load_commit<S: BlockStore + ?Sized>(store: &S, root: &IpldCid) -> Result<Commit> {
    Commit::load(store, root)
}
