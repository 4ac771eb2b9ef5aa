//! High-level repository reading
//!
//! Optional convenience layer tying the CAR reader, block store, commit and
//! MST walker together.

use std::fmt::{self, Display, Formatter};

use bytes::Bytes;

use crate::car::{CarHeader, CarReader, write_car_bytes};
use crate::cid::IpldCid;
use crate::commit::Commit;
use crate::error::Result;
use crate::mst::{MstKeys, MstWalker};
use crate::storage::{BlockStore, MemoryBlockStore};

/// A repository loaded from an archive
///
/// Holds the resolved commit and the store it was read from. Walks borrow the
/// repository, so any number can run over the same loaded archive.
#[derive(Debug, Clone)]
pub struct Repository<S = MemoryBlockStore> {
    store: S,
    root: IpldCid,
    commit: Commit,
    header: Option<CarHeader>,
}

impl Repository<MemoryBlockStore> {
    /// Parse a CAR archive, verifying every block against its CID
    pub fn load(car: impl Into<Bytes>) -> Result<Self> {
        Self::load_with(car, true)
    }

    /// Parse a CAR archive without hashing block payloads
    pub fn load_unverified(car: impl Into<Bytes>) -> Result<Self> {
        Self::load_with(car, false)
    }

    /// Parse a CAR archive, optionally verifying block integrity
    ///
    /// The first header root names the commit block.
    #[tracing::instrument(skip(car), level = "debug")]
    pub fn load_with(car: impl Into<Bytes>, verify: bool) -> Result<Self> {
        let reader = CarReader::new(car)?;
        let header = reader.header().clone();
        let root = header.root()?;

        let store = if verify {
            MemoryBlockStore::build_verified(reader)?
        } else {
            MemoryBlockStore::build(reader)?
        };

        let mut repo = Self::from_store(store, root)?;
        repo.header = Some(header);
        Ok(repo)
    }

    /// Re-export the repository as a CARv1 archive
    ///
    /// Blocks are written in CID order; the root set is the commit CID.
    pub fn export_car(&self) -> Result<Vec<u8>> {
        write_car_bytes(&[self.root], self.store.blocks())
    }
}

impl<S: BlockStore> Repository<S> {
    /// Open a repository from a populated store and its commit CID
    pub fn from_store(store: S, root: IpldCid) -> Result<Self> {
        let commit = Commit::load(&store, &root)?;
        Ok(Self {
            store,
            root,
            commit,
            header: None,
        })
    }

    /// All records, in key order
    pub fn records(&self) -> MstWalker<'_, S> {
        MstWalker::new(&self.store, self.commit.data)
    }

    /// Records of one collection, in key order
    pub fn collection(&self, collection: &str) -> MstWalker<'_, S> {
        self.records().with_collection(collection)
    }

    /// All record keys and value CIDs, without loading record bodies
    pub fn keys(&self) -> MstKeys<'_, S> {
        self.records().keys_only()
    }

    /// CAR header, if the repository was loaded from an archive
    pub fn header(&self) -> Option<&CarHeader> {
        self.header.as_ref()
    }

    /// Commit CID
    pub fn root(&self) -> &IpldCid {
        &self.root
    }

    /// Resolved commit
    pub fn commit(&self) -> &Commit {
        &self.commit
    }

    /// Repository DID, if the commit names one
    pub fn did(&self) -> Option<&str> {
        self.commit.did()
    }

    /// Underlying block store
    pub fn store(&self) -> &S {
        &self.store
    }
}

impl<S: BlockStore> Display for Repository<S> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Repository {{ did: {}, root: {}, data: {}, blocks: {} }}",
            self.commit.did().unwrap_or("-"),
            self.root,
            self.commit.data,
            self.store.len()
        )
    }
}
