//! AT Protocol repository archive reading
//!
//! This crate provides the building blocks for reading exported AT Protocol
//! repositories:
//!
//! - **CIDs**: parsing and payload verification over the `cid` crate
//! - **Data model**: a strict DAG-CBOR decoder producing [`Data`] values
//! - **CAR I/O**: read (and write) CARv1 archives
//! - **Storage**: an immutable CID-keyed block store
//! - **MST (Merkle Search Tree)**: lazy, ordered, validated record traversal
//!
//! # Design Philosophy
//!
//! - Everything is synchronous over an in-memory buffer; callers own I/O
//! - Block payloads share the archive buffer instead of being copied
//! - Nodes and records are decoded only when traversal reaches them
//! - Any structural problem is a terminal error, never a partial result
//!
//! # Example
//!
//! ```rust,ignore
//! use carfeed_repo::Repository;
//!
//! let bytes = std::fs::read("repo.car")?;
//! let repo = Repository::load(bytes)?;
//!
//! for record in repo.collection("app.bsky.graph.follow") {
//!     let record = record?;
//!     println!("{} -> {:?}", record.rkey, record.get_str("subject"));
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

/// CAR (Content Addressable aRchive) utilities
pub mod car;
/// CID parsing, hashing and verification
pub mod cid;
/// Commit structures
pub mod commit;
/// DAG-CBOR data model
pub mod data;
pub mod error;
/// Merkle Search Tree traversal
pub mod mst;
/// Records yielded by traversal
pub mod record;
/// High-level repository operations
pub mod repo;
/// Block storage abstraction
pub mod storage;

pub use crate::cid::{DAG_CBOR_CID_CODEC, IpldCid, compute_cid};
pub use commit::{Commit, load_commit};
pub use data::{Data, Object};
pub use error::{RepoError, RepoErrorKind, Result};
pub use mst::{MstNode, MstWalker, walk};
pub use record::Record;
pub use repo::Repository;
pub use storage::{Block, BlockStore, MemoryBlockStore};
