//! Merkle Search Tree reading
//!
//! Nodes are decoded from the block store on demand. [`MstWalker`] yields
//! records in key order; [`MstNode`] is the wire form of a single node.

pub mod node;
pub mod util;
pub mod walk;

pub use node::{MstEntry, MstNode, NodeEntry};
pub use walk::{MstKeys, MstWalker, leaves, walk};
