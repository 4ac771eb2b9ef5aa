//! MST node data structures

use std::fmt;

use bytes::Bytes;
use smol_str::SmolStr;

use super::util::common_prefix_len;
use crate::cid::{IpldCid, compute_cid};
use crate::data::{Data, Object, decode_all};
use crate::error::{MstError, RepoError, Result};
use crate::storage::Block;

/// Entry in an MST node - either a subtree or a leaf
///
/// This is the in-memory representation used for traversal. A node flattens to
/// an interleaved `Vec<NodeEntry>`: `[Tree, Leaf, Tree, Leaf, Leaf, Tree]` etc.
/// Every key in a `Tree` sorts between the leaves on either side of it.
///
/// The wire format (CBOR) is different - see [`MstNode`] and [`MstEntry`].
#[derive(Clone, PartialEq, Eq)]
pub enum NodeEntry {
    /// Subtree reference, loaded from storage when reached
    Tree(IpldCid),

    /// Leaf node with key-value pair
    Leaf {
        /// Full key (not prefix-compressed in memory)
        key: SmolStr,
        /// CID of the record value
        value: IpldCid,
    },
}

impl fmt::Debug for NodeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeEntry::Tree(cid) => write!(f, "Tree({})", cid),
            NodeEntry::Leaf { key, value } => {
                write!(f, "Leaf {{ key: {}, value: {} }}", key, value)
            }
        }
    }
}

impl NodeEntry {
    /// Check if this is a tree entry
    pub fn is_tree(&self) -> bool {
        matches!(self, NodeEntry::Tree(_))
    }

    /// Check if this is a leaf entry
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeEntry::Leaf { .. })
    }

    /// Get the key if this is a leaf
    pub fn leaf_key(&self) -> Option<&str> {
        match self {
            NodeEntry::Leaf { key, .. } => Some(key.as_str()),
            NodeEntry::Tree(_) => None,
        }
    }
}

// Wire format
//
// Serialization derives exist for writing archives and fixtures. Reading goes
// through `MstNode::from_data`, since the decoder preserves the map shape we
// need to report errors precisely.

/// Wire format entry (prefix-compressed leaf with optional subtree pointer)
///
/// Fields are declared in key order (k, p, t, v) to match DAG-CBOR canonical form.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct MstEntry {
    /// Key suffix after prefix (a CBOR byte string on the wire)
    #[serde(rename = "k", serialize_with = "serialize_suffix")]
    pub key_suffix: Bytes,

    /// Number of leading bytes shared with the previous key in the node
    #[serde(rename = "p")]
    pub prefix_len: usize,

    /// Optional subtree pointer, holding keys between this entry and the next
    ///
    /// Serializes as explicit `null` when None.
    #[serde(rename = "t")]
    pub tree: Option<IpldCid>,

    /// CID of the record value
    #[serde(rename = "v")]
    pub value: IpldCid,
}

/// Wire format node data (serialized as DAG-CBOR)
///
/// # Conversion rules
///
/// **wire → flat:**
/// - `left` if present → leading `Tree` entry
/// - Each entry → `Leaf` with reconstructed full key
/// - Each `tree` if present → `Tree` entry after that leaf
///
/// [`MstNode::from_entries`] is the inverse.
#[derive(Debug, Clone, PartialEq, Eq, Default, serde::Serialize)]
pub struct MstNode {
    /// Entries in this node (sorted by full key, prefix-compressed)
    #[serde(rename = "e")]
    pub entries: Vec<MstEntry>,

    /// Left-most subtree pointer
    ///
    /// Serializes as explicit `null` when None.
    #[serde(rename = "l")]
    pub left: Option<IpldCid>,
}

fn serialize_suffix<S: serde::Serializer>(
    suffix: &Bytes,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serde_bytes::serialize(&suffix[..], serializer)
}

impl MstNode {
    /// Narrow a decoded block into a node
    ///
    /// `l` may be absent or null; `e` is required. Each entry needs an
    /// integer `p`, byte string `k`, link `v`, and an optional link `t`.
    pub fn from_data(data: &Data) -> Result<Self> {
        let obj = data
            .as_object()
            .map_err(|e| MstError::InvalidNode(e.to_string()))?;
        let left = obj
            .get_opt_cid_link("l")
            .map_err(|e| MstError::InvalidNode(e.to_string()))?;
        let raw_entries = obj
            .get_array("e")
            .map_err(|e| MstError::InvalidNode(e.to_string()))?;

        let entries = raw_entries
            .iter()
            .enumerate()
            .map(|(i, raw)| {
                entry_from_data(raw).map_err(|e| {
                    RepoError::from(MstError::InvalidNode(format!("entry {}: {}", i, e)))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { entries, left })
    }

    /// Decode a node from its block payload
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Self::from_data(&decode_all(bytes)?)
    }

    /// Expand to the flat interleaved representation
    ///
    /// Reconstructs full keys and checks the node-local invariants: each
    /// prefix fits inside the previous key, each key is UTF-8, and keys are
    /// strictly ascending.
    pub fn entries_flat(&self) -> Result<Vec<NodeEntry>> {
        let mut flat = Vec::with_capacity(self.entries.len() * 2 + 1);

        if let Some(left) = self.left {
            flat.push(NodeEntry::Tree(left));
        }

        let mut last_key: Vec<u8> = Vec::new();
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.prefix_len > last_key.len() {
                return Err(MstError::PrefixTooLong {
                    prefix_len: entry.prefix_len,
                    prev_len: last_key.len(),
                }
                .into());
            }

            let mut full_key = Vec::with_capacity(entry.prefix_len + entry.key_suffix.len());
            full_key.extend_from_slice(&last_key[..entry.prefix_len]);
            full_key.extend_from_slice(&entry.key_suffix);

            if i > 0 && full_key <= last_key {
                return Err(MstError::OutOfOrder {
                    prev: String::from_utf8_lossy(&last_key).into_owned(),
                    key: String::from_utf8_lossy(&full_key).into_owned(),
                }
                .into());
            }

            let key = std::str::from_utf8(&full_key).map_err(|_| {
                MstError::InvalidKey(String::from_utf8_lossy(&full_key).into_owned())
            })?;

            flat.push(NodeEntry::Leaf {
                key: SmolStr::new(key),
                value: entry.value,
            });
            if let Some(tree) = entry.tree {
                flat.push(NodeEntry::Tree(tree));
            }

            last_key = full_key;
        }

        Ok(flat)
    }

    /// Build the wire form from flat entries (with prefix compression)
    ///
    /// - First `Tree` entry → `left` pointer
    /// - Each `Leaf` → entry with prefix compression
    /// - `Tree` after `Leaf` → that leaf's `tree` pointer
    pub fn from_entries(entries: &[NodeEntry]) -> Result<Self> {
        let mut node = MstNode::default();
        let mut rest = entries;

        if let Some((NodeEntry::Tree(cid), tail)) = rest.split_first() {
            node.left = Some(*cid);
            rest = tail;
        }

        let mut last_key = "";
        while let Some((entry, tail)) = rest.split_first() {
            let NodeEntry::Leaf { key, value } = entry else {
                return Err(MstError::InvalidNode("Two Trees adjacent in flat entries".into()).into());
            };
            rest = tail;

            let tree = match rest.split_first() {
                Some((NodeEntry::Tree(cid), tail)) => {
                    rest = tail;
                    Some(*cid)
                }
                _ => None,
            };

            let prefix_len = common_prefix_len(last_key.as_bytes(), key.as_bytes());
            node.entries.push(MstEntry {
                key_suffix: Bytes::copy_from_slice(&key.as_bytes()[prefix_len..]),
                prefix_len,
                tree,
                value: *value,
            });
            last_key = key.as_str();
        }

        Ok(node)
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

fn entry_from_data(raw: &Data) -> std::result::Result<MstEntry, String> {
    let obj: &Object = raw.as_object().map_err(|e| e.to_string())?;
    let prefix_len = obj.get_integer("p").map_err(|e| e.to_string())?;
    let prefix_len =
        usize::try_from(prefix_len).map_err(|_| format!("negative prefix length {}", prefix_len))?;
    let key_suffix = obj.get_bytes("k").map_err(|e| e.to_string())?.clone();
    let value = obj.get_cid_link("v").map_err(|e| e.to_string())?;
    let tree = obj.get_opt_cid_link("t").map_err(|e| e.to_string())?;

    Ok(MstEntry {
        key_suffix,
        prefix_len,
        tree,
        value,
    })
}
