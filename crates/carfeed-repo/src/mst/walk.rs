//! Depth-first, ascending-key traversal of an MST

use std::collections::HashSet;
use std::iter::FusedIterator;

use smol_str::SmolStr;

use super::node::{MstNode, NodeEntry};
use super::util::{collection_prefix, split_key};
use crate::cid::IpldCid;
use crate::commit::Commit;
use crate::error::{MstError, Result};
use crate::record::Record;
use crate::storage::BlockStore;

type Frame = std::vec::IntoIter<NodeEntry>;

/// Lazily yields the records of an MST in ascending key order
///
/// Nodes are loaded only when traversal reaches them and dropped once their
/// entries are exhausted. Traversal uses an explicit stack of partially
/// consumed nodes, so tree depth is bounded by memory rather than the call
/// stack.
///
/// Besides the per-node checks in [`MstNode::entries_flat`], the walker
/// requires every key to sort strictly after the one before it across the
/// whole walk, and refuses to visit a node twice. Both fail with
/// [`CorruptTree`](crate::RepoErrorKind::CorruptTree).
///
/// After any error the walker yields nothing further.
///
/// # Example
///
/// ```rust,ignore
/// let walker = walk(&store, &root)?.with_collection("app.bsky.graph.follow");
/// for record in walker {
///     let record = record?;
///     println!("{}", record.key());
/// }
/// ```
pub struct MstWalker<'s, S: ?Sized> {
    store: &'s S,
    /// Node still to be loaded before traversal starts
    root: Option<IpldCid>,
    /// Partially consumed nodes, innermost last
    stack: Vec<Frame>,
    visited: HashSet<IpldCid>,
    last_key: Option<SmolStr>,
    /// `<collection>/` when restricted to one collection
    prefix: Option<String>,
    done: bool,
}

impl<'s, S: BlockStore + ?Sized> MstWalker<'s, S> {
    /// Start a walk at an MST node
    pub fn new(store: &'s S, mst_root: IpldCid) -> Self {
        Self {
            store,
            root: Some(mst_root),
            stack: Vec::new(),
            visited: HashSet::new(),
            last_key: None,
            prefix: None,
            done: false,
        }
    }

    /// Only yield records whose collection equals `collection`
    ///
    /// The whole tree is still walked and every record body resolved, so a
    /// damaged node or missing block anywhere fails the walk exactly as an
    /// unrestricted walk would.
    pub fn with_collection(mut self, collection: impl AsRef<str>) -> Self {
        self.prefix = Some(collection_prefix(collection.as_ref()));
        self
    }

    /// List `(key, value CID)` pairs without loading record bodies
    pub fn keys_only(self) -> MstKeys<'s, S> {
        MstKeys { walker: self }
    }

    /// Number of nodes loaded so far
    pub fn nodes_visited(&self) -> usize {
        self.visited.len()
    }

    fn push_node(&mut self, cid: IpldCid) -> Result<()> {
        if !self.visited.insert(cid) {
            return Err(MstError::Cycle(cid).into());
        }

        let entries = self
            .store
            .get_data(&cid)
            .and_then(|data| MstNode::from_data(&data))
            .and_then(|node| node.entries_flat())
            .map_err(|e| e.with_context(format!("MST node {}", cid)))?;

        tracing::trace!(node = %cid, entries = entries.len(), depth = self.stack.len(), "entered MST node");
        self.stack.push(entries.into_iter());
        Ok(())
    }

    fn in_collection(&self, key: &str) -> bool {
        self.prefix
            .as_deref()
            .is_none_or(|prefix| key.starts_with(prefix))
    }

    /// Advance to the next leaf
    fn next_leaf(&mut self) -> Result<Option<(SmolStr, IpldCid)>> {
        if let Some(root) = self.root.take() {
            self.push_node(root)?;
        }

        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };

            match frame.next() {
                None => {
                    self.stack.pop();
                }
                Some(NodeEntry::Tree(cid)) => {
                    self.push_node(cid)?;
                }
                Some(NodeEntry::Leaf { key, value }) => {
                    split_key(&key)?;
                    if let Some(prev) = &self.last_key {
                        if key <= *prev {
                            return Err(MstError::OutOfOrder {
                                prev: prev.to_string(),
                                key: key.to_string(),
                            }
                            .into());
                        }
                    }
                    self.last_key = Some(key.clone());
                    return Ok(Some((key, value)));
                }
            }
        }
    }

    fn step(&mut self) -> Option<Result<(SmolStr, IpldCid)>> {
        if self.done {
            return None;
        }
        match self.next_leaf() {
            Ok(Some(leaf)) => Some(Ok(leaf)),
            Ok(None) => {
                self.done = true;
                tracing::debug!(nodes = self.visited.len(), "finished MST walk");
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }

    fn load_record(&self, key: &str, cid: IpldCid) -> Result<Record> {
        let value = self
            .store
            .get_data(&cid)
            .map_err(|e| e.with_context(format!("record {} ({})", key, cid)))?;
        Record::from_key(key, cid, value)
    }
}

impl<S: BlockStore + ?Sized> Iterator for MstWalker<'_, S> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let (key, cid) = match self.step()? {
                Ok(leaf) => leaf,
                Err(e) => return Some(Err(e)),
            };
            match self.load_record(&key, cid) {
                Ok(record) if self.in_collection(&key) => return Some(Ok(record)),
                Ok(_) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<S: BlockStore + ?Sized> FusedIterator for MstWalker<'_, S> {}

/// Key listing produced by [`MstWalker::keys_only`]
pub struct MstKeys<'s, S: ?Sized> {
    walker: MstWalker<'s, S>,
}

impl<S: BlockStore + ?Sized> Iterator for MstKeys<'_, S> {
    type Item = Result<(SmolStr, IpldCid)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.walker.step()? {
                Ok((key, _)) if !self.walker.in_collection(&key) => {}
                leaf => return Some(leaf),
            }
        }
    }
}

impl<S: BlockStore + ?Sized> FusedIterator for MstKeys<'_, S> {}

/// Resolve the commit at `root` and start a walk at its MST root
pub fn walk<'s, S: BlockStore + ?Sized>(
    store: &'s S,
    root: &IpldCid,
) -> Result<MstWalker<'s, S>> {
    let commit = Commit::load(store, root)?;
    Ok(MstWalker::new(store, commit.data))
}

/// All `(key, value CID)` pairs under an MST node, in order
pub fn leaves<S: BlockStore + ?Sized>(
    store: &S,
    mst_root: IpldCid,
) -> Result<Vec<(SmolStr, IpldCid)>> {
    MstWalker::new(store, mst_root).keys_only().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::compute_cid;
    use crate::data::{Data, Object};
    use crate::error::RepoErrorKind;
    use crate::storage::{Block, MemoryBlockStore};

    /// Encode a record body and return its block
    fn record_block(subject: &str) -> Block {
        let mut obj = Object::new();
        obj.insert("subject", Data::from(subject));
        let bytes = serde_ipld_dagcbor::to_vec(&RecordBody { subject }).unwrap();
        let block = Block::new(compute_cid(&bytes), bytes);
        assert_eq!(block.decode().unwrap(), Data::Object(obj));
        block
    }

    #[derive(serde::Serialize)]
    struct RecordBody<'a> {
        subject: &'a str,
    }

    struct Fixture {
        blocks: Vec<Block>,
    }

    impl Fixture {
        fn new() -> Self {
            Self { blocks: Vec::new() }
        }

        fn leaf(&mut self, key: &str) -> NodeEntry {
            let block = record_block(key);
            let value = block.cid;
            self.blocks.push(block);
            NodeEntry::Leaf {
                key: key.into(),
                value,
            }
        }

        fn node(&mut self, entries: &[NodeEntry]) -> IpldCid {
            let block = MstNode::from_entries(entries).unwrap().to_block().unwrap();
            let cid = block.cid;
            self.blocks.push(block);
            cid
        }

        fn store(&self) -> MemoryBlockStore {
            MemoryBlockStore::build(self.blocks.iter().cloned().map(Ok)).unwrap()
        }
    }

    /// Two-level tree:
    ///
    /// ```text
    /// root: [left] a.post/1 [mid] b.follow/2 b.follow/3 [right]
    /// left: a.like/1
    /// mid: b.follow/1
    /// right: c.post/1 c.post/2
    /// ```
    fn two_level() -> (Fixture, IpldCid) {
        let mut fx = Fixture::new();
        let left_leaf = fx.leaf("a.like/1");
        let left = fx.node(&[left_leaf]);
        let mid_leaf = fx.leaf("b.follow/1");
        let mid = fx.node(&[mid_leaf]);
        let right_leaves = [fx.leaf("c.post/1"), fx.leaf("c.post/2")];
        let right = fx.node(&right_leaves);

        let root_entries = [
            NodeEntry::Tree(left),
            fx.leaf("a.post/1"),
            NodeEntry::Tree(mid),
            fx.leaf("b.follow/2"),
            fx.leaf("b.follow/3"),
            NodeEntry::Tree(right),
        ];
        let root = fx.node(&root_entries);
        (fx, root)
    }

    #[test]
    fn test_walk_yields_ascending_keys() {
        let (fx, root) = two_level();
        let store = fx.store();

        let keys: Vec<String> = MstWalker::new(&store, root)
            .map(|r| r.unwrap().key())
            .collect();
        assert_eq!(
            keys,
            [
                "a.like/1",
                "a.post/1",
                "b.follow/1",
                "b.follow/2",
                "b.follow/3",
                "c.post/1",
                "c.post/2"
            ]
        );
    }

    #[test]
    fn test_records_carry_values() {
        let (fx, root) = two_level();
        let store = fx.store();

        for record in MstWalker::new(&store, root) {
            let record = record.unwrap();
            assert_eq!(record.get_str("subject"), Some(record.key().as_str()));
        }
    }

    #[test]
    fn test_with_collection() {
        let (fx, root) = two_level();
        let store = fx.store();

        let mut walker = MstWalker::new(&store, root).with_collection("b.follow");
        let keys: Vec<String> = walker.by_ref().map(|r| r.unwrap().key()).collect();
        assert_eq!(keys, ["b.follow/1", "b.follow/2", "b.follow/3"]);
        // every node is still visited
        assert_eq!(walker.nodes_visited(), 4);
    }

    #[test]
    fn test_with_collection_is_exact() {
        let mut fx = Fixture::new();
        // '-' sorts before '/', 'e' after it
        let leaves = [
            fx.leaf("b.follow-ish/1"),
            fx.leaf("b.follow/1"),
            fx.leaf("b.followers/1"),
        ];
        let root = fx.node(&leaves);
        let store = fx.store();

        let keys: Vec<String> = MstWalker::new(&store, root)
            .with_collection("b.follow")
            .map(|r| r.unwrap().key())
            .collect();
        assert_eq!(keys, ["b.follow/1"]);
    }

    #[test]
    fn test_collection_still_needs_every_record_body() {
        let (mut fx, root) = two_level();
        // drop every record body outside b.follow
        fx.blocks.retain(|b| match b.decode().unwrap() {
            Data::Object(obj) => match obj.get("subject") {
                Some(Data::String(s)) => s.starts_with("b.follow/"),
                _ => true,
            },
            _ => true,
        });
        let store = fx.store();

        let err = MstWalker::new(&store, root)
            .with_collection("b.follow")
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert_eq!(err.kind(), &RepoErrorKind::UnknownCid);

        // a key listing does not load bodies at all
        let keys: Vec<_> = MstWalker::new(&store, root)
            .with_collection("b.follow")
            .keys_only()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_collection_walk_checks_nodes_outside_it() {
        let mut fx = Fixture::new();
        // descending keys inside a subtree that sorts before b.follow
        let bad_leaves = [fx.leaf("a.post/2"), fx.leaf("a.post/1")];
        let bad = fx.node(&bad_leaves);
        let entries = [
            NodeEntry::Tree(bad),
            fx.leaf("b.follow/1"),
            fx.leaf("c.post/1"),
            NodeEntry::Tree(compute_cid(b"gone")),
        ];
        let root = fx.node(&entries);
        let store = fx.store();

        let err = MstWalker::new(&store, root)
            .with_collection("b.follow")
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert_eq!(err.kind(), &RepoErrorKind::CorruptTree);
    }

    #[test]
    fn test_collection_walk_reaches_subtrees_after_it() {
        let mut fx = Fixture::new();
        let entries = [fx.leaf("b.follow/1"), NodeEntry::Tree(compute_cid(b"gone"))];
        let root = fx.node(&entries);
        let store = fx.store();

        let results: Vec<Result<Record>> = MstWalker::new(&store, root)
            .with_collection("b.follow")
            .collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1].as_ref().unwrap_err().kind(),
            &RepoErrorKind::UnknownCid
        );
    }

    #[test]
    fn test_keys_only_and_leaves() {
        let (mut fx, root) = two_level();
        // record bodies are not needed for a key listing
        fx.blocks.retain(|b| MstNode::decode(&b.data).is_ok());
        let store = fx.store();

        let keys = leaves(&store, root).unwrap();
        assert_eq!(keys.len(), 7);
        assert_eq!(keys[0].0, "a.like/1");
        assert!(keys.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_empty_tree() {
        let mut fx = Fixture::new();
        let root = fx.node(&[]);
        let store = fx.store();
        assert_eq!(MstWalker::new(&store, root).count(), 0);
    }

    #[test]
    fn test_missing_subtree_is_unknown_cid() {
        let mut fx = Fixture::new();
        let entries = [fx.leaf("a.post/1"), NodeEntry::Tree(compute_cid(b"gone"))];
        let root = fx.node(&entries);
        let store = fx.store();

        let mut walker = MstWalker::new(&store, root);
        assert!(walker.next().unwrap().is_ok());
        let err = walker.next().unwrap().unwrap_err();
        assert_eq!(err.kind(), &RepoErrorKind::UnknownCid);
        assert!(walker.next().is_none());
    }

    #[test]
    fn test_misplaced_subtree_is_corrupt() {
        let mut fx = Fixture::new();
        let stray_leaf = fx.leaf("a.post/0");
        let stray = fx.node(&[stray_leaf]);
        // subtree after b.post/1 holding a key that sorts before it
        let entries = [fx.leaf("b.post/1"), NodeEntry::Tree(stray)];
        let root = fx.node(&entries);
        let store = fx.store();

        let results: Vec<Result<Record>> = MstWalker::new(&store, root).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        let err = results[1].as_ref().unwrap_err();
        assert_eq!(err.kind(), &RepoErrorKind::CorruptTree);
    }

    #[test]
    fn test_key_without_collection_is_corrupt() {
        let mut fx = Fixture::new();
        let entries = [fx.leaf("noslash")];
        let root = fx.node(&entries);
        let store = fx.store();

        let err = MstWalker::new(&store, root).next().unwrap().unwrap_err();
        assert_eq!(err.kind(), &RepoErrorKind::CorruptTree);
    }

    #[test]
    fn test_revisited_node_is_corrupt() {
        let mut fx = Fixture::new();
        let shared_leaf = fx.leaf("b.post/1");
        let shared = fx.node(&[shared_leaf]);
        let entries = [
            NodeEntry::Tree(shared),
            fx.leaf("c.post/1"),
            NodeEntry::Tree(shared),
        ];
        let root = fx.node(&entries);
        let store = fx.store();

        let err = MstWalker::new(&store, root)
            .collect::<Result<Vec<_>>>()
            .unwrap_err();
        assert_eq!(err.kind(), &RepoErrorKind::CorruptTree);
        assert!(err.to_string().contains("visited twice"));
    }

    #[test]
    fn test_node_that_is_not_a_node() {
        let mut fx = Fixture::new();
        let leaf = fx.leaf("a.post/1");
        let NodeEntry::Leaf { value, .. } = leaf else {
            unreachable!()
        };
        let store = fx.store();

        // a record body is a map, but has no `e` array
        let err = MstWalker::new(&store, value).next().unwrap().unwrap_err();
        assert_eq!(err.kind(), &RepoErrorKind::CorruptTree);
    }

    #[test]
    fn test_walk_from_commit() {
        let (mut fx, mst_root) = two_level();
        let commit = Commit::new(mst_root).to_block().unwrap();
        let root = commit.cid;
        fx.blocks.push(commit);
        let store = fx.store();

        assert_eq!(walk(&store, &root).unwrap().count(), 7);
    }
}
