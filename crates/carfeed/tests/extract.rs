//! Archive bytes in, feed list and OPML documents out

use carfeed::{FeedConfig, FeedError, OutputOptions, UrlTemplate, extract_feeds, opml, write_documents};
use carfeed_repo::car::write_car_bytes;
use carfeed_repo::mst::{MstNode, NodeEntry};
use carfeed_repo::{Block, Commit, IpldCid, RepoErrorKind, compute_cid};

#[derive(serde::Serialize)]
struct Follow<'a> {
    #[serde(rename = "$type")]
    kind: &'a str,
    subject: &'a str,
    #[serde(rename = "createdAt")]
    created_at: &'a str,
}

#[derive(serde::Serialize)]
struct Post<'a> {
    #[serde(rename = "$type")]
    kind: &'a str,
    text: &'a str,
}

fn follow_bytes(subject: &str) -> Vec<u8> {
    serde_ipld_dagcbor::to_vec(&Follow {
        kind: "app.bsky.graph.follow",
        subject,
        created_at: "2024-01-01T00:00:00.000Z",
    })
    .unwrap()
}

fn post_bytes(text: &str) -> Vec<u8> {
    serde_ipld_dagcbor::to_vec(&Post {
        kind: "app.bsky.feed.post",
        text,
    })
    .unwrap()
}

fn leaf(key: &str, block: &Block) -> NodeEntry {
    NodeEntry::Leaf {
        key: key.into(),
        value: block.cid,
    }
}

fn node(entries: &[NodeEntry]) -> Block {
    MstNode::from_entries(entries).unwrap().to_block().unwrap()
}

/// Commit pointing at `mst_root`, then every block, as one archive
fn car_from(mst_root: IpldCid, blocks: Vec<Block>) -> Vec<u8> {
    let commit = Commit {
        did: Some("did:plc:owner".into()),
        version: Some(3),
        data: mst_root,
        rev: None,
        prev: None,
    }
    .to_block()
    .unwrap();
    let root: IpldCid = commit.cid;

    let mut all = vec![commit];
    all.extend(blocks);
    write_car_bytes(&[root], all).unwrap()
}

#[derive(Default)]
struct Archive {
    records: Vec<(String, Block)>,
    omit: Option<String>,
}

impl Archive {
    fn add(&mut self, key: String, bytes: Vec<u8>) {
        self.records.push((key, Block::new(compute_cid(&bytes), bytes)));
    }

    fn follow(mut self, rkey: &str, subject: &str) -> Self {
        self.add(format!("app.bsky.graph.follow/{}", rkey), follow_bytes(subject));
        self
    }

    fn post(mut self, rkey: &str) -> Self {
        self.add(format!("app.bsky.feed.post/{}", rkey), post_bytes(rkey));
        self
    }

    /// Leave record blocks of `collection` out, keeping their tree entries
    fn without_records(mut self, collection: &str) -> Self {
        self.omit = Some(format!("{}/", collection));
        self
    }

    /// Single-node MST holding every leaf, sorted by key
    fn build(mut self) -> Vec<u8> {
        self.records.sort_by(|a, b| a.0.cmp(&b.0));
        let leaves: Vec<NodeEntry> = self.records.iter().map(|(k, b)| leaf(k, b)).collect();
        let node = node(&leaves);
        let mst_root = node.cid;

        let omit = self.omit;
        let mut blocks = vec![node];
        blocks.extend(
            self.records
                .into_iter()
                .filter(|(k, _)| omit.as_deref().is_none_or(|p| !k.starts_with(p)))
                .map(|(_, b)| b),
        );
        car_from(mst_root, blocks)
    }
}

fn repo_error_kind(result: carfeed::Result<carfeed::FeedList>) -> RepoErrorKind {
    match result {
        Err(FeedError::Repo(e)) => *e.kind(),
        other => panic!("expected an archive error, got {:?}", other),
    }
}

#[test]
fn follow_and_post_yield_one_feed() {
    let car = Archive::default()
        .follow("3k2b", "did:plc:abc")
        .post("3k2a")
        .build();

    let feeds = extract_feeds(car, &FeedConfig::default()).unwrap();
    assert_eq!(feeds.urls(), ["https://bsky.app/profile/did:plc:abc/rss"]);
    assert_eq!(feeds.entries[0].rkey, "3k2b");
    assert_eq!(feeds.skipped, 0);
}

#[test]
fn no_follows_gives_empty_document() {
    let car = Archive::default().post("1").post("2").build();

    let feeds = extract_feeds(car, &FeedConfig::default()).unwrap();
    assert!(feeds.is_empty());

    let doc = opml::serialize(&feeds.urls());
    assert!(doc.contains("<outline text=\"RSS Feeds\">"));
    assert_eq!(doc.matches("type=\"rss\"").count(), 0);
    assert!(!opml::needs_batches(feeds.len(), opml::DEFAULT_BATCH_SIZE));
    assert!(opml::batch_ranges(feeds.len(), opml::DEFAULT_BATCH_SIZE).is_empty());
}

#[test]
fn feeds_follow_key_order() {
    let car = Archive::default()
        .follow("c", "did:plc:third")
        .follow("a", "did:plc:first")
        .follow("b", "did:plc:second")
        .build();

    let feeds = extract_feeds(car, &FeedConfig::default()).unwrap();
    let subjects: Vec<&str> = feeds.iter().map(|e| e.subject.as_str()).collect();
    assert_eq!(subjects, ["did:plc:first", "did:plc:second", "did:plc:third"]);
}

#[test]
fn custom_collection_and_template() {
    let car = Archive::default()
        .follow("1", "did:plc:abc")
        .build();
    let config = FeedConfig {
        url_template: UrlTemplate::new("https://rss.example/{subject}.xml").unwrap(),
        ..FeedConfig::default()
    };
    let feeds = extract_feeds(car.clone(), &config).unwrap();
    assert_eq!(feeds.urls(), ["https://rss.example/did:plc:abc.xml"]);

    let posts = FeedConfig {
        collection: "app.bsky.feed.post".into(),
        ..FeedConfig::default()
    };
    let feeds = extract_feeds(car, &posts).unwrap();
    assert!(feeds.is_empty());
}

#[test]
fn truncated_archive_is_an_error() {
    let car = Archive::default().follow("1", "did:plc:abc").build();
    let cut = car[..car.len() - 3].to_vec();

    assert_eq!(
        repo_error_kind(extract_feeds(cut, &FeedConfig::default())),
        RepoErrorKind::TruncatedArchive
    );
}

#[test]
fn corrupt_subtree_outside_follows_fails_extraction() {
    let post_1 = Block::new(compute_cid(&post_bytes("1")), post_bytes("1"));
    let post_2 = Block::new(compute_cid(&post_bytes("2")), post_bytes("2"));
    let post_9 = Block::new(compute_cid(&post_bytes("9")), post_bytes("9"));
    let follow = Block::new(
        compute_cid(&follow_bytes("did:plc:abc")),
        follow_bytes("did:plc:abc"),
    );

    // descending keys in a subtree that sorts before every follow
    let left = node(&[
        leaf("app.bsky.feed.post/2", &post_2),
        leaf("app.bsky.feed.post/1", &post_1),
    ]);
    let root = node(&[
        NodeEntry::Tree(left.cid),
        leaf("app.bsky.feed.post/9", &post_9),
        leaf("app.bsky.graph.follow/1", &follow),
    ]);
    let car = car_from(root.cid, vec![root, left, post_1, post_2, post_9, follow]);

    assert_eq!(
        repo_error_kind(extract_feeds(car, &FeedConfig::default())),
        RepoErrorKind::CorruptTree
    );
}

#[test]
fn missing_record_outside_follows_fails_extraction() {
    let car = Archive::default()
        .post("1")
        .follow("1", "did:plc:abc")
        .post("2")
        .without_records("app.bsky.feed.post")
        .build();

    assert_eq!(
        repo_error_kind(extract_feeds(car, &FeedConfig::default())),
        RepoErrorKind::UnknownCid
    );
}

#[test]
fn missing_subtree_after_follows_fails_extraction() {
    let follow = Block::new(
        compute_cid(&follow_bytes("did:plc:abc")),
        follow_bytes("did:plc:abc"),
    );
    let root = node(&[
        leaf("app.bsky.graph.follow/1", &follow),
        NodeEntry::Tree(compute_cid(b"not in the archive")),
    ]);
    let car = car_from(root.cid, vec![root, follow]);

    assert_eq!(
        repo_error_kind(extract_feeds(car, &FeedConfig::default())),
        RepoErrorKind::UnknownCid
    );
}

#[test]
fn verification_can_be_disabled() {
    let mut car = Archive::default().follow("1", "did:plc:abc").build();
    // last block is the follow; its payload ends with the createdAt text
    let last = car.len() - 2;
    car[last] = b'1';

    assert_eq!(
        repo_error_kind(extract_feeds(car.clone(), &FeedConfig::default())),
        RepoErrorKind::IntegrityMismatch
    );

    let config = FeedConfig {
        verify_blocks: false,
        ..FeedConfig::default()
    };
    let feeds = extract_feeds(car, &config).unwrap();
    assert_eq!(feeds.len(), 1);
}

#[tokio::test]
async fn many_follows_are_batched_on_disk() {
    let mut archive = Archive::default();
    for i in 0..205 {
        archive = archive.follow(&format!("{:05}", i), &format!("did:plc:{:05}", i));
    }
    let feeds = extract_feeds(archive.build(), &FeedConfig::default()).unwrap();
    assert_eq!(feeds.len(), 205);

    let tmp = tempfile::tempdir().unwrap();
    let options = OutputOptions {
        dir: tmp.path().to_path_buf(),
        ..OutputOptions::default()
    };
    let written = write_documents(&feeds, &options).await.unwrap();
    assert_eq!(written.len(), 4);

    // the batches together list every feed of the full document, in order
    let full = tokio::fs::read_to_string(&written[0]).await.unwrap();
    let mut batched = Vec::new();
    for path in &written[1..] {
        let text = tokio::fs::read_to_string(path).await.unwrap();
        batched.extend(
            text.lines()
                .filter(|l| l.contains("type=\"rss\""))
                .map(str::to_string),
        );
    }
    let all: Vec<String> = full
        .lines()
        .filter(|l| l.contains("type=\"rss\""))
        .map(str::to_string)
        .collect();
    assert_eq!(all.len(), 205);
    assert_eq!(batched, all);
    assert!(written[3].ends_with("feeds_201_to_205.opml"));
}
