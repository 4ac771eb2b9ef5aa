//! Record filtering and feed URL construction

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use carfeed_repo::{BlockStore, Record, Repository, Result as RepoResult};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use smol_str::SmolStr;

use crate::error::{FeedError, Result};

/// Collection holding follow records
pub const FOLLOW_COLLECTION: &str = "app.bsky.graph.follow";

/// Default feed URL: the Bluesky profile RSS endpoint
pub const DEFAULT_URL_TEMPLATE: &str = "https://bsky.app/profile/{subject}/rss";

const SUBJECT_PLACEHOLDER: &str = "{subject}";

/// Characters escaped when a subject is placed in a URL path segment
///
/// DIDs and handles pass through unchanged.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/');

/// Feed URL template with a `{subject}` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate(SmolStr);

impl UrlTemplate {
    /// Parse a template, which must contain `{subject}` at least once
    pub fn new(template: impl AsRef<str>) -> Result<Self> {
        let template = template.as_ref();
        if !template.contains(SUBJECT_PLACEHOLDER) {
            return Err(FeedError::InvalidTemplate {
                template: template.to_string(),
            });
        }
        Ok(Self(template.into()))
    }

    /// Substitute a subject into every placeholder
    pub fn render(&self, subject: &str) -> String {
        let encoded = utf8_percent_encode(subject, PATH_SEGMENT).to_string();
        self.0.replace(SUBJECT_PLACEHOLDER, &encoded)
    }

    /// The raw template
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UrlTemplate {
    fn default() -> Self {
        Self(SmolStr::new_static(DEFAULT_URL_TEMPLATE))
    }
}

impl FromStr for UrlTemplate {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Extraction settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    /// Collection whose records become feeds
    pub collection: SmolStr,
    /// How a record subject becomes a URL
    pub url_template: UrlTemplate,
    /// Check every block against its CID before walking
    pub verify_blocks: bool,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            collection: SmolStr::new_static(FOLLOW_COLLECTION),
            url_template: UrlTemplate::default(),
            verify_blocks: true,
        }
    }
}

/// One feed derived from one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    /// Collection of the source record
    pub collection: SmolStr,
    /// Record key of the source record
    pub rkey: SmolStr,
    /// The record's `subject`
    pub subject: SmolStr,
    /// Rendered feed URL
    pub url: String,
}

/// Feeds extracted from one archive, in repository key order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedList {
    /// Extracted feeds
    pub entries: Vec<FeedEntry>,
    /// Matching records skipped for lacking a string `subject`
    pub skipped: usize,
}

impl FeedList {
    /// Whether no feeds were found
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of feeds
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Feed URLs, in order
    pub fn urls(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.url.as_str()).collect()
    }

    /// Iterate over entries
    pub fn iter(&self) -> std::slice::Iter<'_, FeedEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a FeedList {
    type Item = &'a FeedEntry;
    type IntoIter = std::slice::Iter<'a, FeedEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Keep only records of `collection`; errors pass through
pub fn filter_collection<I>(
    records: I,
    collection: impl Into<SmolStr>,
) -> impl Iterator<Item = RepoResult<Record>>
where
    I: IntoIterator<Item = RepoResult<Record>>,
{
    let collection = collection.into();
    records.into_iter().filter(move |r| match r {
        Ok(record) => record.collection == collection,
        Err(_) => true,
    })
}

/// Turn records into feed entries
///
/// Only records of the configured collection are considered. A matching
/// record whose `subject` is absent or not a string is skipped and counted.
pub fn feed_entries<I>(records: I, config: &FeedConfig) -> FeedEntries<'_, I::IntoIter>
where
    I: IntoIterator<Item = RepoResult<Record>>,
{
    FeedEntries {
        records: records.into_iter(),
        config,
        skipped: 0,
    }
}

/// Iterator returned by [`feed_entries`]
pub struct FeedEntries<'c, I> {
    records: I,
    config: &'c FeedConfig,
    skipped: usize,
}

impl<I> FeedEntries<'_, I> {
    /// Matching records skipped so far
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl<I> Iterator for FeedEntries<'_, I>
where
    I: Iterator<Item = RepoResult<Record>>,
{
    type Item = RepoResult<FeedEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(e)),
            };
            if record.collection != self.config.collection {
                continue;
            }

            let Some(subject) = record.get_str("subject") else {
                self.skipped += 1;
                tracing::debug!(
                    collection = %record.collection,
                    rkey = %record.rkey,
                    "skipping record without a string subject"
                );
                continue;
            };

            let url = self.config.url_template.render(subject);
            tracing::trace!(rkey = %record.rkey, %url, "built feed URL");
            return Some(Ok(FeedEntry {
                subject: subject.into(),
                url,
                collection: record.collection,
                rkey: record.rkey,
            }));
        }
    }
}

/// Extract feeds from a CAR archive held in memory
///
/// The whole pipeline: parse, optionally verify, resolve the commit, walk the
/// tree keeping the configured collection, and build URLs. Every node and
/// record body is checked, so any archive or tree error fails the whole
/// extraction, even outside the collection.
#[tracing::instrument(skip_all, fields(collection = %config.collection, verify = config.verify_blocks))]
pub fn extract_feeds(car: impl Into<Bytes>, config: &FeedConfig) -> Result<FeedList> {
    let repo = Repository::load_with(car, config.verify_blocks)?;
    tracing::debug!(
        did = repo.did().unwrap_or("-"),
        blocks = repo.store().len(),
        "loaded repository"
    );

    let records = filter_collection(repo.collection(&config.collection), config.collection.clone());
    let mut feeds = feed_entries(records, config);
    let entries = feeds.by_ref().collect::<RepoResult<Vec<_>>>()?;
    let list = FeedList {
        entries,
        skipped: feeds.skipped(),
    };

    tracing::info!(feeds = list.len(), skipped = list.skipped, "extracted feeds");
    Ok(list)
}
