//! Turn an exported AT Protocol repository into feed subscriptions
//!
//! Given the bytes of a repository CAR export, [`extract_feeds`] walks the
//! follow records and builds one RSS URL per followed account. The [`opml`]
//! module renders those URLs as OPML documents, optionally in batches.
//!
//! # Example
//!
//! ```rust,ignore
//! use carfeed::{FeedConfig, extract_feeds, opml};
//!
//! let bytes = std::fs::read("repo.car")?;
//! let feeds = extract_feeds(bytes, &FeedConfig::default())?;
//! let doc = opml::serialize(&feeds.urls());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod error;
pub mod feed;
pub mod opml;
pub mod output;

pub use error::{FeedError, Result};
pub use feed::{
    DEFAULT_URL_TEMPLATE, FOLLOW_COLLECTION, FeedConfig, FeedEntry, FeedList, UrlTemplate,
    extract_feeds, feed_entries, filter_collection,
};
pub use opml::OpmlDocument;
pub use output::{OutputOptions, read_archive, write_documents};
