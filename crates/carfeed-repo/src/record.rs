//! Repository records as yielded by the MST walker

use std::fmt;

use smol_str::SmolStr;

use crate::cid::IpldCid;
use crate::data::Data;
use crate::error::Result;
use crate::mst::util::split_key;

/// A record stored in a repository
///
/// Addressed by its key `<collection>/<rkey>`; `value` is the decoded record
/// body, and `cid` the block it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Collection NSID (e.g. `app.bsky.graph.follow`)
    pub collection: SmolStr,
    /// Record key within the collection
    pub rkey: SmolStr,
    /// CID of the record block
    pub cid: IpldCid,
    /// Decoded record body
    pub value: Data,
}

impl Record {
    /// Build a record from its full MST key
    pub fn from_key(key: &str, cid: IpldCid, value: Data) -> Result<Self> {
        let (collection, rkey) = split_key(key)?;
        Ok(Self {
            collection: collection.into(),
            rkey: rkey.into(),
            cid,
            value,
        })
    }

    /// Full MST key
    pub fn key(&self) -> String {
        format!("{}/{}", self.collection, self.rkey)
    }

    /// Read a top-level text field of the record body
    ///
    /// Returns `None` if the body is not a map, or the field is absent or
    /// not a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.value.as_object().ok()?.get(field)?.as_str().ok()
    }

    /// The `$type` field of the record body
    pub fn record_type(&self) -> Option<&str> {
        self.get_str("$type")
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.collection, self.rkey, self.cid)
    }
}
