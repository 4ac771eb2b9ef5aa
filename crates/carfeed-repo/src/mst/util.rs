//! MST utility functions

use crate::error::{MstError, Result};

/// Split a record key into `(collection, rkey)`
///
/// Keys have the form `<collection>/<rkey>`. The split is at the first `/`;
/// both halves must be non-empty.
pub fn split_key(key: &str) -> Result<(&str, &str)> {
    match key.split_once('/') {
        Some((collection, rkey)) if !collection.is_empty() && !rkey.is_empty() => {
            Ok((collection, rkey))
        }
        _ => Err(MstError::InvalidKey(key.to_string()).into()),
    }
}

/// Count shared prefix length between two byte strings
///
/// MST prefix lengths count bytes, not chars.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Key prefix shared by every record of a collection (`<collection>/`)
pub fn collection_prefix(collection: &str) -> String {
    format!("{}/", collection.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RepoErrorKind;

    #[test]
    fn test_split_key_valid() {
        assert_eq!(
            split_key("app.bsky.graph.follow/3k2a").unwrap(),
            ("app.bsky.graph.follow", "3k2a")
        );
        // only the first separator splits
        assert_eq!(split_key("a.b/c/d").unwrap(), ("a.b", "c/d"));
    }

    #[test]
    fn test_split_key_invalid() {
        for key in ["", "nocollection", "/rkey", "collection/"] {
            let err = split_key(key).unwrap_err();
            assert_eq!(err.kind(), &RepoErrorKind::CorruptTree, "key {:?}", key);
        }
    }

    #[test]
    fn test_common_prefix_len() {
        assert_eq!(common_prefix_len(b"hello", b"help"), 3);
        assert_eq!(common_prefix_len(b"abc", b"abc"), 3);
        assert_eq!(common_prefix_len(b"abc", b"def"), 0);
        assert_eq!(common_prefix_len(b"", b"test"), 0);
        // counts bytes of multi-byte chars
        assert_eq!(common_prefix_len("é1".as_bytes(), "é2".as_bytes()), 2);
    }

    #[test]
    fn test_collection_prefix() {
        assert_eq!(collection_prefix("app.bsky.graph.follow"), "app.bsky.graph.follow/");
        assert_eq!(collection_prefix("app.bsky.graph.follow/"), "app.bsky.graph.follow/");
    }
}
