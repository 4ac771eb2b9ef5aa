//! Generic data-model values decoded from DAG-CBOR blocks
//!
//! Every block payload in a repository archive decodes to a [`Data`] tree.
//! Callers that expect a particular shape (a commit, an MST node, a record)
//! narrow it with the typed accessors here, which fail with a
//! [`ConversionError`] naming what was expected and what was found.

mod decode;

use bytes::Bytes;
use smol_str::SmolStr;

use crate::cid::IpldCid;

pub use decode::{MAX_DEPTH, decode, decode_all};

/// A decoded data-model value
#[derive(Debug, Clone, PartialEq)]
pub enum Data {
    /// `null`
    Null,
    /// `true` / `false`
    Boolean(bool),
    /// Signed 64-bit integer
    Integer(i64),
    /// Floating point, widened to 64 bits
    Float(f64),
    /// UTF-8 text
    String(SmolStr),
    /// Raw byte string
    Bytes(Bytes),
    /// Ordered sequence
    Array(Vec<Data>),
    /// Text-keyed map, in encounter order
    Object(Object),
    /// Link to another block (CBOR tag 42)
    CidLink(IpldCid),
}

/// Which variant a [`Data`] holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataModelType {
    /// `null`
    Null,
    /// Boolean
    Boolean,
    /// Integer
    Integer,
    /// Float
    Float,
    /// Text string
    String,
    /// Byte string
    Bytes,
    /// Array
    Array,
    /// Map
    Object,
    /// CID link
    CidLink,
}

/// Error narrowing a [`Data`] into a specific shape
#[derive(Clone, Debug, PartialEq, thiserror::Error, miette::Diagnostic)]
#[non_exhaustive]
pub enum ConversionError {
    /// The value was a different variant than expected
    #[error("kind error: expected {expected:?} but found {found:?}")]
    WrongType {
        /// The expected type
        expected: DataModelType,
        /// The actual type
        found: DataModelType,
    },
    /// A required map field was absent
    #[error("missing field {0:?}")]
    MissingField(SmolStr),
    /// A map field held the wrong variant
    #[error("field {field:?}: expected {expected:?} but found {found:?}")]
    WrongFieldType {
        /// Field name
        field: SmolStr,
        /// The expected type
        expected: DataModelType,
        /// The actual type
        found: DataModelType,
    },
}

/// Text-keyed map preserving the order keys were encountered in
///
/// Keys are unique. Lookups are linear, which is fine for the small maps
/// records and tree nodes use.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Object(Vec<(SmolStr, Data)>);

macro_rules! narrow {
    ($name:ident, $variant:ident, $ty:ty) => {
        #[doc = concat!("Borrow the value as `", stringify!($ty), "`, or fail with the actual type")]
        pub fn $name(&self) -> Result<&$ty, ConversionError> {
            match self {
                Data::$variant(v) => Ok(v),
                other => Err(ConversionError::WrongType {
                    expected: DataModelType::$variant,
                    found: other.data_type(),
                }),
            }
        }
    };
}

impl Data {
    /// The variant this value holds
    pub fn data_type(&self) -> DataModelType {
        match self {
            Data::Null => DataModelType::Null,
            Data::Boolean(_) => DataModelType::Boolean,
            Data::Integer(_) => DataModelType::Integer,
            Data::Float(_) => DataModelType::Float,
            Data::String(_) => DataModelType::String,
            Data::Bytes(_) => DataModelType::Bytes,
            Data::Array(_) => DataModelType::Array,
            Data::Object(_) => DataModelType::Object,
            Data::CidLink(_) => DataModelType::CidLink,
        }
    }

    /// Whether this is `null`
    pub fn is_null(&self) -> bool {
        matches!(self, Data::Null)
    }

    narrow!(as_boolean, Boolean, bool);
    narrow!(as_integer, Integer, i64);
    narrow!(as_float, Float, f64);
    narrow!(as_string, String, SmolStr);
    narrow!(as_bytes, Bytes, Bytes);
    narrow!(as_array, Array, Vec<Data>);
    narrow!(as_object, Object, Object);
    narrow!(as_cid_link, CidLink, IpldCid);

    /// Borrow the value as `&str`
    pub fn as_str(&self) -> Result<&str, ConversionError> {
        self.as_string().map(SmolStr::as_str)
    }
}

impl Object {
    /// Create an empty map
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map has no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a field
    pub fn get(&self, key: &str) -> Option<&Data> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Whether a field is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert or replace a field
    ///
    /// A new key goes at the end; an existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<SmolStr>, value: Data) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((key, value)),
        }
    }

    /// Append without checking for an existing key
    pub(crate) fn push_unchecked(&mut self, key: SmolStr, value: Data) {
        self.0.push((key, value));
    }

    /// Keys in encounter order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Entries in encounter order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Data)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Required field
    pub fn require(&self, key: &str) -> Result<&Data, ConversionError> {
        self.get(key)
            .ok_or_else(|| ConversionError::MissingField(key.into()))
    }

    /// Required text field
    pub fn get_str(&self, key: &str) -> Result<&str, ConversionError> {
        let value = self.require(key)?;
        value.as_str().map_err(|_| field_type(key, DataModelType::String, value))
    }

    /// Required integer field
    pub fn get_integer(&self, key: &str) -> Result<i64, ConversionError> {
        let value = self.require(key)?;
        value
            .as_integer()
            .copied()
            .map_err(|_| field_type(key, DataModelType::Integer, value))
    }

    /// Required byte string field
    pub fn get_bytes(&self, key: &str) -> Result<&Bytes, ConversionError> {
        let value = self.require(key)?;
        value.as_bytes().map_err(|_| field_type(key, DataModelType::Bytes, value))
    }

    /// Required array field
    pub fn get_array(&self, key: &str) -> Result<&[Data], ConversionError> {
        let value = self.require(key)?;
        value
            .as_array()
            .map(Vec::as_slice)
            .map_err(|_| field_type(key, DataModelType::Array, value))
    }

    /// Required CID link field
    pub fn get_cid_link(&self, key: &str) -> Result<IpldCid, ConversionError> {
        let value = self.require(key)?;
        value
            .as_cid_link()
            .copied()
            .map_err(|_| field_type(key, DataModelType::CidLink, value))
    }

    /// Optional CID link field: absent and `null` both give `None`
    pub fn get_opt_cid_link(&self, key: &str) -> Result<Option<IpldCid>, ConversionError> {
        match self.get(key) {
            None | Some(Data::Null) => Ok(None),
            Some(Data::CidLink(cid)) => Ok(Some(*cid)),
            Some(other) => Err(field_type(key, DataModelType::CidLink, other)),
        }
    }
}

fn field_type(key: &str, expected: DataModelType, found: &Data) -> ConversionError {
    ConversionError::WrongFieldType {
        field: key.into(),
        expected,
        found: found.data_type(),
    }
}

impl<K: Into<SmolStr>> FromIterator<(K, Data)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, Data)>>(iter: I) -> Self {
        let mut obj = Object::new();
        for (k, v) in iter {
            obj.insert(k, v);
        }
        obj
    }
}

impl From<bool> for Data {
    fn from(value: bool) -> Self {
        Data::Boolean(value)
    }
}

impl From<i64> for Data {
    fn from(value: i64) -> Self {
        Data::Integer(value)
    }
}

impl From<&str> for Data {
    fn from(value: &str) -> Self {
        Data::String(value.into())
    }
}

impl From<String> for Data {
    fn from(value: String) -> Self {
        Data::String(value.into())
    }
}

impl From<&[u8]> for Data {
    fn from(value: &[u8]) -> Self {
        Data::Bytes(Bytes::copy_from_slice(value))
    }
}

impl From<IpldCid> for Data {
    fn from(value: IpldCid) -> Self {
        Data::CidLink(value)
    }
}

impl From<Object> for Data {
    fn from(value: Object) -> Self {
        Data::Object(value)
    }
}

impl From<Vec<Data>> for Data {
    fn from(value: Vec<Data>) -> Self {
        Data::Array(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::compute_cid;

    #[test]
    fn test_narrowing_reports_types() {
        let data = Data::Integer(3);
        assert_eq!(data.as_integer(), Ok(&3));
        assert_eq!(
            data.as_str(),
            Err(ConversionError::WrongType {
                expected: DataModelType::String,
                found: DataModelType::Integer,
            })
        );
    }

    #[test]
    fn test_object_preserves_insertion_order() {
        let mut obj = Object::new();
        obj.insert("zeta", Data::Null);
        obj.insert("alpha", Data::from(1));
        obj.insert("mid", Data::from(true));
        obj.insert("zeta", Data::from("replaced"));

        assert_eq!(obj.keys().collect::<Vec<_>>(), vec!["zeta", "alpha", "mid"]);
        assert_eq!(obj.get_str("zeta"), Ok("replaced"));
        assert_eq!(obj.len(), 3);
    }

    #[test]
    fn test_object_field_accessors() {
        let cid = compute_cid(b"node");
        let obj: Object = [
            ("l", Data::Null),
            ("data", Data::from(cid)),
            ("version", Data::from(3)),
        ]
        .into_iter()
        .collect();

        assert_eq!(obj.get_cid_link("data"), Ok(cid));
        assert_eq!(obj.get_opt_cid_link("l"), Ok(None));
        assert_eq!(obj.get_opt_cid_link("t"), Ok(None));
        assert_eq!(obj.get_integer("version"), Ok(3));
        assert_eq!(
            obj.get_str("missing"),
            Err(ConversionError::MissingField("missing".into()))
        );
        assert!(matches!(
            obj.get_cid_link("version"),
            Err(ConversionError::WrongFieldType { .. })
        ));
    }
}
