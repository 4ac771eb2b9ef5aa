//! Error types for archive decoding and repository traversal

use std::error::Error;
use std::fmt;

use ::cid::Cid as IpldCid;

/// Boxed error type for error sources
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Result type alias for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

/// Repository read error with rich diagnostics
///
/// Every variant is terminal for the parse operation that produced it. An
/// archive that fails to decode will fail the same way on every attempt.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub struct RepoError {
    kind: RepoErrorKind,
    #[source]
    source: Option<BoxError>,
    #[help]
    help: Option<String>,
    context: Option<String>,
}

/// Error categories for repository reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoErrorKind {
    /// Bytes did not contain a valid CID
    MalformedCid,
    /// DAG-CBOR payload could not be decoded
    MalformedEncoding,
    /// A length prefix pointed past the end of the archive
    TruncatedArchive,
    /// The CAR header was missing or had the wrong shape
    MalformedHeader,
    /// The CAR header declared a version other than 1
    UnsupportedVersion,
    /// A CID was referenced that is not present in the block store
    UnknownCid,
    /// MST structure does not describe a valid search tree
    CorruptTree,
    /// Block payload does not hash to its CID
    IntegrityMismatch,
    /// I/O error
    Io,
}

impl RepoError {
    /// Create a new error with the given kind and optional source
    pub fn new(kind: RepoErrorKind, source: Option<BoxError>) -> Self {
        Self {
            kind,
            source,
            help: None,
            context: None,
        }
    }

    /// Add a help message to the error
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Add context information to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> &RepoErrorKind {
        &self.kind
    }

    /// Get the context string, if any
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Create a malformed CID error
    pub fn malformed_cid(source: impl Error + Send + Sync + 'static) -> Self {
        Self::new(RepoErrorKind::MalformedCid, Some(Box::new(source)))
    }

    /// Create a malformed encoding error
    pub fn malformed_encoding(source: impl Error + Send + Sync + 'static) -> Self {
        Self::new(RepoErrorKind::MalformedEncoding, Some(Box::new(source)))
    }

    /// Create a truncated archive error
    pub fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Self::new(RepoErrorKind::TruncatedArchive, None)
            .with_context(format!(
                "at offset {}: need {} bytes, {} available",
                offset, needed, available
            ))
            .with_help("the CAR file appears to be cut short; re-export the repository")
    }

    /// Create a malformed header error
    pub fn malformed_header(msg: impl Into<String>) -> Self {
        Self::new(RepoErrorKind::MalformedHeader, Some(msg.into().into()))
            .with_help("CARv1 headers are a DAG-CBOR map with `version` and `roots`")
    }

    /// Create an unsupported version error
    pub fn unsupported_version(version: i64) -> Self {
        Self::new(RepoErrorKind::UnsupportedVersion, None)
            .with_context(format!("CAR version {}", version))
            .with_help("only CARv1 archives are supported")
    }

    /// Create an unknown CID error
    pub fn unknown_cid(cid: &IpldCid) -> Self {
        Self::new(RepoErrorKind::UnknownCid, None)
            .with_context(format!("block not found: {}", cid))
    }

    /// Create a corrupt tree error
    pub fn corrupt_tree(msg: impl Into<String>) -> Self {
        Self::new(RepoErrorKind::CorruptTree, Some(msg.into().into()))
            .with_help("MST nodes must hold strictly ascending, prefix-compressed keys")
    }

    /// Create an integrity mismatch error
    pub fn integrity(cid: &IpldCid) -> Self {
        Self::new(RepoErrorKind::IntegrityMismatch, None)
            .with_context(format!("payload does not hash to {}", cid))
            .with_help("the archive has been altered, or uses an unsupported hash function")
    }

    /// Create an I/O error
    pub fn io(source: impl Error + Send + Sync + 'static) -> Self {
        Self::new(RepoErrorKind::Io, Some(Box::new(source)))
    }
}

impl fmt::Display for RepoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;

        if let Some(ctx) = &self.context {
            write!(f, ": {}", ctx)?;
        }

        if let Some(src) = &self.source {
            write!(f, ": {}", src)?;
        }

        Ok(())
    }
}

// Internal granular errors

/// DAG-CBOR decoding errors
#[derive(Debug, Clone, PartialEq, thiserror::Error, miette::Diagnostic)]
#[error("{reason} at byte {offset}")]
pub struct DecodeError {
    /// Byte offset into the decoded buffer
    pub offset: usize,
    /// What went wrong
    pub reason: DecodeErrorReason,
}

/// Reasons a DAG-CBOR item is rejected
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeErrorReason {
    /// Input ended inside an item
    #[error("unexpected end of input")]
    UnexpectedEnd,
    /// Indefinite-length items are not allowed in DAG-CBOR
    #[error("indefinite-length item")]
    IndefiniteLength,
    /// Additional-info values 28..=30
    #[error("reserved additional info {0}")]
    ReservedInfo(u8),
    /// Only tag 42 (CID link) is allowed
    #[error("unsupported tag {0}")]
    UnsupportedTag(u64),
    /// Simple values other than false/true/null
    #[error("unsupported simple value {0}")]
    UnsupportedSimple(u8),
    /// Integer does not fit in i64
    #[error("integer out of range")]
    IntegerOverflow,
    /// Text string is not UTF-8
    #[error("invalid UTF-8 in text string")]
    InvalidUtf8,
    /// Map key was not a text string
    #[error("map key is not a text string")]
    NonStringKey,
    /// Same key twice in one map
    #[error("duplicate map key {0:?}")]
    DuplicateKey(String),
    /// Tag 42 payload did not hold a valid CID
    #[error("invalid CID link: {0}")]
    InvalidCidLink(String),
    /// Nesting exceeded the decoder limit
    #[error("nesting deeper than {0}")]
    TooDeep(usize),
    /// Bytes left over after the top-level item
    #[error("{0} trailing bytes after item")]
    TrailingBytes(usize),
}

impl DecodeError {
    pub(crate) fn new(offset: usize, reason: DecodeErrorReason) -> Self {
        Self { offset, reason }
    }
}

impl From<DecodeError> for RepoError {
    fn from(e: DecodeError) -> Self {
        RepoError::malformed_encoding(e)
    }
}

/// MST-specific errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum MstError {
    /// Node did not have the expected shape
    #[error("Node structure invalid: {0}")]
    InvalidNode(String),

    /// Prefix length reaches past the previous key
    #[error("Prefix length {prefix_len} exceeds previous key length {prev_len}")]
    PrefixTooLong {
        /// Declared prefix length
        prefix_len: usize,
        /// Length of the previous key in the node
        prev_len: usize,
    },

    /// Keys out of order
    #[error("Key {key:?} does not sort after {prev:?}")]
    OutOfOrder {
        /// Previous key
        prev: String,
        /// Offending key
        key: String,
    },

    /// Key is not `<collection>/<rkey>`
    #[error("Invalid record key: {0:?}")]
    InvalidKey(String),

    /// A node was reached twice during one walk
    #[error("Node {0} visited twice")]
    Cycle(IpldCid),

    /// Commit block had the wrong shape
    #[error("Invalid commit: {0}")]
    InvalidCommit(String),
}

impl From<MstError> for RepoError {
    fn from(e: MstError) -> Self {
        RepoError::new(RepoErrorKind::CorruptTree, Some(Box::new(e)))
            .with_help("MST nodes must hold strictly ascending, prefix-compressed keys")
    }
}
