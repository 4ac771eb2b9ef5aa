//! CAR file reading
//!
//! The whole archive is expected to be in memory already. The header is parsed
//! eagerly; blocks are sliced off lazily as the reader is iterated, sharing the
//! input buffer rather than copying it.

use std::iter::FusedIterator;

use bytes::Bytes;

use crate::cid::{IpldCid, parse_cid};
use crate::data::decode_all;
use crate::error::{RepoError, RepoErrorKind, Result};
use crate::storage::Block;

/// The only CAR version this reader understands
pub const CAR_VERSION: i64 = 1;

/// Decoded CARv1 header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarHeader {
    /// Format version (always 1 once parsed)
    pub version: u64,
    /// Root CIDs, in header order
    pub roots: Vec<IpldCid>,
}

impl CarHeader {
    /// The first root, which for a repository export is the commit
    pub fn root(&self) -> Result<IpldCid> {
        self.roots
            .first()
            .copied()
            .ok_or_else(|| RepoError::malformed_header("CAR header lists no roots"))
    }
}

/// Single-pass reader over an in-memory CAR archive
///
/// Iterating yields each block in stream order. The payload of each block is a
/// slice of the input; it is not decoded here. After the first error the
/// reader yields nothing further. To read the archive again, build a new
/// reader over the same bytes.
#[derive(Debug, Clone)]
pub struct CarReader {
    header: CarHeader,
    data: Bytes,
    pos: usize,
    failed: bool,
}

/// Fully parsed CAR archive
#[derive(Debug, Clone)]
pub struct ParsedCar {
    /// The archive header
    pub header: CarHeader,
    /// All blocks, in stream order
    pub blocks: Vec<Block>,
}

impl CarReader {
    /// Parse the header and position the reader at the first block
    pub fn new(data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.is_empty() {
            return Err(RepoError::malformed_header("input is empty"));
        }

        let (header_len, prefix_len) = read_varint(&data, 0).map_err(|e| {
            if *e.kind() == RepoErrorKind::TruncatedArchive {
                e
            } else {
                RepoError::malformed_header("invalid header length prefix")
            }
        })?;
        if header_len == 0 {
            return Err(RepoError::malformed_header("zero-length header"));
        }
        let available = data.len() - prefix_len;
        if header_len > available as u64 {
            return Err(RepoError::truncated(
                prefix_len,
                usize::try_from(header_len).unwrap_or(usize::MAX),
                available,
            ));
        }
        let header_end = prefix_len + header_len as usize;
        let header = parse_header(&data[prefix_len..header_end])?;

        tracing::debug!(
            version = header.version,
            roots = header.roots.len(),
            header_len,
            total_len = data.len(),
            "parsed CAR header"
        );

        Ok(Self {
            header,
            data,
            pos: header_end,
            failed: false,
        })
    }

    /// The archive header
    pub fn header(&self) -> &CarHeader {
        &self.header
    }

    /// Root CIDs from the header
    pub fn roots(&self) -> &[IpldCid] {
        &self.header.roots
    }

    /// Byte offset of the next unread frame
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn next_block(&mut self) -> Result<Option<Block>> {
        if self.pos >= self.data.len() {
            return Ok(None);
        }

        let start = self.pos;
        let (frame_len, prefix_len) = read_varint(&self.data, start)?;
        let frame_start = start + prefix_len;
        let available = self.data.len() - frame_start;
        if frame_len > available as u64 {
            return Err(RepoError::truncated(
                start,
                usize::try_from(frame_len).unwrap_or(usize::MAX),
                available,
            ));
        }
        let frame_end = frame_start + frame_len as usize;
        let frame = self.data.slice(frame_start..frame_end);

        let (cid, cid_len) =
            parse_cid(&frame).map_err(|e| e.with_context(format!("block frame at offset {}", start)))?;
        let block = Block::new(cid, frame.slice(cid_len..));
        self.pos = frame_end;

        tracing::trace!(%cid, offset = start, len = block.data.len(), "read block");
        Ok(Some(block))
    }
}

impl Iterator for CarReader {
    type Item = Result<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.next_block() {
            Ok(block) => block.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl FusedIterator for CarReader {}

/// Parse an in-memory CAR archive, collecting every block
///
/// Fails on the first bad frame; no partial block list is returned.
pub fn parse_car(data: impl Into<Bytes>) -> Result<ParsedCar> {
    let reader = CarReader::new(data)?;
    let header = reader.header().clone();
    let blocks = reader.collect::<Result<Vec<_>>>()?;
    Ok(ParsedCar { header, blocks })
}

/// Read an unsigned LEB128 varint at `offset`, returning the value and its length
fn read_varint(data: &[u8], offset: usize) -> Result<(u64, usize)> {
    let input = &data[offset..];
    match unsigned_varint::decode::u64(input) {
        Ok((value, rest)) => Ok((value, input.len() - rest.len())),
        Err(unsigned_varint::decode::Error::Insufficient) => {
            Err(RepoError::truncated(offset, input.len() + 1, input.len())
                .with_context(format!("length prefix at offset {} runs past end of input", offset)))
        }
        Err(e) => Err(RepoError::new(
            RepoErrorKind::MalformedEncoding,
            Some(e.to_string().into()),
        )
        .with_context(format!("length prefix at offset {}", offset))),
    }
}

fn parse_header(bytes: &[u8]) -> Result<CarHeader> {
    let value = decode_all(bytes)
        .map_err(|e| RepoError::new(RepoErrorKind::MalformedHeader, Some(Box::new(e))))?;
    let obj = value
        .as_object()
        .map_err(|e| RepoError::malformed_header(format!("header: {}", e)))?;

    // check the version first: a CARv2 pragma has no roots at all
    let version = obj
        .get_integer("version")
        .map_err(|e| RepoError::malformed_header(e.to_string()))?;
    if version != CAR_VERSION {
        return Err(RepoError::unsupported_version(version));
    }

    let roots = obj
        .get_array("roots")
        .map_err(|e| RepoError::malformed_header(e.to_string()))?
        .iter()
        .map(|root| {
            root.as_cid_link()
                .copied()
                .map_err(|e| RepoError::malformed_header(format!("root: {}", e)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(CarHeader {
        version: version as u64,
        roots,
    })
}
