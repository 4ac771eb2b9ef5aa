//! Content identifier parsing and verification
//!
//! CIDs are represented with [`cid::Cid`] (re-exported as [`IpldCid`]), which
//! already gives structural equality and ordering. This module adds the pieces
//! an archive reader needs on top: reading a CID off the front of a frame while
//! learning how many bytes it occupied, and checking a payload against the
//! digest a CID declares.

use std::io::Cursor;

pub use ::cid::Cid as IpldCid;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{RepoError, Result};

/// DAG-CBOR multicodec (0x71)
pub const DAG_CBOR_CID_CODEC: u64 = 0x71;

/// Raw bytes multicodec (0x55)
pub const RAW_CID_CODEC: u64 = 0x55;

/// Identity multihash (0x00), digest is the payload itself
pub const IDENTITY: u64 = 0x00;

/// SHA2-256 multihash (0x12)
pub const SHA2_256: u64 = 0x12;

/// SHA2-512 multihash (0x13)
pub const SHA2_512: u64 = 0x13;

/// Read a binary CID from the start of `bytes`
///
/// Returns the CID and the number of bytes its encoding occupied, so callers
/// can slice off whatever follows it. Both CIDv0 (bare sha2-256 multihash) and
/// CIDv1 are accepted.
pub fn parse_cid(bytes: &[u8]) -> Result<(IpldCid, usize)> {
    let mut cursor = Cursor::new(bytes);
    let cid = IpldCid::read_bytes(&mut cursor).map_err(|e| {
        RepoError::malformed_cid(e).with_context(format!("{} input bytes", bytes.len()))
    })?;
    Ok((cid, cursor.position() as usize))
}

/// Parse a CID that must span all of `bytes`
pub fn parse_cid_exact(bytes: &[u8]) -> Result<IpldCid> {
    let (cid, used) = parse_cid(bytes)?;
    if used != bytes.len() {
        return Err(RepoError::new(
            crate::error::RepoErrorKind::MalformedCid,
            Some(format!("{} trailing bytes after CID", bytes.len() - used).into()),
        ));
    }
    Ok(cid)
}

/// Check that `payload` hashes to the digest declared by `cid`
///
/// Returns `false` on mismatch, and also when the CID names a hash function
/// this crate cannot compute.
pub fn verify(cid: &IpldCid, payload: &[u8]) -> bool {
    let hash = cid.hash();
    match hash.code() {
        SHA2_256 => Sha256::digest(payload).as_slice() == hash.digest(),
        SHA2_512 => Sha512::digest(payload).as_slice() == hash.digest(),
        IDENTITY => payload == hash.digest(),
        code => {
            tracing::trace!(code, %cid, "cannot verify CID with unsupported hash function");
            false
        }
    }
}

/// Compute the CID atproto uses for a DAG-CBOR block
///
/// CIDv1, dag-cbor codec, sha2-256.
pub fn compute_cid(data: &[u8]) -> IpldCid {
    let hash = Sha256::digest(data);
    // a 32 byte digest always fits the 64 byte multihash
    let mh = multihash::Multihash::<64>::wrap(SHA2_256, hash.as_slice())
        .unwrap_or_default();
    IpldCid::new_v1(DAG_CBOR_CID_CODEC, mh)
}
