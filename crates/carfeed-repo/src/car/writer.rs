//! CAR file writing
//!
//! Produces CARv1 archives from a root set and a block sequence. Used to
//! re-export a parsed archive and to build fixtures.

use std::io::Write;

use crate::cid::IpldCid;
use crate::error::{RepoError, Result};
use crate::storage::Block;

/// Wire form of the CARv1 header
///
/// Fields are declared in DAG-CBOR key order (shorter keys first).
#[derive(serde::Serialize)]
struct WireHeader<'a> {
    roots: &'a [IpldCid],
    version: u64,
}

/// Write a CARv1 archive to `out`
///
/// Blocks are written in the order given.
pub fn write_car<W: Write>(
    mut out: W,
    roots: &[IpldCid],
    blocks: impl IntoIterator<Item = Block>,
) -> Result<()> {
    let header = serde_ipld_dagcbor::to_vec(&WireHeader { roots, version: 1 })
        .map_err(RepoError::malformed_encoding)?;
    write_varint(&mut out, header.len() as u64)?;
    out.write_all(&header).map_err(RepoError::io)?;

    let mut count = 0usize;
    for block in blocks {
        let cid_bytes = block.cid.to_bytes();
        write_varint(&mut out, (cid_bytes.len() + block.data.len()) as u64)?;
        out.write_all(&cid_bytes).map_err(RepoError::io)?;
        out.write_all(&block.data).map_err(RepoError::io)?;
        count += 1;
    }
    out.flush().map_err(RepoError::io)?;

    tracing::debug!(roots = roots.len(), blocks = count, "wrote CAR archive");
    Ok(())
}

/// Write a CARv1 archive to memory
pub fn write_car_bytes(
    roots: &[IpldCid],
    blocks: impl IntoIterator<Item = Block>,
) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    write_car(&mut buffer, roots, blocks)?;
    Ok(buffer)
}

fn write_varint<W: Write>(out: &mut W, value: u64) -> Result<()> {
    let mut buf = unsigned_varint::encode::u64_buffer();
    out.write_all(unsigned_varint::encode::u64(value, &mut buf))
        .map_err(RepoError::io)
}
