//! Strict DAG-CBOR decoder
//!
//! Decodes into [`Data`] rather than going through serde so that map keys keep
//! the order they were written in and tag 42 links come out as typed CIDs.
//! Anything DAG-CBOR forbids (indefinite lengths, foreign tags, `undefined`,
//! non-text keys) is rejected instead of tolerated.

use std::collections::HashSet;

use bytes::Bytes;
use smol_str::SmolStr;

use super::{Data, Object};
use crate::cid::parse_cid_exact;
use crate::error::{DecodeError, DecodeErrorReason, Result};

/// Maximum nesting of arrays and maps
pub const MAX_DEPTH: usize = 256;

const MAJOR_UNSIGNED: u8 = 0;
const MAJOR_NEGATIVE: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;
const MAJOR_SIMPLE: u8 = 7;

/// CBOR tag for IPLD CID links
const CID_TAG: u64 = 42;

/// Decode one item from the front of `bytes`
///
/// Returns the value and how many bytes it occupied; anything after that is
/// left for the caller.
pub fn decode(bytes: &[u8]) -> Result<(Data, usize)> {
    let mut decoder = Decoder::new(bytes);
    let value = decoder.item(0)?;
    Ok((value, decoder.pos))
}

/// Decode a whole block payload
///
/// The payload must hold exactly one item; trailing bytes are an error.
pub fn decode_all(bytes: &[u8]) -> Result<Data> {
    let mut decoder = Decoder::new(bytes);
    let value = decoder.item(0)?;
    if decoder.pos != bytes.len() {
        return Err(decoder
            .error(DecodeErrorReason::TrailingBytes(bytes.len() - decoder.pos))
            .into());
    }
    Ok(value)
}

struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

/// Initial byte of an item, split up
struct Head {
    major: u8,
    info: u8,
    arg: u64,
    start: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn error(&self, reason: DecodeErrorReason) -> DecodeError {
        DecodeError::new(self.pos, reason)
    }

    fn take(&mut self, len: u64) -> std::result::Result<&'a [u8], DecodeError> {
        let remaining = self.buf.len() - self.pos;
        let len = usize::try_from(len).map_err(|_| self.error(DecodeErrorReason::UnexpectedEnd))?;
        if len > remaining {
            return Err(self.error(DecodeErrorReason::UnexpectedEnd));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn uint(&mut self, width: usize) -> std::result::Result<u64, DecodeError> {
        let bytes = self.take(width as u64)?;
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    fn head(&mut self) -> std::result::Result<Head, DecodeError> {
        let start = self.pos;
        let initial = self.take(1)?[0];
        let major = initial >> 5;
        let info = initial & 0x1f;
        let arg = match info {
            0..=23 => u64::from(info),
            24 => self.uint(1)?,
            25 => self.uint(2)?,
            26 => self.uint(4)?,
            27 => self.uint(8)?,
            28..=30 => {
                return Err(DecodeError::new(start, DecodeErrorReason::ReservedInfo(info)));
            }
            _ => return Err(DecodeError::new(start, DecodeErrorReason::IndefiniteLength)),
        };
        Ok(Head {
            major,
            info,
            arg,
            start,
        })
    }

    fn item(&mut self, depth: usize) -> std::result::Result<Data, DecodeError> {
        let head = self.head()?;
        match head.major {
            MAJOR_UNSIGNED => i64::try_from(head.arg)
                .map(Data::Integer)
                .map_err(|_| DecodeError::new(head.start, DecodeErrorReason::IntegerOverflow)),
            MAJOR_NEGATIVE => i64::try_from(head.arg)
                .map(|n| Data::Integer(-1 - n))
                .map_err(|_| DecodeError::new(head.start, DecodeErrorReason::IntegerOverflow)),
            MAJOR_BYTES => {
                let bytes = self.take(head.arg)?;
                Ok(Data::Bytes(Bytes::copy_from_slice(bytes)))
            }
            MAJOR_TEXT => self.text(head.arg).map(Data::String),
            MAJOR_ARRAY => {
                self.check_depth(depth, head.start)?;
                // never trust the declared length for the allocation
                let cap = (head.arg as usize).min(self.buf.len() - self.pos);
                let mut items = Vec::with_capacity(cap);
                for _ in 0..head.arg {
                    items.push(self.item(depth + 1)?);
                }
                Ok(Data::Array(items))
            }
            MAJOR_MAP => {
                self.check_depth(depth, head.start)?;
                self.map(head.arg, depth).map(Data::Object)
            }
            MAJOR_TAG => {
                if head.arg != CID_TAG {
                    return Err(DecodeError::new(
                        head.start,
                        DecodeErrorReason::UnsupportedTag(head.arg),
                    ));
                }
                self.cid_link()
            }
            MAJOR_SIMPLE => self.simple(&head),
            _ => unreachable!("major type is three bits"),
        }
    }

    fn check_depth(&self, depth: usize, start: usize) -> std::result::Result<(), DecodeError> {
        if depth >= MAX_DEPTH {
            return Err(DecodeError::new(start, DecodeErrorReason::TooDeep(MAX_DEPTH)));
        }
        Ok(())
    }

    fn text(&mut self, len: u64) -> std::result::Result<SmolStr, DecodeError> {
        let start = self.pos;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(SmolStr::new)
            .map_err(|_| DecodeError::new(start, DecodeErrorReason::InvalidUtf8))
    }

    fn map(&mut self, len: u64, depth: usize) -> std::result::Result<Object, DecodeError> {
        let cap = (len as usize).min(self.buf.len() - self.pos);
        let mut obj = Object::with_capacity(cap);
        let mut seen = HashSet::with_capacity(cap);
        for _ in 0..len {
            let key_head = self.head()?;
            if key_head.major != MAJOR_TEXT {
                return Err(DecodeError::new(key_head.start, DecodeErrorReason::NonStringKey));
            }
            let key = self.text(key_head.arg)?;
            if !seen.insert(key.clone()) {
                return Err(DecodeError::new(
                    key_head.start,
                    DecodeErrorReason::DuplicateKey(key.to_string()),
                ));
            }
            let value = self.item(depth + 1)?;
            obj.push_unchecked(key, value);
        }
        Ok(obj)
    }

    fn cid_link(&mut self) -> std::result::Result<Data, DecodeError> {
        let head = self.head()?;
        if head.major != MAJOR_BYTES {
            return Err(DecodeError::new(
                head.start,
                DecodeErrorReason::InvalidCidLink("tag 42 must wrap a byte string".into()),
            ));
        }
        let bytes = self.take(head.arg)?;
        match bytes.split_first() {
            Some((&0x00, cid_bytes)) => parse_cid_exact(cid_bytes).map(Data::CidLink).map_err(|e| {
                DecodeError::new(head.start, DecodeErrorReason::InvalidCidLink(e.to_string()))
            }),
            _ => Err(DecodeError::new(
                head.start,
                DecodeErrorReason::InvalidCidLink("missing identity multibase prefix".into()),
            )),
        }
    }

    fn simple(&self, head: &Head) -> std::result::Result<Data, DecodeError> {
        match head.info {
            20 => Ok(Data::Boolean(false)),
            21 => Ok(Data::Boolean(true)),
            22 => Ok(Data::Null),
            25 => Ok(Data::Float(f16_to_f64(head.arg as u16))),
            26 => Ok(Data::Float(f64::from(f32::from_bits(head.arg as u32)))),
            27 => Ok(Data::Float(f64::from_bits(head.arg))),
            24 => Err(DecodeError::new(
                head.start,
                DecodeErrorReason::UnsupportedSimple(head.arg as u8),
            )),
            other => Err(DecodeError::new(
                head.start,
                DecodeErrorReason::UnsupportedSimple(other),
            )),
        }
    }
}

/// IEEE 754 half precision to double
fn f16_to_f64(bits: u16) -> f64 {
    let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exp = i32::from((bits >> 10) & 0x1f);
    let frac = f64::from(bits & 0x03ff);
    match exp {
        0 => sign * frac * 2f64.powi(-24),
        31 if frac == 0.0 => sign * f64::INFINITY,
        31 => f64::NAN,
        _ => sign * (1.0 + frac / 1024.0) * 2f64.powi(exp - 15),
    }
}
