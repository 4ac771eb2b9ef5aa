//! CAR (Content Addressable aRchive) file I/O
//!
//! Repository exports are CARv1 files: a DAG-CBOR header naming the root CIDs,
//! followed by varint-length-prefixed `CID || payload` frames.
//!
//! # Examples
//!
//! ```ignore
//! use carfeed_repo::car::CarReader;
//!
//! let reader = CarReader::new(bytes)?;
//! let root = reader.header().root()?;
//! for block in reader {
//!     let block = block?;
//!     println!("{} ({} bytes)", block.cid, block.data.len());
//! }
//! ```

pub mod reader;
pub mod writer;

pub use reader::{CAR_VERSION, CarHeader, CarReader, ParsedCar, parse_car};
pub use writer::{write_car, write_car_bytes};
