//! Chunked array archive (`.cha`) support.
//!
//! An archive is a single self-contained file bundling the raw (possibly
//! filtered) chunk payloads of one or more array variables, followed by a CBOR
//! directory describing every variable and where each of its chunks lives.
//!
//! This crate locates chunks without reading them, writes archives, and
//! provides the byte-source and filter plumbing shared with index consumers.

#![warn(missing_docs)]

mod directory;
pub mod error;
pub mod filters;
pub mod format;
pub mod locator;
pub mod schema;
pub mod source;
pub mod writer;

pub use error::{ArchiveError, Result};
pub use filters::{decode_chunk, encode_chunk};
pub use locator::{locate, LocatedChunk, LocatedFile, LocatedVariable};
pub use schema::{AttrValue, Attributes, DataType, Filter};
pub use source::{ByteSource, MmapSource};
pub use writer::{ArchiveWriter, VariableSpec};

/// Number of chunks along each axis for an array of `shape` split into
/// `chunk_shape` blocks. A zero-rank array has an empty grid holding exactly
/// one chunk.
pub fn chunk_grid(shape: &[u64], chunk_shape: &[u64]) -> Vec<u64> {
    shape
        .iter()
        .zip(chunk_shape)
        .map(|(&extent, &chunk)| if chunk == 0 { 0 } else { extent.div_ceil(chunk) })
        .collect()
}
