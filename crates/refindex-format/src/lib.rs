//! Reference indexes over chunked array archives.
//!
//! A reference index maps every chunk of every variable in one or more
//! archives to the byte range holding it (or to the bytes themselves, for
//! small chunks), so that array readers can fetch chunks directly without
//! parsing the archives again.
//!
//! The pipeline is: [`build_file_index`] per archive, [`merge`] many indexes
//! along a concatenation dimension, then [`VirtualReader::resolve`] chunk
//! coordinates. Building is a pure function per file and may be fanned out
//! with any parallel mechanism; merged indexes are immutable and shareable.

#![warn(missing_docs)]

pub mod builder;
pub mod chunk_ref;
pub mod document;
pub mod error;
pub mod fetch;
pub mod framed;
pub mod merge;
pub mod model;
pub mod reader;

pub use builder::{build_file_index, index_located, translate_path, BuildOptions};
pub use chunk_ref::{ChunkKey, ChunkRef};
pub use error::{FetchError, IndexError, ResolveError, Result};
pub use fetch::{fill_chunk, read_chunk, ChunkFetcher, LocalFetcher};
pub use framed::{read_bundle, write_bundle, IndexBundleReader, IndexBundleWriter};
pub use merge::{merge, MergeInput, MergeOptions, SortKey};
pub use model::{ArrayMeta, CombinedIndex, Dataset, FileIndex, Provenance, VariableIndex};
pub use reader::{ByteRange, Resolved, VirtualReader};
