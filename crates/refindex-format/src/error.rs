use chunk_archive::ArchiveError;
use std::io;
use thiserror::Error;

/// Errors raised while building, merging or (de)serializing indexes.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The source file is malformed or truncated.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Inputs disagree on a dimension or variable that must be identical.
    #[error("schema conflict in {input}: {name:?}: {reason}")]
    SchemaConflict {
        /// Offending input
        input: String,
        /// Offending variable or dimension
        name: String,
        /// What differs
        reason: String,
    },

    /// Nothing to merge.
    #[error("no indexes to merge")]
    EmptyInput,

    /// An input does not declare the concatenation dimension.
    #[error("{input} does not declare dimension {dimension:?}")]
    DimensionMismatch {
        /// Offending input
        input: String,
        /// Missing dimension
        dimension: String,
    },

    /// An input cannot be ordered by the requested key.
    #[error("cannot order {input} by {key}: {reason}")]
    SortKey {
        /// Offending input
        input: String,
        /// Requested key
        key: String,
        /// Why the key is unusable
        reason: String,
    },

    /// A deserialized or hand-built index violates a structural invariant.
    #[error("invalid index: {name:?}: {reason}")]
    Invalid {
        /// Offending variable or dimension
        name: String,
        /// Violated invariant
        reason: String,
    },

    /// Unknown document version.
    #[error("unsupported index document version {0}")]
    UnsupportedVersion(u32),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON document error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Postcard bundle error
    #[error("postcard error: {0}")]
    Postcard(#[from] postcard::Error),
}

/// Result type alias for index operations
pub type Result<T> = std::result::Result<T, IndexError>;

/// Lookup failures of the virtual reader.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No such variable in the index.
    #[error("unknown variable {0:?}")]
    UnknownVariable(String),

    /// Coordinate rank or position outside the chunk grid.
    #[error("variable {variable:?}: coordinate {coord:?} outside chunk grid {grid:?}")]
    CoordinateOutOfRange {
        /// Variable name
        variable: String,
        /// Requested coordinate
        coord: Vec<u64>,
        /// Chunk grid of the variable
        grid: Vec<u64>,
    },

    /// Valid grid position that holds no chunk. Readers substitute the fill value.
    #[error("variable {variable:?}: no chunk stored at {coord:?}")]
    ChunkNotFound {
        /// Variable name
        variable: String,
        /// Requested coordinate
        coord: Vec<u64>,
    },
}

/// Failures while fetching and decoding chunk bytes.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The coordinate did not resolve.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Reading or decoding the chunk failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A decoded chunk of this shape does not fit in memory.
    #[error("chunk shape {chunk_shape:?} is too large to materialize")]
    ChunkTooLarge {
        /// Chunk extent along every axis
        chunk_shape: Vec<u64>,
    },
}
