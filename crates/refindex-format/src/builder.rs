//! Single-file index construction.

use chunk_archive::{locate, ByteSource, LocatedFile, MmapSource};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::chunk_ref::{ChunkKey, ChunkRef};
use crate::error::Result;
use crate::model::{ArrayMeta, Dataset, FileIndex, VariableIndex};

/// Chunks at most this long are inlined unless configured otherwise.
pub const DEFAULT_INLINE_THRESHOLD: u64 = 500;

/// Knobs of the single-file builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Chunks whose stored length is `<=` this are embedded in the index.
    ///
    /// Inlining saves one range request per small chunk (coordinates, scalars)
    /// at the cost of a larger index.
    pub inline_threshold: u64,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
        }
    }
}

/// Locates the chunks of `source` and builds its index.
///
/// `source_id` is recorded as the path of every byte-range reference.
pub fn build_file_index<S: ByteSource + ?Sized>(
    source_id: &str,
    source: &S,
    options: &BuildOptions,
) -> Result<FileIndex> {
    let located = locate(source)?;
    index_located(source_id, source, located, options)
}

/// Builds an index from an already located directory, reading only the
/// chunks that get inlined.
pub fn index_located<S: ByteSource + ?Sized>(
    source_id: &str,
    source: &S,
    located: LocatedFile,
    options: &BuildOptions,
) -> Result<FileIndex> {
    let mut variables = BTreeMap::new();
    let mut inlined = 0usize;
    let mut ranged = 0usize;

    for var in located.variables {
        let mut chunks = BTreeMap::new();
        for chunk in var.chunks {
            let reference = if chunk.length <= options.inline_threshold {
                inlined += 1;
                ChunkRef::Inline(source.read_range(chunk.offset, chunk.length)?)
            } else {
                ranged += 1;
                ChunkRef::range(source_id, chunk.offset, chunk.length)
            };
            chunks.insert(ChunkKey::new(chunk.coord), reference);
        }

        let meta = ArrayMeta {
            dimensions: var.dimensions,
            shape: var.shape,
            chunk_shape: var.chunk_shape,
            dtype: var.dtype,
            fill_value: var.fill_value,
            filters: var.filters,
            attributes: var.attributes,
        };
        variables.insert(var.name, VariableIndex { meta, chunks });
    }

    debug!(
        "Indexed {}: {} variable(s), {} inline chunk(s), {} range chunk(s)",
        source_id,
        variables.len(),
        inlined,
        ranged
    );

    FileIndex::new(
        source_id,
        Dataset {
            variables,
            attributes: located.attributes,
            dimensions: located.dimensions,
        },
    )
}

/// Memory-maps a local archive and indexes it under its path.
pub fn translate_path(path: &Path, options: &BuildOptions) -> Result<FileIndex> {
    let source = MmapSource::open(path)?;
    build_file_index(&path.to_string_lossy(), &source, options)
}
