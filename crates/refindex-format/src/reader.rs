//! Resolves logical chunk coordinates against an index.

use crate::chunk_ref::ChunkRef;
use crate::error::ResolveError;
use crate::model::{Dataset, VariableIndex};

/// Byte range to hand to a range-capable fetcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange<'a> {
    /// Source locator
    pub locator: &'a str,
    /// Absolute offset
    pub offset: u64,
    /// Stored length
    pub length: u64,
}

/// Outcome of a successful lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved<'a> {
    /// Stored bytes embedded in the index
    Inline(&'a [u8]),
    /// Bytes to fetch from a source
    Range(ByteRange<'a>),
}

impl<'a> From<&'a ChunkRef> for Resolved<'a> {
    fn from(reference: &'a ChunkRef) -> Self {
        match reference {
            ChunkRef::Inline(bytes) => Resolved::Inline(bytes),
            ChunkRef::Range {
                path,
                offset,
                length,
            } => Resolved::Range(ByteRange {
                locator: path,
                offset: *offset,
                length: *length,
            }),
        }
    }
}

/// Read-only view that resolves `(variable, chunk coordinate)` pairs.
///
/// Holds no state besides the borrowed index, so any number of readers may
/// share one index across threads.
#[derive(Debug, Clone, Copy)]
pub struct VirtualReader<'a> {
    dataset: &'a Dataset,
}

impl<'a> VirtualReader<'a> {
    /// Reader over a file index, a combined index or a bare dataset.
    pub fn new<T: AsRef<Dataset> + ?Sized>(index: &'a T) -> Self {
        Self {
            dataset: index.as_ref(),
        }
    }

    /// Variable by name.
    pub fn variable(&self, name: &str) -> Result<&'a VariableIndex, ResolveError> {
        self.dataset
            .variable(name)
            .ok_or_else(|| ResolveError::UnknownVariable(name.to_string()))
    }

    /// Resolves one chunk coordinate.
    ///
    /// A coordinate outside the chunk grid is [`ResolveError::CoordinateOutOfRange`];
    /// a grid position that was never written is [`ResolveError::ChunkNotFound`].
    pub fn resolve(&self, variable: &str, coord: &[u64]) -> Result<Resolved<'a>, ResolveError> {
        let var = self.variable(variable)?;
        if !var.meta.contains(coord) {
            return Err(ResolveError::CoordinateOutOfRange {
                variable: variable.to_string(),
                coord: coord.to_vec(),
                grid: var.meta.chunk_grid(),
            });
        }
        var.chunk(coord)
            .map(Resolved::from)
            .ok_or_else(|| ResolveError::ChunkNotFound {
                variable: variable.to_string(),
                coord: coord.to_vec(),
            })
    }

    /// Like [`resolve`](Self::resolve), with missing chunks reported as `None`.
    pub fn resolve_or_missing(
        &self,
        variable: &str,
        coord: &[u64],
    ) -> Result<Option<Resolved<'a>>, ResolveError> {
        match self.resolve(variable, coord) {
            Ok(resolved) => Ok(Some(resolved)),
            Err(ResolveError::ChunkNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Resolves many coordinates, one result per coordinate in input order.
    /// A failing coordinate never affects the others.
    pub fn resolve_batch<'c, I>(
        &self,
        variable: &str,
        coords: I,
    ) -> Vec<Result<Resolved<'a>, ResolveError>>
    where
        I: IntoIterator<Item = &'c [u64]>,
    {
        coords
            .into_iter()
            .map(|coord| self.resolve(variable, coord))
            .collect()
    }
}
