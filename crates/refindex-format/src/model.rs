//! In-memory reference index.

use chunk_archive::{chunk_grid, Attributes, DataType, Filter};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::chunk_ref::{ChunkKey, ChunkRef};
use crate::error::{IndexError, Result};

/// Array metadata of one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayMeta {
    /// Dimension name of every axis
    pub dimensions: Vec<String>,
    /// Array extent along every axis
    pub shape: Vec<u64>,
    /// Chunk extent along every axis
    pub chunk_shape: Vec<u64>,
    /// Element type
    pub dtype: DataType,
    /// Raw little-endian fill value
    #[serde(default)]
    pub fill_value: Option<Vec<u8>>,
    /// Filter pipeline of every stored chunk
    #[serde(default)]
    pub filters: Vec<Filter>,
    /// Variable attributes
    #[serde(default)]
    pub attributes: Attributes,
}

impl ArrayMeta {
    /// Number of chunks along each axis.
    pub fn chunk_grid(&self) -> Vec<u64> {
        chunk_grid(&self.shape, &self.chunk_shape)
    }

    /// Axis named `dim`, if the variable spans it.
    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dimensions.iter().position(|d| d == dim)
    }

    /// Elements in one full chunk, `None` if the count overflows.
    pub fn chunk_len(&self) -> Option<u64> {
        self.chunk_shape
            .iter()
            .try_fold(1u64, |n, &extent| n.checked_mul(extent))
    }

    /// Whether `coord` lies inside the chunk grid.
    pub fn contains(&self, coord: &[u64]) -> bool {
        let grid = self.chunk_grid();
        coord.len() == grid.len() && coord.iter().zip(&grid).all(|(c, g)| c < g)
    }
}

/// Metadata and chunk references of one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableIndex {
    /// Array metadata
    pub meta: ArrayMeta,
    /// Stored chunks by grid position
    pub chunks: BTreeMap<ChunkKey, ChunkRef>,
}

impl VariableIndex {
    /// Reference for `coord`, if stored.
    pub fn chunk(&self, coord: &[u64]) -> Option<&ChunkRef> {
        self.chunks.get(coord)
    }

    /// Number of inlined chunks.
    pub fn inline_count(&self) -> usize {
        self.chunks.values().filter(|c| c.is_inline()).count()
    }

    /// Sum of stored lengths over all chunks.
    pub fn stored_bytes(&self) -> u64 {
        self.chunks.values().map(ChunkRef::stored_len).sum()
    }
}

/// Variables, global attributes and dimension sizes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    /// Variables by name
    pub variables: BTreeMap<String, VariableIndex>,
    /// Global attributes
    #[serde(default)]
    pub attributes: Attributes,
    /// Dimension sizes by name
    pub dimensions: BTreeMap<String, u64>,
}

impl Dataset {
    /// Variable by name.
    pub fn variable(&self, name: &str) -> Option<&VariableIndex> {
        self.variables.get(name)
    }

    /// Checks the structural invariants every index must hold: consistent
    /// ranks, declared dimensions whose sizes match every variable's shape,
    /// non-zero chunk extents, one-element fill values and chunk keys
    /// inside their grid.
    pub fn check(&self) -> Result<()> {
        for (name, var) in &self.variables {
            let invalid = |reason: String| IndexError::Invalid {
                name: name.clone(),
                reason,
            };
            let meta = &var.meta;
            let rank = meta.shape.len();
            if meta.dimensions.len() != rank || meta.chunk_shape.len() != rank {
                return Err(invalid(format!(
                    "{} dimension name(s) for shape {:?} and chunk shape {:?}",
                    meta.dimensions.len(),
                    meta.shape,
                    meta.chunk_shape
                )));
            }
            if meta.chunk_shape.contains(&0) {
                return Err(invalid(format!(
                    "zero chunk extent in {:?}",
                    meta.chunk_shape
                )));
            }
            for (dim, extent) in meta.dimensions.iter().zip(&meta.shape) {
                match self.dimensions.get(dim) {
                    Some(size) if size == extent => {}
                    Some(size) => {
                        return Err(invalid(format!(
                            "extent {extent} along {dim:?} but dimension size is {size}"
                        )))
                    }
                    None => return Err(invalid(format!("undeclared dimension {dim:?}"))),
                }
            }
            if let Some(fill) = &meta.fill_value {
                if fill.len() != meta.dtype.item_size() {
                    return Err(invalid(format!(
                        "fill value of {} byte(s) for {}",
                        fill.len(),
                        meta.dtype
                    )));
                }
            }
            if let Some(key) = var.chunks.keys().find(|k| !meta.contains(k.coord())) {
                return Err(invalid(format!(
                    "chunk {key:?} outside grid {:?}",
                    meta.chunk_grid()
                )));
            }
        }
        Ok(())
    }
}

impl AsRef<Dataset> for Dataset {
    fn as_ref(&self) -> &Dataset {
        self
    }
}

/// Reference index of exactly one source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIndex {
    source: String,
    dataset: Dataset,
}

impl FileIndex {
    /// Wraps a dataset after checking its invariants.
    pub fn new(source: &str, dataset: Dataset) -> Result<Self> {
        dataset.check()?;
        Ok(Self {
            source: source.to_string(),
            dataset,
        })
    }

    /// Locator of the source file.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Indexed content.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub(crate) fn into_parts(self) -> (String, Dataset) {
        (self.source, self.dataset)
    }
}

impl AsRef<Dataset> for FileIndex {
    fn as_ref(&self) -> &Dataset {
        &self.dataset
    }
}

/// How a combined index came to be.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Number of indexes merged
    pub inputs: usize,
    /// Dimension the inputs were joined along; `None` for a promoted file
    pub concat_dimension: Option<String>,
    /// Source files, in merged order
    pub sources: Vec<String>,
}

/// Reference index spanning one or more source files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombinedIndex {
    provenance: Provenance,
    dataset: Dataset,
}

impl CombinedIndex {
    pub(crate) fn from_parts(dataset: Dataset, provenance: Provenance) -> Self {
        Self {
            provenance,
            dataset,
        }
    }

    /// Indexed content.
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Merge provenance.
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    pub(crate) fn into_parts(self) -> (Dataset, Provenance) {
        (self.dataset, self.provenance)
    }
}

impl From<FileIndex> for CombinedIndex {
    fn from(file: FileIndex) -> Self {
        let (source, dataset) = file.into_parts();
        Self {
            provenance: Provenance {
                inputs: 1,
                concat_dimension: None,
                sources: vec![source],
            },
            dataset,
        }
    }
}

impl AsRef<Dataset> for CombinedIndex {
    fn as_ref(&self) -> &Dataset {
        &self.dataset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(shape: &[u64], chunk_shape: &[u64]) -> ArrayMeta {
        ArrayMeta {
            dimensions: vec!["x".to_string()],
            shape: shape.to_vec(),
            chunk_shape: chunk_shape.to_vec(),
            dtype: DataType::Int32,
            fill_value: None,
            filters: Vec::new(),
            attributes: Attributes::new(),
        }
    }

    fn dataset(var: VariableIndex) -> Dataset {
        let mut ds = Dataset::default();
        ds.dimensions.insert("x".to_string(), var.meta.shape[0]);
        ds.variables.insert("v".to_string(), var);
        ds
    }

    #[test]
    fn grid_rounds_partial_chunks_up() {
        let m = meta(&[10], &[4]);
        assert_eq!(m.chunk_grid(), vec![3]);
        assert!(m.contains(&[2]));
        assert!(!m.contains(&[3]));
        assert!(!m.contains(&[0, 0]));
    }

    #[test]
    fn check_rejects_keys_outside_grid() {
        let mut var = VariableIndex {
            meta: meta(&[8], &[4]),
            chunks: BTreeMap::new(),
        };
        var.chunks
            .insert(ChunkKey::new(vec![1]), ChunkRef::range("a", 16, 4));
        assert!(FileIndex::new("a", dataset(var.clone())).is_ok());

        var.chunks
            .insert(ChunkKey::new(vec![2]), ChunkRef::range("a", 20, 4));
        assert!(matches!(
            FileIndex::new("a", dataset(var)),
            Err(IndexError::Invalid { .. })
        ));
    }

    #[test]
    fn check_rejects_undeclared_dimension() {
        let var = VariableIndex {
            meta: meta(&[8], &[4]),
            chunks: BTreeMap::new(),
        };
        let mut ds = dataset(var);
        ds.dimensions.clear();
        assert!(ds.check().is_err());
    }

    #[test]
    fn promotion_records_single_source() {
        let file = FileIndex::new("a.cha", Dataset::default()).unwrap();
        let combined = CombinedIndex::from(file.clone());
        assert_eq!(combined.dataset(), file.dataset());
        assert_eq!(combined.provenance().inputs, 1);
        assert_eq!(combined.provenance().sources, vec!["a.cha".to_string()]);
    }
}
