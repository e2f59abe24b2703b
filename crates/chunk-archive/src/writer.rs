use rustc_hash::FxHashMap;
use std::io::Write;

use crate::{
    chunk_grid,
    directory::{attr_entries, ChunkEntry, DimEntry, Directory, VariableEntry},
    error::{ArchiveError, Result},
    filters::encode_chunk,
    format::{encode_header, Trailer, HEADER_LEN},
    schema::{AttrValue, Attributes, DataType, Filter},
};

/// Definition of a variable to be written.
#[derive(Debug, Clone)]
pub struct VariableSpec {
    /// Variable name
    pub name: String,
    /// Dimension name of every axis
    pub dimensions: Vec<String>,
    /// Array extent along every axis
    pub shape: Vec<u64>,
    /// Chunk extent along every axis
    pub chunk_shape: Vec<u64>,
    /// Element type
    pub dtype: DataType,
    /// Raw little-endian fill value
    pub fill_value: Option<Vec<u8>>,
    /// Filter pipeline applied by [`ArchiveWriter::write_chunk`]
    pub filters: Vec<Filter>,
    /// Variable attributes
    pub attributes: Attributes,
}

impl VariableSpec {
    /// Unfiltered variable without fill value or attributes.
    pub fn new(
        name: &str,
        dtype: DataType,
        dimensions: &[&str],
        shape: &[u64],
        chunk_shape: &[u64],
    ) -> Self {
        Self {
            name: name.to_string(),
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            shape: shape.to_vec(),
            chunk_shape: chunk_shape.to_vec(),
            dtype,
            fill_value: None,
            filters: Vec::new(),
            attributes: Attributes::new(),
        }
    }

    /// Sets the filter pipeline.
    pub fn with_filters(mut self, filters: Vec<Filter>) -> Self {
        self.filters = filters;
        self
    }

    /// Sets the raw fill value.
    pub fn with_fill_value(mut self, fill: Vec<u8>) -> Self {
        self.fill_value = Some(fill);
        self
    }

    /// Adds one attribute.
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }
}

/// Streams chunk payloads to `W`, then writes the directory on [`finish`].
///
/// [`finish`]: ArchiveWriter::finish
pub struct ArchiveWriter<W: Write> {
    w: W,
    pos: u64,
    dir: Directory,
    slots: FxHashMap<String, usize>,
}

impl<W: Write> ArchiveWriter<W> {
    /// Writes the header and returns a writer positioned at the chunk region.
    pub fn new(mut w: W) -> Result<Self> {
        w.write_all(&encode_header())?;
        Ok(Self {
            w,
            pos: HEADER_LEN,
            dir: Directory::default(),
            slots: FxHashMap::default(),
        })
    }

    /// Sets a global attribute.
    pub fn set_attribute(&mut self, name: &str, value: impl Into<AttrValue>) {
        let value = value.into();
        match self.dir.attributes.iter_mut().find(|a| a.name == name) {
            Some(entry) => entry.value = (&value).into(),
            None => {
                let mut attrs = Attributes::new();
                attrs.insert(name.to_string(), value);
                self.dir.attributes.extend(attr_entries(&attrs));
            }
        }
    }

    /// Declares a dimension.
    pub fn add_dimension(&mut self, name: &str, size: u64) -> Result<()> {
        if self.dir.dimensions.iter().any(|d| d.name == name) {
            return Err(ArchiveError::InvalidInput(format!(
                "dimension {name:?} declared twice"
            )));
        }
        self.dir.dimensions.push(DimEntry {
            name: name.to_string(),
            size,
        });
        Ok(())
    }

    /// Declares a variable. Its chunks may then be written in any order.
    pub fn add_variable(&mut self, spec: VariableSpec) -> Result<()> {
        if self.slots.contains_key(&spec.name) {
            return Err(ArchiveError::InvalidInput(format!(
                "variable {:?} declared twice",
                spec.name
            )));
        }
        let rank = spec.shape.len();
        if spec.dimensions.len() != rank || spec.chunk_shape.len() != rank {
            return Err(ArchiveError::InvalidInput(format!(
                "variable {:?}: dimensions, shape and chunk shape differ in rank",
                spec.name
            )));
        }
        self.slots.insert(spec.name.clone(), self.dir.variables.len());
        self.dir.variables.push(VariableEntry {
            attributes: attr_entries(&spec.attributes),
            name: spec.name,
            dimensions: spec.dimensions,
            shape: spec.shape,
            chunk_shape: spec.chunk_shape,
            dtype: spec.dtype.code(),
            fill_value: spec.fill_value.map(Into::into),
            filters: spec.filters.into_iter().map(Into::into).collect(),
            chunks: Vec::new(),
        });
        Ok(())
    }

    /// Encodes `data` through the variable's filters and appends it.
    /// Returns the stored length.
    pub fn write_chunk(&mut self, var: &str, coord: &[u64], data: &[u8]) -> Result<u64> {
        let slot = self.slot(var)?;
        let filters: Vec<Filter> = self.dir.variables[slot]
            .filters
            .iter()
            .map(|&f| f.into())
            .collect();
        let stored = encode_chunk(&filters, data)?;
        self.append(slot, coord, &stored)
    }

    /// Appends already-encoded chunk bytes as-is.
    pub fn write_raw_chunk(&mut self, var: &str, coord: &[u64], raw: &[u8]) -> Result<u64> {
        let slot = self.slot(var)?;
        self.append(slot, coord, raw)
    }

    fn slot(&self, var: &str) -> Result<usize> {
        self.slots
            .get(var)
            .copied()
            .ok_or_else(|| ArchiveError::InvalidInput(format!("unknown variable {var:?}")))
    }

    fn append(&mut self, slot: usize, coord: &[u64], raw: &[u8]) -> Result<u64> {
        let entry = &mut self.dir.variables[slot];
        let grid = chunk_grid(&entry.shape, &entry.chunk_shape);
        if coord.len() != grid.len() || coord.iter().zip(&grid).any(|(c, g)| c >= g) {
            return Err(ArchiveError::InvalidInput(format!(
                "variable {:?}: chunk {coord:?} outside grid {grid:?}",
                entry.name
            )));
        }
        if entry.chunks.iter().any(|c| c.coord == coord) {
            return Err(ArchiveError::InvalidInput(format!(
                "variable {:?}: chunk {coord:?} written twice",
                entry.name
            )));
        }

        self.w.write_all(raw)?;
        let length = raw.len() as u64;
        entry.chunks.push(ChunkEntry {
            coord: coord.to_vec(),
            offset: self.pos,
            length,
        });
        self.pos += length;
        Ok(length)
    }

    /// Writes directory and trailer, flushes, and returns the inner writer.
    pub fn finish(mut self) -> Result<W> {
        let raw = self
            .dir
            .encode()
            .map_err(|e| ArchiveError::InvalidInput(format!("directory encode failed: {e}")))?;
        let trailer = Trailer {
            directory_offset: self.pos,
            directory_len: raw.len() as u64,
        };
        self.w.write_all(&raw)?;
        self.w.write_all(&trailer.encode())?;
        self.w.flush()?;
        Ok(self.w)
    }
}
