//! Locates every chunk of every variable in an archive without reading
//! chunk payloads.

use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use tracing::debug;

use crate::{
    chunk_grid,
    directory::{AttrEntry, Directory, VariableEntry},
    error::{ArchiveError, Result},
    format::{Trailer, HEADER_LEN, SIGNATURE, TRAILER_LEN, VERSION},
    schema::{Attributes, DataType, Filter},
    source::ByteSource,
};

/// Directory of one archive.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedFile {
    /// Global attributes
    pub attributes: Attributes,
    /// Declared dimension sizes
    pub dimensions: BTreeMap<String, u64>,
    /// Variables in directory order
    pub variables: Vec<LocatedVariable>,
    /// Length of the source in bytes
    pub size: u64,
}

/// Array metadata and chunk locations of one variable.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedVariable {
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
    /// Raw little-endian fill value, one element wide
    pub fill_value: Option<Vec<u8>>,
    /// Filter pipeline applied to every stored chunk
    pub filters: Vec<Filter>,
    /// Variable attributes
    pub attributes: Attributes,
    /// Stored chunks; grid positions absent here were never written
    pub chunks: Vec<LocatedChunk>,
}

impl LocatedVariable {
    /// Number of chunks along each axis.
    pub fn chunk_grid(&self) -> Vec<u64> {
        chunk_grid(&self.shape, &self.chunk_shape)
    }
}

/// Byte range of one stored chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedChunk {
    /// Position in the chunk grid
    pub coord: Vec<u64>,
    /// Absolute offset in the source
    pub offset: u64,
    /// Stored (filtered) length
    pub length: u64,
}

/// Parses the archive framing and directory of `source`.
///
/// Fails with [`ArchiveError::Format`] when the leading signature does not
/// match or the directory is malformed, and with
/// [`ArchiveError::TruncatedInput`] when the directory or any chunk points past
/// the available bytes.
pub fn locate<S: ByteSource + ?Sized>(source: &S) -> Result<LocatedFile> {
    let size = source.size()?;

    let sig_len = size.min(SIGNATURE.len() as u64) as usize;
    let mut sig = [0u8; 8];
    source.read_exact_at(0, &mut sig[..sig_len])?;
    if sig[..sig_len] != SIGNATURE[..sig_len] {
        return Err(ArchiveError::Format(format!(
            "bad signature {:02x?}",
            &sig[..sig_len]
        )));
    }
    if size < HEADER_LEN + TRAILER_LEN {
        return Err(ArchiveError::TruncatedInput(format!(
            "{size} bytes is shorter than header and trailer"
        )));
    }

    let mut header = [0u8; HEADER_LEN as usize];
    source.read_exact_at(0, &mut header)?;
    if header[8] != VERSION {
        return Err(ArchiveError::Format(format!(
            "unsupported archive version {}",
            header[8]
        )));
    }

    let mut raw_trailer = [0u8; TRAILER_LEN as usize];
    let trailer_start = size - TRAILER_LEN;
    source.read_exact_at(trailer_start, &mut raw_trailer)?;
    let trailer = Trailer::decode(&raw_trailer).ok_or_else(|| {
        ArchiveError::Format("missing directory trailer (archive not finalized?)".to_string())
    })?;

    let dir_end = trailer
        .directory_offset
        .checked_add(trailer.directory_len)
        .filter(|&end| end <= trailer_start)
        .ok_or_else(|| {
            ArchiveError::TruncatedInput(format!(
                "directory {}+{} past end of {} byte stream",
                trailer.directory_offset, trailer.directory_len, size
            ))
        })?;
    if trailer.directory_offset < HEADER_LEN {
        return Err(ArchiveError::Format(format!(
            "directory offset {} overlaps header",
            trailer.directory_offset
        )));
    }

    let raw_dir = source.read_range(trailer.directory_offset, trailer.directory_len)?;
    let dir = Directory::decode(&raw_dir)
        .map_err(|e| ArchiveError::Format(format!("directory decode failed: {e}")))?;

    let file = validate(dir, trailer.directory_offset, size)?;
    debug!(
        "Located {} variable(s), {} chunk(s), directory at {}..{}",
        file.variables.len(),
        file.variables.iter().map(|v| v.chunks.len()).sum::<usize>(),
        trailer.directory_offset,
        dir_end
    );
    Ok(file)
}

fn attributes(entries: Vec<AttrEntry>, owner: &str) -> Result<Attributes> {
    let mut out = Attributes::new();
    for entry in entries {
        if out.insert(entry.name.clone(), entry.value.into()).is_some() {
            return Err(ArchiveError::Format(format!(
                "duplicate attribute {:?} on {owner}",
                entry.name
            )));
        }
    }
    Ok(out)
}

fn validate(dir: Directory, chunk_region_end: u64, size: u64) -> Result<LocatedFile> {
    let mut dimensions = BTreeMap::new();
    for dim in dir.dimensions {
        if dimensions.insert(dim.name.clone(), dim.size).is_some() {
            return Err(ArchiveError::Format(format!(
                "duplicate dimension {:?}",
                dim.name
            )));
        }
    }

    let mut names = FxHashSet::default();
    let mut variables = Vec::with_capacity(dir.variables.len());
    for entry in dir.variables {
        if !names.insert(entry.name.clone()) {
            return Err(ArchiveError::Format(format!(
                "duplicate variable {:?}",
                entry.name
            )));
        }
        variables.push(validate_variable(entry, &dimensions, chunk_region_end)?);
    }

    Ok(LocatedFile {
        attributes: attributes(dir.attributes, "archive")?,
        dimensions,
        variables,
        size,
    })
}

fn validate_variable(
    entry: VariableEntry,
    dimensions: &BTreeMap<String, u64>,
    chunk_region_end: u64,
) -> Result<LocatedVariable> {
    let name = entry.name;
    let bad = |msg: String| ArchiveError::Format(format!("variable {name:?}: {msg}"));

    let rank = entry.shape.len();
    if entry.dimensions.len() != rank || entry.chunk_shape.len() != rank {
        return Err(bad(format!(
            "rank mismatch: {} dimension name(s), shape {:?}, chunk shape {:?}",
            entry.dimensions.len(),
            entry.shape,
            entry.chunk_shape
        )));
    }
    if entry.chunk_shape.contains(&0) {
        return Err(bad(format!("zero chunk extent in {:?}", entry.chunk_shape)));
    }
    for (dim, &extent) in entry.dimensions.iter().zip(&entry.shape) {
        match dimensions.get(dim) {
            Some(&declared) if declared == extent => {}
            Some(&declared) => {
                return Err(bad(format!(
                    "extent {extent} along {dim:?} disagrees with declared size {declared}"
                )))
            }
            None => return Err(bad(format!("undeclared dimension {dim:?}"))),
        }
    }

    let dtype = DataType::from_code(entry.dtype)
        .ok_or_else(|| bad(format!("unknown data type code {}", entry.dtype)))?;
    let fill_value: Option<Vec<u8>> = entry.fill_value.map(Into::into);
    if let Some(fill) = &fill_value {
        if fill.len() != dtype.item_size() {
            return Err(bad(format!(
                "fill value is {} bytes, {dtype} elements are {}",
                fill.len(),
                dtype.item_size()
            )));
        }
    }

    let grid = chunk_grid(&entry.shape, &entry.chunk_shape);
    let mut seen = FxHashSet::default();
    let mut chunks = Vec::with_capacity(entry.chunks.len());
    for chunk in entry.chunks {
        if chunk.coord.len() != rank || chunk.coord.iter().zip(&grid).any(|(c, g)| c >= g) {
            return Err(bad(format!(
                "chunk {:?} outside grid {grid:?}",
                chunk.coord
            )));
        }
        if !seen.insert(chunk.coord.clone()) {
            return Err(bad(format!("duplicate chunk {:?}", chunk.coord)));
        }
        if chunk.offset < HEADER_LEN {
            return Err(bad(format!(
                "chunk {:?} offset {} overlaps header",
                chunk.coord, chunk.offset
            )));
        }
        match chunk.offset.checked_add(chunk.length) {
            Some(end) if end <= chunk_region_end => {}
            _ => {
                return Err(ArchiveError::TruncatedInput(format!(
                    "variable {name:?}: chunk {:?} at {}+{} past end of chunk region ({chunk_region_end})",
                    chunk.coord, chunk.offset, chunk.length
                )))
            }
        }
        chunks.push(LocatedChunk {
            coord: chunk.coord,
            offset: chunk.offset,
            length: chunk.length,
        });
    }

    Ok(LocatedVariable {
        attributes: attributes(entry.attributes, &format!("variable {name:?}"))?,
        dimensions: entry.dimensions,
        shape: entry.shape,
        chunk_shape: entry.chunk_shape,
        dtype,
        fill_value,
        filters: entry.filters.into_iter().map(Filter::from).collect(),
        chunks,
        name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        directory::{ChunkEntry, DimEntry},
        format::encode_header,
        writer::{ArchiveWriter, VariableSpec},
    };

    fn sample_archive() -> Vec<u8> {
        let mut w = ArchiveWriter::new(Vec::new()).unwrap();
        w.add_dimension("x", 6).unwrap();
        w.add_variable(VariableSpec::new("v", DataType::UInt8, &["x"], &[6], &[4]))
            .unwrap();
        w.write_chunk("v", &[0], &[1, 2, 3, 4]).unwrap();
        w.write_chunk("v", &[1], &[5, 6]).unwrap();
        w.finish().unwrap()
    }

    /// Hand-assembles an archive around `dir` with `payload` as chunk region.
    fn assemble(dir: &Directory, payload: &[u8]) -> Vec<u8> {
        let mut out = encode_header().to_vec();
        out.extend_from_slice(payload);
        let raw = dir.encode().unwrap();
        let trailer = Trailer {
            directory_offset: out.len() as u64,
            directory_len: raw.len() as u64,
        };
        out.extend_from_slice(&raw);
        out.extend_from_slice(&trailer.encode());
        out
    }

    fn one_chunk_dir(offset: u64, length: u64) -> Directory {
        Directory {
            attributes: Vec::new(),
            dimensions: vec![DimEntry {
                name: "x".to_string(),
                size: 4,
            }],
            variables: vec![VariableEntry {
                name: "v".to_string(),
                dimensions: vec!["x".to_string()],
                shape: vec![4],
                chunk_shape: vec![4],
                dtype: DataType::UInt8.code(),
                fill_value: None,
                filters: Vec::new(),
                attributes: Vec::new(),
                chunks: vec![ChunkEntry {
                    coord: vec![0],
                    offset,
                    length,
                }],
            }],
        }
    }

    #[test]
    fn locates_chunks_without_reading_them() {
        let bytes = sample_archive();
        let file = locate(&bytes).unwrap();
        assert_eq!(file.size, bytes.len() as u64);
        assert_eq!(file.dimensions.get("x"), Some(&6));

        let v = &file.variables[0];
        assert_eq!(v.chunk_grid(), vec![2]);
        assert_eq!(v.chunks.len(), 2);
        let c1 = &v.chunks[1];
        assert_eq!(c1.coord, vec![1]);
        assert_eq!(
            bytes.read_range(c1.offset, c1.length).unwrap(),
            vec![5, 6]
        );
    }

    #[test]
    fn rejects_foreign_signature() {
        let mut bytes = sample_archive();
        bytes[1] = b'H';
        assert!(matches!(locate(&bytes), Err(ArchiveError::Format(_))));

        let short: &[u8] = b"PK";
        assert!(matches!(locate(short), Err(ArchiveError::Format(_))));
    }

    #[test]
    fn short_stream_with_valid_signature_is_truncated() {
        let bytes = encode_header();
        assert!(matches!(
            locate(&bytes[..]),
            Err(ArchiveError::TruncatedInput(_))
        ));
    }

    #[test]
    fn directory_past_end_is_truncated() {
        let mut bytes = sample_archive();
        let n = bytes.len();
        // Inflate the recorded directory length.
        bytes[n - 16..n - 8].copy_from_slice(&u64::MAX.to_le_bytes());
        assert!(matches!(
            locate(&bytes),
            Err(ArchiveError::TruncatedInput(_))
        ));
    }

    #[test]
    fn chunk_past_chunk_region_is_truncated() {
        let bytes = assemble(&one_chunk_dir(HEADER_LEN, 64), &[0u8; 4]);
        assert!(matches!(
            locate(&bytes),
            Err(ArchiveError::TruncatedInput(_))
        ));

        let ok = assemble(&one_chunk_dir(HEADER_LEN, 4), &[0u8; 4]);
        assert!(locate(&ok).is_ok());
    }

    #[test]
    fn chunk_outside_grid_is_a_format_error() {
        let mut dir = one_chunk_dir(HEADER_LEN, 4);
        dir.variables[0].chunks[0].coord = vec![1];
        let bytes = assemble(&dir, &[0u8; 4]);
        assert!(matches!(locate(&bytes), Err(ArchiveError::Format(_))));
    }

    #[test]
    fn shape_must_match_declared_dimension() {
        let mut dir = one_chunk_dir(HEADER_LEN, 4);
        dir.dimensions[0].size = 5;
        let bytes = assemble(&dir, &[0u8; 4]);
        assert!(matches!(locate(&bytes), Err(ArchiveError::Format(_))));
    }
}
