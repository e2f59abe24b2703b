// Shared fixtures for the integration tests.
#![allow(dead_code)]

use chunk_archive::{ArchiveWriter, AttrValue, Attributes, DataType, Filter, VariableSpec};
use refindex_format::{ArrayMeta, ChunkKey, ChunkRef, Dataset, FileIndex, VariableIndex};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Extent of the invariant `x` axis.
pub const X_LEN: u64 = 5;

pub fn f64_bytes(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// One `temp` row at time `t`.
pub fn temp_row(t: f64) -> Vec<f32> {
    (0..X_LEN).map(|j| (t * 10.0) as f32 + j as f32).collect()
}

/// Archive holding `steps` time steps starting at `t0`:
/// `t(t)` float64, `temp(t, x)` float32 shuffled+zstd, `x(x)` float64.
pub fn timestep_archive(t0: f64, steps: u64) -> Vec<u8> {
    let mut w = ArchiveWriter::new(Vec::new()).unwrap();
    w.set_attribute("start", AttrValue::Float(t0));
    w.set_attribute("title", "synthetic run");
    w.add_dimension("t", steps).unwrap();
    w.add_dimension("x", X_LEN).unwrap();

    w.add_variable(
        VariableSpec::new("t", DataType::Float64, &["t"], &[steps], &[1])
            .with_attribute("units", "days"),
    )
    .unwrap();
    w.add_variable(
        VariableSpec::new("temp", DataType::Float32, &["t", "x"], &[steps, X_LEN], &[1, X_LEN])
            .with_filters(vec![
                Filter::Shuffle { element_size: 4 },
                Filter::Zstd { level: 1 },
            ])
            .with_fill_value(f32::NAN.to_le_bytes().to_vec())
            .with_attribute("units", "K"),
    )
    .unwrap();
    w.add_variable(VariableSpec::new(
        "x",
        DataType::Float64,
        &["x"],
        &[X_LEN],
        &[X_LEN],
    ))
    .unwrap();

    for i in 0..steps {
        let t = t0 + i as f64;
        w.write_chunk("t", &[i], &f64_bytes(&[t])).unwrap();
        w.write_chunk("temp", &[i, 0], &f32_bytes(&temp_row(t)))
            .unwrap();
    }
    let xs: Vec<f64> = (0..X_LEN).map(|j| j as f64 * 0.5).collect();
    w.write_chunk("x", &[0], &f64_bytes(&xs)).unwrap();
    w.finish().unwrap()
}

pub fn write_timestep_archive(dir: &Path, name: &str, t0: f64, steps: u64) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, timestep_archive(t0, steps)).unwrap();
    path
}

fn meta(dims: &[&str], shape: &[u64], chunk_shape: &[u64], dtype: DataType) -> ArrayMeta {
    ArrayMeta {
        dimensions: dims.iter().map(|d| d.to_string()).collect(),
        shape: shape.to_vec(),
        chunk_shape: chunk_shape.to_vec(),
        dtype,
        fill_value: None,
        filters: Vec::new(),
        attributes: Attributes::new(),
    }
}

/// Hand-built dataset: `v(t)` with one-element chunks stored in `source`,
/// and an invariant `x(x)` of shape (5,).
pub fn synthetic_dataset(source: &str, t_size: u64, position: i64) -> Dataset {
    let mut v = VariableIndex {
        meta: meta(&["t"], &[t_size], &[1], DataType::Float32),
        chunks: BTreeMap::new(),
    };
    for i in 0..t_size {
        v.chunks
            .insert(ChunkKey::new(vec![i]), ChunkRef::range(source, 16 + 4 * i, 4));
    }
    let mut x = VariableIndex {
        meta: meta(&["x"], &[X_LEN], &[X_LEN], DataType::Float64),
        chunks: BTreeMap::new(),
    };
    x.chunks
        .insert(ChunkKey::new(vec![0]), ChunkRef::range(source, 1000, 40));

    let mut ds = Dataset::default();
    ds.dimensions.insert("t".to_string(), t_size);
    ds.dimensions.insert("x".to_string(), X_LEN);
    ds.attributes
        .insert("position".to_string(), AttrValue::Int(position));
    ds.variables.insert("v".to_string(), v);
    ds.variables.insert("x".to_string(), x);
    ds
}

pub fn synthetic_index(source: &str, t_size: u64, position: i64) -> FileIndex {
    FileIndex::new(source, synthetic_dataset(source, t_size, position)).unwrap()
}
