//! Multi-file index merging along one concatenation dimension.
//!
//! Inputs are validated completely before anything is moved, so a failed merge
//! never yields a partial index. Chunk payloads are never read or copied: the
//! merge only renumbers chunk keys along the concatenation axis.

use chunk_archive::{decode_chunk, AttrValue};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::chunk_ref::{ChunkKey, ChunkRef};
use crate::error::{IndexError, Result};
use crate::model::{ArrayMeta, CombinedIndex, Dataset, FileIndex, Provenance, VariableIndex};

/// Value that orders inputs along the concatenation dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortKey {
    /// A numeric or text global attribute.
    Attribute(String),
    /// First element of a variable's origin chunk, which must be inline.
    Coordinate(String),
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Attribute(name) => write!(f, "attribute {name:?}"),
            SortKey::Coordinate(name) => write!(f, "coordinate {name:?}"),
        }
    }
}

/// Merge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOptions {
    /// Dimension the inputs are joined along
    pub concat_dimension: String,
    /// Reorders inputs before stitching; input order otherwise
    pub sort_key: Option<SortKey>,
}

impl MergeOptions {
    /// Joins along `concat_dimension` in input order.
    pub fn new(concat_dimension: &str) -> Self {
        Self {
            concat_dimension: concat_dimension.to_string(),
            sort_key: None,
        }
    }

    /// Orders inputs by `key` first. Ties keep input order.
    pub fn sort_by(mut self, key: SortKey) -> Self {
        self.sort_key = Some(key);
        self
    }
}

/// One index to merge.
#[derive(Debug, Clone)]
pub enum MergeInput {
    /// Freshly built single-file index
    File(FileIndex),
    /// Previously merged (or promoted) index
    Combined(CombinedIndex),
}

impl From<FileIndex> for MergeInput {
    fn from(file: FileIndex) -> Self {
        MergeInput::File(file)
    }
}

impl From<CombinedIndex> for MergeInput {
    fn from(combined: CombinedIndex) -> Self {
        MergeInput::Combined(combined)
    }
}

impl MergeInput {
    /// Human-readable name used in errors.
    pub fn label(&self) -> String {
        match self {
            MergeInput::File(f) => f.source().to_string(),
            MergeInput::Combined(c) => {
                let sources = &c.provenance().sources;
                match sources.first() {
                    Some(first) if sources.len() > 1 => {
                        format!("combined index [{first}, +{} more]", sources.len() - 1)
                    }
                    Some(first) => first.clone(),
                    None => "combined index".to_string(),
                }
            }
        }
    }

    /// Indexed content.
    pub fn dataset(&self) -> &Dataset {
        match self {
            MergeInput::File(f) => f.dataset(),
            MergeInput::Combined(c) => c.dataset(),
        }
    }

    fn into_parts(self) -> (Dataset, Vec<String>) {
        match self {
            MergeInput::File(f) => {
                let (source, dataset) = f.into_parts();
                (dataset, vec![source])
            }
            MergeInput::Combined(c) => {
                let (dataset, provenance) = c.into_parts();
                (dataset, provenance.sources)
            }
        }
    }
}

/// Merges `inputs` into one index along `options.concat_dimension`.
///
/// Variables that do not span the concatenation dimension must be identical
/// across inputs and are taken from the first (ordered) input. Variables that
/// do span it are stitched: their chunk keys along that axis are shifted by the
/// number of chunks contributed by the preceding inputs.
pub fn merge<I>(inputs: I, options: &MergeOptions) -> Result<CombinedIndex>
where
    I: IntoIterator,
    I::Item: Into<MergeInput>,
{
    let mut inputs: Vec<MergeInput> = inputs.into_iter().map(Into::into).collect();
    if inputs.is_empty() {
        return Err(IndexError::EmptyInput);
    }

    let dim = options.concat_dimension.as_str();
    if let Some(input) = inputs
        .iter()
        .find(|i| !i.dataset().dimensions.contains_key(dim))
    {
        return Err(IndexError::DimensionMismatch {
            input: input.label(),
            dimension: dim.to_string(),
        });
    }

    if let Some(key) = &options.sort_key {
        order_inputs(&mut inputs, key)?;
    }

    check_dimensions(&inputs, dim)?;
    check_variable_names(&inputs)?;
    let plans = plan_variables(&inputs, dim)?;

    let n_inputs = inputs.len();
    let concat_size: u64 = inputs.iter().map(|i| i.dataset().dimensions[dim]).sum();

    let mut datasets = Vec::with_capacity(n_inputs);
    let mut sources = Vec::new();
    for input in inputs {
        let (dataset, mut input_sources) = input.into_parts();
        datasets.push(dataset);
        sources.append(&mut input_sources);
    }

    let mut variables = BTreeMap::new();
    let mut concatenated = 0usize;
    for (name, plan) in plans {
        let var = match plan {
            Plan::Invariant => match datasets[0].variables.remove(&name) {
                Some(var) => var,
                None => continue,
            },
            Plan::Concat { axis, meta, shifts } => {
                concatenated += 1;
                let mut chunks = BTreeMap::new();
                for (dataset, shift) in datasets.iter_mut().zip(shifts) {
                    if let Some(part) = dataset.variables.remove(&name) {
                        chunks.extend(
                            part.chunks
                                .into_iter()
                                .map(|(key, reference)| (key.shifted(axis, shift), reference)),
                        );
                    }
                }
                VariableIndex { meta, chunks }
            }
        };
        variables.insert(name, var);
    }

    let first = datasets.swap_remove(0);
    let mut dimensions = first.dimensions;
    dimensions.insert(dim.to_string(), concat_size);

    debug!(
        "Merged {} input(s) along {:?} (size {}): {} variable(s), {} concatenated",
        n_inputs,
        dim,
        concat_size,
        variables.len(),
        concatenated
    );

    Ok(CombinedIndex::from_parts(
        Dataset {
            variables,
            attributes: first.attributes,
            dimensions,
        },
        Provenance {
            inputs: n_inputs,
            concat_dimension: Some(dim.to_string()),
            sources,
        },
    ))
}

enum Plan {
    Invariant,
    Concat {
        axis: usize,
        meta: ArrayMeta,
        /// Chunk offset along `axis` of every input
        shifts: Vec<u64>,
    },
}

fn conflict(input: &MergeInput, name: &str, reason: String) -> IndexError {
    IndexError::SchemaConflict {
        input: input.label(),
        name: name.to_string(),
        reason,
    }
}

fn check_dimensions(inputs: &[MergeInput], dim: &str) -> Result<()> {
    let first = &inputs[0].dataset().dimensions;
    for input in &inputs[1..] {
        let dims = &input.dataset().dimensions;
        for (name, size) in first {
            if name == dim {
                continue;
            }
            match dims.get(name) {
                Some(other) if other == size => {}
                Some(other) => {
                    return Err(conflict(
                        input,
                        name,
                        format!("dimension size {other}, first input has {size}"),
                    ))
                }
                None => return Err(conflict(input, name, "dimension missing".to_string())),
            }
        }
        if let Some(extra) = dims.keys().find(|k| !first.contains_key(*k)) {
            return Err(conflict(
                input,
                extra,
                "dimension absent from first input".to_string(),
            ));
        }
    }
    Ok(())
}

fn check_variable_names(inputs: &[MergeInput]) -> Result<()> {
    let first = &inputs[0].dataset().variables;
    for input in &inputs[1..] {
        let vars = &input.dataset().variables;
        if let Some(missing) = first.keys().find(|k| !vars.contains_key(*k)) {
            return Err(conflict(input, missing, "variable missing".to_string()));
        }
        if let Some(extra) = vars.keys().find(|k| !first.contains_key(*k)) {
            return Err(conflict(
                input,
                extra,
                "variable absent from first input".to_string(),
            ));
        }
    }
    Ok(())
}

/// First metadata field that differs, ignoring the extent along `skip_axis`.
fn meta_difference(a: &ArrayMeta, b: &ArrayMeta, skip_axis: Option<usize>) -> Option<String> {
    if a.dimensions != b.dimensions {
        return Some(format!(
            "dimensions {:?}, first input has {:?}",
            b.dimensions, a.dimensions
        ));
    }
    if a.dtype != b.dtype {
        return Some(format!("dtype {}, first input has {}", b.dtype, a.dtype));
    }
    if a.chunk_shape != b.chunk_shape {
        return Some(format!(
            "chunk shape {:?}, first input has {:?}",
            b.chunk_shape, a.chunk_shape
        ));
    }
    let shape_differs = a.shape.len() != b.shape.len()
        || a
            .shape
            .iter()
            .zip(&b.shape)
            .enumerate()
            .any(|(axis, (x, y))| Some(axis) != skip_axis && x != y);
    if shape_differs {
        return Some(format!("shape {:?}, first input has {:?}", b.shape, a.shape));
    }
    if a.fill_value != b.fill_value {
        return Some("fill value differs".to_string());
    }
    if a.filters != b.filters {
        return Some(format!(
            "filters {:?}, first input has {:?}",
            b.filters, a.filters
        ));
    }
    if a.attributes != b.attributes {
        return Some("attributes differ".to_string());
    }
    None
}

fn plan_variables(inputs: &[MergeInput], dim: &str) -> Result<BTreeMap<String, Plan>> {
    let mut plans = BTreeMap::new();
    let last = inputs.len() - 1;

    for (name, var) in &inputs[0].dataset().variables {
        let first_meta = &var.meta;
        let axis = first_meta.axis_of(dim);

        for input in &inputs[1..] {
            let other = &input.dataset().variables[name].meta;
            if let Some(reason) = meta_difference(first_meta, other, axis) {
                return Err(conflict(input, name, reason));
            }
        }

        let Some(axis) = axis else {
            plans.insert(name.clone(), Plan::Invariant);
            continue;
        };

        let chunk = first_meta.chunk_shape[axis];
        let mut shifts = Vec::with_capacity(inputs.len());
        let mut offset = 0u64;
        let mut extent = 0u64;
        for (i, input) in inputs.iter().enumerate() {
            let meta = &input.dataset().variables[name].meta;
            let len = meta.shape[axis];
            if i < last && len % chunk != 0 {
                return Err(conflict(
                    input,
                    name,
                    format!(
                        "extent {len} along {dim:?} ends inside a chunk of {chunk}; only the last input may"
                    ),
                ));
            }
            shifts.push(offset);
            offset += meta.chunk_grid()[axis];
            extent += len;
        }

        let mut meta = first_meta.clone();
        meta.shape[axis] = extent;
        plans.insert(name.clone(), Plan::Concat { axis, meta, shifts });
    }
    Ok(plans)
}

#[derive(Debug, Clone, PartialEq)]
enum SortValue {
    Number(f64),
    Text(String),
}

impl SortValue {
    fn kind(&self) -> &'static str {
        match self {
            SortValue::Number(_) => "number",
            SortValue::Text(_) => "text",
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortValue::Number(a), SortValue::Number(b)) => a.total_cmp(b),
            (SortValue::Text(a), SortValue::Text(b)) => a.cmp(b),
            // Mixed kinds are rejected before sorting.
            (a, b) => a.kind().cmp(b.kind()),
        }
    }
}

fn sort_value(input: &MergeInput, key: &SortKey) -> Result<SortValue> {
    let fail = |reason: String| IndexError::SortKey {
        input: input.label(),
        key: key.to_string(),
        reason,
    };
    let dataset = input.dataset();

    match key {
        SortKey::Attribute(name) => match dataset.attributes.get(name) {
            Some(AttrValue::Int(v)) => Ok(SortValue::Number(*v as f64)),
            Some(AttrValue::Float(v)) => Ok(SortValue::Number(*v)),
            Some(AttrValue::Text(v)) => Ok(SortValue::Text(v.clone())),
            Some(other) => Err(fail(format!("list value {other} is not orderable"))),
            None => Err(fail("attribute missing".to_string())),
        },
        SortKey::Coordinate(name) => {
            let var = dataset
                .variable(name)
                .ok_or_else(|| fail("variable missing".to_string()))?;
            let origin = ChunkKey::origin(var.meta.shape.len());
            let raw = match var.chunk(origin.coord()) {
                Some(ChunkRef::Inline(raw)) => raw,
                Some(ChunkRef::Range { .. }) => {
                    return Err(fail(
                        "origin chunk is not inline; raise the inline threshold".to_string(),
                    ))
                }
                None => return Err(fail("origin chunk missing".to_string())),
            };
            let decoded = decode_chunk(&var.meta.filters, raw)
                .map_err(|e| fail(format!("decode failed: {e}")))?;
            var.meta
                .dtype
                .value_at(&decoded, 0)
                .map(SortValue::Number)
                .ok_or_else(|| fail("origin chunk is empty".to_string()))
        }
    }
}

fn order_inputs(inputs: &mut Vec<MergeInput>, key: &SortKey) -> Result<()> {
    let mut keyed: Vec<(SortValue, MergeInput)> = Vec::with_capacity(inputs.len());
    for input in inputs.drain(..) {
        let value = sort_value(&input, key)?;
        if let Some((first, _)) = keyed.first() {
            if first.kind() != value.kind() {
                return Err(IndexError::SortKey {
                    input: input.label(),
                    key: key.to_string(),
                    reason: format!("{} value among {} values", value.kind(), first.kind()),
                });
            }
        }
        keyed.push((value, input));
    }
    // Stable: equal keys keep input order.
    keyed.sort_by(|a, b| a.0.compare(&b.0));
    inputs.extend(keyed.into_iter().map(|(_, input)| input));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_values_order_numbers_numerically() {
        let mut v = [
            SortValue::Number(10.0),
            SortValue::Number(-1.0),
            SortValue::Number(2.5),
        ];
        v.sort_by(|a, b| a.compare(b));
        assert_eq!(v[0], SortValue::Number(-1.0));
        assert_eq!(v[2], SortValue::Number(10.0));
    }

    #[test]
    fn meta_difference_ignores_concat_extent_only() {
        let a = ArrayMeta {
            dimensions: vec!["t".to_string(), "x".to_string()],
            shape: vec![2, 5],
            chunk_shape: vec![1, 5],
            dtype: chunk_archive::DataType::Float32,
            fill_value: None,
            filters: Vec::new(),
            attributes: Default::default(),
        };
        let mut b = a.clone();
        b.shape[0] = 7;
        assert_eq!(meta_difference(&a, &b, Some(0)), None);
        assert!(meta_difference(&a, &b, None).is_some());
        b.shape[1] = 6;
        assert!(meta_difference(&a, &b, Some(0)).is_some());
    }
}
