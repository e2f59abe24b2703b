//! CBOR encoding of the archive directory.

use minicbor::bytes::ByteVec;
use minicbor::{Decode, Encode};
use std::convert::Infallible;

use crate::schema::{AttrValue, Attributes, Filter};

#[derive(Debug, Clone, Default, Encode, Decode)]
#[cbor(map)]
pub(crate) struct Directory {
    #[n(0)]
    pub attributes: Vec<AttrEntry>,
    #[n(1)]
    pub dimensions: Vec<DimEntry>,
    #[n(2)]
    pub variables: Vec<VariableEntry>,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(array)]
pub(crate) struct AttrEntry {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub value: CborAttr,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(array)]
pub(crate) struct DimEntry {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub size: u64,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(map)]
pub(crate) struct VariableEntry {
    #[n(0)]
    pub name: String,
    #[n(1)]
    pub dimensions: Vec<String>,
    #[n(2)]
    pub shape: Vec<u64>,
    #[n(3)]
    pub chunk_shape: Vec<u64>,
    #[n(4)]
    pub dtype: u8,
    #[n(5)]
    pub fill_value: Option<ByteVec>,
    #[n(6)]
    pub filters: Vec<CborFilter>,
    #[n(7)]
    pub attributes: Vec<AttrEntry>,
    #[n(8)]
    pub chunks: Vec<ChunkEntry>,
}

#[derive(Debug, Clone, Encode, Decode)]
#[cbor(array)]
pub(crate) struct ChunkEntry {
    #[n(0)]
    pub coord: Vec<u64>,
    #[n(1)]
    pub offset: u64,
    #[n(2)]
    pub length: u64,
}

#[derive(Debug, Clone, Encode, Decode)]
pub(crate) enum CborAttr {
    #[n(0)]
    Int(#[n(0)] i64),
    #[n(1)]
    Float(#[n(0)] f64),
    #[n(2)]
    Text(#[n(0)] String),
    #[n(3)]
    IntList(#[n(0)] Vec<i64>),
    #[n(4)]
    FloatList(#[n(0)] Vec<f64>),
}

#[derive(Debug, Clone, Copy, Encode, Decode)]
pub(crate) enum CborFilter {
    #[n(0)]
    Shuffle(#[n(0)] u32),
    #[n(1)]
    Zstd(#[n(0)] i32),
}

impl From<&AttrValue> for CborAttr {
    fn from(v: &AttrValue) -> Self {
        match v {
            AttrValue::Int(v) => CborAttr::Int(*v),
            AttrValue::Float(v) => CborAttr::Float(*v),
            AttrValue::Text(v) => CborAttr::Text(v.clone()),
            AttrValue::IntList(v) => CborAttr::IntList(v.clone()),
            AttrValue::FloatList(v) => CborAttr::FloatList(v.clone()),
        }
    }
}

impl From<CborAttr> for AttrValue {
    fn from(v: CborAttr) -> Self {
        match v {
            CborAttr::Int(v) => AttrValue::Int(v),
            CborAttr::Float(v) => AttrValue::Float(v),
            CborAttr::Text(v) => AttrValue::Text(v),
            CborAttr::IntList(v) => AttrValue::IntList(v),
            CborAttr::FloatList(v) => AttrValue::FloatList(v),
        }
    }
}

impl From<Filter> for CborFilter {
    fn from(f: Filter) -> Self {
        match f {
            Filter::Shuffle { element_size } => CborFilter::Shuffle(element_size),
            Filter::Zstd { level } => CborFilter::Zstd(level),
        }
    }
}

impl From<CborFilter> for Filter {
    fn from(f: CborFilter) -> Self {
        match f {
            CborFilter::Shuffle(element_size) => Filter::Shuffle { element_size },
            CborFilter::Zstd(level) => Filter::Zstd { level },
        }
    }
}

pub(crate) fn attr_entries(attrs: &Attributes) -> Vec<AttrEntry> {
    attrs
        .iter()
        .map(|(name, value)| AttrEntry {
            name: name.clone(),
            value: value.into(),
        })
        .collect()
}

impl Directory {
    pub(crate) fn encode(&self) -> Result<Vec<u8>, minicbor::encode::Error<Infallible>> {
        minicbor::to_vec(self)
    }

    pub(crate) fn decode(buf: &[u8]) -> Result<Self, minicbor::decode::Error> {
        minicbor::decode(buf)
    }
}
