use serde::de::{self, Unexpected, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Name/value attribute table, ordered by name.
pub type Attributes = BTreeMap<String, AttrValue>;

/// Element type of an array variable. Values are stored little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Signed 8-bit integer
    Int8,
    /// Signed 16-bit integer
    Int16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Unsigned 32-bit integer
    UInt32,
    /// Unsigned 64-bit integer
    UInt64,
    /// IEEE 754 single precision
    Float32,
    /// IEEE 754 double precision
    Float64,
}

impl DataType {
    const ALL: [DataType; 10] = [
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::UInt8,
        DataType::UInt16,
        DataType::UInt32,
        DataType::UInt64,
        DataType::Float32,
        DataType::Float64,
    ];

    /// Size of one element in bytes.
    pub fn item_size(self) -> usize {
        match self {
            DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
            DataType::Int64 | DataType::UInt64 | DataType::Float64 => 8,
        }
    }

    /// Stable on-disk code.
    pub fn code(self) -> u8 {
        match self {
            DataType::Int8 => 1,
            DataType::Int16 => 2,
            DataType::Int32 => 3,
            DataType::Int64 => 4,
            DataType::UInt8 => 5,
            DataType::UInt16 => 6,
            DataType::UInt32 => 7,
            DataType::UInt64 => 8,
            DataType::Float32 => 9,
            DataType::Float64 => 10,
        }
    }

    /// Inverse of [`DataType::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|dt| dt.code() == code)
    }

    /// Lower-case name, as used in index documents.
    pub fn name(self) -> &'static str {
        match self {
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }

    /// Reads element `idx` of a decoded little-endian buffer as `f64`.
    ///
    /// 64-bit integers beyond 2^53 lose precision.
    pub fn value_at(self, buf: &[u8], idx: usize) -> Option<f64> {
        let size = self.item_size();
        let start = idx.checked_mul(size)?;
        let raw = buf.get(start..start.checked_add(size)?)?;
        let v = match self {
            DataType::Int8 => raw[0] as i8 as f64,
            DataType::UInt8 => raw[0] as f64,
            DataType::Int16 => i16::from_le_bytes(raw.try_into().ok()?) as f64,
            DataType::UInt16 => u16::from_le_bytes(raw.try_into().ok()?) as f64,
            DataType::Int32 => i32::from_le_bytes(raw.try_into().ok()?) as f64,
            DataType::UInt32 => u32::from_le_bytes(raw.try_into().ok()?) as f64,
            DataType::Float32 => f32::from_le_bytes(raw.try_into().ok()?) as f64,
            DataType::Int64 => i64::from_le_bytes(raw.try_into().ok()?) as f64,
            DataType::UInt64 => u64::from_le_bytes(raw.try_into().ok()?) as f64,
            DataType::Float64 => f64::from_le_bytes(raw.try_into().ok()?),
        };
        Some(v)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|dt| dt.name() == s)
            .ok_or_else(|| format!("unknown data type {s:?}"))
    }
}

/// Attribute value attached to a file or a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValue {
    /// Integer scalar
    Int(i64),
    /// Floating point scalar
    #[serde(with = "text_float")]
    Float(f64),
    /// UTF-8 text
    Text(String),
    /// Integer vector
    IntList(Vec<i64>),
    /// Floating point vector
    #[serde(with = "text_float_list")]
    FloatList(Vec<f64>),
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Int(v) => write!(f, "{v}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Text(v) => write!(f, "{v:?}"),
            AttrValue::IntList(v) => write!(f, "{v:?}"),
            AttrValue::FloatList(v) => write!(f, "{v:?}"),
        }
    }
}

/// `f64` for serde. Text formats get non-finite values as the strings
/// `"NaN"`, `"Infinity"` and `"-Infinity"`; binary formats get raw floats.
struct TextFloat(f64);

impl Serialize for TextFloat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let v = self.0;
        if !serializer.is_human_readable() || v.is_finite() {
            return serializer.serialize_f64(v);
        }
        serializer.serialize_str(if v.is_nan() {
            "NaN"
        } else if v > 0.0 {
            "Infinity"
        } else {
            "-Infinity"
        })
    }
}

impl<'de> Deserialize<'de> for TextFloat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if !deserializer.is_human_readable() {
            return f64::deserialize(deserializer).map(TextFloat);
        }
        deserializer.deserialize_any(TextFloatVisitor)
    }
}

struct TextFloatVisitor;

impl<'de> Visitor<'de> for TextFloatVisitor {
    type Value = TextFloat;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a number, \"NaN\", \"Infinity\" or \"-Infinity\"")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<TextFloat, E> {
        Ok(TextFloat(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<TextFloat, E> {
        Ok(TextFloat(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<TextFloat, E> {
        Ok(TextFloat(v as f64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<TextFloat, E> {
        match v {
            "NaN" => Ok(TextFloat(f64::NAN)),
            "Infinity" => Ok(TextFloat(f64::INFINITY)),
            "-Infinity" => Ok(TextFloat(f64::NEG_INFINITY)),
            _ => Err(E::invalid_value(Unexpected::Str(v), &self)),
        }
    }
}

mod text_float {
    use super::TextFloat;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(v: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        TextFloat(*v).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        TextFloat::deserialize(deserializer).map(|t| t.0)
    }
}

mod text_float_list {
    use super::TextFloat;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(v.iter().map(|x| TextFloat(*x)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<TextFloat>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|t| t.0).collect())
    }
}

/// One stage of a chunk's filter pipeline.
///
/// Stages are applied in order when writing and undone in reverse when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Filter {
    /// Byte transposition by element, improves compression of numeric data.
    Shuffle {
        /// Element width in bytes
        element_size: u32,
    },
    /// Zstandard compression.
    Zstd {
        /// Compression level used on write
        level: i32,
    },
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Shuffle { element_size } => write!(f, "shuffle({element_size})"),
            Filter::Zstd { level } => write!(f, "zstd({level})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_type_codes_and_names_are_stable() {
        for dt in DataType::ALL {
            assert_eq!(DataType::from_code(dt.code()), Some(dt));
            assert_eq!(dt.name().parse::<DataType>().unwrap(), dt);
        }
        assert_eq!(DataType::from_code(0), None);
        assert!("complex64".parse::<DataType>().is_err());
    }

    #[test]
    fn value_at_reads_little_endian() {
        let buf: Vec<u8> = [1.5f32, -2.0f32]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        assert_eq!(DataType::Float32.value_at(&buf, 1), Some(-2.0));
        assert_eq!(DataType::Float32.value_at(&buf, 2), None);
        assert_eq!(DataType::Int8.value_at(&[0xff], 0), Some(-1.0));
    }
}
