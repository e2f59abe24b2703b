//! Chunk keys and chunk references.

use base64::{engine::general_purpose, Engine as _};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

/// Prefix marking an inline payload in text documents.
pub const INLINE_PREFIX: &str = "base64:";

/// Position of a chunk in its variable's chunk grid.
///
/// Rendered as dot-separated indices (`"0.3.1"`); a zero-rank variable's only
/// chunk has the empty key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChunkKey(Vec<u64>);

impl ChunkKey {
    /// Wraps a grid coordinate.
    pub fn new(coord: Vec<u64>) -> Self {
        Self(coord)
    }

    /// The origin chunk of a rank-`rank` grid.
    pub fn origin(rank: usize) -> Self {
        Self(vec![0; rank])
    }

    /// Grid coordinate.
    pub fn coord(&self) -> &[u64] {
        &self.0
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Same key moved `by` positions along `axis`.
    pub fn shifted(&self, axis: usize, by: u64) -> Self {
        let mut coord = self.0.clone();
        coord[axis] += by;
        Self(coord)
    }
}

impl From<Vec<u64>> for ChunkKey {
    fn from(coord: Vec<u64>) -> Self {
        Self(coord)
    }
}

impl From<&[u64]> for ChunkKey {
    fn from(coord: &[u64]) -> Self {
        Self(coord.to_vec())
    }
}

impl Borrow<[u64]> for ChunkKey {
    fn borrow(&self) -> &[u64] {
        &self.0
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, c) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{c}")?;
        }
        Ok(())
    }
}

impl FromStr for ChunkKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Self::default());
        }
        s.split('.')
            .map(|part| {
                part.parse::<u64>()
                    .map_err(|e| format!("bad chunk key {s:?}: {e}"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Serialize for ChunkKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ChunkKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// Where the bytes of one chunk live.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChunkRef {
    /// Stored (still filtered) bytes embedded in the index.
    Inline(Vec<u8>),
    /// Byte range within a source file.
    Range {
        /// Source locator: local path or URL
        path: String,
        /// Absolute offset
        offset: u64,
        /// Stored length
        length: u64,
    },
}

impl ChunkRef {
    /// Byte-range reference.
    pub fn range(path: &str, offset: u64, length: u64) -> Self {
        ChunkRef::Range {
            path: path.to_string(),
            offset,
            length,
        }
    }

    /// Whether the payload is embedded.
    pub fn is_inline(&self) -> bool {
        matches!(self, ChunkRef::Inline(_))
    }

    /// Number of stored bytes the reference stands for.
    pub fn stored_len(&self) -> u64 {
        match self {
            ChunkRef::Inline(bytes) => bytes.len() as u64,
            ChunkRef::Range { length, .. } => *length,
        }
    }
}

// Text documents: `"base64:<payload>"` or `[path, offset, length]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TextRef {
    Range(String, u64, u64),
    Inline(String),
}

// Binary encodings cannot use untagged enums.
#[derive(Serialize)]
#[serde(rename = "ChunkRef")]
enum BinaryRefOut<'a> {
    Inline(&'a [u8]),
    Range(&'a str, u64, u64),
}

#[derive(Deserialize)]
#[serde(rename = "ChunkRef")]
enum BinaryRefIn {
    Inline(Vec<u8>),
    Range(String, u64, u64),
}

impl Serialize for ChunkRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            match self {
                ChunkRef::Inline(bytes) => serializer.collect_str(&format_args!(
                    "{INLINE_PREFIX}{}",
                    general_purpose::STANDARD.encode(bytes)
                )),
                ChunkRef::Range {
                    path,
                    offset,
                    length,
                } => (path, offset, length).serialize(serializer),
            }
        } else {
            match self {
                ChunkRef::Inline(bytes) => BinaryRefOut::Inline(bytes),
                ChunkRef::Range {
                    path,
                    offset,
                    length,
                } => BinaryRefOut::Range(path, *offset, *length),
            }
            .serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for ChunkRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            match TextRef::deserialize(deserializer)? {
                TextRef::Range(path, offset, length) => Ok(ChunkRef::Range {
                    path,
                    offset,
                    length,
                }),
                TextRef::Inline(text) => {
                    let payload = text.strip_prefix(INLINE_PREFIX).ok_or_else(|| {
                        D::Error::custom(format!(
                            "inline chunk must start with {INLINE_PREFIX:?}"
                        ))
                    })?;
                    general_purpose::STANDARD
                        .decode(payload)
                        .map(ChunkRef::Inline)
                        .map_err(D::Error::custom)
                }
            }
        } else {
            Ok(match BinaryRefIn::deserialize(deserializer)? {
                BinaryRefIn::Inline(bytes) => ChunkRef::Inline(bytes),
                BinaryRefIn::Range(path, offset, length) => ChunkRef::Range {
                    path,
                    offset,
                    length,
                },
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_keys_render_dot_separated() {
        let key = ChunkKey::new(vec![0, 12, 3]);
        assert_eq!(key.to_string(), "0.12.3");
        assert_eq!("0.12.3".parse::<ChunkKey>().unwrap(), key);
        assert_eq!("".parse::<ChunkKey>().unwrap().rank(), 0);
        assert!("1..2".parse::<ChunkKey>().is_err());
        assert!("a".parse::<ChunkKey>().is_err());
    }

    #[test]
    fn shifted_moves_one_axis() {
        let key = ChunkKey::new(vec![2, 1]);
        assert_eq!(key.shifted(0, 5).coord(), &[7, 1]);
    }

    #[test]
    fn text_form_matches_reference_layout() {
        let range = ChunkRef::range("s3://bucket/a.cha", 16, 400);
        assert_eq!(
            serde_json::to_string(&range).unwrap(),
            r#"["s3://bucket/a.cha",16,400]"#
        );
        let inline = ChunkRef::Inline(b"hi".to_vec());
        assert_eq!(serde_json::to_string(&inline).unwrap(), r#""base64:aGk=""#);

        let back: ChunkRef = serde_json::from_str(r#""base64:aGk=""#).unwrap();
        assert_eq!(back, inline);
        assert!(serde_json::from_str::<ChunkRef>(r#""aGk=""#).is_err());
    }

    #[test]
    fn binary_form_survives_postcard() {
        for r in [
            ChunkRef::Inline(vec![0, 1, 2]),
            ChunkRef::range("data/a.cha", 1 << 40, 7),
        ] {
            let bytes = postcard::to_allocvec(&r).unwrap();
            assert_eq!(postcard::from_bytes::<ChunkRef>(&bytes).unwrap(), r);
        }
    }
}
