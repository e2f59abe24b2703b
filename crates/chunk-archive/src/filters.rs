//! Filter pipeline codecs.

use crate::schema::Filter;
use std::io;

/// Applies `filters` in order to a decoded chunk, producing the stored bytes.
pub fn encode_chunk(filters: &[Filter], data: &[u8]) -> io::Result<Vec<u8>> {
    let mut buf = data.to_vec();
    for filter in filters {
        buf = match *filter {
            Filter::Shuffle { element_size } => shuffle(&buf, element_size as usize),
            Filter::Zstd { level } => zstd::stream::encode_all(buf.as_slice(), level)?,
        };
    }
    Ok(buf)
}

/// Undoes `filters` in reverse order on stored chunk bytes.
pub fn decode_chunk(filters: &[Filter], raw: &[u8]) -> io::Result<Vec<u8>> {
    let mut buf = raw.to_vec();
    for filter in filters.iter().rev() {
        buf = match *filter {
            Filter::Shuffle { element_size } => unshuffle(&buf, element_size as usize),
            Filter::Zstd { .. } => zstd::stream::decode_all(buf.as_slice())?,
        };
    }
    Ok(buf)
}

/// Groups byte `j` of every element together. Trailing bytes that do not
/// form a whole element are copied unchanged.
fn shuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 {
        return data.to_vec();
    }
    let n = data.len() / element_size;
    let body = n * element_size;
    let mut out = vec![0u8; data.len()];
    for i in 0..n {
        for j in 0..element_size {
            out[j * n + i] = data[i * element_size + j];
        }
    }
    out[body..].copy_from_slice(&data[body..]);
    out
}

fn unshuffle(data: &[u8], element_size: usize) -> Vec<u8> {
    if element_size <= 1 {
        return data.to_vec();
    }
    let n = data.len() / element_size;
    let body = n * element_size;
    let mut out = vec![0u8; data.len()];
    for i in 0..n {
        for j in 0..element_size {
            out[i * element_size + j] = data[j * n + i];
        }
    }
    out[body..].copy_from_slice(&data[body..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle_transposes_bytes() {
        let data = [1, 2, 3, 4, 5, 6, 7];
        assert_eq!(shuffle(&data, 2), vec![1, 3, 5, 2, 4, 6, 7]);
        assert_eq!(unshuffle(&shuffle(&data, 2), 2), data.to_vec());
    }

    #[test]
    fn pipeline_undoes_in_reverse_order() {
        let values: Vec<u8> = (0..256u32).flat_map(|v| (v as f32).to_le_bytes()).collect();
        let filters = [
            Filter::Shuffle { element_size: 4 },
            Filter::Zstd { level: 3 },
        ];
        let stored = encode_chunk(&filters, &values).unwrap();
        assert!(stored.len() < values.len());
        assert_eq!(decode_chunk(&filters, &stored).unwrap(), values);
    }

    #[test]
    fn corrupt_zstd_payload_is_an_error() {
        assert!(decode_chunk(&[Filter::Zstd { level: 1 }], b"not zstd").is_err());
    }
}
