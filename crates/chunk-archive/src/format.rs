//! Fixed-size framing around the chunk region and the directory.
//!
//! ```text
//! 0        8  signature      89 43 48 41 0D 0A 1A 0A
//! 8        1  version
//! 9        7  reserved (zero)
//! 16       …  chunk payloads
//! …        …  CBOR directory
//! end-24   8  directory offset (LE)
//! end-16   8  directory length (LE)
//! end-8    8  trailer signature "CHADIR\0\0"
//! ```

/// Leading signature of every archive.
pub const SIGNATURE: [u8; 8] = *b"\x89CHA\r\n\x1a\n";

/// Signature closing the trailer.
pub const TRAILER_SIGNATURE: [u8; 8] = *b"CHADIR\0\0";

/// Current format version.
pub const VERSION: u8 = 1;

/// Bytes before the first chunk payload.
pub const HEADER_LEN: u64 = 16;

/// Bytes after the directory.
pub const TRAILER_LEN: u64 = 24;

/// Encodes the fixed header.
pub fn encode_header() -> [u8; HEADER_LEN as usize] {
    let mut out = [0u8; HEADER_LEN as usize];
    out[..8].copy_from_slice(&SIGNATURE);
    out[8] = VERSION;
    out
}

/// Location of the directory as recorded in the trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    /// Absolute offset of the CBOR directory.
    pub directory_offset: u64,
    /// Length in bytes of the CBOR directory.
    pub directory_len: u64,
}

impl Trailer {
    /// Encodes the trailer.
    pub fn encode(&self) -> [u8; TRAILER_LEN as usize] {
        let mut out = [0u8; TRAILER_LEN as usize];
        out[..8].copy_from_slice(&self.directory_offset.to_le_bytes());
        out[8..16].copy_from_slice(&self.directory_len.to_le_bytes());
        out[16..].copy_from_slice(&TRAILER_SIGNATURE);
        out
    }

    /// Decodes a trailer, returning `None` when the trailer signature is absent.
    pub fn decode(buf: &[u8; TRAILER_LEN as usize]) -> Option<Self> {
        if buf[16..] != TRAILER_SIGNATURE {
            return None;
        }
        let mut word = [0u8; 8];
        word.copy_from_slice(&buf[..8]);
        let directory_offset = u64::from_le_bytes(word);
        word.copy_from_slice(&buf[8..16]);
        let directory_len = u64::from_le_bytes(word);
        Some(Self {
            directory_offset,
            directory_len,
        })
    }
}
