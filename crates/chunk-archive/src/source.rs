//! Random-access byte sources.
//!
//! The locator and the index builder only ever need three things from a file:
//! its length, and the ability to read an exact byte range.

use bytes::Bytes;
use memmap2::Mmap;
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};

/// Anything that can report its length and serve exact byte ranges.
pub trait ByteSource {
    /// Total length in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Fills `buf` with the bytes starting at `offset`.
    ///
    /// Fails with `UnexpectedEof` if the range extends past the end.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Reads `length` bytes starting at `offset` into a new buffer.
    fn read_range(&self, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        let len = usize::try_from(length).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("range length {length} does not fit in memory"),
            )
        })?;
        let mut buf = vec![0u8; len];
        self.read_exact_at(offset, &mut buf)?;
        Ok(buf)
    }
}

#[inline]
fn slice_range(data: &[u8], offset: u64, len: usize) -> io::Result<&[u8]> {
    let start = usize::try_from(offset).ok();
    let end = start.and_then(|s| s.checked_add(len));
    match (start, end) {
        (Some(start), Some(end)) if end <= data.len() => Ok(&data[start..end]),
        _ => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "range {offset}+{len} past end of {} byte source",
                data.len()
            ),
        )),
    }
}

impl ByteSource for [u8] {
    fn size(&self) -> io::Result<u64> {
        Ok(self.len() as u64)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        buf.copy_from_slice(slice_range(self, offset, buf.len())?);
        Ok(())
    }
}

impl ByteSource for Vec<u8> {
    fn size(&self) -> io::Result<u64> {
        self.as_slice().size()
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.as_slice().read_exact_at(offset, buf)
    }
}

impl ByteSource for Bytes {
    fn size(&self) -> io::Result<u64> {
        self.as_ref().size()
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.as_ref().read_exact_at(offset, buf)
    }
}

impl<T: ByteSource + ?Sized> ByteSource for &T {
    fn size(&self) -> io::Result<u64> {
        (**self).size()
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_exact_at(offset, buf)
    }
}

/// Read-only memory map of a local file.
pub struct MmapSource {
    path: PathBuf,
    map: Mmap,
}

impl MmapSource {
    /// Maps `path` read-only.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)
            .map_err(|e| io::Error::new(e.kind(), format!("open {}: {e}", path.display())))?;
        // SAFETY: the map is read-only; archives are not modified while indexed.
        let map = unsafe { Mmap::map(&file)? };
        Ok(Self {
            path: path.to_path_buf(),
            map,
        })
    }

    /// Path the map was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The mapped bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.map
    }
}

impl ByteSource for MmapSource {
    fn size(&self) -> io::Result<u64> {
        Ok(self.map.len() as u64)
    }

    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.as_bytes().read_exact_at(offset, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn slice_reads_are_bounds_checked() {
        let data = vec![1u8, 2, 3, 4];
        assert_eq!(data.read_range(1, 2).unwrap(), vec![2, 3]);
        assert_eq!(data.read_range(4, 0).unwrap(), Vec::<u8>::new());
        let err = data.read_range(3, 2).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        let err = data.read_range(u64::MAX, 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn mmap_source_serves_file_ranges() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello archive").unwrap();
        file.flush().unwrap();

        let src = MmapSource::open(file.path()).unwrap();
        assert_eq!(src.size().unwrap(), 13);
        assert_eq!(src.read_range(6, 7).unwrap(), b"archive");
    }
}
