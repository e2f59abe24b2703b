//! Bundles: length-prefixed postcard frames of single-file indexes.
//!
//! Each frame is a `u32` little-endian payload length followed by one
//! postcard-encoded [`FileIndex`]. Bundles let the parallel build phase hand
//! its results to a later merge without going through JSON.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::model::FileIndex;

/// Writes frames to `W`.
pub struct IndexBundleWriter<W> {
    w: W,
}

impl<W: Write> IndexBundleWriter<W> {
    /// Wraps `w`.
    pub fn new(w: W) -> Self {
        Self { w }
    }

    /// Appends one frame.
    #[inline]
    pub fn write(&mut self, index: &FileIndex) -> Result<()> {
        let payload = postcard::to_allocvec(index)?;
        let len = u32::try_from(payload.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("index of {} too large for one frame", index.source()),
            )
        })?;
        self.w.write_all(&len.to_le_bytes())?;
        self.w.write_all(&payload)?;
        Ok(())
    }

    /// Flushes the inner writer.
    #[inline]
    pub fn flush(&mut self) -> Result<()> {
        self.w.flush()?;
        Ok(())
    }

    /// Returns the inner writer.
    #[inline]
    pub fn into_inner(self) -> W {
        self.w
    }
}

/// Reads frames from `R`.
pub struct IndexBundleReader<R> {
    r: R,
    buf: Vec<u8>,
}

impl<R: Read> IndexBundleReader<R> {
    /// Wraps `r`.
    pub fn new(r: R) -> Self {
        Self {
            r,
            buf: Vec::with_capacity(64 * 1024),
        }
    }

    /// Next index, or `None` at a clean end of stream.
    ///
    /// A stream that ends inside a frame is an error.
    pub fn read(&mut self) -> Result<Option<FileIndex>> {
        let mut lenb = [0u8; 4];
        let mut filled = 0;
        while filled < lenb.len() {
            match self.r.read(&mut lenb[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(IndexError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "bundle ends inside a frame length",
                    )))
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        let len = u32::from_le_bytes(lenb) as usize;
        self.buf.resize(len, 0);
        self.r.read_exact(&mut self.buf)?;

        let index: FileIndex = postcard::from_bytes(&self.buf)?;
        index.dataset().check()?;
        Ok(Some(index))
    }
}

impl<R: Read> Iterator for IndexBundleReader<R> {
    type Item = Result<FileIndex>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

/// Writes `indexes` as a bundle file.
pub fn write_bundle<'a, I>(path: &Path, indexes: I) -> Result<usize>
where
    I: IntoIterator<Item = &'a FileIndex>,
{
    let mut w = IndexBundleWriter::new(BufWriter::new(File::create(path)?));
    let mut n = 0;
    for index in indexes {
        w.write(index)?;
        n += 1;
    }
    w.flush()?;
    Ok(n)
}

/// Reads every index of a bundle file.
pub fn read_bundle(path: &Path) -> Result<Vec<FileIndex>> {
    IndexBundleReader::new(BufReader::new(File::open(path)?)).collect()
}
