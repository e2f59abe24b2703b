//! Consumer side of the reader contract: turning a resolution into decoded
//! chunk bytes.

use chunk_archive::{decode_chunk, ByteSource, MmapSource};
use rustc_hash::FxHashMap;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::FetchError;
use crate::model::ArrayMeta;
use crate::reader::{Resolved, VirtualReader};

/// Serves byte ranges of sources named by their locator.
pub trait ChunkFetcher {
    /// Reads `length` bytes at `offset` from `locator`.
    fn fetch(&self, locator: &str, offset: u64, length: u64) -> io::Result<Vec<u8>>;
}

/// Fetcher for local paths (optionally `file://` prefixed). Each file is
/// memory-mapped once and kept open.
#[derive(Default)]
pub struct LocalFetcher {
    open: Mutex<FxHashMap<String, Arc<MmapSource>>>,
}

impl LocalFetcher {
    /// Fetcher with no files open.
    pub fn new() -> Self {
        Self::default()
    }

    fn source(&self, locator: &str) -> io::Result<Arc<MmapSource>> {
        if let Some(src) = self.cached(locator)? {
            return Ok(src);
        }

        let path = match locator.split_once("://") {
            None => locator,
            Some(("file", rest)) => rest,
            Some((scheme, _)) => {
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("{scheme}:// locators need a remote fetcher: {locator}"),
                ))
            }
        };
        // Opened without the lock held.
        let src = Arc::new(MmapSource::open(Path::new(path))?);

        let mut open = self
            .open
            .lock()
            .map_err(|_| io::Error::other("fetcher cache lock poisoned"))?;
        Ok(open.entry(locator.to_string()).or_insert(src).clone())
    }

    fn cached(&self, locator: &str) -> io::Result<Option<Arc<MmapSource>>> {
        let open = self
            .open
            .lock()
            .map_err(|_| io::Error::other("fetcher cache lock poisoned"))?;
        Ok(open.get(locator).cloned())
    }
}

impl ChunkFetcher for LocalFetcher {
    fn fetch(&self, locator: &str, offset: u64, length: u64) -> io::Result<Vec<u8>> {
        self.source(locator)?.read_range(offset, length)
    }
}

/// Resolves, fetches and decodes one chunk.
///
/// Returns `Ok(None)` for a grid position that holds no chunk; callers fill it
/// with [`fill_chunk`].
pub fn read_chunk<F: ChunkFetcher + ?Sized>(
    reader: &VirtualReader<'_>,
    fetcher: &F,
    variable: &str,
    coord: &[u64],
) -> Result<Option<Vec<u8>>, FetchError> {
    let meta = &reader.variable(variable)?.meta;
    let raw = match reader.resolve_or_missing(variable, coord)? {
        None => return Ok(None),
        Some(Resolved::Inline(bytes)) => bytes.to_vec(),
        Some(Resolved::Range(range)) => fetcher.fetch(range.locator, range.offset, range.length)?,
    };
    Ok(Some(decode_chunk(&meta.filters, &raw)?))
}

/// A full decoded chunk holding only the fill value (zeros without one).
pub fn fill_chunk(meta: &ArrayMeta) -> Result<Vec<u8>, FetchError> {
    let too_large = || FetchError::ChunkTooLarge {
        chunk_shape: meta.chunk_shape.clone(),
    };
    let elements = meta
        .chunk_len()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(too_large)?;
    let item_size = match &meta.fill_value {
        Some(fill) => fill.len(),
        None => meta.dtype.item_size(),
    };
    elements.checked_mul(item_size).ok_or_else(too_large)?;

    Ok(match &meta.fill_value {
        Some(fill) => fill.repeat(elements),
        None => vec![0u8; elements * item_size],
    })
}
