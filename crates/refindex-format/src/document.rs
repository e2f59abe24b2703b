//! Plaintext (JSON) index documents.
//!
//! ```json
//! {
//!   "version": 1,
//!   "provenance": { "inputs": 3, "concat_dimension": "t", "sources": ["..."] },
//!   "dataset": {
//!     "variables": {
//!       "temp": {
//!         "meta": { "dimensions": ["t", "x"], "shape": [3, 5], ... },
//!         "chunks": { "0.0": ["data/a.cha", 16, 4096], "1.0": "base64:KLUv/..." }
//!       }
//!     },
//!     "attributes": { ... },
//!     "dimensions": { "t": 3, "x": 5 }
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{IndexError, Result};
use crate::model::{CombinedIndex, Dataset, Provenance};

/// Version written into every document.
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Serialize)]
struct DocumentOut<'a> {
    version: u32,
    provenance: &'a Provenance,
    dataset: &'a Dataset,
}

#[derive(Deserialize)]
struct DocumentIn {
    version: u32,
    provenance: Provenance,
    dataset: Dataset,
}

impl DocumentIn {
    fn into_index(self) -> Result<CombinedIndex> {
        if self.version != DOCUMENT_VERSION {
            return Err(IndexError::UnsupportedVersion(self.version));
        }
        self.dataset.check()?;
        Ok(CombinedIndex::from_parts(self.dataset, self.provenance))
    }
}

impl CombinedIndex {
    fn document(&self) -> DocumentOut<'_> {
        DocumentOut {
            version: DOCUMENT_VERSION,
            provenance: self.provenance(),
            dataset: self.dataset(),
        }
    }

    /// Pretty-printed JSON document.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.document())?)
    }

    /// Parses a JSON document and checks the index invariants.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str::<DocumentIn>(text)?.into_index()
    }

    /// Writes the JSON document to `path`.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let mut w = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut w, &self.document())?;
        w.write_all(b"\n")?;
        w.flush()?;
        Ok(())
    }

    /// Reads a JSON document from `path`.
    pub fn read_json(path: &Path) -> Result<Self> {
        let r = BufReader::new(File::open(path)?);
        serde_json::from_reader::<_, DocumentIn>(r)?.into_index()
    }
}
