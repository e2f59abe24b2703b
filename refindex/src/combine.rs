use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use refindex_format::{MergeInput, MergeOptions, SortKey, merge};

use crate::{Cli, load_inputs, write_document};

pub(crate) fn run(
    cli: &Cli,
    concat_dim: &str,
    sort_attr: Option<&str>,
    sort_coord: Option<&str>,
    out: &Path,
    paths: &[PathBuf],
) -> Result<()> {
    let opts = cli.build_options();
    let pool = cli.thread_pool()?;
    let start = Instant::now();

    // Archives are indexed in parallel; results keep input order.
    let loaded: Vec<(&PathBuf, Result<Vec<MergeInput>>)> = pool.install(|| {
        paths
            .par_iter()
            .map(|path| (path, load_inputs(path, &opts)))
            .collect()
    });

    let mut inputs = Vec::new();
    let mut skipped = 0usize;
    for (path, result) in loaded {
        match result {
            Ok(mut batch) => inputs.append(&mut batch),
            Err(e) if cli.skip_bad_files => {
                warn!("Skipping {}: {:?}", path.display(), e);
                skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }

    let mut options = MergeOptions::new(concat_dim);
    if let Some(attr) = sort_attr {
        options = options.sort_by(SortKey::Attribute(attr.to_string()));
    }
    if let Some(var) = sort_coord {
        options = options.sort_by(SortKey::Coordinate(var.to_string()));
    }

    info!(
        "Merging {} index(es) along {:?} ({} input(s) skipped)",
        inputs.len(),
        concat_dim,
        skipped
    );
    let combined = merge(inputs, &options)
        .with_context(|| format!("Failed to merge along {:?}", concat_dim))?;

    let dataset = combined.dataset();
    info!(
        "Combined {} source file(s): {}={} | {} variable(s) | {:.1}s",
        combined.provenance().sources.len(),
        concat_dim,
        dataset.dimensions.get(concat_dim).copied().unwrap_or_default(),
        dataset.variables.len(),
        start.elapsed().as_secs_f64()
    );

    write_document(&combined, Some(out))
}
