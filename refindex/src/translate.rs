use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use refindex_format::{CombinedIndex, translate_path};

use crate::{Cli, write_document};

pub(crate) fn run(cli: &Cli, input: &Path, out: Option<&Path>) -> Result<()> {
    let opts = cli.build_options();
    let index = translate_path(input, &opts)
        .with_context(|| format!("Failed to index {}", input.display()))?;

    let dataset = index.dataset();
    let (chunks, inline) = dataset
        .variables
        .values()
        .fold((0, 0), |(c, i), v| (c + v.chunks.len(), i + v.inline_count()));
    info!(
        "Indexed {}: {} variable(s), {} chunk(s), {} inline (threshold {} B)",
        input.display(),
        dataset.variables.len(),
        chunks,
        inline,
        opts.inline_threshold
    );

    write_document(&CombinedIndex::from(index), out)
}
