use anyhow::{Context, Result};
use std::path::Path;

use refindex_format::{LocalFetcher, VirtualReader, fill_chunk, read_chunk};

use crate::{Cli, load_index, parse_coord};

pub(crate) fn run(
    cli: &Cli,
    index_path: &Path,
    variable: &str,
    coord: &str,
    limit: usize,
) -> Result<()> {
    let index = load_index(index_path, &cli.build_options())?;
    let coord = parse_coord(coord)?;
    let reader = VirtualReader::new(&index);
    let meta = &reader.variable(variable)?.meta;

    let fetcher = LocalFetcher::new();
    let (bytes, filled) = match read_chunk(&reader, &fetcher, variable, &coord)
        .with_context(|| format!("Failed to read {}{:?}", variable, coord))?
    {
        Some(bytes) => (bytes, false),
        None => (fill_chunk(meta)?, true),
    };

    let item = meta.dtype.item_size();
    let elements = bytes.len() / item;
    let preview: Vec<String> = (0..elements.min(limit))
        .filter_map(|i| meta.dtype.value_at(&bytes, i))
        .map(|v| v.to_string())
        .collect();

    println!(
        "{}{:?} {} {} element(s){}: [{}{}]",
        variable,
        coord,
        meta.dtype,
        elements,
        if filled { " (fill)" } else { "" },
        preview.join(", "),
        if elements > limit { ", ..." } else { "" }
    );
    Ok(())
}
