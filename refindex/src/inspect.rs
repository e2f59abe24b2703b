use anyhow::Result;
use std::path::Path;

use crate::{Cli, load_index};

pub(crate) fn run(cli: &Cli, index_path: &Path) -> Result<()> {
    let index = load_index(index_path, &cli.build_options())?;
    let dataset = index.dataset();
    let provenance = index.provenance();

    println!("inputs={}", provenance.inputs);
    if let Some(dim) = &provenance.concat_dimension {
        println!("concat_dimension={}", dim);
    }
    for source in &provenance.sources {
        println!("source={}", source);
    }
    for (name, size) in &dataset.dimensions {
        println!("dimension {}={}", name, size);
    }
    for (name, value) in &dataset.attributes {
        println!("attribute {}={}", name, value);
    }
    println!();

    println!(
        "{:<16} {:<8} {:<20} {:<16} {:>8} {:>8} {:>14}",
        "variable", "dtype", "shape", "chunks", "stored", "inline", "bytes"
    );
    let mut total_chunks = 0;
    let mut total_bytes = 0;
    for (name, var) in &dataset.variables {
        let meta = &var.meta;
        let expected: u64 = meta.chunk_grid().iter().product();
        println!(
            "{:<16} {:<8} {:<20} {:<16} {:>8} {:>8} {:>14}",
            name,
            meta.dtype.to_string(),
            format!("{:?}", meta.shape),
            format!("{:?}", meta.chunk_shape),
            format!("{}/{}", var.chunks.len(), expected),
            var.inline_count(),
            var.stored_bytes()
        );
        total_chunks += var.chunks.len();
        total_bytes += var.stored_bytes();
    }
    println!();
    println!("chunks_total={}", total_chunks);
    println!("stored_bytes_total={}", total_bytes);
    Ok(())
}
