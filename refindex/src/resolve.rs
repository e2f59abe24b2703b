use anyhow::Result;
use std::path::Path;

use refindex_format::{Resolved, VirtualReader};

use crate::{Cli, load_index, parse_coord};

pub(crate) fn run(cli: &Cli, index_path: &Path, variable: &str, coord: &str) -> Result<()> {
    let index = load_index(index_path, &cli.build_options())?;
    let coord = parse_coord(coord)?;
    let reader = VirtualReader::new(&index);

    match reader.resolve_or_missing(variable, &coord)? {
        Some(Resolved::Inline(bytes)) => println!("inline {} byte(s)", bytes.len()),
        Some(Resolved::Range(range)) => println!(
            "range {} offset={} length={}",
            range.locator, range.offset, range.length
        ),
        None => println!("missing (reads as fill value)"),
    }
    Ok(())
}
