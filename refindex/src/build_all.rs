use anyhow::{Context, Result};
use rayon::prelude::*;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
    time::Instant,
};
use tracing::{error, info, warn};

use refindex_format::{FileIndex, translate_path, write_bundle};

use crate::{ARCHIVE_EXTENSION, Cli, ProgressTracker, has_extension};

pub(crate) fn run(cli: &Cli, input_dir: &Path, out: &Path) -> Result<()> {
    info!(
        "Scanning input directory for archives: {}",
        input_dir.display()
    );

    if !input_dir.exists() {
        anyhow::bail!("Input directory not found: {}", input_dir.display());
    }

    let archives = discover_archives(input_dir)?;

    if archives.is_empty() {
        warn!("No .{} files found in {}", ARCHIVE_EXTENSION, input_dir.display());
        return Ok(());
    }

    info!("Found {} archive(s) to index", archives.len());

    let opts = cli.build_options();
    let pool = cli.thread_pool()?;
    let progress = Mutex::new(ProgressTracker::new("build-all", archives.len() as u64));
    let batch_start = Instant::now();

    let results: Vec<Result<FileIndex>> = pool.install(|| {
        archives
            .par_iter()
            .map(|path| {
                let result = translate_path(path, &opts)
                    .with_context(|| format!("Failed to index {}", path.display()));
                let chunks = result.as_ref().map(chunk_count).unwrap_or(0);
                if let Ok(mut p) = progress.lock() {
                    p.update(1, chunks);
                }
                result
            })
            .collect()
    });

    let mut indexes = Vec::with_capacity(results.len());
    let mut successful = 0;
    let mut failed = 0;

    for (path, result) in archives.iter().zip(results) {
        match result {
            Ok(index) => {
                info!("✓ Indexed {}", path.display());
                indexes.push(index);
                successful += 1;
            }
            Err(e) => {
                error!("✗ Failed to index {}: {:?}", path.display(), e);
                failed += 1;
            }
        }
    }

    if let Ok(p) = progress.lock() {
        p.final_report();
    }
    let batch_elapsed = batch_start.elapsed().as_secs_f64();

    info!("========================================");
    info!("Batch indexing complete!");
    info!("  Successful: {}", successful);
    info!("  Failed:     {}", failed);
    info!("  Total:      {}", successful + failed);
    info!(
        "  Time:       {:.1}s ({:.3}s per file avg)",
        batch_elapsed,
        batch_elapsed / archives.len() as f64
    );
    info!("========================================");

    if failed > 0 && !cli.skip_bad_files {
        anyhow::bail!("{} archive(s) failed to index", failed);
    }

    let written = write_bundle(out, &indexes)
        .with_context(|| format!("Failed to write bundle {}", out.display()))?;
    info!("Wrote {} index(es) to {}", written, out.display());

    Ok(())
}

fn chunk_count(index: &FileIndex) -> u64 {
    index
        .dataset()
        .variables
        .values()
        .map(|v| v.chunks.len() as u64)
        .sum()
}

fn discover_archives(input_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archives = Vec::new();

    let entries = fs::read_dir(input_dir)
        .with_context(|| format!("Failed to read directory: {}", input_dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();

        if path.is_file() && has_extension(&path, ARCHIVE_EXTENSION) {
            archives.push(path);
        }
    }

    archives.sort_unstable();
    Ok(archives)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_only_archives_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.cha", "a.cha", "notes.txt", "c.json"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("d.cha")).unwrap();

        let found = discover_archives(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .filter_map(|p| p.file_name()?.to_str())
            .collect();
        assert_eq!(names, vec!["a.cha", "b.cha"]);
    }
}
