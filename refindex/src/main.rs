use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{Level, info};

use refindex_format::{
    BuildOptions, ChunkKey, CombinedIndex, MergeInput, builder::DEFAULT_INLINE_THRESHOLD,
    read_bundle, translate_path,
};

pub const PROGRESS_REPORT_INTERVAL_SECS: u64 = 3;
pub const ARCHIVE_EXTENSION: &str = "cha";
pub const BUNDLE_EXTENSION: &str = "bundle";
pub const DOCUMENT_EXTENSION: &str = "json";

mod build_all;
mod combine;
mod fetch;
mod inspect;
mod resolve;
mod synth;
mod translate;

// ----- CLI -----

#[derive(Parser)]
#[command(name = "refindex")]
#[command(about = "Build, combine and query chunk reference indexes over .cha archives")]
#[command(version)]
pub(crate) struct Cli {
    /// Worker threads for parallel index builds (0 = one per core)
    #[arg(long, default_value_t = 0, global = true)]
    pub(crate) threads: usize,

    /// Chunks stored in at most this many bytes are embedded in the index
    #[arg(long, default_value_t = DEFAULT_INLINE_THRESHOLD, global = true)]
    pub(crate) inline_threshold: u64,

    /// Skip inputs that fail to index instead of aborting the whole run
    #[arg(long, default_value_t = false, global = true)]
    pub(crate) skip_bad_files: bool,

    /// Log at debug level
    #[arg(long, default_value_t = false, global = true)]
    pub(crate) debug: bool,

    #[command(subcommand)]
    pub(crate) cmd: Cmd,
}

#[derive(Subcommand)]
pub(crate) enum Cmd {
    /// Index one archive and write it as a JSON document
    Translate {
        /// Archive to index
        input: PathBuf,

        /// Output document (defaults to stdout)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Merge archives, documents and bundles along one dimension
    Combine {
        /// Dimension the inputs are joined along
        #[arg(long)]
        concat_dim: String,

        /// Order inputs by this global attribute
        #[arg(long, conflicts_with = "sort_coord")]
        sort_attr: Option<String>,

        /// Order inputs by the first value of this (inlined) coordinate variable
        #[arg(long)]
        sort_coord: Option<String>,

        /// Output document
        #[arg(long)]
        out: PathBuf,

        /// Inputs: .cha archives, .json documents or .bundle files
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },

    /// Index every archive of a directory in parallel into one bundle
    BuildAll {
        /// Directory scanned for .cha archives
        #[arg(long)]
        input_dir: PathBuf,

        /// Output bundle
        #[arg(long)]
        out: PathBuf,
    },

    /// Print where one chunk lives
    Resolve {
        /// Archive, document or single-index bundle
        index: PathBuf,
        variable: String,
        /// Chunk coordinate, e.g. `3,0,0` (empty for scalars)
        coord: String,
    },

    /// Read and decode one chunk, printing its first values
    Fetch {
        /// Archive, document or single-index bundle
        index: PathBuf,
        variable: String,
        /// Chunk coordinate, e.g. `3,0,0` (empty for scalars)
        coord: String,

        /// Values to print
        #[arg(long, default_value_t = 8)]
        limit: usize,
    },

    /// Summarize an index per variable
    Inspect {
        /// Archive, document or single-index bundle
        index: PathBuf,
    },

    /// Write sample time-step archives
    Synth {
        /// Output directory
        #[arg(long)]
        out_dir: PathBuf,

        /// Number of archives
        #[arg(long, default_value_t = 3)]
        files: u64,

        /// Time steps per archive
        #[arg(long, default_value_t = 2)]
        steps: u64,
    },
}

impl Cli {
    pub(crate) fn build_options(&self) -> BuildOptions {
        BuildOptions {
            inline_threshold: self.inline_threshold,
        }
    }

    pub(crate) fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .context("build thread pool")
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    match &cli.cmd {
        Cmd::Translate { input, out } => translate::run(&cli, input, out.as_deref()),
        Cmd::Combine {
            concat_dim,
            sort_attr,
            sort_coord,
            out,
            inputs,
        } => combine::run(
            &cli,
            concat_dim,
            sort_attr.as_deref(),
            sort_coord.as_deref(),
            out,
            inputs,
        ),
        Cmd::BuildAll { input_dir, out } => build_all::run(&cli, input_dir, out),
        Cmd::Resolve {
            index,
            variable,
            coord,
        } => resolve::run(&cli, index, variable, coord),
        Cmd::Fetch {
            index,
            variable,
            coord,
            limit,
        } => fetch::run(&cli, index, variable, coord, *limit),
        Cmd::Inspect { index } => inspect::run(&cli, index),
        Cmd::Synth {
            out_dir,
            files,
            steps,
        } => synth::run(out_dir, *files, *steps),
    }
}

// ----- inputs -----

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Loads `path` as merge inputs: a document, every index of a bundle, or a
/// freshly built index of an archive.
pub(crate) fn load_inputs(path: &Path, options: &BuildOptions) -> Result<Vec<MergeInput>> {
    if has_extension(path, DOCUMENT_EXTENSION) {
        let index = CombinedIndex::read_json(path)
            .with_context(|| format!("read document {}", path.display()))?;
        Ok(vec![index.into()])
    } else if has_extension(path, BUNDLE_EXTENSION) {
        let files =
            read_bundle(path).with_context(|| format!("read bundle {}", path.display()))?;
        Ok(files.into_iter().map(MergeInput::from).collect())
    } else {
        let index = translate_path(path, options)
            .with_context(|| format!("index archive {}", path.display()))?;
        Ok(vec![index.into()])
    }
}

/// Loads `path` as one queryable index.
pub(crate) fn load_index(path: &Path, options: &BuildOptions) -> Result<CombinedIndex> {
    let mut inputs = load_inputs(path, options)?;
    if inputs.len() != 1 {
        anyhow::bail!(
            "{} holds {} indexes; combine them first",
            path.display(),
            inputs.len()
        );
    }
    Ok(match inputs.remove(0) {
        MergeInput::File(file) => file.into(),
        MergeInput::Combined(combined) => combined,
    })
}

/// Writes `index` to `out`, or pretty-prints it to stdout.
pub(crate) fn write_document(index: &CombinedIndex, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            index
                .write_json(path)
                .with_context(|| format!("write document {}", path.display()))?;
            info!("Wrote index document: {}", path.display());
        }
        None => println!("{}", index.to_json()?),
    }
    Ok(())
}

/// Parses `3,0,0` or `3.0.0`; the empty string is the scalar chunk.
pub(crate) fn parse_coord(text: &str) -> Result<Vec<u64>> {
    let key: ChunkKey = text
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(anyhow::Error::msg)?;
    Ok(key.coord().to_vec())
}

// ----- progress -----

/// Whole seconds as `1d 2h 3m 4s`, without leading zero units.
pub(crate) fn format_duration(seconds: f64) -> String {
    const UNITS: [(u64, &str); 4] = [(86_400, "d"), (3_600, "h"), (60, "m"), (1, "s")];

    let mut rest = seconds.max(0.0) as u64;
    let mut parts: Vec<String> = Vec::with_capacity(UNITS.len());
    for (size, suffix) in UNITS {
        let n = rest / size;
        rest %= size;
        if n > 0 || !parts.is_empty() || size == 1 {
            parts.push(format!("{n}{suffix}"));
        }
    }
    parts.join(" ")
}

pub(crate) struct ProgressTracker {
    start_time: Instant,
    last_report: Instant,
    files: u64,
    chunks: u64,
    report_interval: Duration,
    total_files: u64,
    phase: &'static str,
}

impl ProgressTracker {
    pub(crate) fn new(phase: &'static str, total_files: u64) -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_report: now,
            files: 0,
            chunks: 0,
            report_interval: Duration::from_secs(PROGRESS_REPORT_INTERVAL_SECS),
            total_files,
            phase,
        }
    }

    #[inline(always)]
    pub(crate) fn update(&mut self, files_delta: u64, chunks_delta: u64) {
        self.files += files_delta;
        self.chunks += chunks_delta;

        let now = Instant::now();
        if now.duration_since(self.last_report) >= self.report_interval {
            self.report();
            self.last_report = now;
        }
    }

    fn report(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return;
        }

        let files_per_sec = self.files as f64 / elapsed;
        let chunks_per_sec = self.chunks as f64 / elapsed;
        let progress_pct = if self.total_files > 0 {
            (self.files as f64 / self.total_files as f64) * 100.0
        } else {
            100.0
        };

        if files_per_sec > 0.0 {
            let remaining = self.total_files.saturating_sub(self.files);
            let eta_seconds = remaining as f64 / files_per_sec;
            info!(
                "[{}] progress={:.1}% ETA={} | files={}/{} ({:.1} file/s) chunks={} ({:.0} chunk/s) | elapsed={}",
                self.phase,
                progress_pct,
                format_duration(eta_seconds),
                self.files,
                self.total_files,
                files_per_sec,
                self.chunks,
                chunks_per_sec,
                format_duration(elapsed)
            );
        } else {
            info!(
                "[{}] files=0/{} | elapsed={}",
                self.phase,
                self.total_files,
                format_duration(elapsed)
            );
        }
    }

    pub(crate) fn final_report(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64().max(0.001);
        info!(
            "[{}] Complete: files={} chunks={} | {:.1} file/s, {:.0} chunk/s | elapsed={}",
            self.phase,
            self.files,
            self.chunks,
            self.files as f64 / elapsed,
            self.chunks as f64 / elapsed,
            format_duration(elapsed)
        );
    }
}
