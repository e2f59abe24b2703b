use anyhow::{Context, Result};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};
use tracing::info;

use chunk_archive::{ArchiveWriter, AttrValue, DataType, Filter, VariableSpec};

const LAT: u64 = 4;
const LON: u64 = 6;

pub(crate) fn run(out_dir: &Path, files: u64, steps: u64) -> Result<()> {
    if steps == 0 {
        anyhow::bail!("--steps must be at least 1");
    }
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;

    for i in 0..files {
        let path = out_dir.join(format!("synth-{:03}.cha", i));
        let t0 = (i * steps) as f64;
        write_archive(&path, t0, steps)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {} (t={}..{})", path.display(), t0, t0 + steps as f64);
    }

    info!("Wrote {} archive(s) to {}", files, out_dir.display());
    Ok(())
}

fn le_bytes_f64(values: impl IntoIterator<Item = f64>) -> Vec<u8> {
    values.into_iter().flat_map(f64::to_le_bytes).collect()
}

fn le_bytes_f32(values: impl IntoIterator<Item = f32>) -> Vec<u8> {
    values.into_iter().flat_map(f32::to_le_bytes).collect()
}

/// One time-step file: `time(t)`, `temp(t, lat, lon)` and the invariant
/// `lat(lat)` / `lon(lon)` grid.
fn write_archive(path: &Path, t0: f64, steps: u64) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    let mut w = ArchiveWriter::new(file)?;

    w.set_attribute("title", "refindex synthetic time series");
    w.set_attribute("start", AttrValue::Float(t0));
    w.add_dimension("t", steps)?;
    w.add_dimension("lat", LAT)?;
    w.add_dimension("lon", LON)?;

    w.add_variable(
        VariableSpec::new("time", DataType::Float64, &["t"], &[steps], &[1])
            .with_attribute("units", "days since start"),
    )?;
    w.add_variable(
        VariableSpec::new(
            "temp",
            DataType::Float32,
            &["t", "lat", "lon"],
            &[steps, LAT, LON],
            &[1, LAT, LON],
        )
        .with_filters(vec![
            Filter::Shuffle { element_size: 4 },
            Filter::Zstd { level: 3 },
        ])
        .with_fill_value(f32::NAN.to_le_bytes().to_vec())
        .with_attribute("units", "K"),
    )?;
    w.add_variable(
        VariableSpec::new("lat", DataType::Float32, &["lat"], &[LAT], &[LAT])
            .with_attribute("units", "degrees_north"),
    )?;
    w.add_variable(
        VariableSpec::new("lon", DataType::Float32, &["lon"], &[LON], &[LON])
            .with_attribute("units", "degrees_east"),
    )?;

    for s in 0..steps {
        let t = t0 + s as f64;
        w.write_chunk("time", &[s], &le_bytes_f64([t]))?;

        let field = (0..LAT).flat_map(|y| {
            (0..LON).map(move |x| 273.15 + (t as f32) * 0.1 + y as f32 - 0.5 * x as f32)
        });
        w.write_chunk("temp", &[s, 0, 0], &le_bytes_f32(field))?;
    }
    w.write_chunk(
        "lat",
        &[0],
        &le_bytes_f32((0..LAT).map(|y| -45.0 + 30.0 * y as f32)),
    )?;
    w.write_chunk(
        "lon",
        &[0],
        &le_bytes_f32((0..LON).map(|x| 60.0 * x as f32)),
    )?;

    let mut file = w.finish()?;
    file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use refindex_format::{BuildOptions, MergeOptions, SortKey, merge, translate_path};

    #[test]
    fn synthetic_archives_index_and_combine() {
        let dir = tempfile::tempdir().unwrap();
        run(dir.path(), 3, 2).unwrap();

        let opts = BuildOptions::default();
        let mut files = Vec::new();
        for i in (0..3).rev() {
            let path = dir.path().join(format!("synth-{:03}.cha", i));
            files.push(translate_path(&path, &opts).unwrap());
        }
        let options = MergeOptions::new("t").sort_by(SortKey::Coordinate("time".to_string()));
        let combined = merge(files, &options).unwrap();

        assert_eq!(combined.dataset().dimensions["t"], 6);
        let temp = combined.dataset().variable("temp").unwrap();
        assert_eq!(temp.meta.shape, vec![6, LAT, LON]);
        assert_eq!(temp.chunks.len(), 6);
        assert!(combined.provenance().sources[0].ends_with("synth-000.cha"));
    }
}
