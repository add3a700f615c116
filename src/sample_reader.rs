use crate::types::{Chromosome, Sample};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Extension of per-sample measurement files.
pub const SAMPLE_EXTENSION: &str = "correct";

/// How to interpret a per-sample measurement file.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Zero-based column holding the measurement (or `NA`).
    pub value_column: usize,
    /// Female samples keep their X/Y values; otherwise they are doubled.
    pub female: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            value_column: 8,
            female: false,
        }
    }
}

pub(crate) fn tsv_reader(path: &Path) -> Result<csv::Reader<std::fs::File>> {
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open sample file: {}", path.display()))
}

/// Load one sample file.
///
/// The file is tab separated with a single header line. Column 0 holds the
/// chromosome label; the k-th row of a chromosome is its bin k.
pub fn load_sample(path: &Path, options: &ReadOptions) -> Result<Sample> {
    let mut rdr = tsv_reader(path)?;
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let mut sample = Sample::empty(name);

    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to parse row {} of {}", i + 1, path.display()))?;
        let (chrom, value) = parse_record(&record, i + 1, options)
            .with_context(|| format!("Invalid row in {}", path.display()))?;
        sample.push(chrom, value);
    }

    if sample.total_bins() == 0 {
        bail!("No bins found in {}", path.display());
    }
    Ok(sample)
}

/// Parse one row into its chromosome and (sex-corrected) value.
pub fn parse_record(record: &csv::StringRecord, row: usize, options: &ReadOptions) -> Result<(Chromosome, Option<f64>)> {
    let ctx = || format!("row {}", row);

    let chrom: Chromosome = record.get(0).with_context(ctx)?.trim().parse().with_context(ctx)?;
    let raw = record
        .get(options.value_column)
        .with_context(|| format!("row {}: missing value column {}", row, options.value_column))?
        .trim();

    let value = if raw == "NA" {
        None
    } else {
        let v: f64 = raw.parse().with_context(ctx)?;
        v.is_finite().then_some(v)
    };

    // Sex correction
    let value = match value {
        Some(v) if chrom.is_sex_chromosome() && !options.female => Some(v * 2.0),
        other => other,
    };
    Ok((chrom, value))
}

/// Sample files in `dir`, sorted by path.
pub fn list_sample_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == SAMPLE_EXTENSION))
        .collect();
    files.sort();
    Ok(files)
}

/// Samples loaded from a directory, plus the files that could not be used.
pub struct LoadedPopulation {
    pub samples: Vec<Sample>,
    pub skipped: Vec<(PathBuf, anyhow::Error)>,
}

/// Load every sample file in `dir`. A file that fails to load is recorded
/// in `skipped` and left out of the population.
pub fn load_population(dir: &Path, options: &ReadOptions) -> Result<LoadedPopulation> {
    let mut samples = Vec::new();
    let mut skipped = Vec::new();
    for path in list_sample_files(dir)? {
        match load_sample(&path, options) {
            Ok(sample) => samples.push(sample),
            Err(err) => skipped.push((path, err)),
        }
    }
    Ok(LoadedPopulation { samples, skipped })
}
