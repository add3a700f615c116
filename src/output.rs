use crate::sample_reader::tsv_reader;
use crate::types::{Chromosome, ScoredSample};
use anyhow::{Context, Result};
use csv::WriterBuilder;
use std::path::Path;

fn format_score(score: Option<f64>) -> String {
    match score {
        Some(z) => format!("{:.6}", z),
        None => "NA".to_string(),
    }
}

/// Copy the sample file to `output`, appending `Z_score` and `sw_Z_score`
/// columns to the header and to every row.
///
/// Rows are matched to scores by chromosome and their order within it, the
/// same way the sample was loaded.
pub fn write_report(sample_path: &Path, scored: &ScoredSample, output: &Path) -> Result<()> {
    let mut rdr = tsv_reader(sample_path)?;
    let mut wtr = WriterBuilder::new()
        .delimiter(b'\t')
        .flexible(true)
        .from_path(output)
        .with_context(|| format!("Failed to create report: {}", output.display()))?;

    // Write header
    let mut header = rdr.headers()?.clone();
    header.push_field("Z_score");
    header.push_field("sw_Z_score");
    wtr.write_record(&header)?;

    // Write rows, matching each to its bin by per-chromosome position
    let mut next_bin = vec![0usize; Chromosome::COUNT];
    for (i, record) in rdr.records().enumerate() {
        let ctx = || format!("row {} of {}", i + 1, sample_path.display());
        let mut record = record.with_context(ctx)?;
        let chrom: Chromosome = record.get(0).with_context(ctx)?.trim().parse().with_context(ctx)?;

        let bin = next_bin[chrom.index()];
        next_bin[chrom.index()] += 1;
        let raw = scored.raw(chrom).get(bin).copied().flatten();
        let smoothed = scored.smoothed(chrom).get(bin).copied().flatten();

        record.push_field(&format_score(raw));
        record.push_field(&format_score(smoothed));
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}
