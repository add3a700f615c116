use crate::error::DataError;
use crate::types::{Chromosome, ReferenceTable};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Write a reference table as JSON.
pub fn save_reference(reference: &ReferenceTable, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create reference file: {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, reference)
        .with_context(|| format!("Failed to write reference table to {}", path.display()))?;
    writer.flush()?;
    Ok(())
}

/// Read a reference table written by [`save_reference`].
pub fn load_reference(path: &Path) -> Result<ReferenceTable> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open reference file: {}", path.display()))?;
    let reference: ReferenceTable = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse reference table from {}", path.display()))?;
    check_reference(&reference)?;
    Ok(reference)
}

fn check_reference(reference: &ReferenceTable) -> Result<(), DataError> {
    if !reference.cutoff.is_finite() {
        return Err(DataError::MalformedReference(format!(
            "cutoff is not finite ({})",
            reference.cutoff
        )));
    }
    let chroms = reference.lookup.chromosomes.len();
    if chroms != Chromosome::COUNT {
        return Err(DataError::MalformedReference(format!(
            "expected {} chromosomes, found {}",
            Chromosome::COUNT,
            chroms
        )));
    }
    Ok(())
}
