use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DataError;

/// A chromosome scored by the tool: autosomes 1..22, then X and Y.
///
/// Holds the position in iteration order, so every value is a valid index
/// into per-chromosome vectors. Build one with [`Chromosome::autosome`],
/// the `X`/`Y` constants, [`Chromosome::from_index`] or by parsing a label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Chromosome(u8);

impl Chromosome {
    pub const COUNT: usize = 24;
    pub const X: Chromosome = Chromosome(22);
    pub const Y: Chromosome = Chromosome(23);

    /// Autosome `number` (1..=22). Panics on any other number.
    pub const fn autosome(number: u8) -> Chromosome {
        assert!(number >= 1 && number <= 22, "autosome number out of range");
        Chromosome(number - 1)
    }

    /// All chromosomes in iteration order.
    pub fn all() -> impl Iterator<Item = Chromosome> {
        (0..Self::COUNT as u8).map(Chromosome)
    }

    /// Position in iteration order, usable as an index into per-chromosome vectors.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Inverse of [`Chromosome::index`]. Panics on an index >= 24.
    pub fn from_index(index: usize) -> Chromosome {
        assert!(index < Self::COUNT, "chromosome index out of range: {}", index);
        Chromosome(index as u8)
    }

    pub fn is_sex_chromosome(self) -> bool {
        self.0 >= 22
    }
}

impl fmt::Display for Chromosome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Chromosome::X => write!(f, "X"),
            Chromosome::Y => write!(f, "Y"),
            Chromosome(index) => write!(f, "{}", index + 1),
        }
    }
}

impl FromStr for Chromosome {
    type Err = DataError;

    /// Accepts `chr7`, `7`, `chrX`, `x` and the like.
    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let bare = label
            .strip_prefix("chr")
            .or_else(|| label.strip_prefix("Chr"))
            .or_else(|| label.strip_prefix("CHR"))
            .unwrap_or(label);
        match bare {
            "X" | "x" => Ok(Chromosome::X),
            "Y" | "y" => Ok(Chromosome::Y),
            _ => match bare.parse::<u8>() {
                Ok(n) if (1..=22).contains(&n) => Ok(Chromosome::autosome(n)),
                _ => Err(DataError::UnknownChromosome(label.to_string())),
            },
        }
    }
}

impl TryFrom<String> for Chromosome {
    type Error = DataError;

    fn try_from(label: String) -> Result<Self, Self::Error> {
        label.parse()
    }
}

impl From<Chromosome> for String {
    fn from(chrom: Chromosome) -> String {
        chrom.to_string()
    }
}

/// Identity of a single bin, independent of any value attached to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BinId {
    pub chrom: Chromosome,
    pub bin: usize,
}

impl BinId {
    pub fn new(chrom: Chromosome, bin: usize) -> Self {
        Self { chrom, bin }
    }
}

/// Per-bin measurements of one sample, one sequence per chromosome.
/// `None` marks a missing ("NA") measurement.
#[derive(Debug, Clone)]
pub struct Sample {
    pub name: String,
    bins: Vec<Vec<Option<f64>>>,
}

impl Sample {
    /// Creates a sample with no bins on any chromosome.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bins: vec![Vec::new(); Chromosome::COUNT],
        }
    }

    /// Builds a sample from `(chromosome, values)` pairs; chromosomes not listed stay empty.
    pub fn from_chromosomes<I>(name: impl Into<String>, chroms: I) -> Self
    where
        I: IntoIterator<Item = (Chromosome, Vec<Option<f64>>)>,
    {
        let mut sample = Self::empty(name);
        for (chrom, values) in chroms {
            sample.bins[chrom.index()] = values;
        }
        sample
    }

    pub fn values(&self, chrom: Chromosome) -> &[Option<f64>] {
        &self.bins[chrom.index()]
    }

    pub fn value(&self, id: BinId) -> Option<f64> {
        self.bins[id.chrom.index()].get(id.bin).copied().flatten()
    }

    pub fn push(&mut self, chrom: Chromosome, value: Option<f64>) {
        self.bins[chrom.index()].push(value);
    }

    pub fn total_bins(&self) -> usize {
        self.bins.iter().map(Vec::len).sum()
    }
}

/// A candidate reference bin for some target bin, with its population distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCandidate {
    pub chrom: Chromosome,
    pub bin: usize,
    pub distance: f64,
}

impl ReferenceCandidate {
    pub fn id(&self) -> BinId {
        BinId::new(self.chrom, self.bin)
    }
}

/// Candidate lists indexed by target chromosome, then target bin.
/// Every list is sorted ascending by distance; empty lists keep their position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateTable {
    pub chromosomes: Vec<Vec<Vec<ReferenceCandidate>>>,
}

impl CandidateTable {
    pub fn new() -> Self {
        Self {
            chromosomes: vec![Vec::new(); Chromosome::COUNT],
        }
    }

    pub fn targets(&self, chrom: Chromosome) -> &[Vec<ReferenceCandidate>] {
        &self.chromosomes[chrom.index()]
    }

    /// Candidates for one target bin, or `None` past the end of the table.
    pub fn candidates(&self, id: BinId) -> Option<&[ReferenceCandidate]> {
        self.chromosomes
            .get(id.chrom.index())
            .and_then(|targets| targets.get(id.bin))
            .map(Vec::as_slice)
    }

    pub fn set_targets(&mut self, chrom: Chromosome, targets: Vec<Vec<ReferenceCandidate>>) {
        self.chromosomes[chrom.index()] = targets;
    }

    /// Iterates over every target list of every chromosome.
    pub fn iter_lists(&self) -> impl Iterator<Item = &Vec<ReferenceCandidate>> {
        self.chromosomes.iter().flatten()
    }

    pub fn total_candidates(&self) -> usize {
        self.iter_lists().map(Vec::len).sum()
    }
}

impl Default for CandidateTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Pruned lookup structure plus the calibrated cutoff it was pruned with.
/// This is the artifact handed from reference building to scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceTable {
    pub cutoff: f64,
    pub lookup: CandidateTable,
}

/// Raw and smoothed z-scores of a scored sample, aligned to its bins.
#[derive(Debug, Clone)]
pub struct ScoredSample {
    pub raw: Vec<Vec<Option<f64>>>,
    pub smoothed: Vec<Vec<Option<f64>>>,
    /// Number of marking rounds that were executed.
    pub rounds: usize,
    /// Bins marked as outliers by the last executed round.
    pub marked: usize,
}

impl ScoredSample {
    pub fn raw(&self, chrom: Chromosome) -> &[Option<f64>] {
        &self.raw[chrom.index()]
    }

    pub fn smoothed(&self, chrom: Chromosome) -> &[Option<f64>] {
        &self.smoothed[chrom.index()]
    }
}
