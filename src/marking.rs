//! Iterative outlier marking.
//!
//! Every bin is scored against the values the sample itself has at the
//! bin's reference bins. Bins that score as outliers are excluded from
//! everyone's reference in the next round, until the set of outliers stops
//! changing or the round limit is reached.

use crate::config::ScoreConfig;
use crate::error::ConfigError;
use crate::smoothing::smooth_scores;
use crate::statistics::z_score;
use crate::types::{BinId, Chromosome, ReferenceTable, Sample, ScoredSample};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::collections::BTreeSet;

/// Absolute z-score at which a bin is marked as an outlier.
pub const OUTLIER_THRESHOLD: f64 = 3.0;

/// Collect the sample's values at the usable reference bins of `target`.
///
/// Candidates are walked in ascending distance order. Marked bins and bins
/// without a value in this sample are skipped; the walk stops at the first
/// candidate beyond the reference cutoff or once `max_ref_bins` values are
/// collected. Returns `None` when fewer than `min_ref_bins` values were found.
pub fn gather_reference(
    sample: &Sample,
    reference: &ReferenceTable,
    target: BinId,
    marked: &BTreeSet<BinId>,
    config: &ScoreConfig,
) -> Option<Vec<f64>> {
    let candidates = reference.lookup.candidates(target)?;
    let mut values = Vec::with_capacity(config.max_ref_bins.min(candidates.len()));

    for candidate in candidates {
        // Sorted by distance, nothing further on is usable
        if candidate.distance > reference.cutoff {
            break;
        }
        if marked.contains(&candidate.id()) {
            continue;
        }
        let Some(value) = sample.value(candidate.id()) else {
            continue;
        };
        values.push(value);
        if values.len() >= config.max_ref_bins {
            break;
        }
    }

    (values.len() >= config.min_ref_bins).then_some(values)
}

/// Score every bin of the sample once, excluding `marked` bins from references.
pub fn score_round(
    sample: &Sample,
    reference: &ReferenceTable,
    marked: &BTreeSet<BinId>,
    config: &ScoreConfig,
) -> Vec<Vec<Option<f64>>> {
    Chromosome::all()
        .map(|chrom| {
            sample
                .values(chrom)
                .par_iter()
                .enumerate()
                .map(|(bin, value)| {
                    let value = (*value)?;
                    let values = gather_reference(sample, reference, BinId::new(chrom, bin), marked, config)?;
                    z_score(value, &values)
                })
                .collect()
        })
        .collect()
}

/// Bins whose score reaches the outlier threshold.
pub fn find_outliers(scores: &[Vec<Option<f64>>]) -> BTreeSet<BinId> {
    scores
        .iter()
        .enumerate()
        .flat_map(|(chrom_idx, chrom_scores)| {
            chrom_scores.iter().enumerate().filter_map(move |(bin, z)| match z {
                Some(z) if z.abs() >= OUTLIER_THRESHOLD => {
                    Some(BinId::new(Chromosome::from_index(chrom_idx), bin))
                }
                _ => None,
            })
        })
        .collect()
}

/// Result of the marking loop before smoothing.
#[derive(Debug, Clone)]
pub struct MarkingOutcome {
    /// Scores of the last executed round.
    pub scores: Vec<Vec<Option<f64>>>,
    /// Outliers found by the last executed round.
    pub marked: BTreeSet<BinId>,
    pub rounds: usize,
}

/// Repeat scoring rounds until the marked set is stable or `max_rounds` ran.
pub fn iterate_marking(
    sample: &Sample,
    reference: &ReferenceTable,
    config: &ScoreConfig,
    progress: Option<&ProgressBar>,
) -> MarkingOutcome {
    let mut previous: Option<BTreeSet<BinId>> = None;
    let mut marked = BTreeSet::new();
    let mut scores = vec![Vec::new(); Chromosome::COUNT];
    let mut rounds = 0;

    while previous.as_ref() != Some(&marked) && rounds < config.max_rounds {
        rounds += 1;
        if let Some(pb) = progress {
            pb.set_message(format!("round {}, {} bins marked", rounds, marked.len()));
            pb.inc(1);
        }
        // Score against the previous round's outliers, then re-mark
        scores = score_round(sample, reference, &marked, config);
        let outliers = find_outliers(&scores);
        previous = Some(std::mem::replace(&mut marked, outliers));
    }

    MarkingOutcome {
        scores,
        marked,
        rounds,
    }
}

/// Score a sample against a reference table: iterative marking, then smoothing.
pub fn mark_and_score(
    sample: &Sample,
    reference: &ReferenceTable,
    config: &ScoreConfig,
    progress: Option<&ProgressBar>,
) -> Result<ScoredSample, ConfigError> {
    config.validate()?;

    let outcome = iterate_marking(sample, reference, config, progress);
    let smoothed = smooth_scores(&outcome.scores, config.smoothing_window);

    Ok(ScoredSample {
        raw: outcome.scores,
        smoothed,
        rounds: outcome.rounds,
        marked: outcome.marked.len(),
    })
}
