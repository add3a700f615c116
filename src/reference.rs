//! Reference table construction.
//!
//! For every bin of every chromosome, the reference population is searched
//! for the bins on *other* chromosomes that behave most alike across all
//! samples. Those bins later serve as the within-sample reference when a
//! test sample is scored.
//!
//! Building happens in three steps:
//! 1. [`build_candidate_table`]: rank and de-cluster candidates per target bin
//! 2. [`calibrate_cutoff`]: derive a global distance cutoff from the best matches
//! 3. [`prune_by_cutoff`]: drop every candidate at or above the cutoff

use crate::config::BuildConfig;
use crate::error::{ConfigError, DataError};
use crate::statistics::{mean_and_std, population_distance};
use crate::types::{BinId, CandidateTable, Chromosome, ReferenceCandidate, ReferenceTable, Sample};
use anyhow::Result;
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Population values transposed to bin-major order.
///
/// A bin holds `Some(values)` (one value per sample) only if every sample
/// has a present, non-zero value there. Zero marks an uncovered bin, so a
/// single unusable sample disqualifies the bin for every pairing.
pub struct PopulationMatrix {
    bins: Vec<Vec<Option<Vec<f64>>>>,
}

impl PopulationMatrix {
    pub fn new(samples: &[Sample]) -> Self {
        let bins = Chromosome::all()
            .map(|chrom| {
                (0..shared_len(samples, chrom))
                    .map(|bin| {
                        samples
                            .iter()
                            .map(|s| s.values(chrom)[bin].filter(|&v| v != 0.0))
                            .collect::<Option<Vec<f64>>>()
                    })
                    .collect()
            })
            .collect();
        Self { bins }
    }

    /// Number of bins covered by every sample on `chrom`.
    pub fn len(&self, chrom: Chromosome) -> usize {
        self.bins[chrom.index()].len()
    }

    pub fn values(&self, id: BinId) -> Option<&[f64]> {
        self.bins[id.chrom.index()]
            .get(id.bin)
            .and_then(|v| v.as_deref())
    }

    /// Distance between two bins, or `None` when either is unusable.
    pub fn distance(&self, a: BinId, b: BinId, ignore_top_k: usize, scratch: &mut Vec<f64>) -> Option<f64> {
        let va = self.values(a)?;
        let vb = self.values(b)?;
        Some(population_distance(va, vb, ignore_top_k, scratch))
    }
}

/// Bins present in every sample on `chrom`.
fn shared_len(samples: &[Sample], chrom: Chromosome) -> usize {
    samples
        .iter()
        .map(|s| s.values(chrom).len())
        .min()
        .unwrap_or(0)
}

/// Rank, trim and de-cluster reference candidates for every bin of every chromosome.
///
/// Fails if the population cannot support a distance (fewer than two
/// samples, or more ignored differences than samples).
pub fn build_candidate_table(
    samples: &[Sample],
    config: &BuildConfig,
    progress: Option<&ProgressBar>,
) -> Result<CandidateTable, ConfigError> {
    config.validate_population(samples.len())?;

    let matrix = PopulationMatrix::new(samples);
    let lengths: Vec<usize> = Chromosome::all().map(|c| matrix.len(c)).collect();
    let mut table = CandidateTable::new();

    for target_chrom in Chromosome::all() {
        if let Some(pb) = progress {
            pb.set_message(format!("chromosome {}", target_chrom));
        }
        let targets: Vec<Vec<ReferenceCandidate>> = (0..matrix.len(target_chrom))
            .into_par_iter()
            .map_init(Vec::new, |scratch, bin| {
                let target = BinId::new(target_chrom, bin);
                let ranked = rank_candidates(&matrix, target, config, scratch);
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                decluster(&ranked, &lengths, config.max_candidates_final)
            })
            .collect();
        table.set_targets(target_chrom, targets);
    }

    Ok(table)
}

/// Total number of target bins the builder will visit; sizes a progress bar.
pub fn count_targets(samples: &[Sample]) -> u64 {
    Chromosome::all()
        .map(|chrom| shared_len(samples, chrom) as u64)
        .sum()
}

/// Ascending order by distance, ties broken by chromosome then bin.
fn compare_candidates(a: &ReferenceCandidate, b: &ReferenceCandidate) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then(a.chrom.cmp(&b.chrom))
        .then(a.bin.cmp(&b.bin))
}

/// All usable bins on other chromosomes, sorted by distance and cut to
/// `max_candidates_initial`.
fn rank_candidates(
    matrix: &PopulationMatrix,
    target: BinId,
    config: &BuildConfig,
    scratch: &mut Vec<f64>,
) -> Vec<ReferenceCandidate> {
    if matrix.values(target).is_none() {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for chrom in Chromosome::all().filter(|&c| c != target.chrom) {
        for bin in 0..matrix.len(chrom) {
            let id = BinId::new(chrom, bin);
            if let Some(distance) = matrix.distance(target, id, config.ignore_top_k, scratch) {
                candidates.push(ReferenceCandidate { chrom, bin, distance });
            }
        }
    }

    let keep = config.max_candidates_initial;
    if candidates.len() > keep {
        candidates.select_nth_unstable_by(keep - 1, compare_candidates);
        candidates.truncate(keep);
    }
    candidates.sort_by(compare_candidates);
    candidates
}

/// Accept candidates in rank order, skipping any that sit directly next to
/// an already accepted bin on the same chromosome.
///
/// `lengths[chrom.index()]` bounds each chromosome so a candidate in the
/// last bin never blocks a bin past the end.
pub fn decluster(
    ranked: &[ReferenceCandidate],
    lengths: &[usize],
    max_final: usize,
) -> Vec<ReferenceCandidate> {
    let mut blocked: HashSet<BinId> = HashSet::new();
    let mut accepted = Vec::with_capacity(max_final.min(ranked.len()));

    for candidate in ranked {
        if accepted.len() >= max_final {
            break;
        }
        if blocked.contains(&candidate.id()) {
            continue;
        }
        accepted.push(*candidate);

        let len = lengths[candidate.chrom.index()];
        blocked.insert(BinId::new(candidate.chrom, candidate.bin.saturating_sub(1)));
        if candidate.bin + 1 < len {
            blocked.insert(BinId::new(candidate.chrom, candidate.bin + 1));
        }
    }

    accepted
}

/// Iteratively derive the distance cutoff for trustworthy reference bins.
///
/// Each round takes the best candidate distance of every target bin that
/// lies below the current cutoff and sets the cutoff to mean + 3·sd of
/// those distances. Runs at most `rounds` rounds.
///
/// Only the first round can fail: if no best distance lies below `seed`
/// there is nothing to calibrate on. A later round that finds nothing
/// (all best distances equal, so sd was 0) keeps the current cutoff.
pub fn calibrate_cutoff(table: &CandidateTable, seed: f64, rounds: usize) -> Result<f64, DataError> {
    let mut cutoff = seed;
    for round in 1..=rounds {
        let best: Vec<f64> = table
            .iter_lists()
            .filter_map(|list| list.first())
            .map(|c| c.distance)
            .filter(|&d| d < cutoff)
            .collect();
        let Some((mean, std)) = mean_and_std(&best) else {
            if round == 1 {
                return Err(DataError::EmptyCalibration { cutoff, round });
            }
            break;
        };
        cutoff = mean + 3.0 * std;
    }
    Ok(cutoff)
}

/// Keep only candidates strictly below `cutoff`. Target positions are preserved.
pub fn prune_by_cutoff(table: &CandidateTable, cutoff: f64) -> CandidateTable {
    let chromosomes = table
        .chromosomes
        .iter()
        .map(|targets| {
            targets
                .iter()
                .map(|list| list.iter().filter(|c| c.distance < cutoff).copied().collect())
                .collect()
        })
        .collect();
    CandidateTable { chromosomes }
}

/// Full reference construction: candidates, cutoff calibration, pruning.
pub fn build_reference(
    samples: &[Sample],
    config: &BuildConfig,
    progress: Option<&ProgressBar>,
) -> Result<ReferenceTable> {
    let candidates = build_candidate_table(samples, config, progress)?;
    let cutoff = calibrate_cutoff(&candidates, config.cutoff_seed, config.cutoff_rounds)?;
    let lookup = prune_by_cutoff(&candidates, cutoff);
    Ok(ReferenceTable { cutoff, lookup })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const C1: Chromosome = Chromosome::autosome(1);
    const C2: Chromosome = Chromosome::autosome(2);
    const C3: Chromosome = Chromosome::autosome(3);

    fn sample(name: &str, chroms: Vec<(Chromosome, Vec<f64>)>) -> Sample {
        Sample::from_chromosomes(
            name,
            chroms
                .into_iter()
                .map(|(c, v)| (c, v.into_iter().map(Some).collect::<Vec<_>>())),
        )
    }

    fn candidate(chrom: Chromosome, bin: usize, distance: f64) -> ReferenceCandidate {
        ReferenceCandidate { chrom, bin, distance }
    }

    fn small_population() -> Vec<Sample> {
        vec![
            sample(
                "a",
                vec![
                    (C1, vec![1.0, 2.0, 3.0, 4.0]),
                    (C2, vec![1.1, 2.1, 0.0, 3.9]),
                    (C3, vec![2.0, 5.0, 3.0]),
                ],
            ),
            sample(
                "b",
                vec![
                    (C1, vec![1.5, 2.5, 3.5, 4.5]),
                    (C2, vec![1.4, 2.6, 3.4, 4.4]),
                    (C3, vec![2.5, 5.5, 3.5, 9.0]),
                ],
            ),
            sample(
                "c",
                vec![
                    (C1, vec![0.5, 1.5, 2.5, 3.5]),
                    (C2, vec![0.6, 1.4, 2.6, 3.6]),
                    (C3, vec![1.5, 4.5, 2.5]),
                ],
            ),
        ]
    }

    #[test]
    fn test_matrix_uses_shortest_sample() {
        let matrix = PopulationMatrix::new(&small_population());
        assert_eq!(matrix.len(C1), 4);
        assert_eq!(matrix.len(C3), 3);
        assert_eq!(matrix.len(Chromosome::X), 0);
    }

    #[test]
    fn test_zero_in_one_sample_disqualifies_bin() {
        let matrix = PopulationMatrix::new(&small_population());
        assert!(matrix.values(BinId::new(C2, 2)).is_none());
        let mut scratch = Vec::new();
        assert!(matrix
            .distance(BinId::new(C1, 0), BinId::new(C2, 2), 0, &mut scratch)
            .is_none());
        assert!(matrix
            .distance(BinId::new(C2, 2), BinId::new(C1, 0), 0, &mut scratch)
            .is_none());
    }

    #[test]
    fn test_missing_treated_like_zero() {
        let mut samples = small_population();
        samples[1] = Sample::from_chromosomes("b", vec![(C1, vec![None, Some(2.5), Some(3.5), Some(4.5)])]);
        let matrix = PopulationMatrix::new(&samples);
        assert!(matrix.values(BinId::new(C1, 0)).is_none());
        assert!(matrix.values(BinId::new(C1, 1)).is_some());
    }

    #[test]
    fn test_candidates_exclude_own_chromosome_and_are_sorted() {
        let config = BuildConfig {
            max_candidates_initial: 10,
            max_candidates_final: 10,
            ..BuildConfig::default()
        };
        let table = build_candidate_table(&small_population(), &config, None).unwrap();

        assert_eq!(table.targets(C1).len(), 4);
        assert_eq!(table.targets(C3).len(), 3);
        for chrom in [C1, C2, C3] {
            for list in table.targets(chrom) {
                assert!(list.iter().all(|c| c.chrom != chrom));
                assert!(list.windows(2).all(|w| w[0].distance <= w[1].distance));
            }
        }
        // the zero-valued bin never appears as a target or a candidate
        assert!(table.targets(C2)[2].is_empty());
        assert!(table
            .iter_lists()
            .flatten()
            .all(|c| !(c.chrom == C2 && c.bin == 2)));
    }

    #[test]
    fn test_best_candidate_distance() {
        let config = BuildConfig::default();
        let table = build_candidate_table(&small_population(), &config, None).unwrap();
        // C1 bin 0 vs C2 bin 0: (1.0-1.1)^2 + (1.5-1.4)^2 + (0.5-0.6)^2
        let best = table.targets(C1)[0][0];
        assert_eq!(best.id(), BinId::new(C2, 0));
        assert_relative_eq!(best.distance, 0.03, epsilon = 1e-10);
    }

    #[test]
    fn test_decluster_skips_neighbours() {
        let ranked = vec![
            candidate(C2, 5, 1.0),
            candidate(C2, 6, 1.5),
            candidate(C2, 4, 2.0),
            candidate(C3, 6, 2.5),
            candidate(C2, 7, 3.0),
        ];
        let lengths = vec![10; Chromosome::COUNT];
        let accepted = decluster(&ranked, &lengths, 10);
        let ids: Vec<BinId> = accepted.iter().map(|c| c.id()).collect();
        assert_eq!(
            ids,
            vec![BinId::new(C2, 5), BinId::new(C3, 6), BinId::new(C2, 7)]
        );
    }

    #[test]
    fn test_decluster_truncates() {
        let ranked: Vec<_> = (0..10).map(|i| candidate(C2, i * 3, i as f64)).collect();
        let lengths = vec![40; Chromosome::COUNT];
        assert_eq!(decluster(&ranked, &lengths, 4).len(), 4);
    }

    #[test]
    fn test_decluster_boundaries() {
        let ranked = vec![candidate(C2, 0, 1.0), candidate(C2, 9, 1.0), candidate(C2, 1, 2.0), candidate(C2, 8, 2.0)];
        let mut lengths = vec![0; Chromosome::COUNT];
        lengths[C2.index()] = 10;
        let accepted = decluster(&ranked, &lengths, 10);
        assert_eq!(accepted.len(), 2);
    }

    #[test]
    fn test_population_too_small() {
        let samples = vec![small_population().remove(0)];
        let err = build_candidate_table(&samples, &BuildConfig::default(), None).unwrap_err();
        assert_eq!(err, ConfigError::PopulationTooSmall(1));
    }

    fn table_with_best(distances: &[f64]) -> CandidateTable {
        let mut table = CandidateTable::new();
        let targets = distances
            .iter()
            .map(|&d| vec![candidate(C2, 0, d), candidate(C2, 2, d + 10.0)])
            .chain(std::iter::once(Vec::new()))
            .collect();
        table.set_targets(C1, targets);
        table
    }

    #[test]
    fn test_calibrate_cutoff() {
        let table = table_with_best(&[1.0, 2.0, 3.0, 100.0]);
        let cutoff = calibrate_cutoff(&table, 50.0, 2).unwrap();
        assert_relative_eq!(cutoff, 2.0 + 3.0 * (2.0f64 / 3.0).sqrt(), epsilon = 1e-10);
        assert_eq!(calibrate_cutoff(&table, 50.0, 2).unwrap(), cutoff);
    }

    #[test]
    fn test_calibrate_cutoff_nothing_below_seed() {
        let table = table_with_best(&[10.0, 20.0]);
        let err = calibrate_cutoff(&table, 5.0, 3).unwrap_err();
        assert_eq!(err, DataError::EmptyCalibration { cutoff: 5.0, round: 1 });
    }

    #[test]
    fn test_calibrate_cutoff_equal_best_distances() {
        // round 1 lands exactly on the shared distance, round 2 finds nothing below it
        let table = table_with_best(&[2.0, 2.0, 2.0]);
        assert_eq!(calibrate_cutoff(&table, 50.0, 3), Ok(2.0));
    }

    #[test]
    fn test_build_reference_with_uniform_distances() {
        let samples = vec![
            sample("a", vec![(C1, vec![1.0; 3]), (C2, vec![2.0; 3])]),
            sample("b", vec![(C1, vec![1.0; 3]), (C2, vec![2.0; 3])]),
        ];
        let reference = build_reference(&samples, &BuildConfig::default(), None).unwrap();
        assert_eq!(reference.cutoff, 2.0);
        assert_eq!(reference.lookup.targets(C1).len(), 3);
        assert_eq!(reference.lookup.total_candidates(), 0);
    }

    #[test]
    fn test_count_targets_matches_matrix() {
        let samples = small_population();
        let matrix = PopulationMatrix::new(&samples);
        let expected: usize = Chromosome::all().map(|c| matrix.len(c)).sum();
        assert_eq!(count_targets(&samples), expected as u64);
        assert_eq!(expected, 11);
    }

    #[test]
    fn test_prune_keeps_positions_and_is_idempotent() {
        let table = table_with_best(&[1.0, 2.0, 3.0]);
        let pruned = prune_by_cutoff(&table, 12.0);
        let lists = pruned.targets(C1);
        assert_eq!(lists.len(), 4);
        assert_eq!(lists[0].len(), 2);
        assert_eq!(lists[1].len(), 1);
        assert_eq!(lists[2].len(), 1);
        assert!(lists[3].is_empty());
        assert_eq!(prune_by_cutoff(&pruned, 12.0), pruned);
    }

    #[test]
    fn test_prune_is_strict() {
        let table = table_with_best(&[4.0]);
        let pruned = prune_by_cutoff(&table, 4.0);
        assert!(pruned.targets(C1)[0].is_empty());
    }

    #[test]
    fn test_build_reference_prunes_to_cutoff() {
        let config = BuildConfig {
            cutoff_rounds: 1,
            ..BuildConfig::default()
        };
        let reference = build_reference(&small_population(), &config, None).unwrap();
        assert!(reference.cutoff.is_finite());
        assert!(reference
            .lookup
            .iter_lists()
            .flatten()
            .all(|c| c.distance < reference.cutoff));
    }
}
