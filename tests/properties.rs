use proptest::prelude::*;
use wisecondor::config::BuildConfig;
use wisecondor::reference::{build_candidate_table, calibrate_cutoff, prune_by_cutoff, PopulationMatrix};
use wisecondor::smoothing::smooth_chromosome;
use wisecondor::types::{BinId, Chromosome, Sample};

const CHROMS: usize = 3;

/// Small populations over chromosomes 1..=3, with occasional zero (uncovered) bins.
fn population() -> impl Strategy<Value = Vec<Sample>> {
    (2usize..5, prop::collection::vec(1usize..9, CHROMS))
        .prop_flat_map(|(n, lens)| {
            let sample: Vec<_> = lens
                .iter()
                .map(|&len| {
                    prop::collection::vec(prop_oneof![1 => Just(0.0), 6 => 0.1f64..10.0], len)
                })
                .collect();
            prop::collection::vec(sample, n)
        })
        .prop_map(|samples| {
            samples
                .into_iter()
                .enumerate()
                .map(|(i, chroms)| {
                    Sample::from_chromosomes(
                        format!("s{}", i),
                        chroms.into_iter().enumerate().map(|(c, values)| {
                            (Chromosome::from_index(c), values.into_iter().map(Some).collect::<Vec<_>>())
                        }),
                    )
                })
                .collect()
        })
}

fn build_config() -> impl Strategy<Value = BuildConfig> {
    (1usize..20, 1usize..10).prop_map(|(initial, last)| BuildConfig {
        max_candidates_initial: initial,
        max_candidates_final: last,
        ..BuildConfig::default()
    })
}

fn all_bins(matrix: &PopulationMatrix) -> Vec<BinId> {
    Chromosome::all()
        .take(CHROMS)
        .flat_map(|c| (0..matrix.len(c)).map(move |b| BinId::new(c, b)))
        .collect()
}

proptest! {
    #[test]
    fn distance_is_symmetric(samples in population(), k in 0usize..2) {
        let matrix = PopulationMatrix::new(&samples);
        let bins = all_bins(&matrix);
        let mut scratch = Vec::new();
        for &a in &bins {
            for &b in &bins {
                let ab = matrix.distance(a, b, k, &mut scratch);
                let ba = matrix.distance(b, a, k, &mut scratch);
                prop_assert_eq!(ab.is_some(), ba.is_some());
                if let (Some(ab), Some(ba)) = (ab, ba) {
                    prop_assert!((ab - ba).abs() <= 1e-9 * ab.max(1.0));
                    prop_assert!(ab >= 0.0);
                }
            }
        }
    }

    #[test]
    fn candidate_lists_sorted_bounded_and_spread(samples in population(), config in build_config()) {
        let table = build_candidate_table(&samples, &config, None).unwrap();
        for chrom in Chromosome::all() {
            for list in table.targets(chrom) {
                prop_assert!(list.len() <= config.max_candidates_final);
                prop_assert!(list.windows(2).all(|w| w[0].distance <= w[1].distance));
                prop_assert!(list.iter().all(|c| c.chrom != chrom));
                for (i, a) in list.iter().enumerate() {
                    for b in &list[i + 1..] {
                        if a.chrom == b.chrom {
                            prop_assert!(a.bin.abs_diff(b.bin) > 1);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn calibration_is_reproducible(samples in population(), rounds in 1usize..5) {
        let table = build_candidate_table(&samples, &BuildConfig::default(), None).unwrap();
        let first = calibrate_cutoff(&table, 1_000.0, rounds).ok();
        let second = calibrate_cutoff(&table, 1_000.0, rounds).ok();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn pruning_is_idempotent(samples in population(), cutoff in 0.0f64..200.0) {
        let table = build_candidate_table(&samples, &BuildConfig::default(), None).unwrap();
        let once = prune_by_cutoff(&table, cutoff);
        let twice = prune_by_cutoff(&once, cutoff);
        prop_assert!(once.iter_lists().flatten().all(|c| c.distance < cutoff));
        prop_assert_eq!(
            once.chromosomes.iter().map(Vec::len).collect::<Vec<_>>(),
            table.chromosomes.iter().map(Vec::len).collect::<Vec<_>>()
        );
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn smoothing_uses_only_present_neighbours(
        scores in prop::collection::vec(prop::option::weighted(0.7, -6.0f64..6.0), 0..30),
        window in 1usize..5,
    ) {
        let smoothed = smooth_chromosome(&scores, window);
        prop_assert_eq!(smoothed.len(), scores.len());
        for (i, value) in smoothed.iter().enumerate() {
            let left = i.saturating_sub(window);
            let right = (i + window + 1).min(scores.len());
            let present = scores[left..right].iter().filter(|s| s.is_some()).count();
            prop_assert_eq!(value.is_some(), present > 2);
            if let Some(v) = value {
                prop_assert!(v.is_finite());
            }
        }
    }
}
