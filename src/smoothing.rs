use crate::statistics::trimmed_combined_z;
use rayon::prelude::*;

/// Smooth raw z-scores with a sliding window, operating per-chromosome.
///
/// For bin `i` the window covers `[i - window, i + window]`, clamped to the
/// chromosome. Missing scores are dropped, the single lowest and highest
/// remaining scores are trimmed, and the rest are combined as Σz / √k.
///
/// Returns one smoothed sequence per input chromosome, same lengths.
pub fn smooth_scores(raw: &[Vec<Option<f64>>], window: usize) -> Vec<Vec<Option<f64>>> {
    raw.par_iter()
        .map(|scores| smooth_chromosome(scores, window))
        .collect()
}

/// Smooth a single chromosome's scores.
pub fn smooth_chromosome(scores: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let n = scores.len();
    let mut buffer: Vec<f64> = Vec::with_capacity(2 * window + 1);

    (0..n)
        .map(|i| {
            let left = i.saturating_sub(window);
            let right = (i + window + 1).min(n);
            buffer.clear();
            buffer.extend(scores[left..right].iter().flatten());
            trimmed_combined_z(&mut buffer)
        })
        .collect()
}
