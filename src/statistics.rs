use statrs::statistics::Statistics;

/// Distance between two bins across a reference population.
///
/// `a[s]` and `b[s]` are sample `s`'s values at the two bins:
///
///   distance = Σ_s (a[s] - b[s])²
///
/// With `ignore_top_k > 0` the `ignore_top_k` largest squared differences
/// are left out of the sum, so a few samples carrying a real aberration at
/// one of the bins do not dominate. `scratch` is reused between calls.
pub fn population_distance(a: &[f64], b: &[f64], ignore_top_k: usize, scratch: &mut Vec<f64>) -> f64 {
    debug_assert_eq!(a.len(), b.len());

    if ignore_top_k == 0 {
        return a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    }

    scratch.clear();
    scratch.extend(a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)));
    let keep = scratch.len().saturating_sub(ignore_top_k);
    if keep == 0 {
        return 0.0;
    }
    scratch.select_nth_unstable_by(keep - 1, |x, y| x.total_cmp(y));
    scratch[..keep].iter().sum()
}

/// Mean and population standard deviation (`ddof = 0`).
///
/// Returns `None` for an empty slice.
pub fn mean_and_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.is_empty() {
        return None;
    }
    Some((values.iter().mean(), values.iter().population_std_dev()))
}

/// Z-score of `value` against a reference distribution.
///
/// A reference with zero spread carries no evidence of deviation, so the
/// score is 0. An empty reference has no score.
pub fn z_score(value: f64, reference: &[f64]) -> Option<f64> {
    let (mean, std) = mean_and_std(reference)?;
    if std == 0.0 {
        return Some(0.0);
    }
    Some((value - mean) / std)
}

/// Combine approximately standard-normal scores into one: Σz / √k.
///
/// The single smallest and largest values are trimmed first. `values` is
/// sorted in place. Returns `None` if nothing is left after trimming.
pub fn trimmed_combined_z(values: &mut [f64]) -> Option<f64> {
    if values.len() <= 2 {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let kept = &values[1..values.len() - 1];
    Some(kept.iter().sum::<f64>() / (kept.len() as f64).sqrt())
}
