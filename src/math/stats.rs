//! Summary statistics: percentiles, weighted quantiles, histograms.

/// Arithmetic mean; `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation (population normalization, `ddof = 0`).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let var = values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / values.len() as f64;
    Some(var.sqrt())
}

/// Percentile `q ∈ [0, 100]` with linear interpolation between order statistics.
///
/// Non-finite values are ignored. Returns `NaN` when nothing finite remains.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    percentile_sorted(&sorted, q)
}

fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = (q.clamp(0.0, 100.0) / 100.0) * (n as f64 - 1.0);
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + frac * (sorted[hi] - sorted[lo])
}

/// Weighted quantiles `q ∈ [0, 1]` of `x`.
///
/// The CDF is built from the cumulative weights of the sorted samples excluding the last
/// one, normalized to end at 1, with a leading 0; quantiles are linearly interpolated on it.
/// With uniform weights this reduces to [`percentile`].
pub fn weighted_quantiles(x: &[f64], qs: &[f64], weights: &[f64]) -> Vec<f64> {
    let mut pairs: Vec<(f64, f64)> = x
        .iter()
        .zip(weights.iter())
        .filter(|(v, w)| v.is_finite() && w.is_finite() && **w >= 0.0)
        .map(|(&v, &w)| (v, w))
        .collect();
    if pairs.is_empty() {
        return vec![f64::NAN; qs.len()];
    }
    if pairs.len() == 1 {
        return vec![pairs[0].0; qs.len()];
    }
    pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    let mut cdf = Vec::with_capacity(pairs.len());
    cdf.push(0.0);
    let mut acc = 0.0;
    for &(_, w) in &pairs[..pairs.len() - 1] {
        acc += w;
        cdf.push(acc);
    }
    let total = acc;
    if !(total > 0.0) {
        let values: Vec<f64> = pairs.iter().map(|p| p.0).collect();
        return qs.iter().map(|&q| percentile_sorted(&values, q * 100.0)).collect();
    }
    for c in cdf.iter_mut().skip(1) {
        *c /= total;
    }
    let xs: Vec<f64> = pairs.iter().map(|p| p.0).collect();

    qs.iter()
        .map(|&q| {
            let q = q.clamp(0.0, 1.0);
            let pos = cdf.partition_point(|&c| c < q);
            if pos == 0 {
                return xs[0];
            }
            if pos >= cdf.len() {
                return xs[xs.len() - 1];
            }
            let (c0, c1) = (cdf[pos - 1], cdf[pos]);
            if c1 - c0 <= 0.0 {
                return xs[pos];
            }
            xs[pos - 1] + (q - c0) / (c1 - c0) * (xs[pos] - xs[pos - 1])
        })
        .collect()
}

/// Density-normalized histogram with `nbins` equal-width bins spanning the data range.
///
/// Returns `(density, edges)` with `edges.len() == nbins + 1`. The last bin is closed on
/// the right. A degenerate range is widened to `[min - 0.5, max + 0.5]`.
pub fn histogram_density(values: &[f64], nbins: usize) -> Option<(Vec<f64>, Vec<f64>)> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() || nbins == 0 {
        return None;
    }
    let mut lo = finite.iter().copied().fold(f64::INFINITY, f64::min);
    let mut hi = finite.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if hi <= lo {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / nbins as f64;
    let edges: Vec<f64> = (0..=nbins).map(|i| lo + width * i as f64).collect();

    let mut counts = vec![0usize; nbins];
    for v in &finite {
        let mut idx = ((v - lo) / width).floor() as isize;
        if idx >= nbins as isize {
            idx = nbins as isize - 1;
        }
        if idx < 0 {
            idx = 0;
        }
        counts[idx as usize] += 1;
    }
    let norm = finite.len() as f64 * width;
    let density = counts.into_iter().map(|c| c as f64 / norm).collect();
    Some((density, edges))
}

/// Bin centers from histogram edges.
pub fn bin_centers(edges: &[f64]) -> Vec<f64> {
    edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_matches_linear_method() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((percentile(&v, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile(&v, 0.0) - 1.0).abs() < 1e-12);
        assert!((percentile(&v, 100.0) - 4.0).abs() < 1e-12);
        // pos = 0.84 * 3 = 2.52
        assert!((percentile(&v, 84.0) - 3.52).abs() < 1e-12);
    }

    #[test]
    fn percentile_ignores_nan() {
        let v = [f64::NAN, 5.0, 1.0];
        assert!((percentile(&v, 50.0) - 3.0).abs() < 1e-12);
        assert!(percentile(&[f64::NAN], 50.0).is_nan());
    }

    #[test]
    fn uniform_weighted_quantile_matches_percentile() {
        let x = [3.0, 1.0, 4.0, 1.5, 9.0, 2.6];
        let w = [1.0; 6];
        let q = weighted_quantiles(&x, &[0.16, 0.5, 0.84], &w);
        assert!((q[0] - percentile(&x, 16.0)).abs() < 1e-12);
        assert!((q[1] - percentile(&x, 50.0)).abs() < 1e-12);
        assert!((q[2] - percentile(&x, 84.0)).abs() < 1e-12);
    }

    #[test]
    fn weighted_quantile_hand_computed() {
        // cdf = [0, 1/3, 1] over x = [0, 1, 2]
        let x = [2.0, 0.0, 1.0];
        let w = [1.0, 1.0, 2.0];
        let q = weighted_quantiles(&x, &[0.5], &w);
        assert!((q[0] - 1.25).abs() < 1e-12, "got {}", q[0]);
    }

    #[test]
    fn weighted_quantiles_are_ordered() {
        let x: Vec<f64> = (0..50).map(|i| ((i * 7919) % 101) as f64).collect();
        let w: Vec<f64> = (0..50).map(|i| 1.0 + (i % 5) as f64).collect();
        let q = weighted_quantiles(&x, &[0.16, 0.5, 0.84], &w);
        assert!(q[0] <= q[1] && q[1] <= q[2]);
    }

    #[test]
    fn histogram_density_integrates_to_one() {
        let v: Vec<f64> = (0..100).map(|i| (i as f64 * 0.37).sin()).collect();
        let (density, edges) = histogram_density(&v, 10).unwrap();
        assert_eq!(edges.len(), 11);
        let width = edges[1] - edges[0];
        let total: f64 = density.iter().map(|d| d * width).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn histogram_degenerate_range() {
        let (density, edges) = histogram_density(&[2.0, 2.0], 10).unwrap();
        assert!((edges[0] - 1.5).abs() < 1e-12);
        assert!((edges[10] - 2.5).abs() < 1e-12);
        assert_eq!(density.len(), 10);
    }
}
