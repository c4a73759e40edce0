//! Age-bin partitions of cosmic time.
//!
//! Bins are stored as `[lo, hi]` pairs in log10(years) of lookback time, ordered from the
//! youngest bin (index 0) to the oldest. Every constructor enforces:
//!
//! - `lo < hi` for each bin (strictly positive width in linear years)
//! - `hi_i == lo_{i+1}` (contiguous)

use serde::{Deserialize, Serialize};

use crate::error::SfhError;
use crate::math::Cosmology;

/// Fixed young bin edges (log10 yr): `[0, 30 Myr]`, `[30 Myr, 100 Myr]`.
pub const DEFAULT_FIXED_EDGES: [f64; 3] = [0.0, 7.4772, 8.0];

/// Start of the last bin as a fraction of the age of the universe.
pub const OLDEST_BIN_FRACTION: f64 = 0.85;

/// Lower edge of the flexible bins in [`ratios_to_agebins`] (years).
pub const FLEX_FIXED_TIME_YEARS: f64 = 5e7;

/// Absolute tolerance when checking contiguity of log edges.
const CONTIGUITY_TOL: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<[f64; 2]>", into = "Vec<[f64; 2]>")]
pub struct AgeBins {
    bins: Vec<[f64; 2]>,
}

impl AgeBins {
    /// Validate and wrap a list of `[lo, hi]` log10(yr) bins.
    pub fn new(bins: Vec<[f64; 2]>) -> Result<Self, SfhError> {
        if bins.is_empty() {
            return Err(SfhError::InvalidInput("age bins are empty".into()));
        }
        for (index, &[lo, hi]) in bins.iter().enumerate() {
            if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
                return Err(SfhError::NonMonotonicAgeBins { index, lo, hi });
            }
            let width = 10f64.powf(hi) - 10f64.powf(lo);
            if !(width.is_finite() && width > 0.0) {
                return Err(SfhError::NonMonotonicAgeBins { index, lo, hi });
            }
        }
        for (index, pair) in bins.windows(2).enumerate() {
            let hi = pair[0][1];
            let lo = pair[1][0];
            if (hi - lo).abs() > CONTIGUITY_TOL {
                return Err(SfhError::NonContiguousAgeBins {
                    index,
                    next: index + 1,
                    hi,
                    lo,
                });
            }
        }
        Ok(Self { bins })
    }

    /// Build bins from `N + 1` ascending log10(yr) edges.
    pub fn from_edges(edges: &[f64]) -> Result<Self, SfhError> {
        if edges.len() < 2 {
            return Err(SfhError::InvalidInput(format!(
                "need at least 2 bin edges, got {}",
                edges.len()
            )));
        }
        Self::new(edges.windows(2).map(|w| [w[0], w[1]]).collect())
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn bins(&self) -> &[[f64; 2]] {
        &self.bins
    }

    /// The `N + 1` log10(yr) edges.
    pub fn log_edges(&self) -> Vec<f64> {
        let mut out: Vec<f64> = self.bins.iter().map(|b| b[0]).collect();
        if let Some(last) = self.bins.last() {
            out.push(last[1]);
        }
        out
    }

    /// Bin widths `dt_i = 10^hi - 10^lo` in years.
    pub fn widths(&self) -> Vec<f64> {
        self.bins
            .iter()
            .map(|&[lo, hi]| 10f64.powf(hi) - 10f64.powf(lo))
            .collect()
    }

    /// Bin edges in linear years, `(lo, hi)` per bin.
    pub fn edges_years(&self) -> Vec<(f64, f64)> {
        self.bins
            .iter()
            .map(|&[lo, hi]| (10f64.powf(lo), 10f64.powf(hi)))
            .collect()
    }

    /// Oldest edge in years (age of the universe for bins built by this module).
    pub fn max_age_years(&self) -> f64 {
        self.bins.last().map(|b| 10f64.powf(b[1])).unwrap_or(0.0)
    }

    /// Bins for a fit at redshift `z` with the default fixed young edges.
    pub fn for_redshift(cosmology: &Cosmology, z: f64, nbins: usize) -> Result<Self, SfhError> {
        let tuniv = cosmology.age_years(z);
        construct_agebins(&DEFAULT_FIXED_EDGES, nbins, tuniv)
    }
}

impl TryFrom<Vec<[f64; 2]>> for AgeBins {
    type Error = SfhError;

    fn try_from(value: Vec<[f64; 2]>) -> Result<Self, Self::Error> {
        AgeBins::new(value)
    }
}

impl From<AgeBins> for Vec<[f64; 2]> {
    fn from(value: AgeBins) -> Self {
        value.bins
    }
}

/// Build `nbins` age bins.
///
/// `fixed_edges` are the leading log10(yr) edges (`[0, 7.4772, 8.0]` by default). The
/// last fixed edge starts a log-uniform run of edges ending at `log10(0.85 · t_univ)`,
/// followed by one final bin ending at `log10(t_univ)`.
pub fn construct_agebins(fixed_edges: &[f64], nbins: usize, tuniv_years: f64) -> Result<AgeBins, SfhError> {
    if fixed_edges.len() < 2 {
        return Err(SfhError::InvalidInput(
            "need at least two fixed young bin edges".into(),
        ));
    }
    if !(tuniv_years.is_finite() && tuniv_years > 0.0) {
        return Err(SfhError::InvalidInput(format!(
            "invalid age of the universe: {tuniv_years}"
        )));
    }
    let n_young = fixed_edges.len() - 1;
    if nbins < n_young + 1 {
        return Err(SfhError::InvalidInput(format!(
            "nbins={nbins} leaves no room after {n_young} fixed young bins"
        )));
    }

    let log_tmax = (tuniv_years * OLDEST_BIN_FRACTION).log10();
    let start = fixed_edges[n_young];
    if !(log_tmax > start) {
        return Err(SfhError::InvalidInput(format!(
            "universe too young: 85% of its age (10^{log_tmax:.3} yr) precedes the fixed edge 10^{start:.3} yr"
        )));
    }

    // Remaining edges: `nbins - n_young` log-uniform points from `start` to `log_tmax`
    // (inclusive), then the age of the universe.
    let n_span = nbins - n_young;
    let mut edges: Vec<f64> = fixed_edges[..n_young].to_vec();
    if n_span == 1 {
        edges.push(start);
    } else {
        let step = (log_tmax - start) / (n_span as f64 - 1.0);
        for i in 0..n_span {
            edges.push(start + step * i as f64);
        }
    }
    edges.push(tuniv_years.log10());

    AgeBins::from_edges(&edges)
}

/// Bins whose widths follow from SFR ratios under an equal-mass-per-bin assumption.
///
/// The first bin is fixed to `[1 yr, 50 Myr]`. With `S_n = 10^{logsfr_ratios_n}`, the
/// youngest flexible bin has width
///
/// ```text
/// dt_1 = (t_univ - 50 Myr) / (1 + Σ_n Π_{j≤n} S_j)
/// ```
///
/// and each subsequent bin is `dt_1 · Π_{j≤k} S_j` wide. Returns `len(ratios) + 2` bins.
pub fn ratios_to_agebins(logsfr_ratios: &[f64], tuniv_years: f64) -> Result<AgeBins, SfhError> {
    if !(tuniv_years.is_finite() && tuniv_years > FLEX_FIXED_TIME_YEARS) {
        return Err(SfhError::InvalidInput(format!(
            "age of the universe {tuniv_years} yr must exceed the fixed 50 Myr bin"
        )));
    }
    if let Some(bad) = logsfr_ratios.iter().find(|r| !r.is_finite()) {
        return Err(SfhError::InvalidSample(format!("non-finite SFR ratio {bad}")));
    }

    let mut cumulative = Vec::with_capacity(logsfr_ratios.len());
    let mut prod = 1.0;
    for &r in logsfr_ratios {
        prod *= 10f64.powf(r);
        cumulative.push(prod);
    }
    let dt1 = (tuniv_years - FLEX_FIXED_TIME_YEARS) / (1.0 + cumulative.iter().sum::<f64>());

    let mut lims = vec![1.0, FLEX_FIXED_TIME_YEARS, FLEX_FIXED_TIME_YEARS + dt1];
    for p in &cumulative {
        let last = lims[lims.len() - 1];
        lims.push(last + dt1 * p);
    }
    if lims.iter().any(|v| !v.is_finite()) {
        return Err(SfhError::InvalidSample(
            "SFR ratios produce non-finite bin edges".into(),
        ));
    }

    let edges: Vec<f64> = lims.iter().map(|v| v.log10()).collect();
    AgeBins::from_edges(&edges).map_err(|e| SfhError::InvalidSample(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_monotonic_bins() {
        let err = AgeBins::new(vec![[0.0, 7.0], [7.0, 6.5]]).unwrap_err();
        assert!(matches!(err, SfhError::NonMonotonicAgeBins { index: 1, .. }));
        assert!(err.to_string().contains("non-monotonic age bins"));
    }

    #[test]
    fn rejects_gaps() {
        let err = AgeBins::new(vec![[0.0, 7.0], [7.5, 8.0]]).unwrap_err();
        assert!(matches!(err, SfhError::NonContiguousAgeBins { .. }));
    }

    #[test]
    fn widths_are_linear_years() {
        let bins = AgeBins::from_edges(&[0.0, 7.0, 8.0]).unwrap();
        let w = bins.widths();
        assert!((w[0] - (1e7 - 1.0)).abs() < 1e-6);
        assert!((w[1] - 9e7).abs() < 1e-6);
    }

    #[test]
    fn constructed_bins_match_layout() {
        let tuniv = 13.7e9;
        let bins = construct_agebins(&DEFAULT_FIXED_EDGES, 7, tuniv).unwrap();
        assert_eq!(bins.len(), 7);
        let edges = bins.log_edges();
        assert_eq!(edges.len(), 8);
        assert_eq!(edges[0], 0.0);
        assert!((edges[1] - 7.4772).abs() < 1e-12);
        assert!((edges[2] - 8.0).abs() < 1e-12);
        assert!((edges[6] - (0.85 * tuniv).log10()).abs() < 1e-12);
        assert!((edges[7] - tuniv.log10()).abs() < 1e-12);
        for w in edges.windows(2) {
            assert!(w[1] > w[0]);
        }
    }

    #[test]
    fn universe_too_young_is_rejected() {
        assert!(construct_agebins(&DEFAULT_FIXED_EDGES, 7, 1e8).is_err());
        assert!(construct_agebins(&DEFAULT_FIXED_EDGES, 2, 13.7e9).is_err());
    }

    #[test]
    fn flexible_bins_equal_width_for_flat_ratios() {
        let tuniv = 10e9;
        let bins = ratios_to_agebins(&[0.0, 0.0, 0.0], tuniv).unwrap();
        assert_eq!(bins.len(), 5);
        let w = bins.widths();
        let expected = (tuniv - 5e7) / 4.0;
        for dt in &w[1..] {
            assert!((dt - expected).abs() / expected < 1e-9);
        }
        assert!((bins.max_age_years() - tuniv).abs() / tuniv < 1e-12);
    }

    #[test]
    fn flexible_bins_scale_with_ratio() {
        let bins = ratios_to_agebins(&[1.0], 5e9).unwrap();
        let w = bins.widths();
        assert!((w[2] / w[1] - 10.0).abs() < 1e-9);
    }

    #[test]
    fn serde_round_trip_validates() {
        let bins = AgeBins::from_edges(&[0.0, 7.0, 8.0]).unwrap();
        let json = serde_json::to_string(&bins).unwrap();
        let back: AgeBins = serde_json::from_str(&json).unwrap();
        assert_eq!(bins, back);
        assert!(serde_json::from_str::<AgeBins>("[[0.0, 7.0], [6.0, 8.0]]").is_err());
    }
}
