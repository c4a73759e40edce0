//! Weighted sampler chains and sample selection.

use rand::Rng;
use rand::seq::index::sample_weighted;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::SfhError;

/// A weighted posterior chain: one row of theta values per sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chain {
    labels: Vec<String>,
    rows: Vec<Vec<f64>>,
    weights: Vec<f64>,
    lnprob: Option<Vec<f64>>,
}

impl Chain {
    pub fn new(
        labels: Vec<String>,
        rows: Vec<Vec<f64>>,
        weights: Vec<f64>,
        lnprob: Option<Vec<f64>>,
    ) -> Result<Self, SfhError> {
        if rows.is_empty() {
            return Err(SfhError::InvalidInput("chain has no samples".into()));
        }
        if let Some(pos) = rows.iter().position(|r| r.len() != labels.len()) {
            return Err(SfhError::LengthMismatch {
                what: "theta values per chain row",
                expected: labels.len(),
                actual: rows[pos].len(),
            });
        }
        if weights.len() != rows.len() {
            return Err(SfhError::LengthMismatch {
                what: "chain weights",
                expected: rows.len(),
                actual: weights.len(),
            });
        }
        if weights.iter().any(|w| !(w.is_finite() && *w >= 0.0)) {
            return Err(SfhError::InvalidInput(
                "chain weights must be finite and non-negative".into(),
            ));
        }
        if !(weights.iter().sum::<f64>() > 0.0) {
            return Err(SfhError::InvalidInput("chain weights sum to zero".into()));
        }
        if let Some(lp) = &lnprob {
            if lp.len() != rows.len() {
                return Err(SfhError::LengthMismatch {
                    what: "lnprob values",
                    expected: rows.len(),
                    actual: lp.len(),
                });
            }
        }
        Ok(Self {
            labels,
            rows,
            weights,
            lnprob,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.rows[index]
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Index of the most probable sample: highest `lnprob`, or highest weight without one.
    pub fn maxprob_index(&self) -> usize {
        let score = self.lnprob.as_deref().unwrap_or(&self.weights);
        score
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_nan())
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Theta reordered to `labels`.
    pub fn theta_for(&self, index: usize, columns: &[usize]) -> Vec<f64> {
        let row = &self.rows[index];
        columns.iter().map(|&c| row[c]).collect()
    }
}

/// Draw `ncalc` distinct samples with probability proportional to weight, then put the
/// most probable sample first.
///
/// `ncalc` is capped at the number of samples with positive weight.
pub fn select_samples<R: Rng + ?Sized>(chain: &Chain, ncalc: usize, rng: &mut R) -> Result<Vec<usize>, SfhError> {
    let positive = chain.weights.iter().filter(|w| **w > 0.0).count();
    let amount = ncalc.min(positive);
    if amount < ncalc {
        warn!(requested = ncalc, available = positive, "fewer weighted samples than requested");
    }
    if amount == 0 {
        return Err(SfhError::InvalidInput("no samples with positive weight".into()));
    }

    let mut idx = sample_weighted(rng, chain.len(), |i| chain.weights[i], amount)
        .map_err(|e| SfhError::InvalidInput(format!("weighted sampling failed: {e}")))?
        .into_vec();

    let amax = chain.maxprob_index();
    if let Some(pos) = idx.iter().position(|&i| i == amax) {
        idx[pos] = idx[0];
    }
    idx[0] = amax;

    let total: f64 = chain.weights.iter().sum();
    let covered: f64 = idx.iter().map(|&i| chain.weights[i]).sum();
    debug!(
        selected = idx.len(),
        weight_fraction = covered / total,
        "selected posterior samples"
    );
    Ok(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn chain(weights: Vec<f64>, lnprob: Option<Vec<f64>>) -> Chain {
        let rows = (0..weights.len()).map(|i| vec![i as f64, 2.0 * i as f64]).collect();
        Chain::new(vec!["a".into(), "b".into()], rows, weights, lnprob).unwrap()
    }

    #[test]
    fn selection_is_distinct_and_starts_at_maxprob() {
        let c = chain(vec![0.1; 50], Some((0..50).map(|i| -((i as f64) - 17.0).powi(2)).collect()));
        let mut rng = StdRng::seed_from_u64(3);
        let idx = select_samples(&c, 20, &mut rng).unwrap();
        assert_eq!(idx.len(), 20);
        assert_eq!(idx[0], 17);
        let mut sorted = idx.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 20);
    }

    #[test]
    fn zero_weight_samples_are_skipped_when_possible() {
        let mut w = vec![0.0; 10];
        w[2] = 1.0;
        w[7] = 3.0;
        let c = chain(w, None);
        let mut rng = StdRng::seed_from_u64(1);
        let mut idx = select_samples(&c, 5, &mut rng).unwrap();
        assert_eq!(idx[0], 7);
        idx.sort_unstable();
        assert_eq!(idx, vec![2, 7]);
    }

    #[test]
    fn chain_validation() {
        assert!(matches!(
            Chain::new(vec!["a".into()], vec![vec![1.0, 2.0]], vec![1.0], None),
            Err(SfhError::LengthMismatch { .. })
        ));
        assert!(matches!(
            Chain::new(vec!["a".into()], vec![vec![1.0]], vec![-1.0], None),
            Err(SfhError::InvalidInput(_))
        ));
        assert!(Chain::new(vec!["a".into()], vec![], vec![], None).is_err());
    }

    #[test]
    fn theta_reorders_columns() {
        let c = chain(vec![1.0; 3], None);
        assert_eq!(c.theta_for(2, &[1, 0]), vec![4.0, 2.0]);
        assert_eq!(c.column_index("b"), Some(1));
    }
}
