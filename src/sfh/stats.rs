//! Quantities derived from a binned star-formation history.
//!
//! Star formation is constant within each bin, so every quantity here is an exact
//! piecewise-linear integral over the bins. Lookback times are in Gyr; SFRs in Msun/yr.

use serde::{Deserialize, Serialize};

use crate::error::SfhError;
use crate::sfh::agebins::AgeBins;

/// Trailing windows (Gyr) over which SFRs are averaged.
pub const SFR_WINDOWS_GYR: [f64; 3] = [0.03, 0.1, 0.3];

/// Youngest time on the SFH grid (1 Myr).
const MIN_SFH_TIME_GYR: f64 = 1e-3;

/// A binned SFH: the age bins and the mass formed in each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinnedSfh {
    pub agebins: AgeBins,
    pub masses: Vec<f64>,
}

impl BinnedSfh {
    pub fn new(agebins: AgeBins, masses: Vec<f64>) -> Result<Self, SfhError> {
        if masses.len() != agebins.len() {
            return Err(SfhError::LengthMismatch {
                what: "bin masses",
                expected: agebins.len(),
                actual: masses.len(),
            });
        }
        Ok(Self { agebins, masses })
    }

    /// Total mass formed.
    pub fn total_mass(&self) -> f64 {
        self.masses.iter().sum()
    }

    /// SFR in each bin (Msun/yr).
    pub fn bin_sfrs(&self) -> Vec<f64> {
        self.masses
            .iter()
            .zip(self.agebins.widths())
            .map(|(m, dt)| m / dt)
            .collect()
    }

    /// Mass formed between lookback times `t0 < t1` (years).
    pub fn mass_formed_between(&self, t0: f64, t1: f64) -> f64 {
        if !(t1 > t0) {
            return 0.0;
        }
        self.agebins
            .edges_years()
            .iter()
            .zip(self.bin_sfrs())
            .map(|(&(lo, hi), sfr)| {
                let overlap = t1.min(hi) - t0.max(lo);
                if overlap > 0.0 { sfr * overlap } else { 0.0 }
            })
            .sum()
    }

    /// Mean SFR over the most recent `window_gyr` Gyr.
    pub fn sfr_over(&self, window_gyr: f64) -> f64 {
        let window = window_gyr * 1e9;
        if !(window > 0.0) {
            return 0.0;
        }
        self.mass_formed_between(0.0, window) / window
    }

    /// SFR at lookback time `t_gyr`; zero outside the binned range.
    pub fn sfr_at(&self, t_gyr: f64) -> f64 {
        let t = t_gyr * 1e9;
        self.agebins
            .edges_years()
            .iter()
            .zip(self.bin_sfrs())
            .find(|((lo, hi), _)| t >= *lo && t < *hi)
            .map(|(_, sfr)| sfr)
            .unwrap_or(0.0)
    }

    /// SFR evaluated on a grid of lookback times (Gyr).
    pub fn sfh_on(&self, times_gyr: &[f64]) -> Vec<f64> {
        times_gyr.iter().map(|&t| self.sfr_at(t)).collect()
    }

    /// Lookback time (Gyr) by which half of the total mass had formed.
    pub fn halfmass_assembly_time(&self) -> f64 {
        let half = 0.5 * self.total_mass();
        if !(half > 0.0) {
            return f64::NAN;
        }
        // Accumulate from the oldest bin towards the present.
        let edges = self.agebins.edges_years();
        let sfrs = self.bin_sfrs();
        let mut formed = 0.0;
        for ((_, hi), (sfr, mass)) in edges
            .iter()
            .zip(sfrs.iter().zip(self.masses.iter()))
            .rev()
        {
            if formed + mass >= half {
                if *sfr <= 0.0 {
                    return hi / 1e9;
                }
                let needed = half - formed;
                return (hi - needed / sfr) / 1e9;
            }
            formed += mass;
        }
        edges.first().map(|e| e.0 / 1e9).unwrap_or(f64::NAN)
    }

    /// Mass-weighted lookback age (Gyr).
    pub fn mass_weighted_age(&self) -> f64 {
        let total = self.total_mass();
        if !(total > 0.0) {
            return f64::NAN;
        }
        let weighted: f64 = self
            .agebins
            .edges_years()
            .iter()
            .zip(self.masses.iter())
            .map(|(&(lo, hi), m)| m * 0.5 * (lo + hi))
            .sum();
        weighted / total / 1e9
    }
}

/// Lookback times (Gyr) on which SFH posteriors are tabulated.
///
/// Each bin edge contributes points just inside and just outside it, so the
/// piecewise-constant SFH is resolved on both sides of every step. The two extreme
/// points (outside the binned range) are dropped and nothing younger than 1 Myr is kept.
pub fn sfh_time_vector(agebins: &AgeBins) -> Vec<f64> {
    let edges: Vec<f64> = agebins
        .bins()
        .iter()
        .flat_map(|b| b.iter().map(|e| 10f64.powf(*e) / 1e9))
        .collect();
    let mut t: Vec<f64> = edges
        .iter()
        .map(|e| e * 0.9999)
        .chain(edges.iter().map(|e| e * 1.001))
        .collect();
    t.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if t.len() < 2 {
        return Vec::new();
    }
    let mut t: Vec<f64> = t[1..t.len() - 1]
        .iter()
        .map(|v| v.max(MIN_SFH_TIME_GYR))
        .collect();
    t.dedup_by(|a, b| a == b);
    t
}
