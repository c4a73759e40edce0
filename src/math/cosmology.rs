//! Flat ΛCDM background cosmology.
//!
//! Only two quantities are needed downstream:
//!
//! - the age of the universe at the fit redshift (last SFH bin edge)
//! - the luminosity distance (observed flux ↔ luminosity)
//!
//! Both are integrals over the scale factor `a`, evaluated with composite Simpson's rule.
//! Radiation (photons + massless neutrinos) is included in the expansion rate.

use serde::{Deserialize, Serialize};

use crate::math::constants::{C_KMS, MPC_KM, PARSEC_CM, YEAR_S};

/// Number of Simpson intervals (must be even).
const SIMPSON_STEPS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cosmology {
    /// Hubble constant in km/s/Mpc.
    pub h0: f64,
    /// Matter density today.
    pub omega_m: f64,
    /// Radiation density today (photons + relativistic neutrinos).
    pub omega_r: f64,
}

impl Cosmology {
    /// WMAP 9-year parameters (H0 = 69.32, Ωm = 0.2865, T_cmb = 2.725 K, N_eff = 3.04).
    pub fn wmap9() -> Self {
        let h = 0.6932_f64;
        let omega_gamma = 2.472_9e-5 / (h * h);
        let omega_nu = 0.2271 * 3.04 * omega_gamma;
        Self {
            h0: 69.32,
            omega_m: 0.2865,
            omega_r: omega_gamma + omega_nu,
        }
    }

    /// Dark energy density closing the universe.
    pub fn omega_lambda(&self) -> f64 {
        1.0 - self.omega_m - self.omega_r
    }

    /// Hubble time `1/H0` in years.
    pub fn hubble_time_years(&self) -> f64 {
        (MPC_KM / self.h0) / YEAR_S
    }

    /// Hubble distance `c/H0` in Mpc.
    pub fn hubble_distance_mpc(&self) -> f64 {
        C_KMS / self.h0
    }

    fn a_sq_e(&self, a: f64) -> f64 {
        // a² E(a) = sqrt(Ωr + Ωm a + ΩΛ a⁴)
        (self.omega_r + self.omega_m * a + self.omega_lambda() * a.powi(4)).sqrt()
    }

    /// Age of the universe at redshift `z`, in years.
    pub fn age_years(&self, z: f64) -> f64 {
        let a_max = 1.0 / (1.0 + z.max(0.0));
        // dt = da / (a H(a)) = a da / (a² E(a) H0)
        let integral = simpson(|a| a / self.a_sq_e(a), 0.0, a_max, SIMPSON_STEPS);
        integral * self.hubble_time_years()
    }

    /// Line-of-sight comoving distance in Mpc.
    pub fn comoving_distance_mpc(&self, z: f64) -> f64 {
        if z <= 0.0 {
            return 0.0;
        }
        let a_min = 1.0 / (1.0 + z);
        let integral = simpson(|a| 1.0 / self.a_sq_e(a), a_min, 1.0, SIMPSON_STEPS);
        integral * self.hubble_distance_mpc()
    }

    /// Luminosity distance in Mpc.
    pub fn luminosity_distance_mpc(&self, z: f64) -> f64 {
        (1.0 + z.max(0.0)) * self.comoving_distance_mpc(z)
    }

    /// Luminosity distance in cm.
    pub fn luminosity_distance_cm(&self, z: f64) -> f64 {
        self.luminosity_distance_mpc(z) * 1e6 * PARSEC_CM
    }

    /// Factor converting an observed flux density (per cm², per observed Å) into a
    /// rest-frame luminosity density: `4π d_L² (1+z)`.
    pub fn distance_factor(&self, z: f64) -> f64 {
        let dl = self.luminosity_distance_cm(z);
        4.0 * std::f64::consts::PI * dl * dl * (1.0 + z)
    }
}

impl Default for Cosmology {
    fn default() -> Self {
        Self::wmap9()
    }
}

fn simpson<F: Fn(f64) -> f64>(f: F, a: f64, b: f64, steps: usize) -> f64 {
    let n = if steps % 2 == 0 { steps.max(2) } else { steps + 1 };
    let h = (b - a) / n as f64;
    let mut acc = f(a) + f(b);
    for i in 1..n {
        let x = a + h * i as f64;
        acc += if i % 2 == 1 { 4.0 * f(x) } else { 2.0 * f(x) };
    }
    acc * h / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wmap9_age_today() {
        let c = Cosmology::wmap9();
        let age_gyr = c.age_years(0.0) / 1e9;
        assert!((age_gyr - 13.77).abs() < 0.05, "age(0) = {age_gyr} Gyr");
    }

    #[test]
    fn age_decreases_with_redshift() {
        let c = Cosmology::wmap9();
        let a0 = c.age_years(0.0);
        let a1 = c.age_years(1.0);
        let a3 = c.age_years(3.0);
        assert!(a0 > a1 && a1 > a3);
        assert!((a1 / 1e9 - 5.92).abs() < 0.05, "age(1) = {} Gyr", a1 / 1e9);
    }

    #[test]
    fn luminosity_distance_low_z_is_hubble_law() {
        let c = Cosmology::wmap9();
        let z = 0.001;
        let dl = c.luminosity_distance_mpc(z);
        let hubble = z * c.hubble_distance_mpc();
        assert!((dl - hubble).abs() / hubble < 2e-3);
        assert_eq!(c.luminosity_distance_mpc(0.0), 0.0);
    }

    #[test]
    fn simpson_integrates_polynomial_exactly() {
        let v = simpson(|x| x * x * x, 0.0, 2.0, 10);
        assert!((v - 4.0).abs() < 1e-12);
    }
}
