//! Physical constants (cgs unless noted).

/// Speed of light in km/s.
pub const C_KMS: f64 = 2.997_924_58e5;

/// Speed of light in Å/s.
pub const C_ANGSTROM_PER_S: f64 = 2.997_924_58e18;

/// Solar luminosity in erg/s (IAU 2015 nominal).
pub const L_SUN_ERG_S: f64 = 3.828e33;

/// One parsec in cm.
pub const PARSEC_CM: f64 = 3.085_677_581_467_192e18;

/// One megaparsec in km.
pub const MPC_KM: f64 = 3.085_677_581_491_367e19;

/// Julian year in seconds.
pub const YEAR_S: f64 = 3.155_76e7;
