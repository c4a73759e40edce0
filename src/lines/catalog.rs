//! Line lists and fitting windows.

/// A nebular emission line fit by the umbrella model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmissionLine {
    pub name: &'static str,
    /// Rest wavelength (Å).
    pub rest_wavelength: f64,
}

/// Umbrella-model lines, in parameter order. The reference line for the shared redshift
/// is `[OIII]4959`.
pub const EMISSION_LINES: [EmissionLine; 6] = [
    EmissionLine {
        name: "[OIII] 4959",
        rest_wavelength: 4958.92,
    },
    EmissionLine {
        name: "[OIII] 5007",
        rest_wavelength: 5006.84,
    },
    EmissionLine {
        name: "H beta",
        rest_wavelength: 4861.33,
    },
    EmissionLine {
        name: "[NII] 6549",
        rest_wavelength: 6548.03,
    },
    EmissionLine {
        name: "[NII] 6583",
        rest_wavelength: 6583.41,
    },
    EmissionLine {
        name: "H alpha",
        rest_wavelength: 6562.80,
    },
];

pub const HBETA_INDEX: usize = 2;
pub const HALPHA_INDEX: usize = 5;

/// `[OIII]5007 / [OIII]4959` amplitude ratio.
pub const OIII_RATIO: f64 = 2.98;
/// `[NII]6583 / [NII]6549` amplitude ratio.
pub const NII_RATIO: f64 = 2.93;

/// Lines below this wavelength use the "low" continuum for equivalent widths.
pub const LOW_HIGH_SPLIT: f64 = 5600.0;

/// Rest-frame fitting windows (Å) for the umbrella model.
pub const EMISSION_WINDOWS: [(f64, f64); 2] = [(4700.0, 5100.0), (6350.0, 6680.0)];

/// Half-width (Å) of the mask around each emission line when estimating noise.
pub const LINE_MASK_HALF_WIDTH: f64 = 30.0;

/// Continuum windows for equivalent widths.
pub const CONTINUUM_LOW: (f64, f64) = (5030.0, 5100.0);
pub const CONTINUUM_HIGH: (f64, f64) = (6400.0, 6500.0);

/// Pixel spacing (Å) near Hα above which [NII] cannot be separated from Hα.
pub const MAX_PIXEL_STEP_NEAR_HALPHA: f64 = 14.0;
pub const HALPHA_GATE_WAVELENGTH: f64 = 6563.0;

/// A Balmer absorption feature measured with a profile + linear continuum fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsorptionLine {
    pub name: &'static str,
    pub center: f64,
    /// Fit window (Å).
    pub window: (f64, f64),
}

pub const ABSORPTION_LINES: [AbsorptionLine; 3] = [
    AbsorptionLine {
        name: "halpha_wide",
        center: 6562.80,
        window: (6400.0, 6730.0),
    },
    AbsorptionLine {
        name: "hbeta",
        center: 4861.33,
        window: (4760.0, 4960.0),
    },
    AbsorptionLine {
        name: "hdelta_wide",
        center: 4101.74,
        window: (4030.0, 4180.0),
    },
];

pub const ABS_HALPHA: usize = 0;
pub const ABS_HBETA: usize = 1;
pub const ABS_HDELTA: usize = 2;

/// Which absorption line anchors the model continuum in each emission window.
pub const WINDOW_ANCHORS: [usize; 2] = [ABS_HBETA, ABS_HALPHA];
