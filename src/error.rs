//! Error types.
//!
//! Library code returns typed errors (`SfhError`, `FitError`). The driver converts them
//! into an `AppError`, which carries the process exit code:
//!
//! - `2`: usage / configuration problems
//! - `3`: input data problems
//! - `4`: numerical failures

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

/// Errors raised by the star-formation-history transforms.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SfhError {
    #[error("non-monotonic age bins: bin {index} has edges [{lo}, {hi}]")]
    NonMonotonicAgeBins { index: usize, lo: f64, hi: f64 },

    #[error("non-contiguous age bins: bin {index} ends at {hi} but bin {next} starts at {lo}")]
    NonContiguousAgeBins {
        index: usize,
        next: usize,
        hi: f64,
        lo: f64,
    },

    #[error("length mismatch: expected {expected} {what}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors raised by the nonlinear least-squares machinery.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum FitError {
    #[error("fit did not converge after {iterations} iterations")]
    NotConverged { iterations: usize },

    #[error("normal equations are singular")]
    Singular,

    #[error("no data points to fit")]
    EmptyData,

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("non-finite model evaluation")]
    NonFinite,
}

/// Errors raised when a spectrum fails validation.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SpectrumError {
    #[error("spectrum is empty")]
    Empty,

    #[error("wavelength ({wavelength}) and flux ({flux}) lengths differ")]
    LengthMismatch { wavelength: usize, flux: usize },

    #[error("wavelengths must be strictly increasing (index {index})")]
    Unsorted { index: usize },

    #[error("non-finite value at index {index}")]
    NonFinite { index: usize },
}

/// Errors raised while building or resolving a model-parameter schema.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SchemaError {
    #[error("parameter `{0}` is declared twice")]
    Duplicate(String),

    #[error("parameter `{parameter}` depends on unknown parameter `{input}`")]
    UnknownInput { parameter: String, input: String },

    #[error("dependency cycle through: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("parameter `{name}` expects {expected} values, got {actual}")]
    WrongLength {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("theta has {actual} values but the schema has {expected} free values")]
    ThetaLength { expected: usize, actual: usize },

    #[error(transparent)]
    Sfh(#[from] SfhError),
}

impl From<SfhError> for AppError {
    fn from(err: SfhError) -> Self {
        let code = match err {
            SfhError::InvalidSample(_) => 4,
            _ => 2,
        };
        AppError::new(code, err.to_string())
    }
}

impl From<FitError> for AppError {
    fn from(err: FitError) -> Self {
        let code = match err {
            FitError::EmptyData | FitError::InvalidParameters(_) => 3,
            _ => 4,
        };
        AppError::new(code, err.to_string())
    }
}

impl From<SchemaError> for AppError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::Sfh(inner) => inner.into(),
            other => AppError::new(2, other.to_string()),
        }
    }
}

impl From<SpectrumError> for AppError {
    fn from(err: SpectrumError) -> Self {
        AppError::new(3, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sfh_errors_map_to_config_exit_code() {
        let err: AppError = SfhError::NonMonotonicAgeBins {
            index: 1,
            lo: 8.0,
            hi: 7.0,
        }
        .into();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("non-monotonic"));
    }

    #[test]
    fn schema_errors_keep_the_inner_sfh_code() {
        let err: AppError = SchemaError::Sfh(SfhError::InvalidSample("nan".into())).into();
        assert_eq!(err.exit_code(), 4);
        let err: AppError = SchemaError::Cycle(vec!["a".into(), "b".into(), "a".into()]).into();
        assert_eq!(err.exit_code(), 2);
        assert!(err.message().contains("a -> b -> a"));
    }

    #[test]
    fn invalid_sample_is_numerical() {
        let err: AppError = SfhError::InvalidSample("inf".into()).into();
        assert_eq!(err.exit_code(), 4);
    }
}
