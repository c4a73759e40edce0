//! Fit parameters with explicit constraints.
//!
//! A model's full parameter vector is split into free parameters (seen by the optimizer),
//! fixed parameters, and tied parameters whose value is a pure function of another
//! parameter. The optimizer only ever moves free values; [`ParameterSet::expand`] resolves
//! every tie by substitution before the model is evaluated.

use crate::error::FitError;

/// How a tied parameter follows its source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tie {
    /// `value = k · source`
    Scale(f64),
    /// `value = source`
    Equal,
    /// Line center following a reference line center:
    /// `value = source / reference_rest · rest`.
    Redshift { reference_rest: f64, rest: f64 },
}

impl Tie {
    pub fn apply(&self, source: f64) -> f64 {
        match *self {
            Tie::Scale(k) => k * source,
            Tie::Equal => source,
            Tie::Redshift {
                reference_rest,
                rest,
            } => source / reference_rest * rest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Constraint {
    Free { min: f64, max: f64 },
    Fixed,
    Tied { source: usize, tie: Tie },
}

impl Constraint {
    pub fn free() -> Self {
        Constraint::Free {
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
        }
    }

    pub fn bounded(min: f64, max: f64) -> Self {
        Constraint::Free { min, max }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    pub constraint: Constraint,
}

/// An ordered, validated parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSet {
    params: Vec<Parameter>,
    free: Vec<usize>,
}

impl ParameterSet {
    /// Validate constraints: ties must point at an existing, untied parameter and free
    /// values must start inside their bounds (they are clamped otherwise).
    pub fn new(mut params: Vec<Parameter>) -> Result<Self, FitError> {
        let n = params.len();
        for (i, p) in params.iter().enumerate() {
            if let Constraint::Tied { source, .. } = p.constraint {
                if source >= n || source == i {
                    return Err(FitError::InvalidParameters(format!(
                        "parameter '{}' is tied to invalid index {source}",
                        p.name
                    )));
                }
                if matches!(params[source].constraint, Constraint::Tied { .. }) {
                    return Err(FitError::InvalidParameters(format!(
                        "parameter '{}' is tied to '{}', which is itself tied",
                        p.name, params[source].name
                    )));
                }
            }
            if let Constraint::Free { min, max } = p.constraint {
                if min.is_nan() || max.is_nan() || min > max {
                    return Err(FitError::InvalidParameters(format!(
                        "parameter '{}' has invalid bounds [{min}, {max}]",
                        p.name
                    )));
                }
            }
        }

        for p in params.iter_mut() {
            if let Constraint::Free { min, max } = p.constraint {
                p.value = p.value.clamp(min, max);
            }
        }

        let free = params
            .iter()
            .enumerate()
            .filter(|(_, p)| matches!(p.constraint, Constraint::Free { .. }))
            .map(|(i, _)| i)
            .collect();

        let mut set = Self { params, free };
        set.resolve_ties();
        Ok(set)
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn n_free(&self) -> usize {
        self.free.len()
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Full parameter values (ties resolved).
    pub fn values(&self) -> Vec<f64> {
        self.params.iter().map(|p| p.value).collect()
    }

    pub fn value(&self, index: usize) -> f64 {
        self.params[index].value
    }

    /// Current free values, in parameter order.
    pub fn free_values(&self) -> Vec<f64> {
        self.free.iter().map(|&i| self.params[i].value).collect()
    }

    /// `(min, max)` of each free parameter.
    pub fn free_bounds(&self) -> Vec<(f64, f64)> {
        self.free
            .iter()
            .map(|&i| match self.params[i].constraint {
                Constraint::Free { min, max } => (min, max),
                _ => (f64::NEG_INFINITY, f64::INFINITY),
            })
            .collect()
    }

    /// Full parameter vector for a candidate set of free values.
    pub fn expand(&self, free_values: &[f64]) -> Vec<f64> {
        let mut full = self.values();
        for (&i, &v) in self.free.iter().zip(free_values.iter()) {
            full[i] = v;
        }
        for (i, p) in self.params.iter().enumerate() {
            if let Constraint::Tied { source, tie } = p.constraint {
                full[i] = tie.apply(full[source]);
            }
        }
        full
    }

    /// Store new free values and re-resolve ties.
    pub fn set_free_values(&mut self, free_values: &[f64]) {
        for (&i, &v) in self.free.iter().zip(free_values.iter()) {
            self.params[i].value = v;
        }
        self.resolve_ties();
    }

    /// Overwrite one parameter's value (any constraint), then re-resolve ties.
    pub fn set_value(&mut self, index: usize, value: f64) {
        if let Some(p) = self.params.get_mut(index) {
            p.value = value;
        }
        self.resolve_ties();
    }

    fn resolve_ties(&mut self) {
        for i in 0..self.params.len() {
            if let Constraint::Tied { source, tie } = self.params[i].constraint {
                self.params[i].value = tie.apply(self.params[source].value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn param(name: &str, value: f64, constraint: Constraint) -> Parameter {
        Parameter {
            name: name.to_string(),
            value,
            constraint,
        }
    }

    #[test]
    fn ties_resolve_by_substitution() {
        let set = ParameterSet::new(vec![
            param("amp_4959", 1.0, Constraint::free()),
            param(
                "amp_5007",
                0.0,
                Constraint::Tied {
                    source: 0,
                    tie: Tie::Scale(2.98),
                },
            ),
            param("mean_4959", 4958.92 * 1.01, Constraint::free()),
            param(
                "mean_6563",
                0.0,
                Constraint::Tied {
                    source: 2,
                    tie: Tie::Redshift {
                        reference_rest: 4958.92,
                        rest: 6562.80,
                    },
                },
            ),
            param("cont", 5.0, Constraint::Fixed),
        ])
        .unwrap();

        assert_eq!(set.n_free(), 2);
        let full = set.expand(&[2.0, 4958.92 * 1.02]);
        assert!((full[1] - 5.96).abs() < 1e-12);
        assert!((full[3] - 6562.80 * 1.02).abs() < 1e-9);
        assert_eq!(full[4], 5.0);
    }

    #[test]
    fn chained_ties_are_rejected() {
        let err = ParameterSet::new(vec![
            param("a", 1.0, Constraint::free()),
            param(
                "b",
                1.0,
                Constraint::Tied {
                    source: 0,
                    tie: Tie::Equal,
                },
            ),
            param(
                "c",
                1.0,
                Constraint::Tied {
                    source: 1,
                    tie: Tie::Equal,
                },
            ),
        ])
        .unwrap_err();
        assert!(matches!(err, FitError::InvalidParameters(_)));
    }

    #[test]
    fn initial_values_are_clamped_into_bounds() {
        let set = ParameterSet::new(vec![param("sigma", 25.0, Constraint::bounded(0.1, 10.0))]).unwrap();
        assert_eq!(set.free_values(), vec![10.0]);
    }
}
