//! Typed model-parameter schema.
//!
//! Every parameter is either sampled (its values come from a theta vector), fixed at its
//! initial value, or derived from other parameters through a [`Rule`]. Derived parameters
//! name their inputs explicitly; the schema orders them topologically once at build time
//! and [`ModelSchema::resolve`] evaluates them in that order.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::SfhParameterization;
use crate::error::{SchemaError, SfhError};
use crate::sfh::{AgeBins, ratios_to_masses, zfrac_to_masses};

/// Prior attached to a sampled parameter. Its support bounds the values `resolve` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Prior {
    TopHat { min: f64, max: f64 },
    ClippedNormal { min: f64, max: f64, mean: f64, sigma: f64 },
    StudentT { mean: f64, scale: f64, df: f64 },
}

impl Prior {
    /// `(min, max)` support; unbounded for Student-t.
    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            Prior::TopHat { min, max } | Prior::ClippedNormal { min, max, .. } => (min, max),
            Prior::StudentT { .. } => (f64::NEG_INFINITY, f64::INFINITY),
        }
    }

    /// `true` for finite values inside the support, edges included.
    pub fn contains(&self, value: f64) -> bool {
        let (min, max) = self.bounds();
        value.is_finite() && value >= min && value <= max
    }
}

/// How a derived parameter is computed from its inputs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    /// Copy the single input.
    Equal,
    /// Element `index` of the single input.
    Element { index: usize },
    /// Product of the first element of every input.
    Product,
    /// Bin masses from `(logmass, logsfr_ratios)`.
    MassesFromRatios,
    /// Bin masses from `(logmass, z_fraction)`.
    MassesFromZFraction,
}

/// How a parameter gets its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum Source {
    Sampled { prior: Option<Prior> },
    Fixed,
    Derived { inputs: Vec<String>, rule: Rule },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    /// Number of values.
    pub n: usize,
    pub init: Vec<f64>,
    pub units: Option<String>,
    pub source: Source,
}

impl ParamSpec {
    pub fn sampled(name: &str, init: Vec<f64>, prior: Option<Prior>) -> Self {
        Self {
            name: name.to_string(),
            n: init.len(),
            init,
            units: None,
            source: Source::Sampled { prior },
        }
    }

    pub fn fixed(name: &str, init: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            n: init.len(),
            init,
            units: None,
            source: Source::Fixed,
        }
    }

    pub fn derived(name: &str, n: usize, inputs: &[&str], rule: Rule) -> Self {
        Self {
            name: name.to_string(),
            n,
            init: vec![0.0; n],
            units: None,
            source: Source::Derived {
                inputs: inputs.iter().map(|s| s.to_string()).collect(),
                rule,
            },
        }
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = Some(units.to_string());
        self
    }

    pub fn is_sampled(&self) -> bool {
        matches!(self.source, Source::Sampled { .. })
    }
}

/// Resolved values by parameter name.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolvedParams {
    values: BTreeMap<String, Vec<f64>>,
}

impl ResolvedParams {
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// First value of a scalar parameter.
    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|v| v.first().copied())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// A validated parameter list with a precomputed resolution order.
#[derive(Debug, Clone)]
pub struct ModelSchema {
    params: Vec<ParamSpec>,
    agebins: AgeBins,
    order: Vec<usize>,
}

impl ModelSchema {
    /// Validate names and dependency edges and order the parameters.
    pub fn new(params: Vec<ParamSpec>, agebins: AgeBins) -> Result<Self, SchemaError> {
        let mut index: HashMap<&str, usize> = HashMap::new();
        for (i, p) in params.iter().enumerate() {
            if p.init.len() != p.n {
                return Err(SchemaError::WrongLength {
                    name: p.name.clone(),
                    expected: p.n,
                    actual: p.init.len(),
                });
            }
            if index.insert(p.name.as_str(), i).is_some() {
                return Err(SchemaError::Duplicate(p.name.clone()));
            }
        }

        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); params.len()];
        for (i, p) in params.iter().enumerate() {
            if let Source::Derived { inputs, .. } = &p.source {
                for input in inputs {
                    let &j = index.get(input.as_str()).ok_or_else(|| SchemaError::UnknownInput {
                        parameter: p.name.clone(),
                        input: input.clone(),
                    })?;
                    edges[i].push(j);
                }
            }
        }

        let order = topological_order(&params, &edges)?;
        Ok(Self { params, agebins, order })
    }

    /// The standard non-parametric SFH schema: `logmass`, the SFH vector, and the derived
    /// bin masses.
    pub fn nonparametric_sfh(
        agebins: AgeBins,
        parameterization: SfhParameterization,
    ) -> Result<Self, SchemaError> {
        let nratio = agebins.len().saturating_sub(1);
        let mut params = vec![
            ParamSpec::fixed("zred", vec![0.0]),
            ParamSpec::sampled(
                "logmass",
                vec![10.0],
                Some(Prior::TopHat { min: 7.0, max: 12.5 }),
            )
            .with_units("log Msun"),
        ];
        match parameterization {
            SfhParameterization::LogSfrRatios => {
                params.push(ParamSpec::sampled(
                    "logsfr_ratios",
                    vec![0.0; nratio],
                    Some(Prior::StudentT {
                        mean: 0.0,
                        scale: 0.3,
                        df: 2.0,
                    }),
                ));
                params.push(
                    ParamSpec::derived(
                        "mass",
                        agebins.len(),
                        &["logmass", "logsfr_ratios"],
                        Rule::MassesFromRatios,
                    )
                    .with_units("Msun"),
                );
            }
            SfhParameterization::ZFraction => {
                params.push(ParamSpec::sampled(
                    "z_fraction",
                    vec![0.5; nratio],
                    Some(Prior::TopHat { min: 0.0, max: 1.0 }),
                ));
                params.push(
                    ParamSpec::derived(
                        "mass",
                        agebins.len(),
                        &["logmass", "z_fraction"],
                        Rule::MassesFromZFraction,
                    )
                    .with_units("Msun"),
                );
            }
        }
        Self::new(params, agebins)
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn agebins(&self) -> &AgeBins {
        &self.agebins
    }

    /// Parameter names in resolution order.
    pub fn resolution_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.params[i].name.as_str()).collect()
    }

    /// Column labels of a theta vector: sampled parameters in declaration order, vectors
    /// expanded as `name_1 .. name_n`. A single-valued parameter keeps its bare name.
    pub fn theta_labels(&self) -> Vec<String> {
        self.theta_label_aliases()
            .into_iter()
            .filter_map(|names| names.into_iter().next())
            .collect()
    }

    /// Accepted column names per theta slot, preferred first. Single-valued parameters
    /// also answer to `name_1`, so chains written with indexed headers still match.
    pub fn theta_label_aliases(&self) -> Vec<Vec<String>> {
        let mut aliases = Vec::new();
        for p in self.params.iter().filter(|p| p.is_sampled()) {
            if p.n == 1 {
                aliases.push(vec![p.name.clone(), format!("{}_1", p.name)]);
            } else {
                aliases.extend((1..=p.n).map(|k| vec![format!("{}_{k}", p.name)]));
            }
        }
        aliases
    }

    pub fn n_theta(&self) -> usize {
        self.params.iter().filter(|p| p.is_sampled()).map(|p| p.n).sum()
    }

    /// Theta built from every sampled parameter's initial value.
    pub fn initial_theta(&self) -> Vec<f64> {
        self.params
            .iter()
            .filter(|p| p.is_sampled())
            .flat_map(|p| p.init.iter().copied())
            .collect()
    }

    /// Assign theta to the sampled parameters, then evaluate every derived parameter.
    pub fn resolve(&self, theta: &[f64]) -> Result<ResolvedParams, SchemaError> {
        let expected = self.n_theta();
        if theta.len() != expected {
            return Err(SchemaError::ThetaLength {
                expected,
                actual: theta.len(),
            });
        }

        let mut offsets = HashMap::new();
        let mut offset = 0;
        for (i, p) in self.params.iter().enumerate() {
            if p.is_sampled() {
                offsets.insert(i, offset);
                offset += p.n;
            }
        }

        let mut out = ResolvedParams::default();
        for &i in &self.order {
            let p = &self.params[i];
            let values = match &p.source {
                Source::Sampled { prior } => {
                    let start = offsets.get(&i).copied().unwrap_or(0);
                    let values = theta[start..start + p.n].to_vec();
                    if let Some(prior) = prior {
                        if let Some(v) = values.iter().find(|v| !prior.contains(**v)) {
                            let (min, max) = prior.bounds();
                            return Err(SfhError::InvalidSample(format!(
                                "{} = {v} outside prior support [{min}, {max}]",
                                p.name
                            ))
                            .into());
                        }
                    }
                    values
                }
                Source::Fixed => p.init.clone(),
                Source::Derived { inputs, rule } => {
                    let args: Vec<&[f64]> = inputs
                        .iter()
                        .map(|name| out.get(name).unwrap_or(&[]))
                        .collect();
                    self.apply(p, *rule, &args)?
                }
            };
            if values.len() != p.n {
                return Err(SchemaError::WrongLength {
                    name: p.name.clone(),
                    expected: p.n,
                    actual: values.len(),
                });
            }
            out.values.insert(p.name.clone(), values);
        }
        Ok(out)
    }

    fn apply(&self, p: &ParamSpec, rule: Rule, args: &[&[f64]]) -> Result<Vec<f64>, SchemaError> {
        let first = |k: usize| -> Result<f64, SchemaError> {
            args.get(k)
                .and_then(|a| a.first().copied())
                .ok_or_else(|| SchemaError::WrongLength {
                    name: p.name.clone(),
                    expected: 1,
                    actual: 0,
                })
        };
        match rule {
            Rule::Equal => Ok(args.first().map(|a| a.to_vec()).unwrap_or_default()),
            Rule::Element { index } => args
                .first()
                .and_then(|a| a.get(index).copied())
                .map(|v| vec![v])
                .ok_or_else(|| SchemaError::WrongLength {
                    name: p.name.clone(),
                    expected: index + 1,
                    actual: args.first().map_or(0, |a| a.len()),
                }),
            Rule::Product => {
                let mut acc = 1.0;
                for k in 0..args.len() {
                    acc *= first(k)?;
                }
                Ok(vec![acc])
            }
            Rule::MassesFromRatios => {
                let logmass = first(0)?;
                let ratios = args.get(1).copied().unwrap_or(&[]);
                Ok(ratios_to_masses(logmass, ratios, &self.agebins)?)
            }
            Rule::MassesFromZFraction => {
                let logmass = first(0)?;
                let z = args.get(1).copied().unwrap_or(&[]);
                Ok(zfrac_to_masses(logmass, z, &self.agebins)?)
            }
        }
    }
}

/// Depth-first topological sort; inputs come before the parameters that use them.
fn topological_order(params: &[ParamSpec], edges: &[Vec<usize>]) -> Result<Vec<usize>, SchemaError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Active,
        Done,
    }

    fn visit(
        i: usize,
        params: &[ParamSpec],
        edges: &[Vec<usize>],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), SchemaError> {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::Active => {
                let start = stack.iter().position(|&s| s == i).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|&s| params[s].name.clone()).collect();
                cycle.push(params[i].name.clone());
                return Err(SchemaError::Cycle(cycle));
            }
            Mark::New => {}
        }
        marks[i] = Mark::Active;
        stack.push(i);
        for &j in &edges[i] {
            visit(j, params, edges, marks, stack, order)?;
        }
        stack.pop();
        marks[i] = Mark::Done;
        order.push(i);
        Ok(())
    }

    let mut marks = vec![Mark::New; params.len()];
    let mut stack = Vec::new();
    let mut order = Vec::with_capacity(params.len());
    for i in 0..params.len() {
        visit(i, params, edges, &mut marks, &mut stack, &mut order)?;
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sfh::construct_agebins;

    fn bins() -> AgeBins {
        AgeBins::from_edges(&[0.0, 8.0, 9.0, 10.0]).unwrap()
    }

    fn massmet_schema() -> Vec<ParamSpec> {
        // Declared out of dependency order on purpose.
        vec![
            ParamSpec::derived("mass", 3, &["logmass", "logsfr_ratios"], Rule::MassesFromRatios),
            ParamSpec::derived("logmass", 1, &["massmet"], Rule::Element { index: 0 }),
            ParamSpec::derived("logzsol", 1, &["massmet"], Rule::Element { index: 1 }),
            ParamSpec::derived("gas_logz", 1, &["logzsol"], Rule::Equal),
            ParamSpec::derived("dust1", 1, &["dust1_fraction", "dust2"], Rule::Product),
            ParamSpec::sampled("massmet", vec![10.0, -0.5], None),
            ParamSpec::sampled("logsfr_ratios", vec![0.0, 0.0], None),
            ParamSpec::sampled(
                "dust1_fraction",
                vec![1.0],
                Some(Prior::ClippedNormal {
                    min: 0.0,
                    max: 2.0,
                    mean: 1.0,
                    sigma: 0.3,
                }),
            ),
            ParamSpec::sampled("dust2", vec![0.3], Some(Prior::TopHat { min: 0.0, max: 4.0 })),
        ]
    }

    fn position(order: &[&str], name: &str) -> usize {
        order.iter().position(|n| *n == name).unwrap()
    }

    #[test]
    fn inputs_resolve_before_dependents() {
        let schema = ModelSchema::new(massmet_schema(), bins()).unwrap();
        let order = schema.resolution_order();
        assert!(position(&order, "massmet") < position(&order, "logmass"));
        assert!(position(&order, "logmass") < position(&order, "mass"));
        assert!(position(&order, "logsfr_ratios") < position(&order, "mass"));
        assert!(position(&order, "logzsol") < position(&order, "gas_logz"));
        assert!(position(&order, "dust2") < position(&order, "dust1"));
    }

    #[test]
    fn resolve_evaluates_rules() {
        let schema = ModelSchema::new(massmet_schema(), bins()).unwrap();
        assert_eq!(
            schema.theta_labels(),
            vec!["massmet_1", "massmet_2", "logsfr_ratios_1", "logsfr_ratios_2", "dust1_fraction", "dust2"]
        );
        let resolved = schema.resolve(&[10.0, -0.3, 0.0, 0.0, 0.5, 0.8]).unwrap();
        assert_eq!(resolved.scalar("logmass"), Some(10.0));
        assert_eq!(resolved.scalar("gas_logz"), Some(-0.3));
        assert!((resolved.scalar("dust1").unwrap() - 0.4).abs() < 1e-12);
        let total: f64 = resolved.get("mass").unwrap().iter().sum();
        assert!((total - 1e10).abs() / 1e10 < 1e-10);
    }

    #[test]
    fn cycles_are_rejected() {
        let params = vec![
            ParamSpec::derived("a", 1, &["c"], Rule::Equal),
            ParamSpec::derived("b", 1, &["a"], Rule::Equal),
            ParamSpec::derived("c", 1, &["b"], Rule::Equal),
        ];
        match ModelSchema::new(params, bins()) {
            Err(SchemaError::Cycle(names)) => {
                assert_eq!(names.first(), names.last());
                assert_eq!(names.len(), 4);
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }

    #[test]
    fn unknown_inputs_and_duplicates_are_rejected() {
        let unknown = vec![ParamSpec::derived("a", 1, &["missing"], Rule::Equal)];
        assert!(matches!(
            ModelSchema::new(unknown, bins()),
            Err(SchemaError::UnknownInput { .. })
        ));
        let dup = vec![
            ParamSpec::fixed("a", vec![1.0]),
            ParamSpec::fixed("a", vec![2.0]),
        ];
        assert_eq!(
            ModelSchema::new(dup, bins()).unwrap_err(),
            SchemaError::Duplicate("a".into())
        );
    }

    #[test]
    fn theta_length_is_checked() {
        let schema = ModelSchema::new(massmet_schema(), bins()).unwrap();
        assert!(matches!(
            schema.resolve(&[1.0]),
            Err(SchemaError::ThetaLength { expected: 6, actual: 1 })
        ));
    }

    #[test]
    fn samples_outside_prior_support_are_invalid() {
        let schema = ModelSchema::new(massmet_schema(), bins()).unwrap();
        // dust2 below its top-hat minimum.
        assert!(matches!(
            schema.resolve(&[10.0, -0.3, 0.0, 0.0, 0.5, -0.1]),
            Err(SchemaError::Sfh(SfhError::InvalidSample(_)))
        ));
        // dust1_fraction NaN.
        assert!(matches!(
            schema.resolve(&[10.0, -0.3, 0.0, 0.0, f64::NAN, 0.8]),
            Err(SchemaError::Sfh(SfhError::InvalidSample(_)))
        ));
        // Edges are inside.
        assert!(schema.resolve(&[10.0, -0.3, 0.0, 0.0, 2.0, 0.0]).is_ok());

        let agebins = construct_agebins(&[0.0, 7.4772, 8.0], 5, 1.3e10).unwrap();
        let zfrac = ModelSchema::nonparametric_sfh(agebins, SfhParameterization::ZFraction).unwrap();
        assert!(matches!(
            zfrac.resolve(&[10.0, 0.5, 1.2, 0.5, 0.5]),
            Err(SchemaError::Sfh(SfhError::InvalidSample(_)))
        ));
    }

    #[test]
    fn single_valued_parameters_accept_indexed_labels() {
        let schema = ModelSchema::new(massmet_schema(), bins()).unwrap();
        let aliases = schema.theta_label_aliases();
        assert_eq!(aliases.len(), schema.n_theta());
        assert_eq!(aliases[0], vec!["massmet_1".to_string()]);
        assert_eq!(aliases[4], vec!["dust1_fraction".to_string(), "dust1_fraction_1".to_string()]);
        assert_eq!(schema.theta_labels()[4], "dust1_fraction");
    }

    #[test]
    fn nonparametric_schemas_produce_masses() {
        let agebins = construct_agebins(&[0.0, 7.4772, 8.0], 7, 1.3e10).unwrap();
        for parameterization in [SfhParameterization::LogSfrRatios, SfhParameterization::ZFraction] {
            let schema = ModelSchema::nonparametric_sfh(agebins.clone(), parameterization).unwrap();
            assert_eq!(schema.n_theta(), 7);
            let resolved = schema.resolve(&schema.initial_theta()).unwrap();
            let total: f64 = resolved.get("mass").unwrap().iter().sum();
            assert!((total - 1e10).abs() / 1e10 < 1e-8);
        }
    }
}
