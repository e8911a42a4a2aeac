use std::collections::BTreeMap;

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::error::{SimError, SimResult};
use super::person::Person;
use super::rng::check_probability;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegressionModel {
    pub coefficients: BTreeMap<String, f64>,
    #[serde(default)]
    pub intercept: f64,
    #[serde(default, alias = "residual_mean_sq_error", alias = "residualMeanSqError")]
    pub residual_standard_error: f64,
}

impl RegressionModel {
    pub fn from_json(name: &str, json: &str) -> SimResult<Self> {
        serde_json::from_str(json).map_err(|source| SimError::ModelSpec {
            name: name.to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone)]
pub enum RiskFactorModel {
    Linear { name: String, spec: RegressionModel },
    LogLinear { name: String, spec: RegressionModel },
    Logistic { name: String, spec: RegressionModel },
}

impl RiskFactorModel {
    pub fn linear(name: impl Into<String>, spec: RegressionModel) -> Self {
        RiskFactorModel::Linear {
            name: name.into(),
            spec,
        }
    }

    pub fn log_linear(name: impl Into<String>, spec: RegressionModel) -> Self {
        RiskFactorModel::LogLinear {
            name: name.into(),
            spec,
        }
    }

    pub fn logistic(name: impl Into<String>, spec: RegressionModel) -> Self {
        RiskFactorModel::Logistic {
            name: name.into(),
            spec,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            RiskFactorModel::Linear { name, .. }
            | RiskFactorModel::LogLinear { name, .. }
            | RiskFactorModel::Logistic { name, .. } => name,
        }
    }

    pub fn spec(&self) -> &RegressionModel {
        match self {
            RiskFactorModel::Linear { spec, .. }
            | RiskFactorModel::LogLinear { spec, .. }
            | RiskFactorModel::Logistic { spec, .. } => spec,
        }
    }

    pub fn linear_predictor(&self, person: &Person) -> SimResult<f64> {
        linear_predictor(self.name(), self.spec(), person)
    }

    pub fn estimate_next_risk<R: Rng>(&self, person: &Person, rng: &mut R) -> SimResult<f64> {
        let lp = self.linear_predictor(person)?;
        match self {
            RiskFactorModel::Linear { spec, .. } => Ok(lp + residual(spec, rng)),
            RiskFactorModel::LogLinear { spec, .. } => Ok((lp + residual(spec, rng)).exp()),
            RiskFactorModel::Logistic { .. } => Ok(lp),
        }
    }

    pub fn estimate_probability(&self, person: &Person) -> SimResult<f64> {
        let lp = self.linear_predictor(person)?;
        check_probability(expit(lp), "logistic model")
    }
}

fn residual<R: Rng>(spec: &RegressionModel, rng: &mut R) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    spec.residual_standard_error * z
}

pub fn expit(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn linear_predictor(model: &str, spec: &RegressionModel, person: &Person) -> SimResult<f64> {
    let mut lp = spec.intercept;
    for (term, coefficient) in &spec.coefficients {
        let value = evaluate_term(term, person).ok_or_else(|| SimError::MissingCovariate {
            model: model.to_string(),
            covariate: term.clone(),
        })?;
        lp += coefficient * value;
    }
    if !lp.is_finite() {
        return Err(SimError::NonFinitePrediction(model.to_string()));
    }
    Ok(lp)
}

// Evaluates a coefficient name against a person. Interactions are joined
// with `:`; each factor is a field optionally wrapped as `lagX`, `meanX`,
// `logX` or `XSquared`.
pub fn evaluate_term(term: &str, person: &Person) -> Option<f64> {
    term.split(':')
        .map(|factor| evaluate_factor(factor.trim(), person))
        .try_fold(1.0, |product, value| value.map(|v| product * v))
}

fn evaluate_factor(factor: &str, person: &Person) -> Option<f64> {
    if let Some(base) = factor.strip_suffix("Squared") {
        return evaluate_factor(base, person).map(|v| v * v);
    }
    if let Some(rest) = strip_camel_prefix(factor, "log") {
        return evaluate_factor(&rest, person).map(f64::ln);
    }
    if let Some(rest) = strip_camel_prefix(factor, "mean") {
        return person.covariate_mean(&rest);
    }
    if let Some(rest) = strip_camel_prefix(factor, "lag") {
        return person.covariate(&rest);
    }
    person.covariate(factor)
}

// "logTotChol" -> "totChol"; a prefix only counts when a capital follows.
fn strip_camel_prefix(name: &str, prefix: &str) -> Option<String> {
    let rest = name.strip_prefix(prefix)?;
    let mut chars = rest.chars();
    let first = chars.next()?;
    if !first.is_ascii_uppercase() {
        return None;
    }
    Some(first.to_ascii_lowercase().to_string() + chars.as_str())
}
