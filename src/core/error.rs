use thiserror::Error;

use super::types::OutcomeType;

#[derive(Debug, Error)]
pub enum SimError {
    #[error("model '{model}' references covariate '{covariate}' which the person does not record")]
    MissingCovariate { model: String, covariate: String },

    #[error("unknown risk model repository type '{0}' (expected 'cohort' or 'nhanes')")]
    UnknownRepository(String),

    #[error("failed to parse model specification '{name}': {source}")]
    ModelSpec {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("model '{0}' produced a non-finite linear predictor")]
    NonFinitePrediction(String),

    #[error("no model registered for '{0}'")]
    MissingModel(String),

    #[error("{context} produced probability {value}, outside [0, 1]")]
    ProbabilityOutOfRange { context: &'static str, value: f64 },

    #[error(
        "recalibration needs to roll back {requested} {outcome} events but only {available} occurred in the most recent wave"
    )]
    InsufficientEvents {
        outcome: OutcomeType,
        requested: usize,
        available: usize,
    },

    #[error("no {0} event recorded to roll back")]
    NoEventToRollBack(OutcomeType),

    #[error("cohort baseline {0} risk is zero or non-finite; no relative risk can be formed")]
    DegenerateBaselineRisk(OutcomeType),

    #[error("treatment strategy has no target relative risk for {0}")]
    MissingTarget(OutcomeType),

    #[error("age standard error: {0}")]
    AgeStandard(String),

    #[error("failed to parse cohort: {0}")]
    Cohort(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SimResult<T> = Result<T, SimError>;
