mod cohort;
mod engine;
mod error;
mod outcome;
mod person;
mod population;
mod regression;
mod repository;
mod rng;
mod standard;
mod treatment;
mod types;

pub use cohort::{build_synthetic_cohort, load_cohort_json, parse_cohort_json};
pub use engine::{DEFAULT_STANDARDIZATION_YEAR, run_simulation, run_simulation_with_cache};
pub use error::{SimError, SimResult};
pub use outcome::{CvOutcomeConfig, CvOutcomeDetermination};
pub use person::{BaselineState, Person};
pub use population::Population;
pub use regression::{RegressionModel, RiskFactorModel};
pub use repository::{OutcomeModelRepository, RiskModelRepository, RiskModelSet};
pub use standard::{AgeStandard, AgeStandardCache, AgeStandardSource, StandardizedMeasure};
pub use treatment::{BpLoweringStrategy, TreatmentChange, TreatmentStandards, TreatmentStrategy};
pub use types::{
    Education, Outcome, OutcomeRecord, OutcomeType, RaceEthnicity, RecalibrationReport,
    RiskFactor, Sex, SimulationConfig, SimulationResult, SmokingStatus, StandardizedRate,
    YearSummary,
};
