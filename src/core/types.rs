use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::outcome::CvOutcomeConfig;
use super::repository::RiskModelSet;
use super::treatment::BpLoweringStrategy;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RaceEthnicity {
    MexicanAmerican,
    OtherHispanic,
    NonHispanicWhite,
    NonHispanicBlack,
    OtherRace,
}

impl RaceEthnicity {
    pub fn is_hispanic(self) -> bool {
        matches!(
            self,
            RaceEthnicity::MexicanAmerican | RaceEthnicity::OtherHispanic
        )
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SmokingStatus {
    Never,
    Former,
    Current,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Education {
    LessThanNinthGrade,
    SomeHighSchool,
    HighSchoolGraduate,
    SomeCollege,
    CollegeGraduate,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RiskFactor {
    Hdl,
    Bmi,
    TotChol,
    Trig,
    A1c,
    Ldl,
    Sbp,
    Dbp,
}

impl RiskFactor {
    pub const ALL: [RiskFactor; 8] = [
        RiskFactor::Hdl,
        RiskFactor::Bmi,
        RiskFactor::TotChol,
        RiskFactor::Trig,
        RiskFactor::A1c,
        RiskFactor::Ldl,
        RiskFactor::Sbp,
        RiskFactor::Dbp,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RiskFactor::Hdl => "hdl",
            RiskFactor::Bmi => "bmi",
            RiskFactor::TotChol => "totChol",
            RiskFactor::Trig => "trig",
            RiskFactor::A1c => "a1c",
            RiskFactor::Ldl => "ldl",
            RiskFactor::Sbp => "sbp",
            RiskFactor::Dbp => "dbp",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        RiskFactor::ALL.into_iter().find(|f| f.name() == name)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeType {
    Mi,
    Stroke,
}

impl OutcomeType {
    pub const ALL: [OutcomeType; 2] = [OutcomeType::Mi, OutcomeType::Stroke];
}

impl fmt::Display for OutcomeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeType::Mi => f.write_str("MI"),
            OutcomeType::Stroke => f.write_str("stroke"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum OutcomeModelType {
    Cardiovascular,
    NonCvMortality,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub outcome_type: OutcomeType,
    pub fatal: bool,
}

impl Outcome {
    pub fn new(outcome_type: OutcomeType, fatal: bool) -> Self {
        Self {
            outcome_type,
            fatal,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub age: u32,
    pub fatal: bool,
    pub year: u32,
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub cohort_size: usize,
    pub years: u32,
    pub seed: u64,
    pub risk_model_set: RiskModelSet,
    pub parallel: bool,
    pub outcome: CvOutcomeConfig,
    pub treatment: Option<BpLoweringStrategy>,
    pub standardization_year: Option<u32>,
    pub age_standard_path: Option<PathBuf>,
    pub cohort_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearSummary {
    pub year: u32,
    pub alive_at_start: usize,
    pub mi_events: usize,
    pub stroke_events: usize,
    pub fatal_mi: usize,
    pub fatal_stroke: usize,
    pub deaths: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalibrationReport {
    pub year: u32,
    pub treatment_change: String,
    pub model_stroke_relative_risk: f64,
    pub model_mi_relative_risk: f64,
    pub target_stroke_relative_risk: f64,
    pub stroke_delta: f64,
    pub strokes_before: usize,
    pub strokes_rolled_back: usize,
    pub strokes_after: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardizedRate {
    pub outcome: String,
    pub standard_year: u32,
    pub rate_per_100k: f64,
    pub total_events: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    pub cohort_size: usize,
    pub years: u32,
    pub seed: u64,
    pub risk_model_set: RiskModelSet,
    pub total_mi: usize,
    pub total_stroke: usize,
    pub total_deaths: usize,
    pub year_summaries: Vec<YearSummary>,
    pub recalibrations: Vec<RecalibrationReport>,
    pub standardized_rates: Vec<StandardizedRate>,
}
