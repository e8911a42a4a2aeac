use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{SimError, SimResult};
use super::person::Person;
use super::regression::{RegressionModel, RiskFactorModel, linear_predictor};
use super::rng::check_probability;
use super::types::{OutcomeModelType, RaceEthnicity, RiskFactor, Sex};

const COHORT_MODELS_JSON: &str = include_str!("../../data/models/cohort.json");
const NHANES_MODELS_JSON: &str = include_str!("../../data/models/nhanes.json");
const ASCVD_MODEL_JSON: &str = include_str!("../../data/models/ascvd.json");
const PARTITION_MODEL_JSON: &str = include_str!("../../data/models/strokeMiPartition.json");
const NON_CV_MORTALITY_JSON: &str = include_str!("../../data/models/nonCvMortality.json");

const ASCVD_HORIZON_YEARS: f64 = 10.0;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskModelSet {
    Cohort,
    Nhanes,
}

impl RiskModelSet {
    fn source(self) -> (&'static str, &'static str) {
        match self {
            RiskModelSet::Cohort => ("cohort", COHORT_MODELS_JSON),
            RiskModelSet::Nhanes => ("nhanes", NHANES_MODELS_JSON),
        }
    }
}

impl FromStr for RiskModelSet {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cohort" => Ok(RiskModelSet::Cohort),
            "nhanes" => Ok(RiskModelSet::Nhanes),
            _ => Err(SimError::UnknownRepository(s.to_string())),
        }
    }
}

impl fmt::Display for RiskModelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source().0)
    }
}

#[derive(Debug, Clone)]
pub struct RiskModelRepository {
    models: BTreeMap<RiskFactor, RiskFactorModel>,
}

impl RiskModelRepository {
    pub fn new(set: RiskModelSet) -> SimResult<Self> {
        let (set_name, json) = set.source();
        let specs: BTreeMap<String, RegressionModel> =
            serde_json::from_str(json).map_err(|source| SimError::ModelSpec {
                name: set_name.to_string(),
                source,
            })?;

        let mut models = BTreeMap::new();
        for (key, spec) in specs {
            // Blood pressure models predict on the log scale.
            let (factor, log) = match key.strip_prefix("log") {
                Some(rest) => (factor_from_key(&rest.to_ascii_lowercase())?, true),
                None => (factor_from_key(&key)?, false),
            };
            let name = format!("{set_name}:{key}");
            let model = if log {
                RiskFactorModel::log_linear(name, spec)
            } else {
                RiskFactorModel::linear(name, spec)
            };
            models.insert(factor, model);
        }

        let repository = Self { models };
        for factor in RiskFactor::ALL {
            repository.get_model(factor)?;
        }
        Ok(repository)
    }

    pub fn from_models(models: impl IntoIterator<Item = (RiskFactor, RiskFactorModel)>) -> Self {
        Self {
            models: models.into_iter().collect(),
        }
    }

    pub fn get_model(&self, factor: RiskFactor) -> SimResult<&RiskFactorModel> {
        self.models
            .get(&factor)
            .ok_or_else(|| SimError::MissingModel(factor.name().to_string()))
    }
}

fn factor_from_key(key: &str) -> SimResult<RiskFactor> {
    RiskFactor::from_name(key).ok_or_else(|| SimError::MissingModel(key.to_string()))
}

// One pooled cohort equation: 10-year risk is `1 - S0^exp(lp)` where the
// intercept already carries the group's mean offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PooledCohortEquation {
    #[serde(flatten)]
    pub model: RegressionModel,
    pub baseline_survival: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PooledCohortModel {
    pub white_female: PooledCohortEquation,
    pub black_female: PooledCohortEquation,
    pub white_male: PooledCohortEquation,
    pub black_male: PooledCohortEquation,
}

impl PooledCohortModel {
    fn equation_for(&self, person: &Person) -> (&'static str, &PooledCohortEquation) {
        let black = person.race_ethnicity() == RaceEthnicity::NonHispanicBlack;
        match (person.sex(), black) {
            (Sex::Female, false) => ("ascvd:whiteFemale", &self.white_female),
            (Sex::Female, true) => ("ascvd:blackFemale", &self.black_female),
            (Sex::Male, false) => ("ascvd:whiteMale", &self.white_male),
            (Sex::Male, true) => ("ascvd:blackMale", &self.black_male),
        }
    }

    pub fn ten_year_risk(&self, person: &Person) -> SimResult<f64> {
        let (name, equation) = self.equation_for(person);
        let lp = linear_predictor(name, &equation.model, person)?;
        Ok(1.0 - equation.baseline_survival.powf(lp.exp()))
    }
}

#[derive(Debug, Clone)]
pub enum CardiovascularModel {
    PooledCohort(PooledCohortModel),
    Logistic(RiskFactorModel),
}

impl CardiovascularModel {
    fn risk(&self, person: &Person, years: u32) -> SimResult<f64> {
        match self {
            CardiovascularModel::PooledCohort(model) => {
                Ok(model.ten_year_risk(person)? * years as f64 / ASCVD_HORIZON_YEARS)
            }
            CardiovascularModel::Logistic(model) => {
                let annual = model.estimate_probability(person)?;
                Ok(1.0 - (1.0 - annual).powi(years as i32))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutcomeModelRepository {
    cardiovascular: CardiovascularModel,
    non_cv_mortality: RiskFactorModel,
    stroke_partition: RiskFactorModel,
}

impl OutcomeModelRepository {
    pub fn new() -> SimResult<Self> {
        let ascvd: PooledCohortModel =
            serde_json::from_str(ASCVD_MODEL_JSON).map_err(|source| SimError::ModelSpec {
                name: "ascvd".to_string(),
                source,
            })?;
        let partition = RegressionModel::from_json("strokeMiPartition", PARTITION_MODEL_JSON)?;
        let mortality = RegressionModel::from_json("nonCvMortality", NON_CV_MORTALITY_JSON)?;

        Ok(Self::with_models(
            CardiovascularModel::PooledCohort(ascvd),
            RiskFactorModel::logistic("nonCvMortality", mortality),
            RiskFactorModel::logistic("strokeMiPartition", partition),
        ))
    }

    pub fn with_models(
        cardiovascular: CardiovascularModel,
        non_cv_mortality: RiskFactorModel,
        stroke_partition: RiskFactorModel,
    ) -> Self {
        Self {
            cardiovascular,
            non_cv_mortality,
            stroke_partition,
        }
    }

    pub fn get_risk_for_person(
        &self,
        person: &Person,
        model_type: OutcomeModelType,
        years: u32,
    ) -> SimResult<f64> {
        let risk = match model_type {
            OutcomeModelType::Cardiovascular => self.cardiovascular.risk(person, years)?,
            OutcomeModelType::NonCvMortality => {
                let annual = self.non_cv_mortality.estimate_probability(person)?;
                1.0 - (1.0 - annual).powi(years as i32)
            }
        };
        check_probability(risk, "outcome model")
    }

    pub fn stroke_probability(&self, person: &Person) -> SimResult<f64> {
        self.stroke_partition.estimate_probability(person)
    }
}
