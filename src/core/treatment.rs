use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::{OutcomeType, RiskFactor};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreatmentChange {
    pub description: String,
    pub added_anti_hypertensives: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentStandards {
    pub treatment_change: TreatmentChange,
    pub risk_factor_effects: BTreeMap<RiskFactor, f64>,
    pub outcome_targets: BTreeMap<OutcomeType, f64>,
}

pub trait TreatmentStrategy: Send + Sync {
    fn standards(&self, year: u32) -> TreatmentStandards;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BpLoweringStrategy {
    pub sbp_effect: f64,
    pub dbp_effect: f64,
    pub stroke_relative_risk: f64,
    pub mi_relative_risk: f64,
    pub added_anti_hypertensives: u32,
}

impl Default for BpLoweringStrategy {
    // One standard-dose agent, per the blood pressure trialists' meta-analysis.
    fn default() -> Self {
        Self {
            sbp_effect: -5.5,
            dbp_effect: -3.1,
            stroke_relative_risk: 0.79,
            mi_relative_risk: 0.87,
            added_anti_hypertensives: 1,
        }
    }
}

impl TreatmentStrategy for BpLoweringStrategy {
    fn standards(&self, _year: u32) -> TreatmentStandards {
        TreatmentStandards {
            treatment_change: TreatmentChange {
                description: format!(
                    "add {} antihypertensive(s): sbp {:+}, dbp {:+}",
                    self.added_anti_hypertensives, self.sbp_effect, self.dbp_effect
                ),
                added_anti_hypertensives: self.added_anti_hypertensives,
            },
            risk_factor_effects: BTreeMap::from([
                (RiskFactor::Sbp, self.sbp_effect),
                (RiskFactor::Dbp, self.dbp_effect),
            ]),
            outcome_targets: BTreeMap::from([
                (OutcomeType::Stroke, self.stroke_relative_risk),
                (OutcomeType::Mi, self.mi_relative_risk),
            ]),
        }
    }
}
