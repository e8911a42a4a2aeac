use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{SimError, SimResult};
use super::outcome::CvOutcomeDetermination;
use super::repository::{OutcomeModelRepository, RiskModelRepository};
use super::rng::{SimRng, bernoulli};
use super::treatment::TreatmentStandards;
use super::types::{
    Education, Outcome, OutcomeModelType, OutcomeRecord, OutcomeType, RaceEthnicity, RiskFactor,
    Sex, SmokingStatus,
};

const DIABETES_A1C_THRESHOLD: f64 = 6.5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineState {
    pub age: u32,
    pub sex: Sex,
    pub race_ethnicity: RaceEthnicity,
    pub sbp: f64,
    pub dbp: f64,
    pub a1c: f64,
    pub hdl: f64,
    pub ldl: f64,
    pub trig: f64,
    pub tot_chol: f64,
    pub bmi: f64,
    pub waist: f64,
    #[serde(default)]
    pub any_physical_activity: bool,
    pub smoking_status: SmokingStatus,
    pub education: Education,
    #[serde(default)]
    pub anti_hypertensive_count: u32,
    #[serde(default)]
    pub statin: bool,
    #[serde(default)]
    pub other_lipid_lowering_medication_count: u32,
    #[serde(default)]
    pub self_report_mi_age: Option<u32>,
    #[serde(default)]
    pub self_report_stroke_age: Option<u32>,
}

#[derive(Clone, Copy)]
pub struct AdvanceContext<'a> {
    pub risk_models: &'a RiskModelRepository,
    pub outcome_models: &'a OutcomeModelRepository,
    pub determination: &'a CvOutcomeDetermination,
    pub treatment: Option<&'a TreatmentStandards>,
}

#[derive(Debug, Clone)]
pub struct Person {
    sex: Sex,
    race_ethnicity: RaceEthnicity,
    age: Vec<u32>,
    sbp: Vec<f64>,
    dbp: Vec<f64>,
    a1c: Vec<f64>,
    hdl: Vec<f64>,
    ldl: Vec<f64>,
    trig: Vec<f64>,
    tot_chol: Vec<f64>,
    bmi: Vec<f64>,
    waist: Vec<f64>,
    any_physical_activity: Vec<bool>,
    smoking_status: Vec<SmokingStatus>,
    education: Vec<Education>,
    anti_hypertensive_count: Vec<u32>,
    statin: Vec<bool>,
    other_lipid_lowering_medication_count: Vec<u32>,
    self_report_mi_age: Option<u32>,
    self_report_stroke_age: Option<u32>,
    outcomes: BTreeMap<OutcomeType, Vec<OutcomeRecord>>,
    death_year: Option<u32>,
    treatment_initiated: bool,
}

impl Person {
    pub fn new(baseline: BaselineState) -> Self {
        Self {
            sex: baseline.sex,
            race_ethnicity: baseline.race_ethnicity,
            age: vec![baseline.age],
            sbp: vec![baseline.sbp],
            dbp: vec![baseline.dbp],
            a1c: vec![baseline.a1c],
            hdl: vec![baseline.hdl],
            ldl: vec![baseline.ldl],
            trig: vec![baseline.trig],
            tot_chol: vec![baseline.tot_chol],
            bmi: vec![baseline.bmi],
            waist: vec![baseline.waist],
            any_physical_activity: vec![baseline.any_physical_activity],
            smoking_status: vec![baseline.smoking_status],
            education: vec![baseline.education],
            anti_hypertensive_count: vec![baseline.anti_hypertensive_count],
            statin: vec![baseline.statin],
            other_lipid_lowering_medication_count: vec![
                baseline.other_lipid_lowering_medication_count,
            ],
            self_report_mi_age: baseline.self_report_mi_age,
            self_report_stroke_age: baseline.self_report_stroke_age,
            outcomes: BTreeMap::new(),
            death_year: None,
            treatment_initiated: false,
        }
    }

    pub fn sex(&self) -> Sex {
        self.sex
    }

    pub fn race_ethnicity(&self) -> RaceEthnicity {
        self.race_ethnicity
    }

    pub fn current_age(&self) -> u32 {
        self.age[self.age.len() - 1]
    }

    pub fn baseline_age(&self) -> u32 {
        self.age[0]
    }

    pub fn baseline_state(&self) -> BaselineState {
        BaselineState {
            age: self.age[0],
            sex: self.sex,
            race_ethnicity: self.race_ethnicity,
            sbp: self.sbp[0],
            dbp: self.dbp[0],
            a1c: self.a1c[0],
            hdl: self.hdl[0],
            ldl: self.ldl[0],
            trig: self.trig[0],
            tot_chol: self.tot_chol[0],
            bmi: self.bmi[0],
            waist: self.waist[0],
            any_physical_activity: self.any_physical_activity[0],
            smoking_status: self.smoking_status[0],
            education: self.education[0],
            anti_hypertensive_count: self.anti_hypertensive_count[0],
            statin: self.statin[0],
            other_lipid_lowering_medication_count: self.other_lipid_lowering_medication_count[0],
            self_report_mi_age: self.self_report_mi_age,
            self_report_stroke_age: self.self_report_stroke_age,
        }
    }

    pub fn years_in_simulation(&self) -> u32 {
        (self.age.len() - 1) as u32
    }

    pub fn is_dead(&self) -> bool {
        self.death_year.is_some()
    }

    pub fn death_year(&self) -> Option<u32> {
        self.death_year
    }

    pub fn has_prior_mi(&self) -> bool {
        self.self_report_mi_age.is_some() || self.has_outcome_during_simulation(OutcomeType::Mi)
    }

    pub fn has_prior_stroke(&self) -> bool {
        self.self_report_stroke_age.is_some()
            || self.has_outcome_during_simulation(OutcomeType::Stroke)
    }

    pub fn self_reported_mi_prior_to_sim(&self) -> bool {
        self.self_report_mi_age.is_some()
    }

    pub fn self_reported_stroke_prior_to_sim(&self) -> bool {
        self.self_report_stroke_age.is_some()
    }

    pub fn history(&self, factor: RiskFactor) -> &[f64] {
        match factor {
            RiskFactor::Hdl => &self.hdl,
            RiskFactor::Bmi => &self.bmi,
            RiskFactor::TotChol => &self.tot_chol,
            RiskFactor::Trig => &self.trig,
            RiskFactor::A1c => &self.a1c,
            RiskFactor::Ldl => &self.ldl,
            RiskFactor::Sbp => &self.sbp,
            RiskFactor::Dbp => &self.dbp,
        }
    }

    fn history_mut(&mut self, factor: RiskFactor) -> &mut Vec<f64> {
        match factor {
            RiskFactor::Hdl => &mut self.hdl,
            RiskFactor::Bmi => &mut self.bmi,
            RiskFactor::TotChol => &mut self.tot_chol,
            RiskFactor::Trig => &mut self.trig,
            RiskFactor::A1c => &mut self.a1c,
            RiskFactor::Ldl => &mut self.ldl,
            RiskFactor::Sbp => &mut self.sbp,
            RiskFactor::Dbp => &mut self.dbp,
        }
    }

    pub fn current(&self, factor: RiskFactor) -> f64 {
        let history = self.history(factor);
        history[history.len() - 1]
    }

    pub fn set_current(&mut self, factor: RiskFactor, value: f64) {
        if let Some(last) = self.history_mut(factor).last_mut() {
            *last = value;
        }
    }

    pub fn current_waist(&self) -> f64 {
        self.waist[self.waist.len() - 1]
    }

    pub fn current_smoking_status(&self) -> SmokingStatus {
        self.smoking_status[self.smoking_status.len() - 1]
    }

    pub fn current_education(&self) -> Education {
        self.education[self.education.len() - 1]
    }

    pub fn current_anti_hypertensive_count(&self) -> u32 {
        self.anti_hypertensive_count[self.anti_hypertensive_count.len() - 1]
    }

    pub fn current_statin(&self) -> bool {
        self.statin[self.statin.len() - 1]
    }

    pub fn current_other_lipid_lowering_medication_count(&self) -> u32 {
        self.other_lipid_lowering_medication_count
            [self.other_lipid_lowering_medication_count.len() - 1]
    }

    pub fn current_any_physical_activity(&self) -> bool {
        self.any_physical_activity[self.any_physical_activity.len() - 1]
    }

    pub fn covariate(&self, name: &str) -> Option<f64> {
        self.covariate_at(name, self.age.len() - 1)
    }

    pub fn covariate_mean(&self, name: &str) -> Option<f64> {
        let len = self.age.len();
        let mut sum = 0.0;
        for idx in 0..len {
            sum += self.covariate_at(name, idx)?;
        }
        Some(sum / len as f64)
    }

    fn covariate_at(&self, name: &str, idx: usize) -> Option<f64> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        let value = match name {
            "age" => self.age[idx] as f64,
            "sbp" => self.sbp[idx],
            "dbp" => self.dbp[idx],
            "a1c" => self.a1c[idx],
            "hdl" => self.hdl[idx],
            "ldl" => self.ldl[idx],
            "trig" => self.trig[idx],
            "totChol" => self.tot_chol[idx],
            "bmi" => self.bmi[idx],
            "waist" => self.waist[idx],
            "anyPhysicalActivity" => flag(self.any_physical_activity[idx]),
            "antiHypertensiveCount" => self.anti_hypertensive_count[idx] as f64,
            "statin" => flag(self.statin[idx]),
            "otherLipidLoweringMedicationCount" => {
                self.other_lipid_lowering_medication_count[idx] as f64
            }
            "bpTreated" => flag(self.anti_hypertensive_count[idx] > 0),
            "bpUntreated" => flag(self.anti_hypertensive_count[idx] == 0),
            "diabetes" => flag(self.a1c[idx] >= DIABETES_A1C_THRESHOLD),
            "currentSmoker" => flag(self.smoking_status[idx] == SmokingStatus::Current),
            "formerSmoker" => flag(self.smoking_status[idx] == SmokingStatus::Former),
            "collegeEducated" => flag(self.education[idx] == Education::CollegeGraduate),
            "lessThanHighSchool" => flag(matches!(
                self.education[idx],
                Education::LessThanNinthGrade | Education::SomeHighSchool
            )),
            "female" => flag(self.sex == Sex::Female),
            "black" => flag(self.race_ethnicity == RaceEthnicity::NonHispanicBlack),
            "hispanic" => flag(self.race_ethnicity.is_hispanic()),
            "priorMi" => flag(self.has_prior_mi()),
            "priorStroke" => flag(self.has_prior_stroke()),
            _ => return None,
        };
        Some(value)
    }

    pub fn advance_year(
        &mut self,
        ctx: &AdvanceContext<'_>,
        year: u32,
        rng: &mut SimRng,
    ) -> SimResult<Option<Outcome>> {
        if self.is_dead() {
            return Ok(None);
        }

        // Every factor is estimated from the pre-advance state.
        let mut next = Vec::with_capacity(RiskFactor::ALL.len());
        for factor in RiskFactor::ALL {
            let model = ctx.risk_models.get_model(factor)?;
            next.push((factor, model.estimate_next_risk(self, rng)?));
        }
        self.append_year(&next);

        if let Some(treatment) = ctx.treatment {
            self.initiate_treatment(treatment);
        }

        let outcome =
            ctx.determination
                .assign_outcome_for_person(ctx.outcome_models, self, 1, rng)?;
        if let Some(outcome) = outcome {
            self.add_outcome(outcome, year);
        }

        if !self.is_dead() {
            let non_cv_risk =
                ctx.outcome_models
                    .get_risk_for_person(self, OutcomeModelType::NonCvMortality, 1)?;
            if bernoulli(rng, non_cv_risk, "non-CV mortality")? {
                self.death_year = Some(year);
            }
        }

        Ok(outcome)
    }

    fn append_year(&mut self, next: &[(RiskFactor, f64)]) {
        for &(factor, value) in next {
            self.history_mut(factor).push(value);
        }
        let age = self.current_age() + 1;
        let waist = self.current_waist();
        let any_physical_activity = self.current_any_physical_activity();
        let smoking_status = self.current_smoking_status();
        let education = self.current_education();
        let anti_hypertensive_count = self.current_anti_hypertensive_count();
        let statin = self.current_statin();
        let other_lipid_lowering = self.current_other_lipid_lowering_medication_count();

        self.age.push(age);
        self.waist.push(waist);
        self.any_physical_activity.push(any_physical_activity);
        self.smoking_status.push(smoking_status);
        self.education.push(education);
        self.anti_hypertensive_count.push(anti_hypertensive_count);
        self.statin.push(statin);
        self.other_lipid_lowering_medication_count
            .push(other_lipid_lowering);
    }

    // Applies a treatment once, on the first year it is active for this
    // person. Later years inherit the effect through the lagged values.
    fn initiate_treatment(&mut self, treatment: &TreatmentStandards) {
        if self.treatment_initiated {
            return;
        }
        for (&factor, &delta) in &treatment.risk_factor_effects {
            let value = self.current(factor) + delta;
            self.set_current(factor, value);
        }
        if let Some(count) = self.anti_hypertensive_count.last_mut() {
            *count += treatment.treatment_change.added_anti_hypertensives;
        }
        self.treatment_initiated = true;
    }

    pub fn add_outcome(&mut self, outcome: Outcome, year: u32) {
        let record = OutcomeRecord {
            age: self.current_age(),
            fatal: outcome.fatal,
            year,
        };
        self.outcomes
            .entry(outcome.outcome_type)
            .or_default()
            .push(record);
        if outcome.fatal {
            self.death_year = Some(year);
        }
    }

    pub fn outcomes(&self, outcome_type: OutcomeType) -> &[OutcomeRecord] {
        self.outcomes
            .get(&outcome_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn has_outcome_during_simulation(&self, outcome_type: OutcomeType) -> bool {
        !self.outcomes(outcome_type).is_empty()
    }

    pub fn has_outcome_at_age(&self, outcome_type: OutcomeType, age: u32) -> bool {
        self.outcomes(outcome_type).iter().any(|r| r.age == age)
    }

    pub fn has_outcome_in_year(&self, outcome_type: OutcomeType, year: u32) -> bool {
        self.outcomes(outcome_type).iter().any(|r| r.year == year)
    }

    pub fn rollback_most_recent_event(
        &mut self,
        outcome_type: OutcomeType,
    ) -> SimResult<OutcomeRecord> {
        let record = self
            .outcomes
            .get_mut(&outcome_type)
            .and_then(Vec::pop)
            .ok_or(SimError::NoEventToRollBack(outcome_type))?;
        if record.fatal && self.death_year == Some(record.year) {
            self.death_year = None;
        }
        Ok(record)
    }

    #[cfg(test)]
    pub(crate) fn history_lengths(&self) -> Vec<usize> {
        vec![
            self.age.len(),
            self.sbp.len(),
            self.dbp.len(),
            self.a1c.len(),
            self.hdl.len(),
            self.ldl.len(),
            self.trig.len(),
            self.tot_chol.len(),
            self.bmi.len(),
            self.waist.len(),
            self.any_physical_activity.len(),
            self.smoking_status.len(),
            self.education.len(),
            self.anti_hypertensive_count.len(),
            self.statin.len(),
            self.other_lipid_lowering_medication_count.len(),
        ]
    }
}

#[cfg(test)]
pub(crate) fn sample_baseline() -> BaselineState {
    BaselineState {
        age: 60,
        sex: Sex::Male,
        race_ethnicity: RaceEthnicity::NonHispanicWhite,
        sbp: 135.0,
        dbp: 82.0,
        a1c: 5.6,
        hdl: 48.0,
        ldl: 120.0,
        trig: 140.0,
        tot_chol: 200.0,
        bmi: 28.0,
        waist: 98.0,
        any_physical_activity: true,
        smoking_status: SmokingStatus::Never,
        education: Education::SomeCollege,
        anti_hypertensive_count: 0,
        statin: false,
        other_lipid_lowering_medication_count: 0,
        self_report_mi_age: None,
        self_report_stroke_age: None,
    }
}
