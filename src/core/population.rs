use std::collections::HashMap;
use std::hash::Hash;

use rand::seq::index;
use rayon::prelude::*;

use super::error::{SimError, SimResult};
use super::outcome::CvOutcomeDetermination;
use super::person::{AdvanceContext, BaselineState, Person};
use super::repository::{OutcomeModelRepository, RiskModelRepository, RiskModelSet};
use super::rng::{person_rng, population_rng};
use super::treatment::{TreatmentStandards, TreatmentStrategy};
use super::types::{OutcomeModelType, OutcomeType, RecalibrationReport, RiskFactor, YearSummary};

pub struct Population {
    people: Vec<Person>,
    risk_models: RiskModelRepository,
    outcome_models: OutcomeModelRepository,
    determination: CvOutcomeDetermination,
    treatment: Option<Box<dyn TreatmentStrategy>>,
    seed: u64,
    total_years_advanced: u32,
    year_summaries: Vec<YearSummary>,
    recalibrations: Vec<RecalibrationReport>,
}

#[derive(Debug, Clone, Copy)]
struct CohortRisk {
    stroke: f64,
    mi: f64,
}

impl Population {
    pub fn new(
        people: Vec<Person>,
        risk_models: RiskModelRepository,
        outcome_models: OutcomeModelRepository,
        determination: CvOutcomeDetermination,
        seed: u64,
    ) -> Self {
        Self {
            people,
            risk_models,
            outcome_models,
            determination,
            treatment: None,
            seed,
            total_years_advanced: 0,
            year_summaries: Vec::new(),
            recalibrations: Vec::new(),
        }
    }

    pub fn with_repository_type(
        people: Vec<Person>,
        repository_type: &str,
        determination: CvOutcomeDetermination,
        seed: u64,
    ) -> SimResult<Self> {
        let set: RiskModelSet = repository_type.parse()?;
        Ok(Self::new(
            people,
            RiskModelRepository::new(set)?,
            OutcomeModelRepository::new()?,
            determination,
            seed,
        ))
    }

    pub fn set_treatment_strategy(&mut self, strategy: Box<dyn TreatmentStrategy>) {
        self.treatment = Some(strategy);
    }

    pub fn people(&self) -> &[Person] {
        &self.people
    }

    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    pub fn total_years_advanced(&self) -> u32 {
        self.total_years_advanced
    }

    pub fn year_summaries(&self) -> &[YearSummary] {
        &self.year_summaries
    }

    pub fn recalibrations(&self) -> &[RecalibrationReport] {
        &self.recalibrations
    }

    pub fn advance(&mut self, years: u32) -> SimResult<()> {
        for _ in 0..years {
            self.advance_one_year(false)?;
        }
        Ok(())
    }

    pub fn advance_parallel(&mut self, years: u32) -> SimResult<()> {
        for _ in 0..years {
            self.advance_one_year(true)?;
        }
        Ok(())
    }

    fn advance_one_year(&mut self, parallel: bool) -> SimResult<()> {
        let year = self.total_years_advanced + 1;
        let standards = self.treatment.as_ref().map(|s| s.standards(year));
        let alive_at_start = self.people.iter().filter(|p| !p.is_dead()).count();

        let ctx = AdvanceContext {
            risk_models: &self.risk_models,
            outcome_models: &self.outcome_models,
            determination: &self.determination,
            treatment: standards.as_ref(),
        };
        let seed = self.seed;
        let advance = |(idx, person): (usize, &mut Person)| -> SimResult<()> {
            let mut rng = person_rng(seed, year, idx);
            person.advance_year(&ctx, year, &mut rng).map(|_| ())
        };
        if parallel {
            self.people.par_iter_mut().enumerate().try_for_each(advance)?;
        } else {
            self.people.iter_mut().enumerate().try_for_each(advance)?;
        }
        self.total_years_advanced = year;

        if let Some(standards) = standards.as_ref() {
            let report = self.recalibrate_bp_treatment(standards)?;
            self.recalibrations.push(report);
        }

        let summary = self.summarize_year(year, alive_at_start);
        log::info!(
            "year {}: {} alive at start, {} MI, {} stroke, {} deaths",
            summary.year,
            summary.alive_at_start,
            summary.mi_events,
            summary.stroke_events,
            summary.deaths
        );
        self.year_summaries.push(summary);
        Ok(())
    }

    fn summarize_year(&self, year: u32, alive_at_start: usize) -> YearSummary {
        let mut summary = YearSummary {
            year,
            alive_at_start,
            mi_events: 0,
            stroke_events: 0,
            fatal_mi: 0,
            fatal_stroke: 0,
            deaths: 0,
        };
        for person in &self.people {
            for record in person.outcomes(OutcomeType::Mi) {
                if record.year == year {
                    summary.mi_events += 1;
                    summary.fatal_mi += record.fatal as usize;
                }
            }
            for record in person.outcomes(OutcomeType::Stroke) {
                if record.year == year {
                    summary.stroke_events += 1;
                    summary.fatal_stroke += record.fatal as usize;
                }
            }
            if person.death_year() == Some(year) {
                summary.deaths += 1;
            }
        }
        summary
    }

    pub fn get_events_in_most_recent_wave(&self, outcome_type: OutcomeType) -> Vec<usize> {
        let year = self.total_years_advanced;
        self.people
            .iter()
            .enumerate()
            .filter(|(_, p)| p.has_outcome_in_year(outcome_type, year))
            .map(|(idx, _)| idx)
            .collect()
    }

    pub fn recalibrate_bp_treatment(
        &mut self,
        standards: &TreatmentStandards,
    ) -> SimResult<RecalibrationReport> {
        let target = standards
            .outcome_targets
            .get(&OutcomeType::Stroke)
            .copied()
            .ok_or(SimError::MissingTarget(OutcomeType::Stroke))?;

        let baseline = self.cohort_risk()?;
        for (outcome, risk) in [
            (OutcomeType::Stroke, baseline.stroke),
            (OutcomeType::Mi, baseline.mi),
        ] {
            if !(risk.is_finite() && risk > 0.0) {
                return Err(SimError::DegenerateBaselineRisk(outcome));
            }
        }
        let snapshot = self.apply_risk_factor_effects(&standards.risk_factor_effects);
        let treated = self.cohort_risk();
        self.restore_risk_factors(snapshot);
        let treated = treated?;

        let model_stroke_rr = treated.stroke / baseline.stroke;
        let model_mi_rr = treated.mi / baseline.mi;
        // Negative: the cohort carries too many strokes for the target.
        let stroke_delta = model_stroke_rr - target;

        let strokes = self.get_events_in_most_recent_wave(OutcomeType::Stroke);
        let mut rolled_back = 0;
        if stroke_delta < 0.0 {
            let requested = (stroke_delta * self.people.len() as f64).abs().round() as usize;
            if requested > strokes.len() {
                return Err(SimError::InsufficientEvents {
                    outcome: OutcomeType::Stroke,
                    requested,
                    available: strokes.len(),
                });
            }
            let mut rng = population_rng(self.seed, self.total_years_advanced);
            for pick in index::sample(&mut rng, strokes.len(), requested).into_iter() {
                self.people[strokes[pick]].rollback_most_recent_event(OutcomeType::Stroke)?;
            }
            rolled_back = requested;
        } else if stroke_delta > 0.0 {
            log::warn!(
                "model stroke relative risk {model_stroke_rr:.4} exceeds target {target:.4}; no events injected"
            );
        }

        let report = RecalibrationReport {
            year: self.total_years_advanced,
            treatment_change: standards.treatment_change.description.clone(),
            model_stroke_relative_risk: model_stroke_rr,
            model_mi_relative_risk: model_mi_rr,
            target_stroke_relative_risk: target,
            stroke_delta,
            strokes_before: strokes.len(),
            strokes_rolled_back: rolled_back,
            strokes_after: strokes.len() - rolled_back,
        };
        log::info!(
            "recalibration year {}: model stroke RR {:.4}, target {:.4}, delta {:.4}, strokes {} -> {}",
            report.year,
            report.model_stroke_relative_risk,
            report.target_stroke_relative_risk,
            report.stroke_delta,
            report.strokes_before,
            report.strokes_after
        );
        Ok(report)
    }

    fn cohort_risk(&self) -> SimResult<CohortRisk> {
        let mut stroke = 0.0;
        let mut mi = 0.0;
        for person in &self.people {
            let combined = self.outcome_models.get_risk_for_person(
                person,
                OutcomeModelType::Cardiovascular,
                1,
            )?;
            let stroke_share = self
                .determination
                .get_stroke_probability(&self.outcome_models, person)?;
            stroke += combined * stroke_share;
            mi += combined * (1.0 - stroke_share);
        }
        let n = self.people.len().max(1) as f64;
        Ok(CohortRisk {
            stroke: stroke / n,
            mi: mi / n,
        })
    }

    fn apply_risk_factor_effects(
        &mut self,
        effects: &std::collections::BTreeMap<RiskFactor, f64>,
    ) -> Vec<(usize, RiskFactor, f64)> {
        let mut snapshot = Vec::with_capacity(self.people.len() * effects.len());
        for (idx, person) in self.people.iter_mut().enumerate() {
            for (&factor, &delta) in effects {
                let original = person.current(factor);
                snapshot.push((idx, factor, original));
                person.set_current(factor, original + delta);
            }
        }
        snapshot
    }

    fn restore_risk_factors(&mut self, snapshot: Vec<(usize, RiskFactor, f64)>) {
        for (idx, factor, original) in snapshot {
            self.people[idx].set_current(factor, original);
        }
    }

    pub fn count_events(&self, outcome_type: OutcomeType) -> usize {
        self.people
            .iter()
            .map(|p| p.outcomes(outcome_type).len())
            .sum()
    }

    pub fn count_deaths(&self) -> usize {
        self.people.iter().filter(|p| p.is_dead()).count()
    }

    pub fn generate_starting_mean_patient(&self) -> Option<Person> {
        let baselines: Vec<BaselineState> =
            self.people.iter().map(Person::baseline_state).collect();
        let first = baselines.first()?;
        let n = baselines.len() as f64;
        let mean = |f: fn(&BaselineState) -> f64| baselines.iter().map(f).sum::<f64>() / n;

        Some(Person::new(BaselineState {
            age: mean(|b| b.age as f64).round() as u32,
            sex: mode(baselines.iter().map(|b| b.sex)).unwrap_or(first.sex),
            race_ethnicity: mode(baselines.iter().map(|b| b.race_ethnicity))
                .unwrap_or(first.race_ethnicity),
            sbp: mean(|b| b.sbp),
            dbp: mean(|b| b.dbp),
            a1c: mean(|b| b.a1c),
            hdl: mean(|b| b.hdl),
            ldl: mean(|b| b.ldl),
            trig: mean(|b| b.trig),
            tot_chol: mean(|b| b.tot_chol),
            bmi: mean(|b| b.bmi),
            waist: mean(|b| b.waist),
            any_physical_activity: mode(baselines.iter().map(|b| b.any_physical_activity))
                .unwrap_or(first.any_physical_activity),
            smoking_status: mode(baselines.iter().map(|b| b.smoking_status))
                .unwrap_or(first.smoking_status),
            education: mode(baselines.iter().map(|b| b.education)).unwrap_or(first.education),
            anti_hypertensive_count: mean(|b| b.anti_hypertensive_count as f64).round() as u32,
            statin: mode(baselines.iter().map(|b| b.statin)).unwrap_or(first.statin),
            other_lipid_lowering_medication_count: mean(|b| {
                b.other_lipid_lowering_medication_count as f64
            })
            .round() as u32,
            self_report_mi_age: None,
            self_report_stroke_age: None,
        }))
    }
}

// Ties resolve to the value seen first.
fn mode<T: Copy + Eq + Hash>(values: impl Iterator<Item = T>) -> Option<T> {
    let mut counts: HashMap<T, (usize, usize)> = HashMap::new();
    for (order, value) in values.enumerate() {
        counts.entry(value).or_insert((0, order)).0 += 1;
    }
    counts
        .into_iter()
        .max_by(|(_, (ca, oa)), (_, (cb, ob))| ca.cmp(cb).then(ob.cmp(oa)))
        .map(|(value, _)| value)
}
