use rand::Rng;
use serde::{Deserialize, Serialize};

use super::error::SimResult;
use super::person::Person;
use super::repository::OutcomeModelRepository;
use super::rng::{bernoulli, check_probability};
use super::types::{Outcome, OutcomeModelType, OutcomeType};

pub const DEFAULT_MI_CASE_FATALITY: f64 = 0.13;
pub const DEFAULT_SECONDARY_MI_CASE_FATALITY: f64 = 0.13;
pub const DEFAULT_STROKE_CASE_FATALITY: f64 = 0.15;
pub const DEFAULT_SECONDARY_STROKE_CASE_FATALITY: f64 = 0.15;
pub const DEFAULT_SECONDARY_PREVENTION_MULTIPLIER: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CvOutcomeConfig {
    pub mi_case_fatality: f64,
    pub mi_secondary_case_fatality: f64,
    pub stroke_case_fatality: f64,
    pub stroke_secondary_case_fatality: f64,
    pub secondary_prevention_multiplier: f64,
    pub manual_mi_probability: Option<f64>,
}

impl Default for CvOutcomeConfig {
    fn default() -> Self {
        Self {
            mi_case_fatality: DEFAULT_MI_CASE_FATALITY,
            mi_secondary_case_fatality: DEFAULT_SECONDARY_MI_CASE_FATALITY,
            stroke_case_fatality: DEFAULT_STROKE_CASE_FATALITY,
            stroke_secondary_case_fatality: DEFAULT_SECONDARY_STROKE_CASE_FATALITY,
            secondary_prevention_multiplier: DEFAULT_SECONDARY_PREVENTION_MULTIPLIER,
            manual_mi_probability: None,
        }
    }
}

// Three independent uniform draws are consumed in order when an event
// occurs: event, MI-vs-stroke, fatality.
#[derive(Debug, Clone, Default)]
pub struct CvOutcomeDetermination {
    config: CvOutcomeConfig,
}

impl CvOutcomeDetermination {
    pub fn new(config: CvOutcomeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &CvOutcomeConfig {
        &self.config
    }

    pub fn cv_risk(
        &self,
        repository: &OutcomeModelRepository,
        person: &Person,
        years: u32,
    ) -> SimResult<f64> {
        let risk =
            repository.get_risk_for_person(person, OutcomeModelType::Cardiovascular, years)?;
        if person.has_prior_mi() || person.has_prior_stroke() {
            check_probability(
                risk * self.config.secondary_prevention_multiplier,
                "secondary prevention cardiovascular risk",
            )
        } else {
            Ok(risk)
        }
    }

    pub fn get_stroke_probability(
        &self,
        repository: &OutcomeModelRepository,
        person: &Person,
    ) -> SimResult<f64> {
        repository.stroke_probability(person)
    }

    pub fn assign_outcome_for_person<R: Rng>(
        &self,
        repository: &OutcomeModelRepository,
        person: &Person,
        years: u32,
        rng: &mut R,
    ) -> SimResult<Option<Outcome>> {
        let cv_risk = self.cv_risk(repository, person, years)?;
        if !bernoulli(rng, cv_risk, "cardiovascular event")? {
            return Ok(None);
        }

        let outcome_type = if self.will_have_mi(repository, person, rng)? {
            OutcomeType::Mi
        } else {
            OutcomeType::Stroke
        };
        let fatal = bernoulli(
            rng,
            self.case_fatality(person, outcome_type),
            "case fatality",
        )?;
        Ok(Some(Outcome::new(outcome_type, fatal)))
    }

    fn will_have_mi<R: Rng>(
        &self,
        repository: &OutcomeModelRepository,
        person: &Person,
        rng: &mut R,
    ) -> SimResult<bool> {
        let mi_probability = match self.config.manual_mi_probability {
            Some(manual) => manual,
            None => 1.0 - self.get_stroke_probability(repository, person)?,
        };
        bernoulli(rng, mi_probability, "MI partition")
    }

    pub fn case_fatality(&self, person: &Person, outcome_type: OutcomeType) -> f64 {
        match outcome_type {
            OutcomeType::Mi if person.has_prior_mi() => self.config.mi_secondary_case_fatality,
            OutcomeType::Mi => self.config.mi_case_fatality,
            OutcomeType::Stroke if person.has_prior_stroke() => {
                self.config.stroke_secondary_case_fatality
            }
            OutcomeType::Stroke => self.config.stroke_case_fatality,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::core::error::SimError;
    use crate::core::person::sample_baseline;
    use crate::core::regression::{RegressionModel, RiskFactorModel};
    use crate::core::repository::CardiovascularModel;
    use crate::core::rng::person_rng;
    use proptest::prelude::{any, prop_assert, proptest};

    fn logit(p: f64) -> f64 {
        (p / (1.0 - p)).ln()
    }

    fn intercept_only(name: &str, probability: f64) -> RiskFactorModel {
        RiskFactorModel::logistic(
            name,
            RegressionModel {
                coefficients: BTreeMap::new(),
                intercept: logit(probability),
                residual_standard_error: 0.0,
            },
        )
    }

    pub(crate) fn constant_repository(
        cv_risk: f64,
        stroke_share: f64,
        mortality: f64,
    ) -> OutcomeModelRepository {
        OutcomeModelRepository::with_models(
            CardiovascularModel::Logistic(intercept_only("cv", cv_risk)),
            intercept_only("mortality", mortality),
            intercept_only("partition", stroke_share),
        )
    }

    #[test]
    fn secondary_prevention_multiplier_halves_risk() {
        let repository = OutcomeModelRepository::new().expect("models");
        let mut baseline = sample_baseline();
        baseline.self_report_mi_age = Some(50);
        let person = Person::new(baseline);

        let plain = CvOutcomeDetermination::default()
            .cv_risk(&repository, &person, 1)
            .expect("risk");
        let halved = CvOutcomeDetermination::new(CvOutcomeConfig {
            secondary_prevention_multiplier: 0.5,
            ..CvOutcomeConfig::default()
        })
        .cv_risk(&repository, &person, 1)
        .expect("risk");
        assert_eq!(halved, plain * 0.5);
    }

    #[test]
    fn multiplier_does_not_touch_primary_prevention() {
        let repository = OutcomeModelRepository::new().expect("models");
        let person = Person::new(sample_baseline());
        let plain = CvOutcomeDetermination::default()
            .cv_risk(&repository, &person, 1)
            .expect("risk");
        let scaled = CvOutcomeDetermination::new(CvOutcomeConfig {
            secondary_prevention_multiplier: 0.5,
            ..CvOutcomeConfig::default()
        })
        .cv_risk(&repository, &person, 1)
        .expect("risk");
        assert_eq!(plain, scaled);
    }

    #[test]
    fn prior_mi_uses_secondary_case_fatality() {
        let determination = CvOutcomeDetermination::new(CvOutcomeConfig {
            mi_case_fatality: 0.1,
            mi_secondary_case_fatality: 0.4,
            stroke_case_fatality: 0.2,
            stroke_secondary_case_fatality: 0.6,
            ..CvOutcomeConfig::default()
        });
        let mut person = Person::new(sample_baseline());
        assert_eq!(determination.case_fatality(&person, OutcomeType::Mi), 0.1);
        assert_eq!(determination.case_fatality(&person, OutcomeType::Stroke), 0.2);

        person.add_outcome(Outcome::new(OutcomeType::Mi, false), 1);
        assert_eq!(determination.case_fatality(&person, OutcomeType::Mi), 0.4);
        assert_eq!(determination.case_fatality(&person, OutcomeType::Stroke), 0.2);

        person.add_outcome(Outcome::new(OutcomeType::Stroke, false), 2);
        assert_eq!(determination.case_fatality(&person, OutcomeType::Stroke), 0.6);
    }

    #[test]
    fn certain_event_with_manual_mi_probability_is_always_mi() {
        let repository = constant_repository(0.5, 0.5, 0.01);
        let determination = CvOutcomeDetermination::new(CvOutcomeConfig {
            manual_mi_probability: Some(1.0),
            mi_case_fatality: 1.0,
            ..CvOutcomeConfig::default()
        });
        let person = Person::new(sample_baseline());
        let mut rng = person_rng(5, 1, 0);
        let mut events = 0;
        for _ in 0..500 {
            if let Some(outcome) = determination
                .assign_outcome_for_person(&repository, &person, 1, &mut rng)
                .expect("valid")
            {
                assert_eq!(outcome, Outcome::new(OutcomeType::Mi, true));
                events += 1;
            }
        }
        assert!(events > 150 && events < 350, "events {events}");
    }

    #[test]
    fn zero_manual_mi_probability_gives_strokes() {
        let repository = constant_repository(0.9, 0.0001, 0.01);
        let determination = CvOutcomeDetermination::new(CvOutcomeConfig {
            manual_mi_probability: Some(0.0),
            stroke_case_fatality: 0.0,
            ..CvOutcomeConfig::default()
        });
        let person = Person::new(sample_baseline());
        let mut rng = person_rng(8, 1, 0);
        for _ in 0..200 {
            if let Some(outcome) = determination
                .assign_outcome_for_person(&repository, &person, 1, &mut rng)
                .expect("valid")
            {
                assert_eq!(outcome, Outcome::new(OutcomeType::Stroke, false));
            }
        }
    }

    #[test]
    fn invalid_manual_probability_is_surfaced() {
        let repository = constant_repository(0.999, 0.5, 0.01);
        let determination = CvOutcomeDetermination::new(CvOutcomeConfig {
            manual_mi_probability: Some(1.5),
            ..CvOutcomeConfig::default()
        });
        let person = Person::new(sample_baseline());
        let mut saw_error = false;
        for seed in 0..20 {
            let mut rng = person_rng(seed, 1, 0);
            if let Err(err) =
                determination.assign_outcome_for_person(&repository, &person, 1, &mut rng)
            {
                assert!(matches!(err, SimError::ProbabilityOutOfRange { .. }));
                saw_error = true;
            }
        }
        assert!(saw_error);
    }

    #[test]
    fn stroke_share_follows_partition_model() {
        let repository = constant_repository(0.999, 0.3, 0.01);
        let determination = CvOutcomeDetermination::default();
        let person = Person::new(sample_baseline());
        let mut strokes = 0;
        let mut events = 0;
        for idx in 0..4000 {
            let mut rng = person_rng(17, 1, idx);
            if let Some(outcome) = determination
                .assign_outcome_for_person(&repository, &person, 1, &mut rng)
                .expect("valid")
            {
                events += 1;
                if outcome.outcome_type == OutcomeType::Stroke {
                    strokes += 1;
                }
            }
        }
        let share = strokes as f64 / events as f64;
        assert!((share - 0.3).abs() < 0.04, "stroke share {share}");
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(48))]

        #[test]
        fn prop_at_most_one_outcome_and_reproducible(seed in any::<u64>(), risk_pct in 1u32..99) {
            let repository = constant_repository(risk_pct as f64 / 100.0, 0.4, 0.01);
            let determination = CvOutcomeDetermination::default();
            let person = Person::new(sample_baseline());
            let mut a = person_rng(seed, 1, 0);
            let mut b = person_rng(seed, 1, 0);
            let first = determination
                .assign_outcome_for_person(&repository, &person, 1, &mut a)
                .expect("valid");
            let second = determination
                .assign_outcome_for_person(&repository, &person, 1, &mut b)
                .expect("valid");
            prop_assert!(first == second);
        }
    }
}
