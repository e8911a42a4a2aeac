use super::cohort::{build_synthetic_cohort, load_cohort_json};
use super::error::SimResult;
use super::outcome::CvOutcomeDetermination;
use super::person::Person;
use super::population::Population;
use super::repository::{OutcomeModelRepository, RiskModelRepository};
use super::standard::{AgeStandardCache, AgeStandardSource, StandardizedMeasure};
use super::types::{OutcomeType, SimulationConfig, SimulationResult, StandardizedRate};

pub const DEFAULT_STANDARDIZATION_YEAR: u32 = 2000;

pub fn run_simulation(config: &SimulationConfig) -> SimResult<SimulationResult> {
    let mut cache = AgeStandardCache::new(age_standard_source(config));
    run_simulation_with_cache(config, &mut cache)
}

pub fn run_simulation_with_cache(
    config: &SimulationConfig,
    cache: &mut AgeStandardCache,
) -> SimResult<SimulationResult> {
    let mut population = build_population(config)?;
    log::info!(
        "simulating {} people for {} years with {} risk models",
        population.len(),
        config.years,
        config.risk_model_set
    );
    if config.parallel {
        population.advance_parallel(config.years)?;
    } else {
        population.advance(config.years)?;
    }

    let standard_year = config
        .standardization_year
        .unwrap_or(DEFAULT_STANDARDIZATION_YEAR);
    let standard = cache.get_or_build(standard_year)?;
    let years = population.total_years_advanced();
    let standardized_rates: Vec<StandardizedRate> = [
        StandardizedMeasure::Incidence(OutcomeType::Mi),
        StandardizedMeasure::Incidence(OutcomeType::Stroke),
        StandardizedMeasure::Mortality,
    ]
    .into_iter()
    .map(|measure| standard.standardized_rate(population.people(), years, measure))
    .collect();

    Ok(SimulationResult {
        cohort_size: population.len(),
        years,
        seed: config.seed,
        risk_model_set: config.risk_model_set,
        total_mi: population.count_events(OutcomeType::Mi),
        total_stroke: population.count_events(OutcomeType::Stroke),
        total_deaths: population.count_deaths(),
        year_summaries: population.year_summaries().to_vec(),
        recalibrations: population.recalibrations().to_vec(),
        standardized_rates,
    })
}

fn age_standard_source(config: &SimulationConfig) -> AgeStandardSource {
    match &config.age_standard_path {
        Some(path) => AgeStandardSource::SeerFile(path.clone()),
        None => AgeStandardSource::Census2000,
    }
}

fn build_population(config: &SimulationConfig) -> SimResult<Population> {
    let people = match &config.cohort_path {
        Some(path) => load_cohort_json(path)?
            .into_iter()
            .map(Person::new)
            .collect(),
        None => build_synthetic_cohort(config.cohort_size, config.seed),
    };
    let mut population = Population::new(
        people,
        RiskModelRepository::new(config.risk_model_set)?,
        OutcomeModelRepository::new()?,
        CvOutcomeDetermination::new(config.outcome),
        config.seed,
    );
    if let Some(strategy) = config.treatment {
        population.set_treatment_strategy(Box::new(strategy));
    }
    Ok(population)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::outcome::CvOutcomeConfig;
    use crate::core::repository::RiskModelSet;
    use crate::core::treatment::BpLoweringStrategy;
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    fn sample_config() -> SimulationConfig {
        SimulationConfig {
            cohort_size: 400,
            years: 3,
            seed: 42,
            risk_model_set: RiskModelSet::Cohort,
            parallel: false,
            outcome: CvOutcomeConfig::default(),
            treatment: None,
            standardization_year: None,
            age_standard_path: None,
            cohort_path: None,
        }
    }

    #[test]
    fn result_totals_match_year_summaries() {
        let result = run_simulation(&sample_config()).expect("runs");
        assert_eq!(result.cohort_size, 400);
        assert_eq!(result.years, 3);
        assert_eq!(result.year_summaries.len(), 3);
        let mi: usize = result.year_summaries.iter().map(|y| y.mi_events).sum();
        let stroke: usize = result.year_summaries.iter().map(|y| y.stroke_events).sum();
        let deaths: usize = result.year_summaries.iter().map(|y| y.deaths).sum();
        assert_eq!(mi, result.total_mi);
        assert_eq!(stroke, result.total_stroke);
        assert_eq!(deaths, result.total_deaths);
        assert!(result.recalibrations.is_empty());
        assert_eq!(result.standardized_rates.len(), 3);
        assert_eq!(result.standardized_rates[2].outcome, "death");
        assert_eq!(result.standardized_rates[2].total_events as usize, deaths);
    }

    #[test]
    fn parallel_mode_matches_sequential() {
        let sequential = run_simulation(&sample_config()).expect("runs");
        let parallel = run_simulation(&SimulationConfig {
            parallel: true,
            ..sample_config()
        })
        .expect("runs");
        assert_eq!(sequential.total_mi, parallel.total_mi);
        assert_eq!(sequential.total_stroke, parallel.total_stroke);
        assert_eq!(sequential.total_deaths, parallel.total_deaths);
    }

    #[test]
    fn treatment_adds_a_report_per_year() {
        let result = run_simulation(&SimulationConfig {
            cohort_size: 1500,
            treatment: Some(BpLoweringStrategy {
                stroke_relative_risk: 0.0,
                ..BpLoweringStrategy::default()
            }),
            ..sample_config()
        })
        .expect("runs");
        assert_eq!(result.recalibrations.len(), 3);
        for report in &result.recalibrations {
            assert_eq!(report.strokes_rolled_back, 0);
            assert!(report.stroke_delta > 0.0);
        }
    }

    #[test]
    fn cache_is_reused_across_runs() {
        let mut cache = AgeStandardCache::new(AgeStandardSource::Census2000);
        run_simulation_with_cache(&sample_config(), &mut cache).expect("runs");
        run_simulation_with_cache(
            &SimulationConfig {
                seed: 7,
                ..sample_config()
            },
            &mut cache,
        )
        .expect("runs");
        assert_eq!(cache.builds(), 1);
    }

    #[test]
    fn missing_cohort_file_is_reported() {
        let err = run_simulation(&SimulationConfig {
            cohort_path: Some("/nonexistent/cohort.json".into()),
            ..sample_config()
        })
        .expect_err("no file");
        assert!(err.to_string().starts_with("IO error"));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(6))]

        #[test]
        fn prop_same_seed_same_result(seed in 0u64..10_000) {
            let config = SimulationConfig { cohort_size: 150, years: 2, seed, ..sample_config() };
            let first = run_simulation(&config).expect("runs");
            let second = run_simulation(&config).expect("runs");
            prop_assert_eq!(first.total_mi, second.total_mi);
            prop_assert_eq!(first.total_stroke, second.total_stroke);
            prop_assert_eq!(first.total_deaths, second.total_deaths);
            prop_assert!(first.total_deaths <= 150);
        }
    }
}
