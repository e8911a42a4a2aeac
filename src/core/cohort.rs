use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::error::{SimError, SimResult};
use super::person::{BaselineState, Person};
use super::rng::{SimRng, derive_seed};
use super::types::{Education, RaceEthnicity, Sex, SmokingStatus};

const COHORT_LANE: u64 = 0x5EED_C040_0000_0001;

const RACES: [(RaceEthnicity, f64); 5] = [
    (RaceEthnicity::NonHispanicWhite, 0.64),
    (RaceEthnicity::NonHispanicBlack, 0.12),
    (RaceEthnicity::MexicanAmerican, 0.10),
    (RaceEthnicity::OtherHispanic, 0.06),
    (RaceEthnicity::OtherRace, 0.08),
];

const SMOKING: [(SmokingStatus, f64); 3] = [
    (SmokingStatus::Never, 0.56),
    (SmokingStatus::Former, 0.27),
    (SmokingStatus::Current, 0.17),
];

const EDUCATION: [(Education, f64); 5] = [
    (Education::LessThanNinthGrade, 0.06),
    (Education::SomeHighSchool, 0.10),
    (Education::HighSchoolGraduate, 0.24),
    (Education::SomeCollege, 0.31),
    (Education::CollegeGraduate, 0.29),
];

pub fn build_synthetic_cohort(n: usize, seed: u64) -> Vec<Person> {
    let mut rng = SimRng::seed_from_u64(derive_seed(seed, 0, COHORT_LANE));
    (0..n).map(|_| Person::new(sample_baseline(&mut rng))).collect()
}

pub fn load_cohort_json(path: &Path) -> SimResult<Vec<BaselineState>> {
    let raw = fs::read_to_string(path)?;
    parse_cohort_json(&raw)
}

pub fn parse_cohort_json(raw: &str) -> SimResult<Vec<BaselineState>> {
    let baselines: Vec<BaselineState> = serde_json::from_str(raw)?;
    if let Some(bad) = baselines.iter().position(|b| !plausible(b)) {
        return Err(SimError::Cohort(serde::de::Error::custom(format!(
            "person {bad} has a non-positive measurement"
        ))));
    }
    Ok(baselines)
}

fn plausible(b: &BaselineState) -> bool {
    [b.sbp, b.dbp, b.a1c, b.hdl, b.ldl, b.trig, b.tot_chol, b.bmi, b.waist]
        .iter()
        .all(|v| v.is_finite() && *v > 0.0)
}

fn pick<T: Copy>(rng: &mut SimRng, table: &[(T, f64)]) -> T {
    match table.choose_weighted(rng, |(_, w)| *w) {
        Ok((value, _)) => *value,
        Err(_) => table[0].0,
    }
}

fn sample_baseline(rng: &mut SimRng) -> BaselineState {
    let age = rng.gen_range(40..80);
    let sex = if rng.r#gen::<bool>() { Sex::Male } else { Sex::Female };
    let race_ethnicity = pick(rng, &RACES);

    let sbp = normal(rng, 118.0 + 0.45 * (age as f64 - 40.0), 16.0).clamp(90.0, 210.0);
    let dbp = normal(rng, 74.0, 10.0).clamp(45.0, sbp - 20.0);
    let hdl = normal(rng, if sex == Sex::Female { 58.0 } else { 47.0 }, 14.0).clamp(20.0, 120.0);
    let ldl = normal(rng, 118.0, 34.0).clamp(40.0, 260.0);
    let trig = normal(rng, 4.85, 0.5).exp().clamp(35.0, 800.0);
    let bmi = normal(rng, 29.0, 6.0).clamp(16.0, 60.0);
    let a1c = normal(rng, 5.5 + 0.02 * (bmi - 29.0), 0.7).clamp(4.0, 14.0);

    BaselineState {
        age,
        sex,
        race_ethnicity,
        sbp,
        dbp,
        a1c,
        hdl,
        ldl,
        trig,
        // Friedewald
        tot_chol: ldl + hdl + trig / 5.0,
        bmi,
        waist: (2.3 * bmi + 33.0 + normal(rng, 0.0, 5.0)).clamp(60.0, 170.0),
        any_physical_activity: rng.gen_bool(0.7),
        smoking_status: pick(rng, &SMOKING),
        education: pick(rng, &EDUCATION),
        anti_hypertensive_count: if sbp > 140.0 && rng.gen_bool(0.5) { 1 } else { 0 },
        statin: ldl > 160.0 && rng.gen_bool(0.4),
        other_lipid_lowering_medication_count: 0,
        self_report_mi_age: rng.gen_bool(0.03).then(|| age - rng.gen_range(1..10)),
        self_report_stroke_age: rng.gen_bool(0.02).then(|| age - rng.gen_range(1..10)),
    }
}

fn normal(rng: &mut SimRng, mean: f64, std_dev: f64) -> f64 {
    match Normal::new(mean, std_dev) {
        Ok(dist) => dist.sample(rng),
        Err(_) => mean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RiskFactor;

    #[test]
    fn synthetic_cohort_is_reproducible_and_plausible() {
        let a = build_synthetic_cohort(500, 11);
        let b = build_synthetic_cohort(500, 11);
        let c = build_synthetic_cohort(500, 12);
        let sbp = |people: &[Person]| -> Vec<u64> {
            people
                .iter()
                .map(|p| p.current(RiskFactor::Sbp).to_bits())
                .collect()
        };
        assert_eq!(sbp(&a), sbp(&b));
        assert_ne!(sbp(&a), sbp(&c));
        for person in &a {
            assert!((40..80).contains(&person.current_age()));
            assert!(person.current(RiskFactor::Dbp) < person.current(RiskFactor::Sbp));
            assert!(plausible(&person.baseline_state()));
        }
        let women = a.iter().filter(|p| p.sex() == Sex::Female).count();
        assert!(women > 200 && women < 300, "women {women}");
    }

    #[test]
    fn cohort_json_parses_camel_case_and_defaults() {
        let raw = r#"[{
            "age": 55, "sex": "female", "raceEthnicity": "nonHispanicBlack",
            "sbp": 142.0, "dbp": 88.0, "a1c": 6.1, "hdl": 52.0, "ldl": 130.0,
            "trig": 150.0, "totChol": 212.0, "bmi": 31.0, "waist": 101.0,
            "smokingStatus": "former", "education": "highSchoolGraduate",
            "selfReportMiAge": 50
        }]"#;
        let baselines = parse_cohort_json(raw).expect("valid cohort");
        assert_eq!(baselines.len(), 1);
        let person = Person::new(baselines[0].clone());
        assert!(person.has_prior_mi());
        assert_eq!(person.current_anti_hypertensive_count(), 0);
        assert!(!person.current_statin());
    }

    #[test]
    fn cohort_json_rejects_bad_input() {
        assert!(matches!(parse_cohort_json("{"), Err(SimError::Cohort(_))));
        let zero_bmi = r#"[{
            "age": 55, "sex": "male", "raceEthnicity": "otherRace",
            "sbp": 120.0, "dbp": 80.0, "a1c": 5.1, "hdl": 52.0, "ldl": 100.0,
            "trig": 120.0, "totChol": 180.0, "bmi": 0.0, "waist": 90.0,
            "smokingStatus": "never", "education": "collegeGraduate"
        }]"#;
        assert!(parse_cohort_json(zero_bmi).is_err());
        assert!(matches!(
            load_cohort_json(Path::new("/nonexistent/cohort.json")),
            Err(SimError::Io(_))
        ));
    }
}
