use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::error::{SimError, SimResult};
use super::person::Person;
use super::types::{OutcomeType, Sex, StandardizedRate};

const FIRST_SEER_YEAR: u32 = 1990;
const OLDEST_GROUP: u8 = 18;
const RATE_SCALE: f64 = 100_000.0;

// 2000 US standard population per million, groups 0 (<1) through 18 (85+).
const CENSUS_2000_PER_MILLION: [f64; 19] = [
    13_818.0, 55_317.0, 72_533.0, 73_032.0, 72_169.0, 66_478.0, 64_529.0, 71_044.0, 80_762.0,
    81_851.0, 72_118.0, 62_716.0, 48_454.0, 38_793.0, 34_264.0, 31_773.0, 26_999.0, 17_842.0,
    15_508.0,
];

pub fn age_group_bounds(group: u8) -> (u32, u32) {
    match group {
        0 => (0, 0),
        1 => (1, 4),
        OLDEST_GROUP => (85, 150),
        g => ((g as u32 - 1) * 5, g as u32 * 5 - 1),
    }
}

pub fn age_group_for(age: u32) -> u8 {
    (age.min(85) / 5 + 1) as u8
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StandardizedMeasure {
    Incidence(OutcomeType),
    Mortality,
}

impl StandardizedMeasure {
    fn label(self) -> String {
        match self {
            StandardizedMeasure::Incidence(outcome) => outcome.to_string(),
            StandardizedMeasure::Mortality => "death".to_string(),
        }
    }

    fn occurred(self, person: &Person, year: u32) -> u64 {
        match self {
            // Incidence counts a person's first event of the type only.
            StandardizedMeasure::Incidence(outcome) => {
                u64::from(person.outcomes(outcome).first().is_some_and(|r| r.year == year))
            }
            StandardizedMeasure::Mortality => u64::from(person.death_year() == Some(year)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgeStandard {
    year: u32,
    population: BTreeMap<(u8, Sex), f64>,
}

impl AgeStandard {
    pub fn from_rows(year: u32, rows: impl IntoIterator<Item = (u8, Sex, f64)>) -> SimResult<Self> {
        let mut population = BTreeMap::new();
        for (group, sex, count) in rows {
            if group > OLDEST_GROUP {
                return Err(SimError::AgeStandard(format!("age group {group} out of range")));
            }
            *population.entry((group, sex)).or_insert(0.0) += count;
        }
        if population.values().all(|&c| c <= 0.0) {
            return Err(SimError::AgeStandard(format!(
                "standard population for {year} is empty"
            )));
        }
        Ok(Self { year, population })
    }

    pub fn census_2000(year: u32) -> Self {
        let mut population = BTreeMap::new();
        for (group, per_million) in CENSUS_2000_PER_MILLION.iter().enumerate() {
            for sex in [Sex::Male, Sex::Female] {
                population.insert((group as u8, sex), per_million / 2.0);
            }
        }
        Self { year, population }
    }

    pub fn from_seer_reader<R: BufRead>(reader: R, year: u32) -> SimResult<Self> {
        if year < FIRST_SEER_YEAR {
            return Err(SimError::AgeStandard(format!(
                "SEER standards start in {FIRST_SEER_YEAR}, got {year}"
            )));
        }
        let mut rows = Vec::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let row = parse_seer_line(&line).ok_or_else(|| {
                SimError::AgeStandard(format!("malformed SEER record on line {}", line_no + 1))
            })?;
            if row.year == year {
                rows.push((row.age_group, row.sex, row.population));
            }
        }
        Self::from_rows(year, rows)
    }

    pub fn from_seer_file(path: &Path, year: u32) -> SimResult<Self> {
        let file = File::open(path)?;
        Self::from_seer_reader(BufReader::new(file), year)
    }

    pub fn year(&self) -> u32 {
        self.year
    }

    pub fn population(&self, group: u8, sex: Sex) -> f64 {
        self.population.get(&(group, sex)).copied().unwrap_or(0.0)
    }

    pub fn standardized_rate(
        &self,
        people: &[Person],
        years: u32,
        measure: StandardizedMeasure,
    ) -> StandardizedRate {
        self.standardized_rate_for(people, years, measure, |_| true)
    }

    // Mean over simulated years of the per-100k standardized rate. A person
    // adds one person-year to each year they were alive at the start of,
    // in the stratum of their age at that point.
    pub fn standardized_rate_for<F>(
        &self,
        people: &[Person],
        years: u32,
        measure: StandardizedMeasure,
        selector: F,
    ) -> StandardizedRate
    where
        F: Fn(&Person) -> bool,
    {
        let mut yearly_rates = Vec::with_capacity(years as usize);
        let mut total_events = 0;
        for year in 1..=years {
            let mut strata: BTreeMap<(u8, Sex), (u64, u64)> = BTreeMap::new();
            for person in people.iter().filter(|p| selector(p)) {
                if person.death_year().is_some_and(|d| d < year) {
                    continue;
                }
                let age = person.baseline_age() + year - 1;
                let stratum = strata
                    .entry((age_group_for(age), person.sex()))
                    .or_insert((0, 0));
                stratum.0 += measure.occurred(person, year);
                stratum.1 += 1;
            }
            total_events += strata.values().map(|(events, _)| events).sum::<u64>();
            if let Some(rate) = self.weighted_rate(&strata) {
                yearly_rates.push(rate);
            }
        }

        let rate_per_100k = if yearly_rates.is_empty() {
            0.0
        } else {
            yearly_rates.iter().sum::<f64>() / yearly_rates.len() as f64
        };
        StandardizedRate {
            outcome: measure.label(),
            standard_year: self.year,
            rate_per_100k,
            total_events,
        }
    }

    fn weighted_rate(&self, strata: &BTreeMap<(u8, Sex), (u64, u64)>) -> Option<f64> {
        let mut weighted = 0.0;
        let mut weight_total = 0.0;
        for (&(group, sex), &(events, person_years)) in strata {
            let weight = self.population(group, sex);
            if person_years == 0 || weight <= 0.0 {
                continue;
            }
            weighted += weight * events as f64 * RATE_SCALE / person_years as f64;
            weight_total += weight;
        }
        (weight_total > 0.0).then(|| weighted / weight_total)
    }
}

struct SeerRow {
    year: u32,
    sex: Sex,
    age_group: u8,
    population: f64,
}

fn parse_seer_line(line: &str) -> Option<SeerRow> {
    let field = |range: std::ops::Range<usize>| line.get(range).map(str::trim);
    let year = field(0..4)?.parse().ok()?;
    let sex = match field(15..16)? {
        "1" => Sex::Male,
        "2" => Sex::Female,
        _ => return None,
    };
    let age_group = field(16..18)?.parse().ok()?;
    let population = field(18..26)?.parse().ok()?;
    Some(SeerRow {
        year,
        sex,
        age_group,
        population,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgeStandardSource {
    Census2000,
    SeerFile(PathBuf),
}

#[derive(Debug)]
pub struct AgeStandardCache {
    source: AgeStandardSource,
    standards: HashMap<u32, Arc<AgeStandard>>,
    builds: usize,
}

impl AgeStandardCache {
    pub fn new(source: AgeStandardSource) -> Self {
        Self {
            source,
            standards: HashMap::new(),
            builds: 0,
        }
    }

    pub fn get_or_build(&mut self, year: u32) -> SimResult<Arc<AgeStandard>> {
        if let Some(standard) = self.standards.get(&year) {
            return Ok(Arc::clone(standard));
        }
        let standard = Arc::new(match &self.source {
            AgeStandardSource::Census2000 => AgeStandard::census_2000(year),
            AgeStandardSource::SeerFile(path) => AgeStandard::from_seer_file(path, year)?,
        });
        log::debug!("built age standard for {year}");
        self.builds += 1;
        self.standards.insert(year, Arc::clone(&standard));
        Ok(standard)
    }

    pub fn builds(&self) -> usize {
        self.builds
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::person::sample_baseline;
    use crate::core::types::Outcome;
    use std::io::Cursor;

    const EPS: f64 = 1e-9;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn seer_line(year: u32, sex: u8, group: u8, population: u32) -> String {
        format!("{year}CA070010119{sex}{group:02}{population:08}")
    }

    #[test]
    fn age_groups_follow_seer_bounds() {
        assert_eq!(age_group_bounds(0), (0, 0));
        assert_eq!(age_group_bounds(1), (1, 4));
        assert_eq!(age_group_bounds(2), (5, 9));
        assert_eq!(age_group_bounds(13), (60, 64));
        assert_eq!(age_group_bounds(18), (85, 150));
        assert_eq!(age_group_for(60), 13);
        assert_eq!(age_group_for(64), 13);
        assert_eq!(age_group_for(85), 18);
        assert_eq!(age_group_for(102), 18);
    }

    #[test]
    fn seer_reader_sums_requested_year() {
        let data = [
            seer_line(2000, 1, 13, 500),
            seer_line(2000, 1, 13, 250),
            seer_line(2000, 2, 13, 100),
            seer_line(2001, 1, 13, 9_999),
        ]
        .join("\n");
        let standard = AgeStandard::from_seer_reader(Cursor::new(data), 2000).expect("valid");
        assert_approx(standard.population(13, Sex::Male), 750.0);
        assert_approx(standard.population(13, Sex::Female), 100.0);
        assert_approx(standard.population(14, Sex::Male), 0.0);
    }

    #[test]
    fn seer_reader_rejects_early_years_and_bad_records() {
        let data = seer_line(1985, 1, 13, 10);
        assert!(AgeStandard::from_seer_reader(Cursor::new(data), 1985).is_err());
        let err = AgeStandard::from_seer_reader(Cursor::new("2000CA"), 2000).expect_err("short");
        assert!(matches!(err, SimError::AgeStandard(_)));
        let missing = seer_line(2001, 1, 13, 10);
        assert!(AgeStandard::from_seer_reader(Cursor::new(missing), 2000).is_err());
    }

    #[test]
    fn uniform_cohort_recovers_known_rate() {
        let standard = AgeStandard::census_2000(2000);
        let mut people = Vec::new();
        for (age, sex) in [(45, Sex::Male), (62, Sex::Female), (71, Sex::Male)] {
            for idx in 0..1000 {
                let mut baseline = sample_baseline();
                baseline.age = age;
                baseline.sex = sex;
                let mut person = Person::new(baseline);
                // 2% of every stratum has a stroke in each of two years.
                if idx < 20 {
                    person.add_outcome(Outcome::new(OutcomeType::Stroke, false), 1);
                } else if idx < 40 {
                    person.add_outcome(Outcome::new(OutcomeType::Stroke, false), 2);
                }
                people.push(person);
            }
        }
        let rate = standard.standardized_rate(
            &people,
            2,
            StandardizedMeasure::Incidence(OutcomeType::Stroke),
        );
        assert_approx(rate.rate_per_100k, 2_000.0);
        assert_eq!(rate.total_events, 120);
        assert_eq!(rate.outcome, "stroke");
    }

    #[test]
    fn recurrent_events_count_once_at_first_occurrence() {
        let standard = AgeStandard::census_2000(2000);
        let mut people: Vec<Person> = (0..100).map(|_| Person::new(sample_baseline())).collect();
        for person in people.iter_mut().take(10) {
            person.add_outcome(Outcome::new(OutcomeType::Stroke, false), 1);
            person.add_outcome(Outcome::new(OutcomeType::Stroke, false), 2);
        }
        let rate = standard.standardized_rate(
            &people,
            2,
            StandardizedMeasure::Incidence(OutcomeType::Stroke),
        );
        // 10/100 in year one, no first events in year two.
        assert_approx(rate.rate_per_100k, 5_000.0);
        assert_eq!(rate.total_events, 10);
    }

    #[test]
    fn selector_restricts_the_subpopulation() {
        let standard = AgeStandard::census_2000(2000);
        let mut people = Vec::new();
        for (sex, strokes) in [(Sex::Male, 30), (Sex::Female, 10)] {
            for idx in 0..100 {
                let mut baseline = sample_baseline();
                baseline.sex = sex;
                let mut person = Person::new(baseline);
                if idx < strokes {
                    person.add_outcome(Outcome::new(OutcomeType::Stroke, false), 1);
                }
                people.push(person);
            }
        }
        let incidence = StandardizedMeasure::Incidence(OutcomeType::Stroke);
        let women = standard.standardized_rate_for(&people, 1, incidence, |p| p.sex() == Sex::Female);
        assert_approx(women.rate_per_100k, 10_000.0);
        assert_eq!(women.total_events, 10);
        let everyone = standard.standardized_rate(&people, 1, incidence);
        assert_approx(everyone.rate_per_100k, 20_000.0);
        assert_eq!(everyone.total_events, 40);
    }

    #[test]
    fn dead_people_leave_the_denominator() {
        let standard = AgeStandard::census_2000(2000);
        let mut people: Vec<Person> = (0..100).map(|_| Person::new(sample_baseline())).collect();
        for person in people.iter_mut().take(50) {
            person.add_outcome(Outcome::new(OutcomeType::Mi, true), 1);
        }
        let mortality = standard.standardized_rate(&people, 2, StandardizedMeasure::Mortality);
        // 50/100 in year one, 0/50 in year two.
        assert_approx(mortality.rate_per_100k, 25_000.0);
        assert_eq!(mortality.total_events, 50);
    }

    #[test]
    fn cache_builds_each_year_once() {
        let mut cache = AgeStandardCache::new(AgeStandardSource::Census2000);
        let first = cache.get_or_build(2010).expect("built");
        let again = cache.get_or_build(2010).expect("cached");
        assert!(Arc::ptr_eq(&first, &again));
        cache.get_or_build(2011).expect("built");
        assert_eq!(cache.builds(), 2);
    }

    #[test]
    fn missing_seer_file_is_an_io_error() {
        let mut cache = AgeStandardCache::new(AgeStandardSource::SeerFile(PathBuf::from(
            "/nonexistent/seer.txt",
        )));
        assert!(matches!(cache.get_or_build(2000), Err(SimError::Io(_))));
        assert_eq!(cache.builds(), 0);
    }
}
