use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use crate::core::{
    BpLoweringStrategy, CvOutcomeConfig, RiskModelSet, SimError, SimulationConfig, run_simulation,
};

const MAX_YEARS: u32 = 100;
const MAX_API_COHORT: usize = 200_000;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliRiskModelSet {
    Cohort,
    Nhanes,
}

impl From<CliRiskModelSet> for RiskModelSet {
    fn from(value: CliRiskModelSet) -> Self {
        match value {
            CliRiskModelSet::Cohort => RiskModelSet::Cohort,
            CliRiskModelSet::Nhanes => RiskModelSet::Nhanes,
        }
    }
}

impl From<RiskModelSet> for CliRiskModelSet {
    fn from(value: RiskModelSet) -> Self {
        match value {
            RiskModelSet::Cohort => CliRiskModelSet::Cohort,
            RiskModelSet::Nhanes => CliRiskModelSet::Nhanes,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    cohort_size: Option<usize>,
    years: Option<u32>,
    seed: Option<u64>,
    risk_model_set: Option<String>,
    parallel: Option<bool>,

    mi_case_fatality: Option<f64>,
    mi_secondary_case_fatality: Option<f64>,
    stroke_case_fatality: Option<f64>,
    stroke_secondary_case_fatality: Option<f64>,
    secondary_prevention_multiplier: Option<f64>,
    manual_mi_probability: Option<f64>,

    bp_treatment: Option<bool>,
    sbp_effect: Option<f64>,
    dbp_effect: Option<f64>,
    stroke_relative_risk: Option<f64>,
    mi_relative_risk: Option<f64>,
    added_anti_hypertensives: Option<u32>,

    standardization_year: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "microsim",
    about = "Cardiovascular microsimulation (annual risk factor advancement, MI/stroke outcomes, BP treatment recalibration)"
)]
struct Cli {
    #[arg(long, default_value_t = 1_000)]
    cohort_size: usize,
    #[arg(long, default_value_t = 10)]
    years: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, value_enum, default_value_t = CliRiskModelSet::Cohort)]
    risk_model_set: CliRiskModelSet,
    #[arg(long, help = "Advance people across all cores")]
    parallel: bool,

    #[arg(long, default_value_t = 13.0, help = "Percent of first MIs that are fatal")]
    mi_case_fatality: f64,
    #[arg(long, default_value_t = 13.0)]
    mi_secondary_case_fatality: f64,
    #[arg(long, default_value_t = 15.0, help = "Percent of first strokes that are fatal")]
    stroke_case_fatality: f64,
    #[arg(long, default_value_t = 15.0)]
    stroke_secondary_case_fatality: f64,
    #[arg(
        long,
        default_value_t = 1.0,
        help = "Scales CV risk for people with a prior MI or stroke"
    )]
    secondary_prevention_multiplier: f64,
    #[arg(
        long,
        help = "Percent of CV events that are MIs; overrides the partition model"
    )]
    manual_mi_probability: Option<f64>,

    #[arg(long, help = "Start everyone on one more antihypertensive in year one")]
    bp_treatment: bool,
    #[arg(long, default_value_t = -5.5, allow_negative_numbers = true)]
    sbp_effect: f64,
    #[arg(long, default_value_t = -3.1, allow_negative_numbers = true)]
    dbp_effect: f64,
    #[arg(long, default_value_t = 0.79)]
    stroke_relative_risk: f64,
    #[arg(long, default_value_t = 0.87)]
    mi_relative_risk: f64,
    #[arg(long, default_value_t = 1)]
    added_anti_hypertensives: u32,

    #[arg(long)]
    standardization_year: Option<u32>,
    #[arg(long, help = "SEER fixed-width population file used for age standardization")]
    age_standard_path: Option<PathBuf>,
    #[arg(long, help = "JSON array of baseline person records; replaces the synthetic cohort")]
    cohort_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

fn build_config(cli: Cli) -> Result<SimulationConfig, String> {
    if cli.cohort_path.is_none() && cli.cohort_size == 0 {
        return Err("--cohort-size must be > 0".to_string());
    }

    if cli.years == 0 || cli.years > MAX_YEARS {
        return Err(format!("--years must be between 1 and {MAX_YEARS}"));
    }

    for (flag, value) in [
        ("--mi-case-fatality", cli.mi_case_fatality),
        ("--mi-secondary-case-fatality", cli.mi_secondary_case_fatality),
        ("--stroke-case-fatality", cli.stroke_case_fatality),
        (
            "--stroke-secondary-case-fatality",
            cli.stroke_secondary_case_fatality,
        ),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(format!("{flag} must be between 0 and 100"));
        }
    }

    if !cli.secondary_prevention_multiplier.is_finite() || cli.secondary_prevention_multiplier < 0.0
    {
        return Err("--secondary-prevention-multiplier must be >= 0".to_string());
    }

    if let Some(manual) = cli.manual_mi_probability {
        if !(0.0..=100.0).contains(&manual) {
            return Err("--manual-mi-probability must be between 0 and 100".to_string());
        }
    }

    if cli.bp_treatment {
        if !cli.sbp_effect.is_finite() || !cli.dbp_effect.is_finite() {
            return Err("--sbp-effect and --dbp-effect must be finite".to_string());
        }
        if !cli.stroke_relative_risk.is_finite() || cli.stroke_relative_risk < 0.0 {
            return Err("--stroke-relative-risk must be >= 0".to_string());
        }
        if !cli.mi_relative_risk.is_finite() || cli.mi_relative_risk < 0.0 {
            return Err("--mi-relative-risk must be >= 0".to_string());
        }
    }

    if cli.age_standard_path.is_some() && cli.standardization_year.is_some_and(|y| y < 1990) {
        return Err("--standardization-year must be >= 1990 for SEER standards".to_string());
    }

    Ok(SimulationConfig {
        cohort_size: cli.cohort_size,
        years: cli.years,
        seed: cli.seed,
        risk_model_set: cli.risk_model_set.into(),
        parallel: cli.parallel,
        outcome: CvOutcomeConfig {
            mi_case_fatality: cli.mi_case_fatality / 100.0,
            mi_secondary_case_fatality: cli.mi_secondary_case_fatality / 100.0,
            stroke_case_fatality: cli.stroke_case_fatality / 100.0,
            stroke_secondary_case_fatality: cli.stroke_secondary_case_fatality / 100.0,
            secondary_prevention_multiplier: cli.secondary_prevention_multiplier,
            manual_mi_probability: cli.manual_mi_probability.map(|p| p / 100.0),
        },
        treatment: cli.bp_treatment.then_some(BpLoweringStrategy {
            sbp_effect: cli.sbp_effect,
            dbp_effect: cli.dbp_effect,
            stroke_relative_risk: cli.stroke_relative_risk,
            mi_relative_risk: cli.mi_relative_risk,
            added_anti_hypertensives: cli.added_anti_hypertensives,
        }),
        standardization_year: cli.standardization_year,
        age_standard_path: cli.age_standard_path,
        cohort_path: cli.cohort_path,
    })
}

pub fn run_cli() -> Result<String, String> {
    let config = build_config(Cli::parse())?;
    let result = run_simulation(&config).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&result).map_err(|e| e.to_string())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/health", get(health_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    log::info!("microsim HTTP API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let config = match config_from_payload(payload) {
        Ok(config) => config,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let outcome = tokio::task::spawn_blocking(move || run_simulation(&config)).await;
    match outcome {
        Ok(Ok(result)) => json_response(StatusCode::OK, result),
        Ok(Err(err)) => {
            log::warn!("simulation failed: {err}");
            error_response(simulation_error_status(&err), &err.to_string())
        }
        Err(join_err) => {
            log::error!("simulation task failed: {join_err}");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation task failed")
        }
    }
}

fn simulation_error_status(err: &SimError) -> StatusCode {
    match err {
        SimError::InsufficientEvents { .. }
        | SimError::MissingTarget(_)
        | SimError::DegenerateBaselineRisk(_)
        | SimError::UnknownRepository(_)
        | SimError::ProbabilityOutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn config_from_json(json: &str) -> Result<SimulationConfig, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    config_from_payload(payload)
}

fn config_from_payload(payload: SimulatePayload) -> Result<SimulationConfig, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.cohort_size {
        if v > MAX_API_COHORT {
            return Err(format!("cohortSize must be <= {MAX_API_COHORT}"));
        }
        cli.cohort_size = v;
    }
    if let Some(v) = payload.years {
        cli.years = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.risk_model_set {
        let set: RiskModelSet = v.parse().map_err(|e: SimError| e.to_string())?;
        cli.risk_model_set = set.into();
    }
    if let Some(v) = payload.parallel {
        cli.parallel = v;
    }

    if let Some(v) = payload.mi_case_fatality {
        cli.mi_case_fatality = v;
    }
    if let Some(v) = payload.mi_secondary_case_fatality {
        cli.mi_secondary_case_fatality = v;
    }
    if let Some(v) = payload.stroke_case_fatality {
        cli.stroke_case_fatality = v;
    }
    if let Some(v) = payload.stroke_secondary_case_fatality {
        cli.stroke_secondary_case_fatality = v;
    }
    if let Some(v) = payload.secondary_prevention_multiplier {
        cli.secondary_prevention_multiplier = v;
    }
    if payload.manual_mi_probability.is_some() {
        cli.manual_mi_probability = payload.manual_mi_probability;
    }

    if let Some(v) = payload.bp_treatment {
        cli.bp_treatment = v;
    }
    if let Some(v) = payload.sbp_effect {
        cli.sbp_effect = v;
    }
    if let Some(v) = payload.dbp_effect {
        cli.dbp_effect = v;
    }
    if let Some(v) = payload.stroke_relative_risk {
        cli.stroke_relative_risk = v;
    }
    if let Some(v) = payload.mi_relative_risk {
        cli.mi_relative_risk = v;
    }
    if let Some(v) = payload.added_anti_hypertensives {
        cli.added_anti_hypertensives = v;
    }

    if payload.standardization_year.is_some() {
        cli.standardization_year = payload.standardization_year;
    }

    build_config(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        cohort_size: 1_000,
        years: 10,
        seed: 42,
        risk_model_set: CliRiskModelSet::Cohort,
        parallel: false,
        mi_case_fatality: 13.0,
        mi_secondary_case_fatality: 13.0,
        stroke_case_fatality: 15.0,
        stroke_secondary_case_fatality: 15.0,
        secondary_prevention_multiplier: 1.0,
        manual_mi_probability: None,
        bp_treatment: false,
        sbp_effect: -5.5,
        dbp_effect: -3.1,
        stroke_relative_risk: 0.79,
        mi_relative_risk: 0.87,
        added_anti_hypertensives: 1,
        standardization_year: None,
        age_standard_path: None,
        cohort_path: None,
    }
}
