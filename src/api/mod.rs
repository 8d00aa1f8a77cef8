use axum::{
    Router,
    extract::{Json, Query},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::Args;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    BondValuation, DEFAULT_SENSITIVITY_TRIALS, DEFAULT_VOLATILITY_MULTIPLIERS,
    FuturesMarginResult, FuturesPosition, LOW_SAMPLE_THRESHOLD, MAX_BOND_YEARS, ParameterError,
    PathEnsemble, Rng, SensitivityRow, SimulationParameters, SimulationStatistics,
    bond_present_value, capm_expected_return, entropy_seed, futures_margin, run_sensitivity_sweep,
    run_simulation, summarize,
};
use crate::report::{
    ChartData, ChartOptions, format_currency, format_percent, render_sensitivity, render_summary,
};

const MAX_API_PATH_POINTS: u64 = 5_000_000;
const MAX_API_HISTOGRAM_BINS: usize = 500;
const MAX_API_SAMPLE_PATHS: usize = 1_000;
const MAX_API_CDF_POINTS: usize = 5_000;

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    #[arg(long, help = "Initial investment amount")]
    initial_investment: f64,
    #[arg(long, help = "Expected annual return in percent, e.g. 8")]
    annual_return: f64,
    #[arg(long, help = "Annual volatility in percent, e.g. 15")]
    volatility: f64,
    #[arg(long, help = "Investment horizon in years")]
    years: u32,
    #[arg(
        long,
        default_value_t = 10_000,
        help = "Number of simulated paths (1000-10000 recommended)"
    )]
    simulations: u32,
    #[arg(long, help = "Random seed; seeded from the clock when omitted")]
    seed: Option<u64>,
    #[arg(long, help = "Skip the volatility sensitivity sweep")]
    no_sensitivity: bool,
    #[arg(
        long,
        default_value_t = DEFAULT_SENSITIVITY_TRIALS,
        help = "Trials per volatility point in the sensitivity sweep"
    )]
    sensitivity_trials: u32,
    #[arg(
        long,
        value_delimiter = ',',
        default_values_t = DEFAULT_VOLATILITY_MULTIPLIERS,
        help = "Comma-separated multipliers applied to the volatility in the sweep"
    )]
    volatility_multipliers: Vec<f64>,
    #[arg(long, help = "Print results as JSON instead of text")]
    json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CapmArgs {
    #[arg(long, help = "Risk-free rate in percent")]
    risk_free_rate: f64,
    #[arg(long)]
    beta: f64,
    #[arg(long, help = "Expected market return in percent")]
    market_return: f64,
}

#[derive(Args, Debug, Clone)]
pub struct BondArgs {
    #[arg(long)]
    face_value: f64,
    #[arg(long, help = "Annual coupon rate in percent")]
    coupon_rate: f64,
    #[arg(long, help = "Whole years to maturity")]
    years: u32,
    #[arg(long, help = "Market discount rate in percent")]
    market_rate: f64,
}

#[derive(Args, Debug, Clone)]
pub struct FuturesArgs {
    #[arg(long, help = "Price per unit at entry")]
    entry_price: f64,
    #[arg(long)]
    contracts: u32,
    #[arg(long, help = "Units per contract")]
    contract_size: f64,
    #[arg(long, help = "Margin rate as a decimal, e.g. 0.1")]
    margin_rate: f64,
    #[arg(long)]
    total_capital: f64,
}

#[derive(Debug, Clone)]
struct SweepRequest {
    multipliers: Vec<f64>,
    trials: u32,
}

#[derive(Debug, Clone)]
struct SimulationRequest {
    params: SimulationParameters,
    seed: u64,
    sweep: Option<SweepRequest>,
}

struct SimulationOutcome {
    request: SimulationRequest,
    ensemble: PathEnsemble,
    statistics: SimulationStatistics,
    sensitivity: Option<Vec<SensitivityRow>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    parameters: SimulationParameters,
    seed: u64,
    low_sample_warning: bool,
    warnings: Vec<String>,
    statistics: SimulationStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    sensitivity: Option<Vec<SensitivityRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    charts: Option<ChartData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CapmResponse {
    expected_return: f64,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn flag_for(parameter: &str) -> &'static str {
    match parameter {
        "initial_investment" => "--initial-investment",
        "annual_return" => "--annual-return",
        "volatility" => "--volatility",
        "years" | "years_to_maturity" => "--years",
        "num_simulations" => "--simulations",
        "trials_per_point" => "--sensitivity-trials",
        "volatility_multiplier" => "--volatility-multipliers",
        "face_value" => "--face-value",
        "coupon_rate" => "--coupon-rate",
        "market_rate" => "--market-rate",
        "entry_price" => "--entry-price",
        "contracts" => "--contracts",
        "contract_size" => "--contract-size",
        "margin_rate" => "--margin-rate",
        "total_capital" => "--total-capital",
        _ => "input",
    }
}

fn describe(err: ParameterError) -> String {
    match err {
        ParameterError::InvalidParameter {
            name, requirement, ..
        } => format!("{} must be {requirement}", flag_for(name)),
    }
}

fn build_params(args: &SimulateArgs) -> Result<SimulationParameters, String> {
    SimulationParameters::new(
        args.initial_investment,
        args.annual_return / 100.0,
        args.volatility / 100.0,
        args.years,
        args.simulations,
    )
    .map_err(describe)
}

fn build_request(args: &SimulateArgs) -> Result<SimulationRequest, String> {
    let params = build_params(args)?;

    let sweep = if args.no_sensitivity {
        None
    } else {
        if args.sensitivity_trials == 0 {
            return Err("--sensitivity-trials must be >= 1".to_string());
        }
        if args
            .volatility_multipliers
            .iter()
            .any(|m| !m.is_finite() || *m < 0.0)
        {
            return Err("--volatility-multipliers must be finite and >= 0".to_string());
        }
        Some(SweepRequest {
            multipliers: args.volatility_multipliers.clone(),
            trials: args.sensitivity_trials,
        })
    };

    let seed = match args.seed {
        Some(seed) => seed,
        None => {
            let seed = entropy_seed();
            info!(seed, "no seed supplied, seeded from clock");
            seed
        }
    };

    Ok(SimulationRequest { params, seed, sweep })
}

fn parameter_warnings(params: &SimulationParameters) -> Vec<String> {
    let mut warnings = Vec::new();
    if params.is_low_sample() {
        warnings.push(format!(
            "fewer than {LOW_SAMPLE_THRESHOLD} simulations; results may be unreliable"
        ));
    }
    if params.volatility() == 0.0 {
        warnings.push("volatility is zero; every path compounds deterministically".to_string());
    }
    warnings
}

fn execute(request: SimulationRequest) -> Result<SimulationOutcome, String> {
    for warning in parameter_warnings(&request.params) {
        warn!("{warning}");
    }

    let mut rng = Rng::new(request.seed);
    let ensemble = run_simulation(&request.params, &mut rng);
    let statistics = summarize(&ensemble);
    let sensitivity = match &request.sweep {
        Some(sweep) => Some(
            run_sensitivity_sweep(&request.params, &sweep.multipliers, sweep.trials, &mut rng)
                .map_err(describe)?,
        ),
        None => None,
    };

    info!(
        simulations = request.params.num_simulations(),
        years = request.params.years(),
        mean_final = statistics.mean_final,
        prob_loss = statistics.prob_loss,
        "simulation complete"
    );

    Ok(SimulationOutcome {
        request,
        ensemble,
        statistics,
        sensitivity,
    })
}

fn build_simulate_response(
    outcome: SimulationOutcome,
    charts: Option<ChartOptions>,
) -> SimulateResponse {
    let params = outcome.request.params;
    SimulateResponse {
        parameters: params,
        seed: outcome.request.seed,
        low_sample_warning: params.is_low_sample(),
        warnings: parameter_warnings(&params),
        charts: charts.map(|options| ChartData::build(&outcome.ensemble, &outcome.statistics, options)),
        statistics: outcome.statistics,
        sensitivity: outcome.sensitivity,
    }
}

pub fn simulate_command(args: SimulateArgs) -> Result<String, String> {
    let request = build_request(&args)?;
    let outcome = execute(request)?;

    if args.json {
        let response = build_simulate_response(outcome, None);
        return serde_json::to_string_pretty(&response)
            .map_err(|e| format!("Failed to serialize results: {e}"));
    }

    let mut text = render_summary(&outcome.request.params, &outcome.statistics);
    text.push_str(&format!("\nSeed: {}", outcome.request.seed));
    if let Some(rows) = &outcome.sensitivity {
        text.push_str("\n\n");
        text.push_str(&render_sensitivity(rows));
    }
    Ok(text)
}

fn capm(args: &CapmArgs) -> f64 {
    capm_expected_return(
        args.risk_free_rate / 100.0,
        args.beta,
        args.market_return / 100.0,
    )
}

fn bond(args: &BondArgs) -> Result<BondValuation, String> {
    bond_present_value(
        args.face_value,
        args.coupon_rate / 100.0,
        args.years,
        args.market_rate / 100.0,
    )
    .map_err(describe)
}

fn futures(args: &FuturesArgs) -> Result<FuturesMarginResult, String> {
    futures_margin(FuturesPosition {
        entry_price: args.entry_price,
        contracts: args.contracts,
        contract_size: args.contract_size,
        margin_rate: args.margin_rate,
        total_capital: args.total_capital,
    })
    .map_err(describe)
}

pub fn capm_command(args: CapmArgs) -> Result<String, String> {
    Ok(format!("Expected return: {}", format_percent(capm(&args))))
}

pub fn bond_command(args: BondArgs) -> Result<String, String> {
    let valuation = bond(&args)?;
    Ok(format!(
        "Present value of coupons: {}\nPresent value of face: {}\nBond price: {}",
        format_currency(valuation.coupons_present_value),
        format_currency(valuation.face_present_value),
        format_currency(valuation.price)
    ))
}

pub fn futures_command(args: FuturesArgs) -> Result<String, String> {
    let result = futures(&args)?;
    let mut lines = vec![
        format!(
            "Liquidation price: {}",
            format_currency(result.liquidation_price)
        ),
        format!("Capital usage: {}", format_percent(result.capital_usage)),
    ];
    if result.high_capital_usage {
        lines.push("Warning: capital usage is high, position is risky".to_string());
    }
    lines.push(format!("Leverage: {:.2}x", result.leverage));
    lines.push(format!("Required margin: {}", format_currency(result.margin)));
    Ok(lines.join("\n"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    initial_investment: Option<f64>,
    annual_return: Option<f64>,
    volatility: Option<f64>,
    years: Option<u32>,
    simulations: Option<u32>,
    seed: Option<u64>,
    sensitivity: Option<bool>,
    sensitivity_trials: Option<u32>,
    volatility_multipliers: Option<String>,
    histogram_bins: Option<usize>,
    sample_paths: Option<usize>,
    max_cdf_points: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CapmPayload {
    risk_free_rate: Option<f64>,
    beta: Option<f64>,
    market_return: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BondPayload {
    face_value: Option<f64>,
    coupon_rate: Option<f64>,
    years: Option<u32>,
    market_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FuturesPayload {
    entry_price: Option<f64>,
    contracts: Option<u32>,
    contract_size: Option<f64>,
    margin_rate: Option<f64>,
    total_capital: Option<f64>,
}

#[derive(Debug)]
struct ApiRequest {
    simulation: SimulationRequest,
    charts: ChartOptions,
}

fn default_args_for_api() -> SimulateArgs {
    SimulateArgs {
        initial_investment: 10_000.0,
        annual_return: 8.0,
        volatility: 15.0,
        years: 10,
        simulations: 5_000,
        seed: Some(42),
        no_sensitivity: false,
        sensitivity_trials: DEFAULT_SENSITIVITY_TRIALS,
        volatility_multipliers: DEFAULT_VOLATILITY_MULTIPLIERS.to_vec(),
        json: true,
    }
}

fn parse_multipliers(raw: &str) -> Result<Vec<f64>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f64>().map_err(|_| {
                format!("volatilityMultipliers must be comma-separated numbers, got {s:?}")
            })
        })
        .collect()
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, String> {
    let mut args = default_args_for_api();
    let mut charts = ChartOptions::default();

    if let Some(v) = payload.initial_investment {
        args.initial_investment = v;
    }
    if let Some(v) = payload.annual_return {
        args.annual_return = v;
    }
    if let Some(v) = payload.volatility {
        args.volatility = v;
    }
    if let Some(v) = payload.years {
        args.years = v;
    }
    if let Some(v) = payload.simulations {
        args.simulations = v;
    }
    if let Some(v) = payload.seed {
        args.seed = Some(v);
    }
    if let Some(v) = payload.sensitivity {
        args.no_sensitivity = !v;
    }
    if let Some(v) = payload.sensitivity_trials {
        args.sensitivity_trials = v;
    }
    if let Some(raw) = payload.volatility_multipliers.as_deref() {
        args.volatility_multipliers = parse_multipliers(raw)?;
    }
    if let Some(v) = payload.histogram_bins {
        if v == 0 || v > MAX_API_HISTOGRAM_BINS {
            return Err(format!(
                "histogramBins must be between 1 and {MAX_API_HISTOGRAM_BINS}"
            ));
        }
        charts.histogram_bins = v;
    }
    if let Some(v) = payload.sample_paths {
        if v > MAX_API_SAMPLE_PATHS {
            return Err(format!("samplePaths must be <= {MAX_API_SAMPLE_PATHS}"));
        }
        charts.sample_paths = v;
    }
    if let Some(v) = payload.max_cdf_points {
        if !(2..=MAX_API_CDF_POINTS).contains(&v) {
            return Err(format!(
                "maxCdfPoints must be between 2 and {MAX_API_CDF_POINTS}"
            ));
        }
        charts.max_cdf_points = v;
    }

    let path_points = args.simulations as u64 * (args.years as u64 + 1);
    if path_points > MAX_API_PATH_POINTS {
        return Err(format!(
            "simulations * (years + 1) must be <= {MAX_API_PATH_POINTS}"
        ));
    }
    let sweep_points = (args.sensitivity_trials as u64)
        .saturating_mul(args.volatility_multipliers.len() as u64)
        .saturating_mul(args.years as u64);
    if !args.no_sensitivity && sweep_points > MAX_API_PATH_POINTS {
        return Err(format!(
            "sensitivityTrials * multipliers * years must be <= {MAX_API_PATH_POINTS}"
        ));
    }

    Ok(ApiRequest {
        simulation: build_request(&args)?,
        charts,
    })
}

fn required<T>(value: Option<T>, key: &str) -> Result<T, String> {
    value.ok_or_else(|| format!("{key} is required"))
}

fn capm_args_from_payload(payload: CapmPayload) -> Result<CapmArgs, String> {
    Ok(CapmArgs {
        risk_free_rate: required(payload.risk_free_rate, "riskFreeRate")?,
        beta: required(payload.beta, "beta")?,
        market_return: required(payload.market_return, "marketReturn")?,
    })
}

fn bond_args_from_payload(payload: BondPayload) -> Result<BondArgs, String> {
    let years = required(payload.years, "years")?;
    if years > MAX_BOND_YEARS {
        return Err(format!("years must be <= {MAX_BOND_YEARS}"));
    }
    Ok(BondArgs {
        face_value: required(payload.face_value, "faceValue")?,
        coupon_rate: required(payload.coupon_rate, "couponRate")?,
        years,
        market_rate: required(payload.market_rate, "marketRate")?,
    })
}

fn futures_args_from_payload(payload: FuturesPayload) -> Result<FuturesArgs, String> {
    Ok(FuturesArgs {
        entry_price: required(payload.entry_price, "entryPrice")?,
        contracts: required(payload.contracts, "contracts")?,
        contract_size: required(payload.contract_size, "contractSize")?,
        margin_rate: required(payload.margin_rate, "marginRate")?,
        total_capital: required(payload.total_capital, "totalCapital")?,
    })
}

fn router() -> Router {
    Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/capm", get(capm_get_handler).post(capm_post_handler))
        .route("/api/bond", get(bond_get_handler).post(bond_post_handler))
        .route(
            "/api/futures",
            get(futures_get_handler).post(futures_post_handler),
        )
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "simulation HTTP API listening");
    info!("local access: http://127.0.0.1:{port}/api/simulate");

    axum::serve(listener, router()).await
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
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let charts = request.charts;
    let joined = tokio::task::spawn_blocking(move || {
        execute(request.simulation).map(|outcome| build_simulate_response(outcome, Some(charts)))
    })
    .await;

    match joined {
        Ok(Ok(response)) => json_response(StatusCode::OK, response),
        Ok(Err(msg)) => error_response(StatusCode::BAD_REQUEST, &msg),
        Err(e) => {
            warn!(error = %e, "simulation task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation failed")
        }
    }
}

async fn capm_get_handler(Query(payload): Query<CapmPayload>) -> Response {
    capm_handler_impl(payload)
}

async fn capm_post_handler(Json(payload): Json<CapmPayload>) -> Response {
    capm_handler_impl(payload)
}

fn capm_handler_impl(payload: CapmPayload) -> Response {
    match capm_args_from_payload(payload) {
        Ok(args) => json_response(
            StatusCode::OK,
            CapmResponse {
                expected_return: capm(&args),
            },
        ),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn bond_get_handler(Query(payload): Query<BondPayload>) -> Response {
    bond_handler_impl(payload)
}

async fn bond_post_handler(Json(payload): Json<BondPayload>) -> Response {
    bond_handler_impl(payload)
}

fn bond_handler_impl(payload: BondPayload) -> Response {
    match bond_args_from_payload(payload).and_then(|args| bond(&args)) {
        Ok(valuation) => json_response(StatusCode::OK, valuation),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn futures_get_handler(Query(payload): Query<FuturesPayload>) -> Response {
    futures_handler_impl(payload)
}

async fn futures_post_handler(Json(payload): Json<FuturesPayload>) -> Response {
    futures_handler_impl(payload)
}

fn futures_handler_impl(payload: FuturesPayload) -> Response {
    match futures_args_from_payload(payload).and_then(|args| futures(&args)) {
        Ok(result) => json_response(StatusCode::OK, result),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
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
