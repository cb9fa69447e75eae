use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    Condition, ConditionsOp, DEFAULT_HIGH_PERCENTILE, DEFAULT_HORIZON_MONTHS,
    DEFAULT_LOW_PERCENTILE, DEFAULT_SAMPLE_COUNT, MAX_HORIZON_MONTHS, MAX_SAMPLE_COUNT,
    MonthlyBalance, MonthlyDelta, NetWorthGraph, ProjectionBands, ProjectionConfig, Transaction,
    build_networth_graph, cents_to_units, project, project_transactions,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliConditionsOp {
    And,
    Or,
}

impl From<CliConditionsOp> for ConditionsOp {
    fn from(value: CliConditionsOp) -> Self {
        match value {
            CliConditionsOp::And => ConditionsOp::And,
            CliConditionsOp::Or => ConditionsOp::Or,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ApiConditionsOp {
    #[serde(alias = "$and", alias = "AND")]
    And,
    #[serde(alias = "$or", alias = "OR")]
    Or,
}

impl From<ApiConditionsOp> for CliConditionsOp {
    fn from(value: ApiConditionsOp) -> Self {
        match value {
            ApiConditionsOp::And => CliConditionsOp::And,
            ApiConditionsOp::Or => CliConditionsOp::Or,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectionPayload {
    deltas: Option<Vec<f64>>,
    transactions: Option<Vec<Transaction>>,
    conditions: Option<Vec<Condition>>,
    conditions_op: Option<ApiConditionsOp>,

    samples: Option<u32>,
    horizon_months: Option<u32>,
    low_percentile: Option<f64>,
    high_percentile: Option<f64>,
    seed: Option<u64>,
    start_balance: Option<f64>,
}

/// Query-string form of [`ProjectionPayload`]; `deltas` is comma separated.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectionQuery {
    deltas: Option<String>,
    samples: Option<u32>,
    horizon_months: Option<u32>,
    low_percentile: Option<f64>,
    high_percentile: Option<f64>,
    seed: Option<u64>,
    start_balance: Option<f64>,
}

impl TryFrom<ProjectionQuery> for ProjectionPayload {
    type Error = String;

    fn try_from(query: ProjectionQuery) -> Result<Self, Self::Error> {
        let deltas = match query.deltas {
            Some(raw) => Some(
                raw.split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| {
                        s.trim()
                            .parse::<f64>()
                            .map_err(|_| format!("deltas: `{}` is not a number", s.trim()))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
            ),
            None => None,
        };
        Ok(ProjectionPayload {
            deltas,
            samples: query.samples,
            horizon_months: query.horizon_months,
            low_percentile: query.low_percentile,
            high_percentile: query.high_percentile,
            seed: query.seed,
            start_balance: query.start_balance,
            ..ProjectionPayload::default()
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NetWorthPayload {
    balances: Vec<MonthlyBalance>,
    #[serde(default)]
    projection: Option<ProjectionPayload>,
}

/// File accepted by `--transactions`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionFile {
    transactions: Vec<Transaction>,
    #[serde(default)]
    conditions: Vec<Condition>,
}

#[derive(Parser, Debug)]
#[command(
    name = "networth",
    about = "Bootstrap projection bands from monthly net cashflow history"
)]
pub struct Cli {
    #[arg(
        long,
        value_delimiter = ',',
        allow_hyphen_values = true,
        help = "Historical monthly net deltas, comma separated"
    )]
    deltas: Vec<f64>,
    #[arg(
        long,
        help = "JSON file with `transactions` and optional `conditions`; overrides --deltas"
    )]
    transactions: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = CliConditionsOp::And)]
    conditions_op: CliConditionsOp,
    #[arg(long, default_value_t = DEFAULT_SAMPLE_COUNT, help = "Synthetic futures to draw")]
    samples: u32,
    #[arg(long, default_value_t = DEFAULT_HORIZON_MONTHS)]
    horizon_months: u32,
    #[arg(long, default_value_t = DEFAULT_LOW_PERCENTILE)]
    low_percentile: f64,
    #[arg(long, default_value_t = DEFAULT_HIGH_PERCENTILE)]
    high_percentile: f64,
    #[arg(long, help = "Seed for reproducible runs; defaults to the clock")]
    seed: Option<u64>,
    #[arg(
        long,
        default_value_t = 0.0,
        allow_hyphen_values = true,
        help = "Balance the bands start from"
    )]
    start_balance: f64,
}

#[derive(Debug)]
enum HistorySource {
    Deltas(Vec<f64>),
    Transactions {
        transactions: Vec<Transaction>,
        conditions: Vec<Condition>,
        op: ConditionsOp,
    },
}

#[derive(Debug)]
struct ProjectionRequest {
    config: ProjectionConfig,
    source: HistorySource,
    start_balance: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    months: Option<Vec<MonthlyDelta>>,
    start_balance: f64,
    #[serde(flatten)]
    bands: ProjectionBands,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct NetWorthResponse {
    graph: NetWorthGraph,
    #[serde(skip_serializing_if = "Option::is_none")]
    projection: Option<ProjectionResponse>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_config(cli: &Cli) -> Result<ProjectionConfig, String> {
    if !(1..=MAX_SAMPLE_COUNT).contains(&cli.samples) {
        return Err(format!("--samples must be in 1..={MAX_SAMPLE_COUNT}"));
    }

    if !(1..=MAX_HORIZON_MONTHS).contains(&cli.horizon_months) {
        return Err(format!("--horizon-months must be in 1..={MAX_HORIZON_MONTHS}"));
    }

    if !(cli.low_percentile > 0.0 && cli.low_percentile <= 100.0) {
        return Err("--low-percentile must be in (0, 100]".to_string());
    }

    if !(cli.high_percentile > 0.0 && cli.high_percentile <= 100.0) {
        return Err("--high-percentile must be in (0, 100]".to_string());
    }

    if cli.low_percentile > cli.high_percentile {
        return Err("--low-percentile must be <= --high-percentile".to_string());
    }

    if !cli.start_balance.is_finite() {
        return Err("--start-balance must be finite".to_string());
    }

    Ok(ProjectionConfig {
        sample_count: cli.samples,
        horizon_months: cli.horizon_months,
        low_percentile: cli.low_percentile,
        high_percentile: cli.high_percentile,
        seed: cli.seed,
    })
}

fn request_from_cli(cli: Cli) -> Result<ProjectionRequest, String> {
    let config = build_config(&cli)?;
    let source = match &cli.transactions {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
            let file = serde_json::from_str::<TransactionFile>(&raw)
                .map_err(|e| format!("invalid transactions file {}: {e}", path.display()))?;
            HistorySource::Transactions {
                transactions: file.transactions,
                conditions: file.conditions,
                op: cli.conditions_op.into(),
            }
        }
        None => HistorySource::Deltas(cli.deltas),
    };

    Ok(ProjectionRequest {
        config,
        source,
        start_balance: cli.start_balance,
    })
}

/// Runs a one-shot projection and renders it as pretty JSON.
pub fn run_cli(cli: Cli) -> Result<String, String> {
    let request = request_from_cli(cli)?;
    let response = run_projection(request)?;
    serde_json::to_string_pretty(&response).map_err(|e| format!("failed to encode result: {e}"))
}

fn run_projection(request: ProjectionRequest) -> Result<ProjectionResponse, String> {
    let (months, bands) = match request.source {
        HistorySource::Deltas(deltas) => {
            let bands = project(&deltas, &request.config).map_err(|e| e.to_string())?;
            (None, bands)
        }
        HistorySource::Transactions {
            transactions,
            conditions,
            op,
        } => {
            let (months, bands) =
                project_transactions(&transactions, &conditions, op, &request.config)
                    .map_err(|e| e.to_string())?;
            (Some(months), bands)
        }
    };

    info!(
        seed = bands.seed,
        samples = bands.sample_count,
        low_rank = bands.low_rank,
        high_rank = bands.high_rank,
        "projection complete"
    );

    Ok(ProjectionResponse {
        months,
        start_balance: request.start_balance,
        bands: bands.anchored(request.start_balance),
    })
}

fn router() -> Router {
    Router::new()
        .route(
            "/api/projection",
            get(projection_get_handler).post(projection_post_handler),
        )
        .route("/api/networth", post(networth_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = router();

    let listener = TcpListener::bind(addr).await?;
    info!("net worth API listening on http://{addr}");
    info!("local access: http://127.0.0.1:{port}/api/projection");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn projection_get_handler(Query(query): Query<ProjectionQuery>) -> Response {
    match ProjectionPayload::try_from(query) {
        Ok(payload) => projection_handler_impl(payload).await,
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn projection_post_handler(Json(payload): Json<ProjectionPayload>) -> Response {
    projection_handler_impl(payload).await
}

async fn projection_handler_impl(payload: ProjectionPayload) -> Response {
    let result = api_request_from_payload(payload).and_then(run_projection);
    match result {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

/// `POST /api/networth`. The optional projection continues from the last
/// balance, so a `projection.startBalance` in the payload is rejected rather
/// than silently replaced.
async fn networth_handler(Json(payload): Json<NetWorthPayload>) -> Response {
    match build_networth_response(payload) {
        Ok(response) => json_response(StatusCode::OK, response),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn build_networth_response(payload: NetWorthPayload) -> Result<NetWorthResponse, String> {
    let graph = build_networth_graph(&payload.balances).map_err(|e| e.to_string())?;

    let projection = match payload.projection {
        Some(mut projection) => {
            if projection.start_balance.is_some() {
                return Err(
                    "projection.startBalance is derived from the last balance; omit it"
                        .to_string(),
                );
            }
            // Bands share the minor units of the history; the graph plots whole units.
            let last_networth = match payload.balances.last() {
                Some(b) => b
                    .assets
                    .checked_sub(b.debt)
                    .ok_or("net worth is out of range")?,
                None => 0,
            };
            projection.start_balance = Some(last_networth as f64);
            let request = api_request_from_payload(projection)?;
            let mut response = run_projection(request)?;
            response.start_balance = cents_to_units(last_networth);
            for v in response
                .bands
                .low_band
                .iter_mut()
                .chain(response.bands.high_band.iter_mut())
            {
                *v /= 100.0;
            }
            Some(response)
        }
        None => None,
    };

    Ok(NetWorthResponse { graph, projection })
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
    if status == StatusCode::BAD_REQUEST {
        warn!(error = msg, "rejected request");
    }
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ProjectionRequest, String> {
    let payload = serde_json::from_str::<ProjectionPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: ProjectionPayload) -> Result<ProjectionRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.samples {
        cli.samples = v;
    }
    if let Some(v) = payload.horizon_months {
        cli.horizon_months = v;
    }
    if let Some(v) = payload.low_percentile {
        cli.low_percentile = v;
    }
    if let Some(v) = payload.high_percentile {
        cli.high_percentile = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = Some(v);
    }
    if let Some(v) = payload.start_balance {
        cli.start_balance = v;
    }
    if let Some(v) = payload.conditions_op {
        cli.conditions_op = v.into();
    }

    let config = build_config(&cli)?;
    let source = match (payload.transactions, payload.deltas) {
        (Some(transactions), _) => HistorySource::Transactions {
            transactions,
            conditions: payload.conditions.unwrap_or_default(),
            op: cli.conditions_op.into(),
        },
        (None, Some(deltas)) => HistorySource::Deltas(deltas),
        (None, None) => return Err("either deltas or transactions is required".to_string()),
    };

    Ok(ProjectionRequest {
        config,
        source,
        start_balance: cli.start_balance,
    })
}

fn default_cli_for_api() -> Cli {
    Cli {
        deltas: Vec::new(),
        transactions: None,
        conditions_op: CliConditionsOp::And,
        samples: DEFAULT_SAMPLE_COUNT,
        horizon_months: DEFAULT_HORIZON_MONTHS,
        low_percentile: DEFAULT_LOW_PERCENTILE,
        high_percentile: DEFAULT_HIGH_PERCENTILE,
        seed: None,
        start_balance: 0.0,
    }
}
