//! Stockcast - multi-model short-term price forecaster
//!
//! Usage:
//!   stockcast serve --port 3001                 - Launch the HTTP API
//!   stockcast predict --symbol BTCUSDT          - Forecast one symbol
//!   stockcast batch --symbols BTCUSDT,ETHUSDT   - Forecast and rank many symbols

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use engine::api::interval_to_ms;
use engine::projection::recent_average_volume;
use engine::{
    project_bars, seed_from_symbol, Bar, BinanceClient, EnsemblePredictor, EnsembleResult,
    EnsembleWeights, FileHistoryProvider, ForecastSummary, HistoryProvider, HistoryRequest,
    PredictorConfig, ProjectionConfig, SignalScorer, TradingSignal,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_INTERVAL: &str = "1d";
const DEFAULT_LIMIT: usize = 250;
const DEFAULT_HORIZON: usize = 5;
const VOLUME_LOOKBACK: usize = 20;

#[derive(Parser)]
#[command(name = "stockcast")]
#[command(about = "Multi-model short-term price forecaster", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read history from `<DIR>/<SYMBOL>.json` instead of Binance
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone)]
struct ForecastArgs {
    /// Bar interval (1h, 4h, 1d, ...)
    #[arg(long, default_value = DEFAULT_INTERVAL)]
    interval: String,
    /// Number of history bars to fetch
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: usize,
    /// Steps to forecast
    #[arg(long, default_value_t = DEFAULT_HORIZON)]
    horizon: usize,
    /// Ensemble weights technical,ml,support_resistance
    #[arg(long, value_delimiter = ',')]
    weights: Option<Vec<f64>>,
    /// Model seed (defaults to STOCKCAST_SEED, then a hash of the symbol)
    #[arg(long)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the HTTP API
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        /// Port to listen on
        #[arg(short, long, default_value_t = 3001)]
        port: u16,
    },
    /// Forecast a single symbol
    Predict {
        #[arg(long)]
        symbol: String,
        #[command(flatten)]
        args: ForecastArgs,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Forecast several symbols and print a summary table
    Batch {
        /// Symbols to analyze (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        symbols: Vec<String>,
        #[command(flatten)]
        args: ForecastArgs,
        /// Optional JSON export path
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[derive(Clone)]
struct AppState {
    provider: Arc<dyn HistoryProvider>,
    default_seed: Option<u64>,
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug,engine=debug,stockcast=debug")
    } else {
        EnvFilter::new("info,engine=info,stockcast=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    let provider = build_provider(cli.data_dir.as_ref())?;
    let default_seed = env_seed();

    match cli.command {
        Commands::Serve { host, port } => {
            cmd_serve(&host, port, provider, default_seed).await?;
        }
        Commands::Predict { symbol, args, json } => {
            cmd_predict(provider, default_seed, &symbol, &args, json).await?;
        }
        Commands::Batch {
            symbols,
            args,
            export,
        } => {
            cmd_batch(provider, default_seed, symbols, &args, export).await?;
        }
    }

    Ok(())
}

fn build_provider(data_dir: Option<&PathBuf>) -> anyhow::Result<Arc<dyn HistoryProvider>> {
    if let Some(dir) = data_dir {
        info!(dir = %dir.display(), "Using file history provider");
        return Ok(Arc::new(FileHistoryProvider::new(dir)));
    }
    let client = match std::env::var("STOCKCAST_BINANCE_URL") {
        Ok(url) => BinanceClient::with_base_url(url)?,
        Err(_) => BinanceClient::new()?,
    };
    Ok(Arc::new(client))
}

fn env_seed() -> Option<u64> {
    let raw = std::env::var("STOCKCAST_SEED").ok()?;
    match raw.trim().parse() {
        Ok(seed) => Some(seed),
        Err(_) => {
            warn!(value = %raw, "Ignoring invalid STOCKCAST_SEED");
            None
        }
    }
}

fn parse_weights(raw: Option<&[f64]>) -> anyhow::Result<EnsembleWeights> {
    match raw {
        None => Ok(EnsembleWeights::default()),
        Some([technical, ml, sr]) => Ok(EnsembleWeights::new(*technical, *ml, *sr).normalized()?),
        Some(other) => anyhow::bail!("Expected three weights, got {}", other.len()),
    }
}

// ============================================================================
// Prediction pipeline
// ============================================================================

/// Everything produced for one symbol
#[derive(Debug, Clone, Serialize)]
struct PredictionReport {
    symbol: String,
    interval: String,
    bars: usize,
    seed: u64,
    current_price: f64,
    result: EnsembleResult,
    signal: TradingSignal,
    summary: ForecastSummary,
    projection: Vec<Bar>,
}

#[derive(Debug, Clone)]
struct PredictionJob {
    symbol: String,
    interval: String,
    limit: usize,
    horizon: usize,
    weights: EnsembleWeights,
    seed: u64,
}

impl PredictionJob {
    fn from_args(
        symbol: &str,
        args: &ForecastArgs,
        default_seed: Option<u64>,
    ) -> anyhow::Result<Self> {
        let symbol = symbol.trim().to_uppercase();
        Ok(Self {
            seed: args
                .seed
                .or(default_seed)
                .unwrap_or_else(|| seed_from_symbol(&symbol)),
            weights: parse_weights(args.weights.as_deref())?,
            interval: args.interval.clone(),
            limit: args.limit,
            horizon: args.horizon,
            symbol,
        })
    }
}

async fn run_prediction(
    provider: &dyn HistoryProvider,
    job: PredictionJob,
) -> anyhow::Result<PredictionReport> {
    let request = HistoryRequest::new(&job.symbol, &job.interval, job.limit);
    let bars = provider.fetch_history(&request).await?;

    // CPU-bound: keep it off the async workers
    tokio::task::spawn_blocking(move || predict_from_bars(job, bars)).await?
}

fn predict_from_bars(job: PredictionJob, bars: Vec<Bar>) -> anyhow::Result<PredictionReport> {
    let last_bar = bars
        .last()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("No data available for {}", job.symbol))?;

    let config = PredictorConfig::default()
        .with_weights(job.weights)
        .with_seed(job.seed);
    let scorer = SignalScorer::new(config.kdj.clone(), config.macd.clone());
    let predictor = EnsemblePredictor::new(config);

    let result = predictor.predict_short_term(&bars, job.horizon)?;
    let signal = scorer.score_history(&bars, &result.ensemble.prices);
    let current_price = last_bar.close_f64();
    let summary = ForecastSummary::new(current_price, &result);

    let interval_ms = interval_to_ms(&job.interval).unwrap_or(86_400_000);
    let projection_config = ProjectionConfig {
        interval_ms,
        skip_weekends: interval_ms >= 86_400_000,
        average_volume: recent_average_volume(&bars, VOLUME_LOOKBACK),
        ..ProjectionConfig::default()
    };
    let mut rng = StdRng::seed_from_u64(job.seed);
    let projection = project_bars(&last_bar, &result.ensemble, &projection_config, &mut rng)?;

    Ok(PredictionReport {
        symbol: job.symbol,
        interval: job.interval,
        bars: bars.len(),
        seed: job.seed,
        current_price,
        result,
        signal,
        summary,
        projection,
    })
}

// ============================================================================
// Predict command
// ============================================================================

async fn cmd_predict(
    provider: Arc<dyn HistoryProvider>,
    default_seed: Option<u64>,
    symbol: &str,
    args: &ForecastArgs,
    json: bool,
) -> anyhow::Result<()> {
    let job = PredictionJob::from_args(symbol, args, default_seed)?;
    let report = run_prediction(provider.as_ref(), job).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("\n=== Stockcast v{} ===", APP_VERSION);
    println!(
        "{} ({}, {} bars, seed {})",
        report.symbol, report.interval, report.bars, report.seed
    );
    println!("Current price: {:.4}", report.current_price);

    println!("\nForecasts:");
    for (method, outcome) in &report.result.outcomes {
        match outcome.forecast() {
            Some(forecast) => {
                let note = outcome
                    .reason()
                    .map(|r| format!("  (fallback: {})", r))
                    .unwrap_or_default();
                println!("  {:<20} {}{}", method.to_string(), format_path(&forecast.prices), note);
            }
            None => println!(
                "  {:<20} failed: {}",
                method.to_string(),
                outcome.reason().unwrap_or_default()
            ),
        }
    }
    println!(
        "  {:<20} {}",
        report.result.ensemble.method.to_string(),
        format_path(&report.result.ensemble.prices)
    );

    println!("\nProjected bars:");
    for (bar, pct) in report.projection.iter().zip(&report.summary.change_pcts) {
        let date = Utc
            .timestamp_millis_opt(bar.timestamp)
            .single()
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| bar.timestamp.to_string());
        println!(
            "  {}  O {:>10} H {:>10} L {:>10} C {:>10}  {:>+6.2}%",
            date, bar.open, bar.high, bar.low, bar.close, pct
        );
    }

    let s = &report.signal;
    println!("\nConfidence: {:.1}%", report.result.confidence * 100.0);
    println!(
        "Signal: {} (confidence {}), score {:+} [macd {:+}, trend {:+}, kdj {:+}]",
        s.recommendation, s.confidence, s.score, s.macd_score, s.trend_score, s.kdj_score
    );
    println!(
        "KDJ: K {:.1} D {:.1} J {:.1}, predicted trend {:+.2}%",
        s.current_k, s.current_d, s.current_j, s.pred_trend_pct
    );
    Ok(())
}

fn format_path(prices: &[f64]) -> String {
    prices
        .iter()
        .map(|p| format!("{:.4}", p))
        .collect::<Vec<_>>()
        .join("  ")
}

// ============================================================================
// Batch command
// ============================================================================

async fn cmd_batch(
    provider: Arc<dyn HistoryProvider>,
    default_seed: Option<u64>,
    symbols: Vec<String>,
    args: &ForecastArgs,
    export: Option<PathBuf>,
) -> anyhow::Result<()> {
    println!("\n=== Stockcast v{} ===", APP_VERSION);
    println!("Analyzing {} symbols...", symbols.len());

    let mut reports = Vec::new();
    let mut failures: Vec<(String, String)> = Vec::new();
    for (i, symbol) in symbols.iter().enumerate() {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            continue;
        }
        info!(symbol, progress = %format!("{}/{}", i + 1, symbols.len()), "Analyzing");
        let outcome = match PredictionJob::from_args(symbol, args, default_seed) {
            Ok(job) => run_prediction(provider.as_ref(), job).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!(symbol, error = %e, "Prediction failed");
                failures.push((symbol.to_string(), e.to_string()));
            }
        }
    }

    print_batch(&reports);

    if !failures.is_empty() {
        println!("\nFailed ({}):", failures.len());
        for (symbol, reason) in &failures {
            println!("  {:<12} {}", symbol, reason);
        }
    }
    println!(
        "\nDone: {} succeeded, {} failed",
        reports.len(),
        failures.len()
    );

    if let Some(path) = export {
        let export_data = serde_json::json!({
            "generated_at": Utc::now().to_rfc3339(),
            "version": APP_VERSION,
            "horizon": args.horizon,
            "interval": args.interval,
            "reports": reports,
            "failures": failures
                .iter()
                .map(|(symbol, reason)| serde_json::json!({ "symbol": symbol, "error": reason }))
                .collect::<Vec<_>>(),
        });
        std::fs::write(&path, serde_json::to_string_pretty(&export_data)?)?;
        println!("Results exported to {}", path.display());
    }

    Ok(())
}

fn print_batch(reports: &[PredictionReport]) {
    if reports.is_empty() {
        println!("\nNo results.");
        return;
    }
    println!(
        "\n  {:<12} {:>5} {:>12} {:>12} {:>8} {:>6}  {:<12} {:>5}",
        "Symbol", "Bars", "Current", "Next", "Chg%", "Conf%", "Signal", "Score"
    );
    println!("  {}", "-".repeat(84));
    for r in reports {
        println!(
            "  {:<12} {:>5} {:>12.4} {:>12.4} {:>+7.2}% {:>6.1}  {:<12} {:>+5}",
            r.symbol,
            r.bars,
            r.current_price,
            r.summary.next_price().unwrap_or(f64::NAN),
            r.summary.next_change_pct().unwrap_or(0.0),
            r.result.confidence * 100.0,
            r.signal.recommendation.label(),
            r.signal.score,
        );
    }
}

// ============================================================================
// Serve command - Axum web server
// ============================================================================

async fn cmd_serve(
    host: &str,
    port: u16,
    provider: Arc<dyn HistoryProvider>,
    default_seed: Option<u64>,
) -> anyhow::Result<()> {
    info!("Stockcast v{} starting...", APP_VERSION);

    let state = AppState {
        provider,
        default_seed,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/health", get(api_health))
        .route("/predict", post(api_predict))
        .route("/klines", get(api_klines))
        .with_state(state);

    let app = Router::new().nest("/api", api_routes).layer(cors);

    let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
    println!("\n=== Stockcast v{} ===", APP_VERSION);
    println!("Listening on http://{}", addr);
    println!("\nEndpoints:");
    println!("  GET  /api/health   - Health check");
    println!("  POST /api/predict  - Run the ensemble forecast for a symbol");
    println!("  GET  /api/klines   - Fetch history bars (proxy)");
    println!("\nPress Ctrl+C to stop\n");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// GET /api/health
async fn api_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "stockcast",
        "version": APP_VERSION,
    }))
}

#[derive(Debug, Deserialize)]
struct PredictRequest {
    symbol: String,
    #[serde(default)]
    interval: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
    #[serde(default)]
    horizon: Option<usize>,
    #[serde(default)]
    weights: Option<EnsembleWeights>,
    #[serde(default)]
    seed: Option<u64>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: String) -> ApiError {
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "message": message,
        })),
    )
}

/// POST /api/predict - fetch history and run the full pipeline
async fn api_predict(
    State(state): State<AppState>,
    Json(request): Json<PredictRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let args = ForecastArgs {
        interval: request
            .interval
            .unwrap_or_else(|| DEFAULT_INTERVAL.to_string()),
        limit: request.limit.unwrap_or(DEFAULT_LIMIT),
        horizon: request.horizon.unwrap_or(DEFAULT_HORIZON),
        weights: request
            .weights
            .map(|w| vec![w.technical, w.ml, w.support_resistance]),
        seed: request.seed,
    };
    let job = PredictionJob::from_args(&request.symbol, &args, state.default_seed)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e.to_string()))?;

    match run_prediction(state.provider.as_ref(), job).await {
        Ok(report) => Ok(Json(serde_json::json!({
            "success": true,
            "symbol": report.symbol,
            "result": report.result,
            "signal": report.signal,
            "summary": report.summary,
            "projection": report.projection,
        }))),
        Err(e) => {
            error!(symbol = %request.symbol, error = %e, "Prediction failed");
            Err(api_error(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Prediction failed: {}", e),
            ))
        }
    }
}

/// GET /api/klines - history bars from the configured provider
async fn api_klines(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<serde_json::Value> {
    let symbol = params
        .get("symbol")
        .cloned()
        .unwrap_or_else(|| "BTCUSDT".to_string());
    let interval = params
        .get("interval")
        .cloned()
        .unwrap_or_else(|| DEFAULT_INTERVAL.to_string());
    let limit: usize = params
        .get("limit")
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_LIMIT);
    let start_time: Option<i64> = params.get("start_time").and_then(|s| s.parse().ok());
    let end_time: Option<i64> = params.get("end_time").and_then(|s| s.parse().ok());

    let request = HistoryRequest::new(&symbol, &interval, limit).with_range(start_time, end_time);
    match state.provider.fetch_history(&request).await {
        Ok(bars) => Json(serde_json::json!({
            "success": true,
            "symbol": symbol,
            "interval": interval,
            "count": bars.len(),
            "bars": bars,
        })),
        Err(e) => {
            error!("Klines error: {}", e);
            Json(serde_json::json!({
                "success": false,
                "message": format!("Failed to fetch klines: {}", e),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_weights() {
        assert_eq!(parse_weights(None).unwrap(), EnsembleWeights::default());
        let w = parse_weights(Some(&[1.0, 2.0, 1.0][..])).unwrap();
        assert!((w.ml - 0.5).abs() < 1e-12);
        assert!(parse_weights(Some(&[1.0, 2.0][..])).is_err());
        assert!(parse_weights(Some(&[0.0, 0.0, 0.0][..])).is_err());
    }

    #[test]
    fn test_job_seed_precedence() {
        let mut args = ForecastArgs {
            interval: "1d".to_string(),
            limit: 100,
            horizon: 5,
            weights: None,
            seed: None,
        };
        let job = PredictionJob::from_args(" aapl ", &args, None).unwrap();
        assert_eq!(job.symbol, "AAPL");
        assert_eq!(job.seed, seed_from_symbol("AAPL"));

        assert_eq!(PredictionJob::from_args("AAPL", &args, Some(9)).unwrap().seed, 9);
        args.seed = Some(3);
        assert_eq!(PredictionJob::from_args("AAPL", &args, Some(9)).unwrap().seed, 3);
    }

    #[test]
    fn test_predict_from_bars_flat_history() {
        use rust_decimal::Decimal;
        let bars: Vec<Bar> = (0..40)
            .map(|i| Bar {
                timestamp: 1_704_067_200_000 + i * 86_400_000,
                open: Decimal::from(100),
                high: Decimal::from(101),
                low: Decimal::from(99),
                close: Decimal::from(100),
                volume: Decimal::from(5000),
            })
            .collect();
        let job = PredictionJob {
            symbol: "FLAT".to_string(),
            interval: "1d".to_string(),
            limit: 40,
            horizon: 3,
            weights: EnsembleWeights::default(),
            seed: 1,
        };
        let report = predict_from_bars(job, bars).unwrap();
        assert_eq!(report.projection.len(), 3);
        assert_eq!(report.summary.predicted_prices.len(), 3);
        assert!(report.projection.iter().all(|b| b.is_consistent()));
    }
}
