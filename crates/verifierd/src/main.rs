//! `axon-verifierd`: independent, read-only verifier for the audit ledger.
//!
//! Recomputes every entry's hash and signature out-of-band and serves
//! the result over HTTP. The daemon never writes into the ledger
//! directory; its only output is timestamped reports in its own
//! directory. `POST /run` exists for operator convenience and is off
//! unless explicitly enabled.

mod reports;

use std::path::PathBuf;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, routing::post, Json, Router};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use axon_config::{Domain, Settings};
use axon_ledger::{verify_ledger, VerifyOptions};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase output verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Override log level (e.g. info, debug, trace).
    #[arg(long, env = "AXON_LOG_LEVEL")]
    log_level: Option<String>,
    /// HTTP bind address.
    #[arg(long, env = "AXON_VERIFIER_ADDR", default_value = "127.0.0.1:8791")]
    addr: String,
    /// Ledger directory (read-only for this process).
    #[arg(long, env = "AXON_LEDGER_DIR")]
    ledger_dir: PathBuf,
    /// Directory this daemon writes its verification reports into.
    #[arg(long, env = "AXON_REPORTS_DIR")]
    reports_dir: PathBuf,
    /// Optional HMAC secret file for checking hmac-signed entries.
    #[arg(long, env = "AXON_HMAC_SECRET")]
    hmac_secret: Option<PathBuf>,
    /// Expose POST /run backed by the chain (requires provider creds).
    #[arg(long)]
    enable_run: bool,
}

#[derive(Clone)]
struct AppState {
    ledger_dir: PathBuf,
    reports_dir: PathBuf,
    hmac_secret: Option<PathBuf>,
    run_settings: Option<Settings>,
}

#[derive(Serialize)]
struct HealthReport {
    status: &'static str,
    ledger_path: String,
    reports_path: String,
    version: &'static str,
}

#[derive(Deserialize)]
struct RunBody {
    objective: String,
    #[serde(default)]
    domain: Option<Domain>,
    #[serde(default)]
    session_id: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = cli
        .log_level
        .as_deref()
        .map(|lvl| match lvl.to_ascii_uppercase().as_str() {
            "TRACE" => Level::TRACE,
            "DEBUG" => Level::DEBUG,
            _ => Level::INFO,
        })
        .unwrap_or_else(|| match cli.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        });
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_env_filter(env_filter)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    std::fs::create_dir_all(&cli.reports_dir)?;
    let run_settings = if cli.enable_run {
        Some(Settings::load()?)
    } else {
        None
    };
    let state = Arc::new(AppState {
        ledger_dir: cli.ledger_dir,
        reports_dir: cli.reports_dir,
        hmac_secret: cli.hmac_secret,
        run_settings,
    });

    let mut app = Router::new()
        .route("/health", get(health_endpoint))
        .route("/verify", get(verify_endpoint))
        .route("/reports", get(reports_endpoint))
        .route("/domains", get(domains_endpoint));
    if state.run_settings.is_some() {
        app = app.route("/run", post(run_endpoint));
    }
    let app = app.with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(&cli.addr).await?;
    info!(addr = %listener.local_addr()?, ledger = %state.ledger_dir.display(), "verifier listening");
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

async fn health_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthReport {
        status: "ok",
        ledger_path: state.ledger_dir.display().to_string(),
        reports_path: state.reports_dir.display().to_string(),
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn verify_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let options = VerifyOptions {
        hmac_secret: state.hmac_secret.clone(),
    };
    match verify_ledger(&state.ledger_dir, &options) {
        Ok(outcome) => {
            if let Err(err) = reports::write_report(&state.reports_dir, &outcome) {
                tracing::warn!(error = %err, "failed to write verification report");
            }
            Json(outcome).into_response()
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("verification walk failed: {err}"),
        )
            .into_response(),
    }
}

async fn reports_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match reports::list_reports(&state.reports_dir) {
        Ok(list) => Json(list).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to list reports: {err}"),
        )
            .into_response(),
    }
}

async fn domains_endpoint() -> impl IntoResponse {
    let domains: Vec<&str> = Domain::all().iter().map(|d| d.as_str()).collect();
    Json(domains)
}

async fn run_endpoint(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunBody>,
) -> impl IntoResponse {
    let Some(settings) = state.run_settings.clone() else {
        return (StatusCode::NOT_FOUND, "run endpoint disabled".to_string()).into_response();
    };
    let chain = match axon_core::Chain::from_settings(settings) {
        Ok(chain) => chain,
        Err(err) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("chain setup: {err}"))
                .into_response()
        }
    };
    match chain.run(&body.objective, body.domain, body.session_id).await {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("chain run failed: {err}"),
        )
            .into_response(),
    }
}
