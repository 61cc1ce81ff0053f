//! MSMS-ML: Mine Safety Sensor Modelling service
//!
//! ## Usage
//!
//! ```bash
//! # Serve the HTTP API (default)
//! msms-ml serve --addr 0.0.0.0:8100
//!
//! # Train once and print the report
//! msms-ml train
//!
//! # Use an explicit config file
//! msms-ml --config ./msms_config.toml serve
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use msms_ml::api::{create_app, ServiceState};
use msms_ml::config::ServiceConfig;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "msms-ml")]
#[command(about = "Mine sensor feature engineering, model training and inference service")]
#[command(version)]
struct CliArgs {
    /// Explicit config file; skips the MSMS_CONFIG / ./msms_config.toml search
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Serve the HTTP API
    Serve {
        /// Override the server address (default: "0.0.0.0:8100")
        #[arg(short, long, value_name = "HOST:PORT")]
        addr: Option<String>,
    },
    /// Train all bundles once, persist them and print the report as JSON
    Train,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("MSMS_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(explicit: Option<&PathBuf>) -> Result<ServiceConfig> {
    let config = match explicit {
        Some(path) => {
            let mut config = ServiceConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env_overrides();
            info!(path = %path.display(), "Loaded config from --config");
            config
        }
        None => ServiceConfig::load(),
    };
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn init_thread_pool(n_jobs: usize) -> Result<()> {
    if n_jobs == 0 {
        return Ok(());
    }
    rayon::ThreadPoolBuilder::new()
        .num_threads(n_jobs)
        .build_global()
        .context("Failed to size the fitting thread pool")?;
    info!(threads = n_jobs, "Fitting thread pool configured");
    Ok(())
}

async fn run_train(state: ServiceState) -> Result<()> {
    let training = state.training.clone();
    let outcome = tokio::task::spawn_blocking(move || training.train_all())
        .await
        .context("Training task panicked")?
        .context("Training failed")?;

    if outcome.is_no_data() {
        info!("No raw data found; nothing trained");
    }
    let report = serde_json::to_string_pretty(&outcome).context("Failed to serialize training report")?;
    println!("{report}");
    Ok(())
}

async fn run_server(state: ServiceState, addr: String, cancel_token: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("[HttpServer] Listening on http://{}", addr);

    let app = create_app(state);
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            info!("[HttpServer] Received shutdown signal");
        })
        .await;

    match result {
        Ok(()) => {
            info!("[HttpServer] Graceful shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("[HttpServer] Server error: {}", e);
            Err(anyhow::anyhow!("HTTP server error: {}", e))
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is normal
    let dotenv = dotenvy::dotenv();

    init_tracing();
    if let Ok(path) = dotenv {
        info!(path = %path.display(), "Loaded environment from .env");
    }

    let args = CliArgs::parse();
    let config = load_config(args.config.as_ref())?;
    info!(
        data_dir = %config.data.data_dir.display(),
        models_dir = %config.artifacts.models_dir.display(),
        interval = %config.features.agg_interval,
        retention = ?config.artifacts.retention,
        "Configuration ready"
    );

    init_thread_pool(config.training.n_jobs)?;
    let state = ServiceState::from_config(&config).context("Failed to initialize services")?;

    match args.command.unwrap_or(SubCommand::Serve { addr: None }) {
        SubCommand::Train => run_train(state).await?,
        SubCommand::Serve { addr } => {
            let addr = addr.unwrap_or_else(|| config.server.addr());

            let cancel_token = CancellationToken::new();
            let shutdown_token = cancel_token.clone();
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                info!("Received Ctrl+C, initiating shutdown...");
                shutdown_token.cancel();
            });

            run_server(state, addr, cancel_token).await?;
        }
    }

    info!("MSMS-ML shutdown complete");
    Ok(())
}
