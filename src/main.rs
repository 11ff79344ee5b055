//! PUBSIM — Flutter package-operation simulator
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the shared store and engine, and serves the dashboard until
//! Ctrl+C. With the server disabled, performs a single headless run.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

use pubsim::config::AppConfig;
use pubsim::dashboard::{self, DashboardState};
use pubsim::engine::random::RngSource;
use pubsim::engine::SimulationEngine;
use pubsim::store::SimulationStore;
use pubsim::types::HistoryEntry;

const BANNER: &str = r#"
 ____  _   _ ____  ____ ___ __  __
|  _ \| | | | __ )/ ___|_ _|  \/  |
| |_) | | | |  _ \\___ \| || |\/| |
|  __/| |_| | |_) |___) | || |  | |
|_|    \___/|____/|____/___|_|  |_|

  Flutter package-operation simulator
  v0.1.0
"#;

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("PUBSIM_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load_or_default(&config_path)?;

    init_logging(&cfg);

    println!("{BANNER}");
    info!(
        config = %config_path,
        delay_ms = cfg.settings.default_delay_ms,
        auto_clear_cache = cfg.settings.auto_clear_cache,
        seed = ?cfg.engine.seed,
        "PUBSIM starting up"
    );

    let store = Arc::new(SimulationStore::new(cfg.settings.clone()));
    let engine = match cfg.engine.seed {
        Some(seed) => SimulationEngine::new(Arc::clone(&store), RngSource::seeded(seed)),
        None => SimulationEngine::new(Arc::clone(&store), RngSource::from_entropy()),
    };

    if !cfg.server.enabled {
        return run_headless(&engine, &cfg).await;
    }

    let addr = cfg.server.socket_addr()?;
    let state = Arc::new(DashboardState::new(engine.clone()));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received.");
    };

    let (local, server) = dashboard::spawn_dashboard(state, addr, shutdown).await?;
    info!(%local, "Dashboard ready. Press Ctrl+C to stop.");

    server.await.context("Dashboard task panicked")?;

    // Let an in-flight run reach its boundary so it is archived as cancelled.
    if engine.stop().await {
        warn!("Stopping active simulation");
    }
    if let Some(entry) = engine.wait().await {
        log_run_summary(&entry);
    }

    info!(runs = store.history().await.len(), "PUBSIM shut down cleanly.");
    Ok(())
}

/// Run one simulation of the preferred package and exit.
async fn run_headless(engine: &SimulationEngine, cfg: &AppConfig) -> Result<()> {
    let package = cfg.settings.preferred_package.clone();
    let operations = cfg.engine.headless_operations;
    info!(package = %package, operations, "Server disabled, running headless simulation");

    let entry = engine
        .run(&package, operations)
        .await
        .with_context(|| format!("Failed to simulate {package}"))?;
    log_run_summary(&entry);
    Ok(())
}

/// Log a human-readable run summary.
fn log_run_summary(entry: &HistoryEntry) {
    let run = entry.run();
    info!(
        id = %entry.id,
        package = %run.package_name,
        status = %run.status,
        succeeded = run.success_count,
        failed = run.failure_count,
        operations = run.operation_count,
        duration_secs = run.duration().map(|d| d.num_milliseconds() as f64 / 1000.0),
        "Run summary"
    );
}

/// Initialise the `tracing` subscriber.
fn init_logging(cfg: &AppConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.logging.filter));

    let json_logging = cfg.logging.json || std::env::var("PUBSIM_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
