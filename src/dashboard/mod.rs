//! Dashboard — Axum web server for live simulation monitoring.
//!
//! Serves a REST API, a Server-Sent Events stream, and a self-contained
//! HTML dashboard. CORS enabled for local development.

pub mod routes;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    response::Html,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

pub use routes::{AppState, DashboardState};

/// The embedded dashboard HTML (compiled into the binary).
const DASHBOARD_HTML: &str = include_str!("templates/index.html");

/// Bind the dashboard and serve it on a background task until `shutdown`
/// resolves. Returns the bound address (useful when `port` is 0).
pub async fn spawn_dashboard(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind dashboard to {addr}"))?;
    let local = listener.local_addr().context("Failed to read dashboard address")?;
    info!(%local, "Dashboard server starting on http://localhost:{}", local.port());

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(error = %e, "Dashboard server error");
        }
    });

    Ok((local, handle))
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        // Simulation control
        .route("/api/status", get(routes::get_status))
        .route("/api/logs", get(routes::get_logs))
        .route("/api/simulation/start", post(routes::start_simulation))
        .route("/api/simulation/stop", post(routes::stop_simulation))
        .route("/api/simulation/reset", post(routes::reset_simulation))
        .route("/api/events", get(routes::events))
        // Settings
        .route("/api/settings", get(routes::get_settings).put(routes::update_settings))
        // History
        .route("/api/history", get(routes::get_history).delete(routes::clear_history))
        .route("/api/history/:id", get(routes::get_history_entry))
        .route("/api/metrics", get(routes::get_metrics))
        // Package catalog
        .route("/api/packages", get(routes::get_packages))
        .route("/api/packages/categories", get(routes::get_categories))
        .route("/api/packages/popular", get(routes::get_popular_packages))
        .route("/api/packages/:name", get(routes::get_package))
        .route("/health", get(routes::health))
        // Dashboard HTML
        .route("/", get(serve_dashboard))
        .layer(cors)
        .with_state(state)
}

/// Serve the embedded HTML dashboard.
async fn serve_dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
