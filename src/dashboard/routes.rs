//! Dashboard API route handlers.
//!
//! All endpoints return JSON except `/api/events` (Server-Sent Events).
//! State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{self, Package};
use crate::engine::SimulationEngine;
use crate::settings::{Settings, SettingsPatch};
use crate::store::history::{DateRange, HistoryFilter, HistoryMetrics};
use crate::store::SimulationStore;
use crate::types::{HistoryEntry, LogEntry, RunStatus, SimError};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub engine: SimulationEngine,
}

impl DashboardState {
    pub fn new(engine: SimulationEngine) -> Self {
        Self { engine }
    }

    pub fn store(&self) -> &SimulationStore {
        self.engine.store()
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// JSON error response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }
}

impl From<SimError> for ApiError {
    fn from(err: SimError) -> Self {
        let status = match err {
            SimError::InvalidOperationCount(_)
            | SimError::InvalidSetting { .. }
            | SimError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            SimError::AlreadyRunning => StatusCode::CONFLICT,
            SimError::NoActiveRun => StatusCode::NOT_FOUND,
            SimError::CounterOverflow { .. } | SimError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub is_running: bool,
    pub progress: f64,
    pub current_operation: String,
    pub completed_operations: u32,
    pub run_status: Option<RunStatus>,
    pub package_name: Option<String>,
    pub operation_count: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub started_at: Option<String>,
    pub elapsed_secs: f64,
    pub operations_per_sec: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub package_name: String,
    pub operation_count: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StopResponse {
    pub stopped: bool,
}

/// Query string for history and metrics endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HistoryQuery {
    pub status: Option<String>,
    pub package: Option<String>,
    pub range: Option<String>,
}

impl HistoryQuery {
    fn to_filter(&self) -> Result<HistoryFilter, SimError> {
        let status = match self.status.as_deref() {
            None | Some("") | Some("all") => None,
            Some(s) => Some(s.parse::<RunStatus>()?),
        };
        let package = match self.package.as_deref() {
            None | Some("") | Some("all") => None,
            Some(p) => Some(p.to_string()),
        };
        let range = match self.range.as_deref() {
            None => DateRange::All,
            Some(r) => r.parse()?,
        };
        Ok(HistoryFilter { status, package, range })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PackageQuery {
    pub category: Option<String>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let status = state.store().status().await;
    let run = status.run.as_ref();

    let elapsed_secs = run
        .map(|r| {
            let end = r.completed_at.unwrap_or_else(chrono::Utc::now);
            (end - r.started_at).num_milliseconds() as f64 / 1000.0
        })
        .unwrap_or(0.0);
    let finished = run.map(|r| r.finished_operations()).unwrap_or(0);
    let operations_per_sec = if elapsed_secs > 0.0 {
        finished as f64 / elapsed_secs
    } else {
        0.0
    };

    Json(StatusResponse {
        is_running: status.is_running,
        progress: status.progress,
        current_operation: status.current_operation.clone(),
        completed_operations: status.completed_operations,
        run_status: run.map(|r| r.status),
        package_name: run.map(|r| r.package_name.clone()),
        operation_count: run.map(|r| r.operation_count).unwrap_or(0),
        success_count: run.map(|r| r.success_count).unwrap_or(0),
        failure_count: run.map(|r| r.failure_count).unwrap_or(0),
        started_at: run.map(|r| r.started_at.to_rfc3339()),
        elapsed_secs,
        operations_per_sec,
    })
}

/// GET /api/logs
pub async fn get_logs(State(state): State<AppState>) -> Json<Vec<LogEntry>> {
    Json(state.store().logs().await)
}

/// POST /api/simulation/start
pub async fn start_simulation(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<(StatusCode, Json<StatusResponse>), ApiError> {
    let package_name = req.package_name.trim();
    if package_name.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "package_name must not be empty"));
    }

    state.engine.start(package_name, req.operation_count).await?;
    info!(package = package_name, operations = req.operation_count, "Simulation started from dashboard");

    let Json(status) = get_status(State(state)).await;
    Ok((StatusCode::ACCEPTED, Json(status)))
}

/// POST /api/simulation/stop
pub async fn stop_simulation(State(state): State<AppState>) -> Json<StopResponse> {
    let stopped = state.engine.stop().await;
    Json(StopResponse { stopped })
}

/// POST /api/simulation/reset
///
/// Clears the live run and logs. 409 while a run is still active.
pub async fn reset_simulation(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store().reset().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.store().settings().await)
}

/// PUT /api/settings
pub async fn update_settings(
    State(state): State<AppState>,
    Json(patch): Json<SettingsPatch>,
) -> Result<Json<Settings>, ApiError> {
    Ok(Json(state.store().update_settings(&patch).await?))
}

/// GET /api/history
pub async fn get_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let filter = query.to_filter()?;
    Ok(Json(state.store().filter_history(&filter).await))
}

/// GET /api/history/:id
pub async fn get_history_entry(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<HistoryEntry>, ApiError> {
    state
        .store()
        .history_entry(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("No history entry {id}")))
}

/// DELETE /api/history
pub async fn clear_history(State(state): State<AppState>) -> StatusCode {
    state.store().clear_history().await;
    StatusCode::NO_CONTENT
}

/// GET /api/metrics
pub async fn get_metrics(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<HistoryMetrics>, ApiError> {
    let filter = query.to_filter()?;
    Ok(Json(state.store().history_metrics(&filter).await))
}

/// GET /api/packages
pub async fn get_packages(Query(query): Query<PackageQuery>) -> Json<Vec<Package>> {
    let packages = match query.category.as_deref() {
        Some(category) => catalog::by_category(category).into_iter().cloned().collect(),
        None => catalog::all().to_vec(),
    };
    Json(packages)
}

/// GET /api/packages/categories
pub async fn get_categories() -> Json<Vec<&'static str>> {
    Json(catalog::categories())
}

/// GET /api/packages/popular
pub async fn get_popular_packages() -> Json<Vec<Package>> {
    Json(catalog::popular().into_iter().cloned().collect())
}

/// GET /api/packages/:name
///
/// Unknown names get the custom-package placeholder rather than a 404.
pub async fn get_package(Path(name): Path<String>) -> Json<Package> {
    Json(catalog::lookup(&name))
}

/// GET /api/events
pub async fn events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.store().subscribe();
    debug!("Event stream subscriber connected");

    let stream = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let sse = Event::default()
                        .json_data(&event)
                        .unwrap_or_else(|_| Event::default().comment("unserialisable event"));
                    return Some((Ok(sse), rx));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event stream subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
