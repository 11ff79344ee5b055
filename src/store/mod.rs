//! Observable state container.
//!
//! Holds the live simulation status, the process-wide settings, and the
//! run history. Every mutation publishes a `StoreEvent` on a broadcast
//! channel so the dashboard can push updates to connected browsers.
//!
//! The running flag is an `AtomicBool` so the simulation loop can poll it
//! without taking a lock; everything else sits behind `tokio::sync::RwLock`
//! and is never held across a suspension point.

pub mod history;

use chrono::Utc;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::settings::{Settings, SettingsPatch};
use crate::types::{HistoryEntry, LogEntry, LogStatus, RunStatus, SimError, SimulationRun};
use history::{History, HistoryFilter, HistoryMetrics};

/// Buffered events per subscriber before slow receivers start lagging.
const EVENT_BUFFER: usize = 256;

// ---------------------------------------------------------------------------
// Observable state
// ---------------------------------------------------------------------------

/// Live status read by the dashboard.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimulationStatus {
    pub is_running: bool,
    /// Percentage, 0–100.
    pub progress: f64,
    pub current_operation: String,
    pub completed_operations: u32,
    /// The current (or most recently finished) run. `None` while idle.
    pub run: Option<SimulationRun>,
}

/// Change notifications published to observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreEvent {
    RunStarted { package_name: String, operation_count: u32 },
    Progress { progress: f64, completed_operations: u32, current_operation: String },
    LogAppended { entry: LogEntry },
    Counters { success_count: u32, failure_count: u32 },
    RunFinished { entry: HistoryEntry },
    SettingsChanged { settings: Settings },
    HistoryCleared,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct SimulationStore {
    running: AtomicBool,
    status: RwLock<SimulationStatus>,
    settings: RwLock<Settings>,
    history: RwLock<History>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for SimulationStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

impl SimulationStore {
    pub fn new(settings: Settings) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            running: AtomicBool::new(false),
            status: RwLock::new(SimulationStatus::default()),
            settings: RwLock::new(settings),
            history: RwLock::new(History::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: StoreEvent) {
        // No receivers is the normal case when nobody has the dashboard open.
        let _ = self.events.send(event);
    }

    // -- Running flag ----------------------------------------------------

    /// The cooperative cancellation flag polled by the simulation loop.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // -- Status ----------------------------------------------------------

    pub async fn status(&self) -> SimulationStatus {
        self.status.read().await.clone()
    }

    pub async fn logs(&self) -> Vec<LogEntry> {
        self.status
            .read()
            .await
            .run
            .as_ref()
            .map(|r| r.logs.clone())
            .unwrap_or_default()
    }

    /// Status of the current run; `None` while idle.
    pub async fn run_status(&self) -> Option<RunStatus> {
        self.status.read().await.run.as_ref().map(|r| r.status)
    }

    /// Reset transient state and begin a new run.
    ///
    /// Rejected while a previous run has not reached a terminal status,
    /// which includes a stopped run still draining its in-flight operation.
    pub async fn begin_run(&self, package_name: &str, operation_count: u32) -> Result<(), SimError> {
        let entry = {
            let mut status = self.status.write().await;
            if status.run.as_ref().is_some_and(|r| r.status == RunStatus::Running) {
                return Err(SimError::AlreadyRunning);
            }

            let mut run = SimulationRun::new(package_name, operation_count);
            let entry = LogEntry::new(
                "INIT",
                LogStatus::Success,
                format!("Starting simulation for package '{package_name}' with {operation_count} operations"),
            )
            .with_package(package_name);
            run.logs.push(entry.clone());

            *status = SimulationStatus {
                is_running: true,
                progress: 0.0,
                current_operation: String::new(),
                completed_operations: 0,
                run: Some(run),
            };
            self.running.store(true, Ordering::SeqCst);
            entry
        };

        info!(package = package_name, operations = operation_count, "Run started");
        self.publish(StoreEvent::RunStarted {
            package_name: package_name.to_string(),
            operation_count,
        });
        self.publish(StoreEvent::LogAppended { entry });
        Ok(())
    }

    pub async fn update_progress(&self, completed: u32, total: u32) {
        let event = {
            let mut status = self.status.write().await;
            status.completed_operations = completed;
            status.progress = if total > 0 {
                completed as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            progress_event(&status)
        };
        self.publish(event);
    }

    pub async fn set_current_operation(&self, label: &str) {
        let event = {
            let mut status = self.status.write().await;
            status.current_operation = label.to_string();
            progress_event(&status)
        };
        self.publish(event);
    }

    /// Append to the live log. Entries appended while idle are dropped.
    pub async fn add_log(&self, entry: LogEntry) {
        {
            let mut status = self.status.write().await;
            match status.run.as_mut() {
                Some(run) if !run.status.is_terminal() => run.logs.push(entry.clone()),
                _ => {
                    debug!(operation = %entry.operation, "Log entry dropped: no active run");
                    return;
                }
            }
        }
        debug!(operation = %entry.operation, status = %entry.status, message = %entry.message, "Log");
        self.publish(StoreEvent::LogAppended { entry });
    }

    pub async fn record_success(&self) -> Result<(), SimError> {
        self.record_outcome(true).await
    }

    pub async fn record_failure(&self) -> Result<(), SimError> {
        self.record_outcome(false).await
    }

    async fn record_outcome(&self, success: bool) -> Result<(), SimError> {
        let event = {
            let mut status = self.status.write().await;
            let run = status.run.as_mut().ok_or(SimError::NoActiveRun)?;
            if run.finished_operations() >= run.operation_count {
                return Err(SimError::CounterOverflow {
                    finished: run.finished_operations() + 1,
                    operation_count: run.operation_count,
                });
            }
            if success {
                run.success_count += 1;
            } else {
                run.failure_count += 1;
            }
            StoreEvent::Counters {
                success_count: run.success_count,
                failure_count: run.failure_count,
            }
        };
        self.publish(event);
        Ok(())
    }

    /// Counters of the current run as `(success, failure)`.
    pub async fn counters(&self) -> (u32, u32) {
        self.status
            .read()
            .await
            .run
            .as_ref()
            .map(|r| (r.success_count, r.failure_count))
            .unwrap_or((0, 0))
    }

    /// Clear the running flag. Returns false if nothing was running.
    pub async fn request_stop(&self) -> bool {
        if !self.running.swap(false, Ordering::SeqCst) {
            return false;
        }
        {
            let mut status = self.status.write().await;
            status.is_running = false;
            status.current_operation = "Stopped".to_string();
        }
        info!("Stop requested");
        self.add_log(LogEntry::new("STOP", LogStatus::Error, "Simulation stopped by user"))
            .await;
        true
    }

    /// Move the current run into `final_status` and archive a snapshot.
    pub async fn finish_run(&self, final_status: RunStatus) -> Result<HistoryEntry, SimError> {
        if !final_status.is_terminal() {
            return Err(SimError::Fatal(format!("cannot finish a run as {final_status}")));
        }
        let entry = {
            let mut status = self.status.write().await;
            self.running.store(false, Ordering::SeqCst);
            status.is_running = false;
            let run = status.run.as_mut().ok_or(SimError::NoActiveRun)?;
            if run.status.is_terminal() {
                return Err(SimError::Fatal(format!("run already {}", run.status)));
            }
            run.status = final_status;
            run.completed_at = Some(Utc::now());
            HistoryEntry::archive(run)
        };

        self.history.write().await.add_entry(entry.clone());
        info!(
            id = %entry.id,
            package = entry.package_name(),
            status = %entry.status(),
            succeeded = entry.run().success_count,
            failed = entry.run().failure_count,
            "Run archived"
        );
        self.publish(StoreEvent::RunFinished { entry: entry.clone() });
        Ok(entry)
    }

    /// Back to idle. Refused while a run is active.
    pub async fn reset(&self) -> Result<(), SimError> {
        let mut status = self.status.write().await;
        if status.run.as_ref().is_some_and(|r| r.status == RunStatus::Running) {
            return Err(SimError::AlreadyRunning);
        }
        *status = SimulationStatus::default();
        Ok(())
    }

    // -- Settings --------------------------------------------------------

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub async fn update_settings(&self, patch: &SettingsPatch) -> Result<Settings, SimError> {
        let updated = {
            let mut settings = self.settings.write().await;
            let next = settings.patched(patch)?;
            *settings = next.clone();
            next
        };
        info!(
            delay_ms = updated.default_delay_ms,
            auto_clear_cache = updated.auto_clear_cache,
            "Settings updated"
        );
        self.publish(StoreEvent::SettingsChanged { settings: updated.clone() });
        Ok(updated)
    }

    /// Replace the settings without range validation. Used at startup and
    /// by tests that need delays outside the user-facing bounds.
    pub async fn replace_settings(&self, settings: Settings) {
        *self.settings.write().await = settings.clone();
        self.publish(StoreEvent::SettingsChanged { settings });
    }

    // -- History ---------------------------------------------------------

    /// Archived runs, newest first.
    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.history.read().await.entries().cloned().collect()
    }

    pub async fn history_entry(&self, id: Uuid) -> Option<HistoryEntry> {
        self.history.read().await.get(id).cloned()
    }

    pub async fn filter_history(&self, filter: &HistoryFilter) -> Vec<HistoryEntry> {
        self.history.read().await.filter(filter, Utc::now())
    }

    pub async fn history_metrics(&self, filter: &HistoryFilter) -> HistoryMetrics {
        let now = Utc::now();
        let entries = self.history.read().await.filter(filter, now);
        HistoryMetrics::compute(&entries, now)
    }

    pub async fn clear_history(&self) {
        self.history.write().await.clear();
        info!("History cleared");
        self.publish(StoreEvent::HistoryCleared);
    }
}

fn progress_event(status: &SimulationStatus) -> StoreEvent {
    StoreEvent::Progress {
        progress: status.progress,
        completed_operations: status.completed_operations,
        current_operation: status.current_operation.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
