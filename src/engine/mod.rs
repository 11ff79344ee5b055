//! Simulation engine — the run loop.
//!
//! A run executes `operation_count` mock pub-get operations one after the
//! other on a spawned tokio task, writing progress and logs into the store,
//! then archives the result. Cancellation is cooperative: `stop()` clears
//! the running flag and the loop notices at the next iteration boundary,
//! after the in-flight operation has finished its phases.

pub mod operation;
pub mod random;

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::store::SimulationStore;
use crate::types::{
    HistoryEntry, LogEntry, LogStatus, RunStatus, SimError, SimulationRun, MAX_OPERATIONS,
    MIN_OPERATIONS,
};
use operation::MockOperation;
use random::RandomSource;

/// Handle to the simulation engine. Cheap to clone.
#[derive(Clone)]
pub struct SimulationEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    store: Arc<SimulationStore>,
    random: Mutex<Box<dyn RandomSource>>,
    task: Mutex<Option<JoinHandle<HistoryEntry>>>,
}

impl SimulationEngine {
    pub fn new(store: Arc<SimulationStore>, random: impl RandomSource + 'static) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                random: Mutex::new(Box::new(random)),
                task: Mutex::new(None),
            }),
        }
    }

    pub fn store(&self) -> &Arc<SimulationStore> {
        &self.inner.store
    }

    /// Begin a run on a background task.
    ///
    /// The package name is not validated here. Errors are only returned for
    /// an out-of-range operation count or while another run is active;
    /// anything that goes wrong once the run is underway ends up in the log
    /// and the run's terminal status instead.
    pub async fn start(&self, package_name: &str, operation_count: u32) -> Result<(), SimError> {
        if !(MIN_OPERATIONS..=MAX_OPERATIONS).contains(&operation_count) {
            return Err(SimError::InvalidOperationCount(operation_count));
        }

        let mut task = self.inner.task.lock().await;
        self.inner.store.begin_run(package_name, operation_count).await?;

        let inner = Arc::clone(&self.inner);
        let package = package_name.to_string();
        *task = Some(tokio::spawn(async move {
            inner.drive(&package, operation_count).await
        }));
        Ok(())
    }

    /// Request cooperative cancellation. Returns false if nothing was running.
    pub async fn stop(&self) -> bool {
        self.inner.store.request_stop().await
    }

    /// Wait for the active run task and return its archived entry.
    ///
    /// `None` if no run was started since the last wait, or if the task
    /// was aborted before archiving.
    pub async fn wait(&self) -> Option<HistoryEntry> {
        let handle = self.inner.task.lock().await.take()?;
        match handle.await {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!(error = %e, "Simulation task did not complete");
                None
            }
        }
    }

    /// Start a run and wait for it to finish.
    pub async fn run(&self, package_name: &str, operation_count: u32) -> Result<HistoryEntry, SimError> {
        self.start(package_name, operation_count).await?;
        self.wait()
            .await
            .ok_or_else(|| SimError::Fatal("simulation task aborted".to_string()))
    }
}

impl EngineInner {
    /// Run the loop to a terminal status and archive it. Errors and panics
    /// escaping the loop become an ERROR entry and a `failed` run.
    async fn drive(&self, package: &str, operation_count: u32) -> HistoryEntry {
        let result = AssertUnwindSafe(self.run_operations(package, operation_count))
            .catch_unwind()
            .await;

        let final_status = match result {
            Ok(Ok(true)) => RunStatus::Completed,
            Ok(Ok(false)) => {
                info!(package, "Run cancelled");
                RunStatus::Cancelled
            }
            Ok(Err(e)) => self.fail(package, &e.to_string()).await,
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown error".to_string());
                self.fail(package, &reason).await
            }
        };

        match self.store.finish_run(final_status).await {
            Ok(entry) => entry,
            Err(e) => {
                // Only reachable if the live run was replaced underneath us.
                error!(error = %e, "Failed to archive run");
                let status = self.store.status().await;
                let mut run = status
                    .run
                    .unwrap_or_else(|| SimulationRun::new(package, operation_count));
                run.status = final_status;
                HistoryEntry::archive(&run)
            }
        }
    }

    async fn fail(&self, package: &str, reason: &str) -> RunStatus {
        error!(package, error = reason, "Simulation failed");
        self.store
            .add_log(LogEntry::new("ERROR", LogStatus::Error, format!("Simulation failed: {reason}")))
            .await;
        RunStatus::Failed
    }

    /// Returns `Ok(true)` when every operation ran, `Ok(false)` when the
    /// running flag was cleared part-way.
    async fn run_operations(&self, package: &str, operation_count: u32) -> Result<bool, SimError> {
        for i in 0..operation_count {
            if !self.store.is_running() {
                return Ok(false);
            }

            self.store.update_progress(i, operation_count).await;
            self.store
                .set_current_operation(&format!("Operation {}/{}", i + 1, operation_count))
                .await;

            MockOperation::new(&self.store, &self.random, package, i + 1)
                .run()
                .await?;

            if self.store.is_running() && i < operation_count - 1 {
                let delay_ms = self.store.settings().await.inter_operation_delay_ms();
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }

        if !self.store.is_running() {
            return Ok(false);
        }

        self.store.update_progress(operation_count, operation_count).await;
        self.store.set_current_operation("Completed").await;
        let (succeeded, failed) = self.store.counters().await;
        if succeeded + failed != operation_count {
            warn!(succeeded, failed, operation_count, "Outcome tally does not match operation count");
        }
        self.store
            .add_log(LogEntry::new(
                "COMPLETE",
                LogStatus::Success,
                format!(
                    "Simulation completed successfully. {succeeded} successful, {failed} failed operations."
                ),
            ))
            .await;
        info!(package, succeeded, failed, "Run completed");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
