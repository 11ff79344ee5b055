//! Mock package operations.
//!
//! A pub-get operation walks through three delayed phases (check, download,
//! resolve). The download phase can fail; on success the optional
//! cache-clear sub-operation runs. Settings are re-read at every phase.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use super::random::{FailureCheck, RandomSource};
use crate::store::SimulationStore;
use crate::types::{LogEntry, LogStatus, SimError};

const CHECK_JITTER_MS: (u64, u64) = (300, 800);
const DOWNLOAD_JITTER_MS: (u64, u64) = (1000, 2500);
const RESOLVE_JITTER_MS: (u64, u64) = (500, 1200);
const CACHE_CLEAR_JITTER_MS: (u64, u64) = (200, 600);

/// Synthetic, recoverable failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationFailure {
    #[error("Failed to download {package}: Network timeout")]
    NetworkTimeout { package: String },

    #[error("Failed to clear cache for {package}: Permission denied")]
    PermissionDenied { package: String },
}

/// How a single pub-get operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationOutcome {
    Succeeded,
    Failed(OperationFailure),
}

/// One pub-get operation, numbered from 1 within its run.
pub struct MockOperation<'a> {
    store: &'a SimulationStore,
    random: &'a Mutex<Box<dyn RandomSource>>,
    package: &'a str,
    number: u32,
}

impl<'a> MockOperation<'a> {
    pub fn new(
        store: &'a SimulationStore,
        random: &'a Mutex<Box<dyn RandomSource>>,
        package: &'a str,
        number: u32,
    ) -> Self {
        Self { store, random, package, number }
    }

    /// Run every phase and record exactly one success or failure.
    ///
    /// Synthetic failures are part of the `Ok` outcome. `Err` is reserved
    /// for state-container invariant violations, which abort the run.
    pub async fn run(self) -> Result<OperationOutcome, SimError> {
        let label = format!("PUB_GET_{}", self.number);
        let started = Instant::now();

        match self.fetch(&label).await {
            Ok(()) => {
                self.log(&label, LogStatus::Success, format!("✓ Successfully downloaded {}", self.package), Some(started))
                    .await;
                self.store.record_success().await?;
                debug!(package = self.package, operation = self.number, "Operation succeeded");

                if self.store.settings().await.auto_clear_cache {
                    self.clear_cache().await;
                }
                Ok(OperationOutcome::Succeeded)
            }
            Err(failure) => {
                self.log(&label, LogStatus::Error, format!("✗ {failure}"), Some(started))
                    .await;
                self.store.record_failure().await?;
                warn!(package = self.package, operation = self.number, error = %failure, "Operation failed");
                Ok(OperationOutcome::Failed(failure))
            }
        }
    }

    async fn fetch(&self, label: &str) -> Result<(), OperationFailure> {
        self.phase(label, format!("Checking dependencies for {}...", self.package), CHECK_JITTER_MS)
            .await;

        self.phase(label, format!("Downloading {} package...", self.package), DOWNLOAD_JITTER_MS)
            .await;
        if self.fails(FailureCheck::Download).await {
            return Err(OperationFailure::NetworkTimeout {
                package: self.package.to_string(),
            });
        }

        self.phase(label, format!("Resolving dependencies for {}...", self.package), RESOLVE_JITTER_MS)
            .await;
        Ok(())
    }

    /// Cache-clear sub-operation. Its failure only produces a log line.
    async fn clear_cache(&self) {
        let label = format!("CACHE_CLEAR_{}", self.number);
        let started = Instant::now();

        self.phase(&label, format!("Clearing cache for {}...", self.package), CACHE_CLEAR_JITTER_MS)
            .await;

        if self.fails(FailureCheck::CacheClear).await {
            let failure = OperationFailure::PermissionDenied {
                package: self.package.to_string(),
            };
            warn!(package = self.package, operation = self.number, error = %failure, "Cache clear failed");
            self.log(&label, LogStatus::Error, format!("✗ Cache clear failed: {failure}"), Some(started))
                .await;
        } else {
            self.log(&label, LogStatus::Success, format!("✓ Cache cleared for {}", self.package), Some(started))
                .await;
        }
    }

    /// Log a running entry, then sleep a jittered delay scaled by the
    /// current base delay.
    async fn phase(&self, label: &str, message: String, (min, max): (u64, u64)) {
        self.log(label, LogStatus::Running, message, None).await;
        let settings = self.store.settings().await;
        let jitter = self.random.lock().await.jitter_ms(min, max);
        sleep(Duration::from_millis(settings.scale_delay_ms(jitter))).await;
    }

    async fn fails(&self, check: FailureCheck) -> bool {
        let roll = self.random.lock().await.roll(check);
        check.fails(roll)
    }

    async fn log(&self, label: &str, status: LogStatus, message: String, started: Option<Instant>) {
        let mut entry = LogEntry::new(label, status, message).with_package(self.package);
        if let Some(started) = started {
            entry = entry.with_duration(started.elapsed().as_millis() as u64);
        }
        self.store.add_log(entry).await;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
