//! Shared types for the PUBSIM simulator.
//!
//! These types form the data model used across all modules: log
//! entries, live runs, archived history entries, and the domain error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Smallest operation count a run accepts.
pub const MIN_OPERATIONS: u32 = 1;

/// Largest operation count a run accepts.
pub const MAX_OPERATIONS: u32 = 50;

// ---------------------------------------------------------------------------
// Log entries
// ---------------------------------------------------------------------------

/// Status attached to a single log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStatus {
    Pending,
    Running,
    Success,
    Error,
}

impl fmt::Display for LogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogStatus::Pending => write!(f, "pending"),
            LogStatus::Running => write!(f, "running"),
            LogStatus::Success => write!(f, "success"),
            LogStatus::Error => write!(f, "error"),
        }
    }
}

/// One line of the simulation log. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    /// RFC 3339 timestamp of when the entry was appended.
    pub timestamp: String,
    /// Operation label, e.g. `INIT`, `PUB_GET_3`, `CACHE_CLEAR_3`.
    pub operation: String,
    pub status: LogStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_name: Option<String>,
    /// Wall time of the mock operation, set on its terminal entry only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl LogEntry {
    pub fn new(operation: impl Into<String>, status: LogStatus, message: impl Into<String>) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            id: id[..9].to_string(),
            timestamp: Utc::now().to_rfc3339(),
            operation: operation.into(),
            status,
            message: message.into(),
            package_name: None,
            duration_ms: None,
        }
    }

    pub fn with_package(mut self, package_name: &str) -> Self {
        self.package_name = Some(package_name.to_string());
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} ({}): {}", self.timestamp, self.operation, self.status, self.message)
    }
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// Lifecycle status of a simulation run.
///
/// `Running` is the only non-terminal state; the other three are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" | "canceled" => Ok(RunStatus::Cancelled),
            other => Err(SimError::InvalidFilter(format!("unknown run status '{other}'"))),
        }
    }
}

/// A simulation run. Mutated by the simulation loop while `Running`,
/// frozen once it reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub package_name: String,
    pub operation_count: u32,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub success_count: u32,
    pub failure_count: u32,
    pub logs: Vec<LogEntry>,
}

impl SimulationRun {
    pub fn new(package_name: &str, operation_count: u32) -> Self {
        Self {
            package_name: package_name.to_string(),
            operation_count,
            started_at: Utc::now(),
            completed_at: None,
            status: RunStatus::Running,
            success_count: 0,
            failure_count: 0,
            logs: Vec::new(),
        }
    }

    /// Operations that have produced an outcome so far.
    pub fn finished_operations(&self) -> u32 {
        self.success_count + self.failure_count
    }

    /// Run duration; `None` while the run is still going.
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|end| end - self.started_at)
    }
}

impl fmt::Display for SimulationRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x{} | {} | ok={} failed={} | logs={}",
            self.package_name,
            self.operation_count,
            self.status,
            self.success_count,
            self.failure_count,
            self.logs.len(),
        )
    }
}

/// An archived, immutable copy of a terminated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    #[serde(flatten)]
    run: SimulationRun,
}

impl HistoryEntry {
    /// Archive a terminated run. The log sequence is deep-copied, so later
    /// changes to the live run never reach the archived entry.
    pub fn archive(run: &SimulationRun) -> Self {
        Self {
            id: Uuid::new_v4(),
            run: run.clone(),
        }
    }

    pub fn run(&self) -> &SimulationRun {
        &self.run
    }

    pub fn package_name(&self) -> &str {
        &self.run.package_name
    }

    pub fn status(&self) -> RunStatus {
        self.run.status
    }

    pub fn logs(&self) -> &[LogEntry] {
        &self.run.logs
    }
}

impl fmt::Display for HistoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.run)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for PUBSIM.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("Operation count must be between 1 and 50, got {0}")]
    InvalidOperationCount(u32),

    #[error("A simulation is already running")]
    AlreadyRunning,

    #[error("Invalid setting {field}: {message}")]
    InvalidSetting { field: &'static str, message: String },

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Counter overflow: {finished} outcomes recorded for {operation_count} operations")]
    CounterOverflow { finished: u32, operation_count: u32 },

    #[error("No active run")]
    NoActiveRun,

    #[error("{0}")]
    Fatal(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
