//! Run history.
//!
//! A bounded, most-recent-first archive of finished runs, plus filtering
//! and the aggregate metrics the dashboard charts.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use uuid::Uuid;

use crate::types::{HistoryEntry, RunStatus, SimError};

/// Maximum number of archived runs kept.
pub const HISTORY_CAPACITY: usize = 50;

/// Days covered by `HistoryMetrics::daily`.
const DAILY_WINDOW: i64 = 7;

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct History {
    entries: VecDeque<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the front, evicting the oldest entry past capacity.
    pub fn add_entry(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(HISTORY_CAPACITY);
    }

    pub fn get(&self, id: Uuid) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Entries, newest first.
    pub fn entries(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries matching `filter`, newest first.
    pub fn filter(&self, filter: &HistoryFilter, now: DateTime<Utc>) -> Vec<HistoryEntry> {
        self.entries
            .iter()
            .filter(|e| filter.matches(e, now))
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Filtering
// ---------------------------------------------------------------------------

/// Age window for history queries, in whole days since the run started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    #[default]
    All,
    Today,
    Week,
    Month,
}

impl DateRange {
    fn max_age_days(&self) -> Option<i64> {
        match self {
            DateRange::All => None,
            DateRange::Today => Some(0),
            DateRange::Week => Some(7),
            DateRange::Month => Some(30),
        }
    }
}

impl std::str::FromStr for DateRange {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" | "" => Ok(DateRange::All),
            "today" => Ok(DateRange::Today),
            "week" => Ok(DateRange::Week),
            "month" => Ok(DateRange::Month),
            other => Err(SimError::InvalidFilter(format!("unknown date range '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub status: Option<RunStatus>,
    pub package: Option<String>,
    pub range: DateRange,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &HistoryEntry, now: DateTime<Utc>) -> bool {
        if let Some(max_days) = self.range.max_age_days() {
            let age_days = (now - entry.run().started_at).num_days();
            if age_days > max_days {
                return false;
            }
        }
        if let Some(status) = self.status {
            if entry.status() != status {
                return false;
            }
        }
        if let Some(package) = &self.package {
            if entry.package_name() != package {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageStats {
    pub package_name: String,
    pub runs: usize,
    pub successes: u64,
    pub failures: u64,
    pub avg_duration_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyStats {
    pub date: NaiveDate,
    pub runs: usize,
    pub successes: u64,
    pub failures: u64,
    pub avg_duration_secs: f64,
}

/// Aggregates over a set of archived runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryMetrics {
    pub total_runs: usize,
    pub completed_runs: usize,
    pub failed_runs: usize,
    pub cancelled_runs: usize,
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    /// Percentage of operations that succeeded (0–100).
    pub success_rate: f64,
    pub avg_duration_secs: f64,
    pub packages: Vec<PackageStats>,
    /// Oldest day first, ending today.
    pub daily: Vec<DailyStats>,
}

#[derive(Default)]
struct Tally {
    runs: usize,
    successes: u64,
    failures: u64,
    duration_secs: f64,
}

impl Tally {
    fn add(&mut self, entry: &HistoryEntry) {
        let run = entry.run();
        self.runs += 1;
        self.successes += run.success_count as u64;
        self.failures += run.failure_count as u64;
        self.duration_secs += duration_secs(entry);
    }

    fn avg_duration(&self) -> f64 {
        if self.runs == 0 {
            0.0
        } else {
            self.duration_secs / self.runs as f64
        }
    }
}

fn duration_secs(entry: &HistoryEntry) -> f64 {
    entry
        .run()
        .duration()
        .map(|d| d.num_milliseconds() as f64 / 1000.0)
        .unwrap_or(0.0)
}

impl HistoryMetrics {
    pub fn compute<'a>(
        entries: impl IntoIterator<Item = &'a HistoryEntry>,
        now: DateTime<Utc>,
    ) -> Self {
        let mut total = Tally::default();
        let mut completed = 0;
        let mut failed = 0;
        let mut cancelled = 0;
        let mut per_package: BTreeMap<String, Tally> = BTreeMap::new();
        let mut per_day: BTreeMap<NaiveDate, Tally> = BTreeMap::new();

        let today = now.date_naive();
        let first_day = today - Duration::days(DAILY_WINDOW - 1);
        for offset in 0..DAILY_WINDOW {
            per_day.insert(first_day + Duration::days(offset), Tally::default());
        }

        for entry in entries {
            total.add(entry);
            match entry.status() {
                RunStatus::Completed => completed += 1,
                RunStatus::Failed => failed += 1,
                RunStatus::Cancelled => cancelled += 1,
                RunStatus::Running => {}
            }
            per_package
                .entry(entry.package_name().to_string())
                .or_default()
                .add(entry);
            if let Some(day) = per_day.get_mut(&entry.run().started_at.date_naive()) {
                day.add(entry);
            }
        }

        let total_operations = total.successes + total.failures;
        let success_rate = if total_operations > 0 {
            total.successes as f64 / total_operations as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_runs: total.runs,
            completed_runs: completed,
            failed_runs: failed,
            cancelled_runs: cancelled,
            total_operations,
            successful_operations: total.successes,
            failed_operations: total.failures,
            success_rate,
            avg_duration_secs: total.avg_duration(),
            packages: per_package
                .into_iter()
                .map(|(package_name, t)| PackageStats {
                    package_name,
                    runs: t.runs,
                    successes: t.successes,
                    failures: t.failures,
                    avg_duration_secs: t.avg_duration(),
                })
                .collect(),
            daily: per_day
                .into_iter()
                .map(|(date, t)| DailyStats {
                    date,
                    runs: t.runs,
                    successes: t.successes,
                    failures: t.failures,
                    avg_duration_secs: t.avg_duration(),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
