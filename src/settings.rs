//! Simulation settings.
//!
//! `Settings` is the process-wide configuration the simulation loop reads
//! at every phase. Updates arrive as a `SettingsPatch` (every field
//! optional) and are validated before they replace the current values.
//!
//! `timeout_secs` and `retry_count` are stored and validated but the
//! simulation loop never consults them.

use serde::{Deserialize, Serialize};

use crate::types::SimError;

/// Inter-operation delay used when `default_delay_ms` is zero.
pub const FALLBACK_DELAY_MS: u64 = 500;

/// Mutable simulation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base delay between operations; also scales every phase delay
    /// (`jitter * default_delay_ms / 1000`).
    pub default_delay_ms: u64,
    /// Run the cache-clear sub-operation after every successful fetch.
    pub auto_clear_cache: bool,
    pub preferred_package: String,
    /// Advisory only.
    pub timeout_secs: u32,
    /// Advisory only. Failed operations are never retried.
    pub retry_count: u32,
    pub cache_location: String,
    pub max_cache_size_mb: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_delay_ms: 1000,
            auto_clear_cache: true,
            preferred_package: "http".to_string(),
            timeout_secs: 30,
            retry_count: 3,
            cache_location: "~/.pub-cache".to_string(),
            max_cache_size_mb: 1024,
        }
    }
}

impl Settings {
    /// Check every field against its accepted range.
    pub fn validate(&self) -> Result<(), SimError> {
        check_range("default_delay_ms", self.default_delay_ms, 100, 5000)?;
        check_range("timeout_secs", self.timeout_secs as u64, 5, 300)?;
        check_range("retry_count", self.retry_count as u64, 0, 10)?;
        check_range("max_cache_size_mb", self.max_cache_size_mb as u64, 100, 10240)?;
        if self.cache_location.trim().is_empty() {
            return Err(SimError::InvalidSetting {
                field: "cache_location",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Delay inserted between two consecutive operations.
    pub fn inter_operation_delay_ms(&self) -> u64 {
        if self.default_delay_ms == 0 {
            FALLBACK_DELAY_MS
        } else {
            self.default_delay_ms
        }
    }

    /// Scale a raw jitter value by the configured base delay.
    pub fn scale_delay_ms(&self, jitter_ms: u64) -> u64 {
        jitter_ms.saturating_mul(self.default_delay_ms) / 1000
    }

    /// Apply a partial update, returning the validated result without
    /// touching `self`.
    pub fn patched(&self, patch: &SettingsPatch) -> Result<Settings, SimError> {
        let mut next = self.clone();
        if let Some(v) = patch.default_delay_ms {
            next.default_delay_ms = v;
        }
        if let Some(v) = patch.auto_clear_cache {
            next.auto_clear_cache = v;
        }
        if let Some(v) = &patch.preferred_package {
            next.preferred_package = v.trim().to_string();
        }
        if let Some(v) = patch.timeout_secs {
            next.timeout_secs = v;
        }
        if let Some(v) = patch.retry_count {
            next.retry_count = v;
        }
        if let Some(v) = &patch.cache_location {
            next.cache_location = v.clone();
        }
        if let Some(v) = patch.max_cache_size_mb {
            next.max_cache_size_mb = v;
        }
        next.validate()?;
        Ok(next)
    }
}

fn check_range(field: &'static str, value: u64, min: u64, max: u64) -> Result<(), SimError> {
    if value < min || value > max {
        return Err(SimError::InvalidSetting {
            field,
            message: format!("{value} is outside {min}..={max}"),
        });
    }
    Ok(())
}

/// Partial settings update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsPatch {
    pub default_delay_ms: Option<u64>,
    pub auto_clear_cache: Option<bool>,
    pub preferred_package: Option<String>,
    pub timeout_secs: Option<u32>,
    pub retry_count: Option<u32>,
    pub cache_location: Option<String>,
    pub max_cache_size_mb: Option<u32>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
