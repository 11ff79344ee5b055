//! Randomness used by the mock operations.
//!
//! All randomness flows through `RandomSource`, so tests and demos can
//! force the exact outcome of every failure check.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;

/// Which synthetic failure check a roll is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCheck {
    /// Download phase of a pub-get operation (fails below 0.10).
    Download,
    /// Cache-clear sub-operation (fails below 0.05).
    CacheClear,
}

impl FailureCheck {
    /// A roll strictly below this value fails.
    pub fn threshold(&self) -> f64 {
        match self {
            FailureCheck::Download => 0.10,
            FailureCheck::CacheClear => 0.05,
        }
    }

    pub fn fails(&self, roll: f64) -> bool {
        roll < self.threshold()
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait RandomSource: Send {
    /// Uniform integer in `[min, max]`, inclusive.
    fn jitter_ms(&mut self, min: u64, max: u64) -> u64;

    /// Uniform draw in `[0, 1)` for a failure check.
    fn roll(&mut self, check: FailureCheck) -> f64;
}

// ---------------------------------------------------------------------------
// rand-backed source
// ---------------------------------------------------------------------------

/// `RandomSource` over any `rand` generator.
pub struct RngSource<R> {
    rng: R,
}

impl<R: Rng + Send> RngSource<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl RngSource<StdRng> {
    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }
}

impl RngSource<ChaCha8Rng> {
    /// Reproducible sequence for a given seed.
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng + Send> RandomSource for RngSource<R> {
    fn jitter_ms(&mut self, min: u64, max: u64) -> u64 {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..=max)
    }

    fn roll(&mut self, _check: FailureCheck) -> f64 {
        self.rng.gen::<f64>()
    }
}

// ---------------------------------------------------------------------------
// Scripted source
// ---------------------------------------------------------------------------

/// Deterministic source: jitter is always the lower bound, rolls come from
/// per-check queues and fall back to a fixed value once a queue is empty.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    download: VecDeque<f64>,
    cache_clear: VecDeque<f64>,
    fallback: f64,
}

impl ScriptedSource {
    /// Every roll returns `fallback`. `1.0` never fails, `0.0` always does.
    pub fn constant(fallback: f64) -> Self {
        Self {
            download: VecDeque::new(),
            cache_clear: VecDeque::new(),
            fallback,
        }
    }

    pub fn never_fail() -> Self {
        Self::constant(1.0)
    }

    pub fn with_download_rolls(mut self, rolls: impl IntoIterator<Item = f64>) -> Self {
        self.download.extend(rolls);
        self
    }

    pub fn with_cache_clear_rolls(mut self, rolls: impl IntoIterator<Item = f64>) -> Self {
        self.cache_clear.extend(rolls);
        self
    }
}

impl RandomSource for ScriptedSource {
    fn jitter_ms(&mut self, min: u64, _max: u64) -> u64 {
        min
    }

    fn roll(&mut self, check: FailureCheck) -> f64 {
        let queue = match check {
            FailureCheck::Download => &mut self.download,
            FailureCheck::CacheClear => &mut self.cache_clear,
        };
        queue.pop_front().unwrap_or(self.fallback)
    }
}
