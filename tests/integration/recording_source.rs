//! Recording random source for integration testing.
//!
//! Returns scripted rolls per check and records every draw, so tests can
//! assert which failure checks a run actually performed. State is shared
//! through `Arc` handles that stay with the test after the source has been
//! moved into the engine.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use pubsim::engine::random::{FailureCheck, RandomSource};

#[derive(Clone, Default)]
pub struct RecordingSource {
    scripted: Arc<Mutex<VecDeque<(FailureCheck, f64)>>>,
    rolls: Arc<Mutex<Vec<(FailureCheck, f64)>>>,
    jitters: Arc<Mutex<Vec<(u64, u64)>>>,
}

impl RecordingSource {
    /// Never fails unless a roll is scripted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a roll for the next draw of `check`.
    pub fn script(self, check: FailureCheck, roll: f64) -> Self {
        self.scripted.lock().unwrap().push_back((check, roll));
        self
    }

    /// Every roll drawn so far, in order.
    pub fn rolls(&self) -> Vec<(FailureCheck, f64)> {
        self.rolls.lock().unwrap().clone()
    }

    pub fn roll_count(&self, check: FailureCheck) -> usize {
        self.rolls.lock().unwrap().iter().filter(|(c, _)| *c == check).count()
    }

    /// Every jitter range requested so far.
    pub fn jitters(&self) -> Vec<(u64, u64)> {
        self.jitters.lock().unwrap().clone()
    }
}

impl RandomSource for RecordingSource {
    fn jitter_ms(&mut self, min: u64, max: u64) -> u64 {
        self.jitters.lock().unwrap().push((min, max));
        min
    }

    fn roll(&mut self, check: FailureCheck) -> f64 {
        let mut scripted = self.scripted.lock().unwrap();
        let roll = match scripted.iter().position(|(c, _)| *c == check) {
            Some(idx) => scripted.remove(idx).map(|(_, r)| r).unwrap_or(1.0),
            None => 1.0,
        };
        self.rolls.lock().unwrap().push((check, roll));
        roll
    }
}
