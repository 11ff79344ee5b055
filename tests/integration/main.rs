//! End-to-end tests for the simulator.
//!
//! Drives the public engine, store and router APIs with deterministic
//! random sources and tokio's paused clock, so multi-second runs finish
//! instantly.

mod recording_source;
mod simulation;
