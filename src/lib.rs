//! PUBSIM — Flutter package-operation simulator
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod settings;
pub mod catalog;
pub mod store;
pub mod engine;
pub mod dashboard;
