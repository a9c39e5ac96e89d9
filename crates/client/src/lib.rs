//! `posematch-client` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod config;
pub mod error;
pub mod host;
pub mod pose_source;
pub mod telemetry;
pub mod transport;
