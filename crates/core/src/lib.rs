//! Shared domain types for pose-match play telemetry.
//!
//! Used by the stage machine, the client telemetry bus, the store and the
//! ingestion API so the wire format is defined exactly once.

pub mod error;
pub mod keys;
pub mod play;
pub mod pose;
pub mod range;
pub mod roles;
pub mod telemetry;
pub mod types;
