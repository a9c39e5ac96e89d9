use posematch_stage::StageError;

use crate::transport::TransportError;

/// Errors surfaced by the client host and binary.
///
/// Telemetry delivery failures never show up here during play: the bus
/// re-queues and logs them. Only setup calls (session creation, media
/// upload) and stage failures reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Level stopped: {0}")]
    Stage(#[from] StageError),
}
