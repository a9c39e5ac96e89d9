use std::time::Duration;

/// Default number of buffered events that triggers an automatic flush.
pub const DEFAULT_MAX_EVENTS: usize = 50;

/// Default number of buffered frames that triggers an automatic flush.
pub const DEFAULT_MAX_FRAMES: usize = 120;

/// Default period of the auto-flush timer in milliseconds.
pub const DEFAULT_FLUSH_EVERY_MS: u64 = 5_000;

/// Default per-request timeout for telemetry POSTs in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Batching parameters of a [`TelemetryBus`](crate::telemetry::TelemetryBus).
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub max_events: usize,
    pub max_frames: usize,
    pub flush_every: Duration,
    pub request_timeout: Duration,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            max_events: DEFAULT_MAX_EVENTS,
            max_frames: DEFAULT_MAX_FRAMES,
            flush_every: Duration::from_millis(DEFAULT_FLUSH_EVERY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl TelemetryConfig {
    /// Load batching parameters from environment variables with defaults.
    ///
    /// | Env Var                          | Default |
    /// |----------------------------------|---------|
    /// | `TELEMETRY_MAX_EVENTS`           | `50`    |
    /// | `TELEMETRY_MAX_FRAMES`           | `120`   |
    /// | `TELEMETRY_FLUSH_EVERY_MS`       | `5000`  |
    /// | `TELEMETRY_REQUEST_TIMEOUT_SECS` | `10`    |
    pub fn from_env() -> Self {
        let max_events: usize = std::env::var("TELEMETRY_MAX_EVENTS")
            .unwrap_or_else(|_| DEFAULT_MAX_EVENTS.to_string())
            .parse()
            .expect("TELEMETRY_MAX_EVENTS must be a valid usize");

        let max_frames: usize = std::env::var("TELEMETRY_MAX_FRAMES")
            .unwrap_or_else(|_| DEFAULT_MAX_FRAMES.to_string())
            .parse()
            .expect("TELEMETRY_MAX_FRAMES must be a valid usize");

        let flush_every_ms: u64 = std::env::var("TELEMETRY_FLUSH_EVERY_MS")
            .unwrap_or_else(|_| DEFAULT_FLUSH_EVERY_MS.to_string())
            .parse()
            .expect("TELEMETRY_FLUSH_EVERY_MS must be a valid u64");

        let request_timeout_secs: u64 = std::env::var("TELEMETRY_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| DEFAULT_REQUEST_TIMEOUT_SECS.to_string())
            .parse()
            .expect("TELEMETRY_REQUEST_TIMEOUT_SECS must be a valid u64");

        assert!(max_events > 0, "TELEMETRY_MAX_EVENTS must be positive");
        assert!(max_frames > 0, "TELEMETRY_MAX_FRAMES must be positive");
        assert!(flush_every_ms > 0, "TELEMETRY_FLUSH_EVERY_MS must be positive");

        Self {
            max_events,
            max_frames,
            flush_every: Duration::from_millis(flush_every_ms),
            request_timeout: Duration::from_secs(request_timeout_secs),
        }
    }
}
