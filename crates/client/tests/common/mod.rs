//! Shared test infrastructure for client integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use posematch_client::config::TelemetryConfig;
use posematch_client::telemetry::TelemetryBus;
use posematch_client::transport::{MediaUpload, Transport, TransportError};
use serde_json::Value;
use tokio::sync::Notify;

pub const PLAY_ID: &str = "play-1";

/// In-memory [`Transport`] recording every request.
#[derive(Default)]
pub struct MockTransport {
    pub posts: Mutex<Vec<(String, Value)>>,
    pub beacons: Mutex<Vec<(String, Value)>>,
    pub uploads: Mutex<Vec<(String, MediaUpload)>>,
    /// Number of upcoming `post_json` calls that fail.
    pub fail_next: AtomicUsize,
    /// Whether `send_beacon` accepts the body.
    pub beacon_ok: AtomicBool,
    /// When set, `post_json` parks until `release` is notified.
    pub hold: AtomicBool,
    pub entered: Notify,
    pub release: Notify,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, n: usize) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn posts(&self) -> Vec<(String, Value)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn beacons(&self) -> Vec<(String, Value)> {
        self.beacons.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn post_json(&self, path: &str, body: &Value) -> Result<(), TransportError> {
        if self.hold.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(TransportError::HttpStatus(503));
        }
        self.posts.lock().unwrap().push((path.to_string(), body.clone()));
        Ok(())
    }

    fn send_beacon(&self, path: &str, body: &Value) -> bool {
        if !self.beacon_ok.load(Ordering::SeqCst) {
            return false;
        }
        self.beacons.lock().unwrap().push((path.to_string(), body.clone()));
        true
    }

    async fn upload_media(&self, path: &str, upload: MediaUpload) -> Result<String, TransportError> {
        let url = format!("/media/{}", upload.file_name);
        self.uploads.lock().unwrap().push((path.to_string(), upload));
        Ok(url)
    }
}

pub fn config(max_events: usize, max_frames: usize) -> TelemetryConfig {
    TelemetryConfig {
        max_events,
        max_frames,
        flush_every: Duration::from_secs(3600),
        request_timeout: Duration::from_secs(1),
    }
}

pub fn bus_with(transport: &Arc<MockTransport>, config: TelemetryConfig) -> TelemetryBus {
    TelemetryBus::new(PLAY_ID, config, transport.clone())
}

/// Event `type`s of a posted `{ "events": [...] }` body.
pub fn event_types(body: &Value) -> Vec<String> {
    body["events"]
        .as_array()
        .map(|events| {
            events
                .iter()
                .filter_map(|e| e["type"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Poll `condition` until it holds or a second has passed.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
