//! Client-side telemetry bus.
//!
//! A [`TelemetryBus`] belongs to exactly one play: it buffers events and
//! pose frames, delivers them in batches, and re-queues failed batches at
//! the front of their buffer so the oldest data is retried first. Events
//! and frames are independent lanes with independent in-flight guards; a
//! slow frame upload never holds up event delivery.
//!
//! Lifecycle: construct -> [`start_auto_flush`](TelemetryBus::start_auto_flush)
//! -> [`stop_auto_flush`](TelemetryBus::stop_auto_flush) -> drop.
//!
//! Retried batches are not deduplicated. A batch the server stored but
//! whose response was lost is sent again, which the server's range
//! summaries count twice.

mod lane;
pub mod lifecycle;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::Utc;
use posematch_core::play::MediaUploadResponse;
use posematch_core::telemetry::{PoseFrame, TelemetryEvent};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::TelemetryConfig;
use crate::transport::{MediaUpload, Transport, TransportError};

use self::lane::Lane;
use self::lifecycle::{AutoFlush, LifecycleEvent};

/// Result of a flush call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered.
    Empty,
    /// Another flush of the same lane is running; this call did nothing.
    InFlight,
    /// The batch of this many items was delivered.
    Sent(usize),
    /// Delivery failed; this many items were put back in front.
    Requeued(usize),
}

/// Per-play telemetry buffer and delivery handle. Cheap to clone.
#[derive(Clone)]
pub struct TelemetryBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    play_id: String,
    config: TelemetryConfig,
    transport: Arc<dyn Transport>,
    events: Lane<TelemetryEvent>,
    frames: Lane<PoseFrame>,
    next_seq: AtomicU64,
    auto_flush: Mutex<Option<AutoFlush>>,
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl TelemetryBus {
    pub fn new(play_id: impl Into<String>, config: TelemetryConfig, transport: Arc<dyn Transport>) -> Self {
        let inner = BusInner {
            play_id: play_id.into(),
            events: Lane::new("events", config.max_events.max(1)),
            frames: Lane::new("frames", config.max_frames.max(1)),
            config,
            transport,
            next_seq: AtomicU64::new(0),
            auto_flush: Mutex::new(None),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    fn from_inner(inner: Arc<BusInner>) -> Self {
        Self { inner }
    }

    fn downgrade(&self) -> Weak<BusInner> {
        Arc::downgrade(&self.inner)
    }

    pub fn play_id(&self) -> &str {
        &self.inner.play_id
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.inner.config
    }

    pub fn pending_events(&self) -> usize {
        self.inner.events.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.inner.frames.len()
    }

    /// Buffered events, oldest first.
    pub fn buffered_events(&self) -> Vec<TelemetryEvent> {
        self.inner.events.snapshot()
    }

    /// Buffered frames, oldest first.
    pub fn buffered_frames(&self) -> Vec<PoseFrame> {
        self.inner.frames.snapshot()
    }

    fn path(&self, suffix: &str) -> String {
        format!("plays/{}/{suffix}", self.inner.play_id)
    }

    // -----------------------------------------------------------------------
    // Enqueue
    // -----------------------------------------------------------------------

    /// Enqueue an event; schedules an event flush once `max_events` are
    /// buffered. Never blocks and never fails.
    pub fn emit_event(&self, event_type: impl Into<String>, payload: Value, timestamp: Option<i64>) {
        let event = TelemetryEvent {
            event_type: event_type.into(),
            timestamp: timestamp.unwrap_or_else(now_ms),
            payload,
        };
        if self.inner.events.push(event) {
            self.schedule(|bus| async move {
                bus.inner.events.clear_scheduled();
                bus.flush_events().await;
            });
        }
    }

    /// Enqueue a frame, assigning the next `seq` when the caller did not.
    ///
    /// Caller-supplied sequence numbers move the counter past themselves so
    /// assigned numbers stay monotonic. The counter saturates at `u64::MAX`.
    /// Returns the frame's `seq`.
    pub fn record_pose_frame(&self, mut frame: PoseFrame) -> u64 {
        let seq = match frame.seq {
            Some(seq) => {
                self.inner
                    .next_seq
                    .fetch_max(seq.saturating_add(1), Ordering::AcqRel);
                seq
            }
            // Saturates at u64::MAX rather than wrapping back to zero.
            None => match self.inner.next_seq.fetch_update(
                Ordering::AcqRel,
                Ordering::Acquire,
                |next| Some(next.saturating_add(1)),
            ) {
                Ok(prev) | Err(prev) => prev,
            },
        };
        frame.seq = Some(seq);
        frame.timestamp.get_or_insert_with(now_ms);

        if self.inner.frames.push(frame) {
            self.schedule(|bus| async move {
                bus.inner.frames.clear_scheduled();
                bus.flush_frames().await;
            });
        }
        seq
    }

    /// Fire-and-forget a flush on the current runtime.
    fn schedule<F, Fut>(&self, flush: F)
    where
        F: FnOnce(TelemetryBus) -> Fut,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(flush(self.clone()));
            }
            Err(_) => {
                // No runtime to flush on; the data stays buffered for the
                // next explicit flush.
                tracing::debug!(play_id = %self.inner.play_id, "No runtime for automatic flush");
                self.inner.events.clear_scheduled();
                self.inner.frames.clear_scheduled();
            }
        }
    }

    // -----------------------------------------------------------------------
    // Flush
    // -----------------------------------------------------------------------

    pub async fn flush_events(&self) -> FlushOutcome {
        self.flush_lane(&self.inner.events).await
    }

    pub async fn flush_frames(&self) -> FlushOutcome {
        self.flush_lane(&self.inner.frames).await
    }

    /// Flush both lanes concurrently.
    pub async fn flush_all(&self) -> (FlushOutcome, FlushOutcome) {
        tokio::join!(self.flush_events(), self.flush_frames())
    }

    async fn flush_lane<T: Serialize>(&self, lane: &Lane<T>) -> FlushOutcome {
        let Some(_guard) = lane.begin_flush() else {
            return FlushOutcome::InFlight;
        };

        let batch = lane.take_all();
        if batch.is_empty() {
            return FlushOutcome::Empty;
        }
        let count = batch.len();

        let result = match lane.body(&batch) {
            Ok(body) => self.inner.transport.post_json(&self.path(lane.name), &body).await,
            Err(e) => {
                tracing::error!(lane = lane.name, error = %e, "Failed to encode telemetry batch");
                lane.restore_front(batch);
                return FlushOutcome::Requeued(count);
            }
        };

        match result {
            Ok(()) => {
                tracing::debug!(play_id = %self.inner.play_id, lane = lane.name, count, "Telemetry batch delivered");
                FlushOutcome::Sent(count)
            }
            Err(e) => {
                tracing::warn!(
                    play_id = %self.inner.play_id,
                    lane = lane.name,
                    count,
                    error = %e,
                    "Telemetry flush failed, re-queueing batch"
                );
                lane.restore_front(batch);
                FlushOutcome::Requeued(count)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Teardown delivery
    // -----------------------------------------------------------------------

    /// React to the host going away: snapshot and clear both buffers, hand
    /// them to a beacon send, fall back to a regular POST, and put back
    /// whatever that fallback could not deliver.
    pub async fn handle_lifecycle(&self, event: LifecycleEvent) {
        let events = self.inner.events.take_all();
        let frames = self.inner.frames.take_all();
        tracing::info!(
            play_id = %self.inner.play_id,
            lifecycle = event.as_str(),
            events = events.len(),
            frames = frames.len(),
            "Teardown delivery"
        );

        self.deliver_on_teardown(&self.inner.events, events).await;
        self.deliver_on_teardown(&self.inner.frames, frames).await;
    }

    async fn deliver_on_teardown<T: Serialize>(&self, lane: &Lane<T>, batch: Vec<T>) {
        if batch.is_empty() {
            return;
        }
        let body = match lane.body(&batch) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(lane = lane.name, error = %e, "Failed to encode telemetry batch");
                lane.restore_front(batch);
                return;
            }
        };
        let path = self.path(lane.name);

        if self.inner.transport.send_beacon(&path, &body) {
            return;
        }
        if let Err(e) = self.inner.transport.post_json(&path, &body).await {
            tracing::warn!(lane = lane.name, error = %e, "Teardown delivery failed, restoring batch");
            lane.restore_front(batch);
        }
    }

    // -----------------------------------------------------------------------
    // Auto flush
    // -----------------------------------------------------------------------

    /// Start the periodic flush timer and the lifecycle listener.
    ///
    /// Returns `false` (and changes nothing) if auto flush is already
    /// running. Must be called from within a Tokio runtime.
    pub fn start_auto_flush(&self, signals: broadcast::Receiver<LifecycleEvent>) -> bool {
        let mut slot = self
            .inner
            .auto_flush
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            tracing::debug!(play_id = %self.inner.play_id, "Auto flush already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let timer = tokio::spawn(lifecycle::run_timer(
            self.downgrade(),
            self.inner.config.flush_every,
            cancel.clone(),
        ));
        let listener = tokio::spawn(lifecycle::run_listener(self.downgrade(), signals, cancel.clone()));

        *slot = Some(AutoFlush::new(cancel, vec![timer, listener]));
        tracing::info!(
            play_id = %self.inner.play_id,
            flush_every_ms = self.inner.config.flush_every.as_millis() as u64,
            "Auto flush started"
        );
        true
    }

    /// Stop the timer and listener and wait for both to finish.
    pub async fn stop_auto_flush(&self) {
        let auto = self
            .inner
            .auto_flush
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(auto) = auto {
            auto.shutdown().await;
            tracing::info!(play_id = %self.inner.play_id, "Auto flush stopped");
        }
    }

    pub fn is_auto_flushing(&self) -> bool {
        self.inner
            .auto_flush
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn events_in_flight(&self) -> bool {
        self.inner.events.is_in_flight()
    }

    pub fn frames_in_flight(&self) -> bool {
        self.inner.frames.is_in_flight()
    }

    // -----------------------------------------------------------------------
    // Media
    // -----------------------------------------------------------------------

    /// Upload a recording for this play. Not buffered and not retried.
    pub async fn upload_media(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        content_type: &str,
        field_name: &str,
    ) -> Result<MediaUploadResponse, TransportError> {
        let upload = MediaUpload {
            field_name: field_name.to_string(),
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            bytes,
        };
        let url = self.inner.transport.upload_media(&self.path("media"), upload).await?;
        tracing::info!(play_id = %self.inner.play_id, url = %url, "Media uploaded");
        Ok(MediaUploadResponse { url })
    }
}
