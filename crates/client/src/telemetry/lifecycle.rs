//! Host lifecycle signals and the background tasks of auto flush.

use std::sync::Weak;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::{BusInner, TelemetryBus};

/// The host is going away or being hidden; buffered telemetry should be
/// handed off immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The host is being torn down (process exit, page unload).
    PageHide,
    /// The host became invisible but may come back.
    VisibilityHidden,
}

impl LifecycleEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PageHide => "page_hide",
            Self::VisibilityHidden => "visibility_hidden",
        }
    }
}

/// Running auto-flush tasks and the token that stops them.
pub(super) struct AutoFlush {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl AutoFlush {
    pub(super) fn new(cancel: CancellationToken, tasks: Vec<JoinHandle<()>>) -> Self {
        Self { cancel, tasks }
    }

    pub(super) async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Auto flush task ended abnormally");
            }
        }
    }
}

impl Drop for AutoFlush {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Flush both lanes every `period` until cancelled or the bus is dropped.
pub(super) async fn run_timer(bus: Weak<BusInner>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    // The first tick of an interval fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = bus.upgrade() else { break };
                TelemetryBus::from_inner(inner).flush_all().await;
            }
        }
    }
}

/// Forward lifecycle signals to [`TelemetryBus::handle_lifecycle`].
pub(super) async fn run_listener(
    bus: Weak<BusInner>,
    mut signals: broadcast::Receiver<LifecycleEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            signal = signals.recv() => match signal {
                Ok(event) => {
                    let Some(inner) = bus.upgrade() else { break };
                    TelemetryBus::from_inner(inner).handle_lifecycle(event).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Lifecycle listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dropping_auto_flush_cancels_its_tasks() {
        let cancel = CancellationToken::new();
        let observer = cancel.clone();
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        });

        drop(AutoFlush::new(cancel, Vec::new()));

        assert!(observer.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("task should stop once cancelled")
            .expect("task should not panic");
    }
}
