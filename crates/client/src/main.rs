//! `posematch-client` -- headless pose-match session runner.
//!
//! Loads a level and a recorded pose stream, creates a play on the
//! backend, then steps the stage machine at a fixed tick rate while the
//! telemetry bus ships events and frames in the background. Commands
//! (`next`, `retry`, `complete`, `hide`) are read line by line from stdin.
//! Ctrl-C hands buffered telemetry off the way a closing page would.
//!
//! # Environment variables
//!
//! | Variable          | Required | Default | Description                                |
//! |-------------------|----------|---------|--------------------------------------------|
//! | `BACKEND_URL`     | yes      | --      | Backend base URL, e.g. `http://host:3000`  |
//! | `ACCESS_TOKEN`    | yes      | --      | Bearer token for the API                   |
//! | `LEVEL_FILE`      | yes      | --      | JSON array of stage nodes                  |
//! | `POSE_FILE`       | no       | --      | JSON array of recorded pose samples        |
//! | `GAME_ID`         | yes      | --      | Game reference                             |
//! | `LEVEL_ID`        | yes      | --      | Level reference                            |
//! | `DEVICE_ID`       | no       | `cli`   | Device reference                           |
//! | `CLIENT_PLAY_ID`  | no       | --      | Idempotency key for play creation          |
//! | `LEVEL_INDEX`     | no       | `0`     | Level index tagged on frames               |
//! | `TICK_MS`         | no       | `33`    | Milliseconds between host ticks            |
//! | `MEDIA_FILE`      | no       | --      | Recording uploaded after the level ends    |
//!
//! Batching is configured through `TelemetryConfig::from_env`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use posematch_client::config::TelemetryConfig;
use posematch_client::error::ClientError;
use posematch_client::host::{HostStatus, SessionHost};
use posematch_client::pose_source::RecordedPoseSource;
use posematch_client::telemetry::lifecycle::LifecycleEvent;
use posematch_client::telemetry::TelemetryBus;
use posematch_client::transport::HttpTransport;
use posematch_core::play::CreatePlayRequest;
use posematch_stage::{Command, StageMachine, StageNode};
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default interval between host ticks (about 30 per second).
const DEFAULT_TICK_MS: u64 = 33;

fn required_env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| {
        tracing::error!("{name} environment variable is required");
        std::process::exit(1);
    })
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "posematch_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "Client stopped");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ClientError> {
    let backend_url = required_env("BACKEND_URL");
    let access_token = required_env("ACCESS_TOKEN");
    let level_file = required_env("LEVEL_FILE");

    let level_index: u32 = std::env::var("LEVEL_INDEX")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let tick_ms: u64 = std::env::var("TICK_MS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_TICK_MS);

    let nodes: Vec<StageNode> = serde_json::from_str(&std::fs::read_to_string(&level_file)?)?;
    let source = match std::env::var("POSE_FILE") {
        Ok(path) => RecordedPoseSource::from_path(path)?,
        Err(_) => RecordedPoseSource::default(),
    };

    let config = TelemetryConfig::from_env();
    let transport = HttpTransport::new(&backend_url, access_token, config.request_timeout)?;

    let created = transport
        .create_play(&CreatePlayRequest {
            game_id: required_env("GAME_ID"),
            level_id: required_env("LEVEL_ID"),
            device_id: std::env::var("DEVICE_ID").unwrap_or_else(|_| "cli".into()),
            client_play_id: std::env::var("CLIENT_PLAY_ID").ok(),
        })
        .await?;

    tracing::info!(
        play_id = %created.play_id,
        reused = created.reused,
        nodes = nodes.len(),
        pose_samples = source.len(),
        tick_ms,
        "Starting posematch-client",
    );

    let bus = TelemetryBus::new(created.play_id, config, Arc::new(transport));
    let (lifecycle_tx, lifecycle_rx) = broadcast::channel(8);
    bus.start_auto_flush(lifecycle_rx);

    let mut host = SessionHost::new(
        StageMachine::new(level_index, nodes),
        bus.clone(),
        Box::new(source),
    );

    let outcome = drive(&mut host, &bus, &lifecycle_tx, tick_ms).await;

    bus.stop_auto_flush().await;
    let (events, frames) = bus.flush_all().await;
    tracing::info!(
        events = ?events,
        frames = ?frames,
        pending_events = bus.pending_events(),
        pending_frames = bus.pending_frames(),
        "Final flush"
    );

    if let Ok(HostStatus::Complete) = outcome {
        if let Ok(path) = std::env::var("MEDIA_FILE") {
            upload_recording(&bus, Path::new(&path)).await?;
        }
    }

    outcome.map(|_| ())
}

/// Run the tick loop until the level completes, fails or Ctrl-C.
async fn drive(
    host: &mut SessionHost,
    bus: &TelemetryBus,
    lifecycle_tx: &broadcast::Sender<LifecycleEvent>,
    tick_ms: u64,
) -> Result<HostStatus, ClientError> {
    if host.start()? == HostStatus::Complete {
        return Ok(HostStatus::Complete);
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(tick_ms));
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        let status = tokio::select! {
            _ = ticker.tick() => host.tick(tick_ms)?,
            line = lines.next_line(), if stdin_open => match line? {
                Some(line) if line.trim().eq_ignore_ascii_case("hide") => {
                    // Receivers only exist while auto flush runs.
                    let _ = lifecycle_tx.send(LifecycleEvent::VisibilityHidden);
                    host.status()
                }
                Some(line) if line.trim().is_empty() => host.status(),
                Some(line) => match line.parse::<Command>() {
                    Ok(command) => host.command(command)?,
                    Err(message) => {
                        tracing::warn!("{message}");
                        host.status()
                    }
                },
                None => {
                    stdin_open = false;
                    host.status()
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, handing off buffered telemetry");
                bus.stop_auto_flush().await;
                bus.handle_lifecycle(LifecycleEvent::PageHide).await;
                return Ok(host.status());
            }
        };

        if status == HostStatus::Complete {
            return Ok(status);
        }
    }
}

async fn upload_recording(bus: &TelemetryBus, path: &Path) -> Result<(), ClientError> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("recording.webm");
    let content_type = match path.extension().and_then(|e| e.to_str()) {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    };
    let uploaded = bus.upload_media(bytes, file_name, content_type, "file").await?;
    tracing::info!(url = %uploaded.url, "Recording uploaded");
    Ok(())
}
