//! HTTP delivery of telemetry batches, session creation and media upload.
//!
//! [`Transport`] is the seam between the [`TelemetryBus`](crate::telemetry::TelemetryBus)
//! and the network so the bus can be exercised without a server.
//! [`HttpTransport`] is the production implementation over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use posematch_core::play::{CreatePlayRequest, CreatePlayResponse, MediaUploadResponse};
use serde_json::Value;

/// Timeout applied to beacon-style sends, which nobody waits for.
const BEACON_TIMEOUT: Duration = Duration::from_secs(5);

/// API prefix appended to the configured backend URL.
const API_PREFIX: &str = "/api/v1/";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Delivery failures. All of them are transient from the bus's point of
/// view: the batch is re-queued and retried on the next flush.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-2xx status code.
    #[error("Server returned HTTP {0}")]
    HttpStatus(u16),

    /// The operation is not available on this transport.
    #[error("Unsupported transport operation: {0}")]
    Unsupported(&'static str),
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// A binary upload handed to [`Transport::upload_media`].
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub field_name: String,
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// POST a JSON body to an API path (relative, e.g. `plays/abc/events`).
    async fn post_json(&self, path: &str, body: &Value) -> Result<(), TransportError>;

    /// Hand a JSON body off for delivery without waiting for it.
    ///
    /// Returns `false` when the transport cannot queue the send, in which
    /// case the caller falls back to [`post_json`](Self::post_json).
    fn send_beacon(&self, path: &str, body: &Value) -> bool;

    /// Multipart upload; returns the stored media URL.
    async fn upload_media(&self, path: &str, upload: MediaUpload) -> Result<String, TransportError>;
}

// ---------------------------------------------------------------------------
// HttpTransport
// ---------------------------------------------------------------------------

/// `reqwest`-backed transport with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl HttpTransport {
    /// Build a transport for `backend_url` (e.g. `http://localhost:3000`).
    pub fn new(
        backend_url: &str,
        access_token: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: format!("{}{API_PREFIX}", backend_url.trim_end_matches('/')),
            access_token: access_token.into(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `POST /plays` -- create (or reuse) the play this bus reports into.
    pub async fn create_play(
        &self,
        request: &CreatePlayRequest,
    ) -> Result<CreatePlayResponse, TransportError> {
        let response = self
            .client
            .post(self.url("plays"))
            .bearer_auth(&self.access_token)
            .json(request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(response.status().as_u16()));
        }
        Ok(response.json::<CreatePlayResponse>().await?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn post_json(&self, path: &str, body: &Value) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }

    fn send_beacon(&self, path: &str, body: &Value) -> bool {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return false;
        };
        let request = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.access_token)
            .timeout(BEACON_TIMEOUT)
            .json(body);
        let path = path.to_string();
        handle.spawn(async move {
            if let Err(e) = request.send().await {
                tracing::debug!(path = %path, error = %e, "Beacon send failed");
            }
        });
        true
    }

    async fn upload_media(&self, path: &str, upload: MediaUpload) -> Result<String, TransportError> {
        let part = reqwest::multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name)
            .mime_str(&upload.content_type)?;
        let form = reqwest::multipart::Form::new().part(upload.field_name, part);

        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(TransportError::HttpStatus(response.status().as_u16()));
        }
        Ok(response.json::<MediaUploadResponse>().await?.url)
    }
}
