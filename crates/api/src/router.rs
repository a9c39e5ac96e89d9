//! The posematch HTTP surface.
//!
//! [`build_app_router`] assembles health, the `/api/v1/plays` ingestion and
//! admin routes and the local media mount. The binary and the integration
//! tests both go through it, so tests see the production layers.

use std::time::Duration;

use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, StatusCode};
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::config::ServerConfig;
use crate::routes;
use crate::state::AppState;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Routes plus layers, outermost first on the way in: CORS, request id
/// assignment, tracing, request id echo, timeout, panic recovery.
///
/// Telemetry batches from a client that is going away must not hang, so
/// every request is bounded by `request_timeout_secs`.
pub fn build_app_router(state: AppState, config: &ServerConfig) -> Router {
    let mut router = Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes(config));

    if let Some(mount) = media_mount(config) {
        router = router.nest_service(mount, ServeDir::new(&config.media_dir));
    }

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);
    router
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_secs),
        ))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(build_cors_layer(config))
        .with_state(state)
}

/// Where uploaded media is served from, if this server serves it at all.
///
/// An absolute URL in `media_base_url` means some other host serves the
/// files, and a bare `/` would shadow the API.
fn media_mount(config: &ServerConfig) -> Option<&str> {
    let base = config.media_base_url.as_str();
    (base.starts_with('/') && base.len() > 1).then_some(base)
}

/// CORS for browser hosts posting telemetry and uploads. Admin deletes
/// come through the same layer.
///
/// Panics at startup if any configured origin is invalid.
pub fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .map(|o| {
            o.parse()
                .unwrap_or_else(|e| panic!("Invalid CORS origin '{o}': {e}"))
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
