//! Route definitions for the `/plays` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::handlers::plays;
use crate::state::AppState;

/// Routes mounted at `/plays`.
///
/// ```text
/// POST   /                  -> create_play
/// GET    /{id}              -> get_play (admin)
/// DELETE /{id}              -> delete_play (admin)
/// POST   /{id}/events       -> ingest_events
/// POST   /{id}/frames       -> ingest_frames
/// POST   /{id}/media        -> upload_media (body limit: max_media_bytes)
/// ```
pub fn router(max_media_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/", post(plays::create_play))
        .route("/{id}", get(plays::get_play).delete(plays::delete_play))
        .route("/{id}/events", post(plays::ingest_events))
        .route("/{id}/frames", post(plays::ingest_frames))
        .route(
            "/{id}/media",
            post(plays::upload_media).layer(DefaultBodyLimit::max(max_media_bytes)),
        )
}
