pub mod health;
pub mod plays;

use axum::Router;

use crate::config::ServerConfig;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /plays                                 create (any authenticated user)
/// /plays/{id}                            get, delete (admin only)
/// /plays/{id}/events                     append events (owner)
/// /plays/{id}/frames                     write frames, merge ranges (owner)
/// /plays/{id}/media                      multipart upload (owner)
/// ```
pub fn api_routes(config: &ServerConfig) -> Router<AppState> {
    Router::new().nest("/plays", plays::router(config.max_media_bytes))
}
