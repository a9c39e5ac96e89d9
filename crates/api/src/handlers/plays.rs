//! Handlers for the `/plays` resource: session creation, telemetry
//! ingestion, media upload and admin inspection.
//!
//! Every ingestion handler resolves the play through [`load_owned_play`]
//! before touching its children.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use posematch_core::error::CoreError;
use posematch_core::play::{
    new_play_id, CreatePlayRequest, CreatePlayResponse, MediaRecord, MediaUploadResponse,
    PlaySession,
};
use posematch_core::range::fold_frames;
use posematch_core::telemetry::{
    parse_frame, IngestEventsResponse, IngestFramesResponse, RawFrame,
};
use posematch_core::types::DbId;
use posematch_db::{InsertOutcome, RangeEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAdmin;
use crate::state::AppState;

/// Extension used when neither the file name nor the content type gives one.
const FALLBACK_MEDIA_EXTENSION: &str = "bin";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Query parameters for `POST /plays/{id}/media`.
#[derive(Debug, Deserialize)]
pub struct MediaUploadQuery {
    /// Multipart field holding the file. Defaults to the first file field.
    pub field: Option<String>,
}

/// Everything stored for one play, returned by `GET /plays/{id}`.
#[derive(Debug, Serialize)]
pub struct PlayDetail {
    #[serde(flatten)]
    pub play: PlaySession,
    pub events: Vec<Value>,
    pub frames: Vec<RawFrame>,
    pub ranges: Vec<RangeEntry>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a play and require that `user_id` owns it.
///
/// 404 when the play does not exist, 403 when it belongs to someone else.
async fn load_owned_play(state: &AppState, play_id: &str, user_id: DbId) -> AppResult<PlaySession> {
    let play = state
        .store
        .get_play(play_id)
        .await?
        .ok_or_else(|| not_found(play_id))?;

    if !play.is_owned_by(user_id) {
        return Err(AppError::Core(CoreError::Forbidden(
            "Play belongs to another user".into(),
        )));
    }
    Ok(play)
}

fn not_found(play_id: &str) -> AppError {
    AppError::Core(CoreError::NotFound {
        entity: "Play",
        id: play_id.to_string(),
    })
}

/// Take the array stored under `field`, rejecting anything else.
fn batch_array<'a>(body: &'a Value, field: &str) -> AppResult<&'a [Value]> {
    body.get(field)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| AppError::BadRequest(format!("'{field}' must be an array")))
}

/// Lowercase alphanumeric extension for a stored upload.
fn media_extension(file_name: Option<&str>, content_type: Option<&str>) -> String {
    let from_name = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext);
    let from_type = content_type
        .and_then(|ct| ct.split(';').next())
        .and_then(|mime| mime.rsplit_once('/'))
        .map(|(_, subtype)| subtype);

    from_name
        .into_iter()
        .chain(from_type)
        .map(|ext| ext.trim().to_ascii_lowercase())
        .find(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| FALLBACK_MEDIA_EXTENSION.to_string())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /api/v1/plays
///
/// Create a play owned by the caller. With a `clientPlayId` the insert is
/// idempotent: the caller's own existing play is reused (200), someone
/// else's is refused (403). New plays return 201.
pub async fn create_play(
    State(state): State<AppState>,
    user: AuthUser,
    Json(input): Json<CreatePlayRequest>,
) -> AppResult<(StatusCode, Json<CreatePlayResponse>)> {
    input.validate()?;

    let play = PlaySession {
        play_id: input.client_play_id.unwrap_or_else(new_play_id),
        owner_id: user.user_id,
        game_id: input.game_id,
        level_id: input.level_id,
        device_id: input.device_id,
        created_at: Utc::now(),
        media: None,
    };

    match state.store.insert_play_if_absent(&play).await? {
        InsertOutcome::Inserted => {
            tracing::info!(
                play_id = %play.play_id,
                user_id = user.user_id,
                game_id = %play.game_id,
                level_id = %play.level_id,
                "Play created"
            );
            Ok((
                StatusCode::CREATED,
                Json(CreatePlayResponse {
                    play_id: play.play_id,
                    reused: false,
                }),
            ))
        }
        InsertOutcome::Existing(existing) if existing.is_owned_by(user.user_id) => {
            tracing::debug!(play_id = %existing.play_id, "Play reused");
            Ok((
                StatusCode::OK,
                Json(CreatePlayResponse {
                    play_id: existing.play_id,
                    reused: true,
                }),
            ))
        }
        InsertOutcome::Existing(existing) => {
            tracing::warn!(
                play_id = %existing.play_id,
                user_id = user.user_id,
                "Client play id already owned by another user"
            );
            Err(AppError::Core(CoreError::Forbidden(
                "Play belongs to another user".into(),
            )))
        }
    }
}

/// POST /api/v1/plays/{id}/events
///
/// Append `events` verbatim. A missing or non-array `events` is a 400 and
/// nothing is written.
pub async fn ingest_events(
    State(state): State<AppState>,
    Path(play_id): Path<String>,
    user: AuthUser,
    Json(body): Json<Value>,
) -> AppResult<Json<IngestEventsResponse>> {
    load_owned_play(&state, &play_id, user.user_id).await?;
    let events = batch_array(&body, "events")?;

    let wrote = if events.is_empty() {
        0
    } else {
        state.store.append_events(&play_id, events).await?
    };

    tracing::debug!(play_id = %play_id, wrote, "Events ingested");
    Ok(Json(IngestEventsResponse { wrote }))
}

/// POST /api/v1/plays/{id}/frames
///
/// Store every frame with an integer `seq` and a recognised `frameType`
/// (others are skipped), then merge the batch into the per-state range
/// summaries.
pub async fn ingest_frames(
    State(state): State<AppState>,
    Path(play_id): Path<String>,
    user: AuthUser,
    Json(body): Json<Value>,
) -> AppResult<Json<IngestFramesResponse>> {
    load_owned_play(&state, &play_id, user.user_id).await?;
    let received = batch_array(&body, "frames")?;

    let now = Utc::now();
    let frames: Vec<RawFrame> = received
        .iter()
        .filter_map(|frame| parse_frame(frame, now))
        .collect();

    let skipped = received.len() - frames.len();
    if skipped > 0 {
        tracing::debug!(play_id = %play_id, skipped, "Skipped invalid frames");
    }
    if frames.is_empty() {
        return Ok(Json(IngestFramesResponse {
            wrote: 0,
            updated_ranges: 0,
        }));
    }

    let wrote = state.store.write_frames(&play_id, &frames).await?;
    let ranges = fold_frames(&frames);
    let updated_ranges = state.aggregator.merge_batch(&play_id, &ranges).await?;

    tracing::debug!(play_id = %play_id, wrote, updated_ranges, "Frames ingested");
    Ok(Json(IngestFramesResponse {
        wrote,
        updated_ranges,
    }))
}

/// POST /api/v1/plays/{id}/media
///
/// Accepts a multipart form. The field named by `?field=` is stored, or
/// the first field carrying a file name when no field is given. The file
/// lands under `media_dir/{play_id}/` and becomes the play's media record.
pub async fn upload_media(
    State(state): State<AppState>,
    Path(play_id): Path<String>,
    Query(query): Query<MediaUploadQuery>,
    user: AuthUser,
    mut multipart: Multipart,
) -> AppResult<Json<MediaUploadResponse>> {
    load_owned_play(&state, &play_id, user.user_id).await?;

    let mut upload: Option<(Option<String>, Option<String>, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let wanted = match &query.field {
            Some(name) => field.name() == Some(name.as_str()),
            None => field.file_name().is_some(),
        };
        if !wanted {
            continue;
        }

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        upload = Some((file_name, content_type, data.to_vec()));
        break;
    }

    let (file_name, content_type, data) = upload.ok_or_else(|| match &query.field {
        Some(name) => AppError::BadRequest(format!("Missing '{name}' field")),
        None => AppError::BadRequest("Missing file field".into()),
    })?;
    if data.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".into()));
    }

    let ext = media_extension(file_name.as_deref(), content_type.as_deref());
    let stored_name = format!("{}.{ext}", uuid::Uuid::now_v7());

    let play_dir = state.config.media_dir.join(&play_id);
    tokio::fs::create_dir_all(&play_dir)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;
    tokio::fs::write(play_dir.join(&stored_name), &data)
        .await
        .map_err(|e| AppError::InternalError(e.to_string()))?;

    let url = format!("{}/{play_id}/{stored_name}", state.config.media_base_url);
    let media = MediaRecord {
        url: url.clone(),
        content_type,
        size_bytes: data.len() as i64,
        uploaded_at: Utc::now(),
    };
    state.store.set_media(&play_id, &media).await?;

    tracing::info!(play_id = %play_id, size_bytes = media.size_bytes, url = %url, "Media stored");
    Ok(Json(MediaUploadResponse { url }))
}

/// GET /api/v1/plays/{id}
///
/// Admin view of a play with its events, frames and range summaries.
pub async fn get_play(
    State(state): State<AppState>,
    RequireAdmin(_admin): RequireAdmin,
    Path(play_id): Path<String>,
) -> AppResult<Json<PlayDetail>> {
    let play = state
        .store
        .get_play(&play_id)
        .await?
        .ok_or_else(|| not_found(&play_id))?;

    let (events, frames, ranges) = tokio::try_join!(
        state.store.list_events(&play_id),
        state.store.list_frames(&play_id),
        state.store.list_ranges(&play_id),
    )?;

    Ok(Json(PlayDetail {
        play,
        events,
        frames,
        ranges,
    }))
}

/// DELETE /api/v1/plays/{id}
///
/// Delete a play with all of its children and stored media. 204 on
/// success, 404 when the play does not exist.
pub async fn delete_play(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(play_id): Path<String>,
) -> AppResult<StatusCode> {
    if !state.store.delete_play(&play_id).await? {
        return Err(not_found(&play_id));
    }

    let play_dir = state.config.media_dir.join(&play_id);
    match tokio::fs::remove_dir_all(&play_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(play_id = %play_id, error = %e, "Failed to remove play media");
        }
    }

    tracing::info!(play_id = %play_id, admin_id = admin.user_id, "Play deleted");
    Ok(StatusCode::NO_CONTENT)
}
