//! PostgreSQL [`PlayStore`].
//!
//! Tables are created by the migrations in `crates/db/migrations`. Range
//! summaries carry a `version` column; compare-and-set is a conditional
//! `UPDATE ... WHERE version = $n` (or `INSERT ... ON CONFLICT DO NOTHING`
//! for a key that must not exist yet) and reports success through the
//! affected row count.

use std::collections::BTreeMap;

use async_trait::async_trait;
use posematch_core::play::{MediaRecord, PlaySession};
use posematch_core::range::{RangeKey, RangeSummary};
use posematch_core::telemetry::RawFrame;
use posematch_core::types::{DbId, Timestamp};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};

use crate::store::{InsertOutcome, PlayStore, RangeEntry, StoreError, Versioned};

/// Column list for `plays` SELECT queries.
const PLAY_COLUMNS: &str = "\
    play_id, owner_id, game_id, level_id, device_id, \
    media_url, media_content_type, media_size_bytes, media_uploaded_at, \
    created_at";

/// Column list for `play_frames` INSERT and SELECT statements.
const FRAME_COLUMNS: &str = "\
    play_id, seq, frame_type, level_key, rep_key, state_key, body, created_at";

/// Parameters bound per frame row.
const FRAME_PARAMS: usize = 8;

/// Rows per multi-row INSERT, well below the 65535 bind parameter limit.
const MAX_ROWS_PER_INSERT: usize = 1_000;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

#[derive(Debug, FromRow)]
struct PlayRow {
    play_id: String,
    owner_id: DbId,
    game_id: String,
    level_id: String,
    device_id: String,
    media_url: Option<String>,
    media_content_type: Option<String>,
    media_size_bytes: Option<i64>,
    media_uploaded_at: Option<Timestamp>,
    created_at: Timestamp,
}

impl From<PlayRow> for PlaySession {
    fn from(row: PlayRow) -> Self {
        let media = match (row.media_url, row.media_uploaded_at) {
            (Some(url), Some(uploaded_at)) => Some(MediaRecord {
                url,
                content_type: row.media_content_type,
                size_bytes: row.media_size_bytes.unwrap_or(0),
                uploaded_at,
            }),
            _ => None,
        };
        Self {
            play_id: row.play_id,
            owner_id: row.owner_id,
            game_id: row.game_id,
            level_id: row.level_id,
            device_id: row.device_id,
            created_at: row.created_at,
            media,
        }
    }
}

#[derive(Debug, FromRow)]
struct FrameRow {
    seq: i64,
    frame_type: String,
    level_key: String,
    rep_key: String,
    state_key: String,
    body: Json<Value>,
    created_at: Timestamp,
}

impl TryFrom<FrameRow> for RawFrame {
    type Error = StoreError;

    fn try_from(row: FrameRow) -> Result<Self, Self::Error> {
        Ok(Self {
            seq: from_db_seq(row.seq)?,
            frame_type: row.frame_type,
            range_key: RangeKey {
                level: row.level_key,
                rep: row.rep_key,
                state: row.state_key,
            },
            body: row.body.0,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct RangeRow {
    level_key: String,
    rep_key: String,
    state_key: String,
    min_seq: i64,
    max_seq: i64,
    count: i64,
    version: i64,
    updated_at: Timestamp,
}

impl RangeRow {
    fn into_parts(self) -> Result<(RangeKey, Versioned<RangeSummary>), StoreError> {
        let summary = RangeSummary {
            min_seq: from_db_seq(self.min_seq)?,
            max_seq: from_db_seq(self.max_seq)?,
            count: from_db_seq(self.count)?,
            updated_at: self.updated_at,
        };
        let key = RangeKey {
            level: self.level_key,
            rep: self.rep_key,
            state: self.state_key,
        };
        Ok((
            key,
            Versioned {
                data: summary,
                version: from_db_seq(self.version)?,
            },
        ))
    }
}

fn to_db(value: u64, what: &str) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange(format!("{what} {value}")))
}

fn from_db_seq(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::OutOfRange(format!("negative value {value}")))
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// PostgreSQL-backed store over a shared pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl PlayStore for PgStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        crate::health_check(&self.pool).await?;
        Ok(())
    }

    async fn insert_play_if_absent(&self, play: &PlaySession) -> Result<InsertOutcome, StoreError> {
        let inserted = sqlx::query(
            "INSERT INTO plays (play_id, owner_id, game_id, level_id, device_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (play_id) DO NOTHING",
        )
        .bind(&play.play_id)
        .bind(play.owner_id)
        .bind(&play.game_id)
        .bind(&play.level_id)
        .bind(&play.device_id)
        .bind(play.created_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok(InsertOutcome::Inserted);
        }
        let existing = self
            .get_play(&play.play_id)
            .await?
            .ok_or_else(|| StoreError::MissingPlay(play.play_id.clone()))?;
        Ok(InsertOutcome::Existing(existing))
    }

    async fn get_play(&self, play_id: &str) -> Result<Option<PlaySession>, StoreError> {
        let query = format!("SELECT {PLAY_COLUMNS} FROM plays WHERE play_id = $1");
        let row = sqlx::query_as::<_, PlayRow>(&query)
            .bind(play_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(PlaySession::from))
    }

    async fn set_media(&self, play_id: &str, media: &MediaRecord) -> Result<(), StoreError> {
        let updated = sqlx::query(
            "UPDATE plays SET media_url = $2, media_content_type = $3, \
             media_size_bytes = $4, media_uploaded_at = $5 \
             WHERE play_id = $1",
        )
        .bind(play_id)
        .bind(&media.url)
        .bind(&media.content_type)
        .bind(media.size_bytes)
        .bind(media.uploaded_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(StoreError::MissingPlay(play_id.to_string()));
        }
        Ok(())
    }

    async fn append_events(&self, play_id: &str, events: &[Value]) -> Result<usize, StoreError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for chunk in events.chunks(MAX_ROWS_PER_INSERT) {
            let mut query = String::from("INSERT INTO play_events (play_id, body) VALUES ");
            for i in 0..chunk.len() {
                if i > 0 {
                    query.push_str(", ");
                }
                query.push_str(&format!("($1, ${})", i + 2));
            }

            let mut q = sqlx::query(&query).bind(play_id);
            for event in chunk {
                q = q.bind(Json(event));
            }
            q.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(events.len())
    }

    async fn write_frames(&self, play_id: &str, frames: &[RawFrame]) -> Result<usize, StoreError> {
        if frames.is_empty() {
            return Ok(0);
        }

        // One statement may not touch the same row twice; within a batch
        // the later frame for a seq wins.
        let mut latest: BTreeMap<u64, &RawFrame> = BTreeMap::new();
        for frame in frames {
            latest.insert(frame.seq, frame);
        }
        let rows: Vec<&RawFrame> = latest.into_values().collect();

        let mut tx = self.pool.begin().await?;
        for chunk in rows.chunks(MAX_ROWS_PER_INSERT) {
            let mut query = format!("INSERT INTO play_frames ({FRAME_COLUMNS}) VALUES ");
            let mut param_idx = 1usize;
            for i in 0..chunk.len() {
                if i > 0 {
                    query.push_str(", ");
                }
                query.push('(');
                for j in 0..FRAME_PARAMS {
                    if j > 0 {
                        query.push_str(", ");
                    }
                    query.push('$');
                    query.push_str(&param_idx.to_string());
                    param_idx += 1;
                }
                query.push(')');
            }
            query.push_str(
                " ON CONFLICT (play_id, seq) DO UPDATE SET \
                 frame_type = EXCLUDED.frame_type, level_key = EXCLUDED.level_key, \
                 rep_key = EXCLUDED.rep_key, state_key = EXCLUDED.state_key, \
                 body = EXCLUDED.body, created_at = EXCLUDED.created_at",
            );

            let mut q = sqlx::query(&query);
            for frame in chunk {
                q = q
                    .bind(play_id)
                    .bind(to_db(frame.seq, "seq")?)
                    .bind(&frame.frame_type)
                    .bind(&frame.range_key.level)
                    .bind(&frame.range_key.rep)
                    .bind(&frame.range_key.state)
                    .bind(Json(&frame.body))
                    .bind(frame.created_at);
            }
            q.execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(frames.len())
    }

    async fn list_events(&self, play_id: &str) -> Result<Vec<Value>, StoreError> {
        let rows: Vec<(Json<Value>,)> =
            sqlx::query_as("SELECT body FROM play_events WHERE play_id = $1 ORDER BY id")
                .bind(play_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(body,)| body.0).collect())
    }

    async fn list_frames(&self, play_id: &str) -> Result<Vec<RawFrame>, StoreError> {
        let query = format!("SELECT {FRAME_COLUMNS} FROM play_frames WHERE play_id = $1 ORDER BY seq");
        sqlx::query_as::<_, FrameRow>(&query)
            .bind(play_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(RawFrame::try_from)
            .collect()
    }

    async fn list_ranges(&self, play_id: &str) -> Result<Vec<RangeEntry>, StoreError> {
        let rows = sqlx::query_as::<_, RangeRow>(
            "SELECT level_key, rep_key, state_key, min_seq, max_seq, count, version, updated_at \
             FROM play_ranges WHERE play_id = $1 \
             ORDER BY level_key, rep_key, state_key",
        )
        .bind(play_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let (key, versioned) = row.into_parts()?;
                Ok(RangeEntry {
                    key,
                    summary: versioned.data,
                })
            })
            .collect()
    }

    async fn get_range(
        &self,
        play_id: &str,
        key: &RangeKey,
    ) -> Result<Option<Versioned<RangeSummary>>, StoreError> {
        let row = sqlx::query_as::<_, RangeRow>(
            "SELECT level_key, rep_key, state_key, min_seq, max_seq, count, version, updated_at \
             FROM play_ranges \
             WHERE play_id = $1 AND level_key = $2 AND rep_key = $3 AND state_key = $4",
        )
        .bind(play_id)
        .bind(&key.level)
        .bind(&key.rep)
        .bind(&key.state)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| r.into_parts().map(|(_, versioned)| versioned))
            .transpose()
    }

    async fn compare_and_set_range(
        &self,
        play_id: &str,
        key: &RangeKey,
        expected: Option<u64>,
        summary: &RangeSummary,
    ) -> Result<bool, StoreError> {
        let min_seq = to_db(summary.min_seq, "min_seq")?;
        let max_seq = to_db(summary.max_seq, "max_seq")?;
        let count = to_db(summary.count, "count")?;

        let written = match expected {
            None => sqlx::query(
                "INSERT INTO play_ranges \
                 (play_id, level_key, rep_key, state_key, min_seq, max_seq, count, version, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, 1, $8) \
                 ON CONFLICT (play_id, level_key, rep_key, state_key) DO NOTHING",
            )
            .bind(play_id)
            .bind(&key.level)
            .bind(&key.rep)
            .bind(&key.state)
            .bind(min_seq)
            .bind(max_seq)
            .bind(count)
            .bind(summary.updated_at)
            .execute(&self.pool)
            .await?
            .rows_affected(),
            Some(version) => sqlx::query(
                "UPDATE play_ranges \
                 SET min_seq = $5, max_seq = $6, count = $7, updated_at = $8, version = version + 1 \
                 WHERE play_id = $1 AND level_key = $2 AND rep_key = $3 AND state_key = $4 \
                   AND version = $9",
            )
            .bind(play_id)
            .bind(&key.level)
            .bind(&key.rep)
            .bind(&key.state)
            .bind(min_seq)
            .bind(max_seq)
            .bind(count)
            .bind(summary.updated_at)
            .bind(to_db(version, "version")?)
            .execute(&self.pool)
            .await?
            .rows_affected(),
        };
        Ok(written == 1)
    }

    async fn delete_play(&self, play_id: &str) -> Result<bool, StoreError> {
        let deleted = sqlx::query("DELETE FROM plays WHERE play_id = $1")
            .bind(play_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }
}
