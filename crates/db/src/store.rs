//! The storage seam of the ingestion service.
//!
//! A play is a small hierarchy: the session record, an append-only event
//! log, a frame map keyed by `seq`, and range summaries keyed by
//! [`RangeKey`]. Range summaries are the only records written
//! concurrently, so they carry a version and change only through
//! [`PlayStore::compare_and_set_range`].

use async_trait::async_trait;
use posematch_core::play::{MediaRecord, PlaySession};
use posematch_core::range::{RangeKey, RangeSummary};
use posematch_core::telemetry::RawFrame;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Value out of range: {0}")]
    OutOfRange(String),

    #[error("Play not found: {0}")]
    MissingPlay(String),
}

/// A record paired with its storage version.
///
/// Version 0 is never stored; the first write of a key produces version 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub data: T,
    pub version: u64,
}

/// Result of an insert-if-absent of a play.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted,
    /// A play with this id already existed and was left untouched.
    Existing(PlaySession),
}

/// One range summary with its key, as listed for a play.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeEntry {
    #[serde(flatten)]
    pub key: RangeKey,
    #[serde(flatten)]
    pub summary: RangeSummary,
}

#[async_trait]
pub trait PlayStore: Send + Sync {
    /// Cheap round trip to the backing store.
    async fn health_check(&self) -> Result<(), StoreError>;

    /// Create the play unless its id is taken. Atomic per id.
    async fn insert_play_if_absent(&self, play: &PlaySession) -> Result<InsertOutcome, StoreError>;

    async fn get_play(&self, play_id: &str) -> Result<Option<PlaySession>, StoreError>;

    async fn set_media(&self, play_id: &str, media: &MediaRecord) -> Result<(), StoreError>;

    /// Append events verbatim, preserving order. Returns the number written.
    async fn append_events(&self, play_id: &str, events: &[Value]) -> Result<usize, StoreError>;

    /// Write frames in one batch; a frame replaces any stored frame with the
    /// same `seq`. Returns the number written.
    async fn write_frames(&self, play_id: &str, frames: &[RawFrame]) -> Result<usize, StoreError>;

    async fn list_events(&self, play_id: &str) -> Result<Vec<Value>, StoreError>;

    /// Stored frames ordered by `seq`.
    async fn list_frames(&self, play_id: &str) -> Result<Vec<RawFrame>, StoreError>;

    async fn list_ranges(&self, play_id: &str) -> Result<Vec<RangeEntry>, StoreError>;

    async fn get_range(
        &self,
        play_id: &str,
        key: &RangeKey,
    ) -> Result<Option<Versioned<RangeSummary>>, StoreError>;

    /// Write `summary` only if the stored version still equals `expected`
    /// (`None` = the key must not exist yet). Returns whether it was written.
    async fn compare_and_set_range(
        &self,
        play_id: &str,
        key: &RangeKey,
        expected: Option<u64>,
        summary: &RangeSummary,
    ) -> Result<bool, StoreError>;

    /// Delete a play and everything below it. Returns whether it existed.
    async fn delete_play(&self, play_id: &str) -> Result<bool, StoreError>;
}
