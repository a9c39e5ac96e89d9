//! In-memory [`PlayStore`] for tests and single-process deployments.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use posematch_core::play::{MediaRecord, PlaySession};
use posematch_core::range::{RangeKey, RangeSummary};
use posematch_core::telemetry::RawFrame;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::store::{InsertOutcome, PlayStore, RangeEntry, StoreError, Versioned};

/// Everything stored below one play.
#[derive(Debug)]
struct PlayRecord {
    session: PlaySession,
    events: Vec<Value>,
    frames: BTreeMap<u64, RawFrame>,
    /// Locked apart from the play map so range CAS only needs a read lock
    /// on it. Never held across an await.
    ranges: Mutex<BTreeMap<RangeKey, Versioned<RangeSummary>>>,
}

impl PlayRecord {
    fn new(session: PlaySession) -> Self {
        Self {
            session,
            events: Vec::new(),
            frames: BTreeMap::new(),
            ranges: Mutex::new(BTreeMap::new()),
        }
    }

    fn ranges(&self) -> std::sync::MutexGuard<'_, BTreeMap<RangeKey, Versioned<RangeSummary>>> {
        self.ranges.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// HashMap-backed store. Each play's children live inside its record, so
/// deleting the record is the cascade.
///
/// Play creation, deletion and event/frame/media writes take the map's
/// write lock. Range CAS takes a read lock plus the play's own range lock,
/// so merges into different plays proceed in parallel while merges within
/// one play are serialized.
#[derive(Debug, Default)]
pub struct MemoryStore {
    plays: RwLock<HashMap<String, PlayRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(play_id: &str) -> StoreError {
    StoreError::MissingPlay(play_id.to_string())
}

#[async_trait]
impl PlayStore for MemoryStore {
    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn insert_play_if_absent(&self, play: &PlaySession) -> Result<InsertOutcome, StoreError> {
        let mut plays = self.plays.write().await;
        if let Some(existing) = plays.get(&play.play_id) {
            return Ok(InsertOutcome::Existing(existing.session.clone()));
        }
        plays.insert(play.play_id.clone(), PlayRecord::new(play.clone()));
        Ok(InsertOutcome::Inserted)
    }

    async fn get_play(&self, play_id: &str) -> Result<Option<PlaySession>, StoreError> {
        let plays = self.plays.read().await;
        Ok(plays.get(play_id).map(|r| r.session.clone()))
    }

    async fn set_media(&self, play_id: &str, media: &MediaRecord) -> Result<(), StoreError> {
        let mut plays = self.plays.write().await;
        let record = plays.get_mut(play_id).ok_or_else(|| missing(play_id))?;
        record.session.media = Some(media.clone());
        Ok(())
    }

    async fn append_events(&self, play_id: &str, events: &[Value]) -> Result<usize, StoreError> {
        let mut plays = self.plays.write().await;
        let record = plays.get_mut(play_id).ok_or_else(|| missing(play_id))?;
        record.events.extend_from_slice(events);
        Ok(events.len())
    }

    async fn write_frames(&self, play_id: &str, frames: &[RawFrame]) -> Result<usize, StoreError> {
        let mut plays = self.plays.write().await;
        let record = plays.get_mut(play_id).ok_or_else(|| missing(play_id))?;
        for frame in frames {
            record.frames.insert(frame.seq, frame.clone());
        }
        Ok(frames.len())
    }

    async fn list_events(&self, play_id: &str) -> Result<Vec<Value>, StoreError> {
        let plays = self.plays.read().await;
        Ok(plays
            .get(play_id)
            .map(|r| r.events.clone())
            .unwrap_or_default())
    }

    async fn list_frames(&self, play_id: &str) -> Result<Vec<RawFrame>, StoreError> {
        let plays = self.plays.read().await;
        Ok(plays
            .get(play_id)
            .map(|r| r.frames.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_ranges(&self, play_id: &str) -> Result<Vec<RangeEntry>, StoreError> {
        let plays = self.plays.read().await;
        Ok(plays
            .get(play_id)
            .map(|r| {
                r.ranges()
                    .iter()
                    .map(|(key, v)| RangeEntry {
                        key: key.clone(),
                        summary: v.data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_range(
        &self,
        play_id: &str,
        key: &RangeKey,
    ) -> Result<Option<Versioned<RangeSummary>>, StoreError> {
        let plays = self.plays.read().await;
        Ok(plays.get(play_id).and_then(|r| r.ranges().get(key).cloned()))
    }

    async fn compare_and_set_range(
        &self,
        play_id: &str,
        key: &RangeKey,
        expected: Option<u64>,
        summary: &RangeSummary,
    ) -> Result<bool, StoreError> {
        let plays = self.plays.read().await;
        let record = plays.get(play_id).ok_or_else(|| missing(play_id))?;
        let mut ranges = record.ranges();

        let current = ranges.get(key).map(|v| v.version);
        if current != expected {
            return Ok(false);
        }
        ranges.insert(
            key.clone(),
            Versioned {
                data: summary.clone(),
                version: expected.map_or(1, |v| v + 1),
            },
        );
        Ok(true)
    }

    async fn delete_play(&self, play_id: &str) -> Result<bool, StoreError> {
        let mut plays = self.plays.write().await;
        Ok(plays.remove(play_id).is_some())
    }
}
