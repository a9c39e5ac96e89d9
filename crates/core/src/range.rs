//! Sequence-range summaries per (level, repetition, state type).
//!
//! A [`RangeSummary`] lets readers locate the frames of one stage of one
//! repetition without scanning the raw frame log. Summaries only grow:
//! `min_seq` never increases, `max_seq` never decreases and `count` only
//! accumulates. `count` tracks frames merged, not the span, so gaps and
//! redelivered batches both show up in it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::keys::sanitize_value_key;
use crate::telemetry::RawFrame;
use crate::types::Timestamp;

/// Sanitized (level, repetition, state type) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RangeKey {
    pub level: String,
    pub rep: String,
    pub state: String,
}

impl RangeKey {
    pub fn new(level: &str, rep: &str, state: &str) -> Self {
        Self {
            level: crate::keys::sanitize_key(level),
            rep: crate::keys::sanitize_key(rep),
            state: crate::keys::sanitize_key(state),
        }
    }

    /// Derive the key from a received frame object.
    pub fn from_frame(frame: &Map<String, Value>) -> Self {
        Self {
            level: sanitize_value_key(frame.get("levelIndex")),
            rep: sanitize_value_key(frame.get("repIndex")),
            state: sanitize_value_key(frame.get("stateType")),
        }
    }

    /// Hierarchical path below `plays/{id}/ranges`.
    pub fn path(&self) -> String {
        format!("{}/{}/{}", self.level, self.rep, self.state)
    }
}

/// Min/max/count of the frames of one key within a single batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRange {
    pub min: u64,
    pub max: u64,
    pub count: u64,
}

impl BatchRange {
    fn first(seq: u64) -> Self {
        Self {
            min: seq,
            max: seq,
            count: 1,
        }
    }

    fn observe(&mut self, seq: u64) {
        self.min = self.min.min(seq);
        self.max = self.max.max(seq);
        self.count += 1;
    }
}

/// Fold a batch of accepted frames into per-key ranges.
pub fn fold_frames(frames: &[RawFrame]) -> BTreeMap<RangeKey, BatchRange> {
    let mut ranges: BTreeMap<RangeKey, BatchRange> = BTreeMap::new();
    for frame in frames {
        ranges
            .entry(frame.range_key.clone())
            .and_modify(|r| r.observe(frame.seq))
            .or_insert_with(|| BatchRange::first(frame.seq));
    }
    ranges
}

/// Persisted summary for one [`RangeKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeSummary {
    pub min_seq: u64,
    pub max_seq: u64,
    pub count: u64,
    pub updated_at: Timestamp,
}

impl RangeSummary {
    /// Merge a batch into an existing summary (or start a new one).
    pub fn merged(existing: Option<&RangeSummary>, batch: &BatchRange, now: Timestamp) -> Self {
        match existing {
            Some(current) => Self {
                min_seq: current.min_seq.min(batch.min),
                max_seq: current.max_seq.max(batch.max),
                count: current.count + batch.count,
                updated_at: now,
            },
            None => Self {
                min_seq: batch.min,
                max_seq: batch.max,
                count: batch.count,
                updated_at: now,
            },
        }
    }
}
