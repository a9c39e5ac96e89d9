//! Telemetry wire types shared by the client bus and the ingestion API.
//!
//! Clients send strongly typed [`TelemetryEvent`]s and [`PoseFrame`]s. The
//! server deliberately accepts both batches as raw JSON so a single
//! malformed frame never rejects the rest of a batch; [`parse_frame`]
//! decides which frames are stored and aggregated.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::range::RangeKey;
use crate::types::Timestamp;

/// Frame type for per-tick pose landmark captures.
pub const FRAME_TYPE_POSE: &str = "pose";

/// Frame types that participate in storage and aggregation.
pub const RECOGNIZED_FRAME_TYPES: &[&str] = &[FRAME_TYPE_POSE];

// ---------------------------------------------------------------------------
// Event names produced by the stage machine
// ---------------------------------------------------------------------------

pub const EVENT_STATE_ENTER: &str = "state_enter";
pub const EVENT_STATE_EXIT: &str = "state_exit";
pub const EVENT_LEVEL_COMPLETE: &str = "level_complete";
pub const EVENT_DIALOGUE_LINE: &str = "dialogue_line";
pub const EVENT_POSE_MATCHED: &str = "pose_matched";
pub const EVENT_REP_COMPLETE: &str = "rep_complete";
pub const EVENT_RETRY: &str = "retry";
pub const EVENT_SKIPPED: &str = "skipped";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// An immutable fact about something that happened during play.
///
/// `timestamp` is client wall-clock milliseconds and purely advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: i64,
    #[serde(default)]
    pub payload: Value,
}

/// One motion-capture frame as the client sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub frame_type: String,
    pub state_type: String,
    pub level_index: u32,
    pub rep_index: u32,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Body of `POST /plays/{id}/events` as the client builds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsBatch {
    pub events: Vec<TelemetryEvent>,
}

/// Body of `POST /plays/{id}/frames` as the client builds it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FramesBatch {
    pub frames: Vec<PoseFrame>,
}

/// Response of `POST /plays/{id}/events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestEventsResponse {
    pub wrote: usize,
}

/// Response of `POST /plays/{id}/frames`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestFramesResponse {
    pub wrote: usize,
    pub updated_ranges: usize,
}

// ---------------------------------------------------------------------------
// Server-side frame records
// ---------------------------------------------------------------------------

/// A frame accepted for storage, keyed by its `seq` within the play.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawFrame {
    pub seq: u64,
    pub frame_type: String,
    pub range_key: RangeKey,
    /// The frame object exactly as received.
    pub body: Value,
    /// Server time of record.
    pub created_at: Timestamp,
}

/// Largest `seq` a stored frame may carry. Storage keys are signed 64-bit.
pub const MAX_FRAME_SEQ: u64 = i64::MAX as u64;

/// Accept a received frame if it has an integer `seq` no larger than
/// [`MAX_FRAME_SEQ`] and a recognised `frameType`; anything else is
/// skipped by the caller.
pub fn parse_frame(value: &Value, created_at: Timestamp) -> Option<RawFrame> {
    let obj = value.as_object()?;
    let seq = obj.get("seq")?.as_u64()?;
    if seq > MAX_FRAME_SEQ {
        return None;
    }
    let frame_type = obj.get("frameType")?.as_str()?;
    if !RECOGNIZED_FRAME_TYPES.contains(&frame_type) {
        return None;
    }

    Some(RawFrame {
        seq,
        frame_type: frame_type.to_string(),
        range_key: RangeKey::from_frame(obj),
        body: value.clone(),
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn frame_with_numeric_seq_is_accepted() {
        let frame = json!({
            "seq": 7, "frameType": "pose", "stateType": "poseMatch",
            "levelIndex": 0, "repIndex": 1, "payload": {}
        });
        let raw = parse_frame(&frame, Utc::now()).expect("frame should be accepted");
        assert_eq!(raw.seq, 7);
        assert_eq!(raw.range_key.level, "0");
        assert_eq!(raw.range_key.rep, "1");
        assert_eq!(raw.range_key.state, "poseMatch");
        assert_eq!(raw.body, frame);
    }

    #[test]
    fn frame_with_string_seq_is_skipped() {
        let frame = json!({ "seq": "7", "frameType": "pose" });
        assert!(parse_frame(&frame, Utc::now()).is_none());
    }

    #[test]
    fn frame_with_fractional_or_negative_seq_is_skipped() {
        assert!(parse_frame(&json!({ "seq": 1.5, "frameType": "pose" }), Utc::now()).is_none());
        assert!(parse_frame(&json!({ "seq": -1, "frameType": "pose" }), Utc::now()).is_none());
    }

    #[test]
    fn seq_beyond_storage_range_is_skipped() {
        let at_limit = json!({ "seq": MAX_FRAME_SEQ, "frameType": "pose" });
        assert_eq!(parse_frame(&at_limit, Utc::now()).map(|f| f.seq), Some(MAX_FRAME_SEQ));

        let past_limit = json!({ "seq": MAX_FRAME_SEQ + 1, "frameType": "pose" });
        assert!(parse_frame(&past_limit, Utc::now()).is_none());
    }

    #[test]
    fn unknown_frame_type_is_skipped() {
        let frame = json!({ "seq": 1, "frameType": "audio" });
        assert!(parse_frame(&frame, Utc::now()).is_none());
    }

    #[test]
    fn client_frame_serializes_camel_case_without_missing_seq() {
        let frame = PoseFrame {
            seq: None,
            frame_type: FRAME_TYPE_POSE.into(),
            state_type: "poseMatch".into(),
            level_index: 2,
            rep_index: 0,
            payload: json!({}),
            timestamp: Some(10),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert!(value.get("seq").is_none());
        assert_eq!(value["levelIndex"], 2);
        assert_eq!(value["frameType"], "pose");
    }
}
