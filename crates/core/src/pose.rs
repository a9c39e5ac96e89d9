//! Pose landmark samples produced by the (external) pose estimator.

use serde::{Deserialize, Serialize};

/// One normalized body landmark.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<f32>,
}

/// The latest estimator output the host polls each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseSample {
    pub landmarks: Vec<Landmark>,
    /// Capture time in client milliseconds.
    pub captured_at_ms: i64,
}
