//! Stage node definitions.
//!
//! A level is an ordered list of [`StageNode`]s. The `stateType` tag picks
//! the variant; unrecognised tags deserialize to [`StageNode::Unknown`] and
//! run under the no-op controller instead of failing the whole level.

use std::fmt;

use posematch_core::pose::Landmark;
use serde::{Deserialize, Serialize};

/// Default time a pose must be held before it counts as matched.
pub const DEFAULT_HOLD_MS: u64 = 1_000;

/// Default similarity score a sample must reach to count as matching.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.8;

/// Default number of repetitions of the pose list.
pub const DEFAULT_REPS: u32 = 1;

fn default_hold_ms() -> u64 {
    DEFAULT_HOLD_MS
}

fn default_threshold() -> f32 {
    DEFAULT_MATCH_THRESHOLD
}

fn default_reps() -> u32 {
    DEFAULT_REPS
}

// ---------------------------------------------------------------------------
// State type
// ---------------------------------------------------------------------------

/// Discriminator of a [`StageNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateType {
    Intro,
    Outro,
    Insight,
    PoseMatch,
    Unknown,
}

impl StateType {
    /// Wire name, as used in `stateType` fields and range keys.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intro => "intro",
            Self::Outro => "outro",
            Self::Insight => "insight",
            Self::PoseMatch => "poseMatch",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Node payloads
// ---------------------------------------------------------------------------

/// Dialogue shown during intro and outro stages.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogueNode {
    #[serde(default)]
    pub lines: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker: Option<String>,
}

/// A short explanatory card.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsightNode {
    #[serde(default)]
    pub text: String,
    /// Auto-advance after this much tick time; `None` waits for `next`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// One reference pose the player must reproduce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPose {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub landmarks: Vec<Landmark>,
}

/// The pose-matching challenge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoseMatchNode {
    #[serde(default)]
    pub poses: Vec<TargetPose>,
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    #[serde(default = "default_reps")]
    pub reps: u32,
}

impl Default for PoseMatchNode {
    fn default() -> Self {
        Self {
            poses: Vec::new(),
            hold_ms: DEFAULT_HOLD_MS,
            threshold: DEFAULT_MATCH_THRESHOLD,
            reps: DEFAULT_REPS,
        }
    }
}

// ---------------------------------------------------------------------------
// StageNode
// ---------------------------------------------------------------------------

/// One step of a level's script. Read-only to the machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stateType", rename_all = "camelCase")]
pub enum StageNode {
    Intro(DialogueNode),
    Outro(DialogueNode),
    Insight(InsightNode),
    PoseMatch(PoseMatchNode),
    #[serde(other)]
    Unknown,
}

impl StageNode {
    pub fn state_type(&self) -> StateType {
        match self {
            Self::Intro(_) => StateType::Intro,
            Self::Outro(_) => StateType::Outro,
            Self::Insight(_) => StateType::Insight,
            Self::PoseMatch(_) => StateType::PoseMatch,
            Self::Unknown => StateType::Unknown,
        }
    }

    /// Check the minimal shape a node needs before it may be entered.
    ///
    /// Returns the reason on failure; the machine attaches index and type.
    pub fn check_shape(&self) -> Result<(), String> {
        match self {
            Self::Intro(dialogue) | Self::Outro(dialogue) => {
                if dialogue.lines.is_empty() {
                    return Err("dialogue requires at least one line".into());
                }
            }
            Self::Insight(insight) => {
                if insight.text.trim().is_empty() {
                    return Err("insight requires text".into());
                }
            }
            Self::PoseMatch(pose_match) => {
                if pose_match.poses.is_empty() {
                    return Err("pose match requires a non-empty pose list".into());
                }
                if let Some(i) = pose_match.poses.iter().position(|p| p.landmarks.is_empty()) {
                    return Err(format!("pose {i} has no landmarks"));
                }
                if pose_match.reps == 0 {
                    return Err("reps must be at least 1".into());
                }
                if !(0.0..=1.0).contains(&pose_match.threshold) {
                    return Err("threshold must be within 0..=1".into());
                }
            }
            Self::Unknown => {}
        }
        Ok(())
    }
}
