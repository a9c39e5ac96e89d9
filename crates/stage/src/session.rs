//! Runtime session state, tick input, commands and effects.

use std::str::FromStr;

use posematch_core::pose::PoseSample;
use posematch_core::telemetry::PoseFrame;
use serde_json::Value;

use crate::node::StageNode;

/// A side action requested by a controller or the machine.
///
/// Effects are data: the host drains and interprets them after every
/// machine call.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Record a discrete telemetry event.
    EmitEvent { event_type: String, payload: Value },
    /// Record a motion-capture frame (seq is assigned by the bus).
    RecordFrame(PoseFrame),
    /// Leave the node at `from_index` and enter the next one.
    Advance { from_index: usize },
    /// The last node has exited.
    LevelComplete,
}

impl Effect {
    pub fn event(event_type: &str, payload: Value) -> Self {
        Self::EmitEvent {
            event_type: event_type.to_string(),
            payload,
        }
    }
}

/// Per-node progress owned by the active controller.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NodeState {
    #[default]
    Idle,
    Dialogue {
        line: usize,
    },
    Insight {
        elapsed_ms: u64,
    },
    PoseMatch {
        pose_index: usize,
        held_ms: u64,
    },
}

/// Ephemeral state of one level play-through. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct StageSession {
    pub level_index: u32,
    pub level_state_nodes: Vec<StageNode>,
    pub node_index: usize,
    /// Current repetition within the active node (frame/range tag).
    pub rep_index: u32,
    pub node_state: NodeState,
    /// Set once the active node has requested an advance.
    pub advance_requested: bool,
    pub effects: Vec<Effect>,
}

/// Input for one host tick.
#[derive(Debug, Clone, Default)]
pub struct TickInfo {
    /// Milliseconds since the previous tick.
    pub dt_ms: u64,
    /// Client wall-clock milliseconds.
    pub now_ms: i64,
    /// Latest estimator output, if the pose source had one.
    pub pose: Option<PoseSample>,
}

/// Discrete user or host commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Next,
    Retry,
    Complete,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Retry => "retry",
            Self::Complete => "complete",
        }
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "next" => Ok(Self::Next),
            "retry" => Ok(Self::Retry),
            "complete" => Ok(Self::Complete),
            other => Err(format!(
                "Unknown command '{other}'. Must be one of: next, retry, complete"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_case_insensitively() {
        assert_eq!("Next".parse::<Command>(), Ok(Command::Next));
        assert_eq!(" retry ".parse::<Command>(), Ok(Command::Retry));
        assert_eq!("complete".parse::<Command>(), Ok(Command::Complete));
        assert!("jump".parse::<Command>().is_err());
    }
}
