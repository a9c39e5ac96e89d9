//! Per-stage-type controllers.
//!
//! Every controller implements [`NodeController`]; all four operations are
//! optional and default to "no change, no effects". Controllers are pure:
//! they take the session by value and hand it back together with the
//! effects they request.
//!
//! - [`dialogue::DialogueController`] -- intro and outro stages.
//! - [`insight::InsightController`] -- insight cards.
//! - [`pose_match::PoseMatchController`] -- the pose-matching challenge.
//! - [`NoopController`] -- anything else; skipped on entry.

pub mod dialogue;
pub mod insight;
pub mod pose_match;

use crate::matcher::NormalizedDistance;
use crate::node::{StageNode, StateType};
use crate::session::{Command, Effect, StageSession, TickInfo};

use self::dialogue::DialogueController;
use self::insight::InsightController;
use self::pose_match::PoseMatchController;

/// Result of a controller call.
#[derive(Debug)]
pub struct Step {
    pub session: StageSession,
    pub effects: Vec<Effect>,
}

impl Step {
    /// No effects.
    pub fn new(session: StageSession) -> Self {
        Self {
            session,
            effects: Vec::new(),
        }
    }

    pub fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    /// Request leaving the active node, at most once per node.
    pub fn advance(mut self) -> Self {
        if !self.session.advance_requested {
            self.session.advance_requested = true;
            let from_index = self.session.node_index;
            self.effects.push(Effect::Advance { from_index });
        }
        self
    }
}

/// Lifecycle contract shared by all stage controllers.
pub trait NodeController: Send + Sync {
    fn enter(&self, session: StageSession, _node: &StageNode) -> Step {
        Step::new(session)
    }

    fn exit(&self, session: StageSession, _node: &StageNode) -> Step {
        Step::new(session)
    }

    fn update(&self, session: StageSession, _node: &StageNode, _tick: &TickInfo) -> Step {
        Step::new(session)
    }

    fn handle_command(&self, session: StageSession, _node: &StageNode, _command: Command) -> Step {
        Step::new(session)
    }
}

/// Controller for unrecognised stage types. It has nothing to run, so it
/// asks to leave as soon as it is entered; everything else is a no-op.
#[derive(Debug, Default)]
pub struct NoopController;

impl NodeController for NoopController {
    fn enter(&self, session: StageSession, _node: &StageNode) -> Step {
        tracing::warn!(
            node_index = session.node_index,
            "Skipping stage node of unrecognised type"
        );
        Step::new(session).advance()
    }
}

static DIALOGUE: DialogueController = DialogueController;
static INSIGHT: InsightController = InsightController;
static POSE_MATCH: PoseMatchController<NormalizedDistance> =
    PoseMatchController::new(NormalizedDistance);
static NOOP: NoopController = NoopController;

/// Resolve the controller for a stage type.
pub fn controller_for(state_type: StateType) -> &'static dyn NodeController {
    match state_type {
        StateType::Intro | StateType::Outro => &DIALOGUE,
        StateType::Insight => &INSIGHT,
        StateType::PoseMatch => &POSE_MATCH,
        StateType::Unknown => &NOOP,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_requested_once_per_node() {
        let session = StageSession {
            node_index: 3,
            ..StageSession::default()
        };
        let step = Step::new(session).advance().advance();
        assert_eq!(step.effects, vec![Effect::Advance { from_index: 3 }]);
        assert!(step.session.advance_requested);
    }

    #[test]
    fn unknown_nodes_request_advance_on_entry_only() {
        let controller = controller_for(StateType::Unknown);
        let session = StageSession {
            node_index: 2,
            ..StageSession::default()
        };
        let entered = controller.enter(session, &StageNode::Unknown);
        assert_eq!(entered.effects, vec![Effect::Advance { from_index: 2 }]);

        let step = controller.handle_command(entered.session, &StageNode::Unknown, Command::Next);
        assert!(step.effects.is_empty());
    }
}
