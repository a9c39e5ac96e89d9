//! Insight cards.

use super::{NodeController, Step};
use crate::node::StageNode;
use crate::session::{Command, NodeState, StageSession, TickInfo};

/// Advances on `next`/`complete`, or by itself once `duration_ms` elapses.
#[derive(Debug, Default)]
pub struct InsightController;

impl NodeController for InsightController {
    fn enter(&self, mut session: StageSession, _node: &StageNode) -> Step {
        session.node_state = NodeState::Insight { elapsed_ms: 0 };
        Step::new(session)
    }

    fn update(&self, mut session: StageSession, node: &StageNode, tick: &TickInfo) -> Step {
        let StageNode::Insight(insight) = node else {
            return Step::new(session);
        };
        let elapsed = match session.node_state {
            NodeState::Insight { elapsed_ms } => elapsed_ms + tick.dt_ms,
            _ => tick.dt_ms,
        };
        session.node_state = NodeState::Insight { elapsed_ms: elapsed };

        match insight.duration_ms {
            Some(duration) if elapsed >= duration => Step::new(session).advance(),
            _ => Step::new(session),
        }
    }

    fn handle_command(&self, session: StageSession, _node: &StageNode, command: Command) -> Step {
        match command {
            Command::Next | Command::Complete => Step::new(session).advance(),
            Command::Retry => Step::new(session),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::InsightNode;
    use crate::session::Effect;

    #[test]
    fn timed_insight_advances_once_after_duration() {
        let node = StageNode::Insight(InsightNode {
            text: "slow down".into(),
            duration_ms: Some(100),
        });
        let tick = TickInfo {
            dt_ms: 60,
            ..TickInfo::default()
        };

        let step = InsightController.enter(StageSession::default(), &node);
        let step = InsightController.update(step.session, &node, &tick);
        assert!(step.effects.is_empty());

        let step = InsightController.update(step.session, &node, &tick);
        assert_eq!(step.effects, vec![Effect::Advance { from_index: 0 }]);

        let step = InsightController.update(step.session, &node, &tick);
        assert!(step.effects.is_empty(), "advance must not repeat");
    }

    #[test]
    fn untimed_insight_waits_for_next() {
        let node = StageNode::Insight(InsightNode {
            text: "hold still".into(),
            duration_ms: None,
        });
        let tick = TickInfo {
            dt_ms: 10_000,
            ..TickInfo::default()
        };
        let step = InsightController.update(StageSession::default(), &node, &tick);
        assert!(step.effects.is_empty());

        let step = InsightController.handle_command(step.session, &node, Command::Next);
        assert_eq!(step.effects.len(), 1);
    }
}
