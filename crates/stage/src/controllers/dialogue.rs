//! Intro and outro dialogue.

use posematch_core::telemetry::{EVENT_DIALOGUE_LINE, EVENT_SKIPPED};
use serde_json::json;

use super::{NodeController, Step};
use crate::node::{DialogueNode, StageNode};
use crate::session::{Command, Effect, NodeState, StageSession};

/// Steps through dialogue lines on `next`; advances after the last one.
#[derive(Debug, Default)]
pub struct DialogueController;

fn dialogue(node: &StageNode) -> Option<&DialogueNode> {
    match node {
        StageNode::Intro(d) | StageNode::Outro(d) => Some(d),
        _ => None,
    }
}

fn show_line(mut session: StageSession, node: &DialogueNode, line: usize) -> Step {
    session.node_state = NodeState::Dialogue { line };
    let payload = json!({
        "line": line,
        "text": node.lines.get(line),
        "speaker": node.speaker,
    });
    Step::new(session).with(Effect::event(EVENT_DIALOGUE_LINE, payload))
}

impl NodeController for DialogueController {
    fn enter(&self, session: StageSession, node: &StageNode) -> Step {
        match dialogue(node) {
            Some(d) => show_line(session, d, 0),
            None => Step::new(session),
        }
    }

    fn handle_command(&self, session: StageSession, node: &StageNode, command: Command) -> Step {
        let Some(d) = dialogue(node) else {
            return Step::new(session);
        };
        let current = match session.node_state {
            NodeState::Dialogue { line } => line,
            _ => 0,
        };

        match command {
            Command::Next => {
                let next = current + 1;
                if next < d.lines.len() {
                    show_line(session, d, next)
                } else {
                    Step::new(session).advance()
                }
            }
            Command::Retry => show_line(session, d, 0),
            Command::Complete => Step::new(session)
                .with(Effect::event(EVENT_SKIPPED, json!({ "line": current })))
                .advance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> StageNode {
        StageNode::Intro(DialogueNode {
            lines: vec!["one".into(), "two".into()],
            speaker: Some("coach".into()),
        })
    }

    #[test]
    fn enter_shows_first_line() {
        let step = DialogueController.enter(StageSession::default(), &node());
        assert_eq!(step.session.node_state, NodeState::Dialogue { line: 0 });
        assert_matches::assert_matches!(
            &step.effects[..],
            [Effect::EmitEvent { event_type, payload }]
                if event_type == EVENT_DIALOGUE_LINE && payload["text"] == "one"
        );
    }

    #[test]
    fn next_past_last_line_advances() {
        let n = node();
        let step = DialogueController.enter(StageSession::default(), &n);
        let step = DialogueController.handle_command(step.session, &n, Command::Next);
        assert_eq!(step.session.node_state, NodeState::Dialogue { line: 1 });

        let step = DialogueController.handle_command(step.session, &n, Command::Next);
        assert_eq!(step.effects, vec![Effect::Advance { from_index: 0 }]);
    }
}
