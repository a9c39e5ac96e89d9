//! The session state machine.
//!
//! Holds the level's ordered stage nodes, the active index and the effect
//! queue. One state per node plus an implicit terminal state once the last
//! node has exited (`node_index == node count`).
//!
//! Transition discipline:
//!
//! 1. `enter` runs when a node becomes active (after its shape check).
//! 2. `update` runs on every host tick while the node is active.
//! 3. `handle_command` runs for discrete commands.
//! 4. `exit` runs before the index moves on; then the next node is entered.
//!
//! The machine frames every node with `state_enter` / `state_exit` events so
//! downstream telemetry can be cut per stage.

use posematch_core::telemetry::{EVENT_LEVEL_COMPLETE, EVENT_STATE_ENTER, EVENT_STATE_EXIT};
use serde_json::json;

use crate::controllers::{controller_for, NodeController, Step};
use crate::error::StageError;
use crate::node::StageNode;
use crate::session::{Command, Effect, StageSession, TickInfo};

/// What an advance request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// The node at this index is now active.
    Entered(usize),
    /// The last node exited; the level is complete.
    Completed,
    /// The request referred to a node that is no longer active.
    Stale,
}

#[derive(Debug)]
pub struct StageMachine {
    session: StageSession,
    /// Index of the node whose `enter` ran and whose `exit` has not.
    active: Option<usize>,
    started: bool,
}

impl StageMachine {
    pub fn new(level_index: u32, nodes: Vec<StageNode>) -> Self {
        Self {
            session: StageSession {
                level_index,
                level_state_nodes: nodes,
                ..StageSession::default()
            },
            active: None,
            started: false,
        }
    }

    pub fn session(&self) -> &StageSession {
        &self.session
    }

    pub fn node_index(&self) -> usize {
        self.session.node_index
    }

    /// The node that is currently entered, if any.
    pub fn active_node(&self) -> Option<&StageNode> {
        self.active
            .and_then(|index| self.session.level_state_nodes.get(index))
    }

    pub fn is_complete(&self) -> bool {
        self.started && self.session.node_index >= self.session.level_state_nodes.len()
    }

    /// Enter node 0 (or complete immediately for an empty level).
    pub fn start(&mut self) -> Result<AdvanceOutcome, StageError> {
        if self.started {
            return Err(StageError::AlreadyStarted);
        }
        self.started = true;
        self.session.node_index = 0;
        self.enter_current()
    }

    /// Forward a host tick to the active controller.
    pub fn update(&mut self, tick: &TickInfo) -> Result<(), StageError> {
        let node = self.active_node().cloned().ok_or(StageError::NoActiveNode)?;
        self.invoke(&node, |controller, session| {
            controller.update(session, &node, tick)
        });
        Ok(())
    }

    /// Forward a discrete command to the active controller.
    pub fn handle_command(&mut self, command: Command) -> Result<(), StageError> {
        let node = self.active_node().cloned().ok_or(StageError::NoActiveNode)?;
        tracing::debug!(
            command = command.as_str(),
            node_index = self.session.node_index,
            "Stage command"
        );
        self.invoke(&node, |controller, session| {
            controller.handle_command(session, &node, command)
        });
        Ok(())
    }

    /// Exit the node at `from_index` and enter the next one.
    ///
    /// Requests for any index other than the active one are ignored so a
    /// late `Advance` effect can never re-enter or skip a node.
    pub fn advance_from(&mut self, from_index: usize) -> Result<AdvanceOutcome, StageError> {
        if self.active != Some(from_index) {
            tracing::debug!(
                from_index,
                active = ?self.active,
                "Ignoring stale advance request"
            );
            return Ok(AdvanceOutcome::Stale);
        }

        let node = self.session.level_state_nodes[from_index].clone();
        self.invoke(&node, |controller, session| controller.exit(session, &node));
        self.push(Effect::event(
            EVENT_STATE_EXIT,
            json!({
                "stateType": node.state_type().as_str(),
                "nodeIndex": from_index,
                "levelIndex": self.session.level_index,
            }),
        ));
        self.active = None;

        self.session.node_index = from_index + 1;
        self.enter_current()
    }

    /// Hand the accumulated effects to the host, in call order.
    pub fn drain_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.session.effects)
    }

    fn enter_current(&mut self) -> Result<AdvanceOutcome, StageError> {
        let index = self.session.node_index;
        let Some(node) = self.session.level_state_nodes.get(index).cloned() else {
            tracing::info!(level_index = self.session.level_index, "Level complete");
            self.push(Effect::event(
                EVENT_LEVEL_COMPLETE,
                json!({
                    "levelIndex": self.session.level_index,
                    "nodeCount": self.session.level_state_nodes.len(),
                }),
            ));
            self.push(Effect::LevelComplete);
            return Ok(AdvanceOutcome::Completed);
        };

        node.check_shape().map_err(|reason| StageError::InvalidNode {
            index,
            state_type: node.state_type(),
            reason,
        })?;

        self.session.rep_index = 0;
        self.session.node_state = Default::default();
        self.session.advance_requested = false;
        self.active = Some(index);

        tracing::debug!(
            node_index = index,
            state_type = %node.state_type(),
            "Entering stage node"
        );
        self.push(Effect::event(
            EVENT_STATE_ENTER,
            json!({
                "stateType": node.state_type().as_str(),
                "nodeIndex": index,
                "levelIndex": self.session.level_index,
            }),
        ));
        self.invoke(&node, |controller, session| controller.enter(session, &node));
        Ok(AdvanceOutcome::Entered(index))
    }

    fn invoke<F>(&mut self, node: &StageNode, call: F)
    where
        F: FnOnce(&dyn NodeController, StageSession) -> Step,
    {
        let controller = controller_for(node.state_type());
        let session = std::mem::take(&mut self.session);
        let Step {
            mut session,
            effects,
        } = call(controller, session);
        session.effects.extend(effects);
        self.session = session;
    }

    fn push(&mut self, effect: Effect) {
        self.session.effects.push(effect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{DialogueNode, PoseMatchNode};

    #[test]
    fn empty_level_completes_on_start() {
        let mut machine = StageMachine::new(0, Vec::new());
        assert_eq!(machine.start(), Ok(AdvanceOutcome::Completed));
        assert!(machine.is_complete());
        assert!(machine.drain_effects().contains(&Effect::LevelComplete));
    }

    #[test]
    fn invalid_first_node_is_not_entered() {
        let mut machine = StageMachine::new(0, vec![StageNode::PoseMatch(PoseMatchNode::default())]);
        let err = machine.start().unwrap_err();
        assert_matches::assert_matches!(err, StageError::InvalidNode { index: 0, .. });
        assert!(machine.active_node().is_none());
        assert!(machine.drain_effects().is_empty());
        assert_eq!(
            machine.update(&TickInfo::default()),
            Err(StageError::NoActiveNode)
        );
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut machine = StageMachine::new(
            0,
            vec![StageNode::Intro(DialogueNode {
                lines: vec!["hi".into()],
                speaker: None,
            })],
        );
        machine.start().unwrap();
        assert_eq!(machine.start(), Err(StageError::AlreadyStarted));
    }
}
