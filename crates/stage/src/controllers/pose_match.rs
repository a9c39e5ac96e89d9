//! The pose-matching challenge.
//!
//! Every tick with a pose sample produces one `pose` frame tagged with the
//! current level, repetition and state type. A pose counts as matched once
//! the score stays at or above the node threshold for `hold_ms`; matching
//! the whole list completes a repetition, and after `reps` repetitions the
//! node requests an advance.

use posematch_core::pose::PoseSample;
use posematch_core::telemetry::{
    PoseFrame, EVENT_POSE_MATCHED, EVENT_REP_COMPLETE, EVENT_RETRY, EVENT_SKIPPED,
    FRAME_TYPE_POSE,
};
use serde_json::json;

use super::{NodeController, Step};
use crate::matcher::PoseMatcher;
use crate::node::{PoseMatchNode, StageNode, StateType};
use crate::session::{Command, Effect, NodeState, StageSession, TickInfo};

pub struct PoseMatchController<M> {
    matcher: M,
}

impl<M: PoseMatcher> PoseMatchController<M> {
    pub const fn new(matcher: M) -> Self {
        Self { matcher }
    }
}

fn progress(session: &StageSession) -> (usize, u64) {
    match session.node_state {
        NodeState::PoseMatch {
            pose_index,
            held_ms,
        } => (pose_index, held_ms),
        _ => (0, 0),
    }
}

fn frame_for(session: &StageSession, sample: &PoseSample, pose_index: usize, score: f32) -> PoseFrame {
    PoseFrame {
        seq: None,
        frame_type: FRAME_TYPE_POSE.to_string(),
        state_type: StateType::PoseMatch.as_str().to_string(),
        level_index: session.level_index,
        rep_index: session.rep_index,
        payload: json!({
            "poseIndex": pose_index,
            "score": score,
            "capturedAtMs": sample.captured_at_ms,
            "landmarks": sample.landmarks,
        }),
        timestamp: None,
    }
}

/// Move past the current pose, completing the repetition or the node when
/// the list runs out.
fn finish_pose(mut step: Step, node: &PoseMatchNode, pose_index: usize) -> Step {
    let next = pose_index + 1;
    if next < node.poses.len() {
        step.session.node_state = NodeState::PoseMatch {
            pose_index: next,
            held_ms: 0,
        };
        return step;
    }

    let rep = step.session.rep_index;
    step = step.with(Effect::event(EVENT_REP_COMPLETE, json!({ "rep": rep })));
    if rep + 1 >= node.reps {
        step.session.node_state = NodeState::PoseMatch {
            pose_index,
            held_ms: 0,
        };
        return step.advance();
    }

    step.session.rep_index = rep + 1;
    step.session.node_state = NodeState::PoseMatch {
        pose_index: 0,
        held_ms: 0,
    };
    step
}

impl<M: PoseMatcher> NodeController for PoseMatchController<M> {
    fn enter(&self, mut session: StageSession, _node: &StageNode) -> Step {
        session.rep_index = 0;
        session.node_state = NodeState::PoseMatch {
            pose_index: 0,
            held_ms: 0,
        };
        Step::new(session)
    }

    fn update(&self, session: StageSession, node: &StageNode, tick: &TickInfo) -> Step {
        let StageNode::PoseMatch(pm) = node else {
            return Step::new(session);
        };
        if session.advance_requested {
            return Step::new(session);
        }
        let Some(sample) = &tick.pose else {
            return Step::new(session);
        };

        let (pose_index, held_ms) = progress(&session);
        let Some(target) = pm.poses.get(pose_index) else {
            return Step::new(session);
        };

        let score = self.matcher.score(sample, target);
        let frame = frame_for(&session, sample, pose_index, score);
        let mut step = Step::new(session).with(Effect::RecordFrame(frame));

        let held = if score >= pm.threshold {
            held_ms + tick.dt_ms
        } else {
            0
        };

        if held < pm.hold_ms {
            step.session.node_state = NodeState::PoseMatch {
                pose_index,
                held_ms: held,
            };
            return step;
        }

        let rep = step.session.rep_index;
        step = step.with(Effect::event(
            EVENT_POSE_MATCHED,
            json!({ "poseIndex": pose_index, "rep": rep, "heldMs": held }),
        ));
        finish_pose(step, pm, pose_index)
    }

    fn handle_command(&self, mut session: StageSession, node: &StageNode, command: Command) -> Step {
        let StageNode::PoseMatch(pm) = node else {
            return Step::new(session);
        };
        let (pose_index, _) = progress(&session);

        match command {
            Command::Next => {
                let rep = session.rep_index;
                let step = Step::new(session).with(Effect::event(
                    EVENT_SKIPPED,
                    json!({ "poseIndex": pose_index, "rep": rep }),
                ));
                finish_pose(step, pm, pose_index)
            }
            Command::Retry => {
                let rep = session.rep_index;
                session.node_state = NodeState::PoseMatch {
                    pose_index: 0,
                    held_ms: 0,
                };
                Step::new(session).with(Effect::event(EVENT_RETRY, json!({ "rep": rep })))
            }
            Command::Complete => Step::new(session).advance(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::NormalizedDistance;
    use crate::node::TargetPose;
    use posematch_core::pose::Landmark;

    const CONTROLLER: PoseMatchController<NormalizedDistance> =
        PoseMatchController::new(NormalizedDistance);

    fn pose(x: f32) -> TargetPose {
        TargetPose {
            name: None,
            landmarks: vec![Landmark { x, y: 0.5, z: 0.0, visibility: None }],
        }
    }

    fn sample(x: f32) -> PoseSample {
        PoseSample {
            landmarks: vec![Landmark { x, y: 0.5, z: 0.0, visibility: None }],
            captured_at_ms: 1,
        }
    }

    fn node(reps: u32) -> StageNode {
        StageNode::PoseMatch(PoseMatchNode {
            poses: vec![pose(0.2), pose(0.8)],
            hold_ms: 100,
            threshold: 0.9,
            reps,
        })
    }

    fn tick(x: f32) -> TickInfo {
        TickInfo {
            dt_ms: 100,
            now_ms: 0,
            pose: Some(sample(x)),
        }
    }

    fn has_event(step: &Step, name: &str) -> bool {
        step.effects
            .iter()
            .any(|e| matches!(e, Effect::EmitEvent { event_type, .. } if event_type == name))
    }

    #[test]
    fn each_sample_records_a_tagged_frame() {
        let n = node(1);
        let mut session = StageSession {
            level_index: 3,
            ..StageSession::default()
        };
        session = CONTROLLER.enter(session, &n).session;

        let step = CONTROLLER.update(session, &n, &tick(0.6));
        let frames: Vec<_> = step
            .effects
            .iter()
            .filter_map(|e| match e {
                Effect::RecordFrame(f) => Some(f),
                _ => None,
            })
            .collect();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].level_index, 3);
        assert_eq!(frames[0].rep_index, 0);
        assert_eq!(frames[0].state_type, "poseMatch");
        assert!(frames[0].seq.is_none());
    }

    #[test]
    fn held_match_moves_to_next_pose() {
        let n = node(1);
        let session = CONTROLLER.enter(StageSession::default(), &n).session;
        let step = CONTROLLER.update(session, &n, &tick(0.2));
        assert!(has_event(&step, EVENT_POSE_MATCHED));
        assert_eq!(
            step.session.node_state,
            NodeState::PoseMatch { pose_index: 1, held_ms: 0 }
        );
    }

    #[test]
    fn mismatch_resets_hold() {
        let n = StageNode::PoseMatch(PoseMatchNode {
            poses: vec![pose(0.2)],
            hold_ms: 300,
            threshold: 0.9,
            reps: 1,
        });
        let session = CONTROLLER.enter(StageSession::default(), &n).session;
        let step = CONTROLLER.update(session, &n, &tick(0.2));
        assert_eq!(
            step.session.node_state,
            NodeState::PoseMatch { pose_index: 0, held_ms: 100 }
        );
        let step = CONTROLLER.update(step.session, &n, &tick(0.9));
        assert_eq!(
            step.session.node_state,
            NodeState::PoseMatch { pose_index: 0, held_ms: 0 }
        );
    }

    #[test]
    fn completing_all_reps_requests_advance() {
        let n = node(2);
        let mut session = CONTROLLER.enter(StageSession::default(), &n).session;

        for x in [0.2, 0.8] {
            session = CONTROLLER.update(session, &n, &tick(x)).session;
        }
        assert_eq!(session.rep_index, 1);
        assert!(!session.advance_requested);

        let step = CONTROLLER.update(session, &n, &tick(0.2));
        let step = CONTROLLER.update(step.session, &n, &tick(0.8));
        assert!(has_event(&step, EVENT_REP_COMPLETE));
        assert!(step.effects.contains(&Effect::Advance { from_index: 0 }));
        assert_eq!(step.session.rep_index, 1);
    }

    #[test]
    fn retry_restarts_the_pose_list() {
        let n = node(1);
        let session = CONTROLLER.enter(StageSession::default(), &n).session;
        let session = CONTROLLER.update(session, &n, &tick(0.2)).session;
        let step = CONTROLLER.handle_command(session, &n, Command::Retry);
        assert!(has_event(&step, EVENT_RETRY));
        assert_eq!(
            step.session.node_state,
            NodeState::PoseMatch { pose_index: 0, held_ms: 0 }
        );
    }

    #[test]
    fn complete_requests_advance_immediately() {
        let n = node(3);
        let session = CONTROLLER.enter(StageSession::default(), &n).session;
        let step = CONTROLLER.handle_command(session, &n, Command::Complete);
        assert_eq!(step.effects, vec![Effect::Advance { from_index: 0 }]);
    }
}
