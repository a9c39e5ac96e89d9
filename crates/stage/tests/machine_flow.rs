//! End-to-end stage machine flows driven the way a host drives them:
//! call, drain effects, apply `Advance` requests, repeat.

use assert_matches::assert_matches;
use posematch_core::pose::{Landmark, PoseSample};
use posematch_core::telemetry::{EVENT_LEVEL_COMPLETE, EVENT_STATE_ENTER, EVENT_STATE_EXIT};
use posematch_stage::node::{DialogueNode, InsightNode, PoseMatchNode, TargetPose};
use posematch_stage::{AdvanceOutcome, Command, Effect, StageMachine, StageNode, TickInfo};

fn landmark(x: f32) -> Landmark {
    Landmark {
        x,
        y: 0.5,
        z: 0.0,
        visibility: None,
    }
}

fn level() -> Vec<StageNode> {
    vec![
        StageNode::Intro(DialogueNode {
            lines: vec!["Welcome".into()],
            speaker: None,
        }),
        StageNode::PoseMatch(PoseMatchNode {
            poses: vec![TargetPose {
                name: Some("arms up".into()),
                landmarks: vec![landmark(0.3)],
            }],
            hold_ms: 1_000,
            threshold: 0.9,
            reps: 3,
        }),
        StageNode::Insight(InsightNode {
            text: "Nice work".into(),
            duration_ms: None,
        }),
        StageNode::Outro(DialogueNode {
            lines: vec!["Bye".into()],
            speaker: None,
        }),
    ]
}

/// Drain effects, applying advances; returns every drained effect.
fn pump(machine: &mut StageMachine) -> Vec<Effect> {
    let mut seen = Vec::new();
    loop {
        let effects = machine.drain_effects();
        if effects.is_empty() {
            return seen;
        }
        for effect in effects {
            if let Effect::Advance { from_index } = effect {
                machine.advance_from(from_index).expect("advance succeeds");
            }
            seen.push(effect);
        }
    }
}

fn event_names(effects: &[Effect]) -> Vec<String> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::EmitEvent { event_type, .. } => Some(event_type.clone()),
            _ => None,
        })
        .collect()
}

fn tick(x: f32) -> TickInfo {
    TickInfo {
        dt_ms: 33,
        now_ms: 0,
        pose: Some(PoseSample {
            landmarks: vec![landmark(x)],
            captured_at_ms: 0,
        }),
    }
}

#[test]
fn pose_match_completion_moves_to_next_node() {
    let mut machine = StageMachine::new(1, level());
    assert_eq!(machine.start(), Ok(AdvanceOutcome::Entered(0)));
    pump(&mut machine);

    machine.handle_command(Command::Next).unwrap();
    pump(&mut machine);
    assert_eq!(machine.node_index(), 1);

    for _ in 0..5 {
        machine.update(&tick(0.9)).unwrap();
    }
    let effects = pump(&mut machine);
    let frames = effects
        .iter()
        .filter(|e| matches!(e, Effect::RecordFrame(_)))
        .count();
    assert_eq!(frames, 5);
    assert_eq!(machine.node_index(), 1, "unmatched ticks must not advance");

    machine.handle_command(Command::Complete).unwrap();
    let effects = pump(&mut machine);
    assert_eq!(machine.node_index(), 2);
    assert_eq!(
        event_names(&effects),
        vec![EVENT_STATE_EXIT.to_string(), EVENT_STATE_ENTER.to_string()]
    );
    assert_matches!(machine.active_node(), Some(StageNode::Insight(_)));
}

#[test]
fn stale_advance_does_not_reenter() {
    let mut machine = StageMachine::new(0, level());
    machine.start().unwrap();
    machine.drain_effects();

    machine.handle_command(Command::Complete).unwrap();
    machine.handle_command(Command::Complete).unwrap();
    let effects = machine.drain_effects();
    let advances: Vec<_> = effects
        .iter()
        .filter(|e| matches!(e, Effect::Advance { .. }))
        .collect();
    assert_eq!(advances.len(), 1, "one advance per node");

    assert_eq!(machine.advance_from(0), Ok(AdvanceOutcome::Entered(1)));
    assert_eq!(machine.advance_from(0), Ok(AdvanceOutcome::Stale));
    assert_eq!(machine.node_index(), 1);

    let entered = event_names(&machine.drain_effects())
        .into_iter()
        .filter(|e| e == EVENT_STATE_ENTER)
        .count();
    assert_eq!(entered, 1);
}

#[test]
fn full_level_reaches_terminal_state() {
    let mut machine = StageMachine::new(0, level());
    machine.start().unwrap();
    let mut all = pump(&mut machine);

    for _ in 0..4 {
        machine.handle_command(Command::Complete).unwrap();
        all.extend(pump(&mut machine));
    }

    assert!(machine.is_complete());
    assert_eq!(machine.node_index(), 4);
    assert!(machine.active_node().is_none());
    assert!(all.contains(&Effect::LevelComplete));
    assert_eq!(
        event_names(&all).last().map(String::as_str),
        Some(EVENT_LEVEL_COMPLETE)
    );
    assert!(machine.handle_command(Command::Next).is_err());
}

#[test]
fn invalid_middle_node_stops_the_level() {
    let mut nodes = level();
    nodes[1] = StageNode::PoseMatch(PoseMatchNode::default());
    let mut machine = StageMachine::new(0, nodes);
    machine.start().unwrap();
    machine.drain_effects();

    machine.handle_command(Command::Next).unwrap();
    let effects = machine.drain_effects();
    let Some(Effect::Advance { from_index }) = effects.last().cloned() else {
        panic!("intro should request an advance");
    };
    assert!(machine.advance_from(from_index).is_err());
    assert!(machine.active_node().is_none());
    assert!(!machine.is_complete());
}

#[test]
fn unrecognised_node_is_skipped_on_entry() {
    let mut machine = StageMachine::new(
        0,
        vec![
            StageNode::Unknown,
            StageNode::Intro(DialogueNode {
                lines: vec!["Welcome".into()],
                speaker: None,
            }),
        ],
    );

    assert_eq!(machine.start(), Ok(AdvanceOutcome::Entered(0)));
    let effects = pump(&mut machine);

    assert!(effects.contains(&Effect::Advance { from_index: 0 }));
    assert_eq!(
        event_names(&effects),
        vec![EVENT_STATE_ENTER, EVENT_STATE_EXIT, EVENT_STATE_ENTER]
    );
    assert_eq!(machine.node_index(), 1);
    assert_matches!(machine.active_node(), Some(StageNode::Intro(_)));
    assert!(!machine.is_complete());
}

#[test]
fn trailing_unrecognised_node_completes_the_level() {
    let mut machine = StageMachine::new(3, vec![StageNode::Unknown]);

    machine.start().unwrap();
    let effects = pump(&mut machine);

    assert!(machine.is_complete());
    assert!(effects.contains(&Effect::LevelComplete));
}
