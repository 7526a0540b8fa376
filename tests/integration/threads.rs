//! Thread hierarchy integration tests
//!
//! Nested stage barriers on a full tree and scope deactivation while the
//! engine keeps cycling.

use crate::helpers::*;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tactus::prelude::*;
use tactus::thread::{NodeId, NodeRole, StageContext, StageHandler, ThreadTree};
use tactus::StagingProgram;

type StageLog = Arc<Mutex<HashMap<NodeId, Vec<Stage>>>>;

fn recorder(log: &StageLog) -> Arc<dyn StageHandler> {
    let log = Arc::clone(log);
    Arc::new(move |ctx: &StageContext| {
        log.lock().entry(ctx.node).or_default().push(ctx.stage);
    })
}

// ---------------------------------------------------------------------------
// Barrier ordering
// ---------------------------------------------------------------------------

#[test]
fn test_depth_three_tree_runs_each_stage_once_per_leaf() {
    let log: StageLog = Arc::default();
    let tree = ThreadTree::builder()
        .scopes(&[SoundScope::Playback])
        .realtime_priority(false)
        .build(recorder(&log))
        .unwrap();

    let mut level = vec![tree.root()];
    for role in [NodeRole::Audio, NodeRole::Channel, NodeRole::Channel] {
        let mut next = Vec::new();
        for parent in &level {
            for _ in 0..4 {
                next.push(tree.add_node(*parent, role, recorder(&log)).unwrap());
            }
        }
        level = next;
    }
    let leaves = level;
    assert_eq!(leaves.len(), 64);
    assert_eq!(tree.node_count(), 1 + 4 + 16 + 64);

    tree.dispatch(SoundScope::Playback).unwrap();

    let program = StagingProgram::playback();
    let log = log.lock();
    for leaf in &leaves {
        assert_eq!(log[leaf].as_slice(), program.stages(), "leaf {leaf:?}");
    }

    let root_done = tree
        .stats(tree.root(), SoundScope::Playback)
        .unwrap()
        .last_completion_nanos;
    for node in tree.descendants(tree.root()).unwrap() {
        let done = tree
            .stats(node, SoundScope::Playback)
            .unwrap()
            .last_completion_nanos;
        assert!(root_done >= done, "root finished before {node:?}");
    }
}

#[test]
fn test_repeated_dispatches_stay_in_step() {
    let log: StageLog = Arc::default();
    let tree = ThreadTree::builder()
        .scopes(&[SoundScope::Sequencer])
        .realtime_priority(false)
        .build(recorder(&log))
        .unwrap();
    let audio = tree
        .add_node(tree.root(), NodeRole::Audio, recorder(&log))
        .unwrap();
    let channel = tree
        .add_node(audio, NodeRole::Channel, recorder(&log))
        .unwrap();

    for _ in 0..25 {
        tree.dispatch(SoundScope::Sequencer).unwrap();
    }

    let per_dispatch = StagingProgram::playback().len();
    let log = log.lock();
    assert_eq!(log[&channel].len(), 25 * per_dispatch);
    assert_eq!(log[&tree.root()].len(), 25 * per_dispatch);
    assert_eq!(tree.dispatch_count(SoundScope::Sequencer), 25);
}

// ---------------------------------------------------------------------------
// Scope activity
// ---------------------------------------------------------------------------

#[test]
fn test_deactivated_wave_scope_stops_while_playback_continues() {
    let engine = test_engine(&[SoundScope::Playback, SoundScope::Wave]);
    let (audio, channels) = add_instrument(&engine, 1);
    let counter = ScopeCounter::default();
    engine.graph().attach(channels[0], Box::new(counter.clone()));
    engine
        .play(audio, SoundScope::Playback, vec![RecyclingId(0)])
        .unwrap();
    engine
        .play(audio, SoundScope::Wave, vec![RecyclingId(1)])
        .unwrap();

    for _ in 0..5 {
        let report = engine.cycle().unwrap();
        assert_eq!(report.scopes, vec![SoundScope::Playback, SoundScope::Wave]);
    }
    assert_eq!(counter.runs(SoundScope::Wave), 5);

    engine.set_scope_active(SoundScope::Wave, false).unwrap();
    let wave_dispatches = engine.tree().dispatch_count(SoundScope::Wave);
    let playback_runs = counter.runs(SoundScope::Playback);

    for _ in 0..10 {
        let report = engine.cycle().unwrap();
        assert_eq!(report.scopes, vec![SoundScope::Playback]);
    }

    assert_eq!(engine.tree().dispatch_count(SoundScope::Wave), wave_dispatches);
    assert_eq!(counter.runs(SoundScope::Wave), 5);
    assert_eq!(counter.runs(SoundScope::Playback), playback_runs + 10);

    engine.set_scope_active(SoundScope::Wave, true).unwrap();
    engine.cycle().unwrap();
    assert_eq!(counter.runs(SoundScope::Wave), 6);
}

#[test]
fn test_disabled_scope_cannot_be_toggled() {
    let engine = test_engine(&[SoundScope::Playback]);
    assert!(engine.set_scope_active(SoundScope::Midi, false).is_err());
}
