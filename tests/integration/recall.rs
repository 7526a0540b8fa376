//! Recall graph integration tests
//!
//! Recycling contexts under a running engine: child removal, staged edits
//! published between cycles, and instance isolation.

use crate::helpers::*;
use tactus::prelude::*;
use tactus::recall::Error as RecallError;
use tactus::Error;

#[test]
fn test_removed_child_context_leaves_parent_length() {
    let engine = test_engine(&[SoundScope::Playback]);
    let graph = engine.graph();

    let parent = graph
        .create_context(
            None,
            SoundScope::Playback,
            Some(vec![RecyclingId(0), RecyclingId(1), RecyclingId(2)]),
        )
        .unwrap();
    let child = graph
        .create_context(Some(parent), SoundScope::Playback, None)
        .unwrap();
    let child_id = graph.recall_id_of(child).unwrap();
    assert_eq!(graph.context(child).unwrap().len(), 3);

    graph.remove_context(child).unwrap();

    assert_eq!(graph.context(parent).unwrap().len(), 3);
    assert_eq!(
        graph.resolve(child_id).unwrap_err(),
        RecallError::RecallIdNotFound(child_id)
    );
    assert!(matches!(
        engine.cancel(child_id),
        Err(Error::Recall(RecallError::RecallIdNotFound(_)))
    ));
}

#[test]
fn test_staged_edit_visible_from_next_cycle() {
    let engine = test_engine(&[SoundScope::Playback]);
    let graph = engine.graph();
    let ctx = graph
        .create_context(None, SoundScope::Playback, Some(vec![RecyclingId(0)]))
        .unwrap();

    graph.add(ctx, RecyclingId(1)).unwrap();
    assert_eq!(graph.recyclings(ctx).unwrap().len(), 1);

    engine.cycle().unwrap();
    assert_eq!(
        *graph.recyclings(ctx).unwrap(),
        vec![RecyclingId(0), RecyclingId(1)]
    );
}

#[test]
fn test_edit_during_run_pre_visible_at_run_post() {
    let engine = test_engine(&[SoundScope::Playback]);
    let (audio, channels) = add_instrument(&engine, 1);
    let gate = StageGate::new(&[Stage::RunPre, Stage::RunPost]);
    engine.graph().attach(channels[0], Box::new(gate.clone()));
    let recall_id = engine
        .play(audio, SoundScope::Playback, vec![RecyclingId(0)])
        .unwrap();
    let graph = engine.graph();
    let (ctx, _) = graph.resolve(recall_id).unwrap();

    std::thread::scope(|s| {
        let cycle = s.spawn(|| engine.cycle());

        gate.wait_reached(1);
        graph.add(ctx, RecyclingId(1)).unwrap();
        // The stage in flight keeps its snapshot.
        assert_eq!(graph.recyclings(ctx).unwrap().len(), 1);
        gate.release();

        gate.wait_reached(2);
        assert_eq!(
            *graph.recyclings(ctx).unwrap(),
            vec![RecyclingId(0), RecyclingId(1)]
        );
        gate.release();

        cycle.join().unwrap().unwrap();
    });
}

#[test]
fn test_last_recycling_cannot_be_removed() {
    let engine = test_engine(&[SoundScope::Playback]);
    let graph = engine.graph();
    let ctx = graph
        .create_context(None, SoundScope::Playback, Some(vec![RecyclingId(7)]))
        .unwrap();
    assert_eq!(
        graph.remove_recycling(ctx, RecyclingId(7)).unwrap_err(),
        RecallError::EmptyRecycling
    );
}

#[test]
fn test_playbacks_get_independent_instances() {
    let engine = test_engine(&[SoundScope::Playback]);
    let (audio, channels) = add_instrument(&engine, 1);
    let container = engine.graph().attach(channels[0], Box::new(Constant(0.1)));

    let a = engine
        .play(audio, SoundScope::Playback, vec![RecyclingId(0)])
        .unwrap();
    let b = engine
        .play(audio, SoundScope::Playback, vec![RecyclingId(1)])
        .unwrap();
    assert_ne!(a, b);

    let graph = engine.graph();
    let c = graph.container(container).unwrap();
    assert_eq!(c.recall_channel_run().len() + c.recall_audio_run().len(), 2);

    let for_a = graph
        .find(container, &tactus::RecallQuery::any().recall_id(a))
        .unwrap();
    let for_b = graph
        .find(container, &tactus::RecallQuery::any().recall_id(b))
        .unwrap();
    assert_eq!(for_a.len(), 1);
    assert_eq!(for_b.len(), 1);
    assert_ne!(for_a[0], for_b[0]);

    engine.cancel(a).unwrap();
    assert!(graph
        .find(container, &tactus::RecallQuery::any().recall_id(a))
        .unwrap()
        .is_empty());
    assert_eq!(
        graph
            .find(container, &tactus::RecallQuery::any().recall_id(b))
            .unwrap(),
        for_b
    );
}

#[test]
#[should_panic(expected = "longer than parent")]
fn test_child_array_longer_than_parent_panics() {
    let engine = test_engine(&[SoundScope::Playback]);
    let graph = engine.graph();
    let parent = graph
        .create_context(None, SoundScope::Playback, Some(vec![RecyclingId(0)]))
        .unwrap();
    let _ = graph.create_context(
        Some(parent),
        SoundScope::Playback,
        Some(vec![RecyclingId(0), RecyclingId(1)]),
    );
}
