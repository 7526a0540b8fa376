//! Engine integration tests
//!
//! Lifecycle, topology, rendering into pcm channels, note-event delivery and
//! metering, all driven with manual cycles.

use crate::helpers::tolerances::*;
use crate::helpers::*;
use std::time::Duration;
use tactus::prelude::*;
use tactus::{Error, SoundcardFormat, MASTER_METER};

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[test]
fn test_engine_defaults() {
    let engine = Engine::builder().realtime_priority(false).build().unwrap();
    assert_eq!(engine.samplerate(), 44_100);
    assert_eq!(engine.buffer_size(), 1024);
    assert_eq!(engine.config().ring_buffer_size, 4);
    assert_eq!(engine.bpm(), 120.0);
    assert_eq!(engine.tree().scopes().len(), SoundScope::COUNT);
}

#[test]
fn test_cycle_after_shutdown_fails() {
    let engine = test_engine(&[SoundScope::Playback]);
    engine.cycle().unwrap();
    engine.shutdown();
    assert!(matches!(
        engine.cycle(),
        Err(Error::Thread(tactus::thread::Error::ShutDown))
    ));
}

#[test]
fn test_topology_mirrors_audio_objects() {
    let engine = test_engine(&[SoundScope::Playback]);
    let (audio, channels) = add_instrument(&engine, 2);

    let audio_node = engine.node_of(audio).unwrap();
    assert_eq!(engine.tree().parent(audio_node).unwrap(), Some(engine.tree().root()));
    for channel in &channels {
        let node = engine.node_of(*channel).unwrap();
        assert_eq!(engine.tree().parent(node).unwrap(), Some(audio_node));
    }

    engine.remove_channel(channels[1]).unwrap();
    assert_eq!(engine.tree().node_count(), 3);
    assert!(matches!(
        engine.remove_channel(channels[1]),
        Err(Error::ChannelNotFound(_))
    ));
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

#[test]
fn test_removal_joining_a_stuck_worker_leaves_playback_free() {
    let engine = test_engine(&[SoundScope::Playback]);
    let (stuck, channels) = add_instrument(&engine, 1);
    let gate = StageGate::new(&[Stage::RunPre]);
    engine.graph().attach(channels[0], Box::new(gate.clone()));
    engine
        .play(stuck, SoundScope::Playback, vec![RecyclingId(0)])
        .unwrap();
    let other = AudioId(2);
    engine.add_audio(other).unwrap();

    std::thread::scope(|s| {
        let cycle = s.spawn(|| engine.cycle());
        gate.wait_reached(1);
        let removal = s.spawn(|| engine.remove_audio(stuck));
        std::thread::sleep(Duration::from_millis(20));

        let line = ChannelId {
            audio: other,
            line: 0,
        };
        engine.add_channel(line).unwrap();
        engine
            .play(other, SoundScope::Playback, vec![RecyclingId(1)])
            .unwrap();
        assert!(!removal.is_finished());

        gate.release();
        removal.join().unwrap().unwrap();
        cycle.join().unwrap().unwrap();
    });

    assert!(engine.node_of(stuck).is_none());
    assert!(engine.node_of(other).is_some());
    engine.cycle().unwrap();
}

#[test]
fn test_channels_render_into_their_pcm_channel() {
    let engine = test_engine(&[SoundScope::Playback]);
    let (audio, channels) = add_instrument(&engine, 2);
    engine.graph().attach(channels[0], Box::new(Constant(0.25)));
    engine.graph().attach(channels[1], Box::new(Constant(-0.5)));
    engine
        .play(audio, SoundScope::Playback, vec![RecyclingId(0), RecyclingId(1)])
        .unwrap();

    let mut out = vec![0.0f32; TEST_BUFFER_SIZE * 2];
    engine.process(&mut out).unwrap();
    assert_eq!(engine.process(&mut out).unwrap(), ConsumeStatus::Ready);

    let left = channel_samples(&out, 2, 0);
    let right = channel_samples(&out, 2, 1);
    assert!(left.iter().all(|s| (s - 0.25).abs() < FLOAT_EPSILON));
    assert!(right.iter().all(|s| (s + 0.5).abs() < FLOAT_EPSILON));
}

#[test]
fn test_two_playbacks_mix() {
    let engine = test_engine(&[SoundScope::Playback]);
    let (audio, channels) = add_instrument(&engine, 1);
    engine.graph().attach(channels[0], Box::new(Constant(0.25)));
    engine
        .play(audio, SoundScope::Playback, vec![RecyclingId(0)])
        .unwrap();
    let second = engine
        .play(audio, SoundScope::Playback, vec![RecyclingId(1)])
        .unwrap();

    let mut out = vec![0.0f32; TEST_BUFFER_SIZE * 2];
    engine.process(&mut out).unwrap();
    engine.process(&mut out).unwrap();
    assert!((out[0] - 0.5).abs() < FLOAT_EPSILON);

    engine.cancel(second).unwrap();
    engine.process(&mut out).unwrap();
    engine.process(&mut out).unwrap();
    assert!((out[0] - 0.25).abs() < FLOAT_EPSILON);
}

#[test]
fn test_run_stages_refine_one_output() {
    let engine = test_engine(&[SoundScope::Playback]);
    let (audio, channels) = add_instrument(&engine, 1);
    engine.graph().attach(channels[0], Box::new(EveryRunStage(0.25)));
    engine
        .play(audio, SoundScope::Playback, vec![RecyclingId(0)])
        .unwrap();

    let mut out = vec![0.0f32; TEST_BUFFER_SIZE * 2];
    for _ in 0..3 {
        engine.process(&mut out).unwrap();
        let left = channel_samples(&out, 2, 0);
        assert!(left.iter().all(|s| *s == 0.0 || (s - 0.25).abs() < FLOAT_EPSILON));
    }
    assert!((out[0] - 0.25).abs() < FLOAT_EPSILON);

    let channel = engine.meter_registry().port("audio1/line0");
    assert!((channel.get() - 0.25).abs() < FLOAT_EPSILON);
}

#[test]
fn test_unplayed_engine_is_silent() {
    let engine = test_engine(&[SoundScope::Playback]);
    add_instrument(&engine, 2);
    let mut out = vec![1.0f32; TEST_BUFFER_SIZE * 2];
    for _ in 0..3 {
        engine.process(&mut out).unwrap();
    }
    assert!(peak(&out) < SILENCE_THRESHOLD);
}

#[test]
fn test_encoded_output_uses_configured_format() {
    let engine = Engine::builder()
        .buffer_size(TEST_BUFFER_SIZE)
        .format(SoundcardFormat::S16)
        .scopes(&[SoundScope::Playback])
        .realtime_priority(false)
        .build()
        .unwrap();
    let (audio, channels) = add_instrument(&engine, 1);
    engine.graph().attach(channels[0], Box::new(Constant(0.5)));
    engine
        .play(audio, SoundScope::Playback, vec![RecyclingId(0)])
        .unwrap();

    let mut bytes = vec![0u8; TEST_BUFFER_SIZE * 2 * 2];
    engine.process_encoded(&mut bytes).unwrap();
    assert_eq!(engine.process_encoded(&mut bytes).unwrap(), ConsumeStatus::Ready);

    let first = i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / i16::MAX as f32;
    assert!((first - 0.5).abs() < INT16_EPSILON * 2.0);
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn test_events_reach_addressed_audio_only() {
    let engine = test_engine(&[SoundScope::Playback]);
    let (audio, _) = add_instrument(&engine, 1);
    let recorder = EventRecorder::default();
    engine.graph().attach(audio, Box::new(recorder.clone()));
    engine
        .play(audio, SoundScope::Playback, vec![RecyclingId(0)])
        .unwrap();

    let sender = engine.event_sender();
    sender.send(NoteEvent::note_on(audio.0, 60, 0.8).at(12)).unwrap();
    sender.send(NoteEvent::note_on(audio.0, 64, 0.8).at(3)).unwrap();
    sender.send(NoteEvent::note_on(99, 67, 0.8)).unwrap();
    engine.cycle().unwrap();

    let seen = recorder.seen.lock().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].pitch, 64);
    assert_eq!(seen[1].pitch, 60);

    engine.cycle().unwrap();
    assert_eq!(recorder.seen.lock().len(), 2);
}

// ---------------------------------------------------------------------------
// Metering
// ---------------------------------------------------------------------------

#[test]
fn test_master_meter_tracks_consumed_peak() {
    let engine = test_engine(&[SoundScope::Playback]);
    let (audio, channels) = add_instrument(&engine, 1);
    engine.graph().attach(channels[0], Box::new(Constant(0.5)));
    engine
        .play(audio, SoundScope::Playback, vec![RecyclingId(0)])
        .unwrap();

    let mut out = vec![0.0f32; TEST_BUFFER_SIZE * 2];
    engine.process(&mut out).unwrap();
    engine.process(&mut out).unwrap();

    let master = engine.meter_registry().port(MASTER_METER);
    assert!((master.get() - 0.5).abs() < FLOAT_EPSILON);
    let channel = engine.meter_registry().port("audio1/line0");
    assert!((channel.get() - 0.5).abs() < FLOAT_EPSILON);
}

#[test]
fn test_meter_sampler_publishes_snapshots() {
    let engine = Engine::builder()
        .buffer_size(TEST_BUFFER_SIZE)
        .scopes(&[SoundScope::Playback])
        .realtime_priority(false)
        .metering(Duration::from_millis(5))
        .build()
        .unwrap();

    let mut out = vec![0.0f32; TEST_BUFFER_SIZE * 2];
    engine.process(&mut out).unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let snapshot = engine.meters().snapshot();
    assert!(snapshot.sequence > 0);
    assert!(snapshot.get(MASTER_METER).is_some());
    engine.stop_metering();
}

#[test]
fn test_cpu_meter_records_cycles() {
    let engine = test_engine(&[SoundScope::Playback]);
    for _ in 0..4 {
        engine.cycle().unwrap();
    }
    let metrics = engine.cpu_metrics();
    assert_eq!(metrics.buffer_size, TEST_BUFFER_SIZE);
    assert!(metrics.peak >= metrics.current);
}
