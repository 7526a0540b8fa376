//! Ring buffer integration tests
//!
//! Slot rotation through the engine and underflow reporting.

use crate::helpers::*;
use std::collections::HashSet;
use tactus::prelude::*;

#[test]
fn test_cycles_visit_every_slot_once_per_rotation() {
    let engine = test_engine(&[SoundScope::Playback]);
    let slots = engine.config().ring_buffer_size;
    assert_eq!(slots, 4);

    for _ in 0..3 {
        let visited: HashSet<usize> = (0..slots)
            .map(|_| engine.cycle().unwrap().slot)
            .collect();
        assert_eq!(visited.len(), slots);
    }
}

#[test]
fn test_first_process_underflows_then_recovers() {
    let engine = test_engine(&[SoundScope::Playback]);
    let ring = engine.soundcard().ring();
    let mut out = vec![0.0f32; TEST_BUFFER_SIZE * 2];

    assert_eq!(engine.process(&mut out).unwrap(), ConsumeStatus::Underflow);
    assert!(ring.underflow());
    assert_eq!(engine.underflow_count(), 1);

    ring.clear_underflow();
    for _ in 0..8 {
        assert_eq!(engine.process(&mut out).unwrap(), ConsumeStatus::Ready);
    }
    assert!(!ring.underflow());
    assert_eq!(engine.underflow_count(), 1);
}

#[test]
fn test_short_output_buffer_is_rejected() {
    let engine = test_engine(&[SoundScope::Playback]);
    let mut out = vec![0.0f32; TEST_BUFFER_SIZE];
    assert!(engine.process(&mut out).is_err());
}

#[test]
fn test_reconfigure_reallocates_ring() {
    let engine = test_engine(&[SoundScope::Playback]);
    engine
        .reconfigure(SoundcardConfig {
            buffer_size: 128,
            pcm_channels: 1,
            ring_buffer_size: 3,
            ..Default::default()
        })
        .unwrap();

    let ring = engine.soundcard().ring();
    assert_eq!(ring.slot_count(), 3);
    assert_eq!(ring.buffer_size(), 128);

    let mut out = vec![0.0f32; 128];
    engine.process(&mut out).unwrap();
    assert_eq!(engine.process(&mut out).unwrap(), ConsumeStatus::Ready);
}

#[test]
fn test_write_slot_is_never_the_read_slot() {
    let engine = test_engine(&[SoundScope::Playback]);
    let ring = engine.soundcard().ring();
    for _ in 0..256 {
        let report = engine.cycle().unwrap();
        assert_eq!(report.slot, ring.current_buffer());
        assert_ne!(report.slot, ring.prev_buffer());
    }
}

#[test]
fn test_concurrent_consumer_only_sees_finished_buffers() {
    let engine = test_engine(&[SoundScope::Playback]);
    let (audio, channels) = add_instrument(&engine, 1);
    engine.graph().attach(channels[0], Box::new(Constant(0.25)));
    engine
        .play(audio, SoundScope::Playback, vec![RecyclingId(0)])
        .unwrap();
    let ring = engine.soundcard().ring();
    let done = std::sync::atomic::AtomicBool::new(false);

    std::thread::scope(|s| {
        let consumer = s.spawn(|| {
            let mut out = vec![0.0f32; TEST_BUFFER_SIZE * 2];
            let mut ready = 0;
            while !done.load(std::sync::atomic::Ordering::Acquire) {
                if ring.consume(&mut out).unwrap() == ConsumeStatus::Ready {
                    ready += 1;
                    assert!(channel_samples(&out, 2, 0).iter().all(|x| *x == 0.25));
                }
            }
            ready
        });

        for _ in 0..500 {
            engine.cycle().unwrap();
        }
        done.store(true, std::sync::atomic::Ordering::Release);
        assert!(consumer.join().unwrap() > 0);
    });
}

#[test]
fn test_process_racing_reconfigure_sees_one_layout() {
    let engine = test_engine(&[SoundScope::Playback]);
    let layouts = [(64, 2), (128, 1), (32, 2)];

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..60 {
                let (buffer_size, pcm_channels) = layouts[i % layouts.len()];
                engine
                    .reconfigure(SoundcardConfig {
                        buffer_size,
                        pcm_channels,
                        ..Default::default()
                    })
                    .unwrap();
            }
        });

        let mut out = vec![0.0f32; 128];
        for _ in 0..300 {
            engine.process(&mut out).unwrap();
        }
    });

    let ring = engine.soundcard().ring();
    let config = engine.config();
    assert_eq!(ring.buffer_size(), config.buffer_size);
    assert_eq!(ring.pcm_channels(), config.pcm_channels);
}
