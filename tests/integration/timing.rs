//! Timing integration tests
//!
//! Tic counters advanced by the driver cycle: musical position, tempo changes
//! mid-stream, looping and stop.

use approx::assert_abs_diff_eq;
use tactus::prelude::*;

fn engine(bpm: f64, delay_factor: f64) -> Engine {
    Engine::builder()
        .buffer_size(1024)
        .bpm(bpm)
        .delay_factor(delay_factor)
        .scopes(&[SoundScope::Playback])
        .realtime_priority(false)
        .build()
        .unwrap()
}

#[test]
fn test_note_offset_after_120_cycles() {
    let engine = engine(120.0, 1.0);
    for _ in 0..120 {
        engine.cycle().unwrap();
    }
    // 120 × 1024 samples over 1378.125 samples per tic.
    let expected = 120.0 * 1024.0 / 1378.125;
    assert_abs_diff_eq!(engine.note_offset() as f64, expected, epsilon = 1.0);
    assert_eq!(engine.note_offset(), 89);
}

#[test]
fn test_attacks_reported_per_cycle() {
    let engine = engine(120.0, 1.0);
    let mut tics = 0;
    for _ in 0..120 {
        let report = engine.cycle().unwrap();
        for attack in &report.tick.attacks {
            assert!(*attack < 1024);
        }
        tics += report.tick.tics();
    }
    assert_eq!(tics as u64, engine.note_offset());
}

#[test]
fn test_tempo_change_keeps_position() {
    let engine = engine(120.0, 1.0);
    for _ in 0..60 {
        engine.cycle().unwrap();
    }
    let before = engine.note_offset();
    engine.set_bpm(240.0).unwrap();
    assert_eq!(engine.note_offset(), before);

    for _ in 0..60 {
        engine.cycle().unwrap();
    }
    // Twice the tic rate for the second half.
    let advanced = (engine.note_offset() - before) as f64;
    assert_abs_diff_eq!(advanced, 60.0 * 1024.0 / 689.0625, epsilon = 1.5);
}

#[test]
fn test_loop_wraps_note_offset() {
    let engine = engine(120.0, 1.0);
    engine.set_loop(0, 8, true).unwrap();
    let mut wrapped = false;
    for _ in 0..40 {
        let report = engine.cycle().unwrap();
        wrapped |= report.tick.looped;
        assert!(engine.note_offset() < 8);
    }
    assert!(wrapped);
}

#[test]
fn test_stop_rewinds() {
    let engine = engine(120.0, 1.0);
    for _ in 0..10 {
        engine.cycle().unwrap();
    }
    assert!(engine.note_offset() > 0);
    engine.stop();
    assert_eq!(engine.note_offset(), 0);
}

#[test]
fn test_invalid_tempo_keeps_previous() {
    let engine = engine(120.0, 0.25);
    assert!(engine.set_bpm(f64::NAN).is_err());
    assert!(engine.set_delay_factor(0.0).is_err());
    assert_eq!(engine.bpm(), 120.0);
    assert_eq!(engine.delay_factor(), 0.25);
}

mod properties {
    use super::engine;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn note_offset_counts_every_reported_tic(
            bpm in 30.0f64..300.0,
            delay_factor in prop::sample::select(vec![0.25f64, 0.5, 1.0]),
            cycles in 1usize..64,
        ) {
            let engine = engine(bpm, delay_factor);
            let mut tics = 0u64;
            for _ in 0..cycles {
                let report = engine.cycle().unwrap();
                prop_assert!(report.tick.attacks.iter().all(|a| *a < 1024));
                tics += report.tick.tics() as u64;
            }
            prop_assert_eq!(tics, engine.note_offset());
        }
    }
}
