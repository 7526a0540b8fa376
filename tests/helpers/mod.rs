//! Test helpers and fixtures for tactus integration tests
//!
//! Engines run with manual cycle control: no audio device, worker threads at
//! normal priority.

#![allow(dead_code)]

pub mod tolerances;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tactus::prelude::*;

pub const TEST_SAMPLE_RATE: u32 = 44_100;

/// Small buffers keep cycles cheap.
pub const TEST_BUFFER_SIZE: usize = 64;

/// Routes engine logs through `RUST_LOG` once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Engine with only `scopes` enabled.
pub fn test_engine(scopes: &[SoundScope]) -> Engine {
    init_tracing();
    Engine::builder()
        .samplerate(TEST_SAMPLE_RATE)
        .buffer_size(TEST_BUFFER_SIZE)
        .scopes(scopes)
        .realtime_priority(false)
        .build()
        .expect("Failed to create test engine")
}

/// Audio object 1 with `lines` channels.
pub fn add_instrument(engine: &Engine, lines: u32) -> (AudioId, Vec<ChannelId>) {
    let audio = AudioId(1);
    engine.add_audio(audio).expect("add audio");
    let channels: Vec<ChannelId> = (0..lines).map(|line| ChannelId { audio, line }).collect();
    for channel in &channels {
        engine.add_channel(*channel).expect("add channel");
    }
    (audio, channels)
}

/// Writes a constant into the output during `RunPre`.
#[derive(Clone)]
pub struct Constant(pub f32);

impl RecallProcessor for Constant {
    fn name(&self) -> &str {
        "constant"
    }

    fn run(&mut self, io: &mut StageIo<'_>) {
        if io.stage == Stage::RunPre {
            io.output.fill(self.0);
        }
    }
}

/// Writes the same constant in every run stage. The node's output must come
/// out once, not once per stage.
#[derive(Clone)]
pub struct EveryRunStage(pub f32);

impl RecallProcessor for EveryRunStage {
    fn name(&self) -> &str {
        "every-run-stage"
    }

    fn run(&mut self, io: &mut StageIo<'_>) {
        if io.stage.is_run() {
            io.output.fill(self.0);
        }
    }
}

/// Holds the rendering worker at each stage in `hold` until the test lets
/// it pass. Clones share the counters.
#[derive(Clone)]
pub struct StageGate {
    hold: Vec<Stage>,
    reached: Arc<AtomicUsize>,
    passed: Arc<AtomicUsize>,
}

impl StageGate {
    pub fn new(hold: &[Stage]) -> Self {
        Self {
            hold: hold.to_vec(),
            reached: Arc::default(),
            passed: Arc::default(),
        }
    }

    /// Block until the worker sits at its `n`th held stage.
    pub fn wait_reached(&self, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while self.reached.load(Ordering::SeqCst) < n {
            assert!(Instant::now() < deadline, "gate {n} never reached");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Let the worker past one held stage.
    pub fn release(&self) {
        self.passed.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecallProcessor for StageGate {
    fn name(&self) -> &str {
        "stage-gate"
    }

    fn run(&mut self, io: &mut StageIo<'_>) {
        if self.hold.contains(&io.stage) {
            let n = self.reached.fetch_add(1, Ordering::SeqCst) + 1;
            while self.passed.load(Ordering::SeqCst) < n {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

/// Counts `RunPre` calls per scope. Clones share the counters.
#[derive(Clone, Default)]
pub struct ScopeCounter {
    pub runs: Arc<[AtomicUsize; SoundScope::COUNT]>,
}

impl ScopeCounter {
    pub fn runs(&self, scope: SoundScope) -> usize {
        self.runs[scope.index()].load(Ordering::SeqCst)
    }
}

impl RecallProcessor for ScopeCounter {
    fn name(&self) -> &str {
        "scope-counter"
    }

    fn run(&mut self, io: &mut StageIo<'_>) {
        if io.stage == Stage::RunPre {
            self.runs[io.scope.index()].fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Records every note event it is fed.
#[derive(Clone, Default)]
pub struct EventRecorder {
    pub seen: Arc<parking_lot::Mutex<Vec<NoteEvent>>>,
}

impl RecallProcessor for EventRecorder {
    fn name(&self) -> &str {
        "event-recorder"
    }

    fn run(&mut self, io: &mut StageIo<'_>) {
        if io.stage == Stage::FeedInputQueue {
            self.seen.lock().extend_from_slice(io.events);
        }
    }
}

/// Peak amplitude of a signal.
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |m, s| m.max(s.abs()))
}

/// Every `channels`-th sample starting at `channel`.
pub fn channel_samples(interleaved: &[f32], channels: usize, channel: usize) -> Vec<f32> {
    interleaved
        .iter()
        .skip(channel)
        .step_by(channels)
        .copied()
        .collect()
}
