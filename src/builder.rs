//! Builder for configuring and constructing an [`Engine`].

use crate::{Engine, Result};
use std::time::Duration;
use tactus_core::event::DEFAULT_EVENT_CAPACITY;
use tactus_core::timing::{DEFAULT_BPM, DEFAULT_DELAY_FACTOR};
use tactus_core::{
    EventQueue, SoundScope, Soundcard, SoundcardConfig, SoundcardFormat, StagingProgram,
    DEFAULT_SAMPLE_INTERVAL,
};
use tactus_thread::{ThreadTree, DEFAULT_HANG_CHECK};

/// Everything not set keeps the [`SoundcardConfig`] defaults: 44.1 kHz,
/// 1024 frames, stereo, 8 sub-blocks, 4 ring slots, 120 bpm.
///
/// # Example
///
/// ```ignore
/// use tactus::prelude::*;
///
/// let engine = Engine::builder()
///     .samplerate(48_000)
///     .buffer_size(256)
///     .bpm(140.0)
///     .scopes(&[SoundScope::Playback, SoundScope::Sequencer])
///     .build()?;
/// ```
pub struct EngineBuilder {
    config: SoundcardConfig,
    bpm: f64,
    delay_factor: f64,
    scopes: Vec<SoundScope>,
    program: Option<StagingProgram>,
    hang_check: Duration,
    realtime_priority: bool,
    event_capacity: usize,
    meter_interval: Duration,
    metering: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: SoundcardConfig::default(),
            bpm: DEFAULT_BPM,
            delay_factor: DEFAULT_DELAY_FACTOR,
            scopes: SoundScope::ALL.to_vec(),
            program: None,
            hang_check: DEFAULT_HANG_CHECK,
            realtime_priority: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            meter_interval: DEFAULT_SAMPLE_INTERVAL,
            metering: false,
        }
    }
}

impl EngineBuilder {
    /// Replace the whole soundcard configuration.
    pub fn config(mut self, config: SoundcardConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 44100
    pub fn samplerate(mut self, samplerate: u32) -> Self {
        self.config.samplerate = samplerate;
        self
    }

    /// Default: 1024
    pub fn buffer_size(mut self, frames: usize) -> Self {
        self.config.buffer_size = frames;
        self
    }

    pub fn format(mut self, format: SoundcardFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Default: 2
    pub fn pcm_channels(mut self, count: usize) -> Self {
        self.config.pcm_channels = count;
        self
    }

    /// Default: 8
    pub fn sub_blocks(mut self, count: usize) -> Self {
        self.config.sub_block_count = count;
        self
    }

    /// Default: 4
    pub fn ring_slots(mut self, count: usize) -> Self {
        self.config.ring_buffer_size = count;
        self
    }

    /// Default: 120
    pub fn bpm(mut self, bpm: f64) -> Self {
        self.bpm = bpm;
        self
    }

    /// Note length a tic stands for, as a fraction of a sixteenth. Default: 0.25
    pub fn delay_factor(mut self, delay_factor: f64) -> Self {
        self.delay_factor = delay_factor;
        self
    }

    /// Scopes that get worker threads. Default: all five
    pub fn scopes(mut self, scopes: &[SoundScope]) -> Self {
        self.scopes = scopes.to_vec();
        self
    }

    /// Staging program for every scope. Default: [`StagingProgram::playback`]
    pub fn staging_program(mut self, program: StagingProgram) -> Self {
        self.program = Some(program);
        self
    }

    /// How long a parent waits on its children before logging a stall. Default: 2 s
    pub fn hang_check(mut self, interval: Duration) -> Self {
        self.hang_check = interval;
        self
    }

    /// Raise worker threads to maximum priority. Default: true
    pub fn realtime_priority(mut self, enabled: bool) -> Self {
        self.realtime_priority = enabled;
        self
    }

    /// Default: 1024
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Start the meter sampler thread with `interval` between snapshots.
    pub fn metering(mut self, interval: Duration) -> Self {
        self.meter_interval = interval;
        self.metering = true;
        self
    }

    pub fn build(self) -> Result<Engine> {
        let card = Soundcard::with_tempo(self.config, self.bpm, self.delay_factor)?;
        let tree = ThreadTree::builder()
            .scopes(&self.scopes)
            .hang_check(self.hang_check)
            .realtime_priority(self.realtime_priority);

        Engine::from_parts(
            card,
            tree,
            self.program,
            EventQueue::new(self.event_capacity),
            self.meter_interval,
            self.metering,
        )
    }
}
