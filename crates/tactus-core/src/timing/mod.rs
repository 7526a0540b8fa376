//! Delay/attack timing engine.
//!
//! Turns tempo into per-buffer tic counters. See [`TimingEngine::tick`].

mod engine;
mod table;

pub use engine::{TickInfo, TimingEngine};
pub use table::{
    absolute_delay, samples_per_tic, validate_timing, DelayAttackTable, DEFAULT_BPM,
    DEFAULT_DELAY_FACTOR, DEFAULT_PERIOD, MAX_BPM, MIN_BPM,
};
