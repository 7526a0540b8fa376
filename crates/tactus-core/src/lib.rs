//! Scheduling kernel for the tactus runtime.
//!
//! # Primary API
//!
//! - [`Soundcard`]: configuration, [`TimingEngine`] and [`RingBuffer`] kept consistent
//! - [`TimingEngine`]: tempo to per-buffer tic counters via [`DelayAttackTable`]
//! - [`RingBuffer`]: N-slot planar output buffer with per-sub-block locks
//! - [`SoundScope`] / [`StagingProgram`]: processing contexts and their stage lists
//! - [`EventQueue`]: note events for the input-feed stage
//! - [`MeterSampler`]: read-only meter snapshots on an independent timer
//!
//! # Example
//!
//! ```ignore
//! use tactus_core::{Soundcard, SoundcardConfig};
//!
//! let card = Soundcard::new(SoundcardConfig::default())?;
//! card.set_bpm(145.0)?;
//!
//! let frame = card.begin_cycle();
//! frame.ring.mix_channel(frame.slot, 0, 0, &samples)?;
//! frame.ring.mark_complete(frame.slot)?;
//! ```

pub mod error;
pub use error::{Error, Result};

pub mod config;
pub use config::{SoundcardConfig, SoundcardFormat, MAX_BUFFER_SIZE};

pub(crate) mod lockfree;
pub use lockfree::{AtomicDouble, AtomicFlag, AtomicFloat};

pub mod scope;
pub use scope::{SoundScope, Stage, StagingProgram};

pub mod timing;
pub use timing::{absolute_delay, DelayAttackTable, TickInfo, TimingEngine};

pub mod ring;
pub use ring::{ConsumeStatus, RingBuffer, SubBlockGuard};

mod soundcard;
pub use soundcard::{CycleFrame, Soundcard};

pub mod event;
pub use event::{EventQueue, EventSender, NoteEvent, NoteEventKind};

pub(crate) mod metering;
pub use metering::{
    CpuMeter, CpuMetrics, MeterHandle, MeterPort, MeterReading, MeterRegistry, MeterSampler,
    MeterSnapshot, DEFAULT_SAMPLE_INTERVAL,
};
