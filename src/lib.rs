//! # Tactus - Real-time Audio Scheduling Runtime
//!
//! Sample-accurate sequencing on a tree of cooperating worker threads.
//!
//! ## Architecture
//!
//! Tactus is an umbrella crate that coordinates:
//! - **tactus-core** - Soundcard configuration, delay/attack timing, ring buffer, note events,
//!   metering
//! - **tactus-thread** - Thread hierarchy with nested per-stage barriers
//! - **tactus-recall** - Recall graph: effect templates, per-sub-mix instances, recycling contexts
//!
//! ## Quick Start
//!
//! ```ignore
//! use tactus::prelude::*;
//!
//! let engine = Engine::builder().bpm(120.0).build()?;
//! engine.add_audio(AudioId(1))?;
//! engine.add_channel(ChannelId { audio: AudioId(1), line: 0 })?;
//!
//! engine.graph().attach(ChannelId { audio: AudioId(1), line: 0 }, Box::new(MySynth::default()));
//! let recall_id = engine.play(AudioId(1), SoundScope::Playback, vec![RecyclingId(0)])?;
//!
//! let mut out = vec![0.0; engine.config().samples_per_buffer()];
//! loop {
//!     engine.process(&mut out)?;
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `cpal` - Drive the engine from an output device

pub use tactus_core as core;
pub use tactus_recall as recall;
pub use tactus_thread as thread;

mod builder;
mod engine;
mod error;

#[cfg(feature = "cpal")]
mod output;

pub use builder::EngineBuilder;
pub use engine::{CycleReport, Engine, MASTER_METER};
pub use error::{Error, Result};

pub use tactus_core::{
    ConsumeStatus, CpuMetrics, MeterHandle, MeterSnapshot, NoteEvent, NoteEventKind, SoundScope,
    SoundcardConfig, SoundcardFormat, Stage, StagingProgram, TickInfo,
};
pub use tactus_recall::{
    AttachPoint, AudioId, ChannelId, Connectable, ContainerId, ContextId, RecallGraph, RecallId,
    RecallKind, RecallProcessor, RecallQuery, RecyclingId, StageIo,
};
pub use tactus_thread::{NodeId, NodeRole};

pub mod prelude {
    pub use crate::{
        AttachPoint, AudioId, ChannelId, ConsumeStatus, Engine, EngineBuilder, NoteEvent,
        RecallId, RecallProcessor, RecyclingId, SoundScope, SoundcardConfig, Stage, StageIo,
    };
}
