//! Error types for tactus-core.

use thiserror::Error;

/// Error type for tactus-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid tempo: {0}. Must be between 20.0 and 999.0 BPM")]
    InvalidTempo(f64),

    #[error("Invalid delay factor: {0}. Must be finite and positive")]
    InvalidDelayFactor(f64),

    #[error("Invalid loop range: left={left}, right={right}")]
    InvalidLoopRange { left: u64, right: u64 },

    #[error("Invalid ring slot {slot} (ring has {slots} slots)")]
    InvalidSlot { slot: usize, slots: usize },

    #[error("Invalid sub-block: channel={channel}, block={block}")]
    InvalidSubBlock { channel: usize, block: usize },

    #[error("Sub-block busy: slot={slot}, channel={channel}, block={block}")]
    SubBlockBusy {
        slot: usize,
        channel: usize,
        block: usize,
    },

    #[error("Output buffer too small: need {needed}, got {got}")]
    OutputTooSmall { needed: usize, got: usize },

    #[error("Event queue full")]
    EventQueueFull,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
