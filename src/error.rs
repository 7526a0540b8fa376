//! Centralized error type for the tactus umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use tactus_recall::{AudioId, ChannelId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] tactus_core::Error),

    #[error("Thread tree: {0}")]
    Thread(#[from] tactus_thread::Error),

    #[error("Recall graph: {0}")]
    Recall(#[from] tactus_recall::Error),

    #[error("Audio object not registered: {0:?}")]
    AudioNotFound(AudioId),

    #[error("Audio object already registered: {0:?}")]
    AudioExists(AudioId),

    #[error("Channel not registered: {0:?}")]
    ChannelNotFound(ChannelId),

    #[error("Channel already registered: {0:?}")]
    ChannelExists(ChannelId),

    #[cfg(feature = "cpal")]
    #[error("Audio device: {0}")]
    Device(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
