//! Soundcard configuration.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SAMPLERATE: u32 = 44_100;
pub const DEFAULT_BUFFER_SIZE: usize = 1024;
pub const DEFAULT_PCM_CHANNELS: usize = 2;
pub const DEFAULT_DSP_CHANNELS: usize = 2;
pub const DEFAULT_SUB_BLOCK_COUNT: usize = 8;
pub const DEFAULT_RING_BUFFER_SIZE: usize = 4;

/// Largest buffer a single cycle may render.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Sample encoding handed to the audio backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SoundcardFormat {
    S8,
    #[default]
    S16,
    S24,
    S32,
    S64,
    Float,
    Double,
}

impl SoundcardFormat {
    /// Bytes per encoded sample. S24 is packed into 32-bit words.
    pub const fn word_size(self) -> usize {
        match self {
            Self::S8 => 1,
            Self::S16 => 2,
            Self::S24 | Self::S32 | Self::Float => 4,
            Self::S64 | Self::Double => 8,
        }
    }

    /// Encode one normalized sample little-endian into `out[..word_size()]`.
    #[inline]
    pub fn encode(self, sample: f32, out: &mut [u8]) {
        let s = sample.clamp(-1.0, 1.0) as f64;
        match self {
            Self::S8 => out[0] = ((s * i8::MAX as f64) as i8) as u8,
            Self::S16 => out[..2].copy_from_slice(&((s * i16::MAX as f64) as i16).to_le_bytes()),
            Self::S24 => {
                out[..4].copy_from_slice(&((s * 8_388_607.0) as i32).to_le_bytes());
            }
            Self::S32 => out[..4].copy_from_slice(&((s * i32::MAX as f64) as i32).to_le_bytes()),
            Self::S64 => out[..8].copy_from_slice(&((s * i64::MAX as f64) as i64).to_le_bytes()),
            Self::Float => out[..4].copy_from_slice(&(s as f32).to_le_bytes()),
            Self::Double => out[..8].copy_from_slice(&s.to_le_bytes()),
        }
    }
}

/// Configuration of the output soundcard.
///
/// Changing any of `samplerate`, `buffer_size` or the channel counts on a live
/// [`Soundcard`](crate::Soundcard) reallocates the ring buffer and regenerates
/// the delay/attack tables in one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundcardConfig {
    pub samplerate: u32,
    /// Frames per buffer.
    pub buffer_size: usize,
    pub format: SoundcardFormat,
    /// Interleaved channels handed to the backend.
    pub pcm_channels: usize,
    pub dsp_channels: usize,
    /// Lockable sub-blocks per pcm channel and ring slot.
    pub sub_block_count: usize,
    /// Number of ring slots.
    pub ring_buffer_size: usize,
}

impl Default for SoundcardConfig {
    fn default() -> Self {
        Self {
            samplerate: DEFAULT_SAMPLERATE,
            buffer_size: DEFAULT_BUFFER_SIZE,
            format: SoundcardFormat::default(),
            pcm_channels: DEFAULT_PCM_CHANNELS,
            dsp_channels: DEFAULT_DSP_CHANNELS,
            sub_block_count: DEFAULT_SUB_BLOCK_COUNT,
            ring_buffer_size: DEFAULT_RING_BUFFER_SIZE,
        }
    }
}

impl SoundcardConfig {
    pub fn validate(&self) -> Result<()> {
        if !(8000..=384_000).contains(&self.samplerate) {
            return Err(Error::InvalidConfig(format!(
                "samplerate {} out of range (8000-384000 Hz)",
                self.samplerate
            )));
        }
        if self.buffer_size == 0 || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(Error::InvalidConfig(format!(
                "buffer_size {} out of range (1-{})",
                self.buffer_size, MAX_BUFFER_SIZE
            )));
        }
        if self.pcm_channels == 0 {
            return Err(Error::InvalidConfig("pcm_channels must be at least 1".into()));
        }
        if self.dsp_channels == 0 {
            return Err(Error::InvalidConfig("dsp_channels must be at least 1".into()));
        }
        if self.sub_block_count == 0 || self.sub_block_count > self.buffer_size {
            return Err(Error::InvalidConfig(format!(
                "sub_block_count {} out of range (1-{})",
                self.sub_block_count, self.buffer_size
            )));
        }
        if self.ring_buffer_size < 2 {
            return Err(Error::InvalidConfig(format!(
                "ring_buffer_size {} too small (minimum 2)",
                self.ring_buffer_size
            )));
        }
        Ok(())
    }

    /// Samples per buffer across all pcm channels.
    pub fn samples_per_buffer(&self) -> usize {
        self.buffer_size * self.pcm_channels
    }

    /// Bytes per buffer in the configured format.
    pub fn bytes_per_buffer(&self) -> usize {
        self.samples_per_buffer() * self.format.word_size()
    }

    /// Frame range `[start, end)` covered by `block`.
    ///
    /// Blocks split the buffer as evenly as possible; when `buffer_size` is
    /// not a multiple of `sub_block_count` later blocks get the extra frame.
    pub fn sub_block_range(&self, block: usize) -> core::ops::Range<usize> {
        let start = block * self.buffer_size / self.sub_block_count;
        let end = (block + 1) * self.buffer_size / self.sub_block_count;
        start..end
    }

    /// Whether the ring has to be reallocated to go from `self` to `other`.
    pub fn ring_layout_differs(&self, other: &Self) -> bool {
        self.buffer_size != other.buffer_size
            || self.pcm_channels != other.pcm_channels
            || self.sub_block_count != other.sub_block_count
            || self.ring_buffer_size != other.ring_buffer_size
    }
}
