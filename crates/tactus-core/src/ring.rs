//! Ring buffer manager.
//!
//! `N` equally sized slots sit between the stage threads (producers) and the
//! audio backend (consumer). Slots are planar: every pcm channel is split
//! into `sub_block_count` frame ranges, each behind its own lock, so threads
//! rendering different channels or frame ranges never contend.
//!
//! A single monotonically increasing buffer flag selects the write slot
//! (`flag % N`); the read slot is always the one before it, so the producer
//! never blocks on the consumer.

use crate::config::{SoundcardConfig, SoundcardFormat};
use crate::lockfree::AtomicFlag;
use crate::{Error, Result};
use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut, Range};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Outcome of [`RingBuffer::consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeStatus {
    /// A completed slot was handed out.
    Ready,
    /// The read slot was not ready; the previous buffer was re-presented.
    Underflow,
}

struct Slot {
    complete: Mutex<bool>,
    /// Indexed by `channel * sub_block_count + block`.
    sub_blocks: Box<[Mutex<Vec<f32>>]>,
}

/// Exclusive access to one sub-block of a slot.
pub struct SubBlockGuard<'a> {
    guard: MutexGuard<'a, Vec<f32>>,
    frames: Range<usize>,
}

impl SubBlockGuard<'_> {
    /// Frames of the slot this block covers.
    pub fn frames(&self) -> Range<usize> {
        self.frames.clone()
    }
}

impl Deref for SubBlockGuard<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.guard
    }
}

impl DerefMut for SubBlockGuard<'_> {
    fn deref_mut(&mut self) -> &mut [f32] {
        &mut self.guard
    }
}

pub struct RingBuffer {
    buffer_size: usize,
    pcm_channels: usize,
    sub_block_count: usize,
    format: SoundcardFormat,
    slots: Box<[Slot]>,
    block_ranges: Box<[Range<usize>]>,

    buffer_flag: AtomicUsize,
    underflow: AtomicFlag,
    underflow_count: AtomicU64,
    available: AtomicFlag,

    // consumer side only
    last_complete: Mutex<Vec<f32>>,
    scratch: Mutex<Vec<f32>>,
}

impl RingBuffer {
    /// `config` must already be validated.
    pub fn new(config: &SoundcardConfig) -> Self {
        let block_ranges: Box<[Range<usize>]> = (0..config.sub_block_count)
            .map(|b| config.sub_block_range(b))
            .collect();

        let slots = (0..config.ring_buffer_size)
            .map(|_| Slot {
                complete: Mutex::new(false),
                sub_blocks: (0..config.pcm_channels)
                    .flat_map(|_| block_ranges.iter())
                    .map(|r| Mutex::new(vec![0.0; r.len()]))
                    .collect(),
            })
            .collect();

        Self {
            buffer_size: config.buffer_size,
            pcm_channels: config.pcm_channels,
            sub_block_count: config.sub_block_count,
            format: config.format,
            slots,
            block_ranges,
            buffer_flag: AtomicUsize::new(0),
            underflow: AtomicFlag::new(false),
            underflow_count: AtomicU64::new(0),
            available: AtomicFlag::new(false),
            last_complete: Mutex::new(vec![0.0; config.samples_per_buffer()]),
            scratch: Mutex::new(vec![0.0; config.samples_per_buffer()]),
        }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn pcm_channels(&self) -> usize {
        self.pcm_channels
    }

    pub fn sub_block_count(&self) -> usize {
        self.sub_block_count
    }

    pub fn format(&self) -> SoundcardFormat {
        self.format
    }

    /// Interleaved samples per buffer.
    pub fn samples_per_buffer(&self) -> usize {
        self.buffer_size * self.pcm_channels
    }

    pub fn sub_block_frames(&self, block: usize) -> Range<usize> {
        self.block_ranges[block].clone()
    }

    /// Sub-block containing `frame`.
    pub fn block_of_frame(&self, frame: usize) -> usize {
        self.block_ranges
            .iter()
            .position(|r| r.contains(&frame))
            .unwrap_or(self.sub_block_count - 1)
    }

    /// Slot producers currently write into.
    #[inline]
    pub fn current_buffer(&self) -> usize {
        self.buffer_flag.load(Ordering::Acquire) % self.slots.len()
    }

    /// Slot that becomes the write slot after the next switch.
    #[inline]
    pub fn next_buffer(&self) -> usize {
        (self.current_buffer() + 1) % self.slots.len()
    }

    /// Slot the consumer reads: the one before the write slot.
    #[inline]
    pub fn prev_buffer(&self) -> usize {
        let n = self.slots.len();
        (self.current_buffer() + n - 1) % n
    }

    /// Advance the write slot. The new write slot is cleared and marked
    /// incomplete. Returns its index.
    pub fn switch_buffer_flag(&self) -> usize {
        let n = self.slots.len();
        let flag = self.buffer_flag.fetch_add(1, Ordering::AcqRel) + 1;
        let write = flag % n;

        let slot = &self.slots[write];
        *slot.complete.lock() = false;
        for block in slot.sub_blocks.iter() {
            block.lock().fill(0.0);
        }
        write
    }

    fn slot(&self, slot: usize) -> Result<&Slot> {
        self.slots.get(slot).ok_or(Error::InvalidSlot {
            slot,
            slots: self.slots.len(),
        })
    }

    fn block_index(&self, channel: usize, block: usize) -> Result<usize> {
        if channel >= self.pcm_channels || block >= self.sub_block_count {
            return Err(Error::InvalidSubBlock { channel, block });
        }
        Ok(channel * self.sub_block_count + block)
    }

    /// Lock a sub-block, waiting for a concurrent writer if needed.
    pub fn lock_sub_block(
        &self,
        slot: usize,
        channel: usize,
        block: usize,
    ) -> Result<SubBlockGuard<'_>> {
        let index = self.block_index(channel, block)?;
        Ok(SubBlockGuard {
            guard: self.slot(slot)?.sub_blocks[index].lock(),
            frames: self.block_ranges[block].clone(),
        })
    }

    /// Lock a sub-block without waiting.
    pub fn try_lock_sub_block(
        &self,
        slot: usize,
        channel: usize,
        block: usize,
    ) -> Result<SubBlockGuard<'_>> {
        let index = self.block_index(channel, block)?;
        let guard = self.slot(slot)?.sub_blocks[index]
            .try_lock()
            .ok_or(Error::SubBlockBusy {
                slot,
                channel,
                block,
            })?;
        Ok(SubBlockGuard {
            guard,
            frames: self.block_ranges[block].clone(),
        })
    }

    /// Add `samples` for one channel into the slot, starting at `frame`.
    /// Only the sub-blocks touched are locked, one at a time.
    pub fn mix_channel(
        &self,
        slot: usize,
        channel: usize,
        frame: usize,
        samples: &[f32],
    ) -> Result<()> {
        let end = (frame + samples.len()).min(self.buffer_size);
        let mut cursor = frame;
        while cursor < end {
            let block = self.block_of_frame(cursor);
            let mut guard = self.lock_sub_block(slot, channel, block)?;
            let range = guard.frames();
            let stop = range.end.min(end);
            for f in cursor..stop {
                guard[f - range.start] += samples[f - frame];
            }
            cursor = stop;
        }
        Ok(())
    }

    /// Publish `slot` to the consumer.
    pub fn mark_complete(&self, slot: usize) -> Result<()> {
        *self.slot(slot)?.complete.lock() = true;
        self.available.set(true);
        Ok(())
    }

    /// Completed and no sub-block held by a producer.
    pub fn is_consumable(&self, slot: usize) -> bool {
        match self.slots.get(slot) {
            Some(s) => *s.complete.lock() && s.sub_blocks.iter().all(|b| !b.is_locked()),
            None => false,
        }
    }

    /// Whether any slot has been completed since creation.
    pub fn is_available(&self) -> bool {
        self.available.get()
    }

    /// Copy the read slot interleaved into `out`. Never blocks on producers:
    /// an incomplete or still locked slot is reported as underflow and the
    /// last completed buffer is re-presented.
    pub fn consume(&self, out: &mut [f32]) -> Result<ConsumeStatus> {
        let needed = self.samples_per_buffer();
        if out.len() < needed {
            return Err(Error::OutputTooSmall {
                needed,
                got: out.len(),
            });
        }
        let out = &mut out[..needed];
        let read = self.prev_buffer();
        let slot = &self.slots[read];

        let ready = slot.complete.try_lock().map(|c| *c).unwrap_or(false);
        if ready && self.copy_interleaved(slot, out) {
            *slot.complete.lock() = false;
            self.last_complete.lock().copy_from_slice(out);
            return Ok(ConsumeStatus::Ready);
        }

        self.underflow_count.fetch_add(1, Ordering::Relaxed);
        if !self.underflow.swap(true) {
            tracing::warn!(slot = read, "ring buffer underflow, repeating last buffer");
        }
        out.copy_from_slice(&self.last_complete.lock());
        Ok(ConsumeStatus::Underflow)
    }

    /// [`consume`](Self::consume) encoded in the configured format.
    pub fn consume_encoded(&self, out: &mut [u8]) -> Result<ConsumeStatus> {
        let needed = self.samples_per_buffer() * self.format.word_size();
        if out.len() < needed {
            return Err(Error::OutputTooSmall {
                needed,
                got: out.len(),
            });
        }
        let mut scratch = self.scratch.lock();
        let status = self.consume(&mut scratch)?;
        let word = self.format.word_size();
        for (sample, bytes) in scratch.iter().zip(out.chunks_exact_mut(word)) {
            self.format.encode(*sample, bytes);
        }
        Ok(status)
    }

    fn copy_interleaved(&self, slot: &Slot, out: &mut [f32]) -> bool {
        let channels = self.pcm_channels;
        for channel in 0..channels {
            for (block, range) in self.block_ranges.iter().enumerate() {
                let Some(data) = slot.sub_blocks[channel * self.sub_block_count + block].try_lock()
                else {
                    return false;
                };
                for (i, sample) in data.iter().enumerate() {
                    out[(range.start + i) * channels + channel] = *sample;
                }
            }
        }
        true
    }

    /// Sticky: stays set until [`clear_underflow`](Self::clear_underflow).
    pub fn underflow(&self) -> bool {
        self.underflow.get()
    }

    pub fn clear_underflow(&self) {
        self.underflow.set(false);
    }

    pub fn underflow_count(&self) -> u64 {
        self.underflow_count.load(Ordering::Relaxed)
    }
}
