//! Per-buffer tic counting.

use super::table::{
    validate_timing, DelayAttackTable, DEFAULT_BPM, DEFAULT_DELAY_FACTOR, DEFAULT_PERIOD,
};
use crate::{Error, Result};
use smallvec::SmallVec;

/// What happened during one [`TimingEngine::tick`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickInfo {
    /// Frame offsets inside the buffer of every tic that started in it.
    pub attacks: SmallVec<[usize; 4]>,
    /// `note_offset` after the buffer.
    pub note_offset: u64,
    pub note_offset_absolute: u64,
    /// The loop wrapped back to its left edge during this buffer.
    pub looped: bool,
}

impl TickInfo {
    pub fn tics(&self) -> usize {
        self.attacks.len()
    }
}

/// Converts tempo into sample-accurate per-buffer tic counters.
///
/// Tic boundaries are placed period by period using the [`DelayAttackTable`].
/// Each period starts at the rounded exact position of its first tic, so the
/// last tic of a period absorbs the rounding residue and no drift builds up
/// over long runs.
#[derive(Debug, Clone)]
pub struct TimingEngine {
    samplerate: u32,
    buffer_size: usize,
    bpm: f64,
    delay_factor: f64,
    table: DelayAttackTable,

    // Epoch: the timeline since the last recompute or seek. Exact tic
    // position at `position == 0` is `epoch_tic + epoch_fraction`.
    epoch_tic: u64,
    epoch_fraction: f64,
    /// Samples rendered since the epoch started.
    position: u64,

    tact_counter: f64,
    delay_counter: u64,
    tic_counter: usize,
    note_offset: u64,
    note_offset_absolute: u64,

    loop_left: u64,
    loop_right: u64,
    do_loop: bool,
    loop_offset: u64,
}

impl TimingEngine {
    pub fn new(samplerate: u32, buffer_size: usize) -> Result<Self> {
        Self::with_tempo(samplerate, buffer_size, DEFAULT_BPM, DEFAULT_DELAY_FACTOR)
    }

    pub fn with_tempo(
        samplerate: u32,
        buffer_size: usize,
        bpm: f64,
        delay_factor: f64,
    ) -> Result<Self> {
        let table =
            DelayAttackTable::compute(samplerate, buffer_size, bpm, delay_factor, DEFAULT_PERIOD)?;

        Ok(Self {
            samplerate,
            buffer_size,
            bpm,
            delay_factor,
            table,
            epoch_tic: 0,
            epoch_fraction: 0.0,
            position: 0,
            tact_counter: 0.0,
            delay_counter: 0,
            tic_counter: 0,
            note_offset: 0,
            note_offset_absolute: 0,
            loop_left: 0,
            loop_right: DEFAULT_PERIOD as u64,
            do_loop: false,
            loop_offset: 0,
        })
    }

    /// Regenerate the tables for new inputs, keeping every counter and the
    /// progress inside the current tic. On error nothing changes.
    pub fn recompute_delay_attack(
        &mut self,
        samplerate: u32,
        buffer_size: usize,
        bpm: f64,
        delay_factor: f64,
    ) -> Result<()> {
        validate_timing(samplerate, buffer_size, bpm, delay_factor)?;

        if samplerate == self.samplerate
            && buffer_size == self.buffer_size
            && bpm == self.bpm
            && delay_factor == self.delay_factor
        {
            return Ok(());
        }

        let table =
            DelayAttackTable::compute(samplerate, buffer_size, bpm, delay_factor, DEFAULT_PERIOD)?;
        let fraction = self.tic_fraction();

        self.samplerate = samplerate;
        self.buffer_size = buffer_size;
        self.bpm = bpm;
        self.delay_factor = delay_factor;
        self.table = table;
        self.reanchor(self.note_offset_absolute, fraction);

        tracing::debug!(
            samplerate,
            buffer_size,
            bpm,
            delay_factor,
            "recomputed delay/attack tables"
        );
        Ok(())
    }

    pub fn set_bpm(&mut self, bpm: f64) -> Result<()> {
        self.recompute_delay_attack(self.samplerate, self.buffer_size, bpm, self.delay_factor)
    }

    pub fn set_delay_factor(&mut self, delay_factor: f64) -> Result<()> {
        self.recompute_delay_attack(self.samplerate, self.buffer_size, self.bpm, delay_factor)
    }

    /// Advance by one buffer.
    pub fn tick(&mut self) -> TickInfo {
        let start = self.position as i64;
        let end = start + self.buffer_size as i64;

        let mut info = TickInfo::default();

        loop {
            let next = self.note_offset_absolute + 1;
            let boundary = self.boundary(next);
            if boundary >= end {
                break;
            }
            info.attacks.push((boundary - start).max(0) as usize);

            self.note_offset_absolute = next;
            self.tic_counter = (self.tic_counter + 1) % self.table.period();

            if self.do_loop && self.note_offset + 1 >= self.loop_right {
                self.note_offset = self.loop_left;
                self.loop_offset = self.note_offset_absolute;
                info.looped = true;
            } else {
                self.note_offset += 1;
            }
        }

        self.position = end as u64;
        self.tact_counter = self.exact_tic_at(self.position);

        if info.attacks.is_empty() {
            self.delay_counter += 1;
        } else {
            self.delay_counter = 0;
        }

        info.note_offset = self.note_offset;
        info.note_offset_absolute = self.note_offset_absolute;
        info
    }

    /// Stop: rewind all offsets and counters to zero.
    pub fn reset(&mut self) {
        self.note_offset = 0;
        self.delay_counter = 0;
        self.reanchor(0, 0.0);
        self.loop_offset = 0;
    }

    /// Seek the loop-relative position.
    pub fn set_note_offset(&mut self, note_offset: u64) {
        self.note_offset = note_offset;
    }

    /// Seek the absolute position. The current buffer's remainder is treated
    /// as the start of tic `note_offset_absolute`.
    pub fn set_note_offset_absolute(&mut self, note_offset_absolute: u64) {
        self.delay_counter = 0;
        self.reanchor(note_offset_absolute, 0.0);
    }

    pub fn set_loop(&mut self, left: u64, right: u64, do_loop: bool) -> Result<()> {
        if left >= right {
            return Err(Error::InvalidLoopRange { left, right });
        }
        self.loop_left = left;
        self.loop_right = right;
        if do_loop && !self.do_loop {
            self.loop_offset = self.note_offset;
        }
        self.do_loop = do_loop;
        Ok(())
    }

    pub fn loop_range(&self) -> (u64, u64, bool) {
        (self.loop_left, self.loop_right, self.do_loop)
    }

    /// Absolute tic at which looping was last armed or last wrapped.
    pub fn loop_offset(&self) -> u64 {
        self.loop_offset
    }

    pub fn table(&self) -> &DelayAttackTable {
        &self.table
    }

    /// Buffers spanned by the current tic.
    pub fn delay(&self) -> f64 {
        self.table.delay()[self.tic_counter]
    }

    /// Frame offset of the current tic inside its first buffer.
    pub fn attack(&self) -> usize {
        self.table.attack()[self.tic_counter]
    }

    /// Buffers per tic for the current inputs.
    pub fn absolute_delay(&self) -> f64 {
        self.table.samples_per_tic() / self.buffer_size as f64
    }

    pub fn samplerate(&self) -> u32 {
        self.samplerate
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn delay_factor(&self) -> f64 {
        self.delay_factor
    }

    /// Tics elapsed as a real number.
    pub fn tact_counter(&self) -> f64 {
        self.tact_counter
    }

    /// Buffers since the last tic started.
    pub fn delay_counter(&self) -> u64 {
        self.delay_counter
    }

    pub fn tic_counter(&self) -> usize {
        self.tic_counter
    }

    pub fn note_offset(&self) -> u64 {
        self.note_offset
    }

    pub fn note_offset_absolute(&self) -> u64 {
        self.note_offset_absolute
    }

    fn reanchor(&mut self, tic: u64, fraction: f64) {
        self.epoch_tic = tic;
        self.epoch_fraction = fraction;
        self.position = 0;
        self.note_offset_absolute = tic;
        self.tic_counter = (tic % self.table.period() as u64) as usize;
        self.tact_counter = tic as f64 + fraction;
    }

    /// Exact tic position at an epoch sample.
    fn exact_tic_at(&self, position: u64) -> f64 {
        self.epoch_tic as f64 + self.epoch_fraction + position as f64 / self.table.samples_per_tic()
    }

    /// Epoch sample at which absolute tic `tic` starts.
    fn boundary(&self, tic: u64) -> i64 {
        let period = self.table.period() as u64;
        let period_index = tic / period;
        let within = (tic % period) as usize;

        let first = (period_index * period) as f64;
        let exact_start =
            (first - self.epoch_tic as f64 - self.epoch_fraction) * self.table.samples_per_tic();
        exact_start.round() as i64 + self.table.boundary(within) as i64
    }

    /// Progress in `[0, 1)` through the tic currently sounding.
    fn tic_fraction(&self) -> f64 {
        let start = self.boundary(self.note_offset_absolute);
        let end = self.boundary(self.note_offset_absolute + 1);
        let len = (end - start).max(1) as f64;
        ((self.position as i64 - start) as f64 / len).clamp(0.0, 1.0 - f64::EPSILON)
    }
}
