//! Delay/attack tables.
//!
//! A tic is the smallest musical step the sequencer advances by: a 1/16 note
//! scaled by the delay factor. Tic lengths are rarely whole buffers, so each
//! table period records for every tic how many buffers it spans (`delay`) and
//! where inside its buffer it starts (`attack`).

use crate::{Error, Result};

/// Tics per table period.
pub const DEFAULT_PERIOD: usize = 64;
pub const DEFAULT_BPM: f64 = 120.0;
pub const DEFAULT_DELAY_FACTOR: f64 = 0.25;
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 999.0;

/// Buffers per tic.
#[inline]
pub fn absolute_delay(samplerate: u32, buffer_size: usize, bpm: f64, delay_factor: f64) -> f64 {
    60.0 * ((samplerate as f64 / buffer_size as f64) / bpm) * ((1.0 / 16.0) * (1.0 / delay_factor))
}

/// Samples per tic.
#[inline]
pub fn samples_per_tic(samplerate: u32, bpm: f64, delay_factor: f64) -> f64 {
    60.0 * samplerate as f64 / bpm / 16.0 / delay_factor
}

/// Reject timing inputs that cannot produce a usable table.
pub fn validate_timing(
    samplerate: u32,
    buffer_size: usize,
    bpm: f64,
    delay_factor: f64,
) -> Result<()> {
    if samplerate == 0 {
        return Err(Error::InvalidConfig("samplerate must be non-zero".into()));
    }
    if buffer_size == 0 {
        return Err(Error::InvalidConfig("buffer_size must be non-zero".into()));
    }
    if !bpm.is_finite() || !(MIN_BPM..=MAX_BPM).contains(&bpm) {
        return Err(Error::InvalidTempo(bpm));
    }
    if !delay_factor.is_finite() || delay_factor <= 0.0 {
        return Err(Error::InvalidDelayFactor(delay_factor));
    }
    // tics shorter than a sample would collapse boundaries
    if samples_per_tic(samplerate, bpm, delay_factor) < 1.0 {
        return Err(Error::InvalidDelayFactor(delay_factor));
    }
    Ok(())
}

/// Per-tic delay and attack for one period.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayAttackTable {
    buffer_size: usize,
    samples_per_tic: f64,
    /// `period + 1` boundaries, sample offsets from the period start.
    boundaries: Vec<u64>,
    attack: Vec<usize>,
    delay: Vec<f64>,
}

impl DelayAttackTable {
    pub fn compute(
        samplerate: u32,
        buffer_size: usize,
        bpm: f64,
        delay_factor: f64,
        period: usize,
    ) -> Result<Self> {
        validate_timing(samplerate, buffer_size, bpm, delay_factor)?;
        if period == 0 {
            return Err(Error::InvalidConfig("period must be non-zero".into()));
        }

        let spt = samples_per_tic(samplerate, bpm, delay_factor);

        // Rounding each boundary rather than each length makes consecutive
        // tics alternate between the floor and ceiling sample counts.
        let boundaries: Vec<u64> = (0..=period)
            .map(|k| (k as f64 * spt).round() as u64)
            .collect();

        let attack = boundaries[..period]
            .iter()
            .map(|&b| (b % buffer_size as u64) as usize)
            .collect();

        let delay = boundaries
            .windows(2)
            .map(|w| (w[1] - w[0]) as f64 / buffer_size as f64)
            .collect();

        Ok(Self {
            buffer_size,
            samples_per_tic: spt,
            boundaries,
            attack,
            delay,
        })
    }

    pub fn period(&self) -> usize {
        self.attack.len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn samples_per_tic(&self) -> f64 {
        self.samples_per_tic
    }

    /// Buffers spanned by each tic.
    pub fn delay(&self) -> &[f64] {
        &self.delay
    }

    /// Frame offset inside its buffer at which each tic starts.
    pub fn attack(&self) -> &[usize] {
        &self.attack
    }

    /// Start of `tic` relative to the period start, `tic` in `0..=period`.
    #[inline]
    pub fn boundary(&self, tic: usize) -> u64 {
        self.boundaries[tic]
    }

    /// Samples covered by a full period.
    pub fn period_samples(&self) -> u64 {
        self.boundaries[self.period()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn test_absolute_delay() {
        // 44100 / 1024 at 120 bpm: 21.53 buffers per beat, 1/16 per tic
        let delay = absolute_delay(44100, 1024, 120.0, 1.0);
        assert_relative_eq!(delay, 1.345_825_195, epsilon = 1e-6);
        assert_relative_eq!(
            delay * 1024.0,
            samples_per_tic(44100, 120.0, 1.0),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_attack_alternates() {
        // 1378.125 samples per tic: lengths alternate 1378 / 1379
        let table = DelayAttackTable::compute(44100, 1024, 120.0, 1.0, DEFAULT_PERIOD).unwrap();
        let lengths: Vec<u64> = (0..8)
            .map(|k| table.boundary(k + 1) - table.boundary(k))
            .collect();
        assert!(lengths.iter().all(|&l| l == 1378 || l == 1379));
        assert!(lengths.contains(&1378));
        assert!(lengths.contains(&1379));
        assert_eq!(table.attack()[0], 0);
        assert_eq!(table.attack()[1], 1378 - 1024);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(matches!(
            DelayAttackTable::compute(44100, 1024, 10.0, 1.0, 64),
            Err(Error::InvalidTempo(_))
        ));
        assert!(matches!(
            DelayAttackTable::compute(44100, 0, 120.0, 1.0, 64),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            DelayAttackTable::compute(0, 1024, 120.0, 1.0, 64),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            DelayAttackTable::compute(44100, 1024, 120.0, 0.0, 64),
            Err(Error::InvalidDelayFactor(_))
        ));
        assert!(matches!(
            DelayAttackTable::compute(44100, 1024, 120.0, f64::NAN, 64),
            Err(Error::InvalidDelayFactor(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_period_sum_matches_sample_count(
            bpm in 20.01f64..400.0,
            exp in 6u32..=12,
            delay_factor in prop::sample::select(vec![0.25f64, 0.5, 1.0, 2.0]),
        ) {
            let buffer_size = 1usize << exp;
            let table =
                DelayAttackTable::compute(44100, buffer_size, bpm, delay_factor, DEFAULT_PERIOD)
                    .unwrap();

            let summed: f64 = table.delay().iter().sum::<f64>() * buffer_size as f64;
            let expected = DEFAULT_PERIOD as f64 * samples_per_tic(44100, bpm, delay_factor);
            prop_assert!((summed - expected).abs() <= buffer_size as f64);
            prop_assert!((summed - expected).abs() <= 1.0);
        }

        #[test]
        fn prop_recompute_is_idempotent(bpm in 20.01f64..400.0, exp in 6u32..=12) {
            let buffer_size = 1usize << exp;
            let compute =
                || DelayAttackTable::compute(48000, buffer_size, bpm, 0.25, DEFAULT_PERIOD);
            let (a, b) = (compute().unwrap(), compute().unwrap());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_attack_within_buffer(bpm in 20.01f64..400.0, exp in 6u32..=12) {
            let buffer_size = 1usize << exp;
            let table =
                DelayAttackTable::compute(44100, buffer_size, bpm, 1.0, DEFAULT_PERIOD).unwrap();
            prop_assert!(table.attack().iter().all(|&a| a < buffer_size));
        }
    }
}
