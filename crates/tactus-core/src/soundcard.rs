//! Soundcard state: configuration, timing and ring buffer kept consistent.

use crate::config::SoundcardConfig;
use crate::ring::RingBuffer;
use crate::timing::{TickInfo, TimingEngine, DEFAULT_BPM, DEFAULT_DELAY_FACTOR};
use crate::Result;
use arc_swap::ArcSwap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;

/// One cycle's view handed to the stage threads.
#[derive(Clone)]
pub struct CycleFrame {
    pub tick: TickInfo,
    /// Slot the cycle renders into.
    pub slot: usize,
    pub ring: Arc<RingBuffer>,
    /// Configuration `ring` and `tick` were built for.
    pub config: Arc<SoundcardConfig>,
}

/// Owns the timing engine and the ring buffer.
///
/// Reconfiguration swaps both while holding the timing lock, so the driving
/// thread never observes tables for one buffer size and a ring for another.
/// Producers still rendering into the previous ring keep their `Arc` until
/// they finish.
pub struct Soundcard {
    config: ArcSwap<SoundcardConfig>,
    timing: Mutex<TimingEngine>,
    ring: ArcSwap<RingBuffer>,
}

impl Soundcard {
    pub fn new(config: SoundcardConfig) -> Result<Self> {
        Self::with_tempo(config, DEFAULT_BPM, DEFAULT_DELAY_FACTOR)
    }

    pub fn with_tempo(config: SoundcardConfig, bpm: f64, delay_factor: f64) -> Result<Self> {
        config.validate()?;
        let timing =
            TimingEngine::with_tempo(config.samplerate, config.buffer_size, bpm, delay_factor)?;
        let ring = RingBuffer::new(&config);

        Ok(Self {
            config: ArcSwap::from_pointee(config),
            timing: Mutex::new(timing),
            ring: ArcSwap::from_pointee(ring),
        })
    }

    pub fn config(&self) -> Arc<SoundcardConfig> {
        self.config.load_full()
    }

    pub fn ring(&self) -> Arc<RingBuffer> {
        self.ring.load_full()
    }

    pub fn timing(&self) -> MutexGuard<'_, TimingEngine> {
        self.timing.lock()
    }

    /// Apply a new configuration. Invalid input leaves everything unchanged.
    pub fn reconfigure(&self, config: SoundcardConfig) -> Result<()> {
        config.validate()?;

        let mut timing = self.timing.lock();
        let (bpm, delay_factor) = (timing.bpm(), timing.delay_factor());
        timing.recompute_delay_attack(config.samplerate, config.buffer_size, bpm, delay_factor)?;

        let current = self.config.load();
        if current.ring_layout_differs(&config) || current.format != config.format {
            self.ring.store(Arc::new(RingBuffer::new(&config)));
            tracing::debug!(
                buffer_size = config.buffer_size,
                pcm_channels = config.pcm_channels,
                slots = config.ring_buffer_size,
                "reallocated ring buffer"
            );
        }
        self.config.store(Arc::new(config));
        Ok(())
    }

    pub fn set_bpm(&self, bpm: f64) -> Result<()> {
        self.timing.lock().set_bpm(bpm)
    }

    pub fn set_delay_factor(&self, delay_factor: f64) -> Result<()> {
        self.timing.lock().set_delay_factor(delay_factor)
    }

    pub fn set_loop(&self, left: u64, right: u64, do_loop: bool) -> Result<()> {
        self.timing.lock().set_loop(left, right, do_loop)
    }

    /// Stop playback: offsets back to zero.
    pub fn stop(&self) {
        self.timing.lock().reset();
    }

    /// Driver side of a cycle: advance the tic counters and move to the next
    /// write slot.
    pub fn begin_cycle(&self) -> CycleFrame {
        let mut timing = self.timing.lock();
        let tick = timing.tick();
        let ring = self.ring.load_full();
        let config = self.config.load_full();
        let slot = ring.switch_buffer_flag();
        CycleFrame {
            tick,
            slot,
            ring,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::ConsumeStatus;
    use crate::Error;

    #[test]
    fn test_reconfigure_swaps_ring_and_tables() {
        let card = Soundcard::new(SoundcardConfig::default()).unwrap();
        let old_ring = card.ring();

        card.reconfigure(SoundcardConfig {
            buffer_size: 512,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(card.ring().buffer_size(), 512);
        assert_eq!(card.timing().buffer_size(), 512);
        assert_eq!(old_ring.buffer_size(), 1024);
    }

    #[test]
    fn test_invalid_reconfigure_retains_config() {
        let card = Soundcard::new(SoundcardConfig::default()).unwrap();
        let err = card.reconfigure(SoundcardConfig {
            buffer_size: 0,
            ..Default::default()
        });
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
        assert_eq!(card.config().buffer_size, 1024);
        assert_eq!(card.ring().buffer_size(), 1024);
        assert_eq!(card.timing().buffer_size(), 1024);
    }

    #[test]
    fn test_tempo_change_keeps_ring() {
        let card = Soundcard::new(SoundcardConfig::default()).unwrap();
        let ring = card.ring();
        card.set_bpm(90.0).unwrap();
        assert!(Arc::ptr_eq(&ring, &card.ring()));
        assert!(card.set_bpm(1000.0).is_err());
        assert_eq!(card.timing().bpm(), 90.0);
    }

    #[test]
    fn test_begin_cycle_renders_into_write_slot() {
        let card = Soundcard::new(SoundcardConfig {
            buffer_size: 64,
            sub_block_count: 4,
            ..Default::default()
        })
        .unwrap();

        let frame = card.begin_cycle();
        frame.ring.mix_channel(frame.slot, 0, 0, &[0.25; 64]).unwrap();
        frame.ring.mark_complete(frame.slot).unwrap();

        let next = card.begin_cycle();
        assert_ne!(next.slot, frame.slot);
        let mut out = vec![0.0; 128];
        assert_eq!(next.ring.consume(&mut out).unwrap(), ConsumeStatus::Ready);
        assert_eq!(out[0], 0.25);
    }

    #[test]
    fn test_cycle_never_mixes_configurations() {
        let card = Soundcard::new(SoundcardConfig {
            buffer_size: 64,
            ..Default::default()
        })
        .unwrap();
        let layouts = [(64, 2, 4), (128, 1, 3)];

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..200 {
                    let (buffer_size, pcm_channels, ring_buffer_size) = layouts[i % 2];
                    card.reconfigure(SoundcardConfig {
                        buffer_size,
                        pcm_channels,
                        ring_buffer_size,
                        ..Default::default()
                    })
                    .unwrap();
                }
            });

            for _ in 0..500 {
                let frame = card.begin_cycle();
                let ring = &frame.ring;
                assert_eq!(frame.config.buffer_size, ring.buffer_size());
                assert_eq!(frame.config.pcm_channels, ring.pcm_channels());
                assert_eq!(frame.config.ring_buffer_size, ring.slot_count());
                assert!(frame.slot < ring.slot_count());
                assert!(frame.tick.attacks.iter().all(|a| *a < ring.buffer_size()));
            }
        });
    }
}
