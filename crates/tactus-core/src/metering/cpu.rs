//! Cycle load tracking for the driver callback.

use crate::lockfree::{AtomicFlag, AtomicFloat};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// CPU metrics snapshot.
#[derive(Debug, Clone, Default)]
pub struct CpuMetrics {
    pub average: f32,
    pub peak: f32,
    pub current: f32,
    /// Cycles that took longer than their buffer.
    pub overruns: u64,
    pub buffer_size: usize,
    pub max_time_us: f64,
    pub actual_time_us: f64,
}

/// Fraction of the buffer period a cycle took to render.
pub struct CpuMeter {
    current: AtomicFloat,
    peak: AtomicFloat,
    average: AtomicFloat,
    overruns: AtomicU64,
    samples: AtomicU32,
    budget_secs: f64,
    buffer_size: usize,
    enabled: AtomicFlag,
}

impl CpuMeter {
    pub fn new(samplerate: u32, buffer_size: usize) -> Self {
        Self {
            current: AtomicFloat::new(0.0),
            peak: AtomicFloat::new(0.0),
            average: AtomicFloat::new(0.0),
            overruns: AtomicU64::new(0),
            samples: AtomicU32::new(0),
            budget_secs: buffer_size as f64 / samplerate as f64,
            buffer_size,
            enabled: AtomicFlag::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.set(true);
    }

    pub fn disable(&self) {
        self.enabled.set(false);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    pub fn record(&self, elapsed: Duration) {
        if !self.is_enabled() {
            return;
        }

        let load = (elapsed.as_secs_f64() / self.budget_secs) as f32;
        self.current.set(load);
        self.peak.fetch_max(load);

        // Exponential moving average
        let count = self.samples.fetch_add(1, Ordering::Relaxed);
        let alpha = 1.0 / (count.min(100) + 1) as f32;
        let avg = self.average.get();
        self.average.set(avg * (1.0 - alpha) + load * alpha);

        if load > 1.0 {
            self.overruns.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn metrics(&self) -> CpuMetrics {
        let max_time_us = self.budget_secs * 1_000_000.0;

        CpuMetrics {
            average: self.average.get() * 100.0,
            peak: self.peak.get() * 100.0,
            current: self.current.get() * 100.0,
            overruns: self.overruns.load(Ordering::Relaxed),
            buffer_size: self.buffer_size,
            max_time_us,
            actual_time_us: self.current.get() as f64 * max_time_us,
        }
    }

    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.current.set(0.0);
        self.peak.set(0.0);
        self.average.set(0.0);
        self.overruns.store(0, Ordering::Relaxed);
        self.samples.store(0, Ordering::Relaxed);
    }
}
