//! Meter ports and the sampler thread that snapshots them.
//!
//! Processors publish values into [`MeterPort`]s from the audio thread. The
//! sampler reads them on its own fixed timer with atomic loads only and
//! publishes an immutable [`MeterSnapshot`], so readers never touch engine
//! state and never block the audio thread.

use crate::lockfree::{AtomicFlag, AtomicFloat};
use crate::Result;
use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thread_priority::ThreadPriority;

pub const DEFAULT_SAMPLE_INTERVAL: Duration = Duration::from_millis(33);

/// A single metered value.
///
/// The peak hold belongs to one sampling window. The audio side starts a new
/// hold on its first write after the sampler's clock moved on, so the sampler
/// itself only ever reads the port.
#[derive(Debug)]
pub struct MeterPort {
    value: AtomicFloat,
    peak: AtomicFloat,
    window: AtomicU64,
    clock: Arc<AtomicU64>,
}

impl MeterPort {
    fn new(clock: Arc<AtomicU64>) -> Self {
        Self {
            value: AtomicFloat::new(0.0),
            peak: AtomicFloat::new(0.0),
            window: AtomicU64::new(clock.load(Ordering::Acquire)),
            clock,
        }
    }

    /// Audio thread side.
    #[inline]
    pub fn set(&self, value: f32) {
        self.value.set(value);
        let window = self.clock.load(Ordering::Acquire);
        if self.window.swap(window, Ordering::AcqRel) == window {
            self.peak.fetch_max(value.abs());
        } else {
            self.peak.set(value.abs());
        }
    }

    #[inline]
    pub fn get(&self) -> f32 {
        self.value.get()
    }

    /// Largest magnitude written in the current sampling window.
    pub fn peak(&self) -> f32 {
        self.peak_in(self.clock.load(Ordering::Acquire))
    }

    fn peak_in(&self, window: u64) -> f32 {
        if self.window.load(Ordering::Acquire) == window {
            self.peak.get()
        } else {
            0.0
        }
    }
}

/// Named meter ports sharing one sampling clock.
#[derive(Default)]
pub struct MeterRegistry {
    ports: DashMap<String, Arc<MeterPort>>,
    /// Snapshots taken so far; the index of the open sampling window.
    clock: Arc<AtomicU64>,
}

impl MeterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the port named `name`.
    pub fn port(&self, name: &str) -> Arc<MeterPort> {
        if let Some(port) = self.ports.get(name) {
            return Arc::clone(&port);
        }
        Arc::clone(
            self.ports
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(MeterPort::new(Arc::clone(&self.clock))))
                .value(),
        )
    }

    pub fn remove(&self, name: &str) -> bool {
        self.ports.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Read every port for the open window, then close it.
    fn sample(&self, epoch: Instant) -> MeterSnapshot {
        let window = self.clock.load(Ordering::Acquire);
        let mut values: Vec<MeterReading> = self
            .ports
            .iter()
            .map(|entry| MeterReading {
                name: entry.key().clone(),
                value: entry.value().get(),
                peak: entry.value().peak_in(window),
            })
            .collect();
        values.sort_by(|a, b| a.name.cmp(&b.name));
        let sequence = self.clock.fetch_add(1, Ordering::AcqRel) + 1;

        MeterSnapshot {
            sequence,
            elapsed: epoch.elapsed(),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeterReading {
    pub name: String,
    pub value: f32,
    /// Largest magnitude written since the previous snapshot.
    pub peak: f32,
}

/// Immutable view published by the sampler.
#[derive(Debug, Clone, Default)]
pub struct MeterSnapshot {
    /// Increments with every snapshot; 0 before the first.
    pub sequence: u64,
    /// Time since the sampler started.
    pub elapsed: Duration,
    pub values: Vec<MeterReading>,
}

impl MeterSnapshot {
    pub fn get(&self, name: &str) -> Option<&MeterReading> {
        self.values
            .binary_search_by(|r| r.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.values[i])
    }
}

/// Read-only endpoint for UIs and remote surfaces.
#[derive(Clone)]
pub struct MeterHandle {
    snapshot: Arc<ArcSwap<MeterSnapshot>>,
}

impl MeterHandle {
    pub fn snapshot(&self) -> Arc<MeterSnapshot> {
        self.snapshot.load_full()
    }
}

/// Background thread snapshotting a [`MeterRegistry`] on a fixed timer.
pub struct MeterSampler {
    registry: Arc<MeterRegistry>,
    snapshot: Arc<ArcSwap<MeterSnapshot>>,
    interval: Duration,
    shutdown: Arc<AtomicFlag>,
    thread_handle: Option<JoinHandle<()>>,
}

impl MeterSampler {
    pub fn new(registry: Arc<MeterRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            snapshot: Arc::new(ArcSwap::from_pointee(MeterSnapshot::default())),
            interval,
            shutdown: Arc::new(AtomicFlag::new(false)),
            thread_handle: None,
        }
    }

    pub fn handle(&self) -> MeterHandle {
        MeterHandle {
            snapshot: Arc::clone(&self.snapshot),
        }
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.is_some()
    }

    /// Take one snapshot on the calling thread.
    pub fn sample_now(&self) -> Arc<MeterSnapshot> {
        let snapshot = Arc::new(self.registry.sample(Instant::now()));
        self.snapshot.store(Arc::clone(&snapshot));
        snapshot
    }

    pub fn start(&mut self) -> Result<()> {
        if self.thread_handle.is_some() {
            return Ok(());
        }
        self.shutdown.set(false);

        let registry = Arc::clone(&self.registry);
        let snapshot = Arc::clone(&self.snapshot);
        let shutdown = Arc::clone(&self.shutdown);
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("tactus-meter".into())
            .spawn(move || {
                let _ = thread_priority::set_current_thread_priority(ThreadPriority::Min);
                let epoch = Instant::now();
                let mut next = epoch + interval;

                while !shutdown.get() {
                    let now = Instant::now();
                    if next > now {
                        thread::sleep(next - now);
                    }
                    next += interval;

                    snapshot.store(Arc::new(registry.sample(epoch)));
                }
            })?;

        tracing::debug!(interval_ms = interval.as_millis() as u64, "meter sampler started");
        self.thread_handle = Some(handle);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.shutdown.set(true);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MeterSampler {
    fn drop(&mut self) {
        self.stop();
    }
}
