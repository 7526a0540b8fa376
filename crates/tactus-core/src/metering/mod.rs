//! Observability: cycle load and sampled meter ports.

mod cpu;
mod sampler;

pub use cpu::{CpuMeter, CpuMetrics};
pub use sampler::{
    MeterHandle, MeterPort, MeterReading, MeterRegistry, MeterSampler, MeterSnapshot,
    DEFAULT_SAMPLE_INTERVAL,
};
