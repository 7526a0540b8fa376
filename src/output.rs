//! CPAL output stream driving [`Engine::process`].

use crate::{Engine, Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Weak;

/// Wrapper to hold a `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` due to platform internals. It is only touched
/// behind the engine's output mutex and dropped there.
struct StreamHandle(#[allow(dead_code)] cpal::Stream);

// SAFETY: only accessed behind `Mutex<Option<AudioOutput>>` in `Engine`, never
// concurrently; it is created and dropped without being used in between.
unsafe impl Send for StreamHandle {}

pub(crate) struct AudioOutput {
    _stream: StreamHandle,
}

fn device_error(e: impl std::fmt::Display) -> Error {
    Error::Device(e.to_string())
}

fn get_device(index: Option<usize>) -> Result<cpal::Device> {
    let host = cpal::default_host();

    if let Some(idx) = index {
        let devices: Vec<_> = host.output_devices().map_err(device_error)?.collect();
        let device_count = devices.len();
        devices.into_iter().nth(idx).ok_or_else(|| {
            Error::Device(format!(
                "Output device index {idx} out of range (available: {device_count})"
            ))
        })
    } else {
        host.default_output_device()
            .ok_or_else(|| Error::Device("No output device available".to_string()))
    }
}

impl AudioOutput {
    /// Open `device` at the engine's samplerate and start pulling buffers.
    /// The stream holds only a weak reference, so it never keeps the engine
    /// alive.
    pub(crate) fn start(engine: Weak<Engine>, device: Option<usize>) -> Result<Self> {
        let samplerate = engine
            .upgrade()
            .map(|e| e.samplerate())
            .ok_or_else(|| Error::Device("engine dropped".to_string()))?;

        let device = get_device(device)?;
        let supported = device.default_output_config().map_err(device_error)?;
        let mut config: cpal::StreamConfig = supported.config();
        config.sample_rate = cpal::SampleRate(samplerate);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, engine)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, engine)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, engine)?,
            format => {
                return Err(Error::Device(format!(
                    "Unsupported sample format: {format:?}"
                )));
            }
        };
        stream.play().map_err(device_error)?;

        tracing::debug!(
            samplerate,
            channels = config.channels,
            "output stream started"
        );
        Ok(Self {
            _stream: StreamHandle(stream),
        })
    }

    pub(crate) fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        host.output_devices()
            .map_err(device_error)?
            .enumerate()
            .map(|(idx, device)| Ok(format!("{}: {}", idx, device.name().map_err(device_error)?)))
            .collect()
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    engine: Weak<Engine>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    // Engine buffers are fixed size; device callbacks are not.
    let mut block: Vec<f32> = Vec::new();
    let mut cursor = 0usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let Some(engine) = engine.upgrade() else {
                    data.fill(T::from_sample(0.0f32));
                    return;
                };

                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    let pcm = engine.config().pcm_channels;
                    for frame in data.chunks_mut(channels) {
                        if (cursor + 1) * pcm > block.len() {
                            block.resize(engine.config().samples_per_buffer(), 0.0);
                            if engine.process(&mut block).is_err() {
                                block.fill(0.0);
                            }
                            cursor = 0;
                        }
                        for (ch, sample) in frame.iter_mut().enumerate() {
                            let value = if ch < pcm {
                                block.get(cursor * pcm + ch).copied().unwrap_or(0.0)
                            } else {
                                0.0
                            };
                            *sample = T::from_sample(value);
                        }
                        cursor += 1;
                    }
                }));

                if result.is_err() {
                    data.fill(T::from_sample(0.0f32));
                }
            },
            |err| tracing::warn!("output stream error: {err}"),
            None,
        )
        .map_err(device_error)?;

    Ok(stream)
}
