//! Audio output through cpal, which is ALSA on Linux.
//!
//! The device is opened at the core's sample rate when it supports it;
//! otherwise at its default configuration with the core's audio resampled
//! on the run-loop thread before it is queued.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use ardubridge_core::audio_queue::{OverflowPolicy, Resampler, SampleQueue, remix};
use ardubridge_core::driver::{AudioChunk, AudioDriver, DriverError, DriverParams};
use ardubridge_core::options::AudioOptions;
use ardubridge_core::registry::DriverSpec;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, StreamConfig, SupportedStreamConfigRange};

/// Sample formats we can feed, most preferred first.
const FORMATS: [SampleFormat; 3] = [SampleFormat::I16, SampleFormat::F32, SampleFormat::U16];

type StreamError = Arc<Mutex<Option<String>>>;

pub struct CpalAudio {
    stream: cpal::Stream,
    queue: SampleQueue,
    resampler: Resampler,
    policy: OverflowPolicy,
    gain: f32,
    channels: u16,
    mix: Vec<i16>,
    resampled: Vec<i16>,
    error: StreamError,
}

fn find_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, DriverError> {
    let Some(name) = name else {
        return host
            .default_output_device()
            .ok_or_else(|| DriverError::Unavailable("no default output device".into()));
    };
    let devices = host
        .output_devices()
        .map_err(|e| DriverError::Unavailable(format!("listing output devices: {e}")))?;
    for device in devices {
        if device.name().is_ok_and(|n| n == name) {
            return Ok(device);
        }
    }
    Err(DriverError::Unavailable(format!("no output device named `{name}`")))
}

/// A configuration at exactly `rate` with `channels`, if the device has one.
fn exact_config(
    device: &cpal::Device,
    rate: u32,
    channels: u16,
) -> Option<(StreamConfig, SampleFormat)> {
    let ranges: Vec<_> = device.supported_output_configs().ok()?.collect();
    pick_exact(&ranges, rate, channels)
}

/// First range covering `rate` with `channels`, in [`FORMATS`] order.
fn pick_exact(
    ranges: &[SupportedStreamConfigRange],
    rate: u32,
    channels: u16,
) -> Option<(StreamConfig, SampleFormat)> {
    FORMATS.iter().find_map(|format| {
        ranges
            .iter()
            .find(|r| {
                r.sample_format() == *format
                    && r.channels() == channels
                    && r.min_sample_rate().0 <= rate
                    && rate <= r.max_sample_rate().0
            })
            .map(|r| (r.clone().with_sample_rate(SampleRate(rate)).config(), *format))
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    queue: SampleQueue,
    error: StreamError,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let mut buf: Vec<i16> = Vec::new();
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            buf.resize(data.len(), 0);
            queue.pop_into(&mut buf);
            for (out, s) in data.iter_mut().zip(&buf) {
                *out = T::from_sample(*s);
            }
        },
        move |err| record_stream_error(&error, err),
        None,
    )
}

/// Keep the first error the stream reports; later ones are only logged.
fn record_stream_error(slot: &StreamError, err: impl fmt::Display) {
    log::error!("audio stream error: {err}");
    let mut slot = slot.lock().unwrap_or_else(PoisonError::into_inner);
    slot.get_or_insert_with(|| err.to_string());
}

/// Fails once the stream has reported an error.
fn check_stream(slot: &StreamError) -> Result<(), DriverError> {
    match slot.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
        Some(e) => Err(DriverError::Backend(format!("audio stream: {e}"))),
        None => Ok(()),
    }
}

fn open_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    format: SampleFormat,
    queue: &SampleQueue,
    error: &StreamError,
) -> Result<cpal::Stream, DriverError> {
    let result = match format {
        SampleFormat::I16 => build_stream::<i16>(device, config, queue.clone(), error.clone()),
        SampleFormat::F32 => build_stream::<f32>(device, config, queue.clone(), error.clone()),
        SampleFormat::U16 => build_stream::<u16>(device, config, queue.clone(), error.clone()),
        other => {
            return Err(DriverError::Unsupported(format!(
                "device sample format {other}"
            )));
        }
    };
    result.map_err(|e| DriverError::Unavailable(format!("audio stream: {e}")))
}

impl CpalAudio {
    pub fn new(params: &DriverParams<'_>) -> Result<Self, DriverError> {
        let opts: &AudioOptions = &params.options.audio;
        let core_rate = params.sample_rate();

        let host = cpal::default_host();
        let device = find_device(&host, opts.device.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());

        let (mut config, format) = match exact_config(&device, core_rate, opts.channels) {
            Some(found) => found,
            None => {
                let default = device
                    .default_output_config()
                    .map_err(|e| DriverError::Unavailable(format!("output config: {e}")))?;
                (default.config(), default.sample_format())
            }
        };
        let rate = config.sample_rate.0;
        let channels = config.channels;

        let queue = SampleQueue::new(opts.queue_capacity(rate, channels), channels);
        let error: StreamError = Arc::new(Mutex::new(None));

        config.buffer_size = BufferSize::Fixed(opts.latency.buffer_frames());
        let stream = match open_stream(&device, &config, format, &queue, &error) {
            Ok(stream) => stream,
            Err(e) => {
                log::debug!("fixed buffer refused ({e}); using the device default");
                config.buffer_size = BufferSize::Default;
                open_stream(&device, &config, format, &queue, &error)?
            }
        };
        stream
            .play()
            .map_err(|e| DriverError::Unavailable(format!("starting playback: {e}")))?;

        log::info!(
            "audio device `{device_name}`: {rate} Hz, {channels} channel(s), {format}, {:?}",
            config.buffer_size
        );
        if rate != core_rate {
            log::info!("resampling {core_rate} Hz to {rate} Hz");
        }

        Ok(Self {
            stream,
            queue,
            resampler: Resampler::new(core_rate, rate, channels),
            policy: opts.overflow_policy(),
            gain: opts.gain(),
            channels,
            mix: Vec::new(),
            resampled: Vec::new(),
            error,
        })
    }
}

impl AudioDriver for CpalAudio {
    fn enqueue(&mut self, chunk: &AudioChunk<'_>) -> Result<(), DriverError> {
        check_stream(&self.error)?;

        remix(chunk.samples, self.channels, self.gain, &mut self.mix);
        let samples = if self.resampler.is_identity() {
            &self.mix
        } else {
            self.resampler.process(&self.mix, &mut self.resampled);
            &self.resampled
        };

        let dropped = self.queue.push(samples, self.policy)?;
        if dropped > 0 {
            log::debug!("audio queue full, dropped {dropped} samples");
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        let paused = self.stream.pause();
        log::debug!(
            "audio closed ({} underruns, {} samples dropped)",
            self.queue.underruns(),
            self.queue.dropped()
        );
        self.queue.clear();
        paused.map_err(|e| DriverError::Backend(format!("pausing stream: {e}")))
    }
}

fn create(params: &DriverParams<'_>) -> Result<Box<dyn AudioDriver>, DriverError> {
    Ok(Box::new(CpalAudio::new(params)?))
}

inventory::submit! {
    DriverSpec::audio("alsa", "cpal output stream (ALSA on Linux)", create)
}

#[cfg(test)]
mod tests {
    use cpal::SupportedBufferSize;

    use super::*;

    fn range(
        format: SampleFormat,
        channels: u16,
        min: u32,
        max: u32,
    ) -> SupportedStreamConfigRange {
        SupportedStreamConfigRange::new(
            channels,
            SampleRate(min),
            SampleRate(max),
            SupportedBufferSize::Unknown,
            format,
        )
    }

    #[test]
    fn exact_config_prefers_i16() {
        let ranges = [
            range(SampleFormat::F32, 2, 8_000, 96_000),
            range(SampleFormat::I16, 2, 8_000, 96_000),
        ];
        let (config, format) = pick_exact(&ranges, 44_100, 2).unwrap();
        assert_eq!(format, SampleFormat::I16);
        assert_eq!(config.sample_rate, SampleRate(44_100));
        assert_eq!(config.channels, 2);
    }

    #[test]
    fn exact_config_needs_rate_and_channels() {
        let ranges = [
            range(SampleFormat::I16, 1, 8_000, 96_000),
            range(SampleFormat::F32, 2, 48_000, 48_000),
            range(SampleFormat::I32, 2, 8_000, 96_000),
        ];
        assert!(pick_exact(&ranges, 44_100, 2).is_none());

        let (_, format) = pick_exact(&ranges, 48_000, 2).unwrap();
        assert_eq!(format, SampleFormat::F32);
    }

    #[test]
    fn first_stream_error_fails_enqueue() {
        let slot: StreamError = Arc::new(Mutex::new(None));
        assert!(check_stream(&slot).is_ok());

        record_stream_error(&slot, "device unplugged");
        record_stream_error(&slot, "poll failed");
        match check_stream(&slot) {
            Err(DriverError::Backend(message)) => {
                assert_eq!(message, "audio stream: device unplugged");
            }
            other => panic!("expected a backend error, got {other:?}"),
        }
    }
}
