use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use ardubridge_core::audio_queue::{OverflowPolicy, SampleQueue, remix};
use ardubridge_core::driver::{AudioChunk, AudioDriver, DriverError, DriverParams};
use ardubridge_core::registry::DriverSpec;
use sdl2::audio::{AudioCallback, AudioDevice, AudioSpecDesired};

use crate::sdl;

/// Samples over which playback ramps in at start and out at shutdown.
const FADE_SAMPLES: u32 = 256;

/// Time given to the callback to finish the fade-out before pausing.
const FADE_OUT_WAIT: Duration = Duration::from_millis(10);

/// Gain envelope applied on the callback thread.
#[derive(Debug, Default)]
struct Fade {
    in_pos: u32,
    out_pos: u32,
}

impl Fade {
    fn apply(&mut self, out: &mut [i16], fading_out: bool) {
        for sample in out.iter_mut() {
            if self.in_pos < FADE_SAMPLES {
                let gain = self.in_pos as f32 / FADE_SAMPLES as f32;
                *sample = (*sample as f32 * gain) as i16;
                self.in_pos += 1;
            } else if fading_out {
                if self.out_pos < FADE_SAMPLES {
                    let gain = 1.0 - self.out_pos as f32 / FADE_SAMPLES as f32;
                    *sample = (*sample as f32 * gain) as i16;
                    self.out_pos += 1;
                } else {
                    *sample = 0;
                }
            }
        }
    }
}

struct Playback {
    queue: SampleQueue,
    fade: Fade,
    fading_out: Arc<AtomicBool>,
}

impl AudioCallback for Playback {
    type Channel = i16;

    fn callback(&mut self, out: &mut [i16]) {
        self.queue.pop_into(out);
        self.fade.apply(out, self.fading_out.load(Ordering::Relaxed));
    }
}

/// Plays through the SDL audio subsystem at the core's sample rate.
pub struct SdlAudio {
    lease: sdl::Lease,
    device: AudioDevice<Playback>,
    queue: SampleQueue,
    fading_out: Arc<AtomicBool>,
    policy: OverflowPolicy,
    gain: f32,
    channels: u16,
    mix: Vec<i16>,
    started: bool,
}

impl SdlAudio {
    pub fn new(params: &DriverParams<'_>) -> Result<Self, DriverError> {
        let opts = &params.options.audio;
        let rate = params.sample_rate();
        let channels = opts.channels.clamp(1, 2);

        let lease = sdl::Lease::acquire()?;
        let audio = lease
            .sdl()
            .audio()
            .map_err(|e| DriverError::Unavailable(format!("SDL audio: {e}")))?;

        let queue = SampleQueue::new(opts.queue_capacity(rate, channels), channels);
        let fading_out = Arc::new(AtomicBool::new(false));

        let desired = AudioSpecDesired {
            freq: Some(rate as i32),
            channels: Some(channels as u8),
            samples: Some(opts.latency.buffer_frames().min(u16::MAX as u32) as u16),
        };
        let device = audio
            .open_playback(opts.device.as_deref(), &desired, |spec| {
                log::info!(
                    "SDL audio: {} Hz, {} channel(s), {} frame buffer",
                    spec.freq,
                    spec.channels,
                    spec.samples
                );
                Playback {
                    queue: queue.clone(),
                    fade: Fade::default(),
                    fading_out: Arc::clone(&fading_out),
                }
            })
            .map_err(|e| DriverError::Unavailable(format!("SDL audio device: {e}")))?;

        // The device starts paused and is resumed once the first chunk is
        // queued.
        Ok(Self {
            lease,
            device,
            queue,
            fading_out,
            policy: opts.overflow_policy(),
            gain: opts.gain(),
            channels,
            mix: Vec::new(),
            started: false,
        })
    }
}

impl AudioDriver for SdlAudio {
    fn enqueue(&mut self, chunk: &AudioChunk<'_>) -> Result<(), DriverError> {
        remix(chunk.samples, self.channels, self.gain, &mut self.mix);
        let dropped = self.queue.push(&self.mix, self.policy)?;
        if dropped > 0 {
            log::debug!("SDL audio queue full, dropped {dropped} samples");
        }
        if !self.started {
            self.device.resume();
            self.started = true;
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        if self.started {
            self.fading_out.store(true, Ordering::Relaxed);
            thread::sleep(FADE_OUT_WAIT);
        }
        self.device.pause();
        log::debug!(
            "SDL audio closed ({} underruns, {} samples dropped)",
            self.queue.underruns(),
            self.queue.dropped()
        );
        self.queue.clear();
        self.lease.release();
        Ok(())
    }
}

fn create(params: &DriverParams<'_>) -> Result<Box<dyn AudioDriver>, DriverError> {
    Ok(Box::new(SdlAudio::new(params)?))
}

inventory::submit! {
    DriverSpec::audio("sdl", "SDL2 audio callback", create)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fade_in_ramps_from_silence() {
        let mut fade = Fade::default();
        let mut out = [1000i16; 512];
        fade.apply(&mut out, false);
        assert_eq!(out[0], 0);
        assert_eq!(out[128], 500);
        assert_eq!(out[300], 1000);
    }

    #[test]
    fn fade_out_ends_in_silence() {
        let mut fade = Fade {
            in_pos: FADE_SAMPLES,
            out_pos: 0,
        };
        let mut out = [1000i16; 300];
        fade.apply(&mut out, true);
        assert_eq!(out[0], 1000);
        assert!(out[200] < 300);
        assert_eq!(out[299], 0);
    }
}
