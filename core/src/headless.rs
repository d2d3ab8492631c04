//! Drivers with no device behind them, for tests, benchmarks and servers.

use crate::driver::{AudioChunk, AudioDriver, DriverError, DriverParams, InputDriver, VideoDriver};
use crate::frame::{Frame, PixelFormat};
use crate::input::InputState;
use crate::registry::DriverSpec;

/// Accepts every format and counts frames.
#[derive(Debug, Default)]
pub struct HeadlessVideo {
    frames: u64,
    last_size: Option<(u32, u32)>,
}

impl HeadlessVideo {
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn last_size(&self) -> Option<(u32, u32)> {
        self.last_size
    }
}

impl VideoDriver for HeadlessVideo {
    fn accepts(&self, _format: PixelFormat) -> bool {
        true
    }

    fn present(&mut self, frame: &Frame<'_>) -> Result<(), DriverError> {
        self.frames += 1;
        self.last_size = Some((frame.width, frame.height));
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        log::debug!("headless video presented {} frames", self.frames);
        Ok(())
    }
}

/// Discards audio, keeping a frame count.
#[derive(Debug, Default)]
pub struct HeadlessAudio {
    frames: u64,
}

impl HeadlessAudio {
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl AudioDriver for HeadlessAudio {
    fn enqueue(&mut self, chunk: &AudioChunk<'_>) -> Result<(), DriverError> {
        self.frames += chunk.frames() as u64;
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        log::debug!("headless audio discarded {} frames", self.frames);
        Ok(())
    }
}

/// Always reports the all-neutral state.
#[derive(Debug, Default)]
pub struct HeadlessInput;

impl InputDriver for HeadlessInput {
    fn poll(&mut self) -> Result<InputState, DriverError> {
        Ok(InputState::neutral())
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

fn create_video(_: &DriverParams<'_>) -> Result<Box<dyn VideoDriver>, DriverError> {
    Ok(Box::new(HeadlessVideo::default()))
}

fn create_audio(_: &DriverParams<'_>) -> Result<Box<dyn AudioDriver>, DriverError> {
    Ok(Box::new(HeadlessAudio::default()))
}

fn create_input(_: &DriverParams<'_>) -> Result<Box<dyn InputDriver>, DriverError> {
    Ok(Box::new(HeadlessInput))
}

inventory::submit! {
    DriverSpec::video("headless", "discard frames", create_video)
}

inventory::submit! {
    DriverSpec::audio("headless", "discard audio", create_audio)
}

inventory::submit! {
    DriverSpec::input("headless", "no input", create_input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_counts_frames_of_any_format() {
        let mut video = HeadlessVideo::default();
        let data = [0u8; 8];
        for format in PixelFormat::ALL {
            assert!(video.accepts(format));
        }
        let frame = Frame::new(&data, 2, 1, 8, PixelFormat::Xrgb8888).unwrap();
        video.present(&frame).unwrap();
        video.present(&frame).unwrap();
        assert_eq!(video.frames(), 2);
        assert_eq!(video.last_size(), Some((2, 1)));
    }

    #[test]
    fn audio_counts_stereo_frames() {
        let mut audio = HeadlessAudio::default();
        audio
            .enqueue(&AudioChunk {
                sample_rate: 50_000,
                samples: &[0; 10],
            })
            .unwrap();
        assert_eq!(audio.frames(), 5);
    }

    #[test]
    fn input_is_neutral() {
        assert!(HeadlessInput.poll().unwrap().is_neutral());
    }
}
