//! Capability contracts for video, audio and input backends.
//!
//! A driver owns whatever OS resource it talks to (window, audio device,
//! I2C bus, event device) and releases it in `shutdown`. The bridge calls
//! each driver from the run-loop thread only; drivers that need another
//! thread (audio callbacks, panel writers) hand data across internally.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::emulator::AvInfo;
use crate::frame::{Frame, PixelFormat};
use crate::input::InputState;
use crate::options::DriverOptions;

/// The three capability kinds a session needs one driver for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DriverKind {
    Video,
    Audio,
    Input,
}

impl DriverKind {
    pub const ALL: [DriverKind; 3] = [Self::Video, Self::Audio, Self::Input];
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Input => "input",
        })
    }
}

/// Errors a driver backend reports.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("device unavailable: {0}")]
    Unavailable(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("{0}")]
    Backend(String),
    #[error("driver panicked: {0}")]
    Panicked(String),
}

/// Interleaved stereo samples produced by one core step.
#[derive(Clone, Copy, Debug)]
pub struct AudioChunk<'a> {
    pub sample_rate: u32,
    /// `[left, right, left, right, ...]`
    pub samples: &'a [i16],
}

impl AudioChunk<'_> {
    /// Number of stereo frames in the chunk.
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Presents frames.
pub trait VideoDriver {
    /// Whether frames in `format` can be presented without conversion.
    fn accepts(&self, format: PixelFormat) -> bool {
        format == PixelFormat::Xrgb8888
    }

    /// Show one frame. Must not wait on the display beyond a buffer copy.
    fn present(&mut self, frame: &Frame<'_>) -> Result<(), DriverError>;

    /// Release the display.
    fn shutdown(&mut self) -> Result<(), DriverError>;
}

/// Plays audio.
pub trait AudioDriver {
    /// Queue a chunk for playback. Must return within the driver's bounded
    /// buffering timeout.
    fn enqueue(&mut self, chunk: &AudioChunk<'_>) -> Result<(), DriverError>;

    /// Stop playback and release the device.
    fn shutdown(&mut self) -> Result<(), DriverError>;
}

/// Reports controller state.
pub trait InputDriver {
    /// Return the latest input state immediately; never wait for events.
    fn poll(&mut self) -> Result<InputState, DriverError>;

    /// Release the input devices.
    fn shutdown(&mut self) -> Result<(), DriverError>;
}

/// Everything a driver factory gets to configure itself.
#[derive(Clone, Copy, Debug)]
pub struct DriverParams<'a> {
    /// Geometry, frame rate and sample rate reported by the loaded core.
    pub av: &'a AvInfo,
    pub options: &'a DriverOptions,
}

impl DriverParams<'_> {
    /// The core's sample rate rounded to whole Hz.
    pub fn sample_rate(&self) -> u32 {
        self.av.sample_rate.round() as u32
    }

    /// Duration of one emulated frame.
    pub fn frame_interval(&self) -> Duration {
        self.av.frame_interval()
    }
}
