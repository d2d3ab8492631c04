//! The boundary between the frontend and an emulation core.
//!
//! [`Core`] is what the session drives: load a game, step it, unload it.
//! [`Host`] is the callback surface the core talks back to while it runs.
//! A libretro core implements `Core` by forwarding its C callbacks to the
//! installed `Host`; tests implement it directly.

use std::ffi::CStr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::frame::{Frame, PixelFormat};
use crate::rom::RomImage;

/// Static information about a core, available before a game is loaded.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SystemInfo {
    pub library_name: String,
    pub library_version: String,
    /// Lower-case extensions without the dot.
    pub valid_extensions: Vec<String>,
    /// The core loads the game from `path` itself instead of taking bytes.
    pub need_fullpath: bool,
    /// The core wants archives passed through unextracted.
    pub block_extract: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Geometry {
    pub base_width: u32,
    pub base_height: u32,
    pub max_width: u32,
    pub max_height: u32,
    /// Zero or negative means `base_width / base_height`.
    pub aspect_ratio: f32,
}

impl Geometry {
    pub fn aspect_ratio(&self) -> f32 {
        if self.aspect_ratio > 0.0 {
            self.aspect_ratio
        } else if self.base_height > 0 {
            self.base_width as f32 / self.base_height as f32
        } else {
            1.0
        }
    }
}

/// Audio/video parameters of a loaded game.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AvInfo {
    pub geometry: Geometry,
    pub fps: f64,
    pub sample_rate: f64,
}

impl AvInfo {
    /// Duration of one emulated frame; 60 Hz when the core reports no rate.
    pub fn frame_interval(&self) -> Duration {
        let fps = if self.fps.is_finite() && self.fps > 0.0 {
            self.fps
        } else {
            60.0
        };
        Duration::from_secs_f64(1.0 / fps)
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to open core library: {0}")]
    Library(String),
    #[error("core is missing symbol `{0}`")]
    MissingSymbol(&'static str),
    #[error("core implements libretro API {found}, expected {expected}")]
    ApiVersion { expected: u32, found: u32 },
    #[error("a core is already loaded in this process")]
    AlreadyLoaded,
    #[error("core rejected game {}", .0.display())]
    GameRejected(PathBuf),
    #[error("no game is loaded")]
    NotLoaded,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Callbacks a core invokes while it is loading or running a game.
pub trait Host {
    /// The pixel format frames are currently delivered in.
    fn pixel_format(&self) -> PixelFormat;

    /// The core asks to deliver frames in the libretro format `raw`.
    /// Returns false to refuse.
    fn set_pixel_format(&mut self, raw: u32) -> bool;

    /// The core wants the frontend to exit.
    fn request_shutdown(&mut self);

    /// A finished frame, or `None` when the core repeats the previous one.
    fn video_refresh(&mut self, frame: Option<&Frame<'_>>);

    /// One stereo frame of audio.
    fn audio_sample(&mut self, left: i16, right: i16);

    /// Interleaved stereo frames. Returns the number of frames consumed.
    fn audio_sample_batch(&mut self, samples: &[i16]) -> usize;

    /// The core is about to read input for this step.
    fn input_poll(&mut self);

    /// State of one input element on `port`.
    fn input_state(&mut self, port: u32, device: u32, index: u32, id: u32) -> i16;

    /// The core declares an option and its default value.
    fn define_variable(&mut self, key: &str, default: &str);

    /// Current value of a core option.
    fn variable(&mut self, key: &str) -> Option<&CStr>;

    fn system_directory(&self) -> Option<&CStr>;

    fn save_directory(&self) -> Option<&CStr>;

    /// A user-facing message from the core, meant to be shown for `frames`.
    fn message(&mut self, text: &str, frames: u32);
}

/// An emulation core the session can drive.
pub trait Core {
    fn system_info(&self) -> &SystemInfo;

    /// Initialize the core and load `rom`. Environment requests made during
    /// loading (pixel format, options) go to `host`.
    fn load_game(&mut self, host: &mut dyn Host, rom: &RomImage) -> Result<AvInfo, CoreError>;

    /// Run the core for one frame.
    fn run(&mut self, host: &mut dyn Host);

    /// Battery-backed save memory, if the core exposes any.
    fn save_ram(&mut self) -> Option<&mut [u8]> {
        None
    }

    /// Unload the game and deinitialize the core.
    fn unload(&mut self) -> Result<(), CoreError>;
}
