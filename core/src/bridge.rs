//! Adapts the active drivers to the callbacks a core makes.
//!
//! The bridge is the [`Host`] a core runs against. It owns the three active
//! drivers, converts frames when the video driver cannot take the core's
//! pixel format, gathers the audio of one step into a single chunk and
//! turns driver errors and panics into one [`DriverFailure`]. Once a
//! failure is recorded every later callback becomes a no-op so the core can
//! finish its step undisturbed.

use std::any::Any;
use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::driver::{AudioChunk, AudioDriver, DriverError, DriverKind, InputDriver, VideoDriver};
use crate::emulator::{AvInfo, Host};
use crate::error::{Component, DriverFailure, TeardownFailure, UnsupportedFormatError};
use crate::frame::{Frame, PixelFormat, convert_to_xrgb8888};
use crate::input::{Axis, InputState, JoypadButton};
use crate::options::CoreSettings;

/// `RETRO_DEVICE_ID_JOYPAD_MASK`: all buttons as one bitmask.
const JOYPAD_MASK_ID: u32 = 256;

/// Low byte of a libretro device id; the rest encodes subclasses.
const DEVICE_TYPE_MASK: u32 = 0xFF;

/// At most one slow-call warning per this period.
const SLOW_LOG_PERIOD: Duration = Duration::from_secs(1);

/// How frames reach the video driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conversion {
    Passthrough,
    ToXrgb8888,
}

/// Counters for one session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub frames_presented: u64,
    pub frames_converted: u64,
    pub frames_duplicated: u64,
    pub audio_frames: u64,
    pub slow_calls: u64,
    pub input_timeouts: u64,
}

struct Active<D: ?Sized> {
    name: &'static str,
    driver: Box<D>,
}

/// The [`Host`] implementation sitting between a core and its drivers.
pub struct Bridge {
    video: Option<Active<dyn VideoDriver>>,
    audio: Option<Active<dyn AudioDriver>>,
    input: Option<Active<dyn InputDriver>>,

    core_format: PixelFormat,
    rejected_format: Option<u32>,
    negotiated: bool,
    conversion: Conversion,
    scratch: Vec<u8>,

    sample_rate: u32,
    pending_audio: Vec<i16>,
    input_state: InputState,
    frame_budget: Duration,

    overrides: BTreeMap<String, String>,
    variables: BTreeMap<String, CString>,
    system_dir: Option<CString>,
    save_dir: Option<CString>,

    failure: Option<DriverFailure>,
    /// Shutdown failures of drivers replaced by a later `attach_*`.
    retired: Vec<TeardownFailure>,
    shutdown_requested: bool,
    stats: BridgeStats,
    last_slow_log: Option<Instant>,
}

fn dir_cstring(dir: Option<&Path>) -> Option<CString> {
    let dir = dir?;
    match CString::new(dir.to_string_lossy().into_owned()) {
        Ok(s) => Some(s),
        Err(_) => {
            log::warn!("ignoring directory with NUL byte: {}", dir.display());
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Run one driver call, turning a panic into an error and timing it.
fn guarded<T>(f: impl FnOnce() -> Result<T, DriverError>) -> (Result<T, DriverError>, Duration) {
    let start = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(DriverError::Panicked(panic_message(&*payload))));
    (result, start.elapsed())
}

fn release(
    kind: DriverKind,
    name: &'static str,
    f: impl FnOnce() -> Result<(), DriverError>,
    failures: &mut Vec<TeardownFailure>,
) {
    match guarded(f).0 {
        Ok(()) => log::debug!("{kind} driver `{name}` released"),
        Err(error) => {
            log::error!("{kind} driver `{name}` failed to shut down: {error}");
            failures.push(TeardownFailure {
                component: Component::Driver(kind),
                message: format!("`{name}`: {error}"),
            });
        }
    }
}

impl Bridge {
    pub fn new(settings: &CoreSettings) -> Self {
        Self {
            video: None,
            audio: None,
            input: None,
            core_format: PixelFormat::default(),
            rejected_format: None,
            negotiated: false,
            conversion: Conversion::Passthrough,
            scratch: Vec::new(),
            sample_rate: 0,
            pending_audio: Vec::new(),
            input_state: InputState::neutral(),
            frame_budget: AvInfo::default().frame_interval(),
            overrides: settings.options.clone(),
            variables: BTreeMap::new(),
            system_dir: dir_cstring(settings.system_dir.as_deref()),
            save_dir: dir_cstring(settings.save_dir.as_deref()),
            failure: None,
            retired: Vec::new(),
            shutdown_requested: false,
            stats: BridgeStats::default(),
            last_slow_log: None,
        }
    }

    /// Wire in the video driver, shutting down any previous one first.
    pub fn attach_video(&mut self, name: &'static str, driver: Box<dyn VideoDriver>) {
        if let Some(mut old) = self.video.take() {
            release(DriverKind::Video, old.name, || old.driver.shutdown(), &mut self.retired);
        }
        self.video = Some(Active { name, driver });
    }

    /// Wire in the audio driver, shutting down any previous one first.
    pub fn attach_audio(&mut self, name: &'static str, driver: Box<dyn AudioDriver>) {
        if let Some(mut old) = self.audio.take() {
            release(DriverKind::Audio, old.name, || old.driver.shutdown(), &mut self.retired);
        }
        self.audio = Some(Active { name, driver });
    }

    /// Wire in the input driver, shutting down any previous one first.
    pub fn attach_input(&mut self, name: &'static str, driver: Box<dyn InputDriver>) {
        if let Some(mut old) = self.input.take() {
            release(DriverKind::Input, old.name, || old.driver.shutdown(), &mut self.retired);
        }
        self.input = Some(Active { name, driver });
    }

    /// Name of the attached driver of `kind`.
    pub fn driver_name(&self, kind: DriverKind) -> Option<&'static str> {
        match kind {
            DriverKind::Video => self.video.as_ref().map(|a| a.name),
            DriverKind::Audio => self.audio.as_ref().map(|a| a.name),
            DriverKind::Input => self.input.as_ref().map(|a| a.name),
        }
    }

    /// Fix the pixel path and audio rate for the rest of the session.
    ///
    /// Must run after the game is loaded and the drivers are attached.
    /// Later pixel format requests from the core are refused.
    pub fn negotiate(&mut self, av: &AvInfo) -> Result<(), UnsupportedFormatError> {
        if let Some(raw) = self.rejected_format {
            return Err(UnsupportedFormatError::UnknownPixelFormat(raw));
        }
        // Drivers are opened at the rounded rate.
        if !(av.sample_rate.is_finite() && av.sample_rate.round() >= 1.0) {
            return Err(UnsupportedFormatError::SampleRate(av.sample_rate));
        }

        self.conversion = match &self.video {
            None => Conversion::Passthrough,
            Some(video) if video.driver.accepts(self.core_format) => Conversion::Passthrough,
            Some(video) if video.driver.accepts(PixelFormat::Xrgb8888) => Conversion::ToXrgb8888,
            Some(video) => {
                return Err(UnsupportedFormatError::Pixel {
                    core: self.core_format,
                    driver: video.name,
                });
            }
        };

        self.sample_rate = av.sample_rate.round() as u32;
        self.frame_budget = av.frame_interval();
        self.negotiated = true;
        log::info!(
            "negotiated {} ({:?}), {} Hz audio, {:.2} fps",
            self.core_format,
            self.conversion,
            self.sample_rate,
            1.0 / self.frame_budget.as_secs_f64()
        );
        Ok(())
    }

    pub fn conversion(&self) -> Conversion {
        self.conversion
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Poll the input driver for the coming step.
    ///
    /// A poll slower than one frame interval latches the neutral state for
    /// the step; a quit request still comes through.
    pub fn begin_frame(&mut self) {
        if self.failure.is_some() {
            return;
        }
        let Some(input) = self.input.as_mut() else {
            return;
        };
        let name = input.name;
        let (result, elapsed) = guarded(|| input.driver.poll());
        let Some(state) = self.check(DriverKind::Input, name, result, elapsed) else {
            self.input_state = InputState::neutral();
            return;
        };
        if elapsed > self.frame_budget {
            self.stats.input_timeouts += 1;
            let mut latched = InputState::neutral();
            latched.quit = state.quit;
            self.input_state = latched;
        } else {
            self.input_state = state;
        }
    }

    /// Hand the audio gathered during the step to the audio driver.
    pub fn end_frame(&mut self) {
        if self.pending_audio.is_empty() {
            return;
        }
        let Some(audio) = self.audio.as_mut().filter(|_| self.failure.is_none()) else {
            self.pending_audio.clear();
            return;
        };
        let name = audio.name;
        let chunk = AudioChunk {
            sample_rate: self.sample_rate,
            samples: &self.pending_audio,
        };
        let frames = chunk.frames() as u64;
        let (result, elapsed) = guarded(|| audio.driver.enqueue(&chunk));
        self.pending_audio.clear();
        if self.check(DriverKind::Audio, name, result, elapsed).is_some() {
            self.stats.audio_frames += frames;
        }
    }

    /// Input state of the current step.
    pub fn input(&self) -> &InputState {
        &self.input_state
    }

    pub fn quit_requested(&self) -> bool {
        self.input_state.quit
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub fn failure(&self) -> Option<&DriverFailure> {
        self.failure.as_ref()
    }

    pub fn take_failure(&mut self) -> Option<DriverFailure> {
        self.failure.take()
    }

    pub fn stats(&self) -> BridgeStats {
        self.stats
    }

    /// Current value of every core option.
    pub fn variables(&self) -> impl Iterator<Item = (&str, &CStr)> {
        self.variables.iter().map(|(k, v)| (k.as_str(), v.as_c_str()))
    }

    /// Shut down every attached driver in the order input, audio, video.
    ///
    /// Each driver is released exactly once; a failing release does not
    /// stop the next one. Calling again releases nothing. Failures from
    /// drivers replaced earlier come first in the result.
    pub fn teardown(&mut self) -> Vec<TeardownFailure> {
        let mut failures = std::mem::take(&mut self.retired);
        if let Some(mut input) = self.input.take() {
            release(DriverKind::Input, input.name, || input.driver.shutdown(), &mut failures);
        }
        if let Some(mut audio) = self.audio.take() {
            release(DriverKind::Audio, audio.name, || audio.driver.shutdown(), &mut failures);
        }
        if let Some(mut video) = self.video.take() {
            release(DriverKind::Video, video.name, || video.driver.shutdown(), &mut failures);
        }
        self.pending_audio.clear();
        failures
    }

    fn check<T>(
        &mut self,
        kind: DriverKind,
        name: &'static str,
        result: Result<T, DriverError>,
        elapsed: Duration,
    ) -> Option<T> {
        if elapsed > self.frame_budget {
            self.note_slow(kind, name, elapsed);
        }
        match result {
            Ok(value) => Some(value),
            Err(error) => {
                self.fail(kind, name, error);
                None
            }
        }
    }

    fn note_slow(&mut self, kind: DriverKind, name: &'static str, elapsed: Duration) {
        self.stats.slow_calls += 1;
        let now = Instant::now();
        if self
            .last_slow_log
            .is_none_or(|last| now.duration_since(last) >= SLOW_LOG_PERIOD)
        {
            self.last_slow_log = Some(now);
            log::warn!(
                "{kind} driver `{name}` took {elapsed:?} (budget {:?}, {} slow calls so far)",
                self.frame_budget,
                self.stats.slow_calls
            );
        }
    }

    fn fail(&mut self, kind: DriverKind, driver: &'static str, error: DriverError) {
        if self.failure.is_some() {
            return;
        }
        log::error!("{kind} driver `{driver}` failed: {error}");
        self.failure = Some(DriverFailure {
            kind,
            driver,
            error,
        });
    }
}

impl Host for Bridge {
    fn pixel_format(&self) -> PixelFormat {
        self.core_format
    }

    fn set_pixel_format(&mut self, raw: u32) -> bool {
        if self.negotiated {
            log::warn!("core asked for pixel format {raw} after negotiation; refused");
            return false;
        }
        match PixelFormat::from_raw(raw) {
            Some(format) => {
                log::debug!("core pixel format: {format}");
                self.core_format = format;
                self.rejected_format = None;
                true
            }
            None => {
                log::warn!("core asked for unknown pixel format {raw}");
                self.rejected_format = Some(raw);
                false
            }
        }
    }

    fn request_shutdown(&mut self) {
        log::info!("core requested shutdown");
        self.shutdown_requested = true;
    }

    fn video_refresh(&mut self, frame: Option<&Frame<'_>>) {
        if self.failure.is_some() {
            return;
        }
        let Some(frame) = frame else {
            self.stats.frames_duplicated += 1;
            return;
        };
        let Some(video) = self.video.as_mut() else {
            return;
        };
        let name = video.name;
        let (result, elapsed) = match self.conversion {
            Conversion::Passthrough => guarded(|| video.driver.present(frame)),
            Conversion::ToXrgb8888 => {
                convert_to_xrgb8888(frame, &mut self.scratch);
                let converted = Frame {
                    width: frame.width,
                    height: frame.height,
                    pitch: frame.width as usize * 4,
                    format: PixelFormat::Xrgb8888,
                    data: &self.scratch,
                };
                self.stats.frames_converted += 1;
                guarded(|| video.driver.present(&converted))
            }
        };
        if self.check(DriverKind::Video, name, result, elapsed).is_some() {
            self.stats.frames_presented += 1;
        }
    }

    fn audio_sample(&mut self, left: i16, right: i16) {
        if self.failure.is_none() {
            self.pending_audio.extend_from_slice(&[left, right]);
        }
    }

    fn audio_sample_batch(&mut self, samples: &[i16]) -> usize {
        let frames = samples.len() / 2;
        if self.failure.is_none() {
            self.pending_audio.extend_from_slice(&samples[..frames * 2]);
        }
        frames
    }

    fn input_poll(&mut self) {}

    fn input_state(&mut self, port: u32, device: u32, index: u32, id: u32) -> i16 {
        if port != 0 || self.failure.is_some() {
            return 0;
        }
        match device & DEVICE_TYPE_MASK {
            libretro_sys::DEVICE_JOYPAD if id == JOYPAD_MASK_ID => {
                self.input_state.button_bits() as i16
            }
            libretro_sys::DEVICE_JOYPAD => JoypadButton::from_id(id)
                .map_or(0, |b| i16::from(self.input_state.is_pressed(b))),
            libretro_sys::DEVICE_ANALOG => {
                Axis::from_analog(index, id).map_or(0, |a| self.input_state.axis(a))
            }
            _ => 0,
        }
    }

    fn define_variable(&mut self, key: &str, default: &str) {
        let value = match self.overrides.get(key) {
            Some(v) => {
                log::info!("core option {key} = {v} (default {default})");
                v.as_str()
            }
            None => default,
        };
        match CString::new(value) {
            Ok(value) => {
                self.variables.insert(key.to_string(), value);
            }
            Err(_) => log::warn!("core option {key} has a NUL byte in its value; ignored"),
        }
    }

    fn variable(&mut self, key: &str) -> Option<&CStr> {
        self.variables.get(key).map(CString::as_c_str)
    }

    fn system_directory(&self) -> Option<&CStr> {
        self.system_dir.as_deref()
    }

    fn save_directory(&self) -> Option<&CStr> {
        self.save_dir.as_deref()
    }

    fn message(&mut self, text: &str, frames: u32) {
        log::info!("core: {text} ({frames} frames)");
    }
}
