#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use ardubridge_core::driver::{AudioChunk, AudioDriver, DriverError, InputDriver, VideoDriver};
use ardubridge_core::emulator::{AvInfo, Core, CoreError, Geometry, Host, SystemInfo};
use ardubridge_core::error::LoadError;
use ardubridge_core::frame::{Frame, PixelFormat};
use ardubridge_core::input::InputState;
use ardubridge_core::rom::RomImage;

/// Call counts for one fake driver. Each test registers its own fakes so
/// tests running in parallel never share counters.
pub struct Counters {
    created: AtomicUsize,
    calls: AtomicUsize,
    shutdowns: AtomicUsize,
    last_format: AtomicU32,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
            shutdowns: AtomicUsize::new(0),
            last_format: AtomicU32::new(u32::MAX),
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }

    /// Format of the last presented frame.
    pub fn last_format(&self) -> Option<PixelFormat> {
        PixelFormat::from_raw(self.last_format.load(Ordering::SeqCst))
    }
}

pub struct FakeVideo {
    counters: &'static Counters,
    pub accepts: &'static [PixelFormat],
    /// Fail the n-th present (1-based).
    pub fail_at: Option<usize>,
    pub fail_shutdown: bool,
}

impl FakeVideo {
    pub fn new(counters: &'static Counters) -> Self {
        counters.created.fetch_add(1, Ordering::SeqCst);
        Self {
            counters,
            accepts: &PixelFormat::ALL,
            fail_at: None,
            fail_shutdown: false,
        }
    }
}

impl VideoDriver for FakeVideo {
    fn accepts(&self, format: PixelFormat) -> bool {
        self.accepts.contains(&format)
    }

    fn present(&mut self, frame: &Frame<'_>) -> Result<(), DriverError> {
        let n = self.counters.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters
            .last_format
            .store(frame.format.to_raw(), Ordering::SeqCst);
        if self.fail_at == Some(n) {
            return Err(DriverError::Backend("panel disconnected".into()));
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown {
            return Err(DriverError::Backend("window already gone".into()));
        }
        Ok(())
    }
}

pub struct FakeAudio {
    counters: &'static Counters,
    /// Fail the n-th enqueue (1-based).
    pub fail_at: Option<usize>,
}

impl FakeAudio {
    pub fn new(counters: &'static Counters) -> Self {
        counters.created.fetch_add(1, Ordering::SeqCst);
        Self {
            counters,
            fail_at: None,
        }
    }
}

impl AudioDriver for FakeAudio {
    fn enqueue(&mut self, _chunk: &AudioChunk<'_>) -> Result<(), DriverError> {
        let n = self.counters.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at == Some(n) {
            return Err(DriverError::Timeout(Duration::from_millis(20)));
        }
        Ok(())
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeInput {
    counters: &'static Counters,
    pub state: InputState,
    /// Fail the n-th poll (1-based).
    pub fail_at: Option<usize>,
    pub fail_shutdown: bool,
}

impl FakeInput {
    pub fn new(counters: &'static Counters) -> Self {
        counters.created.fetch_add(1, Ordering::SeqCst);
        Self {
            counters,
            state: InputState::neutral(),
            fail_at: None,
            fail_shutdown: false,
        }
    }
}

impl InputDriver for FakeInput {
    fn poll(&mut self) -> Result<InputState, DriverError> {
        let n = self.counters.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_at == Some(n) {
            return Err(DriverError::Unavailable("keyboard unplugged".into()));
        }
        Ok(self.state)
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        if self.fail_shutdown {
            return Err(DriverError::Backend("device vanished".into()));
        }
        Ok(())
    }
}

/// A core that draws one blank frame and one frame of silence per step.
pub struct StubCore {
    info: SystemInfo,
    /// Pixel format requested while loading.
    pub format: Option<PixelFormat>,
    /// Ask the host to shut down on this step (1-based).
    pub shutdown_at: Option<u64>,
    pub steps: u64,
    pub save: Vec<u8>,
    /// `save[0]` as seen on the first step.
    pub seen_save: Arc<AtomicU32>,
    pub unloads: Arc<AtomicUsize>,
    pixels: Vec<u8>,
}

impl StubCore {
    pub fn new() -> Self {
        Self {
            info: SystemInfo {
                library_name: "stub".to_string(),
                library_version: "1.0".to_string(),
                valid_extensions: vec!["hex".to_string()],
                need_fullpath: false,
                block_extract: false,
            },
            format: None,
            shutdown_at: None,
            steps: 0,
            save: Vec::new(),
            seen_save: Arc::new(AtomicU32::new(u32::MAX)),
            unloads: Arc::new(AtomicUsize::new(0)),
            pixels: Vec::new(),
        }
    }

    pub fn shutting_down_at(step: u64) -> Self {
        Self {
            shutdown_at: Some(step),
            ..Self::new()
        }
    }

    /// Opener for [`Session::load`](ardubridge_core::session::Session::load).
    pub fn opener(self) -> impl FnOnce() -> Result<Box<dyn Core>, LoadError> {
        move || Ok(Box::new(self) as Box<dyn Core>)
    }
}

pub const WIDTH: u32 = 128;
pub const HEIGHT: u32 = 64;

impl Core for StubCore {
    fn system_info(&self) -> &SystemInfo {
        &self.info
    }

    fn load_game(&mut self, host: &mut dyn Host, rom: &RomImage) -> Result<AvInfo, CoreError> {
        if rom.data().is_empty() {
            return Err(CoreError::GameRejected(rom.path().to_path_buf()));
        }
        if let Some(format) = self.format {
            host.set_pixel_format(format.to_raw());
        }
        Ok(AvInfo {
            geometry: Geometry {
                base_width: WIDTH,
                base_height: HEIGHT,
                max_width: WIDTH,
                max_height: HEIGHT,
                aspect_ratio: 2.0,
            },
            fps: 60.0,
            sample_rate: 44_100.0,
        })
    }

    fn run(&mut self, host: &mut dyn Host) {
        if self.steps == 0 {
            let first = self.save.first().map_or(u32::MAX, |b| *b as u32);
            self.seen_save.store(first, Ordering::SeqCst);
        }
        self.steps += 1;

        host.input_poll();
        let format = host.pixel_format();
        let pitch = WIDTH as usize * format.bytes_per_pixel();
        self.pixels.resize(pitch * HEIGHT as usize, 0);
        if let Some(frame) = Frame::new(&self.pixels, WIDTH, HEIGHT, pitch, format) {
            host.video_refresh(Some(&frame));
        }
        host.audio_sample_batch(&[0; 735 * 2]);

        if let Some(first) = self.save.first_mut() {
            *first = self.steps as u8;
        }
        if self.shutdown_at == Some(self.steps) {
            host.request_shutdown();
        }
    }

    fn save_ram(&mut self) -> Option<&mut [u8]> {
        if self.save.is_empty() {
            None
        } else {
            Some(&mut self.save)
        }
    }

    fn unload(&mut self) -> Result<(), CoreError> {
        self.unloads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Write a small game file into `dir`.
pub fn game_file(dir: &Path) -> PathBuf {
    let path = dir.join("game.hex");
    fs::write(&path, b":00000001FF\n").unwrap();
    path
}
