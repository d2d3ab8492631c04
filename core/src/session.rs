//! Session lifecycle: load a game, run it, tear everything down.
//!
//! ```text
//! Uninitialized --load--> Loaded --run--> Running --> Stopped
//!        \____________________\___stop / failure_____/
//! ```
//!
//! A stopped session cannot be restarted; build a new one instead.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::bridge::{Bridge, BridgeStats};
use crate::driver::{DriverKind, DriverParams};
use crate::emulator::{AvInfo, Core, SystemInfo};
use crate::error::{Component, LoadError, SessionError, TeardownError, TeardownFailure};
use crate::options::{CoreSettings, DriverOptions, DriverSelection};
use crate::registry::{self, DriverFactory, DriverSpec};
use crate::rom::{RomImage, load_rom};
use crate::timing::{FramePacer, Pacing};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Loaded,
    Running,
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Loaded => "loaded",
            Self::Running => "running",
            Self::Stopped => "stopped",
        })
    }
}

/// Everything needed to build a session.
#[derive(Clone, Debug, Default)]
pub struct SessionConfig {
    pub drivers: DriverSelection,
    pub options: DriverOptions,
    pub core: CoreSettings,
    pub pacing: Pacing,
    /// Stop after this many core steps.
    pub max_frames: Option<u64>,
}

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// [`StopHandle::stop`] was called.
    Requested,
    /// The core asked to shut down.
    CoreShutdown,
    /// The input driver reported a quit request.
    UserQuit,
    FrameLimit,
    DriverFailure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames: u64,
    pub reason: StopReason,
    pub stats: BridgeStats,
}

/// Asks a running session to stop after its current step.
#[derive(Clone, Debug)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct Session {
    config: SessionConfig,
    state: SessionState,
    bridge: Bridge,
    core: Option<Box<dyn Core>>,
    system_info: Option<SystemInfo>,
    rom: Option<RomImage>,
    av: AvInfo,
    save_path: Option<PathBuf>,
    stop: StopHandle,
    frames: u64,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let bridge = Bridge::new(&config.core);
        Self {
            config,
            state: SessionState::Uninitialized,
            bridge,
            core: None,
            system_info: None,
            rom: None,
            av: AvInfo::default(),
            save_path: None,
            stop: StopHandle(Arc::new(AtomicBool::new(false))),
            frames: 0,
        }
    }

    /// Build and load a session in one go.
    pub fn start(
        config: SessionConfig,
        rom: &Path,
        open_core: impl FnOnce() -> Result<Box<dyn Core>, LoadError>,
    ) -> Result<Self, SessionError> {
        let mut session = Self::new(config);
        session.load(rom, open_core)?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn av_info(&self) -> &AvInfo {
        &self.av
    }

    pub fn rom(&self) -> Option<&RomImage> {
        self.rom.as_ref()
    }

    pub fn system_info(&self) -> Option<&SystemInfo> {
        self.system_info.as_ref()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn stats(&self) -> BridgeStats {
        self.bridge.stats()
    }

    /// Load `rom` into the core returned by `open_core` and bring up the
    /// configured drivers.
    ///
    /// Driver names are checked before anything is opened. On failure
    /// whatever was already built is torn down and the session ends up
    /// `Stopped`.
    pub fn load(
        &mut self,
        rom_path: &Path,
        open_core: impl FnOnce() -> Result<Box<dyn Core>, LoadError>,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::InvalidState {
                state: self.state,
                action: "load",
            });
        }

        let specs = match self.resolve_drivers() {
            Ok(specs) => specs,
            Err(e) => {
                self.state = SessionState::Stopped;
                return Err(e);
            }
        };

        let result = self.bring_up(rom_path, open_core, specs);
        match result {
            Ok(()) => {
                self.state = SessionState::Loaded;
                Ok(())
            }
            Err(e) => {
                let failures = self.release_all();
                self.state = SessionState::Stopped;
                if failures.is_empty() {
                    Err(e)
                } else {
                    Err(TeardownError {
                        failures,
                        cause: Some(Box::new(e)),
                    }
                    .into())
                }
            }
        }
    }

    fn resolve_drivers(&self) -> Result<[&'static DriverSpec; 3], SessionError> {
        let resolve = |kind| registry::resolve(kind, self.config.drivers.name(kind));
        Ok([
            resolve(DriverKind::Video)?,
            resolve(DriverKind::Audio)?,
            resolve(DriverKind::Input)?,
        ])
    }

    fn bring_up(
        &mut self,
        rom_path: &Path,
        open_core: impl FnOnce() -> Result<Box<dyn Core>, LoadError>,
        specs: [&'static DriverSpec; 3],
    ) -> Result<(), SessionError> {
        let rom = load_rom(rom_path)?;
        let core = self.core.insert(open_core()?);
        let info = core.system_info().clone();
        log::info!(
            "core: {} {} (game: {})",
            info.library_name,
            info.library_version,
            rom.name()
        );
        self.system_info = Some(info);

        self.av = core
            .load_game(&mut self.bridge, &rom)
            .map_err(LoadError::from)?;
        log::info!(
            "game loaded: {}x{} @ {:.2} fps, {} Hz",
            self.av.geometry.base_width,
            self.av.geometry.base_height,
            self.av.fps,
            self.av.sample_rate
        );

        self.save_path = self
            .config
            .core
            .save_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.sav", rom.stem())));
        if let Some(path) = &self.save_path {
            load_save_ram(core.as_mut(), path);
        }
        self.rom = Some(rom);

        let params = DriverParams {
            av: &self.av,
            options: &self.config.options,
        };
        for spec in specs {
            let kind = spec.kind();
            let err = |error| LoadError::Driver {
                kind,
                driver: spec.name,
                error,
            };
            match spec.factory {
                DriverFactory::Video(create) => {
                    self.bridge.attach_video(spec.name, create(&params).map_err(err)?)
                }
                DriverFactory::Audio(create) => {
                    self.bridge.attach_audio(spec.name, create(&params).map_err(err)?)
                }
                DriverFactory::Input(create) => {
                    self.bridge.attach_input(spec.name, create(&params).map_err(err)?)
                }
            }
            log::info!("{kind} driver: {}", spec.name);
        }

        self.bridge.negotiate(&self.av)?;
        Ok(())
    }

    /// Run until a stop request, a core shutdown, a quit from the input
    /// driver, the frame limit or a driver failure; then tear down.
    pub fn run(&mut self) -> Result<RunSummary, SessionError> {
        if self.state != SessionState::Loaded {
            return Err(SessionError::InvalidState {
                state: self.state,
                action: "run",
            });
        }
        let Some(core) = self.core.as_mut() else {
            return Err(SessionError::InvalidState {
                state: self.state,
                action: "run",
            });
        };
        self.state = SessionState::Running;

        let mut pacer = FramePacer::new(self.config.pacing, self.av.frame_interval());
        let reason = loop {
            if self.stop.is_stopped() {
                break StopReason::Requested;
            }
            if self.config.max_frames.is_some_and(|max| self.frames >= max) {
                break StopReason::FrameLimit;
            }

            self.bridge.begin_frame();
            if self.bridge.failure().is_some() {
                break StopReason::DriverFailure;
            }
            if self.bridge.quit_requested() {
                break StopReason::UserQuit;
            }

            core.run(&mut self.bridge);
            self.bridge.end_frame();
            self.frames += 1;

            if self.bridge.failure().is_some() {
                break StopReason::DriverFailure;
            }
            if self.bridge.shutdown_requested() {
                break StopReason::CoreShutdown;
            }
            pacer.wait();
        };

        let stats = self.bridge.stats();
        log::info!(
            "stopped after {} frames ({reason:?}); {} presented, {} slow driver calls",
            self.frames,
            stats.frames_presented,
            stats.slow_calls
        );

        let cause = self.bridge.take_failure();
        let failures = self.release_all();
        self.state = SessionState::Stopped;

        if !failures.is_empty() {
            return Err(TeardownError {
                failures,
                cause: cause.map(|c| Box::new(SessionError::from(c))),
            }
            .into());
        }
        if let Some(cause) = cause {
            return Err(cause.into());
        }
        Ok(RunSummary {
            frames: self.frames,
            reason,
            stats,
        })
    }

    /// Stop the session, releasing drivers and core if they are up.
    ///
    /// Calling it again has no effect.
    pub fn stop(&mut self) -> Result<(), SessionError> {
        self.stop.stop();
        if self.state == SessionState::Stopped {
            return Ok(());
        }
        let failures = self.release_all();
        self.state = SessionState::Stopped;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError {
                failures,
                cause: None,
            }
            .into())
        }
    }

    /// Drivers in the order input, audio, video; then save RAM and the core.
    fn release_all(&mut self) -> Vec<TeardownFailure> {
        let mut failures = self.bridge.teardown();
        if let Some(mut core) = self.core.take() {
            if let Some(path) = &self.save_path {
                if let Err(e) = store_save_ram(core.as_mut(), path) {
                    failures.push(TeardownFailure {
                        component: Component::Core,
                        message: format!("writing {}: {e}", path.display()),
                    });
                }
            }
            if let Err(e) = core.unload() {
                log::error!("core failed to unload: {e}");
                failures.push(TeardownFailure {
                    component: Component::Core,
                    message: e.to_string(),
                });
            }
        }
        failures
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state != SessionState::Stopped {
            for failure in self.release_all() {
                log::error!("teardown on drop: {failure}");
            }
        }
    }
}

fn load_save_ram(core: &mut dyn Core, path: &Path) {
    let Some(ram) = core.save_ram() else {
        return;
    };
    match fs::read(path) {
        Ok(data) => {
            let n = data.len().min(ram.len());
            ram[..n].copy_from_slice(&data[..n]);
            log::info!("loaded save RAM from {}", path.display());
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("could not read {}: {e}", path.display()),
    }
}

fn store_save_ram(core: &mut dyn Core, path: &Path) -> std::io::Result<()> {
    let Some(ram) = core.save_ram().filter(|ram| !ram.is_empty()) else {
        return Ok(());
    };
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, &*ram)?;
    log::debug!("saved {} bytes of save RAM to {}", ram.len(), path.display());
    Ok(())
}
