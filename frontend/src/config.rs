//! Configuration file (`<config dir>/ardubridge/config.toml`).
//!
//! Every table and key is optional:
//!
//! ```toml
//! [drivers]
//! video = "ssd1306"
//! audio = "alsa"
//! input = "evdev"
//!
//! [audio]
//! volume = 0.5
//! latency = "low"
//!
//! [panel]
//! device = "/dev/i2c-1"
//! threshold = 96
//!
//! [core.options]
//! arduous_palette = "amber"
//!
//! [session]
//! pace = "unthrottled"
//! max_frames = 600
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ardubridge_core::options::{
    AudioOptions, CoreSettings, DriverOptions, DriverSelection, EvdevOptions, PanelOptions,
    VideoOptions,
};
use ardubridge_core::session::SessionConfig;
use ardubridge_core::timing::Pacing;
use serde::Deserialize;

/// Driver used for a kind the config leaves unset.
pub const DEFAULT_DRIVER: &str = "sdl";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DriversConfig {
    pub video: Option<String>,
    pub audio: Option<String>,
    pub input: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub pace: Pacing,
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub drivers: DriversConfig,
    pub video: VideoOptions,
    pub audio: AudioOptions,
    pub panel: PanelOptions,
    pub evdev: EvdevOptions,
    pub core: CoreSettings,
    pub session: SessionSection,
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ardubridge").join("config.toml"))
}

/// Default directory for save RAM files.
pub fn default_save_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("ardubridge").join("saves"))
}

impl Config {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path`, or the default location when `path` is `None`.
    ///
    /// An explicitly named file must exist; a missing default file yields
    /// the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_path() {
                Some(p) => (p, false),
                None => return Ok(Self::default()),
            },
        };
        if !explicit && !path.exists() {
            log::debug!("no config file at {}", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config =
            Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))?;
        log::info!("config: {}", path.display());
        Ok(config)
    }

    pub fn into_session_config(self) -> SessionConfig {
        let name = |n: Option<String>| n.unwrap_or_else(|| DEFAULT_DRIVER.to_string());
        SessionConfig {
            drivers: DriverSelection {
                video: name(self.drivers.video),
                audio: name(self.drivers.audio),
                input: name(self.drivers.input),
            },
            options: DriverOptions {
                video: self.video,
                audio: self.audio,
                panel: self.panel,
                evdev: self.evdev,
            },
            core: self.core,
            pacing: self.session.pace,
            max_frames: self.session.max_frames,
        }
    }
}

#[cfg(test)]
mod tests {
    use ardubridge_core::options::{Latency, Overflow};

    use super::*;

    #[test]
    fn test_empty_config_uses_sdl_everywhere() {
        let session = Config::parse("").unwrap().into_session_config();
        assert_eq!(session.drivers.video, "sdl");
        assert_eq!(session.drivers.audio, "sdl");
        assert_eq!(session.drivers.input, "sdl");
        assert_eq!(session.pacing, Pacing::Realtime);
        assert_eq!(session.max_frames, None);
        assert_eq!(session.options.video.scale, 6);
    }

    #[test]
    fn test_partial_tables_keep_defaults() {
        let config = Config::parse(
            r#"
            [drivers]
            video = "ssd1306"

            [audio]
            latency = "high"
            overflow = "block"

            [panel]
            address = 0x3D
            invert = true
            "#,
        )
        .unwrap();
        let session = config.into_session_config();

        assert_eq!(session.drivers.video, "ssd1306");
        assert_eq!(session.drivers.audio, "sdl");
        assert_eq!(session.options.audio.latency, Latency::High);
        assert_eq!(session.options.audio.overflow, Overflow::Block);
        assert_eq!(session.options.audio.channels, 2);
        assert_eq!(session.options.panel.address, 0x3D);
        assert!(session.options.panel.invert);
        assert_eq!(session.options.panel.width, 128);
    }

    #[test]
    fn test_core_options_and_session() {
        let config = Config::parse(
            r#"
            [core]
            save_dir = "/var/lib/ardubridge"

            [core.options]
            arduous_palette = "amber"

            [session]
            pace = "unthrottled"
            max_frames = 600
            "#,
        )
        .unwrap();
        let session = config.into_session_config();

        assert_eq!(
            session.core.save_dir.as_deref(),
            Some(Path::new("/var/lib/ardubridge"))
        );
        assert_eq!(session.core.options["arduous_palette"], "amber");
        assert_eq!(session.pacing, Pacing::Unthrottled);
        assert_eq!(session.max_frames, Some(600));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(Config::parse("[audio]\nlatency = \"instant\"").is_err());
        assert!(Config::parse("[session]\nmax_frames = -1").is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.toml");
        assert!(Config::load(Some(&missing)).is_err());

        fs::write(&missing, "[video]\nshow_fps = true\n").unwrap();
        let config = Config::load(Some(&missing)).unwrap();
        assert!(config.video.show_fps);
    }
}
