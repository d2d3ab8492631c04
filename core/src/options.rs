//! Construction-time options for drivers and the core host.
//!
//! Every struct deserializes from a TOML/JSON table with all fields
//! optional, so a config file only lists what it changes.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::audio_queue::OverflowPolicy;
use crate::driver::DriverKind;

/// Which registered driver to use for each capability kind.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DriverSelection {
    pub video: String,
    pub audio: String,
    pub input: String,
}

impl DriverSelection {
    /// Headless drivers for every kind.
    pub fn headless() -> Self {
        Self {
            video: "headless".to_string(),
            audio: "headless".to_string(),
            input: "headless".to_string(),
        }
    }

    pub fn name(&self, kind: DriverKind) -> &str {
        match kind {
            DriverKind::Video => &self.video,
            DriverKind::Audio => &self.audio,
            DriverKind::Input => &self.input,
        }
    }
}

impl Default for DriverSelection {
    fn default() -> Self {
        Self::headless()
    }
}

/// Options for every driver, grouped by backend.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DriverOptions {
    pub video: VideoOptions,
    pub audio: AudioOptions,
    pub panel: PanelOptions,
    pub evdev: EvdevOptions,
}

/// Windowed video.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct VideoOptions {
    pub title: String,
    /// Integer window scale over the core's base resolution.
    pub scale: u32,
    /// Draw a frames-per-second counter in the top-left corner.
    pub show_fps: bool,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            title: "ardubridge".to_string(),
            scale: 6,
            show_fps: false,
        }
    }
}

/// Device buffer size presets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Latency {
    Low,
    #[default]
    Normal,
    High,
}

impl Latency {
    /// Device buffer size in frames.
    pub fn buffer_frames(self) -> u32 {
        match self {
            Self::Low => 256,
            Self::Normal => 1024,
            Self::High => 4096,
        }
    }
}

/// What `enqueue` does when the playback queue is full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Overflow {
    /// Discard the oldest queued samples so latency stays bounded.
    #[default]
    DropOldest,
    /// Wait for room up to `block_timeout_ms`, then fail the driver.
    Block,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct AudioOptions {
    /// Linear gain applied before output, clamped to 0.0..=1.0.
    pub volume: f32,
    /// Output channel count. Stereo input is downmixed for mono and the
    /// left/right pair is repeated for wider layouts.
    pub channels: u16,
    pub latency: Latency,
    /// Playback queue depth in milliseconds of audio.
    pub queue_ms: u32,
    pub overflow: Overflow,
    pub block_timeout_ms: u64,
    /// Output device name; the host default when unset.
    pub device: Option<String>,
}

impl AudioOptions {
    pub fn gain(&self) -> f32 {
        self.volume.clamp(0.0, 1.0)
    }

    pub fn block_timeout(&self) -> Duration {
        Duration::from_millis(self.block_timeout_ms)
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        match self.overflow {
            Overflow::DropOldest => OverflowPolicy::DropOldest,
            Overflow::Block => OverflowPolicy::Block(self.block_timeout()),
        }
    }

    /// Queue capacity in interleaved samples at `sample_rate` and
    /// `channels`, never less than one device buffer.
    pub fn queue_capacity(&self, sample_rate: u32, channels: u16) -> usize {
        let frames = (sample_rate as u64 * self.queue_ms as u64 / 1000) as usize;
        let frames = frames.max(self.latency.buffer_frames() as usize);
        frames * channels.max(1) as usize
    }
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            volume: 1.0,
            channels: 2,
            latency: Latency::Normal,
            queue_ms: 250,
            overflow: Overflow::DropOldest,
            block_timeout_ms: 20,
            device: None,
        }
    }
}

/// SSD1306-class monochrome panel on an i2c-dev bus.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PanelOptions {
    pub device: PathBuf,
    /// 7-bit I2C address, usually 0x3C or 0x3D.
    pub address: u16,
    pub width: u32,
    pub height: u32,
    /// Pixels with luma above this are lit.
    pub threshold: u8,
    pub invert: bool,
    pub contrast: u8,
    /// Mount the panel upside down.
    pub flip: bool,
}

impl Default for PanelOptions {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/i2c-1"),
            address: 0x3C,
            width: 128,
            height: 64,
            threshold: 64,
            invert: false,
            contrast: 0xCF,
            flip: false,
        }
    }
}

/// Linux event devices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EvdevOptions {
    /// Devices to read. Every readable `/dev/input/event*` when empty.
    pub devices: Vec<PathBuf>,
}

/// Settings the host exposes to the core through the environment callback.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Directory reported for `GET_SYSTEM_DIRECTORY` (BIOS files).
    pub system_dir: Option<PathBuf>,
    /// Directory for save RAM files and `GET_SAVE_DIRECTORY`.
    pub save_dir: Option<PathBuf>,
    /// Core option overrides, keyed by the core's variable names.
    pub options: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_capacity_covers_at_least_one_buffer() {
        let opts = AudioOptions {
            queue_ms: 1,
            ..AudioOptions::default()
        };
        assert_eq!(opts.queue_capacity(50_000, 2), 1024 * 2);

        let opts = AudioOptions::default();
        assert_eq!(opts.queue_capacity(48_000, 2), 12_000 * 2);
    }

    #[test]
    fn gain_is_clamped() {
        let opts = AudioOptions {
            volume: 3.0,
            ..AudioOptions::default()
        };
        assert_eq!(opts.gain(), 1.0);
    }

    #[test]
    fn selection_defaults_to_headless() {
        let sel = DriverSelection::default();
        for kind in DriverKind::ALL {
            assert_eq!(sel.name(kind), "headless");
        }
    }

    #[test]
    fn partial_tables_keep_defaults() {
        let opts: DriverOptions =
            serde_json::from_str(r#"{"audio": {"overflow": "block", "latency": "low"}}"#).unwrap();
        assert_eq!(opts.audio.overflow, Overflow::Block);
        assert_eq!(opts.audio.latency.buffer_frames(), 256);
        assert_eq!(opts.audio.volume, 1.0);
        assert_eq!(opts.panel.address, 0x3C);
    }
}
