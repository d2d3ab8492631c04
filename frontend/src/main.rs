//! ardubridge: run an Arduboy libretro core with pluggable drivers.
//!
//! ```bash
//! ardubridge arduous_libretro.so game.arduboy
//! ardubridge arduous_libretro.so game.hex --video ssd1306 --audio alsa --input evdev
//! ardubridge --list-drivers
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ardubridge_core::driver::DriverKind;
use ardubridge_core::emulator::Core;
use ardubridge_core::registry;
use ardubridge_core::session::{Session, SessionConfig};
use ardubridge_core::timing::Pacing;
use clap::Parser;

mod config;
mod libretro;

use config::Config;
use libretro::LibretroCore;

#[derive(Parser)]
#[command(name = "ardubridge", version, about = "Arduboy libretro frontend")]
struct Args {
    /// libretro core shared library
    #[arg(required_unless_present = "list_drivers")]
    core: Option<PathBuf>,

    /// Game: .hex, or an .arduboy archive
    #[arg(required_unless_present = "list_drivers")]
    rom: Option<PathBuf>,

    /// Video driver (sdl, ssd1306, headless)
    #[arg(long)]
    video: Option<String>,

    /// Audio driver (sdl, alsa, headless)
    #[arg(long)]
    audio: Option<String>,

    /// Input driver (sdl, evdev, headless)
    #[arg(long)]
    input: Option<String>,

    /// Config file [default: <config dir>/ardubridge/config.toml]
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Window scale over the core's resolution
    #[arg(long, short = 's')]
    scale: Option<u32>,

    /// Show a frames-per-second counter
    #[arg(long)]
    show_fps: bool,

    /// Output volume, 0.0 to 1.0
    #[arg(long)]
    volume: Option<f32>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Run as fast as the drivers allow
    #[arg(long)]
    no_pace: bool,

    /// List the drivers built into this binary and exit
    #[arg(long)]
    list_drivers: bool,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    /// Layer command-line flags over the config file.
    fn apply(&self, config: &mut SessionConfig) {
        if let Some(name) = &self.video {
            config.drivers.video.clone_from(name);
        }
        if let Some(name) = &self.audio {
            config.drivers.audio.clone_from(name);
        }
        if let Some(name) = &self.input {
            config.drivers.input.clone_from(name);
        }
        if let Some(scale) = self.scale {
            config.options.video.scale = scale;
        }
        if self.show_fps {
            config.options.video.show_fps = true;
        }
        if let Some(volume) = self.volume {
            config.options.audio.volume = volume;
        }
        if self.max_frames.is_some() {
            config.max_frames = self.max_frames;
        }
        if self.no_pace {
            config.pacing = Pacing::Unthrottled;
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();
}

fn list_drivers() {
    println!("backends: {}", ardubridge_drivers::backends().join(", "));
    for kind in DriverKind::ALL {
        println!("{kind}:");
        for spec in registry::all().iter().filter(|s| s.kind() == kind) {
            println!("  {:<10} {}", spec.name, spec.description);
        }
    }
}

fn run(core_path: &Path, rom: &Path, mut config: SessionConfig) -> Result<()> {
    if config.core.save_dir.is_none() {
        config.core.save_dir = config::default_save_dir();
    }
    if let Some(dir) = &config.core.save_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("creating save directory {}", dir.display()))?;
    }
    log::info!(
        "drivers: video={} audio={} input={}",
        config.drivers.video,
        config.drivers.audio,
        config.drivers.input
    );

    let mut session = Session::start(config, rom, || {
        let core: Box<dyn Core> = Box::new(LibretroCore::open(core_path)?);
        Ok(core)
    })
    .with_context(|| format!("loading {}", rom.display()))?;

    let summary = session.run().context("session failed")?;
    log::info!(
        "stopped after {} frames ({:?}); {} duplicated, {} converted, {} slow driver calls",
        summary.frames,
        summary.reason,
        summary.stats.frames_duplicated,
        summary.stats.frames_converted,
        summary.stats.slow_calls
    );
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    if args.list_drivers {
        list_drivers();
        return Ok(());
    }
    let (Some(core_path), Some(rom)) = (&args.core, &args.rom) else {
        anyhow::bail!("a core and a ROM are required");
    };

    let mut config = Config::load(args.config.as_deref())?.into_session_config();
    args.apply(&mut config);
    run(core_path, rom, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "ardubridge",
            "core.so",
            "game.hex",
            "--video",
            "headless",
            "--volume",
            "0.25",
            "--no-pace",
            "--max-frames",
            "10",
        ]);
        let mut config = Config::default().into_session_config();
        args.apply(&mut config);

        assert_eq!(config.drivers.video, "headless");
        assert_eq!(config.drivers.audio, "sdl");
        assert_eq!(config.options.audio.volume, 0.25);
        assert_eq!(config.pacing, Pacing::Unthrottled);
        assert_eq!(config.max_frames, Some(10));
    }

    #[test]
    fn test_list_drivers_needs_no_paths() {
        let args = Args::try_parse_from(["ardubridge", "--list-drivers"]).unwrap();
        assert!(args.list_drivers);
        assert!(Args::try_parse_from(["ardubridge"]).is_err());
    }
}
