//! Hardware drivers for ardubridge.
//!
//! Each driver registers itself with the core registry when this crate is
//! linked in; a binary only has to reference [`backends`] (or anything else
//! here) so the linker keeps the registrations.

pub mod overlay;

#[cfg(feature = "sdl")]
mod sdl;
#[cfg(feature = "sdl")]
pub mod sdl_audio;
#[cfg(feature = "sdl")]
pub mod sdl_input;
#[cfg(feature = "sdl")]
pub mod sdl_video;

#[cfg(feature = "cpal")]
pub mod cpal_audio;

#[cfg(target_os = "linux")]
pub mod evdev;
#[cfg(target_os = "linux")]
pub mod ssd1306;

/// Backends compiled into this build.
pub fn backends() -> &'static [&'static str] {
    &[
        #[cfg(feature = "sdl")]
        "sdl",
        #[cfg(feature = "cpal")]
        "cpal",
        #[cfg(target_os = "linux")]
        "linux",
    ]
}
