pub mod audio_queue;
pub mod bridge;
pub mod driver;
pub mod emulator;
pub mod error;
pub mod frame;
pub mod headless;
pub mod input;
pub mod options;
pub mod registry;
pub mod rom;
pub mod session;
pub mod timing;

pub mod prelude {
    pub use crate::driver::{
        AudioChunk, AudioDriver, DriverError, DriverKind, DriverParams, InputDriver, VideoDriver,
    };
    pub use crate::emulator::{AvInfo, Core, CoreError, Geometry, Host, SystemInfo};
    pub use crate::error::{LoadError, SessionError};
    pub use crate::frame::{Frame, PixelFormat};
    pub use crate::input::{Axis, InputState, JoypadButton, KeyMap};
    pub use crate::registry::DriverSpec;
    pub use crate::rom::RomImage;
    pub use crate::session::{RunSummary, Session, SessionConfig, StopHandle, StopReason};
}
