//! Error taxonomy for session startup, runtime and teardown.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::driver::{DriverError, DriverKind};
use crate::emulator::CoreError;
use crate::frame::PixelFormat;
use crate::session::SessionState;

/// A configuration named a driver that is not registered for its kind.
#[derive(Debug, Error)]
#[error("unknown {kind} driver `{name}` (available: {})", .available.join(", "))]
pub struct UnknownDriverError {
    pub kind: DriverKind,
    pub name: String,
    pub available: Vec<&'static str>,
}

/// Startup failed before the session reached `Loaded`.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("ROM not found: {}", .0.display())]
    RomNotFound(PathBuf),

    #[error("failed to read ROM {}: {source}", .path.display())]
    RomUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ROM archive {} is invalid: {reason}", .path.display())]
    InvalidArchive { path: PathBuf, reason: String },

    #[error("ROM archive {} contains no game binary", .0.display())]
    NoBinary(PathBuf),

    #[error("core not found: {}", .0.display())]
    CoreNotFound(PathBuf),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("failed to start {kind} driver `{driver}`: {error}")]
    Driver {
        kind: DriverKind,
        driver: &'static str,
        error: DriverError,
    },
}

/// The core and the active drivers could not agree on a format.
#[derive(Debug, Error)]
pub enum UnsupportedFormatError {
    #[error("video driver `{driver}` accepts neither {core} nor XRGB8888")]
    Pixel {
        core: PixelFormat,
        driver: &'static str,
    },

    #[error("core requested unknown pixel format value {0}")]
    UnknownPixelFormat(u32),

    #[error("core reported invalid audio sample rate {0}")]
    SampleRate(f64),
}

/// An active driver failed while the session was running.
#[derive(Debug, Error)]
#[error("{kind} driver `{driver}` failed: {error}")]
pub struct DriverFailure {
    pub kind: DriverKind,
    pub driver: &'static str,
    pub error: DriverError,
}

/// Something released during teardown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Component {
    Driver(DriverKind),
    Core,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(kind) => write!(f, "{kind} driver"),
            Self::Core => f.write_str("core"),
        }
    }
}

/// One release that failed during teardown.
#[derive(Debug, Error)]
#[error("{component}: {message}")]
pub struct TeardownFailure {
    pub component: Component,
    pub message: String,
}

/// Every failure collected during one teardown, plus the error that
/// triggered it, if any: a driver failure while running or a startup error.
#[derive(Debug)]
pub struct TeardownError {
    pub failures: Vec<TeardownFailure>,
    pub cause: Option<Box<SessionError>>,
}

impl fmt::Display for TeardownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(cause) = &self.cause {
            write!(f, "{cause}; ")?;
        }
        write!(f, "teardown failed for {} component(s)", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n  {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for TeardownError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Anything a session operation can fail with.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    UnknownDriver(#[from] UnknownDriverError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    UnsupportedFormat(#[from] UnsupportedFormatError),

    #[error(transparent)]
    Driver(#[from] DriverFailure),

    #[error(transparent)]
    Teardown(#[from] TeardownError),

    #[error("cannot {action} a session that is {state}")]
    InvalidState {
        state: SessionState,
        action: &'static str,
    },
}
