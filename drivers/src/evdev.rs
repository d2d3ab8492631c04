//! Linux event devices read directly from `/dev/input/event*`.
//!
//! Devices are opened non-blocking; each poll drains whatever records are
//! pending and folds them into the held-button state.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use ardubridge_core::driver::{DriverError, DriverParams, InputDriver};
use ardubridge_core::input::{InputState, JoypadButton};
use ardubridge_core::registry::DriverSpec;

const EV_KEY: u16 = 0x01;
const EV_ABS: u16 = 0x03;

const ABS_HAT0X: u16 = 0x10;
const ABS_HAT0Y: u16 = 0x11;

const KEY_ESC: u16 = 1;

/// Size of `struct input_event`: a `timeval` then type, code and value.
const EVENT_SIZE: usize = mem::size_of::<libc::timeval>() + 8;

/// Records read per `read` call.
const READ_BATCH: usize = 64;

/// What a key or button code means to the core.
fn button_for(code: u16) -> Option<JoypadButton> {
    Some(match code {
        103 => JoypadButton::Up,     // KEY_UP
        108 => JoypadButton::Down,   // KEY_DOWN
        105 => JoypadButton::Left,   // KEY_LEFT
        106 => JoypadButton::Right,  // KEY_RIGHT
        44 => JoypadButton::B,       // KEY_Z
        45 => JoypadButton::A,       // KEY_X
        28 => JoypadButton::Start,   // KEY_ENTER
        54 => JoypadButton::Select,  // KEY_RIGHTSHIFT
        14 => JoypadButton::Select,  // KEY_BACKSPACE
        0x130 => JoypadButton::B,      // BTN_SOUTH
        0x131 => JoypadButton::A,      // BTN_EAST
        0x133 => JoypadButton::Y,      // BTN_NORTH
        0x134 => JoypadButton::X,      // BTN_WEST
        0x136 => JoypadButton::L,      // BTN_TL
        0x137 => JoypadButton::R,      // BTN_TR
        0x13a => JoypadButton::Select, // BTN_SELECT
        0x13b => JoypadButton::Start,  // BTN_START
        0x220 => JoypadButton::Up,     // BTN_DPAD_UP
        0x221 => JoypadButton::Down,   // BTN_DPAD_DOWN
        0x222 => JoypadButton::Left,   // BTN_DPAD_LEFT
        0x223 => JoypadButton::Right,  // BTN_DPAD_RIGHT
        _ => return None,
    })
}

/// One decoded `input_event`, time stamp dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    /// Decode one native-endian record of [`EVENT_SIZE`] bytes.
    pub fn parse(record: &[u8]) -> Option<Self> {
        if record.len() < EVENT_SIZE {
            return None;
        }
        let body = &record[EVENT_SIZE - 8..EVENT_SIZE];
        Some(Self {
            kind: u16::from_ne_bytes([body[0], body[1]]),
            code: u16::from_ne_bytes([body[2], body[3]]),
            value: i32::from_ne_bytes([body[4], body[5], body[6], body[7]]),
        })
    }
}

/// Button state accumulated across all open devices.
#[derive(Debug, Default)]
pub struct EventState {
    state: InputState,
}

impl EventState {
    pub fn apply(&mut self, event: RawEvent) {
        match event.kind {
            EV_KEY if event.code == KEY_ESC => {
                if event.value != 0 {
                    self.state.quit = true;
                }
            }
            // Value 2 is autorepeat, which leaves the button held.
            EV_KEY => {
                if let Some(button) = button_for(event.code) {
                    self.state.set(button, event.value != 0);
                }
            }
            EV_ABS if event.code == ABS_HAT0X => {
                self.state.set(JoypadButton::Left, event.value < 0);
                self.state.set(JoypadButton::Right, event.value > 0);
            }
            EV_ABS if event.code == ABS_HAT0Y => {
                self.state.set(JoypadButton::Up, event.value < 0);
                self.state.set(JoypadButton::Down, event.value > 0);
            }
            _ => {}
        }
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    /// Forget held buttons, keeping a pending quit.
    pub fn release_all(&mut self) {
        let quit = self.state.quit;
        self.state = InputState::neutral();
        self.state.quit = quit;
    }
}

struct Device {
    path: PathBuf,
    file: File,
}

fn open(path: &Path) -> io::Result<Device> {
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)?;
    Ok(Device {
        path: path.to_path_buf(),
        file,
    })
}

/// Every `/dev/input/event*` node, sorted by name.
fn scan() -> io::Result<Vec<PathBuf>> {
    let mut found: Vec<PathBuf> = fs::read_dir("/dev/input")?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("event"))
        })
        .collect();
    found.sort();
    Ok(found)
}

pub struct EvdevInput {
    devices: Vec<Device>,
    events: EventState,
    buf: Vec<u8>,
}

impl EvdevInput {
    pub fn new(params: &DriverParams<'_>) -> Result<Self, DriverError> {
        let configured = &params.options.evdev.devices;
        let explicit = !configured.is_empty();
        let paths = if explicit {
            configured.clone()
        } else {
            scan().map_err(|e| DriverError::Unavailable(format!("/dev/input: {e}")))?
        };

        let mut devices = Vec::new();
        for path in &paths {
            match open(path) {
                Ok(device) => {
                    log::info!("evdev: reading {}", path.display());
                    devices.push(device);
                }
                // A named device must open; scanned ones may be someone else's.
                Err(e) if explicit => {
                    return Err(DriverError::Unavailable(format!("{}: {e}", path.display())));
                }
                Err(e) => log::debug!("evdev: skipping {}: {e}", path.display()),
            }
        }
        if devices.is_empty() {
            return Err(DriverError::Unavailable("no readable event devices".into()));
        }
        Ok(Self::from_devices(devices))
    }

    fn from_devices(devices: Vec<Device>) -> Self {
        Self {
            devices,
            events: EventState::default(),
            buf: vec![0; EVENT_SIZE * READ_BATCH],
        }
    }
}

impl InputDriver for EvdevInput {
    fn poll(&mut self) -> Result<InputState, DriverError> {
        let mut lost = false;
        let mut i = 0;
        while i < self.devices.len() {
            let device = &mut self.devices[i];
            match drain(&mut device.file, &mut self.buf, &mut self.events) {
                Ok(()) => i += 1,
                Err(e) => {
                    log::warn!("evdev: {} gone: {e}", device.path.display());
                    self.devices.swap_remove(i);
                    lost = true;
                }
            }
        }
        if lost {
            self.events.release_all();
        }
        if self.devices.is_empty() {
            return Err(DriverError::Unavailable("all event devices disconnected".into()));
        }
        Ok(self.events.state())
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        self.devices.clear();
        Ok(())
    }
}

/// Read records until the device would block.
fn drain(file: &mut impl Read, buf: &mut [u8], events: &mut EventState) -> io::Result<()> {
    loop {
        let n = match file.read(buf) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        for record in buf[..n].chunks_exact(EVENT_SIZE) {
            if let Some(event) = RawEvent::parse(record) {
                events.apply(event);
            }
        }
        if n < buf.len() {
            return Ok(());
        }
    }
}

fn create(params: &DriverParams<'_>) -> Result<Box<dyn InputDriver>, DriverError> {
    Ok(Box::new(EvdevInput::new(params)?))
}

inventory::submit! {
    DriverSpec::input("evdev", "Linux event devices", create)
}
