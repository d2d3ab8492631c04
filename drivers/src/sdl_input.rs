use ardubridge_core::driver::{DriverError, DriverParams, InputDriver};
use ardubridge_core::input::{Axis, InputState, JoypadButton, KeyMap};
use ardubridge_core::registry::DriverSpec;
use sdl2::GameControllerSubsystem;
use sdl2::controller::{Axis as PadAxis, Button, GameController};
use sdl2::event::Event;
use sdl2::keyboard::Scancode;

use crate::sdl;

/// Stick deflection that also counts as a d-pad press.
const STICK_THRESHOLD: i16 = 16_000;

/// Keyboard layout: arrows or WASD for the d-pad, Z/X for the two face
/// buttons (B then A, left to right as on the handheld), Enter for Start.
pub fn default_key_map() -> KeyMap<Scancode> {
    let mut km = KeyMap::new();
    for (sc, button) in [
        (Scancode::Up, JoypadButton::Up),
        (Scancode::Down, JoypadButton::Down),
        (Scancode::Left, JoypadButton::Left),
        (Scancode::Right, JoypadButton::Right),
        (Scancode::W, JoypadButton::Up),
        (Scancode::S, JoypadButton::Down),
        (Scancode::A, JoypadButton::Left),
        (Scancode::D, JoypadButton::Right),
        (Scancode::Z, JoypadButton::B),
        (Scancode::X, JoypadButton::A),
        (Scancode::Return, JoypadButton::Start),
        (Scancode::RShift, JoypadButton::Select),
        (Scancode::Backspace, JoypadButton::Select),
    ] {
        km.bind(sc, button);
    }
    km
}

/// Game controller buttons by position, so the bottom face button is
/// RetroPad B on every pad.
pub fn default_pad_map() -> KeyMap<Button> {
    let mut km = KeyMap::new();
    for (b, button) in [
        (Button::DPadUp, JoypadButton::Up),
        (Button::DPadDown, JoypadButton::Down),
        (Button::DPadLeft, JoypadButton::Left),
        (Button::DPadRight, JoypadButton::Right),
        (Button::A, JoypadButton::B),
        (Button::B, JoypadButton::A),
        (Button::X, JoypadButton::Y),
        (Button::Y, JoypadButton::X),
        (Button::Back, JoypadButton::Select),
        (Button::Start, JoypadButton::Start),
        (Button::LeftShoulder, JoypadButton::L),
        (Button::RightShoulder, JoypadButton::R),
        (Button::LeftStick, JoypadButton::L3),
        (Button::RightStick, JoypadButton::R3),
    ] {
        km.bind(b, button);
    }
    km
}

/// Keyboard and game controllers through the SDL event queue.
pub struct SdlInput {
    lease: sdl::Lease,
    controllers: GameControllerSubsystem,
    open: Vec<GameController>,
    keys: KeyMap<Scancode>,
    pad_keys: KeyMap<Button>,
    keyboard: InputState,
    pad: InputState,
    quit: bool,
}

impl SdlInput {
    pub fn new(_params: &DriverParams<'_>) -> Result<Self, DriverError> {
        let lease = sdl::Lease::acquire()?;
        let controllers = lease
            .sdl()
            .game_controller()
            .map_err(|e| DriverError::Unavailable(format!("SDL game controller: {e}")))?;
        // Fail here rather than on the first poll if the pump is taken.
        sdl::with_events(|_| ())?;

        Ok(Self {
            lease,
            controllers,
            open: Vec::new(),
            keys: default_key_map(),
            pad_keys: default_pad_map(),
            keyboard: InputState::neutral(),
            pad: InputState::neutral(),
            quit: false,
        })
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::Quit { .. }
            | Event::KeyDown {
                scancode: Some(Scancode::Escape),
                ..
            } => self.quit = true,

            Event::KeyDown {
                scancode: Some(sc),
                repeat: false,
                ..
            } => {
                if let Some(button) = self.keys.get(&sc) {
                    self.keyboard.press(button);
                }
            }

            Event::KeyUp {
                scancode: Some(sc), ..
            } => {
                if let Some(button) = self.keys.get(&sc) {
                    self.keyboard.release(button);
                }
            }

            Event::ControllerDeviceAdded { which, .. } => match self.controllers.open(which) {
                Ok(pad) => {
                    log::info!("game controller connected: {}", pad.name());
                    self.open.push(pad);
                }
                Err(e) => log::warn!("could not open game controller {which}: {e}"),
            },

            Event::ControllerDeviceRemoved { which, .. } => {
                self.open.retain(|pad| pad.instance_id() != which);
                self.pad = InputState::neutral();
            }

            Event::ControllerButtonDown { button, .. } => {
                if let Some(b) = self.pad_keys.get(&button) {
                    self.pad.press(b);
                }
            }

            Event::ControllerButtonUp { button, .. } => {
                if let Some(b) = self.pad_keys.get(&button) {
                    self.pad.release(b);
                }
            }

            Event::ControllerAxisMotion { axis, value, .. } => {
                let axis = match axis {
                    PadAxis::LeftX => Axis::LeftX,
                    PadAxis::LeftY => Axis::LeftY,
                    PadAxis::RightX => Axis::RightX,
                    PadAxis::RightY => Axis::RightY,
                    _ => return,
                };
                self.pad.set_axis(axis, value);
            }

            _ => {}
        }
    }
}

/// Merge keyboard and pad state, with the left stick doubling as d-pad.
fn combine(keyboard: &InputState, pad: &InputState, quit: bool) -> InputState {
    let mut state = *pad;
    for button in JoypadButton::ALL {
        if keyboard.is_pressed(button) {
            state.press(button);
        }
    }
    let (x, y) = (pad.axis(Axis::LeftX), pad.axis(Axis::LeftY));
    if x <= -STICK_THRESHOLD {
        state.press(JoypadButton::Left);
    } else if x >= STICK_THRESHOLD {
        state.press(JoypadButton::Right);
    }
    if y <= -STICK_THRESHOLD {
        state.press(JoypadButton::Up);
    } else if y >= STICK_THRESHOLD {
        state.press(JoypadButton::Down);
    }
    state.quit = quit;
    state
}

impl InputDriver for SdlInput {
    fn poll(&mut self) -> Result<InputState, DriverError> {
        sdl::with_events(|events| {
            for event in events.poll_iter() {
                self.handle(event);
            }
        })?;
        Ok(combine(&self.keyboard, &self.pad, self.quit))
    }

    fn shutdown(&mut self) -> Result<(), DriverError> {
        self.open.clear();
        self.lease.release();
        Ok(())
    }
}

fn create(params: &DriverParams<'_>) -> Result<Box<dyn InputDriver>, DriverError> {
    Ok(Box::new(SdlInput::new(params)?))
}

inventory::submit! {
    DriverSpec::input("sdl", "SDL2 keyboard and game controllers", create)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_map_covers_handheld_buttons() {
        let km = default_key_map();
        assert_eq!(km.get(&Scancode::Z), Some(JoypadButton::B));
        assert_eq!(km.get(&Scancode::X), Some(JoypadButton::A));
        assert_eq!(km.get(&Scancode::Up), Some(JoypadButton::Up));
        assert_eq!(km.get(&Scancode::Escape), None);
    }

    #[test]
    fn stick_presses_dpad_past_threshold() {
        let mut pad = InputState::neutral();
        pad.set_axis(Axis::LeftX, -20_000);
        pad.set_axis(Axis::LeftY, 5_000);
        let state = combine(&InputState::neutral(), &pad, false);
        assert!(state.is_pressed(JoypadButton::Left));
        assert!(!state.is_pressed(JoypadButton::Down));
        assert_eq!(state.axis(Axis::LeftX), -20_000);
    }

    #[test]
    fn keyboard_and_pad_merge() {
        let mut keyboard = InputState::neutral();
        keyboard.press(JoypadButton::A);
        let mut pad = InputState::neutral();
        pad.press(JoypadButton::Start);
        let state = combine(&keyboard, &pad, true);
        assert!(state.is_pressed(JoypadButton::A));
        assert!(state.is_pressed(JoypadButton::Start));
        assert!(state.quit);
    }
}
