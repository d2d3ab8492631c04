//! Input snapshots and key mapping shared by all input drivers.

use std::collections::HashMap;
use std::hash::Hash;

/// RetroPad buttons, numbered by their libretro joypad ids.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoypadButton {
    B = libretro_sys::DEVICE_ID_JOYPAD_B as u8,
    Y = libretro_sys::DEVICE_ID_JOYPAD_Y as u8,
    Select = libretro_sys::DEVICE_ID_JOYPAD_SELECT as u8,
    Start = libretro_sys::DEVICE_ID_JOYPAD_START as u8,
    Up = libretro_sys::DEVICE_ID_JOYPAD_UP as u8,
    Down = libretro_sys::DEVICE_ID_JOYPAD_DOWN as u8,
    Left = libretro_sys::DEVICE_ID_JOYPAD_LEFT as u8,
    Right = libretro_sys::DEVICE_ID_JOYPAD_RIGHT as u8,
    A = libretro_sys::DEVICE_ID_JOYPAD_A as u8,
    X = libretro_sys::DEVICE_ID_JOYPAD_X as u8,
    L = libretro_sys::DEVICE_ID_JOYPAD_L as u8,
    R = libretro_sys::DEVICE_ID_JOYPAD_R as u8,
    L2 = libretro_sys::DEVICE_ID_JOYPAD_L2 as u8,
    R2 = libretro_sys::DEVICE_ID_JOYPAD_R2 as u8,
    L3 = libretro_sys::DEVICE_ID_JOYPAD_L3 as u8,
    R3 = libretro_sys::DEVICE_ID_JOYPAD_R3 as u8,
}

impl JoypadButton {
    pub const ALL: [JoypadButton; 16] = [
        Self::B,
        Self::Y,
        Self::Select,
        Self::Start,
        Self::Up,
        Self::Down,
        Self::Left,
        Self::Right,
        Self::A,
        Self::X,
        Self::L,
        Self::R,
        Self::L2,
        Self::R2,
        Self::L3,
        Self::R3,
    ];

    /// Look up a button by its libretro id.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|b| *b as u32 == id)
    }

    fn mask(self) -> u16 {
        1 << self as u8
    }
}

/// Analog axes of the RetroPad, indexed the way libretro indexes
/// `RETRO_DEVICE_ANALOG` (stick index, then X/Y id).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Axis {
    LeftX,
    LeftY,
    RightX,
    RightY,
}

impl Axis {
    /// Map a libretro analog (index, id) pair to an axis.
    pub fn from_analog(index: u32, id: u32) -> Option<Self> {
        match (index, id) {
            (0, 0) => Some(Self::LeftX),
            (0, 1) => Some(Self::LeftY),
            (1, 0) => Some(Self::RightX),
            (1, 1) => Some(Self::RightY),
            _ => None,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

/// Button and axis state for one poll tick.
///
/// The default value is the all-neutral state: nothing pressed, sticks
/// centred, no quit request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputState {
    buttons: u16,
    axes: [i16; 4],
    /// The user asked to leave (window closed, Escape pressed).
    pub quit: bool,
}

impl InputState {
    pub fn neutral() -> Self {
        Self::default()
    }

    pub fn set(&mut self, button: JoypadButton, pressed: bool) {
        if pressed {
            self.buttons |= button.mask();
        } else {
            self.buttons &= !button.mask();
        }
    }

    pub fn press(&mut self, button: JoypadButton) {
        self.set(button, true);
    }

    pub fn release(&mut self, button: JoypadButton) {
        self.set(button, false);
    }

    pub fn is_pressed(&self, button: JoypadButton) -> bool {
        self.buttons & button.mask() != 0
    }

    /// Raw button bitmask, bit `n` set when libretro joypad id `n` is held.
    pub fn button_bits(&self) -> u16 {
        self.buttons
    }

    pub fn set_axis(&mut self, axis: Axis, value: i16) {
        self.axes[axis.slot()] = value;
    }

    pub fn axis(&self, axis: Axis) -> i16 {
        self.axes[axis.slot()]
    }

    /// True when no button is held and every axis is centred.
    pub fn is_neutral(&self) -> bool {
        self.buttons == 0 && self.axes == [0; 4]
    }
}

/// Maps a driver's native key identifiers to RetroPad buttons.
///
/// Several keys may map to the same button.
#[derive(Clone, Debug)]
pub struct KeyMap<K> {
    map: HashMap<K, JoypadButton>,
}

impl<K: Eq + Hash> KeyMap<K> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    /// Bind a key to a button, replacing any previous binding of that key.
    pub fn bind(&mut self, key: K, button: JoypadButton) {
        self.map.insert(key, button);
    }

    /// Look up the button bound to a key.
    pub fn get(&self, key: &K) -> Option<JoypadButton> {
        self.map.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl<K: Eq + Hash> Default for KeyMap<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn button_ids_match_retropad_layout() {
        assert_eq!(JoypadButton::B as u32, 0);
        assert_eq!(JoypadButton::Up as u32, 4);
        assert_eq!(JoypadButton::A as u32, 8);
        assert_eq!(JoypadButton::R3 as u32, 15);
        assert_eq!(JoypadButton::from_id(7), Some(JoypadButton::Right));
        assert_eq!(JoypadButton::from_id(16), None);
    }

    #[test]
    fn press_and_release_track_bits() {
        let mut state = InputState::neutral();
        state.press(JoypadButton::A);
        state.press(JoypadButton::Left);
        assert!(state.is_pressed(JoypadButton::A));
        assert_eq!(state.button_bits(), (1 << 8) | (1 << 6));
        assert!(!state.is_neutral());

        state.release(JoypadButton::A);
        state.release(JoypadButton::Left);
        assert!(state.is_neutral());
    }

    #[test]
    fn axes_are_independent() {
        let mut state = InputState::neutral();
        state.set_axis(Axis::LeftX, -32768);
        state.set_axis(Axis::RightY, 1000);
        assert_eq!(state.axis(Axis::LeftX), -32768);
        assert_eq!(state.axis(Axis::LeftY), 0);
        assert_eq!(Axis::from_analog(1, 1), Some(Axis::RightY));
        assert_eq!(Axis::from_analog(2, 0), None);
    }

    #[test]
    fn key_map_allows_aliases() {
        let mut km = KeyMap::new();
        km.bind('z', JoypadButton::A);
        km.bind('j', JoypadButton::A);
        assert_eq!(km.get(&'z'), Some(JoypadButton::A));
        assert_eq!(km.get(&'j'), Some(JoypadButton::A));
        assert_eq!(km.get(&'q'), None);
        assert_eq!(km.len(), 2);
    }
}
