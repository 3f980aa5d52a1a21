//! Joypad register (P1, 0xFF00).
//!
//! Button and d-pad state are active-low nibbles set by the host: a cleared
//! bit means the key is held.

pub const BUTTON_A: u8 = 0x01;
pub const BUTTON_B: u8 = 0x02;
pub const BUTTON_SELECT: u8 = 0x04;
pub const BUTTON_START: u8 = 0x08;

pub const DPAD_RIGHT: u8 = 0x01;
pub const DPAD_LEFT: u8 = 0x02;
pub const DPAD_UP: u8 = 0x04;
pub const DPAD_DOWN: u8 = 0x08;

const SELECT_DPAD: u8 = 0x10;
const SELECT_BUTTONS: u8 = 0x20;

#[derive(Debug, Clone)]
pub struct Input {
    select: u8,
    buttons: u8,
    dpad: u8,
}

impl Input {
    pub fn new() -> Self {
        Self {
            select: SELECT_DPAD | SELECT_BUTTONS,
            buttons: 0x0F,
            dpad: 0x0F,
        }
    }

    pub fn read(&self) -> u8 {
        0xC0 | self.select | self.lines()
    }

    /// Only the two select bits are writable.
    pub fn write(&mut self, value: u8) {
        self.select = value & (SELECT_DPAD | SELECT_BUTTONS);
    }

    /// Update the action buttons. Returns true when a currently selected
    /// line went from released to held, which raises the joypad interrupt.
    pub fn set_buttons(&mut self, state: u8) -> bool {
        let before = self.lines();
        self.buttons = state & 0x0F;
        before & !self.lines() != 0
    }

    /// Update the d-pad. Same edge semantics as [`Input::set_buttons`].
    pub fn set_dpad(&mut self, state: u8) -> bool {
        let before = self.lines();
        self.dpad = state & 0x0F;
        before & !self.lines() != 0
    }

    fn lines(&self) -> u8 {
        let mut lines = 0x0F;
        if self.select & SELECT_BUTTONS == 0 {
            lines &= self.buttons;
        }
        if self.select & SELECT_DPAD == 0 {
            lines &= self.dpad;
        }
        lines
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::new()
    }
}
