//! HID gamepad report - the single piece of shared state
//!
//! # Wire format
//!
//! ```text
//! offset  size  field
//! 0       1     report id (always 1)
//! 1       2     x        little-endian, raw axis value
//! 3       2     y        little-endian, raw axis value
//! 5       2     buttons  little-endian, bit N = button N pressed
//! ```
//!
//! Every write to the gadget is exactly these 7 bytes.
//!
//! # Pipeline
//!
//! ```text
//! EventSource ──► ReportAggregator ──► ReportPublisher ──► /dev/hidg0
//!  (x2)           (watch sender)       (watch receiver)
//! ```

pub mod aggregator;
pub mod descriptor;
pub mod publisher;

pub use aggregator::{ReportAggregator, ReportUpdate};
pub use descriptor::REPORT_DESCRIPTOR;
pub use publisher::{run_publisher_loop, PublishError, ReportPublisher};

use crate::controller::input_event::{
    ABS_X, ABS_Y, BTN_EAST, BTN_NORTH, BTN_SELECT, BTN_SOUTH, BTN_START, BTN_THUMBL,
    BTN_THUMBR, BTN_WEST,
};

pub const REPORT_ID: u8 = 1;
pub const REPORT_LEN: usize = 7;

/// Bit positions in the buttons field.
///
/// The layout is the standard gamepad block indexed by `code - BTN_SOUTH`. Only eight of
/// these are wired on the joy bonnet (see [`Button::from_code`]); the rest stay zero but
/// keep their positions since the HID consumer reads the layout as declared.
/// Hosts see the same button numbers as with the joy-bonnet C bridge (north 3, select 10,
/// thumbs 13/14), not a dense 0..7 packing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    South = 0,
    East = 1,
    C = 2,
    North = 3,
    West = 4,
    Z = 5,
    TriggerLeft = 6,
    TriggerRight = 7,
    TriggerLeft2 = 8,
    TriggerRight2 = 9,
    Select = 10,
    Start = 11,
    Mode = 12,
    ThumbLeft = 13,
    ThumbRight = 14,
}

impl Button {
    pub const ALL: [Button; 15] = [
        Button::South,
        Button::East,
        Button::C,
        Button::North,
        Button::West,
        Button::Z,
        Button::TriggerLeft,
        Button::TriggerRight,
        Button::TriggerLeft2,
        Button::TriggerRight2,
        Button::Select,
        Button::Start,
        Button::Mode,
        Button::ThumbLeft,
        Button::ThumbRight,
    ];

    pub const fn bit(self) -> u16 {
        self as u16
    }

    pub const fn mask(self) -> u16 {
        1 << self.bit()
    }

    /// Kernel key code for this position
    pub const fn code(self) -> u16 {
        BTN_SOUTH + self.bit()
    }

    /// Maps a key code to a button this hardware actually reports.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            BTN_SOUTH => Some(Button::South),
            BTN_EAST => Some(Button::East),
            BTN_NORTH => Some(Button::North),
            BTN_WEST => Some(Button::West),
            BTN_SELECT => Some(Button::Select),
            BTN_START => Some(Button::Start),
            BTN_THUMBL => Some(Button::ThumbLeft),
            BTN_THUMBR => Some(Button::ThumbRight),
            _ => None,
        }
    }
}

// Stick axes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            ABS_X => Some(Axis::X),
            ABS_Y => Some(Axis::Y),
            _ => None,
        }
    }
}

/// Report contents. The report id is constant and only appears in the encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GamepadReport {
    pub x: u16,
    pub y: u16,
    pub buttons: u16,
}

impl GamepadReport {
    pub fn is_pressed(&self, button: Button) -> bool {
        self.buttons & button.mask() != 0
    }

    pub fn set_button(&mut self, button: Button, pressed: bool) {
        if pressed {
            self.buttons |= button.mask();
        } else {
            self.buttons &= !button.mask();
        }
    }

    pub fn axis(&self, axis: Axis) -> u16 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }

    pub fn set_axis(&mut self, axis: Axis, value: u16) {
        match axis {
            Axis::X => self.x = value,
            Axis::Y => self.y = value,
        }
    }

    pub fn encode(&self) -> [u8; REPORT_LEN] {
        let x = self.x.to_le_bytes();
        let y = self.y.to_le_bytes();
        let buttons = self.buttons.to_le_bytes();
        [REPORT_ID, x[0], x[1], y[0], y[1], buttons[0], buttons[1]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_little_endian_fields() {
        let mut report = GamepadReport {
            x: 300,
            y: 65200,
            buttons: 0b0000_0000_1000_0001,
        };
        // 65200 = 0xFEB0
        assert_eq!(
            report.encode(),
            [0x01, 0x2C, 0x01, 0xB0, 0xFE, 0x81, 0x00]
        );

        report.y = 0xFE30;
        assert_eq!(
            report.encode(),
            [0x01, 0x2C, 0x01, 0x30, 0xFE, 0x81, 0x00]
        );
    }

    #[test]
    fn zeroed_report_carries_only_the_id() {
        assert_eq!(
            GamepadReport::default().encode(),
            [REPORT_ID, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn bit_positions_follow_key_code_order() {
        for button in Button::ALL {
            assert_eq!(button.code() - BTN_SOUTH, button.bit());
        }
        assert_eq!(Button::North.bit(), 3);
        assert_eq!(Button::Select.bit(), 10);
        assert_eq!(Button::ThumbRight.mask(), 0x4000);
    }

    #[test]
    fn only_wired_buttons_are_recognized() {
        let recognized: Vec<Button> = Button::ALL
            .iter()
            .copied()
            .filter(|button| Button::from_code(button.code()).is_some())
            .collect();
        assert_eq!(
            recognized,
            vec![
                Button::South,
                Button::East,
                Button::North,
                Button::West,
                Button::Select,
                Button::Start,
                Button::ThumbLeft,
                Button::ThumbRight,
            ]
        );
    }

    #[test]
    fn set_button_touches_a_single_bit() {
        let mut report = GamepadReport {
            buttons: Button::Start.mask(),
            ..Default::default()
        };
        report.set_button(Button::West, true);
        assert!(report.is_pressed(Button::West));
        assert!(report.is_pressed(Button::Start));

        report.set_button(Button::Start, false);
        assert_eq!(report.buttons, Button::West.mask());
    }
}
