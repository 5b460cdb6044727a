//! Input events as delivered by the kernel input subsystem
//!
//! Both reading strategies produce the same [`InputEvent`]: the evdev strategy converts
//! from `evdev::InputEvent`, the record strategy decodes raw `struct input_event`
//! records with [`decode_record`].

use std::fmt;

// Event types (linux/input-event-codes.h)
pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_ABS: u16 = 0x03;

// Gamepad key codes, contiguous from BTN_SOUTH
pub const BTN_SOUTH: u16 = 0x130;
pub const BTN_EAST: u16 = 0x131;
pub const BTN_C: u16 = 0x132;
pub const BTN_NORTH: u16 = 0x133;
pub const BTN_WEST: u16 = 0x134;
pub const BTN_Z: u16 = 0x135;
pub const BTN_TL: u16 = 0x136;
pub const BTN_TR: u16 = 0x137;
pub const BTN_TL2: u16 = 0x138;
pub const BTN_TR2: u16 = 0x139;
pub const BTN_SELECT: u16 = 0x13a;
pub const BTN_START: u16 = 0x13b;
pub const BTN_MODE: u16 = 0x13c;
pub const BTN_THUMBL: u16 = 0x13d;
pub const BTN_THUMBR: u16 = 0x13e;

// Absolute axes
pub const ABS_X: u16 = 0x00;
pub const ABS_Y: u16 = 0x01;

/// Size of one kernel `struct input_event` on this target.
///
/// The record is a `struct timeval` followed by `u16 type`, `u16 code` and `i32 value`,
/// all in native byte order. 24 bytes on 64-bit targets, 16 on 32-bit ARM.
pub const EVENT_RECORD_SIZE: usize = std::mem::size_of::<libc::input_event>();

const PAYLOAD_OFFSET: usize = EVENT_RECORD_SIZE - 8;

// Coarse event class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Key,
    Absolute,
    Other(u16),
}

impl EventKind {
    pub fn from_raw(event_type: u16) -> Self {
        match event_type {
            EV_KEY => EventKind::Key,
            EV_ABS => EventKind::Absolute,
            other => EventKind::Other(other),
        }
    }

    pub fn raw(self) -> u16 {
        match self {
            EventKind::Key => EV_KEY,
            EventKind::Absolute => EV_ABS,
            EventKind::Other(other) => other,
        }
    }
}

/// One discrete `(type, code, value)` event from an input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub fn new(event_type: u16, code: u16, value: i32) -> Self {
        Self {
            kind: EventKind::from_raw(event_type),
            code,
            value,
        }
    }

    pub fn key(code: u16, value: i32) -> Self {
        Self::new(EV_KEY, code, value)
    }

    pub fn absolute(code: u16, value: i32) -> Self {
        Self::new(EV_ABS, code, value)
    }
}

impl fmt::Display for InputEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "type={:#04x} code={:#05x} value={}",
            self.kind.raw(),
            self.code,
            self.value
        )
    }
}

impl From<evdev::InputEvent> for InputEvent {
    fn from(event: evdev::InputEvent) -> Self {
        Self::new(event.event_type().0, event.code(), event.value())
    }
}

/// Decodes one raw kernel `struct input_event` record.
///
/// The timestamp is skipped; only type, code and value are kept.
pub fn decode_record(record: &[u8; EVENT_RECORD_SIZE]) -> InputEvent {
    let at = PAYLOAD_OFFSET;
    let event_type = u16::from_ne_bytes([record[at], record[at + 1]]);
    let code = u16::from_ne_bytes([record[at + 2], record[at + 3]]);
    let value = i32::from_ne_bytes([
        record[at + 4],
        record[at + 5],
        record[at + 6],
        record[at + 7],
    ]);
    InputEvent::new(event_type, code, value)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a raw record with a fixed, non-zero timestamp.
    pub(crate) fn encode_record(event: InputEvent) -> [u8; EVENT_RECORD_SIZE] {
        let mut record = [0xA5u8; EVENT_RECORD_SIZE];
        let at = PAYLOAD_OFFSET;
        record[at..at + 2].copy_from_slice(&event.kind.raw().to_ne_bytes());
        record[at + 2..at + 4].copy_from_slice(&event.code.to_ne_bytes());
        record[at + 4..at + 8].copy_from_slice(&event.value.to_ne_bytes());
        record
    }

    #[test]
    fn record_size_matches_timeval_layout() {
        let timeval = std::mem::size_of::<libc::timeval>();
        assert_eq!(EVENT_RECORD_SIZE, timeval + 8);
    }

    #[test]
    fn decode_ignores_timestamp_bytes() {
        let record = encode_record(InputEvent::absolute(ABS_Y, -32768));
        let event = decode_record(&record);
        assert_eq!(event.kind, EventKind::Absolute);
        assert_eq!(event.code, ABS_Y);
        assert_eq!(event.value, -32768);
    }

    #[test]
    fn unknown_types_are_kept_as_other() {
        let event = InputEvent::new(EV_SYN, 0, 0);
        assert_eq!(event.kind, EventKind::Other(EV_SYN));
        assert_eq!(EventKind::from_raw(0x04), EventKind::Other(0x04));
    }

    #[test]
    fn key_codes_agree_with_evdev() {
        assert_eq!(BTN_SOUTH, evdev::Key::BTN_SOUTH.code());
        assert_eq!(BTN_NORTH, evdev::Key::BTN_NORTH.code());
        assert_eq!(BTN_SELECT, evdev::Key::BTN_SELECT.code());
        assert_eq!(BTN_THUMBR, evdev::Key::BTN_THUMBR.code());
        assert_eq!(ABS_Y, evdev::AbsoluteAxisType::ABS_Y.0);
        assert_eq!(EV_KEY, evdev::EventType::KEY.0);
        assert_eq!(EV_ABS, evdev::EventType::ABSOLUTE.0);
    }

    #[test]
    fn converts_from_evdev_events() {
        let raw = evdev::InputEvent::new(evdev::EventType::KEY, BTN_START, 1);
        assert_eq!(InputEvent::from(raw), InputEvent::key(BTN_START, 1));
    }
}
