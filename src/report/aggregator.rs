//! Report aggregator - applies decoded input events to the shared report
//!
//! The report lives inside a `tokio::sync::watch` channel. The sender side is owned here
//! and is the only place the report is mutated; the channel's version counter acts as
//! the dirty flag. `send_if_modified` runs the mutation under the channel's write lock
//! and bumps the version only when the report actually changed, so a publisher that
//! sees the version move is guaranteed to also see the mutation behind it.

use super::{Axis, Button, GamepadReport};
use crate::controller::input_event::{EventKind, InputEvent};
use tokio::sync::watch;
use tracing::{debug, trace};

/// A single report mutation decoded from an input event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportUpdate {
    Button { button: Button, pressed: bool },
    Axis { axis: Axis, value: u16 },
}

impl ReportUpdate {
    /// Decode rule. Unrecognized types and codes yield `None`.
    pub fn decode(event: &InputEvent) -> Option<Self> {
        match event.kind {
            EventKind::Key => Button::from_code(event.code).map(|button| ReportUpdate::Button {
                button,
                pressed: event.value != 0,
            }),
            EventKind::Absolute => Axis::from_code(event.code).map(|axis| ReportUpdate::Axis {
                axis,
                // Raw hardware value, truncated to the 16-bit report field. No scaling.
                value: event.value as u16,
            }),
            EventKind::Other(_) => None,
        }
    }

    /// Applies the update; returns whether the report changed.
    pub fn apply_to(self, report: &mut GamepadReport) -> bool {
        match self {
            ReportUpdate::Button { button, pressed } => {
                if report.is_pressed(button) == pressed {
                    return false;
                }
                report.set_button(button, pressed);
            }
            ReportUpdate::Axis { axis, value } => {
                if report.axis(axis) == value {
                    return false;
                }
                report.set_axis(axis, value);
            }
        }
        true
    }
}

/// Owner of the shared report
#[derive(Debug)]
pub struct ReportAggregator {
    state: watch::Sender<GamepadReport>,
}

impl Default for ReportAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportAggregator {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GamepadReport::default());
        Self { state }
    }

    /// Receiver for the publisher. The current report counts as already seen.
    pub fn subscribe(&self) -> watch::Receiver<GamepadReport> {
        self.state.subscribe()
    }

    /// Copy of the current report
    pub fn snapshot(&self) -> GamepadReport {
        *self.state.borrow()
    }

    /// Applies one event. Returns true when the report changed and was marked dirty.
    pub fn apply(&self, event: &InputEvent) -> bool {
        let Some(update) = ReportUpdate::decode(event) else {
            trace!("Ignoring event {}", event);
            return false;
        };

        let changed = self
            .state
            .send_if_modified(|report| update.apply_to(report));
        if changed {
            debug!("Report updated by {:?}", update);
        } else {
            trace!("{:?} left the report unchanged", update);
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::input_event::{
        InputEvent, ABS_X, ABS_Y, BTN_C, BTN_EAST, BTN_MODE, BTN_NORTH, BTN_SELECT, BTN_SOUTH,
        BTN_TL, BTN_TR2, BTN_Z, EV_SYN,
    };

    #[test]
    fn button_events_set_and_clear_in_order() {
        let aggregator = ReportAggregator::new();
        let events = [
            InputEvent::key(BTN_SOUTH, 1),
            InputEvent::key(BTN_NORTH, 1),
            InputEvent::key(BTN_SELECT, 1),
            InputEvent::key(BTN_SOUTH, 0),
            InputEvent::key(BTN_EAST, 1),
        ];
        for event in &events {
            aggregator.apply(event);
        }

        let expected = Button::North.mask() | Button::Select.mask() | Button::East.mask();
        assert_eq!(aggregator.snapshot().buttons, expected);
    }

    #[test]
    fn non_zero_values_count_as_pressed() {
        let aggregator = ReportAggregator::new();
        // Autorepeat reports value 2.
        assert!(aggregator.apply(&InputEvent::key(BTN_EAST, 2)));
        assert!(aggregator.snapshot().is_pressed(Button::East));
        assert!(!aggregator.apply(&InputEvent::key(BTN_EAST, 1)));
    }

    #[test]
    fn unwired_and_unknown_keys_never_touch_buttons() {
        let aggregator = ReportAggregator::new();
        let mut rx = aggregator.subscribe();

        for code in [BTN_C, BTN_Z, BTN_TL, BTN_TR2, BTN_MODE, 0x110, 0x2c0] {
            assert!(!aggregator.apply(&InputEvent::key(code, 1)));
        }

        assert_eq!(aggregator.snapshot(), GamepadReport::default());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), GamepadReport::default());
    }

    #[test]
    fn axes_take_the_last_raw_value() {
        let aggregator = ReportAggregator::new();
        for value in [10, 900, 1023, 517] {
            aggregator.apply(&InputEvent::absolute(ABS_X, value));
        }
        aggregator.apply(&InputEvent::absolute(ABS_Y, 65200));

        let report = aggregator.snapshot();
        assert_eq!(report.x, 517);
        assert_eq!(report.y, 65200);
        assert_eq!(report.buttons, 0);
    }

    #[test]
    fn axis_values_are_not_clamped() {
        let aggregator = ReportAggregator::new();
        aggregator.apply(&InputEvent::absolute(ABS_X, -1));
        aggregator.apply(&InputEvent::absolute(ABS_Y, -32768));

        let report = aggregator.snapshot();
        assert_eq!(report.x, 0xFFFF);
        assert_eq!(report.y, 0x8000);
    }

    #[test]
    fn other_axes_and_types_are_ignored() {
        let aggregator = ReportAggregator::new();
        assert!(!aggregator.apply(&InputEvent::absolute(0x02, 77)));
        assert!(!aggregator.apply(&InputEvent::new(EV_SYN, 0, 0)));
        assert!(!aggregator.apply(&InputEvent::new(0x04, 4, 589825)));
        assert_eq!(aggregator.snapshot(), GamepadReport::default());
    }

    #[test]
    fn repeated_event_marks_dirty_once() {
        let aggregator = ReportAggregator::new();
        let mut rx = aggregator.subscribe();

        assert!(aggregator.apply(&InputEvent::key(BTN_SOUTH, 1)));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert!(!aggregator.apply(&InputEvent::key(BTN_SOUTH, 1)));
        assert!(!rx.has_changed().unwrap());

        aggregator.apply(&InputEvent::absolute(ABS_X, 300));
        rx.borrow_and_update();
        assert!(!aggregator.apply(&InputEvent::absolute(ABS_X, 300)));
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn decode_maps_codes_to_updates() {
        assert_eq!(
            ReportUpdate::decode(&InputEvent::key(BTN_SELECT, 0)),
            Some(ReportUpdate::Button {
                button: Button::Select,
                pressed: false
            })
        );
        assert_eq!(
            ReportUpdate::decode(&InputEvent::absolute(ABS_Y, 12)),
            Some(ReportUpdate::Axis {
                axis: Axis::Y,
                value: 12
            })
        );
        assert_eq!(ReportUpdate::decode(&InputEvent::key(BTN_MODE, 1)), None);
    }
}
