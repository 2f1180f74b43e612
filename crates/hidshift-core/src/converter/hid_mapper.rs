//! Direct mapping of raw keyboard and mouse HID values to entries.

use serde::{Deserialize, Serialize};

use crate::event::{Entry, Event, EventOrigin, EventType, PointingMotion};
use crate::types::{ConsumerKeyCode, DeviceId, DpadDirection, KeyCode, PointingButton, TimeStamp};

pub mod usage_page {
    pub const GENERIC_DESKTOP: u16 = 0x01;
    pub const KEYBOARD_OR_KEYPAD: u16 = 0x07;
    pub const LEDS: u16 = 0x08;
    pub const BUTTON: u16 = 0x09;
    pub const CONSUMER: u16 = 0x0C;
    pub const APPLE_VENDOR_TOP_CASE: u16 = 0xFF;
}

pub mod usage {
    pub const GD_X: u16 = 0x30;
    pub const GD_Y: u16 = 0x31;
    pub const GD_Z: u16 = 0x32;
    pub const GD_RZ: u16 = 0x35;
    pub const GD_WHEEL: u16 = 0x38;
    pub const GD_HAT_SWITCH: u16 = 0x39;
    pub const GD_DPAD_UP: u16 = 0x90;
    pub const GD_DPAD_LEFT: u16 = 0x93;
    pub const CONSUMER_AC_PAN: u16 = 0x238;
    pub const LED_CAPS_LOCK: u16 = 0x02;
    pub const TOP_CASE_KEYBOARD_FN: u16 = 0x03;
    pub const KEYBOARD_FIRST: u16 = 0x04;
    pub const KEYBOARD_LAST: u16 = 0xE7;
}

/// One value change reported by a HID element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HidValue {
    pub time_stamp: TimeStamp,
    pub usage_page: u16,
    pub usage: u16,
    pub integer_value: i64,
    pub logical_min: i64,
    pub logical_max: i64,
}

impl HidValue {
    pub fn new(time_stamp: TimeStamp, usage_page: u16, usage: u16, integer_value: i64) -> Self {
        Self {
            time_stamp,
            usage_page,
            usage,
            integer_value,
            logical_min: 0,
            logical_max: 1,
        }
    }

    pub fn with_logical_range(mut self, logical_min: i64, logical_max: i64) -> Self {
        self.logical_min = logical_min;
        self.logical_max = logical_max;
        self
    }

    fn pressed_type(&self) -> EventType {
        if self.integer_value != 0 {
            EventType::KeyDown
        } else {
            EventType::KeyUp
        }
    }

    /// The switch event this value reports, if it is a switch.
    fn switch_event(&self) -> Option<Event> {
        match (self.usage_page, self.usage) {
            (usage_page::KEYBOARD_OR_KEYPAD, u)
                if (usage::KEYBOARD_FIRST..=usage::KEYBOARD_LAST).contains(&u) =>
            {
                Some(Event::KeyCode(KeyCode::from_usage(u)))
            }
            (usage_page::APPLE_VENDOR_TOP_CASE, usage::TOP_CASE_KEYBOARD_FN) => Some(Event::KeyCode(KeyCode::Fn)),
            (usage_page::CONSUMER, u) if u != usage::CONSUMER_AC_PAN => {
                Some(Event::ConsumerKeyCode(ConsumerKeyCode::from_usage(u)))
            }
            (usage_page::BUTTON, u) => Some(Event::PointingButton(PointingButton::from_usage(u))),
            (usage_page::GENERIC_DESKTOP, u) if (usage::GD_DPAD_UP..=usage::GD_DPAD_LEFT).contains(&u) => {
                Some(Event::DpadButton(DpadDirection::from_usage(u)))
            }
            _ => None,
        }
    }

    /// Adds this value to `motion` if it is a relative pointer axis.
    fn accumulate_motion(&self, motion: &mut PointingMotion) -> bool {
        let delta = self.integer_value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        let field = match (self.usage_page, self.usage) {
            (usage_page::GENERIC_DESKTOP, usage::GD_X) => &mut motion.x,
            (usage_page::GENERIC_DESKTOP, usage::GD_Y) => &mut motion.y,
            (usage_page::GENERIC_DESKTOP, usage::GD_WHEEL) => &mut motion.vertical_wheel,
            (usage_page::CONSUMER, usage::CONSUMER_AC_PAN) => &mut motion.horizontal_wheel,
            _ => return false,
        };
        *field = field.saturating_add(delta);
        true
    }
}

/// Same-instant ordering: modifier downs first, modifier ups last.
fn modifier_rank(entry: &Entry) -> u8 {
    match (entry.event().modifier_flag(), entry.event_type()) {
        (Some(_), EventType::KeyDown) => 0,
        (Some(_), EventType::KeyUp) => 2,
        _ => 1,
    }
}

/// Converts one report's values into entries for queue[0].
///
/// Pointer axes reported at the same instant are coalesced into a single
/// `PointingMotion` entry that follows the switch entries of that instant.
pub fn make_entries(device_id: DeviceId, values: &[HidValue], event_origin: EventOrigin) -> Vec<Entry> {
    let mut entries = Vec::new();
    let mut index = 0;

    while index < values.len() {
        let time_stamp = values[index].time_stamp;
        let group_end = values[index..]
            .iter()
            .position(|v| v.time_stamp != time_stamp)
            .map_or(values.len(), |offset| index + offset);

        let mut switches = Vec::new();
        let mut motion = PointingMotion::default();
        let mut has_motion = false;

        for value in &values[index..group_end] {
            if let Some(event) = value.switch_event() {
                switches.push(Entry::new(device_id, time_stamp, event, value.pressed_type(), event_origin));
            } else if value.accumulate_motion(&mut motion) {
                has_motion = true;
            } else if (value.usage_page, value.usage) == (usage_page::LEDS, usage::LED_CAPS_LOCK) {
                switches.push(Entry::new(
                    device_id,
                    time_stamp,
                    Event::CapsLockStateChanged(value.integer_value != 0),
                    EventType::Single,
                    event_origin,
                ));
            }
        }

        switches.sort_by_key(modifier_rank);
        entries.extend(switches);

        if has_motion && motion != PointingMotion::default() {
            entries.push(Entry::new(
                device_id,
                time_stamp,
                Event::PointingMotion(motion),
                EventType::Single,
                event_origin,
            ));
        }

        index = group_end;
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICE: DeviceId = DeviceId(3);

    fn summary(entries: &[Entry]) -> Vec<(Event, EventType)> {
        entries.iter().map(|e| (e.event().clone(), e.event_type())).collect()
    }

    #[test]
    fn test_keyboard_values_become_key_entries() {
        // Arrange
        let values = [
            HidValue::new(TimeStamp(10), usage_page::KEYBOARD_OR_KEYPAD, 0x04, 1),
            HidValue::new(TimeStamp(20), usage_page::KEYBOARD_OR_KEYPAD, 0x04, 0),
        ];

        // Act
        let entries = make_entries(DEVICE, &values, EventOrigin::Grabbed);

        // Assert
        assert_eq!(
            summary(&entries),
            vec![
                (Event::KeyCode(KeyCode::A), EventType::KeyDown),
                (Event::KeyCode(KeyCode::A), EventType::KeyUp),
            ]
        );
    }

    #[test]
    fn test_reserved_keyboard_usages_are_ignored() {
        let values = [HidValue::new(TimeStamp(10), usage_page::KEYBOARD_OR_KEYPAD, 0x01, 1)];

        assert!(make_entries(DEVICE, &values, EventOrigin::Grabbed).is_empty());
    }

    #[test]
    fn test_same_instant_modifier_down_precedes_key() {
        let values = [
            HidValue::new(TimeStamp(10), usage_page::KEYBOARD_OR_KEYPAD, 0x04, 1),
            HidValue::new(TimeStamp(10), usage_page::KEYBOARD_OR_KEYPAD, 0xE1, 1),
            HidValue::new(TimeStamp(20), usage_page::KEYBOARD_OR_KEYPAD, 0xE1, 0),
            HidValue::new(TimeStamp(20), usage_page::KEYBOARD_OR_KEYPAD, 0x04, 0),
        ];

        let entries = make_entries(DEVICE, &values, EventOrigin::Grabbed);

        assert_eq!(
            summary(&entries),
            vec![
                (Event::KeyCode(KeyCode::LeftShift), EventType::KeyDown),
                (Event::KeyCode(KeyCode::A), EventType::KeyDown),
                (Event::KeyCode(KeyCode::A), EventType::KeyUp),
                (Event::KeyCode(KeyCode::LeftShift), EventType::KeyUp),
            ]
        );
    }

    #[test]
    fn test_pointer_axes_are_coalesced_per_instant() {
        // Arrange
        let values = [
            HidValue::new(TimeStamp(10), usage_page::GENERIC_DESKTOP, usage::GD_X, 5),
            HidValue::new(TimeStamp(10), usage_page::GENERIC_DESKTOP, usage::GD_Y, -3),
            HidValue::new(TimeStamp(10), usage_page::CONSUMER, usage::CONSUMER_AC_PAN, 1),
            HidValue::new(TimeStamp(10), usage_page::BUTTON, 1, 1),
            HidValue::new(TimeStamp(11), usage_page::GENERIC_DESKTOP, usage::GD_WHEEL, -1),
        ];

        // Act
        let entries = make_entries(DEVICE, &values, EventOrigin::Grabbed);

        // Assert
        assert_eq!(
            summary(&entries),
            vec![
                (Event::PointingButton(PointingButton::Button1), EventType::KeyDown),
                (
                    Event::PointingMotion(PointingMotion {
                        x: 5,
                        y: -3,
                        vertical_wheel: 0,
                        horizontal_wheel: 1
                    }),
                    EventType::Single
                ),
                (
                    Event::PointingMotion(PointingMotion {
                        vertical_wheel: -1,
                        ..PointingMotion::default()
                    }),
                    EventType::Single
                ),
            ]
        );
    }

    #[test]
    fn test_caps_lock_led_and_fn_key() {
        let values = [
            HidValue::new(TimeStamp(10), usage_page::LEDS, usage::LED_CAPS_LOCK, 1),
            HidValue::new(TimeStamp(10), usage_page::APPLE_VENDOR_TOP_CASE, usage::TOP_CASE_KEYBOARD_FN, 1),
        ];

        let entries = make_entries(DEVICE, &values, EventOrigin::Observed);

        assert_eq!(
            summary(&entries),
            vec![
                (Event::KeyCode(KeyCode::Fn), EventType::KeyDown),
                (Event::CapsLockStateChanged(true), EventType::Single),
            ]
        );
    }
}
