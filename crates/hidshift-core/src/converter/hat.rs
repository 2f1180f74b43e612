//! Hat switch to d-pad conversion.
//!
//! A hat reports one of eight directions (0 = up, clockwise) or a "centered"
//! value.  The converter keeps the last direction bitmask per device and
//! turns each new value into the key_ups for bits that cleared followed by
//! the key_downs for bits that became set.

use std::collections::HashMap;

use crate::event::{Entry, Event, EventOrigin, EventType};
use crate::types::{DeviceId, DpadDirection, TimeStamp};

const UP: u8 = 1 << 0;
const DOWN: u8 = 1 << 1;
const RIGHT: u8 = 1 << 2;
const LEFT: u8 = 1 << 3;

const DIRECTIONS: [(u8, DpadDirection); 4] = [
    (UP, DpadDirection::Up),
    (DOWN, DpadDirection::Down),
    (RIGHT, DpadDirection::Right),
    (LEFT, DpadDirection::Left),
];

fn mask_of(raw: i64) -> u8 {
    match raw {
        0 => UP,
        1 => UP | RIGHT,
        2 => RIGHT,
        3 => DOWN | RIGHT,
        4 => DOWN,
        5 => DOWN | LEFT,
        6 => LEFT,
        7 => UP | LEFT,
        _ => 0,
    }
}

#[derive(Debug, Default)]
pub struct HatSwitchConverter {
    masks: HashMap<DeviceId, u8>,
}

impl HatSwitchConverter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn convert(
        &mut self,
        device_id: DeviceId,
        raw_value: i64,
        time_stamp: TimeStamp,
        event_origin: EventOrigin,
    ) -> Vec<Entry> {
        let new_mask = mask_of(raw_value);
        let old_mask = self.masks.insert(device_id, new_mask).unwrap_or(0);

        let make = |direction: DpadDirection, event_type: EventType| {
            Entry::new(
                device_id,
                time_stamp,
                Event::DpadButton(direction),
                event_type,
                event_origin,
            )
        };

        let released = DIRECTIONS
            .iter()
            .filter(|(bit, _)| old_mask & bit != 0 && new_mask & bit == 0)
            .map(|(_, direction)| make(*direction, EventType::KeyUp));
        let pressed = DIRECTIONS
            .iter()
            .filter(|(bit, _)| old_mask & bit == 0 && new_mask & bit != 0)
            .map(|(_, direction)| make(*direction, EventType::KeyDown));

        released.chain(pressed).collect()
    }

    pub fn device_removed(&mut self, device_id: DeviceId) {
        self.masks.remove(&device_id);
    }
}
