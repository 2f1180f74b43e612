//! Turns pointer motion into wheel scrolling while the `from` modifiers are
//! held and the conditions match.
//!
//! Motion accumulates per axis; every [`SCROLL_THRESHOLD`] units of travel
//! become one wheel tick.  The first tick of a gesture locks the direction
//! to horizontal or vertical, and the other axis is dropped until the
//! gesture ends.  A gesture ends when the pointer rests for
//! [`GESTURE_IDLE_TIMEOUT`] or the modifiers/conditions stop matching.

use std::time::Duration;

use tracing::trace;

use crate::condition::ConditionManager;
use crate::environment::Environment;
use crate::event::queue::EventQueue;
use crate::event::{Entry, EntryState, Event, EventType, PointingMotion};
use crate::types::{ModifierFlag, TimeStamp};

use super::basic::from_event::FromModifiersDefinition;
use super::ManipulateResult;

/// Pointer travel per wheel tick.
pub const SCROLL_THRESHOLD: i32 = 128;

/// Rest time after which the next motion starts a new gesture.
pub const GESTURE_IDLE_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScrollDirection {
    Horizontal,
    Vertical,
}

/// Accumulates motion on one axis and emits whole wheel ticks.
#[derive(Debug, Clone, Copy, Default)]
struct AxisCounter {
    total: i32,
}

impl AxisCounter {
    /// The first motion of a gesture, or one reversing direction, always
    /// yields at least one tick.
    fn update(&mut self, delta: i32, initial: bool) -> i32 {
        if delta == 0 {
            return 0;
        }
        let reversed = self.total != 0 && self.total.signum() != delta.signum();
        if reversed {
            self.total = 0;
        }
        self.total = self.total.saturating_add(delta);
        if initial || reversed {
            self.total = self.total.signum() * self.total.abs().max(SCROLL_THRESHOLD);
        }

        let ticks = self.total / SCROLL_THRESHOLD;
        self.total -= ticks * SCROLL_THRESHOLD;
        ticks
    }

    fn reset(&mut self) {
        self.total = 0;
    }
}

#[derive(Debug, Default)]
pub struct MouseMotionToScrollManipulator {
    from_modifiers: FromModifiersDefinition,
    condition_manager: ConditionManager,

    direction: Option<ScrollDirection>,
    x: AxisCounter,
    y: AxisCounter,
    last_motion: Option<TimeStamp>,
}

impl MouseMotionToScrollManipulator {
    pub fn new(from_modifiers: FromModifiersDefinition) -> Self {
        Self {
            from_modifiers,
            ..Self::default()
        }
    }

    pub fn with_conditions(mut self, condition_manager: ConditionManager) -> Self {
        self.condition_manager = condition_manager;
        self
    }

    pub fn manipulate(
        &mut self,
        front: &mut Entry,
        output: &mut EventQueue,
        environment: &Environment,
    ) -> ManipulateResult {
        if !front.is_valid() {
            return ManipulateResult::Passed;
        }

        let mandatory = if self.condition_manager.is_fulfilled(front, environment) {
            self.from_modifiers.test(output.modifier_flag_manager())
        } else {
            None
        };
        let Some(mandatory) = mandatory else {
            self.reset();
            return ManipulateResult::Passed;
        };
        let Event::PointingMotion(motion) = front.event() else {
            return ManipulateResult::Passed;
        };
        let motion = *motion;

        let scroll = self.scroll(motion, front.time_stamp());
        front.invalidate();
        if scroll != PointingMotion::default() {
            trace!(device = %front.device_id(), ?scroll, "motion converted to scroll");
            self.post(front, scroll, &mandatory, output);
        }
        ManipulateResult::Manipulated
    }

    /// Wheel motion for `motion`, with the direction lock applied.
    fn scroll(&mut self, motion: PointingMotion, time_stamp: TimeStamp) -> PointingMotion {
        let initial = match self.last_motion {
            Some(last) => time_stamp.duration_since(last) > GESTURE_IDLE_TIMEOUT,
            None => true,
        };
        if initial {
            self.reset();
        }
        self.last_motion = Some(time_stamp);

        let (dx, dy) = match self.direction {
            Some(ScrollDirection::Horizontal) => (motion.x, 0),
            Some(ScrollDirection::Vertical) => (0, motion.y),
            None => (motion.x, motion.y),
        };
        let x = self.x.update(dx, initial);
        let y = self.y.update(dy, initial);

        if self.direction.is_none() && (x != 0 || y != 0) {
            self.direction = Some(if x.abs() > y.abs() {
                ScrollDirection::Horizontal
            } else {
                ScrollDirection::Vertical
            });
        }

        let mut scroll = PointingMotion {
            x: 0,
            y: 0,
            vertical_wheel: -y,
            horizontal_wheel: x,
        };
        match self.direction {
            Some(ScrollDirection::Horizontal) => scroll.vertical_wheel = 0,
            Some(ScrollDirection::Vertical) => scroll.horizontal_wheel = 0,
            None => {}
        }
        scroll
    }

    /// Lifts the mandatory modifiers around the wheel entry so applications
    /// see a plain scroll.
    fn post(&self, front: &Entry, scroll: PointingMotion, mandatory: &[ModifierFlag], output: &mut EventQueue) {
        let post = |output: &mut EventQueue, event: Event, event_type: EventType| {
            output.emplace_back_entry(
                front.device_id(),
                front.event_time_stamp(),
                event,
                event_type,
                front.original_event().clone(),
                front.event_origin(),
                EntryState::Manipulated,
            );
        };

        for flag in mandatory.iter().rev() {
            post(output, Event::KeyCode(flag.key_code()), EventType::KeyUp);
        }
        post(output, Event::PointingMotion(scroll), EventType::Single);
        for flag in mandatory {
            post(output, Event::KeyCode(flag.key_code()), EventType::KeyDown);
        }
    }

    fn reset(&mut self) {
        self.direction = None;
        self.x.reset();
        self.y.reset();
        self.last_motion = None;
    }
}
