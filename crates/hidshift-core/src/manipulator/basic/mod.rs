//! The basic remapping manipulator.
//!
//! A basic manipulator turns one key (or a simultaneous combination of keys)
//! into other events.  Besides the plain `to` list it supports:
//!
//! - `to_after_key_up`: tapped when the `from` key is released.
//! - `to_if_alone`: tapped on release if nothing else was pressed meanwhile
//!   and the press was shorter than `to_if_alone_timeout`.
//! - `to_if_held_down`: posted once the key has been held for
//!   `to_if_held_down_threshold` without interruption.
//! - `to_delayed_action`: `to_if_invoked` fires after
//!   `to_delayed_action_delay`, unless another key goes down or the key is
//!   released first, in which case `to_if_canceled` fires instead.
//!
//! # Simultaneous combinations
//!
//! With several `from` events, the front key_down only fires the manipulator
//! when the other keys of the set also go down within
//! `simultaneous_threshold` of it.  The manipulator scans the entries behind
//! the front.  When the set is incomplete and the window is still open it
//! returns [`ManipulateResult::NeedsWaitUntilTimeStamp`] and the manager holds
//! the entry until more input arrives or the window closes.  The scan gives
//! up early when a participating key is released, when the key-down order
//! policy is violated, or (with `detect_key_down_uninterruptedly`) when an
//! unrelated key goes down in between.
//!
//! A strict `key_up_order` is also checked against the releases seen inside
//! the window: a release out of order passes the keys through, and while
//! fewer than all but one key have been released the entry keeps waiting
//! until the window closes.
//!
//! Once fired, the key_downs of the other participating keys are swallowed
//! through [`BasicManipulator::already_manipulated`] when they reach the
//! front.  `key_up_when` decides whether the first or the last release posts
//! the release side, and `key_up_order` gates the combination's own
//! `to_after_key_up`.
//!
//! Timer-driven outputs are deadlines in an internal [`Scheduler`]; the
//! manager fires them through [`BasicManipulator::invoke_timers`].
//!
//! Conditions gate key_down only.  A key_up whose key_down was manipulated
//! is always handled here, so press and release stay paired even when the
//! environment changed in between.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::condition::ConditionManager;
use crate::environment::Environment;
use crate::event::queue::EventQueue;
use crate::event::{Entry, Event, EventType};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::types::{DeviceId, ModifierFlag, TimeStamp};

use super::ManipulateResult;

mod event_sender;
pub mod from_event;
pub mod to_event;

use event_sender::{
    post_modifier_key_downs, post_modifier_key_ups, post_release, post_taps,
    post_taps_holding_last, PostContext,
};
use from_event::{EventDefinition, FromEventDefinition, KeyOrder, KeyUpWhen};
use to_event::ToEventDefinition;

// ── Parameters ────────────────────────────────────────────────────────────────

/// Timing parameters of basic manipulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicParameters {
    #[serde(default = "default_simultaneous_threshold")]
    pub simultaneous_threshold_milliseconds: u64,
    #[serde(default = "default_to_if_alone_timeout")]
    pub to_if_alone_timeout_milliseconds: u64,
    #[serde(default = "default_to_if_held_down_threshold")]
    pub to_if_held_down_threshold_milliseconds: u64,
    #[serde(default = "default_to_delayed_action_delay")]
    pub to_delayed_action_delay_milliseconds: u64,
}

fn default_simultaneous_threshold() -> u64 {
    50
}
fn default_to_if_alone_timeout() -> u64 {
    1000
}
fn default_to_if_held_down_threshold() -> u64 {
    500
}
fn default_to_delayed_action_delay() -> u64 {
    500
}

impl Default for BasicParameters {
    fn default() -> Self {
        Self {
            simultaneous_threshold_milliseconds: default_simultaneous_threshold(),
            to_if_alone_timeout_milliseconds: default_to_if_alone_timeout(),
            to_if_held_down_threshold_milliseconds: default_to_if_held_down_threshold(),
            to_delayed_action_delay_milliseconds: default_to_delayed_action_delay(),
        }
    }
}

impl BasicParameters {
    pub fn simultaneous_threshold(&self) -> Duration {
        Duration::from_millis(self.simultaneous_threshold_milliseconds)
    }

    pub fn to_if_alone_timeout(&self) -> Duration {
        Duration::from_millis(self.to_if_alone_timeout_milliseconds)
    }

    pub fn to_if_held_down_threshold(&self) -> Duration {
        Duration::from_millis(self.to_if_held_down_threshold_milliseconds)
    }

    pub fn to_delayed_action_delay(&self) -> Duration {
        Duration::from_millis(self.to_delayed_action_delay_milliseconds)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToDelayedAction {
    pub to_if_invoked: Vec<ToEventDefinition>,
    pub to_if_canceled: Vec<ToEventDefinition>,
}

/// Replaces the held `to` events when one of `other_keys` goes down while
/// the `from` key is held.  Each press triggers at most one entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToIfOtherKeyPressed {
    pub other_keys: Vec<EventDefinition>,
    pub to: Vec<ToEventDefinition>,
}

impl ToIfOtherKeyPressed {
    fn matches(&self, event: &Event) -> bool {
        !self.to.is_empty() && self.other_keys.iter().any(|key| key.matches(event))
    }
}

// ── Internal state ────────────────────────────────────────────────────────────

/// Identifies one physical key_down taken into a fired combination.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FromEventKey {
    device_id: DeviceId,
    event: Event,
    time_stamp: TimeStamp,
}

impl FromEventKey {
    fn of(entry: &Entry) -> Self {
        Self {
            device_id: entry.device_id(),
            event: entry.event().clone(),
            time_stamp: entry.time_stamp(),
        }
    }
}

/// A fired press that has not been fully released yet.
#[derive(Debug)]
struct ManipulatedOriginalEvent {
    id: u64,
    device_id: DeviceId,
    from_events: Vec<Event>,
    released: Vec<Event>,
    from_mandatory_modifiers: Vec<ModifierFlag>,
    modifiers_to_restore_on_key_up: Vec<ModifierFlag>,
    key_down_time_stamp: TimeStamp,
    context: PostContext,
    alone: bool,
    key_up_posted: bool,
    other_key_triggered: bool,
    held: Vec<ToEventDefinition>,
    held_down_timer: Option<TaskHandle>,
    delayed_action_timer: Option<TaskHandle>,
}

#[derive(Debug, Clone, Copy)]
enum BasicTimer {
    HeldDown(u64),
    DelayedAction(u64),
}

enum SimultaneousScan {
    Matched(Vec<FromEventKey>),
    Unmatched,
    Incomplete,
}

// ── Manipulator ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct BasicManipulator {
    from: FromEventDefinition,
    to: Vec<ToEventDefinition>,
    to_after_key_up: Vec<ToEventDefinition>,
    to_if_alone: Vec<ToEventDefinition>,
    to_if_held_down: Vec<ToEventDefinition>,
    to_delayed_action: Option<ToDelayedAction>,
    to_if_other_key_pressed: Vec<ToIfOtherKeyPressed>,
    condition_manager: ConditionManager,
    parameters: BasicParameters,

    manipulated_original_events: Vec<ManipulatedOriginalEvent>,
    pending_simultaneous_key_downs: Vec<FromEventKey>,
    timers: Scheduler<BasicTimer>,
    next_id: u64,
}

impl BasicManipulator {
    pub fn new(from: FromEventDefinition, to: Vec<ToEventDefinition>, parameters: BasicParameters) -> Self {
        Self {
            from,
            to,
            to_after_key_up: Vec::new(),
            to_if_alone: Vec::new(),
            to_if_held_down: Vec::new(),
            to_delayed_action: None,
            to_if_other_key_pressed: Vec::new(),
            condition_manager: ConditionManager::default(),
            parameters,
            manipulated_original_events: Vec::new(),
            pending_simultaneous_key_downs: Vec::new(),
            timers: Scheduler::new(),
            next_id: 0,
        }
    }

    pub fn with_to_after_key_up(mut self, to: Vec<ToEventDefinition>) -> Self {
        self.to_after_key_up = to;
        self
    }

    pub fn with_to_if_alone(mut self, to: Vec<ToEventDefinition>) -> Self {
        self.to_if_alone = to;
        self
    }

    pub fn with_to_if_held_down(mut self, to: Vec<ToEventDefinition>) -> Self {
        self.to_if_held_down = to;
        self
    }

    pub fn with_to_delayed_action(mut self, action: ToDelayedAction) -> Self {
        self.to_delayed_action = Some(action);
        self
    }

    pub fn with_to_if_other_key_pressed(mut self, entries: Vec<ToIfOtherKeyPressed>) -> Self {
        self.to_if_other_key_pressed = entries;
        self
    }

    pub fn with_conditions(mut self, condition_manager: ConditionManager) -> Self {
        self.condition_manager = condition_manager;
        self
    }

    pub fn parameters(&self) -> &BasicParameters {
        &self.parameters
    }

    pub fn manipulate(
        &mut self,
        front: &mut Entry,
        rest: &EventQueue,
        output: &mut EventQueue,
        environment: &Environment,
        now: TimeStamp,
    ) -> ManipulateResult {
        if !front.is_valid() {
            return ManipulateResult::Passed;
        }

        match front.event_type() {
            EventType::KeyDown => {
                self.handle_interruption(front, output);
                self.manipulate_key_down(front, rest, output, environment, now)
            }
            EventType::KeyUp => self.manipulate_key_up(front, output),
            EventType::Single => {
                if let Event::PointingMotion(motion) = front.event() {
                    if motion.has_wheel() {
                        for event in &mut self.manipulated_original_events {
                            event.alone = false;
                        }
                    }
                }
                ManipulateResult::Passed
            }
        }
    }

    /// True when `front` is a key_down already consumed by a fired combination.
    pub fn already_manipulated(&mut self, front: &Entry) -> bool {
        if !front.is_key_down() {
            return false;
        }
        let key = FromEventKey::of(front);
        match self.pending_simultaneous_key_downs.iter().position(|k| *k == key) {
            Some(index) => {
                self.pending_simultaneous_key_downs.remove(index);
                true
            }
            None => false,
        }
    }

    /// Fires held-down and delayed-action timers due at or before `until`.
    pub fn invoke_timers(&mut self, until: TimeStamp, output: &mut EventQueue) {
        while let Some((at, _, timer)) = self.timers.pop_due(until) {
            match timer {
                BasicTimer::HeldDown(id) => {
                    let Some(event) = self.manipulated_original_events.iter_mut().find(|e| e.id == id)
                    else {
                        continue;
                    };
                    event.held_down_timer = None;
                    event.alone = false;
                    let ctx = event.context.at(at);
                    debug!(device = %event.device_id, "to_if_held_down fired");
                    if let Some(last) = post_taps_holding_last(output, &ctx, &self.to_if_held_down) {
                        event.held.push(last);
                    }
                }
                BasicTimer::DelayedAction(id) => {
                    let Some(event) = self.manipulated_original_events.iter_mut().find(|e| e.id == id)
                    else {
                        continue;
                    };
                    event.delayed_action_timer = None;
                    if let Some(action) = &self.to_delayed_action {
                        debug!(device = %event.device_id, "to_delayed_action invoked");
                        post_taps(output, &event.context.at(at), &action.to_if_invoked);
                    }
                }
            }
        }
    }

    pub fn next_timer_deadline(&self) -> Option<TimeStamp> {
        self.timers.next_deadline()
    }

    pub fn device_removed(&mut self, device_id: DeviceId) {
        for event in &self.manipulated_original_events {
            if event.device_id != device_id {
                continue;
            }
            if let Some(handle) = event.held_down_timer {
                self.timers.cancel(handle);
            }
            if let Some(handle) = event.delayed_action_timer {
                self.timers.cancel(handle);
            }
        }
        self.manipulated_original_events
            .retain(|e| e.device_id != device_id);
        self.pending_simultaneous_key_downs
            .retain(|k| k.device_id != device_id);
    }

    pub fn active(&self) -> bool {
        !self.manipulated_original_events.is_empty()
            || !self.pending_simultaneous_key_downs.is_empty()
            || !self.timers.is_empty()
    }

    // ── key_down ────────────────────────────────────────────────────────────

    /// Another key going down ends "alone", cancels pending timers of every
    /// held press and may swap the held events for `to_if_other_key_pressed`.
    fn handle_interruption(&mut self, front: &Entry, output: &mut EventQueue) {
        for event in &mut self.manipulated_original_events {
            if event.device_id == front.device_id() && event.from_events.contains(front.event()) {
                continue;
            }
            event.alone = false;
            if !event.other_key_triggered && !event.key_up_posted {
                if let Some(entry) = self
                    .to_if_other_key_pressed
                    .iter()
                    .find(|entry| entry.matches(front.event()))
                {
                    replace_held_events(event, &entry.to, front.time_stamp(), output);
                }
            }
            if let Some(handle) = event.held_down_timer.take() {
                self.timers.cancel(handle);
            }
            if let Some(handle) = event.delayed_action_timer.take() {
                self.timers.cancel(handle);
                if let Some(action) = &self.to_delayed_action {
                    let ctx = event.context.at(front.time_stamp());
                    post_taps(output, &ctx, &action.to_if_canceled);
                }
            }
        }
    }

    fn manipulate_key_down(
        &mut self,
        front: &mut Entry,
        rest: &EventQueue,
        output: &mut EventQueue,
        environment: &Environment,
        now: TimeStamp,
    ) -> ManipulateResult {
        let Some(front_index) = self.from.position(front.event()) else {
            return ManipulateResult::Passed;
        };

        // A repeated key_down of a press we already own is swallowed.
        let repeated = self.manipulated_original_events.iter().any(|e| {
            e.device_id == front.device_id()
                && e.from_events.contains(front.event())
                && !e.released.contains(front.event())
        });
        if repeated {
            front.invalidate();
            return ManipulateResult::Manipulated;
        }

        let Some(from_mandatory_modifiers) = self.from.modifiers.test(output.modifier_flag_manager())
        else {
            return ManipulateResult::Passed;
        };
        if !self.condition_manager.is_fulfilled(front, environment) {
            return ManipulateResult::Passed;
        }

        match self.scan_simultaneous(front, front_index, rest, now) {
            SimultaneousScan::Matched(from_events) => {
                self.fire(front, from_events, from_mandatory_modifiers, output);
                ManipulateResult::Manipulated
            }
            SimultaneousScan::Unmatched => ManipulateResult::Passed,
            SimultaneousScan::Incomplete => {
                front.set_input_delay(self.parameters.simultaneous_threshold());
                ManipulateResult::NeedsWaitUntilTimeStamp
            }
        }
    }

    fn scan_simultaneous(
        &self,
        front: &Entry,
        front_index: usize,
        rest: &EventQueue,
        now: TimeStamp,
    ) -> SimultaneousScan {
        let count = self.from.event_definitions.len();
        let options = &self.from.simultaneous_options;

        let mut found_indices = vec![front_index];
        let mut found = vec![FromEventKey::of(front)];
        if count == 1 {
            return SimultaneousScan::Matched(found);
        }
        if !options.key_down_order.allows(0, front_index, count) {
            return SimultaneousScan::Unmatched;
        }

        let end = front.time_stamp() + self.parameters.simultaneous_threshold();
        let mut window_closed = now > end;
        let watch_key_up_order = options.key_up_order != KeyOrder::Insensitive;
        let mut released_indices: Vec<usize> = Vec::new();

        for entry in rest.entries() {
            let complete = found.len() == count;
            if complete && !watch_key_up_order {
                break;
            }
            if entry.time_stamp() > end {
                window_closed = true;
                break;
            }
            if entry.device_id() != front.device_id() || !entry.is_valid() {
                continue;
            }
            match entry.event_type() {
                EventType::KeyDown if complete => {}
                EventType::KeyDown => match self.from.position(entry.event()) {
                    Some(index) if !found_indices.contains(&index) => {
                        if !options.key_down_order.allows(found.len(), index, count) {
                            return SimultaneousScan::Unmatched;
                        }
                        found_indices.push(index);
                        found.push(FromEventKey::of(entry));
                    }
                    Some(_) => {}
                    None => {
                        if options.detect_key_down_uninterruptedly {
                            return SimultaneousScan::Unmatched;
                        }
                    }
                },
                EventType::KeyUp => {
                    let Some(index) = self.from.position(entry.event()) else {
                        continue;
                    };
                    if !found_indices.contains(&index) {
                        continue;
                    }
                    // Releasing a participant before the set is complete.
                    if !complete {
                        return SimultaneousScan::Unmatched;
                    }
                    if !released_indices.contains(&index) {
                        if !options.key_up_order.allows(released_indices.len(), index, count) {
                            return SimultaneousScan::Unmatched;
                        }
                        released_indices.push(index);
                    }
                }
                EventType::Single => {}
            }
        }

        if found.len() < count {
            return if window_closed {
                SimultaneousScan::Unmatched
            } else {
                SimultaneousScan::Incomplete
            };
        }
        // An ordered release can still break the combination until the
        // window closes.
        if watch_key_up_order && released_indices.len() + 1 < count && !window_closed {
            return SimultaneousScan::Incomplete;
        }
        SimultaneousScan::Matched(found)
    }

    fn fire(
        &mut self,
        front: &mut Entry,
        from_events: Vec<FromEventKey>,
        from_mandatory_modifiers: Vec<ModifierFlag>,
        output: &mut EventQueue,
    ) {
        front.invalidate();
        let time_stamp = front.time_stamp();
        let context = PostContext {
            device_id: front.device_id(),
            time_stamp,
            original_event: front.original_event().clone(),
            event_origin: front.event_origin(),
        };

        self.pending_simultaneous_key_downs
            .extend(from_events.iter().skip(1).cloned());

        let mut held = Vec::new();
        let mut modifiers_to_restore_on_key_up = Vec::new();
        if !self.to.is_empty() {
            post_modifier_key_ups(output, &context, &from_mandatory_modifiers);
            held.extend(post_taps_holding_last(output, &context, &self.to));
            if self.to.last().is_some_and(ToEventDefinition::is_modifier_key) {
                modifiers_to_restore_on_key_up = from_mandatory_modifiers.clone();
            } else {
                post_modifier_key_downs(output, &context, &from_mandatory_modifiers);
            }
        }

        let id = self.next_id;
        self.next_id += 1;

        let held_down_timer = (!self.to_if_held_down.is_empty()).then(|| {
            self.timers.schedule(
                time_stamp + self.parameters.to_if_held_down_threshold(),
                BasicTimer::HeldDown(id),
            )
        });
        let delayed_action_timer = self.to_delayed_action.is_some().then(|| {
            self.timers.schedule(
                time_stamp + self.parameters.to_delayed_action_delay(),
                BasicTimer::DelayedAction(id),
            )
        });

        debug!(
            device = %context.device_id,
            keys = from_events.len(),
            "basic manipulator fired"
        );

        self.manipulated_original_events.push(ManipulatedOriginalEvent {
            id,
            device_id: context.device_id,
            from_events: from_events.into_iter().map(|k| k.event).collect(),
            released: Vec::new(),
            from_mandatory_modifiers,
            modifiers_to_restore_on_key_up,
            key_down_time_stamp: time_stamp,
            context,
            alone: true,
            key_up_posted: false,
            other_key_triggered: false,
            held,
            held_down_timer,
            delayed_action_timer,
        });
    }

    // ── key_up ──────────────────────────────────────────────────────────────

    fn manipulate_key_up(&mut self, front: &mut Entry, output: &mut EventQueue) -> ManipulateResult {
        let Some(index) = self.manipulated_original_events.iter().position(|e| {
            e.device_id == front.device_id()
                && e.from_events.contains(front.event())
                && !e.released.contains(front.event())
        }) else {
            return ManipulateResult::Passed;
        };

        front.invalidate();
        let time_stamp = front.time_stamp();
        let key_up_when = self.from.simultaneous_options.key_up_when;
        let to_if_alone_timeout = self.parameters.to_if_alone_timeout();

        let event = &mut self.manipulated_original_events[index];
        event.released.push(front.event().clone());
        let all_released = event.released.len() == event.from_events.len();
        let post_key_up = !event.key_up_posted
            && match key_up_when {
                KeyUpWhen::Any => true,
                KeyUpWhen::All => all_released,
            };

        if post_key_up {
            event.key_up_posted = true;
            let ctx = event.context.at(time_stamp);

            for held in event.held.drain(..).rev() {
                post_release(output, &ctx, &held);
            }
            post_modifier_key_downs(output, &ctx, &event.modifiers_to_restore_on_key_up);
            event.modifiers_to_restore_on_key_up.clear();

            if let Some(handle) = event.held_down_timer.take() {
                self.timers.cancel(handle);
            }
            if let Some(handle) = event.delayed_action_timer.take() {
                self.timers.cancel(handle);
                if let Some(action) = &self.to_delayed_action {
                    post_taps(output, &ctx, &action.to_if_canceled);
                }
            }

            let quick = time_stamp.duration_since(event.key_down_time_stamp) < to_if_alone_timeout;
            if event.alone && quick && !self.to_if_alone.is_empty() {
                let held_modifiers: Vec<ModifierFlag> = event
                    .from_mandatory_modifiers
                    .iter()
                    .copied()
                    .filter(|flag| output.modifier_flag_manager().is_pressed(*flag))
                    .collect();
                post_modifier_key_ups(output, &ctx, &held_modifiers);
                post_taps(output, &ctx, &self.to_if_alone);
                post_modifier_key_downs(output, &ctx, &held_modifiers);
            }

            post_taps(output, &ctx, &self.to_after_key_up);
        }

        if all_released {
            let event = self.manipulated_original_events.remove(index);
            if self.key_up_order_satisfied(&event.released) {
                let ctx = event.context.at(time_stamp);
                post_taps(output, &ctx, &self.from.simultaneous_options.to_after_key_up);
            }
        }

        ManipulateResult::Manipulated
    }

    fn key_up_order_satisfied(&self, released: &[Event]) -> bool {
        let count = self.from.event_definitions.len();
        let order = self.from.simultaneous_options.key_up_order;
        released
            .iter()
            .enumerate()
            .all(|(position, event)| match self.from.position(event) {
                Some(index) => order.allows(position, index, count),
                None => false,
            })
    }
}

/// Releases what `event` holds and presses `to` in its place, keeping the
/// mandatory modifiers released only while a modifier is held.
fn replace_held_events(
    event: &mut ManipulatedOriginalEvent,
    to: &[ToEventDefinition],
    time_stamp: TimeStamp,
    output: &mut EventQueue,
) {
    let ctx = event.context.at(time_stamp);
    for held in event.held.drain(..).rev() {
        post_release(output, &ctx, &held);
    }
    if event.modifiers_to_restore_on_key_up.is_empty() {
        post_modifier_key_ups(output, &ctx, &event.from_mandatory_modifiers);
    }

    event.held.extend(post_taps_holding_last(output, &ctx, to));
    if to.last().is_some_and(ToEventDefinition::is_modifier_key) {
        event.modifiers_to_restore_on_key_up = event.from_mandatory_modifiers.clone();
    } else {
        post_modifier_key_downs(output, &ctx, &event.from_mandatory_modifiers);
        event.modifiers_to_restore_on_key_up.clear();
    }
    event.other_key_triggered = true;
    debug!(device = %event.device_id, "to_if_other_key_pressed fired");
}

#[cfg(test)]
mod tests {
    use super::from_event::{
        EventDefinition, FromModifiersDefinition, KeyOrder, ModifierDefinition,
        SimultaneousOptions,
    };
    use super::*;
    use crate::condition::{Condition, Polarity};
    use crate::environment::VariableValue;
    use crate::event::EventOrigin;
    use crate::manipulator::manager::ManipulatorManager;
    use crate::manipulator::Manipulator;
    use crate::types::KeyCode;

    const DEVICE: DeviceId = DeviceId(1);

    fn key_entry(ts: u64, key_code: KeyCode, event_type: EventType) -> Entry {
        Entry::new(
            DEVICE,
            TimeStamp(ts),
            Event::KeyCode(key_code),
            event_type,
            EventOrigin::Grabbed,
        )
    }

    fn down(ts: u64, key_code: KeyCode) -> Entry {
        key_entry(ts, key_code, EventType::KeyDown)
    }

    fn up(ts: u64, key_code: KeyCode) -> Entry {
        key_entry(ts, key_code, EventType::KeyUp)
    }

    /// Feeds `entries`, runs the manager at `now`, and returns the output keys.
    struct Harness {
        manager: ManipulatorManager,
        input: EventQueue,
        output: EventQueue,
        environment: Environment,
    }

    impl Harness {
        fn new(manipulator: BasicManipulator) -> Self {
            Self {
                manager: ManipulatorManager::new(vec![Manipulator::Basic(manipulator)]),
                input: EventQueue::new(),
                output: EventQueue::new(),
                environment: Environment::new(),
            }
        }

        fn feed(&mut self, entries: Vec<Entry>, now: u64) -> Vec<(KeyCode, EventType)> {
            for entry in entries {
                self.input.push_back_entry(entry);
            }
            self.advance(now)
        }

        fn advance(&mut self, now: u64) -> Vec<(KeyCode, EventType)> {
            self.manager.manipulate(
                &mut self.input,
                &mut self.output,
                &mut self.environment,
                TimeStamp(now),
            );
            self.output
                .take_entries()
                .into_iter()
                .filter_map(|e| match e.event() {
                    Event::KeyCode(k) => Some((*k, e.event_type())),
                    _ => None,
                })
                .collect()
        }
    }

    fn single(key_code: KeyCode) -> FromEventDefinition {
        FromEventDefinition::single(EventDefinition::KeyCode(key_code))
    }

    fn simultaneous(keys: &[KeyCode], options: SimultaneousOptions) -> FromEventDefinition {
        FromEventDefinition {
            event_definitions: keys.iter().map(|k| EventDefinition::KeyCode(*k)).collect(),
            modifiers: FromModifiersDefinition::default(),
            simultaneous_options: options,
        }
    }

    use EventType::{KeyDown as D, KeyUp as U};

    #[test]
    fn test_single_key_remap_presses_and_releases_target() {
        // Arrange
        let manipulator = BasicManipulator::new(
            single(KeyCode::CapsLock),
            vec![ToEventDefinition::key(KeyCode::Escape)],
            BasicParameters::default(),
        );
        let mut harness = Harness::new(manipulator);

        // Act
        let output = harness.feed(vec![down(1000, KeyCode::CapsLock), up(1100, KeyCode::CapsLock)], 1100);

        // Assert
        assert_eq!(output, vec![(KeyCode::Escape, D), (KeyCode::Escape, U)]);
    }

    #[test]
    fn test_unrelated_keys_pass_through_verbatim() {
        let manipulator = BasicManipulator::new(
            single(KeyCode::CapsLock),
            vec![ToEventDefinition::key(KeyCode::Escape)],
            BasicParameters::default(),
        );
        let mut harness = Harness::new(manipulator);

        let output = harness.feed(vec![down(1000, KeyCode::A), up(1010, KeyCode::A)], 1010);

        assert_eq!(output, vec![(KeyCode::A, D), (KeyCode::A, U)]);
    }

    #[test]
    fn test_mandatory_modifier_is_released_around_target() {
        // Arrange: shift+a -> b
        let from = single(KeyCode::A).with_modifiers(FromModifiersDefinition {
            mandatory: vec![ModifierDefinition::Shift],
            optional: vec![],
        });
        let manipulator = BasicManipulator::new(
            from,
            vec![ToEventDefinition::key(KeyCode::B)],
            BasicParameters::default(),
        );
        let mut harness = Harness::new(manipulator);

        // Act
        let output = harness.feed(
            vec![
                down(1000, KeyCode::LeftShift),
                down(1010, KeyCode::A),
                up(1020, KeyCode::A),
                up(1030, KeyCode::LeftShift),
            ],
            1030,
        );

        // Assert
        assert_eq!(
            output,
            vec![
                (KeyCode::LeftShift, D),
                (KeyCode::LeftShift, U),
                (KeyCode::B, D),
                (KeyCode::LeftShift, D),
                (KeyCode::B, U),
                (KeyCode::LeftShift, U),
            ]
        );
    }

    #[test]
    fn test_to_if_alone_fires_only_without_interruption() {
        // Arrange: left_control alone -> escape
        let build = || {
            BasicManipulator::new(
                single(KeyCode::LeftControl),
                vec![ToEventDefinition::key(KeyCode::LeftControl)],
                BasicParameters::default(),
            )
            .with_to_if_alone(vec![ToEventDefinition::key(KeyCode::Escape)])
        };

        // Act
        let alone = Harness::new(build()).feed(
            vec![down(1000, KeyCode::LeftControl), up(1100, KeyCode::LeftControl)],
            1100,
        );
        let chord = Harness::new(build()).feed(
            vec![
                down(1000, KeyCode::LeftControl),
                down(1050, KeyCode::C),
                up(1060, KeyCode::C),
                up(1100, KeyCode::LeftControl),
            ],
            1100,
        );

        // Assert
        assert!(alone.contains(&(KeyCode::Escape, D)));
        assert!(!chord.iter().any(|(k, _)| *k == KeyCode::Escape));
    }

    #[test]
    fn test_to_if_alone_respects_timeout() {
        let manipulator = BasicManipulator::new(
            single(KeyCode::Spacebar),
            vec![],
            BasicParameters::default(),
        )
        .with_to_if_alone(vec![ToEventDefinition::key(KeyCode::Spacebar)]);
        let mut harness = Harness::new(manipulator);

        let output = harness.feed(
            vec![down(1000, KeyCode::Spacebar), up(2500, KeyCode::Spacebar)],
            2500,
        );

        assert!(output.is_empty());
    }

    #[test]
    fn test_to_if_held_down_fires_after_threshold() {
        // Arrange: spacebar alone -> space, held -> left_shift
        let manipulator = BasicManipulator::new(single(KeyCode::Spacebar), vec![], BasicParameters::default())
            .with_to_if_alone(vec![ToEventDefinition::key(KeyCode::Spacebar)])
            .with_to_if_held_down(vec![ToEventDefinition::key(KeyCode::LeftShift)]);
        let mut harness = Harness::new(manipulator);

        // Act
        let at_press = harness.feed(vec![down(1000, KeyCode::Spacebar)], 1000);
        let after_threshold = harness.advance(1600);
        let at_release = harness.feed(vec![up(1700, KeyCode::Spacebar)], 1700);

        // Assert
        assert!(at_press.is_empty());
        assert_eq!(after_threshold, vec![(KeyCode::LeftShift, D)]);
        assert_eq!(at_release, vec![(KeyCode::LeftShift, U)]);
    }

    #[test]
    fn test_to_if_held_down_is_cancelled_by_quick_release() {
        let manipulator = BasicManipulator::new(single(KeyCode::Spacebar), vec![], BasicParameters::default())
            .with_to_if_alone(vec![ToEventDefinition::key(KeyCode::Spacebar)])
            .with_to_if_held_down(vec![ToEventDefinition::key(KeyCode::LeftShift)]);
        let mut harness = Harness::new(manipulator);

        let output = harness.feed(vec![down(1000, KeyCode::Spacebar), up(1100, KeyCode::Spacebar)], 1100);
        let later = harness.advance(2000);

        assert_eq!(output, vec![(KeyCode::Spacebar, D), (KeyCode::Spacebar, U)]);
        assert!(later.is_empty());
    }

    #[test]
    fn test_delayed_action_invoked_after_delay() {
        // Arrange
        let manipulator = BasicManipulator::new(single(KeyCode::Q), vec![], BasicParameters::default())
            .with_to_delayed_action(ToDelayedAction {
                to_if_invoked: vec![ToEventDefinition::key(KeyCode::F1)],
                to_if_canceled: vec![ToEventDefinition::key(KeyCode::F2)],
            });
        let mut harness = Harness::new(manipulator);

        // Act
        harness.feed(vec![down(1000, KeyCode::Q)], 1000);
        let before = harness.advance(1499);
        let after = harness.advance(1500);
        let release = harness.feed(vec![up(1600, KeyCode::Q)], 1600);

        // Assert
        assert!(before.is_empty());
        assert_eq!(after, vec![(KeyCode::F1, D), (KeyCode::F1, U)]);
        assert!(release.is_empty());
    }

    #[test]
    fn test_delayed_action_cancelled_by_other_key_down() {
        let manipulator = BasicManipulator::new(single(KeyCode::Q), vec![], BasicParameters::default())
            .with_to_delayed_action(ToDelayedAction {
                to_if_invoked: vec![ToEventDefinition::key(KeyCode::F1)],
                to_if_canceled: vec![ToEventDefinition::key(KeyCode::F2)],
            });
        let mut harness = Harness::new(manipulator);

        let output = harness.feed(vec![down(1000, KeyCode::Q), down(1100, KeyCode::W)], 1100);
        let later = harness.advance(2000);

        assert_eq!(
            output,
            vec![(KeyCode::F2, D), (KeyCode::F2, U), (KeyCode::W, D)]
        );
        assert!(later.is_empty());
    }

    #[test]
    fn test_delayed_action_cancelled_by_early_release() {
        let manipulator = BasicManipulator::new(single(KeyCode::Q), vec![], BasicParameters::default())
            .with_to_delayed_action(ToDelayedAction {
                to_if_invoked: vec![ToEventDefinition::key(KeyCode::F1)],
                to_if_canceled: vec![ToEventDefinition::key(KeyCode::F2)],
            });
        let mut harness = Harness::new(manipulator);

        let output = harness.feed(vec![down(1000, KeyCode::Q), up(1100, KeyCode::Q)], 1100);

        assert_eq!(output, vec![(KeyCode::F2, D), (KeyCode::F2, U)]);
    }

    #[test]
    fn test_simultaneous_keys_within_threshold_fire_combination() {
        // Arrange: j+k -> escape
        let manipulator = BasicManipulator::new(
            simultaneous(&[KeyCode::J, KeyCode::K], SimultaneousOptions::default()),
            vec![ToEventDefinition::key(KeyCode::Escape)],
            BasicParameters::default(),
        );
        let mut harness = Harness::new(manipulator);

        // Act
        let output = harness.feed(
            vec![
                down(1000, KeyCode::J),
                down(1020, KeyCode::K),
                up(1100, KeyCode::J),
                up(1110, KeyCode::K),
            ],
            1110,
        );

        // Assert
        assert_eq!(output, vec![(KeyCode::Escape, D), (KeyCode::Escape, U)]);
    }

    #[test]
    fn test_simultaneous_waits_then_passes_through_when_window_closes() {
        // Arrange
        let manipulator = BasicManipulator::new(
            simultaneous(&[KeyCode::J, KeyCode::K], SimultaneousOptions::default()),
            vec![ToEventDefinition::key(KeyCode::Escape)],
            BasicParameters::default(),
        );
        let mut harness = Harness::new(manipulator);

        // Act
        let waiting = harness.feed(vec![down(1000, KeyCode::J)], 1010);
        let resolved = harness.advance(1051);

        // Assert
        assert!(waiting.is_empty());
        assert_eq!(resolved, vec![(KeyCode::J, D)]);
    }

    #[test]
    fn test_simultaneous_cancelled_by_early_release() {
        let manipulator = BasicManipulator::new(
            simultaneous(&[KeyCode::J, KeyCode::K], SimultaneousOptions::default()),
            vec![ToEventDefinition::key(KeyCode::Escape)],
            BasicParameters::default(),
        );
        let mut harness = Harness::new(manipulator);

        let output = harness.feed(
            vec![down(1000, KeyCode::J), up(1010, KeyCode::J), down(1020, KeyCode::K)],
            1020,
        );

        assert_eq!(output[..2], [(KeyCode::J, D), (KeyCode::J, U)]);
    }

    #[test]
    fn test_strict_key_down_order_rejects_reversed_press() {
        let options = SimultaneousOptions {
            key_down_order: KeyOrder::Strict,
            ..Default::default()
        };
        let manipulator = BasicManipulator::new(
            simultaneous(&[KeyCode::J, KeyCode::K], options),
            vec![ToEventDefinition::key(KeyCode::Escape)],
            BasicParameters::default(),
        );
        let mut harness = Harness::new(manipulator);

        let output = harness.feed(vec![down(1000, KeyCode::K), down(1010, KeyCode::J)], 1100);

        assert!(!output.iter().any(|(k, _)| *k == KeyCode::Escape));
        assert_eq!(output[0], (KeyCode::K, D));
    }

    #[test]
    fn test_detect_key_down_uninterruptedly_cancels_on_unrelated_key() {
        let options = SimultaneousOptions {
            detect_key_down_uninterruptedly: true,
            ..Default::default()
        };
        let manipulator = BasicManipulator::new(
            simultaneous(&[KeyCode::J, KeyCode::K], options),
            vec![ToEventDefinition::key(KeyCode::Escape)],
            BasicParameters::default(),
        );
        let mut harness = Harness::new(manipulator);

        let output = harness.feed(
            vec![down(1000, KeyCode::J), down(1005, KeyCode::L), down(1010, KeyCode::K)],
            1100,
        );

        assert!(!output.iter().any(|(k, _)| *k == KeyCode::Escape));
    }

    #[test]
    fn test_key_up_when_all_waits_for_every_release() {
        // Arrange
        let options = SimultaneousOptions {
            key_up_when: KeyUpWhen::All,
            to_after_key_up: vec![ToEventDefinition::key(KeyCode::F5)],
            ..Default::default()
        };
        let manipulator = BasicManipulator::new(
            simultaneous(&[KeyCode::J, KeyCode::K], options),
            vec![ToEventDefinition::key(KeyCode::Escape)],
            BasicParameters::default(),
        );
        let mut harness = Harness::new(manipulator);
        harness.feed(vec![down(1000, KeyCode::J), down(1010, KeyCode::K)], 1010);

        // Act
        let first_release = harness.feed(vec![up(1100, KeyCode::J)], 1100);
        let second_release = harness.feed(vec![up(1200, KeyCode::K)], 1200);

        // Assert
        assert!(first_release.is_empty());
        assert_eq!(
            second_release,
            vec![(KeyCode::Escape, U), (KeyCode::F5, D), (KeyCode::F5, U)]
        );
    }

    fn escape_on(options: SimultaneousOptions) -> BasicManipulator {
        BasicManipulator::new(
            simultaneous(&[KeyCode::J, KeyCode::K], options),
            vec![ToEventDefinition::key(KeyCode::Escape)],
            BasicParameters::default(),
        )
    }

    fn key_up_order(order: KeyOrder) -> SimultaneousOptions {
        SimultaneousOptions {
            key_up_order: order,
            to_after_key_up: vec![ToEventDefinition::key(KeyCode::F5)],
            ..Default::default()
        }
    }

    #[test]
    fn test_strict_key_up_order_released_in_order_within_window_fires() {
        // Arrange
        let mut harness = Harness::new(escape_on(key_up_order(KeyOrder::Strict)));

        // Act
        let output = harness.feed(
            vec![
                down(1000, KeyCode::J),
                down(1010, KeyCode::K),
                up(1020, KeyCode::J),
                up(1030, KeyCode::K),
            ],
            1100,
        );

        // Assert
        assert_eq!(
            output,
            vec![
                (KeyCode::Escape, D),
                (KeyCode::Escape, U),
                (KeyCode::F5, D),
                (KeyCode::F5, U),
            ]
        );
    }

    #[test]
    fn test_strict_key_up_order_violated_within_window_passes_keys_through() {
        // Arrange
        let mut harness = Harness::new(escape_on(key_up_order(KeyOrder::Strict)));

        // Act
        let output = harness.feed(
            vec![
                down(1000, KeyCode::J),
                down(1010, KeyCode::K),
                up(1020, KeyCode::K),
                up(1030, KeyCode::J),
            ],
            1100,
        );

        // Assert
        assert_eq!(
            output,
            vec![(KeyCode::J, D), (KeyCode::K, D), (KeyCode::K, U), (KeyCode::J, U)]
        );
    }

    #[test]
    fn test_strict_inverse_key_up_order_waits_for_window_before_firing() {
        // Arrange
        let mut harness = Harness::new(escape_on(key_up_order(KeyOrder::StrictInverse)));

        // Act
        let both_down = harness.feed(vec![down(1000, KeyCode::J), down(1010, KeyCode::K)], 1010);
        let window_closed = harness.advance(1051);
        let released = harness.feed(vec![up(1100, KeyCode::J), up(1110, KeyCode::K)], 1110);

        // Assert
        assert!(both_down.is_empty());
        assert_eq!(window_closed, vec![(KeyCode::Escape, D)]);
        // j before k is not the inverse order, so the combination's
        // to_after_key_up stays silent.
        assert_eq!(released, vec![(KeyCode::Escape, U)]);
    }

    #[test]
    fn test_key_up_when_any_releases_on_first_key_up() {
        // Arrange
        let manipulator = escape_on(SimultaneousOptions::default())
            .with_to_after_key_up(vec![ToEventDefinition::key(KeyCode::F6)]);
        let mut harness = Harness::new(manipulator);
        let pressed = harness.feed(vec![down(1000, KeyCode::J), down(1010, KeyCode::K)], 1010);

        // Act
        let first_release = harness.feed(vec![up(1100, KeyCode::J)], 1100);
        let second_release = harness.feed(vec![up(1200, KeyCode::K)], 1200);

        // Assert
        assert_eq!(pressed, vec![(KeyCode::Escape, D)]);
        assert_eq!(
            first_release,
            vec![(KeyCode::Escape, U), (KeyCode::F6, D), (KeyCode::F6, U)]
        );
        assert!(second_release.is_empty());
        assert!(!harness.manager.active());
    }

    fn control_or_command() -> BasicManipulator {
        BasicManipulator::new(
            single(KeyCode::CapsLock),
            vec![ToEventDefinition::key(KeyCode::LeftControl)],
            BasicParameters::default(),
        )
        .with_to_if_other_key_pressed(vec![ToIfOtherKeyPressed {
            other_keys: vec![EventDefinition::KeyCode(KeyCode::H)],
            to: vec![ToEventDefinition::key(KeyCode::LeftCommand)],
        }])
    }

    #[test]
    fn test_to_if_other_key_pressed_replaces_held_event() {
        // Arrange
        let mut harness = Harness::new(control_or_command());

        // Act
        let output = harness.feed(
            vec![
                down(1000, KeyCode::CapsLock),
                down(1100, KeyCode::H),
                up(1150, KeyCode::H),
                up(1200, KeyCode::CapsLock),
            ],
            1200,
        );

        // Assert
        assert_eq!(
            output,
            vec![
                (KeyCode::LeftControl, D),
                (KeyCode::LeftControl, U),
                (KeyCode::LeftCommand, D),
                (KeyCode::H, D),
                (KeyCode::H, U),
                (KeyCode::LeftCommand, U),
            ]
        );
    }

    #[test]
    fn test_to_if_other_key_pressed_ignores_other_keys_and_fires_once() {
        let mut harness = Harness::new(control_or_command());

        let output = harness.feed(
            vec![
                down(1000, KeyCode::CapsLock),
                down(1050, KeyCode::J),
                up(1060, KeyCode::J),
                down(1100, KeyCode::H),
                up(1110, KeyCode::H),
                down(1120, KeyCode::H),
                up(1130, KeyCode::H),
                up(1200, KeyCode::CapsLock),
            ],
            1200,
        );

        assert_eq!(
            output,
            vec![
                (KeyCode::LeftControl, D),
                (KeyCode::J, D),
                (KeyCode::J, U),
                (KeyCode::LeftControl, U),
                (KeyCode::LeftCommand, D),
                (KeyCode::H, D),
                (KeyCode::H, U),
                (KeyCode::H, D),
                (KeyCode::H, U),
                (KeyCode::LeftCommand, U),
            ]
        );
    }

    #[test]
    fn test_conditions_gate_key_down_but_not_paired_key_up() {
        // Arrange
        let condition = Condition::Variable {
            polarity: Polarity::If,
            name: "enabled".to_string(),
            value: VariableValue::Integer(1),
        };
        let manipulator = BasicManipulator::new(
            single(KeyCode::A),
            vec![ToEventDefinition::key(KeyCode::B)],
            BasicParameters::default(),
        )
        .with_conditions(ConditionManager::new(vec![condition]));
        let mut harness = Harness::new(manipulator);

        // Act
        let disabled = harness.feed(vec![down(1000, KeyCode::A), up(1010, KeyCode::A)], 1010);
        harness.environment.set_variable("enabled", VariableValue::Integer(1));
        let press = harness.feed(vec![down(1100, KeyCode::A)], 1100);
        harness.environment.set_variable("enabled", VariableValue::Integer(0));
        let release = harness.feed(vec![up(1200, KeyCode::A)], 1200);

        // Assert
        assert_eq!(disabled, vec![(KeyCode::A, D), (KeyCode::A, U)]);
        assert_eq!(press, vec![(KeyCode::B, D)]);
        assert_eq!(release, vec![(KeyCode::B, U)]);
    }

    #[test]
    fn test_device_removed_drops_held_state_and_timers() {
        let mut manipulator = BasicManipulator::new(single(KeyCode::Spacebar), vec![], BasicParameters::default())
            .with_to_if_held_down(vec![ToEventDefinition::key(KeyCode::LeftShift)]);
        let input = EventQueue::new();
        let mut output = EventQueue::new();
        let env = Environment::new();
        let mut front = down(1000, KeyCode::Spacebar);

        let result = manipulator.manipulate(&mut front, &input, &mut output, &env, TimeStamp(1000));
        assert_eq!(result, ManipulateResult::Manipulated);
        assert!(manipulator.active());

        manipulator.device_removed(DEVICE);

        assert!(!manipulator.active());
        assert_eq!(manipulator.next_timer_deadline(), None);
    }
}
