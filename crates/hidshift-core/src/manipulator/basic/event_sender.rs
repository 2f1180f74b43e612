//! Helpers that turn `to` definitions into output entries.
//!
//! Every posted entry is marked `Manipulated` and carries the triggering
//! entry's device, origin and original event.

use crate::event::queue::EventQueue;
use crate::event::{EntryState, Event, EventOrigin, EventTimeStamp, EventType};
use crate::types::{DeviceId, ModifierFlag, TimeStamp};

use super::to_event::ToEventDefinition;

/// Where and when posted entries are stamped.
#[derive(Debug, Clone)]
pub(super) struct PostContext {
    pub device_id: DeviceId,
    pub time_stamp: TimeStamp,
    pub original_event: Event,
    pub event_origin: EventOrigin,
}

impl PostContext {
    pub fn at(&self, time_stamp: TimeStamp) -> PostContext {
        PostContext {
            time_stamp,
            ..self.clone()
        }
    }

    fn post(&self, output: &mut EventQueue, event: Event, event_type: EventType) {
        output.emplace_back_entry(
            self.device_id,
            EventTimeStamp::new(self.time_stamp),
            event,
            event_type,
            self.original_event.clone(),
            self.event_origin,
            EntryState::Manipulated,
        );
    }
}

pub(super) fn post_modifier_key_downs(output: &mut EventQueue, ctx: &PostContext, flags: &[ModifierFlag]) {
    for flag in flags {
        ctx.post(output, Event::KeyCode(flag.key_code()), EventType::KeyDown);
    }
}

pub(super) fn post_modifier_key_ups(output: &mut EventQueue, ctx: &PostContext, flags: &[ModifierFlag]) {
    for flag in flags.iter().rev() {
        ctx.post(output, Event::KeyCode(flag.key_code()), EventType::KeyUp);
    }
}

/// Presses the definition's modifiers and then its event.
///
/// Events without press/release are posted once as `Single`.
pub(super) fn post_press(output: &mut EventQueue, ctx: &PostContext, to: &ToEventDefinition) {
    post_modifier_key_downs(output, ctx, &to.modifiers);
    ctx.post(output, to.make_event(), EventType::KeyDown);
}

/// Releases the event and then its modifiers in reverse order.
pub(super) fn post_release(output: &mut EventQueue, ctx: &PostContext, to: &ToEventDefinition) {
    let event = to.make_event();
    if event.has_press_release() {
        ctx.post(output, event, EventType::KeyUp);
    }
    post_modifier_key_ups(output, ctx, &to.modifiers);
}

pub(super) fn post_tap(output: &mut EventQueue, ctx: &PostContext, to: &ToEventDefinition) {
    post_press(output, ctx, to);
    post_release(output, ctx, to);
}

pub(super) fn post_taps(output: &mut EventQueue, ctx: &PostContext, list: &[ToEventDefinition]) {
    for to in list {
        post_tap(output, ctx, to);
    }
}

/// Taps all but the last definition and presses the last one.
///
/// Returns the pressed definition so the caller can release it later.
pub(super) fn post_taps_holding_last(
    output: &mut EventQueue,
    ctx: &PostContext,
    list: &[ToEventDefinition],
) -> Option<ToEventDefinition> {
    let (last, rest) = list.split_last()?;
    post_taps(output, ctx, rest);
    post_press(output, ctx, last);
    Some(last.clone())
}
