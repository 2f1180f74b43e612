//! Pipeline: the single consumer that owns every piece of mutable state.
//!
//! All device input, environment changes and timer deadlines are marshalled
//! into [`PipelineMessage`]s and handled one at a time by [`Pipeline::handle`].
//! Nothing here blocks or sleeps; time is always passed in explicitly, so the
//! same code is driven by [`super::runner::PipelineRunner`] in production and
//! by plain function calls in tests.
//!
//! # What happens to one report (for beginners)
//!
//! ```text
//! DeviceValues ─┬─ hat switch ──► HatSwitchConverter ──┐
//!               ├─ stick axes ──► GamePadStickConverter │ (later, on ticks)
//!               └─ everything else ─► make_entries ─────┤
//!                                                        ▼
//!                          GrabbableStateManager ◄── queue[0] ──► connector ──► output
//! ```
//!
//! The grabbable state manager watches what goes *into* the chain, because
//! grabbing decisions are about the physical device, not about what the
//! rules turned its input into.

use hidshift_core::converter::hid_mapper::{usage, usage_page};
use hidshift_core::converter::{
    make_entries, GamePadStickConverter, HatSwitchConverter, HidValue, StickAxis, StickParameters,
    StickTick,
};
use hidshift_core::{
    DeviceId, DeviceProperties, Entry, Environment, Event, EventOrigin, EventType, GrabbableState,
    GrabbableStateKind, GrabbableStateManager, ManipulatorManagersConnector, Scheduler, TimeStamp,
    UngrabbableReason,
};
use tracing::{debug, info};

/// Input to the pipeline.  Every producer (capture callbacks, the
/// environment observers, shutdown) talks to the pipeline through this type.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineMessage {
    /// A device was attached.  Its properties become visible to conditions.
    DeviceConnected(DeviceProperties),
    /// Values reported by one HID report of a device.
    DeviceValues {
        device_id: DeviceId,
        event_origin: EventOrigin,
        values: Vec<HidValue>,
    },
    DeviceRemoved {
        device_id: DeviceId,
    },
    /// The capture layer lost the device.  Manipulators release whatever
    /// they hold for it and the device is reported as not grabbable.
    DeviceError {
        device_id: DeviceId,
        time_stamp: TimeStamp,
    },
    /// An environment fact changed (frontmost application, input source,
    /// keyboard type or a variable).  It travels through the chain so that
    /// entries queued before it are still evaluated against the old value.
    EnvironmentChanged {
        time_stamp: TimeStamp,
        event: Event,
    },
    Shutdown,
}

/// Everything one call produced for the collaborators.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PipelineOutput {
    /// Entries for the virtual device, in order.
    pub entries: Vec<Entry>,
    pub grabbable_state_changes: Vec<GrabbableState>,
}

impl PipelineOutput {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.grabbable_state_changes.is_empty()
    }
}

pub struct Pipeline {
    environment: Environment,
    connector: ManipulatorManagersConnector,
    grabbable_state_manager: GrabbableStateManager,
    hat_switch_converter: HatSwitchConverter,
    stick_converter: GamePadStickConverter,
    stick_scheduler: Scheduler<StickTick>,
}

impl Pipeline {
    pub fn new(connector: ManipulatorManagersConnector, stick_parameters: StickParameters) -> Self {
        Self {
            environment: Environment::new(),
            connector,
            grabbable_state_manager: GrabbableStateManager::new(),
            hat_switch_converter: HatSwitchConverter::new(),
            stick_converter: GamePadStickConverter::new(stick_parameters),
            stick_scheduler: Scheduler::new(),
        }
    }

    /// Replaces the initial (empty) environment.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn connector(&self) -> &ManipulatorManagersConnector {
        &self.connector
    }

    pub fn grabbable_state_manager(&self) -> &GrabbableStateManager {
        &self.grabbable_state_manager
    }

    pub fn stick_converter(&self) -> &GamePadStickConverter {
        &self.stick_converter
    }

    /// Handles one message at `now` and runs the chain.
    pub fn handle(&mut self, message: PipelineMessage, now: TimeStamp) -> PipelineOutput {
        let mut grabbable_state_changes = Vec::new();

        match message {
            PipelineMessage::DeviceConnected(properties) => {
                info!(device = %properties.device_id, product = ?properties.product, "device connected");
                self.environment.insert_device(properties);
            }
            PipelineMessage::DeviceValues {
                device_id,
                event_origin,
                values,
            } => {
                // Motion due before this report must enter the chain first.
                let earliest = values.iter().map(|v| v.time_stamp).min().unwrap_or(now);
                self.fire_stick_ticks(earliest);

                let entries = self.convert_values(device_id, event_origin, &values, now);
                grabbable_state_changes.extend(self.push_input(entries));
            }
            PipelineMessage::DeviceRemoved { device_id } => self.device_removed(device_id),
            PipelineMessage::DeviceError {
                device_id,
                time_stamp,
            } => {
                info!(device = %device_id, "device error");
                self.fire_stick_ticks(time_stamp);
                self.grabbable_state_manager.forget_held_switches(device_id);
                grabbable_state_changes.extend(self.grabbable_state_manager.update_state(
                    device_id,
                    GrabbableStateKind::DeviceError,
                    UngrabbableReason::None,
                    time_stamp,
                ));
                self.connector.input_queue_mut().push_back_entry(Entry::new(
                    device_id,
                    time_stamp,
                    Event::DeviceUngrabbed,
                    EventType::Single,
                    EventOrigin::Observed,
                ));
            }
            PipelineMessage::EnvironmentChanged { time_stamp, event } => {
                self.fire_stick_ticks(time_stamp);
                self.connector.input_queue_mut().push_back_entry(Entry::new(
                    DeviceId::VIRTUAL,
                    time_stamp,
                    event,
                    EventType::Single,
                    EventOrigin::Observed,
                ));
            }
            PipelineMessage::Shutdown => {}
        }

        let mut output = self.advance(now);
        grabbable_state_changes.append(&mut output.grabbable_state_changes);
        output.grabbable_state_changes = grabbable_state_changes;
        output
    }

    /// Fires due stick ticks, runs the chain up to `now` and drains the
    /// final queue.
    pub fn advance(&mut self, now: TimeStamp) -> PipelineOutput {
        self.fire_stick_ticks(now);
        self.connector.manipulate(&mut self.environment, now);

        let entries: Vec<Entry> = self
            .connector
            .output_queue_mut()
            .take_entries()
            .into_iter()
            .filter(|entry| reaches_virtual_device(entry.event()))
            .collect();

        PipelineOutput {
            entries,
            grabbable_state_changes: Vec::new(),
        }
    }

    /// When [`Pipeline::advance`] next has work to do without new input.
    pub fn next_deadline(&self) -> Option<TimeStamp> {
        [self.connector.next_deadline(), self.stick_scheduler.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Forgets a device everywhere in one pass: queued entries, modifier
    /// flags, manipulator state, grabbable state, converters and its
    /// environment record.
    pub fn device_removed(&mut self, device_id: DeviceId) {
        info!(device = %device_id, "device removed");
        self.connector.device_removed(device_id);
        self.grabbable_state_manager.erase_device(device_id);
        self.hat_switch_converter.device_removed(device_id);
        self.stick_converter
            .device_removed(device_id, &mut self.stick_scheduler);
        self.environment.remove_device(device_id);
    }

    // ── Private helpers ───────────────────────────────────────────────────────

    /// Appends the motion of every stick tick due at or before `until` to
    /// queue[0], in deadline order.
    fn fire_stick_ticks(&mut self, until: TimeStamp) {
        while let Some((at, handle, tick)) = self.stick_scheduler.pop_due(until) {
            if let Some(entry) = self
                .stick_converter
                .tick(tick, handle, at, &mut self.stick_scheduler)
            {
                self.connector.input_queue_mut().push_back_entry(entry);
            }
        }
    }

    fn is_game_pad(&self, device_id: DeviceId) -> bool {
        self.environment
            .device(device_id)
            .is_some_and(|properties| properties.is_game_pad)
    }

    fn stick_axis(&self, usage: u16) -> Option<StickAxis> {
        let swap = self.stick_converter.parameters().swap_sticks;
        let axis = match (usage, swap) {
            (usage::GD_X, false) | (usage::GD_Z, true) => StickAxis::X,
            (usage::GD_Y, false) | (usage::GD_RZ, true) => StickAxis::Y,
            (usage::GD_Z, false) | (usage::GD_X, true) => StickAxis::HorizontalWheel,
            (usage::GD_RZ, false) | (usage::GD_Y, true) => StickAxis::VerticalWheel,
            _ => return None,
        };
        Some(axis)
    }

    /// Turns one report into entries, keeping the order of the values.
    fn convert_values(
        &mut self,
        device_id: DeviceId,
        event_origin: EventOrigin,
        values: &[HidValue],
        now: TimeStamp,
    ) -> Vec<Entry> {
        let game_pad = self.is_game_pad(device_id);
        let mut entries = Vec::new();
        let mut plain: Vec<HidValue> = Vec::new();

        for value in values {
            if value.usage_page == usage_page::GENERIC_DESKTOP && value.usage == usage::GD_HAT_SWITCH {
                entries.extend(make_entries(device_id, &plain, event_origin));
                plain.clear();
                entries.extend(self.hat_switch_converter.convert(
                    device_id,
                    value.integer_value,
                    value.time_stamp,
                    event_origin,
                ));
                continue;
            }

            if game_pad && value.usage_page == usage_page::GENERIC_DESKTOP {
                if let Some(axis) = self.stick_axis(value.usage) {
                    self.stick_converter.convert(
                        device_id,
                        axis,
                        value.integer_value,
                        value.logical_min,
                        value.logical_max,
                        now,
                        &mut self.stick_scheduler,
                    );
                    continue;
                }
            }

            plain.push(*value);
        }

        entries.extend(make_entries(device_id, &plain, event_origin));
        entries
    }

    /// Appends entries to queue[0] and lets the grabbable state manager see
    /// each one.
    fn push_input(&mut self, entries: Vec<Entry>) -> Vec<GrabbableState> {
        let mut changes = Vec::new();
        for entry in entries {
            if let Some(state) = self.grabbable_state_manager.update(&entry) {
                debug!(device = %state.device_id, state = ?state.state, reason = ?state.reason, "grabbable state changed");
                changes.push(state);
            }
            self.connector.input_queue_mut().push_back_entry(entry);
        }
        changes
    }
}

/// Events the virtual device cares about.  Environment updates and device
/// bookkeeping events end their journey at the last queue.
fn reaches_virtual_device(event: &Event) -> bool {
    !(event.is_environment_change()
        || matches!(
            event,
            Event::SetVariable { .. }
                | Event::DeviceKeysAndPointingButtonsAreReleased
                | Event::DeviceUngrabbed
        ))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hidshift_core::manipulator::basic::from_event::{EventDefinition, FromEventDefinition};
    use hidshift_core::manipulator::basic::to_event::ToEventDefinition;
    use hidshift_core::types::{DpadDirection, KeyCode, PointingButton};
    use hidshift_core::{
        BasicManipulator, BasicParameters, FrontmostApplication, ManipulatorManager, ModifierFlag,
        PointingMotion,
    };

    const KEYBOARD: DeviceId = DeviceId(1);
    const GAME_PAD: DeviceId = DeviceId(2);

    fn remap_pipeline(from: KeyCode, to: KeyCode) -> Pipeline {
        let mut connector = ManipulatorManagersConnector::new();
        connector.emplace_back_connection(ManipulatorManager::new(vec![BasicManipulator::new(
            FromEventDefinition::single(EventDefinition::KeyCode(from)),
            vec![ToEventDefinition::key(to)],
            BasicParameters::default(),
        )
        .into()]));
        Pipeline::new(connector, StickParameters::default())
    }

    fn keyboard_values(ts: u64, usage: u16, pressed: bool) -> PipelineMessage {
        PipelineMessage::DeviceValues {
            device_id: KEYBOARD,
            event_origin: EventOrigin::Grabbed,
            values: vec![HidValue::new(
                TimeStamp(ts),
                usage_page::KEYBOARD_OR_KEYPAD,
                usage,
                i64::from(pressed),
            )],
        }
    }

    fn keys(output: &PipelineOutput) -> Vec<(Event, EventType)> {
        output
            .entries
            .iter()
            .map(|e| (e.event().clone(), e.event_type()))
            .collect()
    }

    fn game_pad_connected() -> PipelineMessage {
        PipelineMessage::DeviceConnected(DeviceProperties {
            device_id: GAME_PAD,
            is_game_pad: true,
            ..DeviceProperties::default()
        })
    }

    #[test]
    fn test_keyboard_report_is_remapped() {
        // Arrange: caps_lock (0x39) -> escape
        let mut pipeline = remap_pipeline(KeyCode::CapsLock, KeyCode::Escape);

        // Act
        let down = pipeline.handle(keyboard_values(100, 0x39, true), TimeStamp(100));
        let up = pipeline.handle(keyboard_values(150, 0x39, false), TimeStamp(150));

        // Assert
        assert_eq!(keys(&down), vec![(Event::KeyCode(KeyCode::Escape), EventType::KeyDown)]);
        assert_eq!(keys(&up), vec![(Event::KeyCode(KeyCode::Escape), EventType::KeyUp)]);
    }

    #[test]
    fn test_grabbable_changes_follow_raw_input() {
        // Arrange
        let mut pipeline = remap_pipeline(KeyCode::CapsLock, KeyCode::Escape);

        // Act: left_shift is 0xE1.
        let pressed = pipeline.handle(keyboard_values(100, 0xE1, true), TimeStamp(100));
        let released = pipeline.handle(keyboard_values(120, 0xE1, false), TimeStamp(120));

        // Assert
        assert_eq!(pressed.grabbable_state_changes.len(), 1);
        assert_eq!(
            pressed.grabbable_state_changes[0].reason,
            UngrabbableReason::ModifierKeyPressed
        );
        assert_eq!(released.grabbable_state_changes.len(), 1);
        assert_eq!(
            released.grabbable_state_changes[0].state,
            GrabbableStateKind::Grabbable
        );
    }

    #[test]
    fn test_environment_change_is_applied_but_not_delivered() {
        let mut pipeline = remap_pipeline(KeyCode::A, KeyCode::B);
        let application = FrontmostApplication {
            bundle_identifier: Some("com.example.editor".to_string()),
            file_path: None,
        };

        let output = pipeline.handle(
            PipelineMessage::EnvironmentChanged {
                time_stamp: TimeStamp(10),
                event: Event::FrontmostApplicationChanged(application.clone()),
            },
            TimeStamp(10),
        );

        assert!(output.is_empty());
        assert_eq!(pipeline.environment().frontmost_application(), Some(&application));
    }

    #[test]
    fn test_hat_switch_becomes_dpad_buttons() {
        // Arrange
        let mut pipeline = remap_pipeline(KeyCode::A, KeyCode::B);
        pipeline.handle(game_pad_connected(), TimeStamp(0));
        let hat = |ts: u64, value: i64| PipelineMessage::DeviceValues {
            device_id: GAME_PAD,
            event_origin: EventOrigin::Grabbed,
            values: vec![HidValue::new(
                TimeStamp(ts),
                usage_page::GENERIC_DESKTOP,
                usage::GD_HAT_SWITCH,
                value,
            )],
        };

        // Act: up+right, then centered.
        let pressed = pipeline.handle(hat(10, 1), TimeStamp(10));
        let released = pipeline.handle(hat(20, 8), TimeStamp(20));

        // Assert
        assert_eq!(
            keys(&pressed),
            vec![
                (Event::DpadButton(DpadDirection::Up), EventType::KeyDown),
                (Event::DpadButton(DpadDirection::Right), EventType::KeyDown),
            ]
        );
        assert_eq!(
            keys(&released),
            vec![
                (Event::DpadButton(DpadDirection::Up), EventType::KeyUp),
                (Event::DpadButton(DpadDirection::Right), EventType::KeyUp),
            ]
        );
    }

    #[test]
    fn test_game_pad_stick_emits_motion_on_deadlines() {
        // Arrange
        let mut pipeline = remap_pipeline(KeyCode::A, KeyCode::B);
        pipeline.handle(game_pad_connected(), TimeStamp(0));
        let stick_x = |ts: u64, value: i64| PipelineMessage::DeviceValues {
            device_id: GAME_PAD,
            event_origin: EventOrigin::Grabbed,
            values: vec![
                HidValue::new(TimeStamp(ts), usage_page::GENERIC_DESKTOP, usage::GD_X, value)
                    .with_logical_range(-128, 127),
            ],
        };

        // Act
        let pushed = pipeline.handle(stick_x(100, 127), TimeStamp(100));
        let deadline = pipeline.next_deadline().expect("stick tick scheduled");
        let ticked = pipeline.advance(deadline);
        pipeline.handle(stick_x(deadline.0 + 1, 0), TimeStamp(deadline.0 + 1));

        // Assert
        assert!(pushed.entries.is_empty(), "stick values are not relative motion");
        assert_eq!(ticked.entries.len(), 1);
        match ticked.entries[0].event() {
            Event::PointingMotion(PointingMotion { x, y, .. }) => {
                assert!(*x > 0);
                assert_eq!(*y, 0);
            }
            other => panic!("expected pointing motion, got {other:?}"),
        }
        assert_eq!(pipeline.next_deadline(), None);
    }

    #[test]
    fn test_plain_mouse_axes_are_relative_motion() {
        let mut pipeline = remap_pipeline(KeyCode::A, KeyCode::B);

        let output = pipeline.handle(
            PipelineMessage::DeviceValues {
                device_id: KEYBOARD,
                event_origin: EventOrigin::Grabbed,
                values: vec![HidValue::new(TimeStamp(5), usage_page::GENERIC_DESKTOP, usage::GD_X, 7)],
            },
            TimeStamp(5),
        );

        assert_eq!(
            keys(&output),
            vec![(
                Event::PointingMotion(PointingMotion {
                    x: 7,
                    ..PointingMotion::default()
                }),
                EventType::Single
            )]
        );
    }

    #[test]
    fn test_device_error_reports_only_the_error_state() {
        // Arrange: caps_lock (0x39) is remapped and held, left_shift (0xE1) is held.
        let mut pipeline = remap_pipeline(KeyCode::CapsLock, KeyCode::Escape);
        pipeline.handle(keyboard_values(100, 0x39, true), TimeStamp(100));
        pipeline.handle(keyboard_values(110, 0xE1, true), TimeStamp(110));
        assert!(pipeline.connector().active());

        // Act
        let output = pipeline.handle(
            PipelineMessage::DeviceError {
                device_id: KEYBOARD,
                time_stamp: TimeStamp(200),
            },
            TimeStamp(200),
        );

        // Assert
        assert!(!pipeline.connector().active());
        assert!(output.entries.is_empty(), "device bookkeeping is not posted");
        let states: Vec<GrabbableStateKind> =
            output.grabbable_state_changes.iter().map(|s| s.state).collect();
        assert_eq!(states, vec![GrabbableStateKind::DeviceError]);
        assert!(!pipeline
            .connector()
            .output_queue()
            .modifier_flag_manager()
            .is_pressed(ModifierFlag::LeftShift));
    }

    #[test]
    fn test_due_stick_motion_precedes_later_report_of_same_device() {
        // Arrange: full right deflection at 100 schedules the first tick at 110.
        let mut pipeline = remap_pipeline(KeyCode::A, KeyCode::B);
        pipeline.handle(game_pad_connected(), TimeStamp(0));
        pipeline.handle(
            PipelineMessage::DeviceValues {
                device_id: GAME_PAD,
                event_origin: EventOrigin::Grabbed,
                values: vec![
                    HidValue::new(TimeStamp(100), usage_page::GENERIC_DESKTOP, usage::GD_X, 127)
                        .with_logical_range(-128, 127),
                ],
            },
            TimeStamp(100),
        );
        assert_eq!(pipeline.next_deadline(), Some(TimeStamp(110)));

        // Act: button 1 at 115, with no advance in between.
        let output = pipeline.handle(
            PipelineMessage::DeviceValues {
                device_id: GAME_PAD,
                event_origin: EventOrigin::Grabbed,
                values: vec![HidValue::new(TimeStamp(115), usage_page::BUTTON, 1, 1)],
            },
            TimeStamp(115),
        );

        // Assert
        let order: Vec<(u64, bool)> = output
            .entries
            .iter()
            .map(|e| (e.time_stamp().0, matches!(e.event(), Event::PointingMotion(_))))
            .collect();
        assert_eq!(order, vec![(110, true), (115, false)]);
        assert!(matches!(
            output.entries[1].event(),
            Event::PointingButton(PointingButton::Button1)
        ));
    }

    #[test]
    fn test_device_removed_cleans_every_component() {
        // Arrange
        let mut pipeline = remap_pipeline(KeyCode::CapsLock, KeyCode::Escape);
        pipeline.handle(game_pad_connected(), TimeStamp(0));
        pipeline.handle(
            PipelineMessage::DeviceValues {
                device_id: GAME_PAD,
                event_origin: EventOrigin::Grabbed,
                values: vec![
                    HidValue::new(TimeStamp(10), usage_page::GENERIC_DESKTOP, usage::GD_RZ, -128)
                        .with_logical_range(-128, 127),
                ],
            },
            TimeStamp(10),
        );
        pipeline.handle(
            PipelineMessage::DeviceValues {
                device_id: GAME_PAD,
                event_origin: EventOrigin::Grabbed,
                values: vec![HidValue::new(TimeStamp(11), usage_page::BUTTON, 1, 1)],
            },
            TimeStamp(11),
        );
        assert!(pipeline.next_deadline().is_some());

        // Act
        pipeline.handle(PipelineMessage::DeviceRemoved { device_id: GAME_PAD }, TimeStamp(20));

        // Assert
        assert_eq!(pipeline.next_deadline(), None);
        assert!(pipeline.environment().device(GAME_PAD).is_none());
        assert!(pipeline.grabbable_state_manager().get_grabbable_state(GAME_PAD).is_none());
        assert!(pipeline
            .stick_converter()
            .axis_state(GAME_PAD, StickAxis::VerticalWheel)
            .is_none());
    }
}
