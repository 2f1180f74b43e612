//! Runs one ordered list of manipulators over an input queue.

use tracing::debug;

use crate::environment::Environment;
use crate::event::queue::EventQueue;
use crate::event::Event;
use crate::types::{DeviceId, TimeStamp};

use super::{ManipulateResult, Manipulator};

#[derive(Debug, Default)]
pub struct ManipulatorManager {
    manipulators: Vec<Manipulator>,
}

impl ManipulatorManager {
    pub fn new(manipulators: Vec<Manipulator>) -> Self {
        Self { manipulators }
    }

    pub fn push_back_manipulator(&mut self, manipulator: Manipulator) {
        self.manipulators.push(manipulator);
    }

    pub fn len(&self) -> usize {
        self.manipulators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manipulators.is_empty()
    }

    /// Moves entries from `input` to `output` through the manipulators.
    ///
    /// Stops early when a manipulator needs to see later input; that entry
    /// stays at the front of `input`.
    pub fn manipulate(
        &mut self,
        input: &mut EventQueue,
        output: &mut EventQueue,
        environment: &mut Environment,
        now: TimeStamp,
    ) {
        while let Some(mut front) = input.pop_front() {
            // Timers older than this entry happened before it.
            self.invoke_timers(front.time_stamp(), output, environment);

            let applied_from = output.len();

            if front.is_valid() && self.manipulators.iter_mut().any(|m| m.already_manipulated(&front)) {
                front.invalidate();
            }

            match front.event() {
                Event::DeviceKeysAndPointingButtonsAreReleased => {
                    output
                        .modifier_flag_manager_mut()
                        .erase_all_active_modifier_flags_except_lock(front.device_id());
                }
                Event::DeviceUngrabbed => {
                    output
                        .modifier_flag_manager_mut()
                        .erase_all_active_modifier_flags_except_lock(front.device_id());
                    for manipulator in &mut self.manipulators {
                        manipulator.device_ungrabbed(front.device_id());
                    }
                }
                _ => {}
            }

            let mut needs_wait = false;
            for manipulator in &mut self.manipulators {
                match manipulator.manipulate(&mut front, input, output, environment, now) {
                    ManipulateResult::Passed => continue,
                    ManipulateResult::Manipulated => break,
                    ManipulateResult::NeedsWaitUntilTimeStamp => {
                        needs_wait = true;
                        break;
                    }
                }
            }

            if needs_wait {
                debug!(
                    device = %front.device_id(),
                    until = %front.event_time_stamp().deadline(),
                    "entry waiting for more input"
                );
                input.push_front_entry(front);
                apply_environment_events(output, applied_from, environment);
                break;
            }

            if front.is_valid() {
                output.push_back_entry(front);
            }
            apply_environment_events(output, applied_from, environment);
        }

        let until = match input.front() {
            Some(waiting) => waiting.time_stamp().min(now),
            None => now,
        };
        self.invoke_timers(until, output, environment);
    }

    pub fn invoke_timers(&mut self, until: TimeStamp, output: &mut EventQueue, environment: &mut Environment) {
        let applied_from = output.len();
        for manipulator in &mut self.manipulators {
            manipulator.invoke_timers(until, output);
        }
        apply_environment_events(output, applied_from, environment);
    }

    pub fn next_timer_deadline(&self) -> Option<TimeStamp> {
        self.manipulators
            .iter()
            .filter_map(Manipulator::next_timer_deadline)
            .min()
    }

    pub fn device_removed(&mut self, device_id: DeviceId) {
        for manipulator in &mut self.manipulators {
            manipulator.device_removed(device_id);
        }
    }

    pub fn active(&self) -> bool {
        self.manipulators.iter().any(Manipulator::active)
    }
}

fn apply_environment_events(output: &EventQueue, from: usize, environment: &mut Environment) {
    for entry in output.entries().iter().skip(from) {
        if environment.apply_event(entry.event()) {
            debug!(event = ?entry.event(), "environment updated");
        }
    }
}
