//! Chains manipulator managers through intermediate queues.
//!
//! `queues[i]` is the input of `managers[i]` and `queues[i + 1]` its output,
//! so there is always one more queue than managers.  `queues[0]` receives
//! device input and the last queue is drained by the virtual device.

use crate::environment::Environment;
use crate::event::queue::EventQueue;
use crate::types::{DeviceId, TimeStamp};

use super::manager::ManipulatorManager;

#[derive(Debug)]
pub struct ManipulatorManagersConnector {
    managers: Vec<ManipulatorManager>,
    queues: Vec<EventQueue>,
}

impl Default for ManipulatorManagersConnector {
    fn default() -> Self {
        Self {
            managers: Vec::new(),
            queues: vec![EventQueue::new()],
        }
    }
}

impl ManipulatorManagersConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a manager fed by the current output queue.
    pub fn emplace_back_connection(&mut self, manager: ManipulatorManager) {
        self.managers.push(manager);
        self.queues.push(EventQueue::new());
    }

    pub fn managers_len(&self) -> usize {
        self.managers.len()
    }

    pub fn input_queue_mut(&mut self) -> &mut EventQueue {
        &mut self.queues[0]
    }

    pub fn output_queue(&self) -> &EventQueue {
        // `queues` is never empty.
        &self.queues[self.queues.len() - 1]
    }

    pub fn output_queue_mut(&mut self) -> &mut EventQueue {
        let last = self.queues.len() - 1;
        &mut self.queues[last]
    }

    pub fn queue(&self, index: usize) -> Option<&EventQueue> {
        self.queues.get(index)
    }

    pub fn queue_mut(&mut self, index: usize) -> Option<&mut EventQueue> {
        self.queues.get_mut(index)
    }

    /// Drives every manager once, in chain order.
    pub fn manipulate(&mut self, environment: &mut Environment, now: TimeStamp) {
        for (index, manager) in self.managers.iter_mut().enumerate() {
            let (inputs, outputs) = self.queues.split_at_mut(index + 1);
            manager.manipulate(&mut inputs[index], &mut outputs[0], environment, now);
        }
    }

    /// Earliest time stamp among the front entries of the input queues.
    ///
    /// Only fronts are considered; an older entry queued behind a front does
    /// not lower the result.
    pub fn min_input_event_time_stamp(&self) -> Option<TimeStamp> {
        let inputs = &self.queues[..self.queues.len() - 1];
        inputs
            .iter()
            .filter_map(|queue| queue.front().map(|entry| entry.time_stamp()))
            .min()
    }

    /// When `manipulate` next has work to do without new input.
    pub fn next_deadline(&self) -> Option<TimeStamp> {
        let timers = self
            .managers
            .iter()
            .filter_map(ManipulatorManager::next_timer_deadline);
        let waiting = self.queues[..self.queues.len() - 1]
            .iter()
            .filter_map(|queue| queue.front().map(|entry| entry.event_time_stamp().deadline()));
        timers.chain(waiting).min()
    }

    pub fn device_removed(&mut self, device_id: DeviceId) {
        for queue in &mut self.queues {
            queue.erase_device_entries(device_id);
            queue
                .modifier_flag_manager_mut()
                .erase_all_active_modifier_flags(device_id);
        }
        for manager in &mut self.managers {
            manager.device_removed(device_id);
        }
    }

    pub fn active(&self) -> bool {
        self.managers.iter().any(ManipulatorManager::active)
            || self.queues[..self.queues.len() - 1]
                .iter()
                .any(|queue| !queue.is_empty())
    }
}
