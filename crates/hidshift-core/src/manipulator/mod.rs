//! Manipulators and the chain that drives them.
//!
//! # How the chain fits together (for beginners)
//!
//! ```text
//!  queue[0] ──► ManipulatorManager ──► queue[1] ──► ManipulatorManager ──► queue[2]
//!   (input)       [manipulators]                     [manipulators]        (output)
//! ```
//!
//! A [`manager::ManipulatorManager`] owns an ordered list of
//! [`Manipulator`]s.  It pops entries off its input queue, offers each to its
//! manipulators in order, and pushes whatever survives to its output queue.
//! The [`connector::ManipulatorManagersConnector`] links several managers
//! through those queues.
//!
//! Each manipulator answers an entry with a [`ManipulateResult`]:
//!
//! - `Passed`: not interested; the next manipulator gets the entry.
//! - `Manipulated`: consumed (the entry was invalidated) or rewritten.
//! - `NeedsWaitUntilTimeStamp`: cannot decide yet; the manager stops and
//!   leaves the entry at the front of its input queue.

use crate::environment::Environment;
use crate::event::queue::EventQueue;
use crate::event::Entry;
use crate::types::{DeviceId, TimeStamp};

pub mod basic;
pub mod connector;
pub mod manager;
pub mod mouse_basic;
pub mod mouse_motion_to_scroll;

use basic::BasicManipulator;
use mouse_basic::MouseBasicManipulator;
use mouse_motion_to_scroll::MouseMotionToScrollManipulator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManipulateResult {
    Passed,
    Manipulated,
    NeedsWaitUntilTimeStamp,
}

/// Every manipulator kind a rule can build.
#[derive(Debug)]
pub enum Manipulator {
    Basic(BasicManipulator),
    MouseBasic(MouseBasicManipulator),
    MouseMotionToScroll(MouseMotionToScrollManipulator),
}

impl Manipulator {
    /// Offers `front` to this manipulator.  `rest` is the input queue behind
    /// the front entry, for look-ahead.
    pub fn manipulate(
        &mut self,
        front: &mut Entry,
        rest: &EventQueue,
        output: &mut EventQueue,
        environment: &Environment,
        now: TimeStamp,
    ) -> ManipulateResult {
        match self {
            Manipulator::Basic(m) => m.manipulate(front, rest, output, environment, now),
            Manipulator::MouseBasic(m) => m.manipulate(front, output, environment),
            Manipulator::MouseMotionToScroll(m) => m.manipulate(front, output, environment),
        }
    }

    pub fn already_manipulated(&mut self, front: &Entry) -> bool {
        match self {
            Manipulator::Basic(m) => m.already_manipulated(front),
            Manipulator::MouseBasic(_) | Manipulator::MouseMotionToScroll(_) => false,
        }
    }

    pub fn device_removed(&mut self, device_id: DeviceId) {
        if let Manipulator::Basic(m) = self {
            m.device_removed(device_id);
        }
    }

    pub fn device_ungrabbed(&mut self, device_id: DeviceId) {
        if let Manipulator::Basic(m) = self {
            m.device_removed(device_id);
        }
    }

    /// True while the manipulator holds state that needs more input or time.
    pub fn active(&self) -> bool {
        match self {
            Manipulator::Basic(m) => m.active(),
            Manipulator::MouseBasic(_) | Manipulator::MouseMotionToScroll(_) => false,
        }
    }

    pub fn invoke_timers(&mut self, until: TimeStamp, output: &mut EventQueue) {
        if let Manipulator::Basic(m) = self {
            m.invoke_timers(until, output);
        }
    }

    pub fn next_timer_deadline(&self) -> Option<TimeStamp> {
        match self {
            Manipulator::Basic(m) => m.next_timer_deadline(),
            Manipulator::MouseBasic(_) | Manipulator::MouseMotionToScroll(_) => None,
        }
    }
}

impl From<BasicManipulator> for Manipulator {
    fn from(m: BasicManipulator) -> Self {
        Manipulator::Basic(m)
    }
}

impl From<MouseBasicManipulator> for Manipulator {
    fn from(m: MouseBasicManipulator) -> Self {
        Manipulator::MouseBasic(m)
    }
}

impl From<MouseMotionToScrollManipulator> for Manipulator {
    fn from(m: MouseMotionToScrollManipulator) -> Self {
        Manipulator::MouseMotionToScroll(m)
    }
}
