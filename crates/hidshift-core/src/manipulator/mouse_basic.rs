//! Pointer motion transformer: flips and swaps axes of `PointingMotion`.

use serde::{Deserialize, Serialize};

use crate::condition::ConditionManager;
use crate::environment::Environment;
use crate::event::queue::EventQueue;
use crate::event::{Entry, EntryState, Event, PointingMotion};

use super::ManipulateResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseFlip {
    X,
    Y,
    VerticalWheel,
    HorizontalWheel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseSwap {
    Xy,
    Wheels,
}

#[derive(Debug, Clone, Default)]
pub struct MouseBasicManipulator {
    flip: Vec<MouseFlip>,
    swap: Vec<MouseSwap>,
    condition_manager: ConditionManager,
}

impl MouseBasicManipulator {
    pub fn new(flip: Vec<MouseFlip>, swap: Vec<MouseSwap>) -> Self {
        Self {
            flip,
            swap,
            condition_manager: ConditionManager::default(),
        }
    }

    pub fn with_conditions(mut self, condition_manager: ConditionManager) -> Self {
        self.condition_manager = condition_manager;
        self
    }

    /// Swaps run before flips.
    pub fn transform(&self, motion: PointingMotion) -> PointingMotion {
        let mut m = motion;
        for swap in &self.swap {
            match swap {
                MouseSwap::Xy => std::mem::swap(&mut m.x, &mut m.y),
                MouseSwap::Wheels => std::mem::swap(&mut m.vertical_wheel, &mut m.horizontal_wheel),
            }
        }
        for flip in &self.flip {
            match flip {
                MouseFlip::X => m.x = m.x.saturating_neg(),
                MouseFlip::Y => m.y = m.y.saturating_neg(),
                MouseFlip::VerticalWheel => m.vertical_wheel = m.vertical_wheel.saturating_neg(),
                MouseFlip::HorizontalWheel => {
                    m.horizontal_wheel = m.horizontal_wheel.saturating_neg()
                }
            }
        }
        m
    }

    pub fn manipulate(
        &self,
        front: &mut Entry,
        output: &mut EventQueue,
        environment: &Environment,
    ) -> ManipulateResult {
        if !front.is_valid() {
            return ManipulateResult::Passed;
        }
        let Event::PointingMotion(motion) = front.event() else {
            return ManipulateResult::Passed;
        };
        if !self.condition_manager.is_fulfilled(front, environment) {
            return ManipulateResult::Passed;
        }

        let transformed = self.transform(*motion);
        front.invalidate();
        output.emplace_back_entry(
            front.device_id(),
            front.event_time_stamp(),
            Event::PointingMotion(transformed),
            front.event_type(),
            front.original_event().clone(),
            front.event_origin(),
            EntryState::Manipulated,
        );
        ManipulateResult::Manipulated
    }
}
