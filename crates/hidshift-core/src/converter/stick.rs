//! Game-pad analog stick to pointer / wheel motion.
//!
//! Each device axis keeps its normalized value in `[-1.0, 1.0]` and a short
//! history used to estimate how fast the stick is moving.  The magnitude
//! picks a step (motion per tick) and an interval (time between ticks):
//!
//! | magnitude    | step                     | interval          |
//! |--------------|--------------------------|-------------------|
//! | > 0.9        | `max_step`               | `min_interval`    |
//! | > 0.75       | `max_step * 0.75`        | `min_interval * 1.5` |
//! | > 0.5        | `max_step * 0.5`         | `min_interval * 2` |
//! | > 0.25       | `max_step * 0.25`        | `min_interval * 3` |
//! | > deadzone   | 1                        | `min_interval * 5` |
//! | otherwise    | 0 (stop)                 | 0                 |
//!
//! Fast stick movement boosts the step (up to double), never beyond
//! `max_step`.
//!
//! Emission is a repeating task in a [`Scheduler<StickTick>`] owned by the
//! caller.  Every axis remembers the handle of its pending tick; a tick
//! whose handle does not match is stale and ignored.  Each tick recomputes
//! the step so the repetition stops as soon as the stick returns to the
//! deadzone.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event::{Entry, Event, EventOrigin, EventType, PointingMotion};
use crate::scheduler::{Scheduler, TaskHandle};
use crate::types::{DeviceId, TimeStamp};

const HISTORY_WINDOW: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StickAxis {
    X,
    Y,
    VerticalWheel,
    HorizontalWheel,
}

impl StickAxis {
    pub fn is_wheel(self) -> bool {
        matches!(self, StickAxis::VerticalWheel | StickAxis::HorizontalWheel)
    }

    fn motion(self, step: i32) -> PointingMotion {
        let mut motion = PointingMotion::default();
        match self {
            StickAxis::X => motion.x = step,
            StickAxis::Y => motion.y = step,
            StickAxis::VerticalWheel => motion.vertical_wheel = step,
            StickAxis::HorizontalWheel => motion.horizontal_wheel = step,
        }
        motion
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StickParameters {
    #[serde(default = "default_deadzone")]
    pub deadzone: f64,
    #[serde(default = "default_xy_max_step")]
    pub xy_max_step: i32,
    #[serde(default = "default_wheels_max_step")]
    pub wheels_max_step: i32,
    #[serde(default = "default_min_interval_milliseconds")]
    pub min_interval_milliseconds: u64,
    /// Routes the right stick to the pointer and the left one to the wheels.
    #[serde(default)]
    pub swap_sticks: bool,
}

fn default_deadzone() -> f64 {
    0.05
}
fn default_xy_max_step() -> i32 {
    16
}
fn default_wheels_max_step() -> i32 {
    2
}
fn default_min_interval_milliseconds() -> u64 {
    10
}

impl Default for StickParameters {
    fn default() -> Self {
        Self {
            deadzone: default_deadzone(),
            xy_max_step: default_xy_max_step(),
            wheels_max_step: default_wheels_max_step(),
            min_interval_milliseconds: default_min_interval_milliseconds(),
            swap_sticks: false,
        }
    }
}

/// Payload of a scheduled emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StickTick {
    pub device_id: DeviceId,
    pub axis: StickAxis,
}

/// Snapshot of one axis for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisState {
    pub value: f64,
    pub step: i32,
    pub interval: Duration,
    pub active: bool,
}

#[derive(Debug, Default)]
struct AxisTracker {
    value: f64,
    history: VecDeque<(TimeStamp, f64)>,
    step: i32,
    interval: Duration,
    handle: Option<TaskHandle>,
}

impl AxisTracker {
    fn trim_history(&mut self, now: TimeStamp) {
        while let Some((at, _)) = self.history.front() {
            if now.duration_since(*at) > HISTORY_WINDOW {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    fn acceleration(&self) -> f64 {
        let values = self.history.iter().map(|(_, v)| *v);
        let max = values.clone().fold(f64::MIN, f64::max);
        let min = values.fold(f64::MAX, f64::min);
        if max >= min {
            max - min
        } else {
            0.0
        }
    }

    fn recompute(&mut self, parameters: &StickParameters, max_step: i32, now: TimeStamp) {
        self.trim_history(now);
        let (step, interval) = step_and_interval(self.value, self.acceleration(), parameters, max_step);
        self.step = step;
        self.interval = interval;
    }
}

/// Maps a normalized value to `(signed step, interval)`.
fn step_and_interval(value: f64, acceleration: f64, parameters: &StickParameters, max_step: i32) -> (i32, Duration) {
    let magnitude = value.abs();
    let min_interval = parameters.min_interval_milliseconds as f64;

    let (step_factor, interval_factor) = if magnitude > 0.9 {
        (Some(1.0), 1.0)
    } else if magnitude > 0.75 {
        (Some(0.75), 1.5)
    } else if magnitude > 0.5 {
        (Some(0.5), 2.0)
    } else if magnitude > 0.25 {
        (Some(0.25), 3.0)
    } else if magnitude > parameters.deadzone {
        (None, 5.0)
    } else {
        return (0, Duration::ZERO);
    };

    let step = match step_factor {
        Some(factor) => {
            let boost = 1.0 + acceleration.clamp(0.0, 1.0);
            let raw = (f64::from(max_step) * factor * boost).round() as i32;
            raw.clamp(1, max_step.max(1))
        }
        None => 1,
    };
    let interval = Duration::from_millis((min_interval * interval_factor).round() as u64);

    (if value < 0.0 { -step } else { step }, interval)
}

/// Maps `integer_value` in `[logical_min, logical_max]` to `[-1.0, 1.0]`.
///
/// Out-of-range values are clamped; a degenerate range yields 0.
pub fn normalize(integer_value: i64, logical_min: i64, logical_max: i64) -> f64 {
    if logical_max <= logical_min {
        return 0.0;
    }
    let clamped = integer_value.clamp(logical_min, logical_max);
    let ratio = (clamped - logical_min) as f64 / (logical_max - logical_min) as f64;
    ((ratio - 0.5) * 2.0).clamp(-1.0, 1.0)
}

#[derive(Debug, Default)]
pub struct GamePadStickConverter {
    parameters: StickParameters,
    axes: HashMap<(DeviceId, StickAxis), AxisTracker>,
}

impl GamePadStickConverter {
    pub fn new(parameters: StickParameters) -> Self {
        Self {
            parameters,
            axes: HashMap::new(),
        }
    }

    pub fn parameters(&self) -> &StickParameters {
        &self.parameters
    }

    fn max_step(&self, axis: StickAxis) -> i32 {
        if axis.is_wheel() {
            self.parameters.wheels_max_step
        } else {
            self.parameters.xy_max_step
        }
    }

    /// Records a new raw axis value and starts or stops emission.
    #[allow(clippy::too_many_arguments)]
    pub fn convert(
        &mut self,
        device_id: DeviceId,
        axis: StickAxis,
        integer_value: i64,
        logical_min: i64,
        logical_max: i64,
        now: TimeStamp,
        scheduler: &mut Scheduler<StickTick>,
    ) {
        let parameters = self.parameters;
        let max_step = self.max_step(axis);
        let tracker = self.axes.entry((device_id, axis)).or_default();

        tracker.value = normalize(integer_value, logical_min, logical_max);
        tracker.history.push_back((now, tracker.value));
        tracker.recompute(&parameters, max_step, now);

        if tracker.interval.is_zero() {
            if let Some(handle) = tracker.handle.take() {
                scheduler.cancel(handle);
                debug!(device = %device_id, ?axis, "stick returned to deadzone");
            }
        } else if tracker.handle.is_none() {
            let handle = scheduler.schedule(now + tracker.interval, StickTick { device_id, axis });
            tracker.handle = Some(handle);
            debug!(device = %device_id, ?axis, step = tracker.step, "stick emission started");
        }
    }

    /// Handles a due tick.  Returns the motion entry to enqueue, if any.
    pub fn tick(
        &mut self,
        tick: StickTick,
        handle: TaskHandle,
        now: TimeStamp,
        scheduler: &mut Scheduler<StickTick>,
    ) -> Option<Entry> {
        let parameters = self.parameters;
        let max_step = self.max_step(tick.axis);
        let tracker = self.axes.get_mut(&(tick.device_id, tick.axis))?;
        if tracker.handle != Some(handle) {
            return None;
        }

        tracker.recompute(&parameters, max_step, now);
        if tracker.interval.is_zero() || tracker.step == 0 {
            tracker.handle = None;
            return None;
        }

        tracker.handle = Some(scheduler.schedule(now + tracker.interval, tick));
        Some(Entry::new(
            tick.device_id,
            now,
            Event::PointingMotion(tick.axis.motion(tracker.step)),
            EventType::Single,
            EventOrigin::Grabbed,
        ))
    }

    pub fn axis_state(&self, device_id: DeviceId, axis: StickAxis) -> Option<AxisState> {
        self.axes.get(&(device_id, axis)).map(|tracker| AxisState {
            value: tracker.value,
            step: tracker.step,
            interval: tracker.interval,
            active: tracker.handle.is_some(),
        })
    }

    pub fn device_removed(&mut self, device_id: DeviceId, scheduler: &mut Scheduler<StickTick>) {
        self.axes.retain(|(device, _), tracker| {
            if *device != device_id {
                return true;
            }
            if let Some(handle) = tracker.handle.take() {
                scheduler.cancel(handle);
            }
            false
        });
    }
}
