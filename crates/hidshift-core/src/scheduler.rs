//! Time-ordered work list for timer-driven behaviour.
//!
//! Nothing in the pipeline blocks on a timer.  Components schedule a task for
//! a time stamp and the driver pops due tasks when the clock reaches them.
//! Tasks for the same instant come out in the order they were scheduled.

use std::collections::{BTreeMap, HashMap};

use crate::types::TimeStamp;

/// Identifies one scheduled task; used to cancel it or to recognise stale ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(u64);

#[derive(Debug)]
pub struct Scheduler<T> {
    tasks: BTreeMap<(TimeStamp, u64), T>,
    deadlines: HashMap<u64, TimeStamp>,
    next_sequence: u64,
}

impl<T> Default for Scheduler<T> {
    fn default() -> Self {
        Self {
            tasks: BTreeMap::new(),
            deadlines: HashMap::new(),
            next_sequence: 0,
        }
    }
}

impl<T> Scheduler<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: TimeStamp, task: T) -> TaskHandle {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.tasks.insert((at, sequence), task);
        self.deadlines.insert(sequence, at);
        TaskHandle(sequence)
    }

    /// Removes a pending task.  Returns `None` if it already ran or was cancelled.
    pub fn cancel(&mut self, handle: TaskHandle) -> Option<T> {
        let at = self.deadlines.remove(&handle.0)?;
        self.tasks.remove(&(at, handle.0))
    }

    pub fn is_scheduled(&self, handle: TaskHandle) -> bool {
        self.deadlines.contains_key(&handle.0)
    }

    /// Pops the earliest task whose deadline is at or before `now`.
    pub fn pop_due(&mut self, now: TimeStamp) -> Option<(TimeStamp, TaskHandle, T)> {
        let (&(at, sequence), _) = self.tasks.first_key_value()?;
        if at > now {
            return None;
        }
        self.deadlines.remove(&sequence);
        let task = self.tasks.remove(&(at, sequence))?;
        Some((at, TaskHandle(sequence), task))
    }

    pub fn next_deadline(&self) -> Option<TimeStamp> {
        self.tasks.keys().next().map(|(at, _)| *at)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
        self.deadlines.clear();
    }
}
