//! PipelineRunner: drives a [`Pipeline`] on one tokio task.
//!
//! The runner waits for whichever comes first: the next [`PipelineMessage`]
//! or the pipeline's next deadline.  Timers are therefore just deadlines
//! reached on the same task as input, and no pipeline state is ever shared
//! between tasks.
//!
//! Results are handed to the injected collaborators: entries to the
//! [`VirtualDeviceSink`], grabbability changes to the
//! [`GrabbableStateListener`].  A sink failure is logged and the pipeline
//! keeps running.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hidshift_core::{Entry, GrabbableState, TimeStamp};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::pipeline::{Pipeline, PipelineMessage, PipelineOutput};

/// Receives the final entries of the chain.
///
/// The production implementation posts them to a virtual HID device; tests
/// record them.
#[async_trait]
pub trait VirtualDeviceSink: Send + Sync {
    async fn post_entries(&self, entries: Vec<Entry>) -> Result<(), String>;
}

/// Receives grabbability changes, e.g. to release a device mid-gesture.
#[cfg_attr(test, mockall::automock)]
pub trait GrabbableStateListener: Send + Sync {
    fn grabbable_state_changed(&self, state: GrabbableState);
}

/// Maps pipeline time stamps to tokio instants.
///
/// Time stamps are milliseconds since the clock's origin.  Input sources
/// stamp their values with the same clock the runner sleeps on.
#[derive(Debug, Clone, Copy)]
pub struct PipelineClock {
    origin: Instant,
}

impl PipelineClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> TimeStamp {
        TimeStamp(u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX))
    }

    pub fn instant_at(&self, time_stamp: TimeStamp) -> Instant {
        self.origin + Duration::from_millis(time_stamp.0)
    }
}

impl Default for PipelineClock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PipelineRunner {
    pipeline: Pipeline,
    clock: PipelineClock,
    sink: Arc<dyn VirtualDeviceSink>,
    listener: Arc<dyn GrabbableStateListener>,
}

impl PipelineRunner {
    pub fn new(
        pipeline: Pipeline,
        sink: Arc<dyn VirtualDeviceSink>,
        listener: Arc<dyn GrabbableStateListener>,
    ) -> Self {
        Self {
            pipeline,
            clock: PipelineClock::new(),
            sink,
            listener,
        }
    }

    pub fn with_clock(mut self, clock: PipelineClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> PipelineClock {
        self.clock
    }

    /// Runs until [`PipelineMessage::Shutdown`] arrives or every sender is
    /// dropped.  Returns the pipeline so its final state can be inspected.
    pub async fn run(mut self, mut receiver: mpsc::Receiver<PipelineMessage>) -> Pipeline {
        info!("pipeline started");

        loop {
            let wake_at = self.pipeline.next_deadline();

            let message = tokio::select! {
                received = receiver.recv() => match received {
                    Some(PipelineMessage::Shutdown) | None => break,
                    Some(message) => Some(message),
                },
                () = sleep_past(self.clock, wake_at) => None,
            };

            let now = self.clock.now();
            let output = match message {
                Some(message) => self.pipeline.handle(message, now),
                None => self.pipeline.advance(now),
            };
            self.deliver(output).await;
        }

        // Whatever already reached the last queue still goes out.
        let output = self.pipeline.advance(self.clock.now());
        self.deliver(output).await;

        info!("pipeline stopped");
        self.pipeline
    }

    async fn deliver(&self, output: PipelineOutput) {
        for state in output.grabbable_state_changes {
            self.listener.grabbable_state_changed(state);
        }

        if output.entries.is_empty() {
            return;
        }
        debug!(count = output.entries.len(), "posting entries");
        if let Err(e) = self.sink.post_entries(output.entries).await {
            warn!("virtual device rejected entries: {e}");
        }
    }
}

/// Sleeps until just past `deadline`, or forever when there is none.
///
/// A waiting entry only resolves once its window has strictly passed, so
/// waking exactly on the deadline would spin.
async fn sleep_past(clock: PipelineClock, deadline: Option<TimeStamp>) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(clock.instant_at(deadline + Duration::from_millis(1))).await;
        }
        None => std::future::pending().await,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use hidshift_core::converter::hid_mapper::usage_page;
    use hidshift_core::converter::{HidValue, StickParameters};
    use hidshift_core::manipulator::basic::from_event::{EventDefinition, FromEventDefinition};
    use hidshift_core::manipulator::basic::to_event::ToEventDefinition;
    use hidshift_core::types::KeyCode;
    use hidshift_core::{
        BasicManipulator, BasicParameters, DeviceId, Event, EventOrigin, EventType, GrabbableStateKind,
        ManipulatorManager, ManipulatorManagersConnector,
    };
    use std::sync::Mutex;

    // ── Test doubles ──────────────────────────────────────────────────────────

    #[derive(Default)]
    struct RecordingSink {
        entries: Mutex<Vec<Entry>>,
        should_fail: bool,
    }

    #[async_trait]
    impl VirtualDeviceSink for RecordingSink {
        async fn post_entries(&self, entries: Vec<Entry>) -> Result<(), String> {
            if self.should_fail {
                return Err("injected failure".to_string());
            }
            self.entries.lock().unwrap().extend(entries);
            Ok(())
        }
    }

    impl RecordingSink {
        fn keys(&self) -> Vec<(KeyCode, EventType)> {
            self.entries
                .lock()
                .unwrap()
                .iter()
                .filter_map(|e| match e.event() {
                    Event::KeyCode(k) => Some((*k, e.event_type())),
                    _ => None,
                })
                .collect()
        }
    }

    fn pipeline() -> Pipeline {
        let mut connector = ManipulatorManagersConnector::new();
        let manipulator = BasicManipulator::new(
            FromEventDefinition::single(EventDefinition::KeyCode(KeyCode::Spacebar)),
            vec![],
            BasicParameters::default(),
        )
        .with_to_if_held_down(vec![ToEventDefinition::key(KeyCode::LeftShift)]);
        connector.emplace_back_connection(ManipulatorManager::new(vec![manipulator.into()]));
        Pipeline::new(connector, StickParameters::default())
    }

    fn key(ts: TimeStamp, usage: u16, pressed: bool) -> PipelineMessage {
        PipelineMessage::DeviceValues {
            device_id: DeviceId(1),
            event_origin: EventOrigin::Grabbed,
            values: vec![HidValue::new(
                ts,
                usage_page::KEYBOARD_OR_KEYPAD,
                usage,
                i64::from(pressed),
            )],
        }
    }

    fn ignore_grabbable_changes() -> Arc<MockGrabbableStateListener> {
        let mut listener = MockGrabbableStateListener::new();
        listener.expect_grabbable_state_changed().return_const(());
        Arc::new(listener)
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_fires_timers_without_new_input() {
        // Arrange: spacebar (0x2C) held -> left_shift after 500 ms.
        let sink = Arc::new(RecordingSink::default());
        let runner = PipelineRunner::new(pipeline(), sink.clone(), ignore_grabbable_changes());
        let clock = runner.clock();
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(runner.run(rx));

        // Act
        tx.send(key(clock.now(), 0x2C, true)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(600)).await;
        let held = sink.keys();
        tx.send(key(clock.now(), 0x2C, false)).await.unwrap();
        tx.send(PipelineMessage::Shutdown).await.unwrap();
        task.await.unwrap();

        // Assert
        assert_eq!(held, vec![(KeyCode::LeftShift, EventType::KeyDown)]);
        assert_eq!(
            sink.keys(),
            vec![
                (KeyCode::LeftShift, EventType::KeyDown),
                (KeyCode::LeftShift, EventType::KeyUp),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_reports_grabbable_changes_to_listener() {
        // Arrange
        let mut listener = MockGrabbableStateListener::new();
        listener
            .expect_grabbable_state_changed()
            .withf(|state| state.state == GrabbableStateKind::UngrabbableTemporarily)
            .times(1)
            .return_const(());
        listener
            .expect_grabbable_state_changed()
            .withf(|state| state.state == GrabbableStateKind::Grabbable)
            .times(1)
            .return_const(());
        let runner = PipelineRunner::new(pipeline(), Arc::new(RecordingSink::default()), Arc::new(listener));
        let clock = runner.clock();
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(runner.run(rx));

        // Act: left_shift (0xE1) down and up.
        tx.send(key(clock.now(), 0xE1, true)).await.unwrap();
        tx.send(key(clock.now(), 0xE1, false)).await.unwrap();
        drop(tx);

        // Assert: the mock verifies its expectations when the runner drops it.
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_failure_does_not_stop_the_pipeline() {
        // Arrange
        let sink = Arc::new(RecordingSink {
            should_fail: true,
            ..RecordingSink::default()
        });
        let runner = PipelineRunner::new(pipeline(), sink, ignore_grabbable_changes());
        let clock = runner.clock();
        let (tx, rx) = mpsc::channel(16);
        let task = tokio::spawn(runner.run(rx));

        // Act: `a` (0x04) passes through and is rejected by the sink.
        tx.send(key(clock.now(), 0x04, true)).await.unwrap();
        tx.send(key(clock.now(), 0x04, false)).await.unwrap();
        tx.send(PipelineMessage::Shutdown).await.unwrap();
        let pipeline = task.await.unwrap();

        // Assert
        assert!(!pipeline.connector().active());
    }

    #[test]
    fn test_clock_maps_time_stamps_to_instants() {
        let clock = PipelineClock::new();

        let instant = clock.instant_at(TimeStamp(250));

        assert_eq!(instant.duration_since(clock.origin), Duration::from_millis(250));
    }
}
