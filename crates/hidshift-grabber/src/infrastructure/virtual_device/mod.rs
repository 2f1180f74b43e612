//! Output-side adapters: where the final entries and grabbability changes go.
//!
//! Posting to a real virtual HID device is platform specific and lives
//! outside this crate.  These adapters cover the headless binary (logging)
//! and tests (recording).

use std::sync::Mutex;

use async_trait::async_trait;
use hidshift_core::{Entry, GrabbableState};
use tracing::{info, warn};

use crate::application::runner::{GrabbableStateListener, VirtualDeviceSink};

// ── Virtual device sinks ──────────────────────────────────────────────────────

/// Logs every entry instead of posting it.
#[derive(Debug, Default)]
pub struct LoggingVirtualDevice;

impl LoggingVirtualDevice {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VirtualDeviceSink for LoggingVirtualDevice {
    async fn post_entries(&self, entries: Vec<Entry>) -> Result<(), String> {
        for entry in &entries {
            info!(
                device = %entry.device_id(),
                time_stamp = entry.time_stamp().0,
                event_type = ?entry.event_type(),
                event = ?entry.event(),
                "post"
            );
        }
        Ok(())
    }
}

/// Keeps every posted entry in memory.
#[derive(Debug, Default)]
pub struct RecordingVirtualDevice {
    entries: Mutex<Vec<Entry>>,
}

impl RecordingVirtualDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of everything posted so far.
    pub fn entries(&self) -> Vec<Entry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn take_entries(&self) -> Vec<Entry> {
        self.entries
            .lock()
            .map(|mut entries| std::mem::take(&mut *entries))
            .unwrap_or_default()
    }
}

#[async_trait]
impl VirtualDeviceSink for RecordingVirtualDevice {
    async fn post_entries(&self, entries: Vec<Entry>) -> Result<(), String> {
        let mut recorded = self.entries.lock().map_err(|e| e.to_string())?;
        recorded.extend(entries);
        Ok(())
    }
}

// ── Grabbable state listeners ─────────────────────────────────────────────────

/// Logs grabbability changes.
#[derive(Debug, Default)]
pub struct LoggingGrabbableStateListener;

impl GrabbableStateListener for LoggingGrabbableStateListener {
    fn grabbable_state_changed(&self, state: GrabbableState) {
        info!(
            device = %state.device_id,
            state = ?state.state,
            reason = ?state.reason,
            "grabbable state changed"
        );
    }
}

/// Keeps every reported change in memory.
#[derive(Debug, Default)]
pub struct RecordingGrabbableStateListener {
    states: Mutex<Vec<GrabbableState>>,
}

impl RecordingGrabbableStateListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn states(&self) -> Vec<GrabbableState> {
        self.states
            .lock()
            .map(|states| states.clone())
            .unwrap_or_default()
    }
}

impl GrabbableStateListener for RecordingGrabbableStateListener {
    fn grabbable_state_changed(&self, state: GrabbableState) {
        match self.states.lock() {
            Ok(mut states) => states.push(state),
            Err(e) => warn!("grabbable state recorder poisoned: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hidshift_core::types::KeyCode;
    use hidshift_core::{
        DeviceId, Event, EventOrigin, EventType, GrabbableStateKind, TimeStamp, UngrabbableReason,
    };

    fn entry(ts: u64) -> Entry {
        Entry::new(
            DeviceId(1),
            TimeStamp(ts),
            Event::KeyCode(KeyCode::A),
            EventType::KeyDown,
            EventOrigin::Grabbed,
        )
    }

    #[tokio::test]
    async fn test_recording_device_keeps_posting_order() {
        // Arrange
        let device = RecordingVirtualDevice::new();

        // Act
        device.post_entries(vec![entry(1), entry(2)]).await.expect("post");
        device.post_entries(vec![entry(3)]).await.expect("post");

        // Assert
        let stamps: Vec<u64> = device.entries().iter().map(|e| e.time_stamp().0).collect();
        assert_eq!(stamps, vec![1, 2, 3]);
        assert_eq!(device.take_entries().len(), 3);
        assert!(device.entries().is_empty());
    }

    #[tokio::test]
    async fn test_logging_device_accepts_everything() {
        let device = LoggingVirtualDevice::new();

        let result = device.post_entries(vec![entry(1)]).await;

        assert!(result.is_ok());
    }

    #[test]
    fn test_recording_listener_records_states() {
        let listener = RecordingGrabbableStateListener::new();
        let state = GrabbableState::new(
            DeviceId(2),
            GrabbableStateKind::UngrabbableTemporarily,
            UngrabbableReason::PointingButtonPressed,
            TimeStamp(5),
        );

        listener.grabbable_state_changed(state);
        LoggingGrabbableStateListener.grabbable_state_changed(state);

        assert_eq!(listener.states(), vec![state]);
    }
}
