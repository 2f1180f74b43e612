//! Mock input source.
//!
//! Allows tests and the headless binary to inject [`PipelineMessage`]s
//! without an OS capture backend.

use std::sync::Mutex;

use tokio::sync::mpsc::{self, error::TrySendError, Sender};

use super::{CaptureError, InputSource, CHANNEL_CAPACITY};
use crate::application::pipeline::PipelineMessage;

/// An [`InputSource`] fed by [`MockInputSource::inject`].
#[derive(Default)]
pub struct MockInputSource {
    sender: Mutex<Option<Sender<PipelineMessage>>>,
}

impl MockInputSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends a message as if it came from a device.
    pub fn inject(&self, message: PipelineMessage) -> Result<(), CaptureError> {
        let sender = self.sender().ok_or(CaptureError::NotStarted)?;
        sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => CaptureError::ChannelFull,
            TrySendError::Closed(_) => CaptureError::ChannelClosed,
        })
    }

    /// A sender for other producers, e.g. the shutdown handler.
    pub fn sender(&self) -> Option<Sender<PipelineMessage>> {
        self.sender
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().cloned())
    }

    pub fn is_started(&self) -> bool {
        self.sender().is_some()
    }
}

impl InputSource for MockInputSource {
    fn start(&self) -> Result<mpsc::Receiver<PipelineMessage>, CaptureError> {
        let mut guard = self.sender.lock().map_err(|_| CaptureError::ChannelClosed)?;
        if guard.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        *guard = Some(tx);
        Ok(rx)
    }

    fn stop(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            // Dropping the sender closes the channel.
            *guard = None;
        }
    }
}
