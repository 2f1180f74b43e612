//! Input capture infrastructure for the grabber.
//!
//! A capture backend opens HID devices, reads their values and reports them
//! as [`PipelineMessage`]s: device attach/detach, one `DeviceValues` per HID
//! report, and device errors.  Messages go through a bounded tokio channel
//! to the single pipeline task.
//!
//! # Testability
//!
//! The [`InputSource`] trait lets tests and the headless binary inject
//! messages without any OS capture mechanism, via [`mock::MockInputSource`].

use tokio::sync::mpsc;

use crate::application::pipeline::PipelineMessage;

pub mod mock;

/// Capacity of the channel between a capture backend and the pipeline.
pub const CHANNEL_CAPACITY: usize = 1024;

/// Error type for input capture operations.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture source has already been started")]
    AlreadyStarted,
    #[error("capture source has not been started")]
    NotStarted,
    #[error("pipeline channel is full")]
    ChannelFull,
    #[error("pipeline channel has been closed")]
    ChannelClosed,
}

/// Trait abstracting the production of pipeline input.
pub trait InputSource: Send {
    /// Starts the source and returns the receiver the pipeline drains.
    fn start(&self) -> Result<mpsc::Receiver<PipelineMessage>, CaptureError>;
    /// Stops the source.  The receiver sees the channel close once every
    /// other sender is gone.
    fn stop(&self);
}
