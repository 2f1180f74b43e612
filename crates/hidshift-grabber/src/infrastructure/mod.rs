//! Infrastructure layer for the grabber.
//!
//! Contains the adapters at the edge of the pipeline: input capture, the
//! virtual output device and configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `hidshift_core`, but MUST NOT be imported by the `application` layer.

pub mod input_capture;
pub mod storage;
pub mod virtual_device;
