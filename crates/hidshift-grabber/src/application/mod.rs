//! Application layer of the grabber.
//!
//! # What lives here? (for beginners)
//!
//! The *application* layer wires the pure engine from `hidshift-core` into a
//! running service, without touching the OS itself:
//!
//! - It **owns** all mutable pipeline state in one place.
//! - It **depends on traits** (`VirtualDeviceSink`,
//!   `GrabbableStateListener`) rather than concrete devices, so tests can
//!   inject recording doubles.
//! - It contains **no OS calls and no file access**.
//!
//! # Sub-modules
//!
//! - **`pipeline`** – The single consumer.  Converts raw HID values into
//!   entries, runs them through the manipulator chain and collects the
//!   output and grabbability changes.  Usable synchronously with explicit
//!   time.
//!
//! - **`runner`** – Drives a pipeline on a tokio task: waits for the next
//!   message or deadline, then delivers the output to the collaborators.

pub mod pipeline;
pub mod runner;
