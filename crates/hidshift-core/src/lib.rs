//! # hidshift-core
//!
//! The event transformation engine of hidshift: queued entries, modifier
//! flag bookkeeping, environment conditions, the manipulator chain, device
//! grabbability tracking, and the game-pad converters.
//!
//! This crate has no OS dependencies, no async runtime and no I/O apart from
//! the optional environment snapshot file.  Time is always passed in
//! explicitly, so every behaviour (including timers) can be driven
//! deterministically from tests.
//!
//! # Architecture overview (for beginners)
//!
//! hidshift sits between physical input devices and the applications that
//! read them.  Raw HID values come in, remapped input goes out:
//!
//! ```text
//!  HID values ─► converter ─► queue[0] ─► manager ─► queue[1] ─► … ─► queue[N] ─► virtual device
//!                                 │
//!                                 └──► GrabbableStateManager ─► grab decisions
//! ```
//!
//! - **`event`** – [`Event`] (what happened) and [`Entry`] (an event plus
//!   device, time, press/release and manipulation state), and the FIFO
//!   [`EventQueue`] that carries entries between stages.
//!
//! - **`modifier_flag_manager`** – Which modifiers are logically held in a
//!   queue, including locks and sticky modifiers.
//!
//! - **`environment`** / **`condition`** – Facts about the outside world
//!   (frontmost app, input source, variables, devices) and the predicates
//!   rules use to test them.
//!
//! - **`manipulator`** – The rewriting units and the manager / connector
//!   that chain them.
//!
//! - **`grabbable_state_manager`** – Whether a device can be grabbed right
//!   now without breaking a gesture in progress.
//!
//! - **`converter`** – Turn raw HID values, hat switches and analog sticks
//!   into entries.
//!
//! - **`rule`** – Build manipulators from JSON rule files.

pub mod condition;
pub mod converter;
pub mod environment;
pub mod event;
pub mod grabbable_state_manager;
pub mod manipulator;
pub mod modifier_flag_manager;
pub mod rule;
pub mod scheduler;
pub mod types;

pub use condition::{Condition, ConditionError, ConditionManager};
pub use environment::{DeviceProperties, Environment, FrontmostApplication, InputSourceProperties, VariableValue};
pub use event::queue::EventQueue;
pub use event::{Entry, EntryState, Event, EventOrigin, EventType, PointingMotion};
pub use grabbable_state_manager::{GrabbableState, GrabbableStateKind, GrabbableStateManager, UngrabbableReason};
pub use manipulator::basic::{BasicManipulator, BasicParameters};
pub use manipulator::connector::ManipulatorManagersConnector;
pub use manipulator::manager::ManipulatorManager;
pub use manipulator::mouse_motion_to_scroll::MouseMotionToScrollManipulator;
pub use manipulator::{ManipulateResult, Manipulator};
pub use modifier_flag_manager::ModifierFlagManager;
pub use rule::{load_rules, LoadedRules, RuleError, RuleErrorKind, RuleSetError};
pub use scheduler::{Scheduler, TaskHandle};
pub use types::{DeviceId, ModifierFlag, TimeStamp};
