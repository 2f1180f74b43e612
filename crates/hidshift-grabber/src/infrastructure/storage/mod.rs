//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads and writes the grabber's TOML config from
//! the platform-appropriate directory and falls back to defaults when the
//! file does not exist yet (first run).

pub mod config;
