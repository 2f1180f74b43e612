//! TOML-based configuration persistence for the grabber.
//!
//! Reads and writes [`AppConfig`] to the platform-appropriate config file:
//! - Windows:  `%APPDATA%\hidshift\config.toml`
//! - Linux:    `~/.config/hidshift/config.toml`
//! - macOS:    `~/Library/Application Support/hidshift/config.toml`
//!
//! The `HIDSHIFT_CONFIG` environment variable overrides the path.
//!
//! ```toml
//! [grabber]
//! log_level = "info"
//! rules_file = "rules.json"
//!
//! [parameters]
//! simultaneous_threshold_milliseconds = 50
//!
//! [game_pad]
//! deadzone = 0.05
//! swap_sticks = false
//! ```
//!
//! # Serde default values
//!
//! Every field has a `#[serde(default …)]`, so a partial file (or an older
//! one missing newer fields) still loads, with the missing values taken
//! from the defaults.  Relative paths are resolved against the directory
//! holding the config file.

use std::path::{Path, PathBuf};

use hidshift_core::converter::StickParameters;
use hidshift_core::BasicParameters;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "HIDSHIFT_CONFIG";

/// File name inside the hidshift config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `HIDSHIFT_CONFIG` nor a per-user config base is available.
    #[error("no config location: set HIDSHIFT_CONFIG or a home directory")]
    NoConfigDir,

    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Creating the directory or writing the file failed.
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid grabber config: {0}")]
    InvalidToml(#[from] toml::de::Error),

    #[error("cannot encode grabber config: {0}")]
    Encode(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level grabber configuration stored on disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub grabber: GrabberConfig,
    /// Timing defaults for basic manipulators that do not override them.
    #[serde(default)]
    pub parameters: BasicParameters,
    #[serde(default)]
    pub game_pad: StickParameters,
}

/// General grabber behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GrabberConfig {
    /// `tracing` log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// JSON rule file.  Without one, input passes through unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<PathBuf>,
    /// Where to mirror the environment as JSON for diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_snapshot_file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            rules_file: None,
            environment_snapshot_file: None,
        }
    }
}

impl AppConfig {
    /// Resolves `path` against `base_dir` unless it is already absolute.
    pub fn resolve_path(path: &Path, base_dir: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// The `hidshift` directory under the per-user config base.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    user_config_base()
        .map(|base| base.join("hidshift"))
        .ok_or(ConfigError::NoConfigDir)
}

/// `HIDSHIFT_CONFIG` if set, otherwise `config.toml` in [`config_dir`].
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    match std::env::var_os(CONFIG_PATH_ENV) {
        Some(path) => Ok(PathBuf::from(path)),
        None => Ok(config_dir()?.join(CONFIG_FILE_NAME)),
    }
}

pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Reads the config at `path`.  A missing file yields the defaults, so the
/// grabber runs before anything was ever saved.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AppConfig::default()),
        Err(source) => {
            return Err(ConfigError::Read {
                path: path.to_owned(),
                source,
            })
        }
    };
    let config = toml::from_str(&text)?;
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(&config_file_path()?, config)
}

/// Writes `config` to `path`, creating missing parent directories.
pub fn save_config_to(path: &Path, config: &AppConfig) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(config)?;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|source| write_error(dir, source))?;
    }
    std::fs::write(path, text).map_err(|source| write_error(path, source))
}

fn write_error(path: &Path, source: std::io::Error) -> ConfigError {
    ConfigError::Write {
        path: path.to_owned(),
        source,
    }
}

/// Per-user configuration base directory for the current platform.
fn user_config_base() -> Option<PathBuf> {
    let home = || std::env::var_os("HOME").map(PathBuf::from);

    if cfg!(target_os = "windows") {
        std::env::var_os("APPDATA").map(PathBuf::from)
    } else if cfg!(target_os = "macos") {
        home().map(|h| h.join("Library/Application Support"))
    } else if cfg!(unix) {
        std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| home().map(|h| h.join(".config")))
    } else {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
