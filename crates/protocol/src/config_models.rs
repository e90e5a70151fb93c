//! Controller settings models for `config.toml`.
//!
//! This module defines the structure of the settings file that controls where
//! the controller keeps its durable records and how it supervises runs.

use serde::Deserialize;
use serde::Serialize;
use ts_rs::TS;

/// Represents controller settings from `config.toml`.
///
/// Every field has a default, so an empty or missing file is valid.
///
/// # Example
///
/// ```toml
/// # config.toml
/// data-dir = "var/data"
/// startup-timeout-ms = 10000
/// log-level = "debug"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(rename_all = "kebab-case")]
pub struct ControllerSettings {
    /// Directory holding run state, offset and snapshot records.
    ///
    /// Relative paths are resolved against the project root.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// How long `start` waits for the runner to confirm startup.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    /// Capacity of the runner event channel and the notification channel.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Fallback log filter when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            startup_timeout_ms: default_startup_timeout_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            log_level: default_log_level(),
        }
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_startup_timeout_ms() -> u64 {
    5_000
}

fn default_event_channel_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_string()
}
