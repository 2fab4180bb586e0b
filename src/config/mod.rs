//! Driver configuration.
//!
//! A [`DriverConfig`] is loaded from YAML or TOML (see [`loader`]) and
//! carries everything a [`MixerDevice`](crate::device::MixerDevice) needs
//! beyond its clock and transport.
//!
//! # Example TOML
//!
//! ```toml
//! device_id = "vmix0"
//! send_mode = "in_order"
//! limit_slow_sent_command_ms = 40
//! history_retention_ms = 60000
//!
//! [mappings]
//! program = "vmix0"
//! music = "vmix0"
//! ```

mod loader;

pub use loader::{
    default_config_path, load_config, load_config_from_str, load_document, save_config,
    ConfigFormat,
};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::command::Command;
use crate::error::{Result, VmxError};
use crate::scheduler::{QueueOptions, SendMode};
use crate::timeline::Mappings;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "VMX_CONFIG";

/// Configuration of one vMix device.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Identifier that layer mappings refer to.
    pub device_id: String,

    /// Delivery discipline for queued commands.
    pub send_mode: SendMode,

    /// Report sends that start more than this many ms late.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_slow_sent_command_ms: Option<u64>,

    /// Report sends that complete more than this many ms late.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_slow_fulfilled_command_ms: Option<u64>,

    /// Longest the queue timer sleeps between clock checks.
    pub max_poll_interval_ms: u64,

    /// Keep state snapshots this far into the past. Unbounded when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_retention_ms: Option<u64>,

    /// Per-subscriber event buffer.
    pub event_capacity: usize,

    /// Commands sent by `make_ready` when destruction is allowed.
    pub make_ready_commands: Vec<Command>,

    /// Layer name to device id. Empty maps every layer to this device.
    pub mappings: Mappings,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            device_id: "vmix0".to_string(),
            send_mode: SendMode::InOrder,
            limit_slow_sent_command_ms: None,
            limit_slow_fulfilled_command_ms: None,
            max_poll_interval_ms: 1000,
            history_retention_ms: None,
            event_capacity: 256,
            make_ready_commands: Vec::new(),
            mappings: Mappings::new(),
        }
    }
}

impl DriverConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if the device id is empty, the poll interval
    /// or event capacity is zero, or a mapping names no device.
    pub fn validate(&self) -> Result<()> {
        trace!(device_id = %self.device_id, "Validating driver config");

        if self.device_id.trim().is_empty() {
            return Err(VmxError::ConfigInvalid(
                "device_id must not be empty".to_string(),
            ));
        }
        if self.max_poll_interval_ms == 0 {
            return Err(VmxError::ConfigInvalid(
                "max_poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.event_capacity == 0 {
            return Err(VmxError::ConfigInvalid(
                "event_capacity must be greater than 0".to_string(),
            ));
        }
        if let Some((layer, _)) = self.mappings.iter().find(|(_, id)| id.trim().is_empty()) {
            return Err(VmxError::ConfigInvalid(format!(
                "mapping for layer '{layer}' has an empty device id"
            )));
        }

        debug!(
            mappings = self.mappings.len(),
            make_ready = self.make_ready_commands.len(),
            "Driver config validated"
        );
        Ok(())
    }

    /// Queue tuning derived from this config.
    #[must_use]
    pub fn queue_options(&self) -> QueueOptions {
        QueueOptions {
            limit_slow_sent_command: self.limit_slow_sent_command_ms,
            limit_slow_fulfilled_command: self.limit_slow_fulfilled_command_ms,
            max_poll_interval: Duration::from_millis(self.max_poll_interval_ms),
            event_capacity: self.event_capacity,
        }
    }

    /// True if `layer` is handled by this device.
    #[must_use]
    pub fn maps_layer(&self, layer: &str) -> bool {
        self.mappings.is_empty() || self.mappings.get(layer) == Some(&self.device_id)
    }
}
