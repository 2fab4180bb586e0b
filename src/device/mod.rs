//! Device layer for the vMix driver.
//!
//! [`MixerDevice`] owns the command queue, the state history and the event
//! bus. Everything that touches the wire sits behind [`CommandReceiver`], so
//! the driver runs unchanged against a real transport or the
//! [`mock::MockReceiver`].

mod driver;
pub mod mock;

pub use driver::{ConnectionEvent, MixerDevice, MAKE_READY_CONTEXT};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::Result;
use crate::state::MixerState;

/// Transport adapter: turns commands into wire traffic.
///
/// The returned future must settle (success or failure) for in-order
/// delivery to make progress. A send that never settles stalls the queue.
///
/// # Implementation Notes
///
/// - `time` is the planned send time, not the current time
/// - `context` is the layer name, `"makeReady"`, or `None` for synthetic commands
/// - Retries, if any, belong here
#[async_trait]
pub trait CommandReceiver: Send + Sync {
    /// Deliver one command.
    ///
    /// # Errors
    ///
    /// Returns an error if the device rejected the command or could not be
    /// reached.
    async fn send(
        &self,
        time: i64,
        command: &Command,
        context: Option<&str>,
        timeline_id: &str,
    ) -> Result<()>;

    /// Open the connection, returning the device's current state if the
    /// transport can read it.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection could not be established.
    async fn connect(&self) -> Result<Option<MixerState>>;
}

/// Coarse health of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCode {
    #[default]
    Unknown,
    Good,
    WarningMinor,
    WarningMajor,
    Bad,
    Fatal,
}

/// Device status with optional human-readable messages.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub code: StatusCode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

impl DeviceStatus {
    #[must_use]
    pub const fn good() -> Self {
        Self {
            code: StatusCode::Good,
            messages: Vec::new(),
        }
    }

    #[must_use]
    pub fn bad(message: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Bad,
            messages: vec![message.into()],
        }
    }

    #[must_use]
    pub fn is_good(&self) -> bool {
        self.code == StatusCode::Good
    }
}
