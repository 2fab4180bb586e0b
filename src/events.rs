//! Driver events and the broadcast bus that carries them.
//!
//! The driver never calls back into its owner. Everything it wants to
//! report (connection changes, command failures, slow commands, resync
//! requests) goes out as a [`DeviceEvent`] on an [`EventBus`]; owners
//! subscribe and react.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::command::Command;
use crate::device::DeviceStatus;
use crate::scheduler::TimingReport;

/// Events emitted by a [`MixerDevice`](crate::device::MixerDevice).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceEvent {
    /// Connection status changed.
    ConnectionChanged { status: DeviceStatus },

    /// Something failed; `context` names the component.
    ///
    /// `command` is set when the failure belongs to a queued command, so it
    /// can be traced back to its layer and timeline object.
    Error {
        context: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        command: Option<Command>,
    },

    /// A command started later than the configured limit.
    SlowSend {
        device: String,
        message: String,
        report: TimingReport,
    },

    /// A command completed later than the configured limit.
    SlowFulfilled {
        device: String,
        message: String,
        report: TimingReport,
    },

    /// The device state changed outside our control; the owner should
    /// resolve the timeline again and re-apply it.
    ResetRequested,

    /// Informational message.
    Info { message: String },

    /// A command was handed to the receiver.
    CommandSent {
        time: i64,
        command: Command,
        context: Option<String>,
        timeline_id: String,
    },

    /// The receiver rejected a command.
    CommandError { command: Command, message: String },
}

impl DeviceEvent {
    /// Stable snake_case event name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ConnectionChanged { .. } => "connection_changed",
            Self::Error { .. } => "error",
            Self::SlowSend { .. } => "slow_send",
            Self::SlowFulfilled { .. } => "slow_fulfilled",
            Self::ResetRequested => "reset_requested",
            Self::Info { .. } => "info",
            Self::CommandSent { .. } => "command_sent",
            Self::CommandError { .. } => "command_error",
        }
    }
}

/// Broadcast channel for [`DeviceEvent`]s.
///
/// Slow subscribers lose the oldest events once `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DeviceEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    /// Emit an event. Having no subscribers is not an error.
    pub fn emit(&self, event: DeviceEvent) {
        let _ = self.tx.send(event);
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
