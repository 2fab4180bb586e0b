//! Recording command receiver for tests and offline simulation.
//!
//! [`MockReceiver`] records every command it is handed and can be told to
//! fail, stall, or report a device state on connect.
//!
//! # Example
//!
//! ```rust,ignore
//! use vmx::device::mock::{MockReceiver, SentCommand};
//!
//! let mock = Arc::new(MockReceiver::new());
//! let device = MixerDevice::new(&config, clock, mock.clone());
//! device.init().await?;
//! device.apply_state(&timeline)?;
//!
//! mock.assert_kinds(&[CommandKind::PreviewInput, CommandKind::Transition]);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, trace};

use super::CommandReceiver;
use crate::command::{Command, CommandKind};
use crate::error::{Result, VmxError};
use crate::state::MixerState;

/// One command as seen by the receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentCommand {
    /// Planned send time.
    pub time: i64,
    pub command: Command,
    pub context: Option<String>,
    pub timeline_id: String,
}

/// Configuration for mock behavior.
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Fail every send after this many successful ones.
    pub fail_after_sends: Option<usize>,
    /// Command kinds that always fail.
    pub failing_kinds: Vec<CommandKind>,
    /// State reported by `connect`.
    pub initial_state: Option<MixerState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Receiver that records commands instead of sending them.
#[derive(Debug, Default)]
pub struct MockReceiver {
    config: MockConfig,
    sent: Mutex<Vec<SentCommand>>,
    error_injection: Mutex<Option<VmxError>>,
    latency_ms: AtomicU64,
    refuse_connect: AtomicBool,
}

impl MockReceiver {
    /// Create a receiver that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure mock behavior.
    #[must_use]
    pub fn with_config(mut self, config: MockConfig) -> Self {
        self.config = config;
        self
    }

    /// Report `state` from `connect`.
    #[must_use]
    pub fn with_initial_state(mut self, state: MixerState) -> Self {
        self.config.initial_state = Some(state);
        self
    }

    /// Delay every send by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Fail the next send with `error`.
    pub fn inject_error(&self, error: VmxError) {
        *lock(&self.error_injection) = Some(error);
    }

    /// Make `connect` fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    // === Assertions ===

    /// All commands received so far, in arrival order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentCommand> {
        lock(&self.sent).clone()
    }

    /// Kinds of the commands received so far.
    #[must_use]
    pub fn kinds(&self) -> Vec<CommandKind> {
        lock(&self.sent).iter().map(|s| s.command.kind).collect()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// Assert the received command kinds, in order.
    ///
    /// # Panics
    ///
    /// Panics if the kinds don't match.
    pub fn assert_kinds(&self, expected: &[CommandKind]) {
        let actual = self.kinds();
        assert_eq!(
            actual, expected,
            "Command mismatch.\nExpected: {expected:#?}\nActual: {actual:#?}",
        );
    }

    /// Assert nothing was received.
    ///
    /// # Panics
    ///
    /// Panics if any command was recorded.
    pub fn assert_nothing_sent(&self) {
        let sent = self.sent();
        assert!(sent.is_empty(), "Expected no commands, but found: {sent:#?}");
    }

    fn check_error(&self, command: &Command) -> Result<()> {
        if let Some(error) = lock(&self.error_injection).take() {
            return Err(error);
        }
        if self.config.failing_kinds.contains(&command.kind) {
            return Err(VmxError::CommandFailure {
                command: command.to_string(),
                reason: "mock configured to reject this kind".to_string(),
            });
        }
        if let Some(limit) = self.config.fail_after_sends {
            if lock(&self.sent).len() >= limit {
                return Err(VmxError::DeviceCommunication(
                    "Mock failure after send limit".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CommandReceiver for MockReceiver {
    async fn send(
        &self,
        time: i64,
        command: &Command,
        context: Option<&str>,
        timeline_id: &str,
    ) -> Result<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        self.check_error(command)?;

        trace!(time, %command, ?context, timeline_id, "Mock received command");
        lock(&self.sent).push(SentCommand {
            time,
            command: command.clone(),
            context: context.map(str::to_string),
            timeline_id: timeline_id.to_string(),
        });
        Ok(())
    }

    async fn connect(&self) -> Result<Option<MixerState>> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(VmxError::DeviceCommunication(
                "Mock connection refused".to_string(),
            ));
        }
        debug!(
            has_state = self.config.initial_state.is_some(),
            "Mock receiver connected"
        );
        Ok(self.config.initial_state.clone())
    }
}
