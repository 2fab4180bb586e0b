//! The vMix device driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::{CommandReceiver, DeviceStatus};
use crate::command::Command;
use crate::config::DriverConfig;
use crate::error::{Result, VmxError};
use crate::events::{DeviceEvent, EventBus};
use crate::history::StateHistory;
use crate::reconcile::{reconcile, Reconciliation};
use crate::scheduler::{Clock, CommandQueue, OrderId, PendingOrder, QueueEvent};
use crate::state::MixerState;
use crate::timeline::TimelineState;

/// Context token carried by make-ready commands.
pub const MAKE_READY_CONTEXT: &str = "makeReady";

/// Connection notifications from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// (Re)connected; `state` is the device's reported state, if read.
    Connected { state: Option<MixerState> },
    Disconnected,
    Error(String),
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives one vMix instance from timeline states.
///
/// Each [`apply_state`](Self::apply_state) reconciles the timeline against
/// the state believed current at that time, cancels queued commands from
/// that time on, and queues the new commands for delivery through the
/// [`CommandReceiver`].
///
/// Must be created inside a tokio runtime.
pub struct MixerDevice {
    config: DriverConfig,
    clock: Arc<dyn Clock>,
    receiver: Arc<dyn CommandReceiver>,
    queue: CommandQueue<Command>,
    history: Mutex<StateHistory<MixerState>>,
    events: EventBus,
    initialized: AtomicBool,
    connected: AtomicBool,
    forwarder: JoinHandle<()>,
}

impl MixerDevice {
    /// Create a driver. Call [`init`](Self::init) before applying states.
    ///
    /// # Errors
    ///
    /// Returns `ConfigInvalid` if `config` does not validate.
    pub fn new(
        config: DriverConfig,
        clock: Arc<dyn Clock>,
        receiver: Arc<dyn CommandReceiver>,
    ) -> Result<Self> {
        config.validate()?;
        let queue = CommandQueue::new(Arc::clone(&clock), config.send_mode, config.queue_options());
        let events = EventBus::new(config.event_capacity);
        let forwarder = spawn_forwarder(device_name(&config.device_id), queue.subscribe(), events.clone());
        debug!(device_id = %config.device_id, mode = ?config.send_mode, "Created mixer device");

        Ok(Self {
            config,
            clock,
            receiver,
            queue,
            history: Mutex::new(StateHistory::new()),
            events,
            initialized: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            forwarder,
        })
    }

    /// Human-readable device name used in event messages.
    #[must_use]
    pub fn name(&self) -> String {
        device_name(&self.config.device_id)
    }

    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Subscribe to driver events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Connect through the receiver and mark the device ready.
    ///
    /// # Errors
    ///
    /// Returns the receiver's error if the connection fails; the device
    /// stays uninitialized.
    #[instrument(skip_all, fields(device = %self.config.device_id))]
    pub async fn init(&self) -> Result<()> {
        match self.receiver.connect().await {
            Ok(state) => {
                self.on_connection_event(ConnectionEvent::Connected { state });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Connection failed");
                self.events.emit(DeviceEvent::Error {
                    context: self.name(),
                    message: e.to_string(),
                    command: None,
                });
                Err(e)
            }
        }
    }

    /// Reconcile `timeline` and queue the resulting commands.
    ///
    /// Layers not mapped to this device are ignored.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` before [`init`](Self::init) has succeeded,
    /// and `InvalidArgument` for a malformed timeline or after
    /// [`shutdown`](Self::shutdown). None of these touch the queue or the
    /// history.
    #[instrument(skip_all, fields(device = %self.config.device_id, time = timeline.time))]
    pub fn apply_state(&self, timeline: &TimelineState) -> Result<Reconciliation> {
        if !self.is_initialized() {
            self.events.emit(DeviceEvent::Info {
                message: format!("{} not initialized yet", self.name()),
            });
            return Err(VmxError::NotInitialized {
                device_id: self.config.device_id.clone(),
            });
        }
        timeline.validate()?;
        self.ensure_running()?;
        let timeline = timeline.mapped_to(&self.config.device_id, &self.config.mappings);

        let mut history = lock(&self.history);
        let now = self.clock.now_ms();
        let previous_time = now.max(timeline.time);
        let previous = history
            .state_before(previous_time)
            .cloned()
            .unwrap_or_default();

        let result = reconcile(&previous, &timeline);

        let cancelled = self.queue.cancel_at_or_after(previous_time);
        for command in &result.commands {
            self.enqueue(timeline.time, command.clone())?;
        }

        history.discard_from(timeline.time);
        history.record(timeline.time, result.state.clone());
        if let Some(retention) = self.config.history_retention_ms {
            let retention = i64::try_from(retention).unwrap_or(i64::MAX);
            history.prune_before(now.saturating_sub(retention));
        }

        info!(
            commands = result.commands.len(),
            cancelled,
            snapshots = history.len(),
            "Applied timeline state"
        );
        Ok(result)
    }

    /// Cancel queued commands planned at or after `time`.
    pub fn cancel_from(&self, time: i64) -> usize {
        self.queue.cancel_at_or_after(time)
    }

    /// Cancel queued commands planned strictly after `time`.
    pub fn clear_future(&self, time: i64) -> usize {
        self.queue.cancel_after(time)
    }

    /// Queue the configured make-ready commands for immediate delivery.
    ///
    /// Nothing happens unless `ok_to_destroy` is set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the queue has been shut down.
    #[instrument(skip(self), fields(device = %self.config.device_id))]
    pub fn make_ready(&self, ok_to_destroy: bool) -> Result<usize> {
        if !ok_to_destroy || self.config.make_ready_commands.is_empty() {
            return Ok(0);
        }
        self.ensure_running()?;
        let now = self.clock.now_ms();
        for command in &self.config.make_ready_commands {
            let mut command = command.clone().context(MAKE_READY_CONTEXT);
            command.timeline_id.clear();
            self.enqueue(now, command)?;
        }
        info!(
            count = self.config.make_ready_commands.len(),
            "Queued make-ready commands"
        );
        Ok(self.config.make_ready_commands.len())
    }

    /// Handle a connection notification from the transport.
    pub fn on_connection_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Connected { state } => {
                if let Some(state) = state {
                    let now = self.clock.now_ms();
                    lock(&self.history).record(now, state);
                }
                self.connected.store(true, Ordering::SeqCst);
                self.initialized.store(true, Ordering::SeqCst);
                info!(device = %self.config.device_id, "Device connected");
                self.emit_status();
                self.events.emit(DeviceEvent::ResetRequested);
            }
            ConnectionEvent::Disconnected => {
                self.connected.store(false, Ordering::SeqCst);
                warn!(device = %self.config.device_id, "Device disconnected");
                self.emit_status();
            }
            ConnectionEvent::Error(message) => {
                warn!(device = %self.config.device_id, %message, "Device error");
                self.events.emit(DeviceEvent::Error {
                    context: self.name(),
                    message,
                    command: None,
                });
            }
        }
    }

    /// Record a state the device reported on its own.
    ///
    /// Requests a resync when it differs from the believed state.
    pub fn on_device_state(&self, state: MixerState) {
        let now = self.clock.now_ms();
        let mut history = lock(&self.history);
        let changed = history.state_as_of(now) != Some(&state);
        history.record(now, state);
        drop(history);

        if changed {
            debug!(device = %self.config.device_id, "Device state changed externally");
            self.events.emit(DeviceEvent::ResetRequested);
        }
    }

    /// Current connection status.
    #[must_use]
    pub fn status(&self) -> DeviceStatus {
        if self.is_connected() {
            DeviceStatus::good()
        } else {
            DeviceStatus::bad(format!("{} is not connected", self.name()))
        }
    }

    /// Commands waiting in the queue.
    #[must_use]
    pub fn queue(&self) -> Vec<PendingOrder<Command>> {
        self.queue.list_pending()
    }

    /// State believed current right now.
    #[must_use]
    pub fn current_state(&self) -> Option<MixerState> {
        let now = self.clock.now_ms();
        lock(&self.history).state_as_of(now).cloned()
    }

    /// Cancel everything queued and stop the queue.
    pub fn shutdown(&self) {
        info!(device = %self.config.device_id, "Shutting down");
        self.queue.dispose();
        self.forwarder.abort();
    }

    fn ensure_running(&self) -> Result<()> {
        if self.queue.is_disposed() {
            return Err(VmxError::InvalidArgument(format!(
                "{} has been shut down",
                self.name()
            )));
        }
        Ok(())
    }

    fn emit_status(&self) {
        self.events.emit(DeviceEvent::ConnectionChanged {
            status: self.status(),
        });
    }

    fn enqueue(&self, time: i64, command: Command) -> Result<OrderId> {
        let receiver = Arc::clone(&self.receiver);
        let events = self.events.clone();
        self.queue.enqueue(
            time,
            move |command: Command| async move {
                events.emit(DeviceEvent::CommandSent {
                    time,
                    command: command.clone(),
                    context: command.context.clone(),
                    timeline_id: command.timeline_id.clone(),
                });
                let sent = receiver
                    .send(time, &command, command.context.as_deref(), &command.timeline_id)
                    .await;
                sent.map_err(|e| {
                    events.emit(DeviceEvent::CommandError {
                        command: command.clone(),
                        message: e.to_string(),
                    });
                    VmxError::CommandFailure {
                        command: command.to_string(),
                        reason: e.to_string(),
                    }
                })
            },
            command,
        )
    }
}

impl Drop for MixerDevice {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

fn device_name(device_id: &str) -> String {
    format!("VMix-Send {device_id}")
}

/// Republish queue diagnostics as device events.
fn spawn_forwarder(
    name: String,
    mut rx: broadcast::Receiver<QueueEvent>,
    events: EventBus,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Dropped queue diagnostics");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let message = format!("{name}: {event}");
            events.emit(match event {
                QueueEvent::Error { args, .. } => DeviceEvent::Error {
                    context: format!("{name} queue"),
                    message,
                    command: serde_json::from_value(args).ok(),
                },
                QueueEvent::SlowSend(report) => DeviceEvent::SlowSend {
                    device: name.clone(),
                    message,
                    report,
                },
                QueueEvent::SlowFulfilled(report) => DeviceEvent::SlowFulfilled {
                    device: name.clone(),
                    message,
                    report,
                },
            });
        }
    })
}
