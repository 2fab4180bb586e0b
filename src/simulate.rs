//! Offline replay of timeline states through a real driver.
//!
//! A simulation builds a [`MixerDevice`] on a [`ManualClock`] with a
//! [`MockReceiver`] as transport, applies each timeline state at its own
//! time, and waits for the queue to deliver before moving on. The report
//! lists what reached the receiver and every event the driver raised.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{error::TryRecvError, Receiver};
use tracing::{debug, info, instrument, warn};

use crate::command::{Command, CommandKind};
use crate::config::{load_document, DriverConfig};
use crate::device::mock::{MockConfig, MockReceiver, SentCommand};
use crate::device::MixerDevice;
use crate::error::{Result, VmxError};
use crate::events::DeviceEvent;
use crate::scheduler::{Clock, ManualClock};
use crate::state::MixerState;
use crate::timeline::TimelineState;

/// How long to wait for one step's commands to settle.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE_POLL: Duration = Duration::from_millis(2);

/// A timeline file holds either one state or a list of them.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TimelineDocument {
    Many(Vec<TimelineState>),
    One(TimelineState),
}

/// Read timeline states from YAML or JSON files, in file order.
///
/// # Errors
///
/// Returns `StateParse` for unreadable content and `InvalidArgument` if no
/// states were found.
pub fn load_timelines(paths: &[PathBuf]) -> Result<Vec<TimelineState>> {
    let mut states = Vec::new();
    for path in paths {
        match load_document::<TimelineDocument, _>(path)? {
            TimelineDocument::Many(many) => states.extend(many),
            TimelineDocument::One(one) => states.push(one),
        }
    }
    if states.is_empty() {
        return Err(VmxError::InvalidArgument(
            "no timeline states to simulate".to_string(),
        ));
    }
    debug!(files = paths.len(), states = states.len(), "Loaded timelines");
    Ok(states)
}

/// Inputs to one simulation run.
#[derive(Debug, Clone, Default)]
pub struct SimulationOptions {
    /// State the mock device reports on connect.
    pub initial_state: Option<MixerState>,
    /// Queue make-ready commands before the first step.
    pub make_ready: bool,
    /// Command kinds the mock device rejects.
    pub failing_kinds: Vec<CommandKind>,
}

/// Outcome of applying one timeline state.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub time: i64,
    pub planned: Vec<Command>,
    /// Commands the receiver accepted during this step.
    pub delivered: usize,
    pub failed: usize,
}

/// Full record of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub device: String,
    pub steps: Vec<StepReport>,
    pub sent: Vec<SentCommand>,
    pub events: Vec<DeviceEvent>,
    pub final_state: Option<MixerState>,
}

impl SimulationReport {
    /// Number of commands that failed delivery.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.steps.iter().map(|s| s.failed).sum()
    }
}

/// Replay `timelines` through a driver configured by `config`.
///
/// Must run inside a tokio runtime.
///
/// # Errors
///
/// Returns an error if the config is invalid, a timeline is malformed, or
/// the queue fails to settle a step.
#[instrument(skip_all, fields(device = %config.device_id, steps = timelines.len()))]
pub async fn run_simulation(
    config: DriverConfig,
    timelines: &[TimelineState],
    options: SimulationOptions,
) -> Result<SimulationReport> {
    // Connect just before the first step so the reported state precedes it.
    let start = timelines.first().map_or(0, |t| t.time);
    let clock = Arc::new(ManualClock::new(start.saturating_sub(1)));
    let receiver = Arc::new(MockReceiver::new().with_config(MockConfig {
        failing_kinds: options.failing_kinds,
        initial_state: options.initial_state,
        ..MockConfig::default()
    }));

    let device = MixerDevice::new(config, clock.clone(), receiver.clone())?;
    let mut rx = device.subscribe();
    let mut events = Vec::new();

    device.init().await?;

    let mut expected = 0;
    if options.make_ready {
        expected += device.make_ready(true)?;
        settle(&receiver, &mut rx, &mut events, expected).await?;
    }

    let mut steps = Vec::with_capacity(timelines.len());
    for timeline in timelines {
        clock.set(clock.now_ms().max(timeline.time));
        let delivered_before = receiver.sent_count();
        let failed_before = count_failures(&events);

        let result = device.apply_state(timeline)?;
        expected = delivered_before + failed_before + result.commands.len();
        settle(&receiver, &mut rx, &mut events, expected).await?;

        steps.push(StepReport {
            time: timeline.time,
            planned: result.commands,
            delivered: receiver.sent_count() - delivered_before,
            failed: count_failures(&events) - failed_before,
        });
    }

    let report = SimulationReport {
        device: device.name(),
        steps,
        sent: receiver.sent(),
        events,
        final_state: device.current_state(),
    };
    device.shutdown();

    info!(
        sent = report.sent.len(),
        failed = report.failures(),
        events = report.events.len(),
        "Simulation finished"
    );
    Ok(report)
}

/// Load everything a simulation needs from files and run it.
///
/// # Errors
///
/// Returns any load or simulation error.
pub async fn simulate_files(
    config: DriverConfig,
    timelines: &[PathBuf],
    initial: Option<&Path>,
    mut options: SimulationOptions,
) -> Result<SimulationReport> {
    let states = load_timelines(timelines)?;
    if let Some(path) = initial {
        options.initial_state = Some(load_document(path)?);
    }
    run_simulation(config, &states, options).await
}

fn count_failures(events: &[DeviceEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, DeviceEvent::CommandError { .. }))
        .count()
}

fn drain(rx: &mut Receiver<DeviceEvent>, events: &mut Vec<DeviceEvent>) {
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Simulation event buffer overflowed");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

/// Wait until `expected` commands have been delivered or have failed.
async fn settle(
    receiver: &MockReceiver,
    rx: &mut Receiver<DeviceEvent>,
    events: &mut Vec<DeviceEvent>,
    expected: usize,
) -> Result<()> {
    let wait = async {
        loop {
            drain(rx, events);
            if receiver.sent_count() + count_failures(events) >= expected {
                break;
            }
            tokio::time::sleep(SETTLE_POLL).await;
        }
    };
    tokio::time::timeout(SETTLE_TIMEOUT, wait)
        .await
        .map_err(|_| {
            VmxError::TimingViolation(format!(
                "queue did not settle within {}ms",
                SETTLE_TIMEOUT.as_millis()
            ))
        })?;

    // Let the forwarder relay queue diagnostics for this step.
    tokio::task::yield_now().await;
    drain(rx, events);
    Ok(())
}
