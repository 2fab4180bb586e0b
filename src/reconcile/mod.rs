//! State reconciliation engine.
//!
//! Reconciliation runs in two synchronous phases:
//!
//! 1. [`project`] folds the resolved timeline onto the previous
//!    [`MixerState`], recording which layer wrote each facet.
//! 2. [`diff`] compares the previous and projected states and emits the
//!    ordered [`Command`] list that moves the mixer from one to the other.
//!
//! Neither phase touches the device or the clock; the same inputs always
//! yield the same commands.

mod diff;
mod project;

pub use diff::diff;
pub use project::project;

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::command::Command;
use crate::state::{InputRef, MixerState, Origin};
use crate::timeline::TimelineState;

/// Layer and timeline object that last wrote each facet of a projection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origins {
    pub active: Option<Origin>,
    pub preview: Option<Origin>,
    pub fader: Option<Origin>,
    pub recording: Option<Origin>,
    pub streaming: Option<Origin>,
    pub fade_to_black: Option<Origin>,
    pub inputs: HashMap<InputRef, Origin>,
}

/// Output of [`project`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Projection {
    pub state: MixerState,
    pub origins: Origins,
}

/// Output of [`reconcile`]: the state to record and the commands to send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub state: MixerState,
    pub commands: Vec<Command>,
}

/// Run both phases against `previous`.
#[must_use]
pub fn reconcile(previous: &MixerState, timeline: &TimelineState) -> Reconciliation {
    let Projection { state, origins } = project(previous, timeline);
    let (state, commands) = diff(previous, state, &origins);
    debug!(
        time = timeline.time,
        layers = timeline.layers.len(),
        commands = commands.len(),
        "Reconciled timeline state"
    );
    Reconciliation { state, commands }
}
