//! Structured logging initialization for the vmx driver.
//!
//! Supports both human-friendly and machine-readable (JSON) output formats,
//! with proper TTY detection and verbosity control.

use std::io::{self, IsTerminal};

use tracing::debug;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Builds the default filter directive from the verbosity flags.
pub(crate) fn default_directive(verbose: u8, quiet: bool) -> &'static str {
    if quiet {
        "vmx=error"
    } else {
        match verbose {
            0 => "vmx=info",
            1 => "vmx=debug",
            _ => "vmx=trace",
        }
    }
}

/// Where log lines go and how they look.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON lines, one object per event.
    Json,
    /// Multi-line colored output for a terminal.
    Pretty,
    /// Single-line plain output for pipes and files.
    Compact,
}

impl LogFormat {
    /// Pick the format for the current output mode and stderr.
    #[must_use]
    pub const fn select(robot_mode: bool, stderr_is_tty: bool) -> Self {
        if robot_mode {
            Self::Json
        } else if stderr_is_tty {
            Self::Pretty
        } else {
            Self::Compact
        }
    }
}

/// Initialize the tracing subscriber based on CLI flags and environment.
///
/// # Arguments
///
/// * `robot_mode` - If true, output structured JSON logs for machine consumption
/// * `verbose` - Verbosity level: 0 = info, 1 = debug, 2+ = trace
/// * `quiet` - If true, suppress non-essential output (only errors)
///
/// # Environment Variables
///
/// * `RUST_LOG` - Override default filter (e.g., "vmx=debug,vmx::scheduler=trace")
///
/// Returns `false` if a global subscriber was already installed, in which
/// case that subscriber stays in place.
pub fn init_logging(robot_mode: bool, verbose: u8, quiet: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose, quiet)));
    let format = LogFormat::select(robot_mode, io::stderr().is_terminal());

    let json = (format == LogFormat::Json).then(|| {
        fmt::layer()
            .json()
            .with_target(true)
            .with_span_events(FmtSpan::NONE)
            .with_writer(io::stderr)
    });
    let pretty = (format == LogFormat::Pretty).then(|| {
        fmt::layer()
            .with_target(true)
            .with_span_events(FmtSpan::NONE)
            .with_writer(io::stderr)
    });
    let compact = (format == LogFormat::Compact).then(|| {
        fmt::layer()
            .compact()
            .with_ansi(false)
            .with_target(false)
            .with_span_events(FmtSpan::NONE)
            .with_writer(io::stderr)
    });

    match tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .with(compact)
        .try_init()
    {
        Ok(()) => {
            debug!(?format, "Logging initialized");
            true
        }
        Err(e) => {
            debug!(error = %e, "Logging already initialized, keeping existing subscriber");
            false
        }
    }
}
