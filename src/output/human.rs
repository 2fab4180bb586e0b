//! Human-friendly output implementation using console styling.

use console::{style, Style, Term};
use tracing::{debug, instrument, trace};

use crate::command::Command;
use crate::error::VmxError;
use crate::events::DeviceEvent;
use crate::simulate::SimulationReport;

use super::{IssueSeverity, Output, PlanReport, ValidationResult, VersionInfo};

/// Styles shared by all human output.
struct Theme {
    success: Style,
    error: Style,
    warning: Style,
    accent: Style,
    label: Style,
    muted: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            success: Style::new().green().bold(),
            error: Style::new().red().bold(),
            warning: Style::new().yellow().bold(),
            accent: Style::new().cyan().bold(),
            label: Style::new().bold(),
            muted: Style::new().dim(),
        }
    }
}

/// Styled terminal output implementation for human users.
pub struct HumanOutput {
    theme: Theme,
    stdout: Term,
    stderr: Term,
}

impl HumanOutput {
    #[instrument]
    pub fn new(color: bool) -> Self {
        debug!(color, "Creating HumanOutput");
        if !color {
            console::set_colors_enabled(false);
            console::set_colors_enabled_stderr(false);
        }
        Self {
            theme: Theme::default(),
            stdout: Term::stdout(),
            stderr: Term::stderr(),
        }
    }

    fn line(&self, text: &str) {
        // Write errors on a closed pipe are ignored.
        let _ = self.stdout.write_line(text);
    }

    fn heading(&self, title: &str) {
        self.line(&format!("{}", self.theme.accent.apply_to(title)));
    }

    fn label(&self, name: &str, value: impl std::fmt::Display) {
        self.line(&format!(
            "  {} {value}",
            self.theme.label.apply_to(format!("{name:<10}"))
        ));
    }

    fn command_line(&self, time: i64, command: &Command) {
        let origin = command
            .context
            .as_deref()
            .map(|context| format!("  [{context}]"))
            .unwrap_or_default();
        self.line(&format!(
            "  {:>8}  {command}{}",
            self.theme.muted.apply_to(time),
            self.theme.muted.apply_to(origin)
        ));
    }

    fn event_line(&self, event: &DeviceEvent) {
        let name = event.name();
        let detail = match event {
            DeviceEvent::ConnectionChanged { status } => format!("{:?}", status.code),
            DeviceEvent::Error {
                context,
                message,
                command: Some(command),
            } => format!("{context}: {message} ({command})"),
            DeviceEvent::Error {
                context, message, ..
            } => format!("{context}: {message}"),
            DeviceEvent::SlowSend { message, .. }
            | DeviceEvent::SlowFulfilled { message, .. }
            | DeviceEvent::Info { message } => message.clone(),
            DeviceEvent::CommandError { command, message } => format!("{command}: {message}"),
            DeviceEvent::CommandSent { time, command, .. } => format!("{time} {command}"),
            DeviceEvent::ResetRequested => String::new(),
        };
        let styled = match event {
            DeviceEvent::Error { .. } | DeviceEvent::CommandError { .. } => {
                self.theme.error.apply_to(name)
            }
            DeviceEvent::SlowSend { .. } | DeviceEvent::SlowFulfilled { .. } => {
                self.theme.warning.apply_to(name)
            }
            _ => self.theme.muted.apply_to(name),
        };
        self.line(&format!("  {styled} {detail}"));
    }
}

impl Output for HumanOutput {
    #[instrument(skip(self))]
    fn success(&self, message: &str) {
        debug!(message, "Outputting success");
        self.line(&format!("{} {message}", self.theme.success.apply_to("[OK]")));
    }

    #[instrument(skip(self))]
    fn error(&self, error: &VmxError) {
        debug!(
            error = %error,
            recoverable = error.is_user_recoverable(),
            "Outputting error"
        );
        let _ = self.stderr.write_line(&format!(
            "{} {}",
            self.theme.error.apply_to("[ERR]"),
            style(error).bold()
        ));
        if let Some(suggestion) = error.suggestion() {
            trace!(suggestion, "Adding suggestion");
            let _ = self.stderr.write_line(&format!(
                "  {} {}",
                self.theme.label.apply_to("Hint:"),
                self.theme.muted.apply_to(suggestion)
            ));
        }
    }

    #[instrument(skip(self))]
    fn warning(&self, message: &str) {
        debug!(message, "Outputting warning");
        self.line(&format!("{} {message}", self.theme.warning.apply_to("[WARN]")));
    }

    #[instrument(skip(self))]
    fn info(&self, message: &str) {
        debug!(message, "Outputting info");
        self.line(&format!("{} {message}", self.theme.accent.apply_to("[INFO]")));
    }

    #[instrument(skip_all, fields(time = report.time))]
    fn plan(&self, report: &PlanReport) {
        debug!(commands = report.commands.len(), "Outputting plan");
        self.heading(&format!("Plan at t={}", report.time));
        if let Some(previous) = &report.previous {
            self.label("Previous", previous);
        }
        self.label("Layers", report.layers);
        self.label("Commands", report.commands.len());
        self.line("");

        if report.commands.is_empty() {
            self.success("Device already matches the timeline");
            return;
        }
        for command in &report.commands {
            self.command_line(report.time, command);
        }
    }

    #[instrument(skip_all, fields(steps = report.steps.len()))]
    fn simulation(&self, report: &SimulationReport) {
        debug!(sent = report.sent.len(), "Outputting simulation");
        self.heading(&format!("Simulation of {}", report.device));

        for step in &report.steps {
            self.line("");
            self.line(&format!(
                "{} {} planned, {} delivered, {} failed",
                self.theme.label.apply_to(format!("t={}", step.time)),
                step.planned.len(),
                step.delivered,
                step.failed
            ));
            for command in &step.planned {
                self.command_line(step.time, command);
            }
        }

        let notable: Vec<_> = report
            .events
            .iter()
            .filter(|e| !matches!(e, DeviceEvent::CommandSent { .. }))
            .collect();
        if !notable.is_empty() {
            self.line("");
            self.heading("Events");
            for event in notable {
                self.event_line(event);
            }
        }

        self.line("");
        let failures = report.failures();
        if failures == 0 {
            self.success(&format!("{} commands delivered", report.sent.len()));
        } else {
            self.warning(&format!(
                "{} commands delivered, {failures} failed",
                report.sent.len()
            ));
        }
    }

    #[instrument(skip_all, fields(valid = result.valid))]
    fn validation_result(&self, result: &ValidationResult) {
        debug!(issues = result.issues.len(), "Outputting validation result");
        self.heading(&format!("Config {}", result.config_path));
        if let Some(device_id) = &result.device_id {
            self.label("Device", device_id);
        }
        if let Some(count) = result.summary.mapping_count {
            self.label("Mappings", count);
        }

        for issue in &result.issues {
            let tag = match issue.severity {
                IssueSeverity::Error => self.theme.error.apply_to("error"),
                IssueSeverity::Warning => self.theme.warning.apply_to("warning"),
            };
            self.line(&format!("  {tag} {}: {}", issue.field, issue.message));
            if let Some(suggestion) = &issue.suggestion {
                self.line(&format!("    {}", self.theme.muted.apply_to(suggestion)));
            }
        }

        if result.is_valid() {
            self.success(&format!(
                "Configuration is valid ({} warnings)",
                result.summary.warning_count
            ));
        }
    }

    #[instrument(skip_all)]
    fn version_info(&self, info: &VersionInfo) {
        debug!(version = info.version, "Outputting version info");
        self.heading(&format!("vmx {}", info.version));
        let dirty = if info.git_dirty { " (dirty)" } else { "" };
        self.label("Git SHA", format!("{}{dirty}", info.git_sha));
        self.label("Built", self.theme.muted.apply_to(info.build_timestamp));
        self.label("Rust", self.theme.muted.apply_to(info.rustc_version));
        self.label("Target", self.theme.muted.apply_to(info.target));
    }
}
