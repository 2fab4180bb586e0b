//! Output mode abstraction for robot and human output.

use std::path::Path;

use serde::Serialize;

use crate::cli::Cli;
use crate::command::Command;
use crate::config::DriverConfig;
use crate::error::VmxError;
use crate::simulate::SimulationReport;
use crate::state::MixerState;

pub mod human;
pub mod robot;

pub use human::HumanOutput;
pub use robot::RobotOutput;

// === Plan Result Types ===

/// Result of an offline reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct PlanReport {
    /// Timeline time the commands are planned for.
    pub time: i64,
    /// Where the previous state came from, if not the empty default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<String>,
    /// Layers left after device mapping.
    pub layers: usize,
    pub commands: Vec<Command>,
    /// State the device is believed to be in once the commands land.
    pub state: MixerState,
}

// === Validation Result Types ===

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// A single validation issue (error or warning).
#[derive(Debug, Clone, Serialize)]
pub struct ValidationIssue {
    /// Field or location where the issue occurred
    pub field: String,
    pub message: String,
    pub severity: IssueSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    #[must_use]
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: IssueSeverity::Error,
            suggestion: None,
        }
    }

    #[must_use]
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: IssueSeverity::Warning,
            suggestion: None,
        }
    }

    /// Add a suggestion to this issue.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    /// Whether the configuration is valid (no errors)
    pub valid: bool,
    pub config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub issues: Vec<ValidationIssue>,
    pub summary: ValidationSummary,
}

/// Summary of validation results.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationSummary {
    pub error_count: usize,
    pub warning_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub make_ready_count: Option<usize>,
}

impl ValidationResult {
    /// Create a new validation result for a config file.
    #[must_use]
    pub fn new(config_path: &Path) -> Self {
        Self {
            valid: true,
            config_path: config_path.display().to_string(),
            device_id: None,
            issues: Vec::new(),
            summary: ValidationSummary::default(),
        }
    }

    /// Check a config file: load errors become issues, and a loaded config
    /// is inspected for settings that are legal but likely mistakes.
    #[must_use]
    pub fn check(config_path: &Path, loaded: std::result::Result<DriverConfig, VmxError>) -> Self {
        let mut result = Self::new(config_path);
        let config = match loaded {
            Ok(config) => config,
            Err(e) => {
                let mut issue = ValidationIssue::error("config", e.to_string());
                if let Some(hint) = e.suggestion() {
                    issue = issue.with_suggestion(hint);
                }
                result.push(issue);
                return result;
            }
        };

        result.device_id = Some(config.device_id.clone());
        result.summary.mapping_count = Some(config.mappings.len());
        result.summary.make_ready_count = Some(config.make_ready_commands.len());

        if !config.mappings.is_empty() && !config.mappings.values().any(|id| *id == config.device_id) {
            result.push(
                ValidationIssue::warning(
                    "mappings",
                    format!("no layer is mapped to device '{}'", config.device_id),
                )
                .with_suggestion("Map at least one layer to device_id, or remove mappings"),
            );
        }
        if config.history_retention_ms.is_none() {
            result.add_warning(
                "history_retention_ms",
                "not set; state history grows for the lifetime of the driver",
            );
        }
        for (field, limit) in [
            ("limit_slow_sent_command_ms", config.limit_slow_sent_command_ms),
            ("limit_slow_fulfilled_command_ms", config.limit_slow_fulfilled_command_ms),
        ] {
            if limit == Some(0) {
                result.add_warning(field, "0 reports every command as slow");
            }
        }
        result
    }

    fn push(&mut self, issue: ValidationIssue) {
        match issue.severity {
            IssueSeverity::Error => {
                self.summary.error_count += 1;
                self.valid = false;
            }
            IssueSeverity::Warning => self.summary.warning_count += 1,
        }
        self.issues.push(issue);
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(ValidationIssue::error(field, message));
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.push(ValidationIssue::warning(field, message));
    }

    /// Check if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }
}

// === Version Info ===

/// Build metadata shown by `vmx version`.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub version: &'static str,
    pub git_sha: &'static str,
    pub git_dirty: bool,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
    pub target: &'static str,
}

/// JSON formatting options for robot mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotFormat {
    /// Pretty-printed JSON (default for --robot).
    Json,
    /// Single-line JSON (--format=json-compact).
    JsonCompact,
}

/// Determines how command output is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// JSON output for agents and scripting.
    Robot(RobotFormat),
    /// Styled terminal output for human users.
    Human { color: bool },
}

impl OutputMode {
    /// Create OutputMode from CLI arguments.
    #[must_use]
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.use_json() {
            let format = if cli.use_compact_json() {
                RobotFormat::JsonCompact
            } else {
                RobotFormat::Json
            };
            Self::Robot(format)
        } else {
            Self::Human {
                color: !cli.no_color,
            }
        }
    }

    /// Returns true if output should be JSON.
    #[must_use]
    pub const fn is_robot(&self) -> bool {
        matches!(self, Self::Robot(_))
    }

    /// Convert into the appropriate Output implementation.
    #[must_use]
    pub fn into_output(self) -> Box<dyn Output> {
        match self {
            Self::Robot(format) => Box::new(RobotOutput::new(format)),
            Self::Human { color } => Box::new(HumanOutput::new(color)),
        }
    }
}

/// Trait for all output operations.
///
/// Commands call these methods without knowing the output mode.
pub trait Output {
    // Basic messages
    fn success(&self, message: &str);
    fn error(&self, error: &VmxError);
    fn warning(&self, message: &str);
    fn info(&self, message: &str);

    // Driver results
    fn plan(&self, report: &PlanReport);
    fn simulation(&self, report: &SimulationReport);

    // Validation output
    fn validation_result(&self, result: &ValidationResult);

    // Metadata
    fn version_info(&self, info: &VersionInfo);
}
