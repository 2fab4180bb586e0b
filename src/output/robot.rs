//! Robot mode JSON output implementation.

use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use crate::error::VmxError;
use crate::simulate::SimulationReport;

use super::{Output, PlanReport, RobotFormat, ValidationResult, VersionInfo};

/// JSON output implementation for agents and scripting.
pub struct RobotOutput {
    format: RobotFormat,
}

impl RobotOutput {
    #[instrument]
    pub fn new(format: RobotFormat) -> Self {
        debug!(?format, "Creating RobotOutput");
        Self { format }
    }

    fn render<T: Serialize + ?Sized>(&self, data: &T) -> Option<String> {
        let json = match self.format {
            RobotFormat::Json => serde_json::to_string_pretty(data),
            RobotFormat::JsonCompact => serde_json::to_string(data),
        };
        match json {
            Ok(json) => {
                trace!(json_len = json.len(), "JSON serialized");
                Some(json)
            }
            Err(e) => {
                warn!(error = %e, "Serialization failed");
                None
            }
        }
    }

    /// Output any serializable data as JSON to stdout.
    #[instrument(skip(self, data), fields(format = ?self.format))]
    fn output_json<T: Serialize + ?Sized>(&self, data: &T) {
        if let Some(json) = self.render(data) {
            println!("{json}");
        }
    }

    /// Output JSON to stderr (errors).
    fn output_json_stderr<T: Serialize + ?Sized>(&self, data: &T) {
        if let Some(json) = self.render(data) {
            eprintln!("{json}");
        }
    }
}

impl Output for RobotOutput {
    #[instrument(skip(self))]
    fn success(&self, message: &str) {
        debug!(message, "Robot: success");
        self.output_json(&serde_json::json!({
            "success": true,
            "message": message
        }));
    }

    #[instrument(skip(self))]
    fn error(&self, error: &VmxError) {
        debug!(error = %error, "Robot: error");
        self.output_json_stderr(&serde_json::json!({
            "error": true,
            "message": error.to_string(),
            "suggestion": error.suggestion(),
            "recoverable": error.is_user_recoverable(),
        }));
    }

    #[instrument(skip(self))]
    fn warning(&self, message: &str) {
        debug!(message, "Robot: warning");
        self.output_json(&serde_json::json!({
            "warning": true,
            "message": message
        }));
    }

    #[instrument(skip(self))]
    fn info(&self, message: &str) {
        debug!(message, "Robot: info");
        self.output_json(&serde_json::json!({
            "info": true,
            "message": message
        }));
    }

    #[instrument(skip_all, fields(time = report.time, commands = report.commands.len()))]
    fn plan(&self, report: &PlanReport) {
        debug!("Robot: plan");
        self.output_json(report);
    }

    #[instrument(skip_all, fields(steps = report.steps.len()))]
    fn simulation(&self, report: &SimulationReport) {
        debug!("Robot: simulation");
        self.output_json(report);
    }

    #[instrument(skip_all, fields(valid = result.valid))]
    fn validation_result(&self, result: &ValidationResult) {
        debug!("Robot: validation_result");
        self.output_json(result);
    }

    #[instrument(skip_all)]
    fn version_info(&self, info: &VersionInfo) {
        debug!(version = info.version, "Robot: version_info");
        self.output_json(info);
    }
}
