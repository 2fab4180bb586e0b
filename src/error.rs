//! Error types for vMix driver operations.

use thiserror::Error;

/// Primary error type for scheduling and reconciliation.
#[derive(Error, Debug)]
pub enum VmxError {
    // Scheduler errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Driver errors
    #[error("Device '{device_id}' is not initialized")]
    NotInitialized { device_id: String },

    #[error("Command {command} failed: {reason}")]
    CommandFailure { command: String, reason: String },

    #[error("Timing violation: {0}")]
    TimingViolation(String),

    #[error("Device communication error: {0}")]
    DeviceCommunication(String),

    // Configuration errors
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("State file parse error: {0}")]
    StateParse(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl VmxError {
    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigParse(_)
                | Self::ConfigInvalid(_)
                | Self::StateParse(_)
                | Self::NotInitialized { .. }
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => Some("Pass --config or set VMX_CONFIG"),
            Self::ConfigInvalid(_) => Some("Run: vmx check-config"),
            Self::NotInitialized { .. } => Some("Wait for the device to connect before applying state"),
            Self::StateParse(_) => Some("State and timeline files must be YAML or JSON"),
            _ => None,
        }
    }
}

/// Convenience type alias for Results using VmxError.
pub type Result<T> = std::result::Result<T, VmxError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| VmxError::Other(format!("{}: {e}", f().into())))
    }
}
