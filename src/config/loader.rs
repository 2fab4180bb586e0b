//! Loading and saving configuration and state documents.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument, trace};

use super::DriverConfig;
use crate::error::{Result, ResultExt, VmxError};

/// Configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format (.yaml, .yml).
    Yaml,
    /// TOML format (.toml).
    Toml,
}

impl ConfigFormat {
    /// Detect format from file extension.
    ///
    /// Returns `None` if the extension is not recognized.
    #[must_use]
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        trace!(extension = %ext, "Detecting config format from extension");
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    /// Get the canonical file extension for this format.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Toml => "toml",
        }
    }
}

/// Default config location: `<config dir>/vmx/config.toml`.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("vmx").join("config.toml"))
}

fn detect_format(path: &Path) -> Result<ConfigFormat> {
    ConfigFormat::from_extension(path).ok_or_else(|| {
        VmxError::ConfigParse(format!(
            "Unknown config format for '{}': expected .yaml, .yml, or .toml",
            path.display()
        ))
    })
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            VmxError::ConfigNotFound {
                path: path.display().to_string(),
            }
        } else {
            VmxError::Io(e)
        }
    })
}

/// Load a driver configuration from a file.
///
/// The format is chosen by extension (`.yaml`, `.yml` or `.toml`).
///
/// # Errors
///
/// Returns an error if the file cannot be read, the extension is unknown,
/// the content cannot be parsed, or validation fails.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DriverConfig> {
    let path = path.as_ref();
    info!("Loading configuration file");

    let format = detect_format(path)?;
    debug!(format = ?format, "Detected config format");

    let content = read_file(path)?;
    debug!(bytes = content.len(), "Read config file");

    load_config_from_str(&content, format)
}

/// Parse and validate a driver configuration.
///
/// # Errors
///
/// Returns an error if parsing or validation fails.
#[instrument(skip(content), fields(format = ?format, content_len = content.len()))]
pub fn load_config_from_str(content: &str, format: ConfigFormat) -> Result<DriverConfig> {
    let config: DriverConfig = match format {
        ConfigFormat::Yaml if content.trim().is_empty() => DriverConfig::default(),
        ConfigFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| VmxError::ConfigParse(format!("YAML: {e}")))?,
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| VmxError::ConfigParse(format!("TOML: {e}")))?
        }
    };

    config.validate()?;

    info!(
        device_id = %config.device_id,
        send_mode = ?config.send_mode,
        mappings = config.mappings.len(),
        "Configuration loaded and validated"
    );
    Ok(config)
}

/// Save a driver configuration, choosing the format by extension.
///
/// # Errors
///
/// Returns an error if the extension is unknown, serialization fails, or
/// the file cannot be written.
#[instrument(skip(config), fields(path = %path.as_ref().display()))]
pub fn save_config<P: AsRef<Path>>(config: &DriverConfig, path: P) -> Result<()> {
    let path = path.as_ref();
    let format = detect_format(path)?;

    let content = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(config)
            .map_err(|e| VmxError::ConfigParse(format!("YAML: {e}")))?,
        ConfigFormat::Toml => toml::to_string_pretty(config)
            .map_err(|e| VmxError::ConfigParse(format!("TOML: {e}")))?,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
    info!("Configuration saved");
    Ok(())
}

/// Load a timeline or state document from JSON (`.json`) or YAML (anything
/// else).
///
/// # Errors
///
/// Returns `StateParse` if the content cannot be parsed, or an error naming
/// the file if it cannot be read.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_document<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));

    let parsed = if is_json {
        serde_json::from_str(&content)
            .map_err(|e| VmxError::StateParse(format!("{}: {e}", path.display())))?
    } else {
        serde_yaml::from_str(&content)
            .map_err(|e| VmxError::StateParse(format!("{}: {e}", path.display())))?
    };
    debug!(bytes = content.len(), json = is_json, "Loaded document");
    Ok(parsed)
}
