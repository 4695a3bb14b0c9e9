//! Loads and validates the gateway's configuration file.

use crate::models::error::GatewayError;
use crate::models::settings::Settings;
use log::warn;
use std::path::{Path, PathBuf};

const CONFIG_PATH_ENV: &str = "KAIROS_CONFIG_PATH";
const DEFAULT_CONFIG_PATH: &str = "./config.json";
const MAX_CONFIG_BYTES: u64 = 10 * 1024 * 1024;

/// Resolves the configuration file path: `KAIROS_CONFIG_PATH` if set,
/// otherwise [`DEFAULT_CONFIG_PATH`].
pub fn config_path() -> PathBuf {
    std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Reads, parses and validates the configuration at `path`.
///
/// `path` is canonicalized and checked against the current working
/// directory before anything is read, so a configured path (e.g. via
/// `KAIROS_CONFIG_PATH`) cannot escape the working directory via `..`
/// traversal.
pub fn load_settings_from(path: &Path) -> Result<Settings, GatewayError> {
    let canonical_path = path.canonicalize().map_err(|e| {
        GatewayError::Config(format!("cannot resolve {}: {}", path.display(), e))
    })?;

    let current_dir = std::env::current_dir()
        .map_err(|e| GatewayError::Config(format!("cannot get current directory: {}", e)))?;

    if !canonical_path.starts_with(&current_dir) {
        warn!(
            "configuration path '{}' is outside the working directory",
            path.display()
        );
        return Err(GatewayError::Config(format!(
            "configuration path '{}' is outside the working directory",
            path.display()
        )));
    }

    let metadata = std::fs::metadata(&canonical_path).map_err(|e| {
        GatewayError::Config(format!("cannot read {}: {}", canonical_path.display(), e))
    })?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(GatewayError::Config(format!(
            "{} is {} bytes, exceeding the {} byte limit",
            canonical_path.display(),
            metadata.len(),
            MAX_CONFIG_BYTES
        )));
    }

    let content = std::fs::read_to_string(&canonical_path).map_err(|e| {
        GatewayError::Config(format!("cannot read {}: {}", canonical_path.display(), e))
    })?;

    let settings: Settings = serde_json::from_str(&content)
        .map_err(|e| GatewayError::Config(format!("invalid configuration JSON: {}", e)))?;

    settings
        .validate()
        .map_err(GatewayError::Config)?;

    Ok(settings)
}

/// Loads settings from [`config_path`].
pub fn load_settings() -> Result<Settings, GatewayError> {
    load_settings_from(&config_path())
}
