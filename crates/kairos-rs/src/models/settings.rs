use crate::middleware::rate_limit::RateLimitConfig;
use crate::models::router::RouteConfig;
use crate::services::health::HealthConfig;
use serde::{Deserialize, Serialize};

/// Application configuration settings for the kairos-rs gateway.
///
/// This structure contains the complete configuration needed to run the
/// gateway: version information, route definitions, rate limiting and
/// health-checking policy. The configuration is loaded from a JSON file
/// and validated before use.
///
/// # Configuration File Format
///
/// ```json
/// {
///   "version": 1,
///   "routes": [
///     {
///       "path": "/api/users",
///       "headers": { "x-api-key": "*" },
///       "backends": [
///         { "id": "http://backend-1:8080", "weight": 2 },
///         { "id": "http://backend-2:8080", "weight": 1 }
///       ],
///       "strategy": "weighted"
///     }
///   ]
/// }
/// ```
///
/// # Examples
///
/// Loading and validating settings:
/// ```rust
/// # use std::fs;
/// # let config_content = r#"{"version": 1, "routes": []}"#;
/// # fs::write("./config.json", config_content).unwrap();
/// use kairos_rs::config::settings::load_settings;
///
/// let settings = load_settings().expect("Failed to load configuration");
/// settings.validate().expect("Invalid configuration");
/// println!("Loaded {} routes", settings.routes.len());
/// # fs::remove_file("./config.json").ok();
/// ```
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Settings {
    /// Configuration schema version for compatibility checking.
    pub version: u8,

    /// Route definitions. The router builds its route table from this
    /// list on load and on every hot reload.
    pub routes: Vec<RouteConfig>,

    /// Rate limiting configuration. If absent, rate limiting is disabled.
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,

    /// Health checking configuration. If absent, active probing is
    /// disabled and only passive outcome tracking runs with defaults.
    #[serde(default)]
    pub health: Option<HealthConfig>,
}

impl Settings {
    /// Validates the route list and every route within it.
    ///
    /// # Validation Process
    ///
    /// 1. The top-level route list must be non-empty.
    /// 2. Each route's path, headers and backend list are validated via
    ///    [`RouteConfig::validate`].
    /// 3. Validation stops at the first failure; the error identifies the
    ///    offending route by index.
    ///
    /// # Errors
    ///
    /// Returns a textual error identifying the offending route index.
    pub fn validate(&self) -> Result<(), String> {
        if self.routes.is_empty() {
            return Err("configuration must declare at least one route".to_string());
        }

        for (i, route) in self.routes.iter().enumerate() {
            route
                .validate()
                .map_err(|e| format!("route[{}] ({}): {}", i, route.path, e))?;
        }

        Ok(())
    }
}
