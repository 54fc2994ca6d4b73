//! Runtime configuration.
//!
//! The directions credential is injected here at startup and never
//! appears in source, request logs, or `Debug` output.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

pub const DEFAULT_DIRECTIONS_ENDPOINT: &str =
    "https://maps.googleapis.com/maps/api/directions/json";
pub const DEFAULT_REFRESH_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

const ENV_API_KEY: &str = "WALKGUIDE_API_KEY";
const ENV_ENDPOINT: &str = "WALKGUIDE_DIRECTIONS_ENDPOINT";
const ENV_REFRESH_INTERVAL: &str = "WALKGUIDE_REFRESH_INTERVAL_MS";

#[derive(Clone, Deserialize)]
pub struct GuidanceConfig {
    #[serde(default = "default_endpoint")]
    pub directions_endpoint: String,
    pub api_key: String,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_endpoint() -> String {
    DEFAULT_DIRECTIONS_ENDPOINT.to_string()
}

fn default_refresh_interval_ms() -> u64 {
    DEFAULT_REFRESH_INTERVAL_MS
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

impl GuidanceConfig {
    /// Config with default endpoint and timings.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            directions_endpoint: default_endpoint(),
            api_key: api_key.into(),
            refresh_interval_ms: DEFAULT_REFRESH_INTERVAL_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    /// Parse config from a JSON document, e.g. one handed over by the host app.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Build config from `WALKGUIDE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var(ENV_API_KEY).map_err(|_| ConfigError::MissingApiKey)?;
        let mut config = Self::new(api_key);

        if let Ok(endpoint) = std::env::var(ENV_ENDPOINT) {
            config.directions_endpoint = endpoint;
        }
        if let Ok(raw) = std::env::var(ENV_REFRESH_INTERVAL) {
            config.refresh_interval_ms = raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: ENV_REFRESH_INTERVAL,
                value: raw.clone(),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.refresh_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "refresh_interval_ms",
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl fmt::Debug for GuidanceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuidanceConfig")
            .field("directions_endpoint", &self.directions_endpoint)
            .field("api_key", &"<redacted>")
            .field("refresh_interval_ms", &self.refresh_interval_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .finish()
    }
}
