//! Device session configuration types

use std::fmt;

use url::Url;

use crate::{get_env_or_default, get_required_env, parse_env, parse_optional_env};
use crate::{ConfigError, ConfigResult};

/// Default REST endpoint of the device cloud API
pub const DEFAULT_API_URL: &str = "https://www.handyfeeling.com/api/handy-rest/v3";

/// Default number of probes per clock sync round
pub const DEFAULT_SYNC_SAMPLES: usize = 10;

/// Default smoothing coefficient for video time resync
pub const DEFAULT_SYNC_FILTER: f64 = 0.5;

/// Configuration for one device session
#[derive(Clone)]
pub struct DeviceConfig {
    /// Base URL of the device API
    pub api_url: String,

    /// Application credential, sent as a bearer token
    pub app_key: String,

    /// Connection key identifying the device
    pub connection_key: String,

    /// Optional request timeout in seconds (unset means no client timeout)
    pub timeout_secs: Option<u64>,

    /// Number of probes per clock sync round
    pub sync_samples: usize,

    /// Resync smoothing coefficient (0 = ignore new sample, 1 = snap to it)
    pub sync_filter: f64,
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("api_url", &self.api_url)
            .field("app_key", &"[REDACTED]")
            .field("connection_key", &"[REDACTED]")
            .field("timeout_secs", &self.timeout_secs)
            .field("sync_samples", &self.sync_samples)
            .field("sync_filter", &self.sync_filter)
            .finish()
    }
}

impl DeviceConfig {
    /// Load device configuration from environment variables
    ///
    /// `HANDY_APP_KEY` and `HANDY_CONNECTION_KEY` are required.
    pub fn from_env() -> ConfigResult<Self> {
        let config = Self {
            api_url: get_env_or_default("HANDY_API_URL", DEFAULT_API_URL),
            app_key: get_required_env("HANDY_APP_KEY")?,
            connection_key: get_required_env("HANDY_CONNECTION_KEY")?,
            timeout_secs: parse_optional_env("HANDY_TIMEOUT_SECS")?,
            sync_samples: parse_env("HANDY_SYNC_SAMPLES", DEFAULT_SYNC_SAMPLES)?,
            sync_filter: parse_env("HANDY_SYNC_FILTER", DEFAULT_SYNC_FILTER)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Create a configuration with explicit credentials and defaults for everything else
    pub fn new(app_key: impl Into<String>, connection_key: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            app_key: app_key.into(),
            connection_key: connection_key.into(),
            timeout_secs: None,
            sync_samples: DEFAULT_SYNC_SAMPLES,
            sync_filter: DEFAULT_SYNC_FILTER,
        }
    }

    /// Point the configuration at a different API (useful for testing)
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Check that the configuration can be used to open a session
    pub fn validate(&self) -> ConfigResult<()> {
        Url::parse(&self.api_url)
            .map_err(|e| ConfigError::InvalidUrl("HANDY_API_URL".to_string(), e.to_string()))?;

        if self.app_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "HANDY_APP_KEY".to_string(),
                "application key cannot be empty".to_string(),
            ));
        }

        if self.connection_key.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "HANDY_CONNECTION_KEY".to_string(),
                "connection key cannot be empty".to_string(),
            ));
        }

        if self.sync_samples == 0 {
            return Err(ConfigError::OutOfRange {
                name: "HANDY_SYNC_SAMPLES".to_string(),
                value: "0".to_string(),
                expected: "at least 1".to_string(),
            });
        }

        if !(0.0..=1.0).contains(&self.sync_filter) {
            return Err(ConfigError::OutOfRange {
                name: "HANDY_SYNC_FILTER".to_string(),
                value: self.sync_filter.to_string(),
                expected: "between 0.0 and 1.0".to_string(),
            });
        }

        Ok(())
    }

    /// Build the full URL for an API path
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Get the full URL for the server time endpoint
    pub fn server_time_url(&self) -> String {
        self.endpoint("servertime")
    }

    /// Get the full URL for the event stream endpoint (without query)
    pub fn events_url(&self) -> String {
        self.endpoint("sse")
    }
}
