//! CLI configuration loaded from environment variables
//!
//! Device settings come from `HANDY_*` variables (see
//! [`DeviceConfig::from_env`]); command-line flags override them.

use anyhow::{Context, Result};
use handysync_shared_config::DeviceConfig;

use crate::cli::Cli;

#[derive(Debug, Clone)]
pub struct Config {
    pub device: DeviceConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let device = DeviceConfig::from_env().context("Failed to load device config")?;
        Ok(Self { device })
    }

    /// Apply command-line overrides and re-validate
    pub fn with_overrides(mut self, cli: &Cli) -> Result<Self> {
        if let Some(url) = &cli.api_url {
            self.device = self.device.with_url(url.as_str());
            self.device
                .validate()
                .context("Invalid --api-url value")?;
        }
        Ok(self)
    }
}
