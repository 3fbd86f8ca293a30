//! Config - Provider configuration block

use std::time::Duration;

use exoform_core::timeouts::DEFAULT_TIMEOUT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Zone used by resources that do not name one
pub const DEFAULT_ZONE: &str = "ch-gva-2";

/// API environment prefix of the endpoint host name
pub const DEFAULT_ENVIRONMENT: &str = "api";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("missing Exoscale API credentials: set {0}")]
    MissingCredentials(&'static str),

    #[error("invalid provider configuration: {0}")]
    Invalid(String),
}

/// Provider settings; credentials are supplied separately
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    #[serde(default = "default_zone")]
    pub zone: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Deadline of every lifecycle phase without its own timeout
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_zone() -> String {
    DEFAULT_ZONE.to_string()
}

fn default_environment() -> String {
    DEFAULT_ENVIRONMENT.to_string()
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            zone: default_zone(),
            environment: default_environment(),
            timeout: default_timeout(),
        }
    }
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.zone.is_empty() {
            return Err(ConfigError::Invalid("zone must not be empty".to_string()));
        }
        if self.environment.is_empty() {
            return Err(ConfigError::Invalid(
                "environment must not be empty".to_string(),
            ));
        }
        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout must be positive".to_string()));
        }
        Ok(())
    }
}
