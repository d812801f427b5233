use event_sync::{ConfigError, SyncConfig};
use std::env;

/// Portfolio service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub sync: SyncConfig,
    /// Resubmission attempts before a pending funding saga is given up on
    pub funding_max_attempts: u32,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let sync = SyncConfig::from_env()?;

        let funding_max_attempts = match env::var("FUNDING_MAX_ATTEMPTS") {
            Err(_) => 5,
            Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "FUNDING_MAX_ATTEMPTS",
                value,
                expected: "an attempt count",
            })?,
        };

        Ok(Config {
            sync,
            funding_max_attempts,
        })
    }
}
