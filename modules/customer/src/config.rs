use event_sync::{ConfigError, SyncConfig};
use std::env;

/// Customer service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub sync: SyncConfig,
    /// Balance below which a `token.alert` is emitted
    pub low_balance_threshold: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let sync = SyncConfig::from_env()?;

        let low_balance_threshold = match env::var("LOW_BALANCE_THRESHOLD") {
            Err(_) => 10,
            Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "LOW_BALANCE_THRESHOLD",
                value,
                expected: "an integer token amount",
            })?,
        };

        Ok(Config {
            sync,
            low_balance_threshold,
        })
    }
}
