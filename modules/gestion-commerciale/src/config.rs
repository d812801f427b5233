use event_sync::{ConfigError, SyncConfig};

/// Gestion-commerciale service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub sync: SyncConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Config {
            sync: SyncConfig::from_env()?,
        })
    }
}
