//! Environment configuration for the synchronization core
//!
//! Recognized variables:
//!
//! | Variable                 | Default                 | Meaning                              |
//! |--------------------------|-------------------------|--------------------------------------|
//! | `SERVICE_NAME`           | (required)              | Client identity stamped on envelopes |
//! | `CONSUMER_GROUP`         | `<service>-workers`     | Consumer-group identity              |
//! | `BROKER_URLS`            | `nats://localhost:4222` | Comma-separated bootstrap addresses  |
//! | `BUS_TYPE`               | `inmemory`              | `nats` or `inmemory`                 |
//! | `SCHEMA_COMPAT`          | `strict`                | `strict` or `permissive`             |
//! | `CORRELATION_TIMEOUT_MS` | `5000`                  | Default request/reply deadline       |
//! | `HANDLER_TIMEOUT_MS`     | `10000`                 | Hard deadline per handler call       |
//! | `SYNC_SLA_MS`            | `30000`                 | Window before an entity is a straggler |
//! | `SWEEP_INTERVAL_MS`      | `5000`                  | Reconciliation sweep cadence         |

use crate::envelope::SchemaCompat;
use std::env;
use std::time::Duration;

/// Which EventBus implementation a service runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusType {
    Nats,
    InMemory,
}

impl BusType {
    fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "nats" => BusType::Nats,
            "inmemory" => BusType::InMemory,
            other => {
                tracing::warn!(value = other, "unknown BUS_TYPE, defaulting to inmemory");
                BusType::InMemory
            }
        }
    }
}

/// Errors raised while reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value `{value}`: expected {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Configuration surface consumed by the synchronization core
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub broker_urls: Vec<String>,
    pub bus_type: BusType,
    pub service_name: String,
    pub consumer_group: String,
    pub schema_compat: SchemaCompat,
    pub correlation_timeout: Duration,
    pub handler_timeout: Duration,
    pub sync_sla: Duration,
    pub sweep_interval: Duration,
}

impl SyncConfig {
    /// Read configuration from process environment variables
    ///
    /// # Errors
    /// Returns [`ConfigError`] if `SERVICE_NAME` is unset or a value fails
    /// to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    ///
    /// Exists so tests can exercise parsing without mutating the process
    /// environment.
    ///
    /// # Errors
    /// As [`SyncConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let service_name = lookup("SERVICE_NAME").ok_or(ConfigError::Missing("SERVICE_NAME"))?;

        let consumer_group =
            lookup("CONSUMER_GROUP").unwrap_or_else(|| format!("{service_name}-workers"));

        let broker_urls: Vec<String> = lookup("BROKER_URLS")
            .unwrap_or_else(|| "nats://localhost:4222".to_string())
            .split(',')
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();

        let bus_type = BusType::parse(&lookup("BUS_TYPE").unwrap_or_else(|| "inmemory".to_string()));

        let schema_compat = match lookup("SCHEMA_COMPAT") {
            None => SchemaCompat::Strict,
            Some(value) => SchemaCompat::parse(&value).ok_or(ConfigError::Invalid {
                name: "SCHEMA_COMPAT",
                value,
                expected: "strict or permissive",
            })?,
        };

        Ok(Self {
            broker_urls,
            bus_type,
            service_name,
            consumer_group,
            schema_compat,
            correlation_timeout: duration_var(&lookup, "CORRELATION_TIMEOUT_MS", 5_000)?,
            handler_timeout: duration_var(&lookup, "HANDLER_TIMEOUT_MS", 10_000)?,
            sync_sla: duration_var(&lookup, "SYNC_SLA_MS", 30_000)?,
            sweep_interval: duration_var(&lookup, "SWEEP_INTERVAL_MS", 5_000)?,
        })
    }
}

fn duration_var(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default_ms: u64,
) -> Result<Duration, ConfigError> {
    match lookup(name) {
        None => Ok(Duration::from_millis(default_ms)),
        Some(value) => value
            .parse::<u64>()
            .map(Duration::from_millis)
            .map_err(|_| ConfigError::Invalid {
                name,
                value,
                expected: "a duration in milliseconds",
            }),
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;

    /// In-memory configuration for unit tests
    pub fn test_config(service: &str) -> SyncConfig {
        SyncConfig {
            broker_urls: vec!["nats://localhost:4222".to_string()],
            bus_type: BusType::InMemory,
            service_name: service.to_string(),
            consumer_group: format!("{service}-workers"),
            schema_compat: SchemaCompat::Strict,
            correlation_timeout: Duration::from_millis(500),
            handler_timeout: Duration::from_millis(500),
            sync_sla: Duration::from_millis(100),
            sweep_interval: Duration::from_millis(50),
        }
    }

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config =
            SyncConfig::from_lookup(lookup_from(&[("SERVICE_NAME", "customer")])).unwrap();

        assert_eq!(config.service_name, "customer");
        assert_eq!(config.consumer_group, "customer-workers");
        assert_eq!(config.broker_urls, vec!["nats://localhost:4222"]);
        assert_eq!(config.bus_type, BusType::InMemory);
        assert_eq!(config.schema_compat, SchemaCompat::Strict);
        assert_eq!(config.correlation_timeout, Duration::from_millis(5_000));
        assert_eq!(config.handler_timeout, Duration::from_millis(10_000));
    }

    #[test]
    fn test_service_name_required() {
        let err = SyncConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SERVICE_NAME")));
    }

    #[test]
    fn test_broker_urls_split_and_trimmed() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("SERVICE_NAME", "portfolio"),
            ("BROKER_URLS", "nats://a:4222, nats://b:4222"),
            ("BUS_TYPE", "nats"),
        ]))
        .unwrap();

        assert_eq!(config.bus_type, BusType::Nats);
        assert_eq!(config.broker_urls, vec!["nats://a:4222", "nats://b:4222"]);
    }

    #[test]
    fn test_invalid_schema_compat_rejected() {
        let err = SyncConfig::from_lookup(lookup_from(&[
            ("SERVICE_NAME", "customer"),
            ("SCHEMA_COMPAT", "lenient"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { name: "SCHEMA_COMPAT", .. }));
    }

    #[test]
    fn test_invalid_duration_rejected() {
        let err = SyncConfig::from_lookup(lookup_from(&[
            ("SERVICE_NAME", "customer"),
            ("HANDLER_TIMEOUT_MS", "fast"),
        ]))
        .unwrap_err();

        assert!(matches!(err, ConfigError::Invalid { name: "HANDLER_TIMEOUT_MS", .. }));
    }

    #[test]
    fn test_unknown_bus_type_defaults_to_inmemory() {
        let config = SyncConfig::from_lookup(lookup_from(&[
            ("SERVICE_NAME", "customer"),
            ("BUS_TYPE", "kafka"),
        ]))
        .unwrap();

        assert_eq!(config.bus_type, BusType::InMemory);
    }
}
