//! # Event Envelope
//!
//! Platform-wide envelope specification for all inter-service communication.
//!
//! ## Envelope Fields
//!
//! - `id`: unique event identifier (idempotency key)
//! - `topic`: logical event name from the topic registry
//! - `schemaVersion`: semver of the envelope contract; incompatible majors
//!   are rejected on decode
//! - `producer`: service that emitted the event
//! - `correlationId`: present on request envelopes and echoed on replies
//! - `timestamp`: producer-side emission time, for drift/latency diagnostics
//!   only, never an ordering signal
//! - `payload`: event-specific data
//!
//! Encoding and decoding are pure transformations; unknown payload fields
//! survive decode untouched, which is what keeps minor-version producers and
//! consumers compatible.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Version of the envelope contract spoken by this codec
pub const SCHEMA_VERSION: &str = "1.0.0";

const SUPPORTED_MAJOR: u64 = 1;

/// How the decoder treats envelopes from another major version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchemaCompat {
    /// Reject envelopes whose major version differs (default)
    #[default]
    Strict,
    /// Log the mismatch and decode best-effort
    Permissive,
}

impl SchemaCompat {
    /// Parse a configuration value (`strict` / `permissive`)
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "permissive" => Some(Self::Permissive),
            _ => None,
        }
    }
}

/// Standard event envelope wrapping every event published across service
/// boundaries
///
/// Immutable once published: consumers never mutate an envelope, they decode
/// it, act on it, and emit new events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unique event identifier, generated by the producer
    pub id: Uuid,

    /// Logical topic name (one entry of the topic registry)
    pub topic: String,

    /// Semantic version of the envelope contract
    pub schema_version: String,

    /// Stable identity of the emitting service
    pub producer: String,

    /// Links a request envelope to its eventual reply
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Producer-side emission time
    pub timestamp: DateTime<Utc>,

    /// Event-specific payload
    pub payload: Value,
}

impl Envelope {
    /// Create a new envelope with a fresh id and the current schema version
    pub fn new(topic: impl Into<String>, producer: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            schema_version: SCHEMA_VERSION.to_string(),
            producer: producer.into(),
            correlation_id: None,
            timestamp: Utc::now(),
            payload,
        }
    }

    /// Set an explicit event id (useful for testing)
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = id;
        self
    }

    /// Set the correlation id
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Event type discriminator, when the payload carries one
    ///
    /// Topics with a single payload shape omit it; the dispatcher then falls
    /// back to the topic's logical name.
    pub fn event_type(&self) -> Option<&str> {
        self.payload.get("type").and_then(Value::as_str)
    }
}

/// Errors raised while decoding or encoding an envelope
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("envelope is not valid JSON: {0}")]
    Malformed(String),

    #[error("envelope missing required field `{0}`")]
    MissingField(&'static str),

    #[error("incompatible schema version {found} (this codec speaks major {supported_major})")]
    IncompatibleSchema { found: String, supported_major: u64 },

    #[error("failed to serialize envelope: {0}")]
    Serialization(String),
}

/// Serialize an envelope to its wire representation
///
/// # Errors
/// Returns [`EnvelopeError::Serialization`] if the payload cannot be
/// serialized (e.g. a map with non-string keys).
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, EnvelopeError> {
    serde_json::to_vec(envelope).map_err(|e| EnvelopeError::Serialization(e.to_string()))
}

/// Parse and validate an envelope from its wire representation
///
/// Validation order: well-formed JSON, required fields (`id`, `topic`,
/// `schemaVersion`), then the major-version gate. In
/// [`SchemaCompat::Permissive`] mode a major mismatch is logged and decoding
/// proceeds best-effort; in [`SchemaCompat::Strict`] mode it is an error.
///
/// # Errors
/// Returns [`EnvelopeError`] describing the first validation failure.
pub fn decode(bytes: &[u8], compat: SchemaCompat) -> Result<Envelope, EnvelopeError> {
    let raw: Value =
        serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

    for field in ["id", "topic", "schemaVersion"] {
        match raw.get(field).and_then(Value::as_str) {
            Some(value) if !value.is_empty() => {}
            _ => return Err(EnvelopeError::MissingField(field)),
        }
    }

    let version = raw
        .get("schemaVersion")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let major = major_version(version)
        .ok_or_else(|| EnvelopeError::Malformed(format!("schemaVersion `{version}` is not semver")))?;

    if major != SUPPORTED_MAJOR {
        match compat {
            SchemaCompat::Strict => {
                return Err(EnvelopeError::IncompatibleSchema {
                    found: version.to_string(),
                    supported_major: SUPPORTED_MAJOR,
                });
            }
            SchemaCompat::Permissive => {
                tracing::warn!(
                    schema_version = version,
                    supported_major = SUPPORTED_MAJOR,
                    "decoding envelope from another schema major in permissive mode"
                );
            }
        }
    }

    serde_json::from_value(raw).map_err(|e| EnvelopeError::Malformed(e.to_string()))
}

fn major_version(version: &str) -> Option<u64> {
    version.split('.').next()?.parse().ok()
}
