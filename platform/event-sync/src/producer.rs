//! # Producer Adapter
//!
//! The per-service component that emits envelopes onto the broker. It owns
//! the service identity stamped into every envelope and is the only
//! component allowed to publish.
//!
//! Publishing is fire-and-forget: a successful return means the transport
//! accepted the message, nothing more. Eventual success is observed through
//! sync outcomes or the next choreography step, never through the publish
//! call. The adapter performs no retries; a transport failure surfaces as
//! [`PublishError::Transport`] and the caller decides whether to retry, drop
//! or escalate.

use crate::envelope::{encode, Envelope, EnvelopeError};
use crate::topics::Topic;
use event_bus::{BusError, EventBus};
use serde::Serialize;
use std::sync::Arc;

/// Per-service publishing adapter
#[derive(Clone)]
pub struct ProducerAdapter {
    bus: Arc<dyn EventBus>,
    service: String,
}

/// Errors surfaced by a publish attempt
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to encode payload for {topic}: {source}")]
    Encode {
        topic: &'static str,
        #[source]
        source: EnvelopeError,
    },

    #[error("transport rejected publish to {subject}: {source}")]
    Transport {
        subject: String,
        #[source]
        source: BusError,
    },
}

impl ProducerAdapter {
    /// Create an adapter publishing as `service`
    pub fn new(bus: Arc<dyn EventBus>, service: impl Into<String>) -> Self {
        Self {
            bus,
            service: service.into(),
        }
    }

    /// The service identity stamped into emitted envelopes
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Publish a fire-and-forget event
    ///
    /// # Errors
    /// Returns [`PublishError`] if encoding fails or the transport rejects
    /// the message.
    pub async fn publish<T: Serialize>(
        &self,
        topic: Topic,
        payload: &T,
    ) -> Result<Envelope, PublishError> {
        self.emit(topic, None, None, payload).await
    }

    /// Publish with an ordering key, so all events for one entity reach a
    /// consumer in publish order
    ///
    /// # Errors
    /// Returns [`PublishError`] if encoding fails or the transport rejects
    /// the message.
    pub async fn publish_keyed<T: Serialize>(
        &self,
        topic: Topic,
        key: &str,
        payload: &T,
    ) -> Result<Envelope, PublishError> {
        self.emit(topic, Some(key), None, payload).await
    }

    /// Publish a request envelope carrying a correlation id
    ///
    /// # Errors
    /// Returns [`PublishError`] if encoding fails or the transport rejects
    /// the message.
    pub async fn publish_correlated<T: Serialize>(
        &self,
        topic: Topic,
        correlation_id: &str,
        payload: &T,
    ) -> Result<Envelope, PublishError> {
        self.emit(topic, None, Some(correlation_id), payload).await
    }

    /// Publish an already-built envelope to a raw subject
    ///
    /// Used for reply subjects, which are transient and not registry entries.
    ///
    /// # Errors
    /// Returns [`PublishError`] if encoding fails or the transport rejects
    /// the message.
    pub async fn publish_to_subject(
        &self,
        subject: &str,
        envelope: &Envelope,
    ) -> Result<(), PublishError> {
        let bytes = encode(envelope).map_err(|source| PublishError::Encode {
            topic: "reply",
            source,
        })?;

        self.bus
            .publish(subject, bytes)
            .await
            .map_err(|source| PublishError::Transport {
                subject: subject.to_string(),
                source,
            })
    }

    async fn emit<T: Serialize>(
        &self,
        topic: Topic,
        key: Option<&str>,
        correlation_id: Option<&str>,
        payload: &T,
    ) -> Result<Envelope, PublishError> {
        let value = serde_json::to_value(payload).map_err(|e| PublishError::Encode {
            topic: topic.logical_name(),
            source: EnvelopeError::Serialization(e.to_string()),
        })?;

        let mut envelope = Envelope::new(topic.logical_name(), &self.service, value);
        if let Some(correlation_id) = correlation_id {
            envelope = envelope.with_correlation_id(correlation_id);
        }

        let bytes = encode(&envelope).map_err(|source| PublishError::Encode {
            topic: topic.logical_name(),
            source,
        })?;

        let subject = topic.subject();
        let result = match key {
            Some(key) => self.bus.publish_with_key(subject, key, bytes).await,
            None => self.bus.publish(subject, bytes).await,
        };

        result.map_err(|source| {
            tracing::error!(
                event_id = %envelope.id,
                subject = subject,
                error = %source,
                "failed to publish event"
            );
            PublishError::Transport {
                subject: subject.to_string(),
                source,
            }
        })?;

        tracing::debug!(
            event_id = %envelope.id,
            topic = topic.logical_name(),
            subject = subject,
            "event published"
        );

        Ok(envelope)
    }
}
