//! # Correlation Router
//!
//! Emulates request/reply on a broker that is naturally fire-and-forget.
//!
//! A caller publishes a request envelope whose `correlationId` is a fresh
//! request id, subscribes transiently to the reply subject derived from
//! `(service, request id)`, and awaits the first envelope echoing that id.
//! The serving side computes the same reply subject from the request
//! envelope's `producer` and `correlationId`; no extra wire field is needed.
//!
//! Pending requests live in an in-memory table behind a single mutex; a
//! process restart drops them, which callers observe as a timeout. The
//! router never retries: retry policy belongs to the caller.

use crate::config::SyncConfig;
use crate::envelope::{decode, Envelope, SchemaCompat};
use crate::producer::{ProducerAdapter, PublishError};
use crate::topics::{reply_subject, Topic};
use chrono::{DateTime, Utc};
use event_bus::{BusError, EventBus};
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

/// Errors surfaced by `request` / `respond`
#[derive(Debug, thiserror::Error)]
pub enum CorrelationError {
    #[error("no reply on {topic} within {waited:?}")]
    Timeout {
        topic: &'static str,
        waited: Duration,
    },

    #[error(transparent)]
    Publish(#[from] PublishError),

    #[error("failed to subscribe to reply subject: {0}")]
    Subscribe(BusError),

    #[error("envelope carries no correlation id; cannot derive a reply subject")]
    MissingCorrelation,
}

/// One in-flight request, exclusively owned by the router
struct PendingCorrelation {
    #[allow(dead_code)] // diagnostics via `pending`, not read on the hot path
    reply_subject: String,
    #[allow(dead_code)]
    created_at: DateTime<Utc>,
    responder: oneshot::Sender<Envelope>,
}

/// Request/reply emulation beside the producer/consumer pair
///
/// Suspends only the calling task; reply listening happens on background
/// subscriptions independent of any consumer dispatch loop.
pub struct CorrelationRouter {
    bus: Arc<dyn EventBus>,
    producer: ProducerAdapter,
    compat: SchemaCompat,
    default_timeout: Duration,
    pending: Arc<Mutex<HashMap<String, PendingCorrelation>>>,
}

impl CorrelationRouter {
    /// Create a router requesting as the producer's service identity
    pub fn new(bus: Arc<dyn EventBus>, producer: ProducerAdapter, config: &SyncConfig) -> Self {
        Self {
            bus,
            producer,
            compat: config.schema_compat,
            default_timeout: config.correlation_timeout,
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Publish a request and await the matching reply
    ///
    /// Concurrent requests use distinct request ids and reply subjects and
    /// never interfere. On deadline expiry the pending entry is removed and
    /// the transient subscription wound down: the call rejects, it never
    /// hangs.
    ///
    /// # Errors
    /// [`CorrelationError::Timeout`] if no matching reply arrives within
    /// `timeout`; publish/subscribe failures are surfaced as their own
    /// variants.
    pub async fn request(
        &self,
        topic: Topic,
        payload: Value,
        timeout: Duration,
    ) -> Result<Envelope, CorrelationError> {
        let request_id = Uuid::new_v4().to_string();
        let reply = reply_subject(self.producer.service(), &request_id);

        // Arm the reply subscription before publishing, so a fast responder
        // cannot win the race against it.
        let mut stream = self
            .bus
            .subscribe(&reply)
            .await
            .map_err(CorrelationError::Subscribe)?;

        let (responder, receiver) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            pending.insert(
                request_id.clone(),
                PendingCorrelation {
                    reply_subject: reply.clone(),
                    created_at: Utc::now(),
                    responder,
                },
            );
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let pending = Arc::clone(&self.pending);
        let listener_id = request_id.clone();
        let compat = self.compat;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep_until(deadline) => {
                        pending.lock().await.remove(&listener_id);
                        break;
                    }
                    next = stream.next() => match next {
                        Some(msg) => {
                            let envelope = match decode(&msg.payload, compat) {
                                Ok(envelope) => envelope,
                                Err(e) => {
                                    tracing::warn!(error = %e, "ignoring undecodable reply");
                                    continue;
                                }
                            };
                            if envelope.correlation_id.as_deref() == Some(listener_id.as_str()) {
                                if let Some(entry) = pending.lock().await.remove(&listener_id) {
                                    let _ = entry.responder.send(envelope);
                                }
                                break;
                            }
                            tracing::warn!(
                                event_id = %envelope.id,
                                "reply with foreign correlation id on private subject"
                            );
                        }
                        None => break,
                    }
                }
            }
        });

        if let Err(e) = self
            .producer
            .publish_correlated(topic, &request_id, &payload)
            .await
        {
            // Nothing went out; the listener will wind down at its deadline
            self.pending.lock().await.remove(&request_id);
            return Err(e.into());
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(envelope)) => Ok(envelope),
            // Receiver error means the listener gave up first; either way the
            // deadline has passed without a matching reply.
            Ok(Err(_)) | Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(CorrelationError::Timeout {
                    topic: topic.logical_name(),
                    waited: timeout,
                })
            }
        }
    }

    /// `request` with the configured default timeout
    ///
    /// # Errors
    /// As [`CorrelationRouter::request`].
    pub async fn request_with_default(
        &self,
        topic: Topic,
        payload: Value,
    ) -> Result<Envelope, CorrelationError> {
        self.request(topic, payload, self.default_timeout).await
    }

    /// Serve a reply to a request envelope
    ///
    /// Publishes a response envelope echoing the request's correlation id to
    /// the reply subject derived from the request's producer.
    ///
    /// # Errors
    /// [`CorrelationError::MissingCorrelation`] if the envelope was not a
    /// request; publish failures are surfaced as
    /// [`CorrelationError::Publish`].
    pub async fn respond(
        &self,
        request: &Envelope,
        payload: Value,
    ) -> Result<Envelope, CorrelationError> {
        let correlation_id = request
            .correlation_id
            .as_deref()
            .ok_or(CorrelationError::MissingCorrelation)?;

        let reply = reply_subject(&request.producer, correlation_id);
        let envelope = Envelope::new(request.topic.clone(), self.producer.service(), payload)
            .with_correlation_id(correlation_id);

        self.producer.publish_to_subject(&reply, &envelope).await?;

        tracing::debug!(
            event_id = %envelope.id,
            reply_subject = %reply,
            correlation_id = correlation_id,
            "reply published"
        );

        Ok(envelope)
    }

    /// Number of requests currently awaiting a reply
    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }
}
