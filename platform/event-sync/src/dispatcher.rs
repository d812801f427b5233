//! # Consumer Dispatcher
//!
//! Routes every decoded envelope to a registered idempotent handler keyed by
//! `(topic, event type)`. The dispatch table is built explicitly at startup,
//! so what a service consumes, and what it intentionally ignores, is
//! inspectable before the first message arrives.
//!
//! Delivery semantics the dispatcher is written against:
//! - **at-least-once**: duplicate envelope ids are suppressed in-process, and
//!   handlers must still be idempotent on entity id + payload ("already
//!   exists" is success, not an error);
//! - **poison containment**: undecodable messages and messages with no
//!   handler are logged and dropped, never allowed to block a partition;
//! - **error containment**: a handler failure becomes a `failed` sync
//!   outcome, never an exception re-thrown into the broker client;
//! - **deadline**: every handler invocation runs under a hard timeout that
//!   converts a stalled handler into a `failed` outcome instead of a hung
//!   consumer.

use crate::config::SyncConfig;
use crate::envelope::{decode, Envelope, SchemaCompat};
use crate::outcome::emit_outcome;
use crate::producer::ProducerAdapter;
use crate::topics::{Topic, TopicKind};
use async_trait::async_trait;
use event_bus::{BusError, BusMessage, EventBus};
use futures::StreamExt;
use platform_contracts::SyncOutcomeV1;
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

/// How a handler completed
#[derive(Debug)]
pub enum Disposition {
    /// The event was applied, or was already applied, which counts the same
    Completed {
        entity_id: String,
        metadata: Option<Value>,
    },
    /// Local state disagrees with what the event assumed; ask the origin to
    /// reconcile instead of guessing
    Drift { entity_id: String, reason: String },
}

/// A business-logic failure inside a handler
///
/// `retryable = true` signals the origin may safely re-emit the original
/// event.
#[derive(Debug, thiserror::Error)]
#[error("handler failed for {entity_id}: {message}")]
pub struct HandlerFailure {
    pub entity_id: String,
    pub message: String,
    pub retryable: bool,
}

impl HandlerFailure {
    /// A failure re-emitting the event will not fix
    pub fn terminal(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// A transient failure; the origin may re-emit
    pub fn retryable(entity_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            message: message.into(),
            retryable: true,
        }
    }
}

/// An idempotent event handler
///
/// Invoked once per delivery attempt. Implementations must tolerate
/// re-invocation with the same entity id and a semantically identical
/// payload without duplicating side effects.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, envelope: &Envelope) -> Result<Disposition, HandlerFailure>;
}

/// Errors raised while starting the dispatcher
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("failed to subscribe to {topic}: {source}")]
    Subscribe {
        topic: &'static str,
        #[source]
        source: BusError,
    },
}

type DispatchKey = (Topic, Option<String>);

/// Per-service consumer dispatcher
pub struct ConsumerDispatcher {
    bus: Arc<dyn EventBus>,
    producer: ProducerAdapter,
    group: String,
    compat: SchemaCompat,
    handler_timeout: Duration,
    handlers: HashMap<DispatchKey, Arc<dyn EventHandler>>,
    unhandled: HashSet<Topic>,
    seen: Mutex<SeenIds>,
}

impl ConsumerDispatcher {
    /// Create a dispatcher consuming as the configured consumer group
    ///
    /// The `producer` is used to report sync outcomes and carries the
    /// service identity those outcomes are attributed to.
    pub fn new(bus: Arc<dyn EventBus>, producer: ProducerAdapter, config: &SyncConfig) -> Self {
        Self {
            bus,
            producer,
            group: config.consumer_group.clone(),
            compat: config.schema_compat,
            handler_timeout: config.handler_timeout,
            handlers: HashMap::new(),
            unhandled: HashSet::new(),
            seen: Mutex::new(SeenIds::new(SEEN_IDS_CAPACITY)),
        }
    }

    /// Register a handler for every event on a topic
    pub fn register(&mut self, topic: Topic, handler: Arc<dyn EventHandler>) {
        self.handlers.insert((topic, None), handler);
    }

    /// Register a handler for one event type within a topic
    ///
    /// The event type is read from `payload.type`; payloads without one
    /// dispatch under the topic's logical name.
    pub fn register_typed(
        &mut self,
        topic: Topic,
        event_type: &str,
        handler: Arc<dyn EventHandler>,
    ) {
        self.handlers
            .insert((topic, Some(event_type.to_string())), handler);
    }

    /// Declare a topic intentionally unhandled by this service
    ///
    /// A first-class registry entry, not a live no-op handler: messages on
    /// the topic are not even subscribed to, and `coverage` stops reporting
    /// the topic as forgotten.
    pub fn mark_unhandled(&mut self, topic: Topic) {
        self.unhandled.insert(topic);
    }

    /// Domain topics with neither a handler nor an `unhandled` marker
    ///
    /// Services log this at startup; a non-empty list means a registry entry
    /// was forgotten rather than intentionally skipped.
    pub fn coverage(&self) -> Vec<Topic> {
        let handled: HashSet<Topic> = self.handlers.keys().map(|(t, _)| *t).collect();
        Topic::ALL
            .iter()
            .copied()
            .filter(|t| t.kind() == TopicKind::Domain)
            .filter(|t| !handled.contains(t) && !self.unhandled.contains(t))
            .collect()
    }

    /// Subscribe to every registered topic and start consuming
    ///
    /// Spawns one background task per topic subscription. Handler
    /// invocations on one subscription are sequential, which is what makes
    /// the per-key ordering guarantee hold; distinct topics process
    /// concurrently.
    ///
    /// # Errors
    /// Returns [`DispatchError`] if any subscription could not be
    /// established. Already-spawned consumers keep running.
    pub async fn start(self: Arc<Self>) -> Result<(), DispatchError> {
        let topics: HashSet<Topic> = self.handlers.keys().map(|(t, _)| *t).collect();

        for topic in topics {
            let stream = self
                .bus
                .queue_subscribe(topic.subject(), &self.group)
                .await
                .map_err(|source| DispatchError::Subscribe {
                    topic: topic.logical_name(),
                    source,
                })?;

            let dispatcher = Arc::clone(&self);
            tokio::spawn(async move {
                tracing::info!(
                    subject = topic.subject(),
                    group = %dispatcher.group,
                    "consumer started"
                );

                let mut stream = stream;
                while let Some(msg) = stream.next().await {
                    dispatcher.process(topic, &msg).await;
                }

                tracing::warn!(subject = topic.subject(), "consumer stream ended");
            });
        }

        Ok(())
    }

    async fn process(&self, topic: Topic, msg: &BusMessage) {
        let envelope = match decode(&msg.payload, self.compat) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::error!(
                    subject = %msg.subject,
                    error = %e,
                    "dropping undecodable event"
                );
                return;
            }
        };

        let span = tracing::info_span!(
            "process_event",
            event_id = %envelope.id,
            topic = %envelope.topic,
            producer = %envelope.producer,
            correlation_id = %envelope.correlation_id.as_deref().unwrap_or("none")
        );

        self.process_envelope(topic, &envelope).instrument(span).await;
    }

    async fn process_envelope(&self, topic: Topic, envelope: &Envelope) {
        if self.already_seen(envelope.id) {
            tracing::debug!("duplicate delivery skipped");
            return;
        }

        let event_type = envelope
            .event_type()
            .unwrap_or_else(|| topic.logical_name())
            .to_string();

        let handler = self
            .handlers
            .get(&(topic, Some(event_type.clone())))
            .or_else(|| self.handlers.get(&(topic, None)));

        let Some(handler) = handler else {
            // Poison messages must never block the partition: acknowledge
            // and drop.
            tracing::warn!(event_type = %event_type, "no handler registered, dropping event");
            self.mark_seen(envelope.id);
            return;
        };

        let verdict = tokio::time::timeout(self.handler_timeout, handler.handle(envelope)).await;
        self.mark_seen(envelope.id);

        let outcome = match verdict {
            Ok(Ok(Disposition::Completed { entity_id, metadata })) => {
                tracing::info!(entity_id = %entity_id, "event processed");
                SyncOutcomeV1::confirmed(entity_id, self.producer.service(), metadata)
            }
            Ok(Ok(Disposition::Drift { entity_id, reason })) => {
                tracing::warn!(entity_id = %entity_id, reason = %reason, "state drift detected");
                SyncOutcomeV1::reconciliation_requested(entity_id, self.producer.service(), reason)
            }
            Ok(Err(failure)) => {
                tracing::error!(
                    entity_id = %failure.entity_id,
                    retryable = failure.retryable,
                    error = %failure.message,
                    "handler failed"
                );
                SyncOutcomeV1::failed(
                    failure.entity_id,
                    self.producer.service(),
                    failure.message,
                    failure.retryable,
                )
            }
            Err(_) => {
                tracing::error!(
                    timeout_ms = self.handler_timeout.as_millis() as u64,
                    "handler deadline exceeded"
                );
                SyncOutcomeV1::failed(
                    entity_hint(envelope),
                    self.producer.service(),
                    "handler deadline exceeded",
                    true,
                )
            }
        };

        // Outcome channels never confirm themselves, or outcomes would loop
        if topic.kind() == TopicKind::Domain {
            if let Err(e) = emit_outcome(&self.producer, &outcome).await {
                tracing::error!(error = %e, "failed to publish sync outcome");
            }
        }
    }

    fn already_seen(&self, id: Uuid) -> bool {
        self.lock_seen().contains(id)
    }

    fn mark_seen(&self, id: Uuid) {
        self.lock_seen().insert(id);
    }

    fn lock_seen(&self) -> std::sync::MutexGuard<'_, SeenIds> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Best-effort entity id for events whose handler never reported one
/// (deadline overruns). Falls back to the envelope id, which at least keeps
/// the failed outcome traceable.
fn entity_hint(envelope: &Envelope) -> String {
    for field in ["entityId", "userId", "reference", "subscriptionId", "contextId"] {
        if let Some(id) = envelope.payload.get(field).and_then(Value::as_str) {
            return id.to_string();
        }
    }
    envelope.id.to_string()
}

const SEEN_IDS_CAPACITY: usize = 10_000;

/// Bounded in-process record of processed envelope ids
///
/// Suppresses broker redeliveries within one process lifetime. The bound
/// keeps memory flat; once an id ages out, the handler's own idempotency is
/// the remaining (and authoritative) line of defense.
struct SeenIds {
    capacity: usize,
    order: VecDeque<Uuid>,
    ids: HashSet<Uuid>,
}

impl SeenIds {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            ids: HashSet::with_capacity(capacity),
        }
    }

    fn contains(&self, id: Uuid) -> bool {
        self.ids.contains(&id)
    }

    fn insert(&mut self, id: Uuid) {
        if !self.ids.insert(id) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }
}
