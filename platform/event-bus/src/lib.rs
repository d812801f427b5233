//! # EventBus Abstraction
//!
//! A platform-level abstraction for event-driven messaging across services.
//!
//! ## Why This Lives in Tier 1
//!
//! The EventBus is a **shared runtime capability** every service depends on.
//! Placing it in `platform/` allows:
//! - Services to depend on platform crates without circular dependencies
//! - Config-driven swap between NATS (production) and InMemory (dev/test)
//! - One wildcard/queue-group semantic shared by every consumer
//!
//! ## Implementations
//!
//! - **NatsBus**: production implementation wrapping an `async_nats::Client`
//!   owned by the caller (construct it once per process, pass it in)
//! - **InMemoryBus**: test/dev implementation using in-memory channels with
//!   the same wildcard and queue-group semantics
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{EventBus, NatsBus, InMemoryBus};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Production: NATS
//! let nats_client = async_nats::connect("nats://localhost:4222").await?;
//! let bus: Arc<dyn EventBus> = Arc::new(NatsBus::new(nats_client));
//!
//! // Dev/Test: In-Memory
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//!
//! // Publish an event, keyed so all events for the same entity stay ordered
//! bus.publish_with_key("customer.events.token.alert", "user-1", b"{}".to_vec())
//!     .await?;
//!
//! // Consume as part of a consumer group: each message goes to one member
//! let mut stream = bus.queue_subscribe("customer.events.>", "customer-workers").await?;
//! while let Some(msg) = futures::StreamExt::next(&mut stream).await {
//!     println!("Received {} bytes on {}", msg.payload.len(), msg.subject);
//! }
//! # Ok(())
//! # }
//! ```

mod inmemory_bus;
mod nats_bus;

pub use inmemory_bus::InMemoryBus;
pub use nats_bus::NatsBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::fmt;

/// Header carrying the per-entity ordering key on brokers that support headers.
pub const ORDERING_KEY_HEADER: &str = "X-Ordering-Key";

/// A message received from the event bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The subject/topic this message was published to
    pub subject: String,
    /// The message payload (raw bytes)
    pub payload: Vec<u8>,
    /// Ordering key: messages sharing a key on a subject are delivered in
    /// publish order to a given consumer
    pub key: Option<String>,
    /// Optional headers
    pub headers: Option<std::collections::HashMap<String, String>>,
    /// Optional reply-to subject (for request-response patterns)
    pub reply_to: Option<String>,
}

impl BusMessage {
    /// Create a new bus message
    pub fn new(subject: String, payload: Vec<u8>) -> Self {
        Self {
            subject,
            payload,
            key: None,
            headers: None,
            reply_to: None,
        }
    }

    /// Attach an ordering key
    pub fn with_key(mut self, key: String) -> Self {
        self.key = Some(key);
        self
    }

    /// Attach headers
    pub fn with_headers(mut self, headers: std::collections::HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }

    /// Attach a reply-to subject
    pub fn with_reply_to(mut self, reply_to: String) -> Self {
        self.reply_to = Some(reply_to);
        self
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to subject: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid subject pattern: {0}")]
    InvalidSubject(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Core event bus abstraction for publish-subscribe messaging
///
/// All implementations must preserve publish order per subject for a given
/// subscriber; no ordering is guaranteed across subjects.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a message to a subject
    ///
    /// Fire-and-forget at the application level: a successful return means
    /// the transport accepted the message, not that any consumer processed it.
    ///
    /// # Errors
    /// Returns `BusError` if the transport rejected the publish.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Publish a message with an ordering key
    ///
    /// The key identifies the entity the message belongs to. Consumers
    /// processing one subject sequentially therefore observe all messages for
    /// that entity in publish order.
    ///
    /// # Errors
    /// Returns `BusError` if the transport rejected the publish.
    async fn publish_with_key(&self, subject: &str, key: &str, payload: Vec<u8>) -> BusResult<()>;

    /// Subscribe to messages matching a subject pattern
    ///
    /// Every subscriber receives its own copy of each matching message.
    /// Patterns support NATS-style wildcards:
    /// - `*` matches a single token (e.g., `auth.*.created`)
    /// - `>` matches one or more trailing tokens (e.g., `auth.events.>`)
    ///
    /// # Errors
    /// Returns `BusError` if the subscription could not be established.
    async fn subscribe(&self, pattern: &str) -> BusResult<BoxStream<'static, BusMessage>>;

    /// Subscribe as a member of a consumer group
    ///
    /// Each matching message is delivered to exactly one member of the group,
    /// so a service can scale out consumers without double-processing.
    ///
    /// # Errors
    /// Returns `BusError` if the subscription could not be established.
    async fn queue_subscribe(
        &self,
        pattern: &str,
        group: &str,
    ) -> BusResult<BoxStream<'static, BusMessage>>;
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}
