//! # Event Synchronization Protocol
//!
//! The conventions that keep independently deployed services consistent
//! without a shared database, layered on the [`event_bus`] abstraction:
//!
//! - **Envelope codec** ([`envelope`]): the standardized wrapper every
//!   cross-service event travels in, with schema-version gating.
//! - **Topic registry** ([`topics`]): the static catalog mapping logical
//!   event names to physical broker subjects, shared by producers and
//!   consumers so the mapping never drifts.
//! - **Producer adapter** ([`producer`]): the only component that publishes;
//!   fire-and-forget with typed transport errors, keyed by entity id where
//!   per-entity ordering matters.
//! - **Consumer dispatcher** ([`dispatcher`]): an explicit dispatch table
//!   routing decoded envelopes to idempotent handlers, with duplicate-
//!   delivery suppression, hard handler deadlines, and poison-message
//!   containment.
//! - **Correlation router** ([`correlation`]): request/reply emulated on the
//!   fire-and-forget broker via ephemeral reply subjects and a pending table.
//! - **Sync outcomes** ([`outcome`]): confirmation/failure/reconciliation
//!   events emitted after processing, plus the origin-side ledger and the
//!   periodic reconciliation sweep that re-drives stragglers.
//!
//! Broker semantics are at-least-once: handlers must be idempotent, and the
//! only ordering guarantee is per ordering key within one subject.

pub mod config;
pub mod correlation;
pub mod dispatcher;
pub mod envelope;
pub mod outcome;
pub mod producer;
pub mod retry;
pub mod topics;

pub use config::{BusType, ConfigError, SyncConfig};
pub use correlation::{CorrelationError, CorrelationRouter};
pub use dispatcher::{
    ConsumerDispatcher, DispatchError, Disposition, EventHandler, HandlerFailure,
};
pub use envelope::{decode, encode, Envelope, EnvelopeError, SchemaCompat, SCHEMA_VERSION};
pub use outcome::{emit_outcome, OutcomeLedger, ReconciliationSweep};
pub use producer::{ProducerAdapter, PublishError};
pub use retry::{retry_with_backoff, RetryConfig};
pub use topics::{reply_subject, Topic, TopicKind};
