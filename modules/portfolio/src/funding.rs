//! Originator side of the funding-request choreography
//!
//! `submit_funding_request` fires `funding.request.created` with a full
//! business snapshot and records the saga as `Submitted`. The record stays
//! pending until a terminal event comes back, matched by the business
//! reference carried in the payload, not by correlation id, since this is
//! choreography rather than request/reply.
//!
//! Terminal states: `Acknowledged` (receiver minted its own identifiers) or
//! `Errored` (structured code). A retryable error, or an acknowledgment that
//! never arrives within the SLA, makes the saga eligible for resubmission:
//! same reference, fresh envelope id.

use chrono::Utc;
use event_sync::{
    Disposition, Envelope, EventHandler, HandlerFailure, ProducerAdapter, PublishError,
    RetryConfig, Topic,
};
use async_trait::async_trait;
use platform_contracts::{
    FundingAcknowledgedV1, FundingCustomerV1, FundingErrorCode, FundingErrorV1, FundingRequestV1,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Where a funding saga stands, as seen by the originator
#[derive(Debug, Clone, PartialEq)]
pub enum SagaState {
    /// Fired, no terminal event yet
    Submitted,
    /// Terminal success; the receiver's own identifier is recorded
    Acknowledged { request_id: String },
    /// Terminal failure
    Errored {
        code: FundingErrorCode,
        retryable: bool,
    },
}

#[derive(Debug, Clone)]
pub struct SagaRecord {
    pub snapshot: FundingRequestV1,
    pub state: SagaState,
    pub attempts: u32,
    submitted_at: Instant,
    next_attempt_at: Instant,
}

enum AckApply {
    Applied { request_id: String },
    AlreadyAcknowledged,
    ConflictingRequestId { existing: String },
    UnknownReference,
}

enum ErrorApply {
    Applied,
    AlreadyErrored,
    AfterAcknowledgment,
    UnknownReference,
}

/// Originator-local saga records, keyed by business reference
#[derive(Debug, Default)]
pub struct FundingSagaStore {
    records: Mutex<HashMap<String, SagaRecord>>,
    sequence: AtomicU64,
}

impl FundingSagaStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_reference(&self) -> String {
        format!("fr-{}", self.sequence.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn record(&self, reference: &str) -> Option<SagaRecord> {
        self.lock().get(reference).cloned()
    }

    pub fn state(&self, reference: &str) -> Option<SagaState> {
        self.lock().get(reference).map(|r| r.state.clone())
    }

    fn insert_submitted(&self, snapshot: FundingRequestV1) {
        let now = Instant::now();
        self.lock().insert(
            snapshot.reference.clone(),
            SagaRecord {
                snapshot,
                state: SagaState::Submitted,
                attempts: 1,
                submitted_at: now,
                next_attempt_at: now,
            },
        );
    }

    fn apply_acknowledgment(&self, ack: &FundingAcknowledgedV1) -> AckApply {
        let mut records = self.lock();
        let Some(record) = records.get_mut(&ack.reference) else {
            return AckApply::UnknownReference;
        };

        match &record.state {
            SagaState::Acknowledged { request_id } if *request_id == ack.request_id => {
                AckApply::AlreadyAcknowledged
            }
            SagaState::Acknowledged { request_id } => AckApply::ConflictingRequestId {
                existing: request_id.clone(),
            },
            _ => {
                record.state = SagaState::Acknowledged {
                    request_id: ack.request_id.clone(),
                };
                AckApply::Applied {
                    request_id: ack.request_id.clone(),
                }
            }
        }
    }

    fn apply_error(&self, error: &FundingErrorV1) -> ErrorApply {
        let mut records = self.lock();
        let Some(record) = records.get_mut(&error.reference) else {
            return ErrorApply::UnknownReference;
        };

        match &record.state {
            SagaState::Acknowledged { .. } => ErrorApply::AfterAcknowledgment,
            SagaState::Errored { .. } => ErrorApply::AlreadyErrored,
            SagaState::Submitted => {
                record.state = SagaState::Errored {
                    code: error.code,
                    retryable: error.retryable,
                };
                ErrorApply::Applied
            }
        }
    }

    /// Sagas eligible for resubmission whose backoff has elapsed
    ///
    /// Eligible: still `Submitted` past the SLA (the terminal event may have
    /// been lost), or `Errored` with `retryable = true`. Each returned saga
    /// has its attempt count advanced; sagas exhausting `max_attempts` stay
    /// terminal and are logged at error level.
    pub fn due_for_resubmit(&self, sla: Duration, retry: &RetryConfig) -> Vec<FundingRequestV1> {
        let now = Instant::now();
        let mut due = Vec::new();
        let mut records = self.lock();

        for (reference, record) in records.iter_mut() {
            let eligible = match &record.state {
                SagaState::Submitted => record.submitted_at.elapsed() >= sla,
                SagaState::Errored { retryable, .. } => *retryable,
                SagaState::Acknowledged { .. } => false,
            };
            if !eligible || now < record.next_attempt_at {
                continue;
            }
            if record.attempts >= retry.max_attempts {
                tracing::error!(
                    reference = %reference,
                    attempts = record.attempts,
                    "giving up on funding request resubmission"
                );
                record.state = SagaState::Errored {
                    code: FundingErrorCode::Internal,
                    retryable: false,
                };
                continue;
            }

            record.attempts += 1;
            record.next_attempt_at = now + retry.backoff_for_attempt(record.attempts);
            record.state = SagaState::Submitted;
            due.push(record.snapshot.clone());
        }

        due
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SagaRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Fire a new funding request and record the saga
///
/// Non-blocking: returns the assigned reference as soon as the event is on
/// the broker. On a transport failure the record is kept (the resubmission
/// sweep will re-fire it) and the error is surfaced to the caller.
///
/// # Errors
/// Returns [`PublishError`] if the transport rejected the event.
pub async fn submit_funding_request(
    store: &FundingSagaStore,
    producer: &ProducerAdapter,
    customer: FundingCustomerV1,
    amount_minor: i64,
    currency: &str,
    product_code: Option<String>,
) -> Result<String, PublishError> {
    let snapshot = FundingRequestV1 {
        reference: store.next_reference(),
        customer,
        amount_minor,
        currency: currency.to_string(),
        product_code,
        requested_at: Utc::now(),
    };
    let reference = snapshot.reference.clone();

    store.insert_submitted(snapshot.clone());

    producer
        .publish_keyed(Topic::FundingRequestCreated, &reference, &snapshot)
        .await?;

    tracing::info!(
        reference = %reference,
        amount_minor = amount_minor,
        currency = currency,
        "funding request submitted"
    );

    Ok(reference)
}

/// Applies `funding.request.acknowledged` terminal events
pub struct FundingAckHandler {
    store: Arc<FundingSagaStore>,
}

impl FundingAckHandler {
    pub fn new(store: Arc<FundingSagaStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for FundingAckHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<Disposition, HandlerFailure> {
        let ack: FundingAcknowledgedV1 =
            serde_json::from_value(envelope.payload.clone()).map_err(|e| {
                HandlerFailure::terminal(
                    envelope.id.to_string(),
                    format!("payload does not match the acknowledgment contract: {e}"),
                )
            })?;

        match self.store.apply_acknowledgment(&ack) {
            AckApply::Applied { request_id } => {
                tracing::info!(
                    reference = %ack.reference,
                    request_id = %request_id,
                    "funding request acknowledged"
                );
                Ok(Disposition::Completed {
                    entity_id: ack.reference,
                    metadata: Some(json!({"requestId": request_id})),
                })
            }
            // The receiver re-emits on duplicate deliveries; seeing the same
            // acknowledgment again is the protocol working
            AckApply::AlreadyAcknowledged => Ok(Disposition::Completed {
                entity_id: ack.reference,
                metadata: None,
            }),
            AckApply::ConflictingRequestId { existing } => Ok(Disposition::Drift {
                entity_id: ack.reference.clone(),
                reason: format!(
                    "reference acknowledged with {} but a second acknowledgment carries {}",
                    existing, ack.request_id
                ),
            }),
            AckApply::UnknownReference => Ok(Disposition::Drift {
                entity_id: ack.reference,
                reason: "acknowledgment for a funding reference this service never submitted"
                    .to_string(),
            }),
        }
    }
}

/// Applies `funding.request.error` terminal events
pub struct FundingErrorHandler {
    store: Arc<FundingSagaStore>,
}

impl FundingErrorHandler {
    pub fn new(store: Arc<FundingSagaStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for FundingErrorHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<Disposition, HandlerFailure> {
        let error: FundingErrorV1 =
            serde_json::from_value(envelope.payload.clone()).map_err(|e| {
                HandlerFailure::terminal(
                    envelope.id.to_string(),
                    format!("payload does not match the error contract: {e}"),
                )
            })?;

        match self.store.apply_error(&error) {
            ErrorApply::Applied => {
                tracing::warn!(
                    reference = %error.reference,
                    code = ?error.code,
                    retryable = error.retryable,
                    "funding request errored"
                );
                Ok(Disposition::Completed {
                    entity_id: error.reference,
                    metadata: Some(json!({"retryable": error.retryable})),
                })
            }
            ErrorApply::AlreadyErrored => Ok(Disposition::Completed {
                entity_id: error.reference,
                metadata: None,
            }),
            ErrorApply::AfterAcknowledgment => Ok(Disposition::Drift {
                entity_id: error.reference,
                reason: "error event for a reference already acknowledged".to_string(),
            }),
            ErrorApply::UnknownReference => Ok(Disposition::Drift {
                entity_id: error.reference,
                reason: "error event for a funding reference this service never submitted"
                    .to_string(),
            }),
        }
    }
}

/// Spawn the resubmission sweep for pending funding sagas
pub fn spawn_funding_sweep(
    store: Arc<FundingSagaStore>,
    producer: ProducerAdapter,
    interval: Duration,
    sla: Duration,
    retry: RetryConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            sla_ms = sla.as_millis() as u64,
            "funding resubmission sweep started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            for snapshot in store.due_for_resubmit(sla, &retry) {
                tracing::info!(reference = %snapshot.reference, "resubmitting funding request");
                if let Err(e) = producer
                    .publish_keyed(Topic::FundingRequestCreated, &snapshot.reference, &snapshot)
                    .await
                {
                    // Record untouched; the next tick tries again
                    tracing::error!(
                        reference = %snapshot.reference,
                        error = %e,
                        "failed to resubmit funding request"
                    );
                }
            }
        }
    })
}
