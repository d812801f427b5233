//! # Sync Outcomes & Reconciliation
//!
//! The observational layer of the protocol. After processing a
//! state-changing event, a consumer reports `confirmed`, `failed` or
//! `reconciliation-requested` on the `sync.user.*` channels; nothing ever
//! blocks on these events.
//!
//! On the origin side, the [`OutcomeLedger`] aggregates what came back per
//! entity, and the [`ReconciliationSweep`] periodically re-drives
//! synchronization for entities that never confirmed within the SLA window,
//! backing off per entity and giving up (loudly) once attempts are
//! exhausted.

use crate::producer::{ProducerAdapter, PublishError};
use crate::retry::RetryConfig;
use crate::topics::Topic;
use platform_contracts::{SyncOutcomeV1, SyncStatus};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Publish a sync outcome on its status channel, keyed by entity
///
/// # Errors
/// Returns [`PublishError`] if the transport rejects the message; callers on
/// the dispatch path log and continue rather than failing the consumer.
pub async fn emit_outcome(
    producer: &ProducerAdapter,
    outcome: &SyncOutcomeV1,
) -> Result<crate::envelope::Envelope, PublishError> {
    let topic = match outcome.status {
        SyncStatus::Confirmed => Topic::SyncUserConfirmed,
        SyncStatus::Failed => Topic::SyncUserFailed,
        SyncStatus::ReconciliationRequested => Topic::SyncUserReconciliationRequest,
    };

    producer.publish_keyed(topic, &outcome.entity_id, outcome).await
}

#[derive(Debug)]
struct LedgerEntry {
    initiated_at: Instant,
    confirmed: bool,
    last_status: Option<SyncStatus>,
    attempts: u32,
    next_attempt_at: Instant,
    abandoned: bool,
}

/// Origin-side aggregation of sync outcomes per entity
///
/// `begin` marks an entity as awaiting confirmation; `record` folds in
/// observed outcomes. The ledger never blocks anything; it only answers
/// "which entities never converged" for the reconciliation sweep.
#[derive(Debug, Default)]
pub struct OutcomeLedger {
    entries: Mutex<HashMap<String, LedgerEntry>>,
}

impl OutcomeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an entity as awaiting confirmation
    ///
    /// Re-announcing an already-tracked entity keeps the original initiation
    /// time and attempt count, so re-drives do not reset the SLA clock.
    pub fn begin(&self, entity_id: &str) {
        let now = Instant::now();
        self.lock().entry(entity_id.to_string()).or_insert(LedgerEntry {
            initiated_at: now,
            confirmed: false,
            last_status: None,
            attempts: 0,
            next_attempt_at: now,
            abandoned: false,
        });
    }

    /// Fold an observed outcome into the ledger
    pub fn record(&self, outcome: &SyncOutcomeV1) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(&outcome.entity_id) else {
            // Outcome for an entity this origin never announced; another
            // producer's traffic on the shared channel.
            return;
        };

        entry.last_status = Some(outcome.status);
        match outcome.status {
            SyncStatus::Confirmed => entry.confirmed = true,
            SyncStatus::Failed => {
                if outcome.retryable == Some(false) {
                    entry.abandoned = true;
                }
            }
            SyncStatus::ReconciliationRequested => {}
        }
    }

    /// Whether the entity received a `confirmed` outcome
    pub fn is_confirmed(&self, entity_id: &str) -> bool {
        self.lock().get(entity_id).map(|e| e.confirmed).unwrap_or(false)
    }

    /// Last status observed for the entity
    pub fn last_status(&self, entity_id: &str) -> Option<SyncStatus> {
        self.lock().get(entity_id).and_then(|e| e.last_status)
    }

    /// Entities past the SLA with no confirmation, not yet abandoned
    pub fn stragglers(&self, sla: Duration) -> Vec<String> {
        let entries = self.lock();
        entries
            .iter()
            .filter(|(_, e)| !e.confirmed && !e.abandoned && e.initiated_at.elapsed() >= sla)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Stragglers whose per-entity backoff has elapsed
    ///
    /// Advances each returned entity's attempt count and schedules its next
    /// eligibility per `retry`; entities exhausting `max_attempts` are
    /// abandoned and logged at error level.
    pub fn due_for_redrive(&self, sla: Duration, retry: &RetryConfig) -> Vec<String> {
        let now = Instant::now();
        let mut due = Vec::new();
        let mut entries = self.lock();

        for (entity_id, entry) in entries.iter_mut() {
            if entry.confirmed || entry.abandoned {
                continue;
            }
            if entry.initiated_at.elapsed() < sla || now < entry.next_attempt_at {
                continue;
            }

            entry.attempts += 1;
            if entry.attempts > retry.max_attempts {
                entry.abandoned = true;
                tracing::error!(
                    entity_id = %entity_id,
                    attempts = entry.attempts - 1,
                    "giving up on re-driving synchronization"
                );
                continue;
            }

            entry.next_attempt_at = now + retry.backoff_for_attempt(entry.attempts);
            due.push(entity_id.clone());
        }

        due
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, LedgerEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Periodic task re-driving synchronization for unconfirmed entities
///
/// The redelivery policy of the platform: a sweep on a fixed interval rather
/// than per-event timers, so overload degrades into lag instead of timer
/// storms. The caller supplies the actual re-drive (typically re-emitting
/// the last snapshot for the entity).
pub struct ReconciliationSweep {
    ledger: std::sync::Arc<OutcomeLedger>,
    interval: Duration,
    sla: Duration,
    retry: RetryConfig,
}

impl ReconciliationSweep {
    pub fn new(
        ledger: std::sync::Arc<OutcomeLedger>,
        interval: Duration,
        sla: Duration,
        retry: RetryConfig,
    ) -> Self {
        Self {
            ledger,
            interval,
            sla,
            retry,
        }
    }

    /// Spawn the sweep loop
    ///
    /// `redrive` is invoked once per due entity per tick and handles its own
    /// errors; the sweep only schedules.
    pub fn spawn<F, Fut>(self, redrive: F) -> tokio::task::JoinHandle<()>
    where
        F: Fn(String) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        tokio::spawn(async move {
            tracing::info!(
                interval_ms = self.interval.as_millis() as u64,
                sla_ms = self.sla.as_millis() as u64,
                "reconciliation sweep started"
            );

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                for entity_id in self.ledger.due_for_redrive(self.sla, &self.retry) {
                    tracing::info!(entity_id = %entity_id, "re-driving synchronization");
                    redrive(entity_id).await;
                }
            }
        })
    }
}
