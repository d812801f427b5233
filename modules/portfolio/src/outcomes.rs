//! Sync outcome aggregation
//!
//! As an origin of state-changing events, this service listens to the
//! `sync.user.*` channels and folds what comes back into its outcome ledger.
//! The ledger feeds the reconciliation sweep; nothing here blocks.

use async_trait::async_trait;
use event_sync::{Disposition, Envelope, EventHandler, HandlerFailure, OutcomeLedger};
use platform_contracts::SyncOutcomeV1;
use std::sync::Arc;

/// Records observed sync outcomes into the ledger
pub struct OutcomeRecorder {
    ledger: Arc<OutcomeLedger>,
}

impl OutcomeRecorder {
    pub fn new(ledger: Arc<OutcomeLedger>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl EventHandler for OutcomeRecorder {
    async fn handle(&self, envelope: &Envelope) -> Result<Disposition, HandlerFailure> {
        let outcome: SyncOutcomeV1 =
            serde_json::from_value(envelope.payload.clone()).map_err(|e| {
                HandlerFailure::terminal(
                    envelope.id.to_string(),
                    format!("payload does not match the sync outcome contract: {e}"),
                )
            })?;

        tracing::debug!(
            entity_id = %outcome.entity_id,
            service = %outcome.service_name,
            status = ?outcome.status,
            "sync outcome observed"
        );

        let entity_id = outcome.entity_id.clone();
        self.ledger.record(&outcome);

        Ok(Disposition::Completed {
            entity_id,
            metadata: None,
        })
    }
}
