//! Receiver side of the funding-request choreography
//!
//! One terminal event per business reference, whatever the broker delivers:
//!
//! - first valid `Created` ⇒ mint identifiers, emit `Acknowledged`;
//! - duplicate `Created` (originator retry or redelivery) ⇒ re-emit the
//!   identical `Acknowledged`, never a second dossier;
//! - deterministically invalid snapshot ⇒ emit `Errored` with a structured
//!   code and `retryable = false`;
//! - anything unclassifiable ⇒ `retryable = true`, so the originator may
//!   resubmit the same reference under a fresh envelope id.

use crate::registry::AcknowledgmentRegistry;
use async_trait::async_trait;
use event_sync::{Disposition, Envelope, EventHandler, HandlerFailure, ProducerAdapter, Topic};
use platform_contracts::{FundingErrorCode, FundingErrorV1, FundingRequestV1};
use serde_json::json;
use std::sync::Arc;

const SUPPORTED_CURRENCIES: [&str; 4] = ["EUR", "USD", "GBP", "CHF"];

/// Consumes `funding.request.created` and answers with a terminal event
pub struct FundingRequestHandler {
    registry: Arc<AcknowledgmentRegistry>,
    producer: ProducerAdapter,
}

impl FundingRequestHandler {
    pub fn new(registry: Arc<AcknowledgmentRegistry>, producer: ProducerAdapter) -> Self {
        Self { registry, producer }
    }

    /// Deterministic domain validation of the incoming snapshot
    fn validate(request: &FundingRequestV1) -> Result<(), (FundingErrorCode, String)> {
        if request.amount_minor <= 0 {
            return Err((
                FundingErrorCode::InvalidAmount,
                format!("amount must be positive, got {}", request.amount_minor),
            ));
        }
        if !SUPPORTED_CURRENCIES.contains(&request.currency.as_str()) {
            return Err((
                FundingErrorCode::UnknownCurrency,
                format!("unsupported currency `{}`", request.currency),
            ));
        }
        if request.reference.is_empty()
            || request.customer.customer_id.is_empty()
            || request.customer.email.is_empty()
        {
            return Err((
                FundingErrorCode::IncompleteSnapshot,
                "reference and customer identity are required".to_string(),
            ));
        }
        Ok(())
    }

    async fn reject(
        &self,
        request: &FundingRequestV1,
        code: FundingErrorCode,
        message: String,
        retryable: bool,
    ) -> Result<Disposition, HandlerFailure> {
        let error = FundingErrorV1 {
            reference: request.reference.clone(),
            code,
            message,
            retryable,
        };

        self.producer
            .publish_keyed(Topic::FundingRequestError, &request.reference, &error)
            .await
            .map_err(|e| {
                // No terminal event made it out; the originator's sweep will
                // re-deliver and this handler gets another go
                HandlerFailure::retryable(
                    request.reference.clone(),
                    format!("failed to publish funding error event: {e}"),
                )
            })?;

        tracing::warn!(
            reference = %request.reference,
            code = ?code,
            retryable = retryable,
            "funding request rejected"
        );

        Ok(Disposition::Completed {
            entity_id: request.reference.clone(),
            metadata: Some(json!({"rejected": format!("{code:?}")})),
        })
    }
}

#[async_trait]
impl EventHandler for FundingRequestHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<Disposition, HandlerFailure> {
        let request: FundingRequestV1 =
            serde_json::from_value(envelope.payload.clone()).map_err(|e| {
                HandlerFailure::terminal(
                    envelope.id.to_string(),
                    format!("payload does not match the funding request contract: {e}"),
                )
            })?;

        if let Err((code, message)) = Self::validate(&request) {
            return self.reject(&request, code, message, false).await;
        }

        let (record, created) = self.registry.acknowledge(&request.reference);

        // Emitted for first processing and duplicates alike: the event is
        // the same either way, and a duplicate usually means the originator
        // never saw the first one
        self.producer
            .publish_keyed(
                Topic::FundingRequestAcknowledged,
                &record.reference,
                &record.to_event(),
            )
            .await
            .map_err(|e| {
                HandlerFailure::retryable(
                    request.reference.clone(),
                    format!("failed to publish acknowledgment: {e}"),
                )
            })?;

        tracing::info!(
            reference = %record.reference,
            request_id = %record.request_id,
            duplicate = !created,
            "funding request acknowledged"
        );

        Ok(Disposition::Completed {
            entity_id: record.reference,
            metadata: Some(json!({"requestId": record.request_id, "duplicate": !created})),
        })
    }
}
