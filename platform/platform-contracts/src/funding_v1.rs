//! Funding Request V1 Contract Types
//!
//! The funding choreography between the portfolio service (originator) and
//! the gestion-commerciale service (receiver):
//!
//! - `funding.request.created` carries [`FundingRequestV1`], a full business
//!   snapshot keyed by the originator's `reference`;
//! - the receiver answers with exactly one terminal event,
//!   [`FundingAcknowledgedV1`] or [`FundingErrorV1`], matched back to the
//!   originator's record by `reference`, not by correlation id: this is
//!   choreography, not request/reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Business snapshot published when a funding request is created
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FundingRequestV1 {
    /// Originator-local reference; the idempotency key of the whole saga
    pub reference: String,

    pub customer: FundingCustomerV1,

    /// Requested amount in minor currency units (must be > 0)
    pub amount_minor: i64,

    /// ISO 4217 currency code (e.g. "EUR")
    pub currency: String,

    /// Commercial product the funding applies to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,

    pub requested_at: DateTime<Utc>,
}

/// Customer identity embedded in the funding snapshot
///
/// The receiver holds no customer table of its own; everything it needs to
/// open a dossier travels in the event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FundingCustomerV1 {
    pub customer_id: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
}

/// Terminal success event: the receiver accepted the request and minted its
/// own identifiers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FundingAcknowledgedV1 {
    /// Echo of the originator's reference
    pub reference: String,

    /// Identifier minted by the receiver for its own record
    pub request_id: String,

    pub acknowledged_at: DateTime<Utc>,
}

/// Structured error codes for rejected funding requests
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundingErrorCode {
    InvalidAmount,
    UnknownCurrency,
    IncompleteSnapshot,
    Internal,
}

/// Terminal failure event
///
/// `retryable = true` means the originator may re-emit the same snapshot
/// (same `reference`, new event id) and expect a different outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FundingErrorV1 {
    /// Echo of the originator's reference
    pub reference: String,

    pub code: FundingErrorCode,

    pub message: String,

    pub retryable: bool,
}
