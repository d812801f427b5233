//! Sync Outcome V1 Contract Types
//!
//! After processing a state-changing event, a consumer reports back on the
//! `sync.user.*` channels. Outcomes are observational: nothing blocks on
//! them, but origin services aggregate them to spot entities whose
//! synchronization never converged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of processing one state-changing event for one entity
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SyncStatus {
    Confirmed,
    Failed,
    ReconciliationRequested,
}

/// Payload for `sync.user.confirmed`, `sync.user.failed` and
/// `sync.user.reconciliation.request`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcomeV1 {
    /// Entity the processed event was about
    pub entity_id: String,

    /// Service reporting the outcome
    pub service_name: String,

    pub status: SyncStatus,

    /// Failure or drift explanation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// On `failed`: whether the origin may safely re-emit the original event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,

    /// Handler-supplied details on `confirmed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    pub timestamp: DateTime<Utc>,
}

impl SyncOutcomeV1 {
    /// Outcome for a successfully processed event
    pub fn confirmed(
        entity_id: impl Into<String>,
        service_name: impl Into<String>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            service_name: service_name.into(),
            status: SyncStatus::Confirmed,
            reason: None,
            retryable: None,
            metadata,
            timestamp: Utc::now(),
        }
    }

    /// Outcome for a handler that failed
    pub fn failed(
        entity_id: impl Into<String>,
        service_name: impl Into<String>,
        reason: impl Into<String>,
        retryable: bool,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            service_name: service_name.into(),
            status: SyncStatus::Failed,
            reason: Some(reason.into()),
            retryable: Some(retryable),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    /// Outcome for a consumer that detected local state drifting from what
    /// the incoming event assumed
    pub fn reconciliation_requested(
        entity_id: impl Into<String>,
        service_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            service_name: service_name.into(),
            status: SyncStatus::ReconciliationRequested,
            reason: Some(reason.into()),
            retryable: None,
            metadata: None,
            timestamp: Utc::now(),
        }
    }
}
