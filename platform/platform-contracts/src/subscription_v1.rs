//! Subscription Lifecycle V1 Contract Types
//!
//! Carried on `subscription.created`, `subscription.status-changed` and
//! `subscription.expired`, emitted by the payment service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle states of a subscription
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SubscriptionStatus {
    Active,
    Suspended,
    Cancelled,
    Expired,
}

/// Payload for subscription lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionEventV1 {
    /// Identifier minted by the payment service
    pub subscription_id: String,

    /// Owning user
    pub user_id: String,

    /// Commercial plan the subscription is on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_code: Option<String>,

    pub status: SubscriptionStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}
