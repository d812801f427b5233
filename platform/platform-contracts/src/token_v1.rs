//! Token Transaction V1 Contract Types
//!
//! Carried on `token.purchase` and `token.usage`. The payload always includes
//! the producer's resulting balance so applying the same event twice leaves
//! the consumer in the same state.

use serde::{Deserialize, Serialize};

/// Payload for token purchase and usage events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransactionV1 {
    /// User whose balance changed
    pub user_id: String,

    /// Tokens added (purchase) or consumed (usage); always positive
    pub amount: i64,

    /// Balance after the transaction, as computed by the producer
    pub current_balance: i64,

    /// Free-form origin of the transaction (e.g. an analysis run id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Payload for `token.alert`, emitted when a balance crosses the low-water mark
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenAlertV1 {
    pub user_id: String,
    pub current_balance: i64,
    /// The threshold that was crossed
    pub threshold: i64,
}
