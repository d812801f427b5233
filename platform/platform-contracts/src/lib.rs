//! # Cross-Service Event Contracts
//!
//! Versioned payload types for every event that crosses a service boundary.
//! These are the single source of truth for wire shapes: producers serialize
//! them, consumers deserialize them, and both sides stay compatible as long
//! as changes stay additive within a major version.
//!
//! IMPORTANT: Field names must match the wire contract EXACTLY
//! (camelCase, case-sensitive). Do not add validations beyond the contract;
//! business validation belongs to the consuming service.

mod context_v1;
mod funding_v1;
mod subscription_v1;
mod sync_outcome_v1;
mod token_v1;
mod user_sync_v1;

pub use context_v1::ContextEventV1;
pub use funding_v1::{
    FundingAcknowledgedV1, FundingCustomerV1, FundingErrorCode, FundingErrorV1, FundingRequestV1,
};
pub use subscription_v1::{SubscriptionEventV1, SubscriptionStatus};
pub use sync_outcome_v1::{SyncOutcomeV1, SyncStatus};
pub use token_v1::{TokenAlertV1, TokenTransactionV1};
pub use user_sync_v1::UserSyncV1;
