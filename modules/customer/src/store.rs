//! In-memory projections owned by the customer service
//!
//! The persistence seam of the service: handlers mutate these stores, the
//! REST surface reads them. Every write is an upsert so replaying an event
//! leaves the projection unchanged.

use chrono::{DateTime, Utc};
use platform_contracts::{SubscriptionEventV1, SubscriptionStatus, UserSyncV1};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Local copy of a user synchronized from the auth service
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub roles: Vec<String>,
    pub synced_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn from_sync(payload: &UserSyncV1) -> Self {
        Self {
            user_id: payload.user_id.clone(),
            email: payload.email.clone(),
            first_name: payload.first_name.clone(),
            last_name: payload.last_name.clone(),
            roles: payload.roles.clone(),
            synced_at: Utc::now(),
        }
    }
}

/// Local copy of a subscription owned by the payment service
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
    pub subscription_id: String,
    pub user_id: String,
    pub plan_code: Option<String>,
    pub status: SubscriptionStatus,
    pub expires_at: Option<DateTime<Utc>>,
}

impl SubscriptionRecord {
    pub fn from_event(payload: &SubscriptionEventV1) -> Self {
        Self {
            subscription_id: payload.subscription_id.clone(),
            user_id: payload.user_id.clone(),
            plan_code: payload.plan_code.clone(),
            status: payload.status,
            expires_at: payload.expires_at,
        }
    }
}

/// The customer service's projection store
#[derive(Debug, Default)]
pub struct CustomerStore {
    users: Mutex<HashMap<String, UserRecord>>,
    balances: Mutex<HashMap<String, i64>>,
    subscriptions: Mutex<HashMap<String, SubscriptionRecord>>,
}

impl CustomerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a user projection; returns true when the user was
    /// previously unknown
    pub fn upsert_user(&self, record: UserRecord) -> bool {
        lock(&self.users)
            .insert(record.user_id.clone(), record)
            .is_none()
    }

    pub fn user(&self, user_id: &str) -> Option<UserRecord> {
        lock(&self.users).get(user_id).cloned()
    }

    pub fn user_exists(&self, user_id: &str) -> bool {
        lock(&self.users).contains_key(user_id)
    }

    /// Set a balance to the producer-computed absolute value
    ///
    /// Absolute, not a delta: replays and redeliveries converge on the same
    /// number instead of double-counting.
    pub fn set_balance(&self, user_id: &str, balance: i64) {
        lock(&self.balances).insert(user_id.to_string(), balance);
    }

    pub fn balance(&self, user_id: &str) -> Option<i64> {
        lock(&self.balances).get(user_id).copied()
    }

    pub fn upsert_subscription(&self, record: SubscriptionRecord) {
        lock(&self.subscriptions).insert(record.subscription_id.clone(), record);
    }

    pub fn subscription(&self, subscription_id: &str) -> Option<SubscriptionRecord> {
        lock(&self.subscriptions).get(subscription_id).cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserRecord {
        UserRecord {
            user_id: id.to_string(),
            email: format!("{id}@example.com"),
            first_name: None,
            last_name: None,
            roles: vec![],
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn test_upsert_user_reports_creation_once() {
        let store = CustomerStore::new();
        assert!(store.upsert_user(user("u1")));
        assert!(!store.upsert_user(user("u1")), "second upsert is a refresh");
        assert!(store.user_exists("u1"));
    }

    #[test]
    fn test_set_balance_is_absolute() {
        let store = CustomerStore::new();
        store.set_balance("u1", 95);
        store.set_balance("u1", 95);
        assert_eq!(store.balance("u1"), Some(95));
    }
}
