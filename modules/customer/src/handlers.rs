//! Event handlers of the customer service
//!
//! Each handler is idempotent on its entity id: replays and redeliveries
//! converge on the same projection state ("already exists" is success).

use crate::store::{CustomerStore, SubscriptionRecord, UserRecord};
use async_trait::async_trait;
use event_sync::{
    Disposition, Envelope, EventHandler, HandlerFailure, ProducerAdapter, Topic,
};
use platform_contracts::{SubscriptionEventV1, TokenAlertV1, TokenTransactionV1, UserSyncV1};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::sync::Arc;

fn parse_payload<T: DeserializeOwned>(envelope: &Envelope) -> Result<T, HandlerFailure> {
    serde_json::from_value(envelope.payload.clone()).map_err(|e| {
        HandlerFailure::terminal(
            envelope.id.to_string(),
            format!("payload does not match the {} contract: {e}", envelope.topic),
        )
    })
}

/// Applies `user.sync.request` snapshots to the user projection
pub struct UserSyncHandler {
    store: Arc<CustomerStore>,
}

impl UserSyncHandler {
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for UserSyncHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<Disposition, HandlerFailure> {
        let payload: UserSyncV1 = parse_payload(envelope)?;
        let user_id = payload.user_id.clone();

        let created = self.store.upsert_user(UserRecord::from_sync(&payload));

        tracing::info!(
            user_id = %user_id,
            created = created,
            "user projection synchronized"
        );

        Ok(Disposition::Completed {
            entity_id: user_id,
            metadata: Some(json!({"created": created})),
        })
    }
}

/// Applies token purchases and usages to the balance projection
///
/// One handler serves both topics; the payload carries the resulting
/// balance, so applying is a plain overwrite. Crossing the low-water mark
/// emits `token.alert` as the next choreography step.
pub struct TokenTransactionHandler {
    store: Arc<CustomerStore>,
    producer: ProducerAdapter,
    low_balance_threshold: i64,
}

impl TokenTransactionHandler {
    pub fn new(
        store: Arc<CustomerStore>,
        producer: ProducerAdapter,
        low_balance_threshold: i64,
    ) -> Self {
        Self {
            store,
            producer,
            low_balance_threshold,
        }
    }
}

#[async_trait]
impl EventHandler for TokenTransactionHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<Disposition, HandlerFailure> {
        let payload: TokenTransactionV1 = parse_payload(envelope)?;
        let user_id = payload.user_id.clone();

        if !self.store.user_exists(&user_id) {
            // The transaction references a user this projection never saw:
            // ask the origin to reconcile rather than inventing a record.
            return Ok(Disposition::Drift {
                entity_id: user_id,
                reason: "user projection missing for token transaction".to_string(),
            });
        }

        let previously_low = self
            .store
            .balance(&user_id)
            .map(|b| b < self.low_balance_threshold)
            .unwrap_or(false);
        self.store.set_balance(&user_id, payload.current_balance);

        tracing::info!(
            user_id = %user_id,
            amount = payload.amount,
            balance = payload.current_balance,
            topic = %envelope.topic,
            "token balance updated"
        );

        if payload.current_balance < self.low_balance_threshold && !previously_low {
            let alert = TokenAlertV1 {
                user_id: user_id.clone(),
                current_balance: payload.current_balance,
                threshold: self.low_balance_threshold,
            };
            // Advisory event; a failed publish must not fail the balance
            // update that already happened
            if let Err(e) = self
                .producer
                .publish_keyed(Topic::TokenAlert, &user_id, &alert)
                .await
            {
                tracing::warn!(user_id = %user_id, error = %e, "failed to publish token alert");
            }
        }

        Ok(Disposition::Completed {
            entity_id: user_id,
            metadata: Some(json!({"balance": payload.current_balance})),
        })
    }
}

/// Applies subscription lifecycle events to the subscription projection
pub struct SubscriptionHandler {
    store: Arc<CustomerStore>,
}

impl SubscriptionHandler {
    pub fn new(store: Arc<CustomerStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for SubscriptionHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<Disposition, HandlerFailure> {
        let payload: SubscriptionEventV1 = parse_payload(envelope)?;
        let subscription_id = payload.subscription_id.clone();

        if !self.store.user_exists(&payload.user_id) {
            return Ok(Disposition::Drift {
                entity_id: payload.user_id,
                reason: "subscription event for unknown user".to_string(),
            });
        }

        self.store
            .upsert_subscription(SubscriptionRecord::from_event(&payload));

        tracing::info!(
            subscription_id = %subscription_id,
            user_id = %payload.user_id,
            status = ?payload.status,
            "subscription projection updated"
        );

        Ok(Disposition::Completed {
            entity_id: subscription_id,
            metadata: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use event_bus::{EventBus, InMemoryBus};
    use futures::StreamExt;
    use platform_contracts::SubscriptionStatus;
    use serde_json::json;
    use std::time::Duration;

    fn envelope_for(topic: Topic, payload: serde_json::Value) -> Envelope {
        Envelope::new(topic.logical_name(), "test-producer", payload)
    }

    fn store_with_user(user_id: &str) -> Arc<CustomerStore> {
        let store = Arc::new(CustomerStore::new());
        store.upsert_user(UserRecord {
            user_id: user_id.to_string(),
            email: format!("{user_id}@example.com"),
            first_name: None,
            last_name: None,
            roles: vec![],
            synced_at: chrono::Utc::now(),
        });
        store
    }

    fn token_handler(
        store: &Arc<CustomerStore>,
        bus: &Arc<InMemoryBus>,
        threshold: i64,
    ) -> TokenTransactionHandler {
        let bus: Arc<dyn EventBus> = Arc::clone(bus) as Arc<dyn EventBus>;
        TokenTransactionHandler::new(
            Arc::clone(store),
            ProducerAdapter::new(bus, "customer"),
            threshold,
        )
    }

    #[tokio::test]
    async fn test_user_sync_applied_twice_yields_one_record() {
        let store = Arc::new(CustomerStore::new());
        let handler = UserSyncHandler::new(Arc::clone(&store));

        let envelope = envelope_for(
            Topic::UserSyncRequest,
            json!({"userId": "u1", "email": "u1@example.com"}),
        );

        let first = handler.handle(&envelope).await.unwrap();
        let second = handler.handle(&envelope).await.unwrap();

        match (first, second) {
            (
                Disposition::Completed { metadata: m1, .. },
                Disposition::Completed { metadata: m2, .. },
            ) => {
                assert_eq!(m1.unwrap()["created"], true);
                assert_eq!(m2.unwrap()["created"], false, "replay is a refresh, not an error");
            }
            other => panic!("expected two completions, got {other:?}"),
        }

        assert!(store.user_exists("u1"));
    }

    #[tokio::test]
    async fn test_token_transaction_sets_absolute_balance() {
        let store = store_with_user("u1");
        let bus = Arc::new(InMemoryBus::new());
        let handler = token_handler(&store, &bus, 10);

        let envelope = envelope_for(
            Topic::TokenUsage,
            json!({"userId": "u1", "amount": 5, "currentBalance": 95}),
        );

        handler.handle(&envelope).await.unwrap();
        // Redelivery converges on the same balance
        handler.handle(&envelope).await.unwrap();

        assert_eq!(store.balance("u1"), Some(95));
    }

    #[tokio::test]
    async fn test_token_transaction_for_unknown_user_reports_drift() {
        let store = Arc::new(CustomerStore::new());
        let bus = Arc::new(InMemoryBus::new());
        let handler = token_handler(&store, &bus, 10);

        let envelope = envelope_for(
            Topic::TokenUsage,
            json!({"userId": "ghost", "amount": 5, "currentBalance": 95}),
        );

        let disposition = handler.handle(&envelope).await.unwrap();
        assert!(matches!(
            disposition,
            Disposition::Drift { ref entity_id, .. } if entity_id == "ghost"
        ));
        assert_eq!(store.balance("ghost"), None);
    }

    #[tokio::test]
    async fn test_low_balance_emits_alert_once() {
        let store = store_with_user("u1");
        let bus = Arc::new(InMemoryBus::new());
        let handler = token_handler(&store, &bus, 10);

        let mut alerts = bus.subscribe(Topic::TokenAlert.subject()).await.unwrap();

        let crossing = envelope_for(
            Topic::TokenUsage,
            json!({"userId": "u1", "amount": 92, "currentBalance": 8}),
        );
        handler.handle(&crossing).await.unwrap();

        let msg = tokio::time::timeout(Duration::from_secs(1), alerts.next())
            .await
            .expect("timeout")
            .expect("stream ended");
        let alert = event_sync::decode(&msg.payload, event_sync::SchemaCompat::Strict).unwrap();
        assert_eq!(alert.payload["userId"], "u1");
        assert_eq!(alert.payload["currentBalance"], 8);
        assert_eq!(alert.payload["threshold"], 10);

        // Already below the mark: a further usage does not re-alert
        let still_low = envelope_for(
            Topic::TokenUsage,
            json!({"userId": "u1", "amount": 2, "currentBalance": 6}),
        );
        handler.handle(&still_low).await.unwrap();

        let silent = tokio::time::timeout(Duration::from_millis(100), alerts.next()).await;
        assert!(silent.is_err(), "no repeated alert while low");
    }

    #[tokio::test]
    async fn test_subscription_lifecycle_updates_projection() {
        let store = store_with_user("u1");
        let handler = SubscriptionHandler::new(Arc::clone(&store));

        let created = envelope_for(
            Topic::SubscriptionCreated,
            json!({"subscriptionId": "sub_1", "userId": "u1", "status": "active"}),
        );
        handler.handle(&created).await.unwrap();
        assert_eq!(
            store.subscription("sub_1").unwrap().status,
            SubscriptionStatus::Active
        );

        let expired = envelope_for(
            Topic::SubscriptionExpired,
            json!({"subscriptionId": "sub_1", "userId": "u1", "status": "expired"}),
        );
        handler.handle(&expired).await.unwrap();
        assert_eq!(
            store.subscription("sub_1").unwrap().status,
            SubscriptionStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_is_a_terminal_failure() {
        let store = Arc::new(CustomerStore::new());
        let handler = UserSyncHandler::new(store);

        let envelope = envelope_for(Topic::UserSyncRequest, json!({"email": 42}));

        let failure = handler.handle(&envelope).await.unwrap_err();
        assert!(!failure.retryable, "contract violations never heal on retry");
    }
}
