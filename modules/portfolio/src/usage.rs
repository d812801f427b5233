//! Token usage emission and re-drive
//!
//! Analyses consume tokens; every debit is published as `token.usage` with
//! the resulting balance so downstream projections can apply it idempotently.
//! The last snapshot per user is retained: if no `confirmed` outcome arrives
//! within the SLA, the reconciliation sweep re-emits it (fresh envelope id,
//! same balance, replay-safe by construction).

use event_sync::{
    retry_with_backoff, Envelope, OutcomeLedger, ProducerAdapter, PublishError, RetryConfig, Topic,
};
use platform_contracts::TokenTransactionV1;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Emits token usage events and remembers what to re-drive
pub struct TokenUsageTracker {
    producer: ProducerAdapter,
    ledger: Arc<OutcomeLedger>,
    republish_retry: RetryConfig,
    last_usage: Mutex<HashMap<String, TokenTransactionV1>>,
}

impl TokenUsageTracker {
    pub fn new(producer: ProducerAdapter, ledger: Arc<OutcomeLedger>) -> Self {
        Self {
            producer,
            ledger,
            republish_retry: RetryConfig {
                max_attempts: 3,
                initial_backoff: std::time::Duration::from_millis(50),
                max_backoff: std::time::Duration::from_millis(500),
            },
            last_usage: Mutex::new(HashMap::new()),
        }
    }

    /// Publish a token debit and mark the user as awaiting confirmation
    ///
    /// # Errors
    /// Returns [`PublishError`] if the transport rejected the event; the
    /// snapshot is retained either way, so the sweep can recover.
    pub async fn record_usage(
        &self,
        user_id: &str,
        amount: i64,
        current_balance: i64,
        reason: Option<String>,
    ) -> Result<Envelope, PublishError> {
        let transaction = TokenTransactionV1 {
            user_id: user_id.to_string(),
            amount,
            current_balance,
            reason,
        };

        self.lock_usage()
            .insert(user_id.to_string(), transaction.clone());
        self.ledger.begin(user_id);

        self.producer
            .publish_keyed(Topic::TokenUsage, user_id, &transaction)
            .await
    }

    /// Re-emit the last usage snapshot for an unconfirmed user
    ///
    /// Invoked by the reconciliation sweep; transport hiccups are retried
    /// with a short backoff, anything beyond that is logged and left to the
    /// next sweep pass.
    pub async fn redrive(&self, user_id: String) {
        let Some(transaction) = self.lock_usage().get(&user_id).cloned() else {
            tracing::warn!(user_id = %user_id, "no usage snapshot retained, nothing to re-drive");
            return;
        };

        let result = retry_with_backoff(
            || async {
                self.producer
                    .publish_keyed(Topic::TokenUsage, &user_id, &transaction)
                    .await
            },
            &self.republish_retry,
            "republish_token_usage",
        )
        .await;

        if let Err(e) = result {
            tracing::error!(user_id = %user_id, error = %e, "failed to re-drive token usage");
        }
    }

    fn lock_usage(&self) -> MutexGuard<'_, HashMap<String, TokenTransactionV1>> {
        self.last_usage.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
