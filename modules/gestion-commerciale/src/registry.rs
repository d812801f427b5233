//! Acknowledgment registry
//!
//! The receiver's record of every funding reference it has accepted, keyed
//! by the originator's reference. This is what makes the choreography
//! idempotent: a duplicate `Created` event finds the existing record and
//! re-emits the same acknowledgment instead of opening a second dossier.

use chrono::{DateTime, Utc};
use platform_contracts::FundingAcknowledgedV1;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// A dossier opened for an acknowledged funding request
#[derive(Debug, Clone, PartialEq)]
pub struct AckRecord {
    /// Originator's business reference
    pub reference: String,
    /// Identifier minted by this service
    pub request_id: String,
    pub acknowledged_at: DateTime<Utc>,
}

impl AckRecord {
    /// The terminal event this record answers `Created` events with
    pub fn to_event(&self) -> FundingAcknowledgedV1 {
        FundingAcknowledgedV1 {
            reference: self.reference.clone(),
            request_id: self.request_id.clone(),
            acknowledged_at: self.acknowledged_at,
        }
    }
}

/// Idempotent store of acknowledged references
#[derive(Debug, Default)]
pub struct AcknowledgmentRegistry {
    records: Mutex<HashMap<String, AckRecord>>,
    sequence: AtomicU64,
}

impl AcknowledgmentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledge a reference, minting identifiers at most once
    ///
    /// Returns the record and whether it was created by this call. The
    /// check-and-mint runs under one lock so concurrent duplicate deliveries
    /// cannot both mint.
    pub fn acknowledge(&self, reference: &str) -> (AckRecord, bool) {
        let mut records = self.lock();
        if let Some(existing) = records.get(reference) {
            return (existing.clone(), false);
        }

        let record = AckRecord {
            reference: reference.to_string(),
            request_id: format!("pir-{}", self.sequence.fetch_add(1, Ordering::Relaxed) + 1),
            acknowledged_at: Utc::now(),
        };
        records.insert(reference.to_string(), record.clone());
        (record, true)
    }

    pub fn get(&self, reference: &str) -> Option<AckRecord> {
        self.lock().get(reference).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AckRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
