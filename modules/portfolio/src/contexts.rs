//! Knowledge-base context projection
//!
//! The admin service owns the context catalog; this service mirrors it so
//! analyses can resolve contexts locally. One handler instance is registered
//! per lifecycle topic, each applying a single action.

use async_trait::async_trait;
use event_sync::{Disposition, Envelope, EventHandler, HandlerFailure};
use platform_contracts::ContextEventV1;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lifecycle action a handler instance applies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextAction {
    Created,
    Updated,
    Deleted,
    Toggled,
    Expired,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContextRecord {
    pub context_id: String,
    pub title: Option<String>,
    pub enabled: bool,
    pub expired: bool,
}

/// Local mirror of the admin service's context catalog
#[derive(Debug, Default)]
pub struct ContextCatalog {
    contexts: Mutex<HashMap<String, ContextRecord>>,
}

impl ContextCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, context_id: &str) -> Option<ContextRecord> {
        self.lock().get(context_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn upsert(&self, payload: &ContextEventV1) {
        let mut contexts = self.lock();
        let record = contexts
            .entry(payload.context_id.clone())
            .or_insert_with(|| ContextRecord {
                context_id: payload.context_id.clone(),
                title: None,
                enabled: true,
                expired: false,
            });
        if payload.title.is_some() {
            record.title = payload.title.clone();
        }
        if let Some(enabled) = payload.enabled {
            record.enabled = enabled;
        }
    }

    fn remove(&self, context_id: &str) -> bool {
        self.lock().remove(context_id).is_some()
    }

    fn set_enabled(&self, context_id: &str, enabled: bool) -> bool {
        match self.lock().get_mut(context_id) {
            Some(record) => {
                record.enabled = enabled;
                true
            }
            None => false,
        }
    }

    fn mark_expired(&self, context_id: &str) -> bool {
        match self.lock().get_mut(context_id) {
            Some(record) => {
                record.expired = true;
                record.enabled = false;
                true
            }
            None => false,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ContextRecord>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Applies one context lifecycle action to the catalog
pub struct ContextEventHandler {
    catalog: Arc<ContextCatalog>,
    action: ContextAction,
}

impl ContextEventHandler {
    pub fn new(catalog: Arc<ContextCatalog>, action: ContextAction) -> Self {
        Self { catalog, action }
    }
}

#[async_trait]
impl EventHandler for ContextEventHandler {
    async fn handle(&self, envelope: &Envelope) -> Result<Disposition, HandlerFailure> {
        let payload: ContextEventV1 =
            serde_json::from_value(envelope.payload.clone()).map_err(|e| {
                HandlerFailure::terminal(
                    envelope.id.to_string(),
                    format!("payload does not match the context contract: {e}"),
                )
            })?;
        let context_id = payload.context_id.clone();

        let applied = match self.action {
            ContextAction::Created | ContextAction::Updated => {
                self.catalog.upsert(&payload);
                true
            }
            // Deleting an absent context is a replayed deletion, not drift
            ContextAction::Deleted => {
                self.catalog.remove(&context_id);
                true
            }
            ContextAction::Toggled => self
                .catalog
                .set_enabled(&context_id, payload.enabled.unwrap_or(false)),
            ContextAction::Expired => self.catalog.mark_expired(&context_id),
        };

        if !applied {
            return Ok(Disposition::Drift {
                entity_id: context_id,
                reason: "lifecycle event for a context missing from the local catalog".to_string(),
            });
        }

        tracing::info!(
            context_id = %context_id,
            action = ?self.action,
            "context catalog updated"
        );

        Ok(Disposition::Completed {
            entity_id: context_id,
            metadata: None,
        })
    }
}
