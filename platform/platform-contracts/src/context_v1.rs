//! Knowledge-Base Context V1 Contract Types
//!
//! Carried on the `context.*` lifecycle topics emitted by the admin service.
//! The lifecycle action is the topic itself; the payload is the context
//! snapshot relevant to that action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload for knowledge-base context lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContextEventV1 {
    /// Identifier of the knowledge-base context
    pub context_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Whether the context is available to analyses; carried on
    /// `context.toggled` and on full snapshots
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_snapshot() {
        let json = r#"{
            "contextId": "ctx-9",
            "title": "Regulatory updates 2026",
            "enabled": true,
            "expiresAt": "2026-12-31T23:59:59Z"
        }"#;

        let payload: ContextEventV1 = serde_json::from_str(json).unwrap();
        assert_eq!(payload.context_id, "ctx-9");
        assert_eq!(payload.enabled, Some(true));
    }

    #[test]
    fn test_deserialize_deletion_payload() {
        let json = r#"{"contextId": "ctx-9"}"#;

        let payload: ContextEventV1 = serde_json::from_str(json).unwrap();
        assert_eq!(payload.title, None);
        assert_eq!(payload.enabled, None);
    }
}
