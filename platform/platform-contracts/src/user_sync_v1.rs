//! User Sync V1 Contract Types
//!
//! Carried on `user.sync.request`: the authoritative user snapshot the auth
//! service pushes to every service holding a user projection.

use serde::{Deserialize, Serialize};

/// Payload for user synchronization events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserSyncV1 {
    /// Stable user identifier shared across all services
    pub user_id: String,

    /// Primary email address
    pub email: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,

    /// Role names granted to the user
    #[serde(default)]
    pub roles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_valid_payload() {
        let json = r#"{
            "userId": "usr_01HPQW9K7J4M6N8P2R5T7V9W1X",
            "email": "jeanne@example.com",
            "firstName": "Jeanne",
            "lastName": "Moreau",
            "roles": ["customer", "investor"]
        }"#;

        let payload: UserSyncV1 = serde_json::from_str(json).unwrap();
        assert_eq!(payload.user_id, "usr_01HPQW9K7J4M6N8P2R5T7V9W1X");
        assert_eq!(payload.email, "jeanne@example.com");
        assert_eq!(payload.roles.len(), 2);
    }

    #[test]
    fn test_deserialize_minimal_payload() {
        let json = r#"{"userId": "u1", "email": "u1@example.com"}"#;

        let payload: UserSyncV1 = serde_json::from_str(json).unwrap();
        assert_eq!(payload.first_name, None);
        assert!(payload.roles.is_empty());
    }

    #[test]
    fn test_serializes_camel_case() {
        let payload = UserSyncV1 {
            user_id: "u1".to_string(),
            email: "u1@example.com".to_string(),
            first_name: None,
            last_name: None,
            roles: vec![],
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("userId").is_some());
        assert!(value.get("user_id").is_none());
        assert!(value.get("firstName").is_none(), "None fields are omitted");
    }
}
