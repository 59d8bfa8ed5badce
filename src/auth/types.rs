//! Session and user records as returned by the auth service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_organization_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// The user owning a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Payload of the auth service's `get-session` endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    pub session: Session,
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_payload_decoding() {
        let payload = serde_json::json!({
            "session": {
                "id": "ses_1",
                "userId": "usr_1",
                "token": "secret",
                "expiresAt": "2099-01-01T00:00:00Z",
                "activeOrganizationId": "org_1"
            },
            "user": {
                "id": "usr_1",
                "email": "ada@example.com",
                "name": "Ada Lovelace",
                "emailVerified": true
            }
        });

        let data: SessionData = serde_json::from_value(payload).unwrap();
        assert_eq!(data.session.user_id, "usr_1");
        assert_eq!(data.session.active_organization_id.as_deref(), Some("org_1"));
        assert!(data.user.email_verified);
        assert!(!data.session.is_expired());
    }

    #[test]
    fn test_session_token_never_serialized() {
        let session = Session {
            id: "ses_1".into(),
            user_id: "usr_1".into(),
            token: Some("secret".into()),
            expires_at: Utc::now(),
            active_organization_id: None,
            ip_address: None,
            user_agent: None,
        };

        let value = serde_json::to_value(&session).unwrap();
        assert!(value.get("token").is_none());
        assert_eq!(value["userId"], "usr_1");
    }
}
