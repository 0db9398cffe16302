use chrono::{DateTime, Utc};
use rocket::serde::Serialize;
use schemars::JsonSchema;
use uuid::Uuid;

/// Full session row binding a user to an access/refresh token pair.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub refresh_token: String,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// A session is expired once its deadline has passed, regardless of
    /// whether it is still flagged active.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

/// Access/refresh token pair. Each half is unique across the whole store.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

/// Client metadata captured at login and stored with the session.
#[derive(Debug, Clone, Default)]
pub struct ClientMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientMeta {
    pub const MAX_IP_LEN: usize = 45;
    pub const MAX_USER_AGENT_LEN: usize = 500;

    /// Header-derived values are clamped to the column limits rather than
    /// rejected; an oversized User-Agent must not fail a login.
    pub fn new(ip_address: Option<String>, user_agent: Option<String>) -> Self {
        Self {
            ip_address: clamp(ip_address, Self::MAX_IP_LEN),
            user_agent: clamp(user_agent, Self::MAX_USER_AGENT_LEN),
        }
    }
}

pub(crate) fn clamp(value: Option<String>, max_chars: usize) -> Option<String> {
    value.map(|v| if v.chars().count() > max_chars { v.chars().take(max_chars).collect() } else { v })
}

/// Session as exposed to its owner. Tokens are never echoed back here.
#[derive(Debug, Serialize, JsonSchema)]
pub struct SessionResponse {
    pub id: Uuid,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub is_active: bool,
    pub expires_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<&Session> for SessionResponse {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            user_agent: session.user_agent.clone(),
            ip_address: session.ip_address.clone(),
            is_active: session.is_active,
            expires_at: session.expires_at,
            last_activity: session.last_activity,
            created_at: session.created_at,
        }
    }
}

/// Returned by login and refresh: the freshly issued token pair.
#[derive(Debug, Serialize, JsonSchema)]
pub struct TokenResponse {
    pub token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl From<&Session> for TokenResponse {
    fn from(session: &Session) -> Self {
        Self {
            token: session.token.clone(),
            refresh_token: session.refresh_token.clone(),
            expires_at: session.expires_at,
        }
    }
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct DeactivatedResponse {
    pub deactivated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session_with_expiry(expires_at: DateTime<Utc>, is_active: bool) -> Session {
        let now = Utc::now();
        Session {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            token: "t".to_string(),
            refresh_token: "r".to_string(),
            user_agent: None,
            ip_address: None,
            is_active,
            expires_at,
            last_activity: now,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn expired_session_is_expired_even_while_active() {
        let session = session_with_expiry(Utc::now() - Duration::hours(1), true);
        assert!(session.is_expired());
    }

    #[test]
    fn future_expiry_is_not_expired() {
        let session = session_with_expiry(Utc::now() + Duration::hours(1), false);
        assert!(!session.is_expired());
    }

    #[test]
    fn client_meta_clamps_oversized_user_agent() {
        let meta = ClientMeta::new(None, Some("x".repeat(600)));
        assert_eq!(meta.user_agent.unwrap().len(), ClientMeta::MAX_USER_AGENT_LEN);
    }

    #[test]
    fn client_meta_keeps_short_values_untouched() {
        let meta = ClientMeta::new(Some("203.0.113.7".to_string()), Some("curl/8.0".to_string()));
        assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.7"));
        assert_eq!(meta.user_agent.as_deref(), Some("curl/8.0"));
    }
}
