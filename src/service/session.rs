use crate::database::session::SessionRepository;
use crate::error::app_error::AppError;
use crate::models::session::{ClientMeta, Session, TokenPair};
use chrono::{Duration, Utc};
use tracing::warn;
use uuid::Uuid;

/// Generate one opaque 32-byte token, hex encoded.
fn generate_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

pub fn generate_token_pair() -> TokenPair {
    TokenPair {
        token: generate_token(),
        refresh_token: generate_token(),
    }
}

/// Create a new active session for a user. A token collision is vanishingly
/// unlikely but handled anyway: the pair is regenerated and the insert
/// retried up to `retry_limit` times before the conflict is surfaced.
pub async fn issue_session<R: SessionRepository>(
    repo: &R,
    user_id: &Uuid,
    ttl: Duration,
    retry_limit: u32,
    meta: &ClientMeta,
) -> Result<Session, AppError> {
    let expires_at = Utc::now() + ttl;
    let attempts = retry_limit.max(1);

    let mut attempt = 0;
    loop {
        let tokens = generate_token_pair();
        match repo.create_session(user_id, &tokens, expires_at, meta).await {
            Err(AppError::DuplicateToken) if attempt + 1 < attempts => {
                attempt += 1;
                warn!(user_id = %user_id, attempt, "session token collision, regenerating pair");
            }
            result => return result,
        }
    }
}
