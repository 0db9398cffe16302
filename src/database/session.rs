use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::session::{ClientMeta, Session, TokenPair};
use crate::models::user::User;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Persistence contract for session lifecycle. Lifecycle rules live above
/// this trait; implementations only translate them to the store.
#[async_trait::async_trait]
pub trait SessionRepository {
    /// Insert a new active session. Fails with DuplicateToken when either
    /// half of the pair already exists, leaving the store unchanged.
    async fn create_session(&self, user_id: &Uuid, tokens: &TokenPair, expires_at: DateTime<Utc>, meta: &ClientMeta) -> Result<Session, AppError>;

    /// Sessions that are both flagged active and not yet expired. Order is
    /// unspecified.
    async fn find_active_sessions(&self, user_id: &Uuid) -> Result<Vec<Session>, AppError>;

    async fn find_session_by_refresh_token(&self, refresh_token: &str) -> Result<Option<Session>, AppError>;

    /// Refresh last_activity on an existing session.
    async fn touch_session(&self, session_id: &Uuid) -> Result<Session, AppError>;

    /// Flag a session inactive. Idempotent; deactivating an already-inactive
    /// session succeeds.
    async fn deactivate_session(&self, session_id: &Uuid) -> Result<Session, AppError>;

    /// Flag every currently-active session of a user inactive, returning the
    /// number of rows that changed.
    async fn deactivate_all_user_sessions(&self, user_id: &Uuid) -> Result<u64, AppError>;

    /// Active sweep: remove sessions that are expired OR merely deactivated.
    async fn cleanup_expired_sessions(&self) -> Result<u64, AppError>;

    /// TTL reaper: remove sessions strictly past their deadline.
    async fn delete_expired_sessions(&self) -> Result<u64, AppError>;
}

fn map_token_conflict(e: sqlx::Error) -> AppError {
    match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => AppError::DuplicateToken,
        e => AppError::from(e),
    }
}

#[async_trait::async_trait]
impl SessionRepository for PostgresRepository {
    async fn create_session(&self, user_id: &Uuid, tokens: &TokenPair, expires_at: DateTime<Utc>, meta: &ClientMeta) -> Result<Session, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (user_id, token, refresh_token, user_agent, ip_address, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, token, refresh_token, user_agent, ip_address, is_active, expires_at, last_activity, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(&tokens.token)
        .bind(&tokens.refresh_token)
        .bind(&meta.user_agent)
        .bind(&meta.ip_address)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_token_conflict)?;

        Ok(session)
    }

    async fn find_active_sessions(&self, user_id: &Uuid) -> Result<Vec<Session>, AppError> {
        let sessions = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, token, refresh_token, user_agent, ip_address, is_active, expires_at, last_activity, created_at, updated_at
            FROM sessions
            WHERE user_id = $1
              AND is_active = TRUE
              AND expires_at > now()
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    async fn find_session_by_refresh_token(&self, refresh_token: &str) -> Result<Option<Session>, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, token, refresh_token, user_agent, ip_address, is_active, expires_at, last_activity, created_at, updated_at
            FROM sessions
            WHERE refresh_token = $1
            "#,
        )
        .bind(refresh_token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    async fn touch_session(&self, session_id: &Uuid) -> Result<Session, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET last_activity = now(), updated_at = now()
            WHERE id = $1
            RETURNING id, user_id, token, refresh_token, user_agent, ip_address, is_active, expires_at, last_activity, created_at, updated_at
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        Ok(session)
    }

    async fn deactivate_session(&self, session_id: &Uuid) -> Result<Session, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET is_active = FALSE, last_activity = now(), updated_at = now()
            WHERE id = $1
            RETURNING id, user_id, token, refresh_token, user_agent, ip_address, is_active, expires_at, last_activity, created_at, updated_at
            "#,
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        Ok(session)
    }

    async fn deactivate_all_user_sessions(&self, user_id: &Uuid) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET is_active = FALSE, last_activity = now(), updated_at = now()
            WHERE user_id = $1
              AND is_active = TRUE
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn cleanup_expired_sessions(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < now() OR is_active = FALSE")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn delete_expired_sessions(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at < now()").execute(&self.pool).await?;

        Ok(result.rows_affected())
    }
}

impl PostgresRepository {
    /// Resolve the owner of a live session, for the request guard.
    pub async fn get_active_session_user(&self, session_id: &Uuid, user_id: &Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.name, u.email, u.password_hash, u.created_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.id = $1
              AND s.user_id = $2
              AND s.is_active = TRUE
              AND s.expires_at > now()
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Opportunistic removal when a guard sees a dead session; the sweeps
    /// remain the authoritative cleanup.
    pub async fn delete_session_if_expired(&self, session_id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1 AND expires_at <= now()")
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Deactivate a session only if it belongs to the given user.
    pub async fn deactivate_user_session(&self, session_id: &Uuid, user_id: &Uuid) -> Result<Session, AppError> {
        let session = sqlx::query_as::<_, Session>(
            r#"
            UPDATE sessions
            SET is_active = FALSE, last_activity = now(), updated_at = now()
            WHERE id = $1
              AND user_id = $2
            RETURNING id, user_id, token, refresh_token, user_agent, ip_address, is_active, expires_at, last_activity, created_at, updated_at
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".to_string()))?;

        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MemoryRepository;
    use chrono::Duration;

    fn pair(token: &str, refresh: &str) -> TokenPair {
        TokenPair {
            token: token.to_string(),
            refresh_token: refresh.to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_access_token_is_rejected_and_store_unchanged() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();
        let expires = Utc::now() + Duration::hours(1);

        repo.create_session(&user_id, &pair("a", "b"), expires, &ClientMeta::default()).await.unwrap();
        let err = repo.create_session(&user_id, &pair("a", "c"), expires, &ClientMeta::default()).await.unwrap_err();

        assert!(matches!(err, AppError::DuplicateToken));
        assert_eq!(repo.find_active_sessions(&user_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_refresh_token_is_rejected() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();
        let expires = Utc::now() + Duration::hours(1);

        repo.create_session(&user_id, &pair("a", "b"), expires, &ClientMeta::default()).await.unwrap();
        let err = repo.create_session(&user_id, &pair("c", "b"), expires, &ClientMeta::default()).await.unwrap_err();

        assert!(matches!(err, AppError::DuplicateToken));
    }

    #[tokio::test]
    async fn deactivate_session_is_idempotent() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();
        let session = repo
            .create_session(&user_id, &pair("a", "b"), Utc::now() + Duration::hours(1), &ClientMeta::default())
            .await
            .unwrap();

        let first = repo.deactivate_session(&session.id).await.unwrap();
        assert!(!first.is_active);

        let second = repo.deactivate_session(&session.id).await.unwrap();
        assert!(!second.is_active);
    }

    #[tokio::test]
    async fn deactivate_unknown_session_is_not_found() {
        let repo = MemoryRepository::new();
        let err = repo.deactivate_session(&Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn deactivate_all_reports_count_and_empties_active_set() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();
        let expires = Utc::now() + Duration::hours(1);
        for i in 0..3 {
            repo.create_session(&user_id, &pair(&format!("t{i}"), &format!("r{i}")), expires, &ClientMeta::default())
                .await
                .unwrap();
        }

        let count = repo.deactivate_all_user_sessions(&user_id).await.unwrap();
        assert_eq!(count, 3);
        assert!(repo.find_active_sessions(&user_id).await.unwrap().is_empty());

        // Re-running affects nothing; the rows are already inactive.
        assert_eq!(repo.deactivate_all_user_sessions(&user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn cleanup_removes_expired_and_inactive_but_keeps_live_sessions() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();

        let live = repo
            .create_session(&user_id, &pair("a", "ra"), Utc::now() + Duration::hours(1), &ClientMeta::default())
            .await
            .unwrap();
        repo.create_session(&user_id, &pair("b", "rb"), Utc::now() - Duration::hours(1), &ClientMeta::default())
            .await
            .unwrap();
        let inactive = repo
            .create_session(&user_id, &pair("c", "rc"), Utc::now() + Duration::hours(1), &ClientMeta::default())
            .await
            .unwrap();
        repo.deactivate_session(&inactive.id).await.unwrap();

        let removed = repo.cleanup_expired_sessions().await.unwrap();
        assert_eq!(removed, 2);

        let remaining = repo.find_active_sessions(&user_id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, live.id);
    }

    #[tokio::test]
    async fn ttl_reaper_only_removes_expired_sessions() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();

        repo.create_session(&user_id, &pair("a", "ra"), Utc::now() - Duration::minutes(5), &ClientMeta::default())
            .await
            .unwrap();
        let inactive = repo
            .create_session(&user_id, &pair("b", "rb"), Utc::now() + Duration::hours(1), &ClientMeta::default())
            .await
            .unwrap();
        repo.deactivate_session(&inactive.id).await.unwrap();

        // Unlike the sweep, the reaper leaves the deactivated-but-unexpired row.
        assert_eq!(repo.delete_expired_sessions().await.unwrap(), 1);
        assert!(repo.find_session_by_refresh_token("rb").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn touch_advances_last_activity_past_created_at() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();
        let session = repo
            .create_session(&user_id, &pair("a", "b"), Utc::now() + Duration::hours(1), &ClientMeta::default())
            .await
            .unwrap();

        std::thread::sleep(std::time::Duration::from_millis(5));
        let touched = repo.touch_session(&session.id).await.unwrap();
        assert!(touched.last_activity > touched.created_at);
    }

    #[tokio::test]
    async fn touch_unknown_session_is_not_found() {
        let repo = MemoryRepository::new();
        let err = repo.touch_session(&Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn find_active_excludes_expired_and_inactive_rows() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();

        repo.create_session(&user_id, &pair("live", "r1"), Utc::now() + Duration::hours(1), &ClientMeta::default())
            .await
            .unwrap();
        repo.create_session(&user_id, &pair("expired", "r2"), Utc::now() - Duration::seconds(1), &ClientMeta::default())
            .await
            .unwrap();
        let inactive = repo
            .create_session(&user_id, &pair("inactive", "r3"), Utc::now() + Duration::hours(1), &ClientMeta::default())
            .await
            .unwrap();
        repo.deactivate_session(&inactive.id).await.unwrap();

        let active = repo.find_active_sessions(&user_id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].token, "live");
    }
}
