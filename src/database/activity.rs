use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::activity::{ActivityStats, NewActivity, UserActivity};
use chrono::{Duration, Utc};
use uuid::Uuid;

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const DEFAULT_STATS_WINDOW_DAYS: i64 = 30;

/// Persistence contract for the append-only audit trail. Records are
/// write-once; there is no update operation here by design.
#[async_trait::async_trait]
pub trait ActivityRepository {
    async fn log_activity(&self, activity: &NewActivity) -> Result<UserActivity, AppError>;

    /// Records for a user, newest first, windowed by limit/skip.
    async fn get_user_activities(&self, user_id: &Uuid, limit: i64, skip: i64) -> Result<Vec<UserActivity>, AppError>;

    /// Per-type counts and most recent occurrence over the trailing window.
    async fn get_activity_stats(&self, user_id: &Uuid, days: i64) -> Result<Vec<ActivityStats>, AppError>;

    /// Retention reaper: unconditionally removes records older than the
    /// window, regardless of any other field.
    async fn delete_expired_activities(&self, retention_days: i64) -> Result<u64, AppError>;
}

#[async_trait::async_trait]
impl ActivityRepository for PostgresRepository {
    async fn log_activity(&self, activity: &NewActivity) -> Result<UserActivity, AppError> {
        // Mirror the audit event to tracing for operational visibility.
        tracing::info!(
            category = "audit",
            activity_type = activity.activity_type.as_str(),
            user_id = %activity.user_id,
            ip = activity.ip_address.as_deref().unwrap_or("-"),
            "user activity"
        );

        let record = sqlx::query_as::<_, UserActivity>(
            r#"
            INSERT INTO user_activities
                (user_id, activity_type, description, metadata, ip_address, user_agent, location_country, location_city, location_region)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, user_id, activity_type, description, metadata, ip_address, user_agent,
                      location_country, location_city, location_region, "timestamp", created_at
            "#,
        )
        .bind(activity.user_id)
        .bind(activity.activity_type.as_str())
        .bind(&activity.description)
        .bind(&activity.metadata)
        .bind(&activity.ip_address)
        .bind(&activity.user_agent)
        .bind(&activity.location_country)
        .bind(&activity.location_city)
        .bind(&activity.location_region)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_user_activities(&self, user_id: &Uuid, limit: i64, skip: i64) -> Result<Vec<UserActivity>, AppError> {
        let activities = sqlx::query_as::<_, UserActivity>(
            r#"
            SELECT id, user_id, activity_type, description, metadata, ip_address, user_agent,
                   location_country, location_city, location_region, "timestamp", created_at
            FROM user_activities
            WHERE user_id = $1
            ORDER BY "timestamp" DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .bind(skip)
        .fetch_all(&self.pool)
        .await?;

        Ok(activities)
    }

    async fn get_activity_stats(&self, user_id: &Uuid, days: i64) -> Result<Vec<ActivityStats>, AppError> {
        let since = Utc::now() - Duration::days(days);

        let stats = sqlx::query_as::<_, ActivityStats>(
            r#"
            SELECT activity_type, COUNT(*) AS count, MAX("timestamp") AS last_activity
            FROM user_activities
            WHERE user_id = $1
              AND "timestamp" >= $2
            GROUP BY activity_type
            ORDER BY count DESC
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(stats)
    }

    async fn delete_expired_activities(&self, retention_days: i64) -> Result<u64, AppError> {
        let cutoff = Utc::now() - Duration::days(retention_days);

        let result = sqlx::query(r#"DELETE FROM user_activities WHERE "timestamp" < $1"#)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::activity::ActivityType;
    use crate::test_utils::MemoryRepository;

    #[tokio::test]
    async fn logged_activity_is_the_most_recent_entry() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();

        repo.log_activity(&NewActivity::new(user_id, ActivityType::Login, "User logged in")).await.unwrap();

        let page = repo.get_user_activities(&user_id, 1, 0).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].activity_type, ActivityType::Login);
        assert_eq!(page[0].description, "User logged in");
    }

    #[tokio::test]
    async fn activities_page_newest_first() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();

        for description in ["first", "second", "third"] {
            repo.log_activity(&NewActivity::new(user_id, ActivityType::ApiAccess, description)).await.unwrap();
            std::thread::sleep(std::time::Duration::from_millis(3));
        }

        let page = repo.get_user_activities(&user_id, 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].description, "third");
        assert_eq!(page[1].description, "second");

        let rest = repo.get_user_activities(&user_id, 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].description, "first");
    }

    #[tokio::test]
    async fn activities_are_scoped_to_their_owner() {
        let repo = MemoryRepository::new();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();

        repo.log_activity(&NewActivity::new(user_a, ActivityType::Login, "a logs in")).await.unwrap();
        repo.log_activity(&NewActivity::new(user_b, ActivityType::Login, "b logs in")).await.unwrap();

        let page = repo.get_user_activities(&user_a, 50, 0).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].user_id, user_a);
    }

    #[tokio::test]
    async fn stats_group_counts_and_latest_timestamp_per_type() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();

        repo.log_activity(&NewActivity::new(user_id, ActivityType::Login, "login 1")).await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(3));
        let latest_login = repo.log_activity(&NewActivity::new(user_id, ActivityType::Login, "login 2")).await.unwrap();
        let logout = repo.log_activity(&NewActivity::new(user_id, ActivityType::Logout, "logout")).await.unwrap();

        let stats = repo.get_activity_stats(&user_id, 7).await.unwrap();
        assert_eq!(stats.len(), 2);

        let login_row = stats.iter().find(|s| s.activity_type == ActivityType::Login).unwrap();
        assert_eq!(login_row.count, 2);
        assert_eq!(login_row.last_activity, latest_login.timestamp);

        let logout_row = stats.iter().find(|s| s.activity_type == ActivityType::Logout).unwrap();
        assert_eq!(logout_row.count, 1);
        assert_eq!(logout_row.last_activity, logout.timestamp);
    }

    #[tokio::test]
    async fn retention_reaper_drops_only_records_past_the_window() {
        let repo = MemoryRepository::new();
        let user_id = Uuid::new_v4();

        repo.log_activity(&NewActivity::new(user_id, ActivityType::Login, "recent")).await.unwrap();
        repo.log_activity_at(
            &NewActivity::new(user_id, ActivityType::Login, "ancient"),
            Utc::now() - Duration::days(120),
        )
        .await
        .unwrap();

        assert_eq!(repo.delete_expired_activities(90).await.unwrap(), 1);

        let page = repo.get_user_activities(&user_id, 50, 0).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].description, "recent");
    }
}
