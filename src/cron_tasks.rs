use crate::Config;
use crate::database::activity::ActivityRepository;
use crate::database::postgres_repository::PostgresRepository;
use crate::database::session::SessionRepository;
use crate::db::init_pool;
use rocket::serde::Serialize;
use schemars::JsonSchema;

/// Outcome of one maintenance pass, for both the cron binary and the
/// /cron endpoints.
#[derive(Debug, Clone, Copy, Serialize, JsonSchema)]
pub struct MaintenanceReport {
    pub sessions_deleted: u64,
    pub activities_deleted: u64,
}

/// Active sweep over the session store: removes expired sessions AND
/// sessions that were deactivated but never expired.
pub async fn sweep_sessions(config: &Config) -> Result<MaintenanceReport, String> {
    let pool = init_pool(&config.database)
        .await
        .map_err(|err| format!("Failed to initialize database pool: {err}"))?;

    let repo = PostgresRepository { pool: pool.clone() };
    let sessions_deleted = repo
        .cleanup_expired_sessions()
        .await
        .map_err(|err| format!("Failed to sweep sessions: {err:?}"))?;

    pool.close().await;

    Ok(MaintenanceReport {
        sessions_deleted,
        activities_deleted: 0,
    })
}

/// Time-based expiry for both stores, standing in for a store-level TTL:
/// sessions strictly past expires_at, activity records past the retention
/// window.
pub async fn expire_records(config: &Config) -> Result<MaintenanceReport, String> {
    let pool = init_pool(&config.database)
        .await
        .map_err(|err| format!("Failed to initialize database pool: {err}"))?;

    let repo = PostgresRepository { pool: pool.clone() };
    let sessions_deleted = repo
        .delete_expired_sessions()
        .await
        .map_err(|err| format!("Failed to expire sessions: {err:?}"))?;
    let activities_deleted = repo
        .delete_expired_activities(config.retention.activity_days)
        .await
        .map_err(|err| format!("Failed to expire activity records: {err:?}"))?;

    pool.close().await;

    Ok(MaintenanceReport {
        sessions_deleted,
        activities_deleted,
    })
}
