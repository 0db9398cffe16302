use crate::config::Config;
use crate::database::activity::ActivityRepository;
use crate::database::postgres_repository::PostgresRepository;
use crate::database::session::SessionRepository;
use crate::cron_tasks::MaintenanceReport;
use crate::error::app_error::AppError;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket::serde::json::Json;
use rocket::{State, post, routes};
use sqlx::PgPool;

pub(crate) struct CronAuth;

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CronAuth {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => return Outcome::Error((Status::InternalServerError, AppError::Unauthorized)),
        };

        if config.cron.auth_token.is_empty() {
            return Outcome::Error((Status::BadRequest, AppError::BadRequest("Cron auth token is not configured".to_string())));
        }

        let incoming = req.headers().get_one("x-cron-token");
        match incoming {
            Some(token) if token == config.cron.auth_token => Outcome::Success(CronAuth),
            _ => Outcome::Error((Status::Forbidden, AppError::Forbidden)),
        }
    }
}

/// Active sweep: drops sessions that are expired or merely deactivated.
/// Invoked by an external scheduler.
#[post("/sweep-sessions")]
pub async fn sweep_sessions(pool: &State<PgPool>, _cron_auth: CronAuth) -> Result<Json<MaintenanceReport>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let sessions_deleted = repo.cleanup_expired_sessions().await?;
    tracing::info!(sessions_deleted, "session sweep completed");
    Ok(Json(MaintenanceReport {
        sessions_deleted,
        activities_deleted: 0,
    }))
}

/// Time-based reaper standing in for a store-level TTL: removes sessions
/// past their deadline and activity records past the retention window.
#[post("/expire-records")]
pub async fn expire_records(pool: &State<PgPool>, config: &State<Config>, _cron_auth: CronAuth) -> Result<Json<MaintenanceReport>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let sessions_deleted = repo.delete_expired_sessions().await?;
    let activities_deleted = repo.delete_expired_activities(config.retention.activity_days).await?;
    tracing::info!(sessions_deleted, activities_deleted, "record expiry completed");
    Ok(Json(MaintenanceReport {
        sessions_deleted,
        activities_deleted,
    }))
}

pub fn routes() -> Vec<rocket::Route> {
    routes![sweep_sessions, expire_records]
}
