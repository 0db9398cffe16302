use crate::auth::CurrentUser;
use crate::database::activity::{ActivityRepository, DEFAULT_PAGE_LIMIT, DEFAULT_STATS_WINDOW_DAYS};
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::middleware::ClientInfo;
use crate::models::activity::{ActivityResponse, ActivityStats, ActivityType, LogActivityRequest, NewActivity};
use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use validator::Validate;

/// Append one audit record for the caller. This is the hook feature code
/// calls for file_upload, settings_change and the like; unknown types are
/// rejected before anything is written.
#[openapi(tag = "Activity")]
#[post("/", data = "<payload>")]
pub async fn log_activity(
    pool: &State<PgPool>,
    current_user: CurrentUser,
    client: ClientInfo,
    payload: Json<LogActivityRequest>,
) -> Result<(Status, Json<ActivityResponse>), AppError> {
    payload.validate()?;
    let activity_type: ActivityType = payload.activity_type.parse()?;

    let mut activity = NewActivity::new(current_user.id, activity_type, payload.description.clone())
        .with_client(client.0.ip_address.clone(), client.0.user_agent.clone());
    activity.metadata = payload.metadata.clone();
    if let Some(location) = &payload.location {
        activity.location_country = location.country.clone();
        activity.location_city = location.city.clone();
        activity.location_region = location.region.clone();
    }

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let record = repo.log_activity(&activity).await?;
    Ok((Status::Created, Json(ActivityResponse::from(&record))))
}

/// The caller's activity history, newest first.
#[openapi(tag = "Activity")]
#[get("/?<limit>&<skip>")]
pub async fn list_activities(
    pool: &State<PgPool>,
    current_user: CurrentUser,
    limit: Option<i64>,
    skip: Option<i64>,
) -> Result<Json<Vec<ActivityResponse>>, AppError> {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    let skip = skip.unwrap_or(0);
    if limit < 0 || skip < 0 {
        return Err(AppError::BadRequest("limit and skip must be non-negative".to_string()));
    }

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let activities = repo.get_user_activities(&current_user.id, limit, skip).await?;
    Ok(Json(activities.iter().map(ActivityResponse::from).collect()))
}

/// Per-type counts and most recent occurrence over the trailing window.
#[openapi(tag = "Activity")]
#[get("/stats?<days>")]
pub async fn activity_stats(pool: &State<PgPool>, current_user: CurrentUser, days: Option<i64>) -> Result<Json<Vec<ActivityStats>>, AppError> {
    let days = days.unwrap_or(DEFAULT_STATS_WINDOW_DAYS);
    if days <= 0 {
        return Err(AppError::BadRequest("days must be positive".to_string()));
    }

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let stats = repo.get_activity_stats(&current_user.id, days).await?;
    Ok(Json(stats))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![log_activity, list_activities, activity_stats]
}
