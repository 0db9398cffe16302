use crate::auth::{CurrentUser, SESSION_COOKIE};
use crate::database::postgres_repository::PostgresRepository;
use crate::database::session::SessionRepository;
use crate::error::app_error::AppError;
use crate::models::session::{DeactivatedResponse, SessionResponse};
use rocket::http::{Cookie, CookieJar};
use rocket::serde::json::Json;
use rocket::{State, delete, get};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;

/// List the caller's active (unexpired) sessions.
#[openapi(tag = "Sessions")]
#[get("/")]
pub async fn list_sessions(pool: &State<PgPool>, current_user: CurrentUser) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let sessions = repo.find_active_sessions(&current_user.id).await?;
    Ok(Json(sessions.iter().map(SessionResponse::from).collect()))
}

/// Deactivate one of the caller's sessions (e.g. "sign out that device").
/// A session belonging to someone else is indistinguishable from a missing
/// one.
#[openapi(tag = "Sessions")]
#[delete("/<id>")]
pub async fn deactivate_session(pool: &State<PgPool>, current_user: CurrentUser, id: &str) -> Result<Json<SessionResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let session_id = Uuid::parse_str(id)?;
    let session = repo.deactivate_user_session(&session_id, &current_user.id).await?;
    Ok(Json(SessionResponse::from(&session)))
}

/// Force-logout everywhere: deactivate every active session of the caller.
#[openapi(tag = "Sessions")]
#[delete("/")]
pub async fn deactivate_all_sessions(
    pool: &State<PgPool>,
    cookies: &CookieJar<'_>,
    current_user: CurrentUser,
) -> Result<Json<DeactivatedResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let deactivated = repo.deactivate_all_user_sessions(&current_user.id).await?;
    cookies.remove_private(Cookie::build(SESSION_COOKIE).build());
    Ok(Json(DeactivatedResponse { deactivated }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![list_sessions, deactivate_session, deactivate_all_sessions]
}
