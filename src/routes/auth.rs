use crate::auth::{CurrentUser, SESSION_COOKIE, session_cookie_value};
use crate::config::Config;
use crate::database::activity::ActivityRepository;
use crate::database::postgres_repository::PostgresRepository;
use crate::database::session::SessionRepository;
use crate::error::app_error::AppError;
use crate::middleware::ClientInfo;
use crate::models::activity::{ActivityType, NewActivity};
use crate::models::session::{DeactivatedResponse, TokenResponse};
use crate::models::user::{ChangePasswordRequest, LoginRequest, RefreshRequest, UserRequest, UserResponse};
use crate::service::session::issue_session;
use chrono::Duration;
use rocket::http::{Cookie, CookieJar, Status};
use rocket::serde::json::Json;
use rocket::{State, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use tracing::warn;
use validator::Validate;

fn session_cookie(config: &Config, value: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .secure(config.session.cookie_secure)
        .build()
}

/// The audit write is best-effort: a failure here must never fail the
/// action it describes.
async fn record_activity(repo: &PostgresRepository, activity: NewActivity) {
    if let Err(err) = repo.log_activity(&activity).await {
        warn!(error = ?err, activity_type = activity.activity_type.as_str(), "failed to record activity");
    }
}

/// Register a new account.
#[openapi(tag = "Auth")]
#[post("/register", data = "<payload>")]
pub async fn register(pool: &State<PgPool>, payload: Json<UserRequest>) -> Result<(Status, Json<UserResponse>), AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    if repo.get_user_by_email(&payload.email).await?.is_some() {
        return Err(AppError::UserAlreadyExists(payload.email.clone()));
    }

    let user = repo.create_user(&payload.name, &payload.email, &payload.password).await?;
    Ok((Status::Created, Json(UserResponse::from(&user))))
}

/// Verify credentials and issue a fresh session with a new token pair.
#[openapi(tag = "Auth")]
#[post("/login", data = "<payload>")]
pub async fn login(
    pool: &State<PgPool>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
    client: ClientInfo,
    payload: Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };

    let user = match repo.get_user_by_email(&payload.email).await? {
        Some(user) => user,
        None => {
            PostgresRepository::dummy_verify(&payload.password);
            return Err(AppError::InvalidCredentials);
        }
    };
    repo.verify_password(&user, &payload.password).await?;

    // A session-creation failure is fatal to the login; the audit write
    // below is not.
    let session = issue_session(
        &repo,
        &user.id,
        Duration::seconds(config.session.ttl_seconds),
        config.session.token_retry_limit,
        &client.0,
    )
    .await?;

    cookies.add_private(session_cookie(config, session_cookie_value(&session.id, &user.id)));

    record_activity(
        &repo,
        NewActivity::new(user.id, ActivityType::Login, "User logged in").with_client(client.0.ip_address.clone(), client.0.user_agent.clone()),
    )
    .await;

    Ok(Json(TokenResponse::from(&session)))
}

/// Exchange a refresh token for a brand-new session. The old session is
/// deactivated; re-authentication never reactivates a session record.
#[openapi(tag = "Auth")]
#[post("/refresh", data = "<payload>")]
pub async fn refresh(
    pool: &State<PgPool>,
    config: &State<Config>,
    cookies: &CookieJar<'_>,
    client: ClientInfo,
    payload: Json<RefreshRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };

    let old_session = repo
        .find_session_by_refresh_token(&payload.refresh_token)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !old_session.is_active || old_session.is_expired() {
        let _ = repo.delete_session_if_expired(&old_session.id).await;
        return Err(AppError::Unauthorized);
    }

    repo.deactivate_session(&old_session.id).await?;

    let session = issue_session(
        &repo,
        &old_session.user_id,
        Duration::seconds(config.session.ttl_seconds),
        config.session.token_retry_limit,
        &client.0,
    )
    .await?;

    cookies.add_private(session_cookie(config, session_cookie_value(&session.id, &session.user_id)));

    record_activity(
        &repo,
        NewActivity::new(session.user_id, ActivityType::ApiAccess, "Session tokens refreshed")
            .with_client(client.0.ip_address.clone(), client.0.user_agent.clone())
            .with_metadata(serde_json::json!({ "rotated_from": old_session.id })),
    )
    .await;

    Ok(Json(TokenResponse::from(&session)))
}

/// End the current session. The record stays behind, inactive, until a
/// sweep removes it.
#[openapi(tag = "Auth")]
#[post("/logout")]
pub async fn logout(
    pool: &State<PgPool>,
    cookies: &CookieJar<'_>,
    client: ClientInfo,
    current_user: CurrentUser,
) -> Result<Status, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };

    repo.deactivate_session(&current_user.session_id).await?;
    cookies.remove_private(Cookie::build(SESSION_COOKIE).build());

    record_activity(
        &repo,
        NewActivity::new(current_user.id, ActivityType::Logout, "User logged out").with_client(client.0.ip_address.clone(), client.0.user_agent.clone()),
    )
    .await;

    Ok(Status::Ok)
}

/// Change the password and force re-authentication everywhere.
#[openapi(tag = "Auth")]
#[post("/change-password", data = "<payload>")]
pub async fn change_password(
    pool: &State<PgPool>,
    cookies: &CookieJar<'_>,
    client: ClientInfo,
    current_user: CurrentUser,
    payload: Json<ChangePasswordRequest>,
) -> Result<Json<DeactivatedResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };

    repo.change_password(&current_user.id, &payload.current_password, &payload.new_password).await?;

    let deactivated = repo.deactivate_all_user_sessions(&current_user.id).await?;
    cookies.remove_private(Cookie::build(SESSION_COOKIE).build());

    record_activity(
        &repo,
        NewActivity::new(current_user.id, ActivityType::PasswordChange, "Password changed")
            .with_client(client.0.ip_address.clone(), client.0.user_agent.clone())
            .with_metadata(serde_json::json!({ "sessions_deactivated": deactivated })),
    )
    .await;

    Ok(Json(DeactivatedResponse { deactivated }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![register, login, refresh, logout, change_password]
}
