use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::db::refresh_tokens;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::user::{
    AccessTokenResponse, AuthResponse, ChangePasswordRequest, DbUser, LoginRequest, LogoutRequest,
    RefreshRequest, RefreshTokenResponse, RegisterRequest, User, VerifyPasswordRequest,
};
use crate::utils::{hash_password, utc_now, verify_password};

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    message: String,
}

const SELECT_USER: &str = "SELECT id, name, email, password_hash, created_at, updated_at FROM users";

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 409, description = "Email already in use")
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    if payload.name.trim().is_empty() {
        return Err(AppError::invalid("name must not be empty"));
    }
    ensure_email_available(&state.pool, &payload.email).await?;

    let password_hash = hash_password(&payload.password)?;
    let now = utc_now();

    let result = sqlx::query(
        "INSERT INTO users (name, email, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&payload.name)
    .bind(&payload.email)
    .bind(password_hash)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|err| AppError::on_insert(err, "email already in use"))?;

    let user: User = fetch_user_by_id(&state.pool, result.last_insert_rowid()).await?.into();
    let token = state.jwt.encode(user.id)?;
    let refresh_token = refresh_tokens::issue(&state.pool, user.id, state.jwt.refresh_ttl()).await?;

    tracing::info!(user_id = user.id, "user registered");
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            refresh_token,
            user,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let sql = format!("{SELECT_USER} WHERE email = ?");
    let db_user = sqlx::query_as::<_, DbUser>(&sql)
        .bind(&payload.email)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::unauthorized("invalid credentials"))?;

    let password_ok = verify_password(&payload.password, &db_user.password_hash)?;
    if !password_ok {
        return Err(AppError::unauthorized("invalid credentials"));
    }

    let token = state.jwt.encode(db_user.id)?;
    let refresh_token = refresh_tokens::issue(&state.pool, db_user.id, state.jwt.refresh_ttl()).await?;
    Ok(Json(AuthResponse {
        token,
        refresh_token,
        user: db_user.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Auth",
    responses((status = 200, description = "Current user", body = User)),
    security(("bearerAuth" = []))
)]
pub async fn me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<User>> {
    let user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    Ok(Json(user.into()))
}

/// Revokes the presented token; later requests with it are rejected.
/// A refresh token in the body is dropped as well.
#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Auth",
    request_body = LogoutRequest,
    responses((status = 200, description = "Logout acknowledged", body = MessageResponse)),
    security(("bearerAuth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Option<Json<LogoutRequest>>,
) -> AppResult<Json<MessageResponse>> {
    sqlx::query("INSERT OR IGNORE INTO revoked_tokens (token_hash, user_id, revoked_at) VALUES (?, ?, ?)")
        .bind(&auth.token_digest)
        .bind(auth.user_id)
        .bind(utc_now())
        .execute(&state.pool)
        .await?;

    if let Some(refresh_token) = payload.and_then(|Json(body)| body.refresh_token) {
        refresh_tokens::revoke(&state.pool, auth.user_id, &refresh_token).await?;
    }

    Ok(Json(MessageResponse {
        message: "Logged out".to_string(),
    }))
}

/// Issues a new access token; the refresh token stays valid.
#[utoipa::path(
    post,
    path = "/auth/refresh-token",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = AccessTokenResponse),
        (status = 401, description = "Unknown or expired refresh token")
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<AccessTokenResponse>> {
    let record = refresh_tokens::find_active(&state.pool, &payload.refresh_token).await?;
    let token = state.jwt.encode(record.user_id)?;
    Ok(Json(AccessTokenResponse { token }))
}

/// Exchanges a refresh token for a new one; the presented token is consumed.
#[utoipa::path(
    post,
    path = "/auth/refresh-refresh-token",
    tag = "Auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Replacement refresh token", body = RefreshTokenResponse),
        (status = 401, description = "Unknown, expired or exhausted refresh token")
    )
)]
pub async fn rotate_refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> AppResult<Json<RefreshTokenResponse>> {
    let (user_id, refresh_token) =
        refresh_tokens::rotate(&state.pool, &payload.refresh_token, state.jwt.refresh_ttl()).await?;

    tracing::info!(user_id, "refresh token rotated");
    Ok(Json(RefreshTokenResponse { refresh_token }))
}

/// Replaces the caller's password and drops all of their refresh tokens.
#[utoipa::path(
    post,
    path = "/auth/change-password",
    tag = "Auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Current password wrong or new password invalid")
    ),
    security(("bearerAuth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ChangePasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    if !verify_password(&payload.current_password, &user.password_hash)? {
        return Err(AppError::invalid("current password is incorrect"));
    }
    if payload.new_password == payload.current_password {
        return Err(AppError::invalid("new password must differ from the current one"));
    }
    let password_hash = hash_password(&payload.new_password)?;

    let mut tx = state.pool.begin().await?;
    sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
        .bind(password_hash)
        .bind(utc_now())
        .bind(user.id)
        .execute(&mut *tx)
        .await?;
    let dropped = refresh_tokens::revoke_all(&mut *tx, user.id).await?;
    tx.commit().await?;

    tracing::info!(user_id = user.id, refresh_tokens_dropped = dropped, "password changed");
    Ok(Json(MessageResponse {
        message: "Password changed".to_string(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/verify-password",
    tag = "Auth",
    request_body = VerifyPasswordRequest,
    responses(
        (status = 200, description = "Password matches", body = MessageResponse),
        (status = 400, description = "Password does not match")
    ),
    security(("bearerAuth" = []))
)]
pub async fn verify_current_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<VerifyPasswordRequest>,
) -> AppResult<Json<MessageResponse>> {
    let user = fetch_user_by_id(&state.pool, auth.user_id).await?;
    if !verify_password(&payload.password, &user.password_hash)? {
        return Err(AppError::invalid("password is incorrect"));
    }

    Ok(Json(MessageResponse {
        message: "Password is correct".to_string(),
    }))
}

async fn ensure_email_available(pool: &SqlitePool, email: &str) -> AppResult<()> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE email = ?")
        .bind(email)
        .fetch_one(pool)
        .await?;

    if count > 0 {
        return Err(AppError::conflict("email already in use"));
    }

    Ok(())
}

pub(crate) async fn fetch_user_by_id(pool: &SqlitePool, user_id: i64) -> AppResult<DbUser> {
    let sql = format!("{SELECT_USER} WHERE id = ?");
    sqlx::query_as::<_, DbUser>(&sql)
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}
