use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::app::AppState;
use crate::authz::capabilities::{DELETE_USER, EDIT_USER, VIEW_USERS};
use crate::authz::AccessRequest;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::user::{DbUser, User, UserUpdateRequest};
use crate::routes::auth::fetch_user_by_id;
use crate::utils::utc_now;

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    responses((status = 200, description = "List users", body = [User])),
    security(("bearerAuth" = []))
)]
pub async fn list_users(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<User>>> {
    state
        .authorize(AccessRequest::new(auth.user_id, VIEW_USERS))
        .await?;

    let users = sqlx::query_as::<_, DbUser>(
        "SELECT id, name, email, password_hash, created_at, updated_at FROM users ORDER BY id",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(users.into_iter().map(User::from).collect()))
}

/// Anyone may read their own account unless a direct grant denies it.
#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    responses(
        (status = 200, description = "User detail", body = User),
        (status = 404, description = "User not found")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<User>> {
    state
        .authorize(
            AccessRequest::new(auth.user_id, VIEW_USERS)
                .on(id)
                .self_scoped(id == auth.user_id),
        )
        .await?;

    Ok(Json(fetch_user_by_id(&state.pool, id).await?.into()))
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    request_body = UserUpdateRequest,
    responses(
        (status = 200, description = "User updated", body = User),
        (status = 409, description = "Email already in use")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UserUpdateRequest>,
) -> AppResult<Json<User>> {
    state
        .authorize(
            AccessRequest::new(auth.user_id, EDIT_USER)
                .on(id)
                .self_scoped(id == auth.user_id),
        )
        .await?;

    let mut user: User = fetch_user_by_id(&state.pool, id).await?.into();

    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return Err(AppError::invalid("name must not be empty"));
        }
        user.name = name;
    }
    if let Some(email) = payload.email {
        user.email = email;
    }
    user.updated_at = utc_now();

    sqlx::query("UPDATE users SET name = ?, email = ?, updated_at = ? WHERE id = ?")
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.updated_at)
        .bind(user.id)
        .execute(&state.pool)
        .await
        .map_err(|err| AppError::on_insert(err, "email already in use"))?;

    Ok(Json(user))
}

/// Deletes the account; its grants and memberships go with it.
#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = i64, Path, description = "User id")),
    responses((status = 204, description = "User deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state
        .authorize(AccessRequest::new(auth.user_id, DELETE_USER).on(id))
        .await?;

    let affected = sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("user not found"));
    }

    tracing::info!(user_id = id, deleted_by = auth.user_id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}
