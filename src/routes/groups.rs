use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::capabilities::{MANAGE_GROUPS, MANAGE_GROUP_MEMBERS, VIEW_GROUPS};
use crate::authz::AccessRequest;
use crate::db::membership;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::group::{AddMemberRequest, Group, GroupCreateRequest, Membership};
use crate::utils::utc_now;

const SELECT_GROUP: &str = "SELECT id, name, description, created_at FROM groups";

#[utoipa::path(
    get,
    path = "/groups",
    tag = "Groups",
    responses((status = 200, description = "List groups", body = [Group])),
    security(("bearerAuth" = []))
)]
pub async fn list_groups(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Group>>> {
    state
        .authorize(AccessRequest::new(auth.user_id, VIEW_GROUPS))
        .await?;

    let sql = format!("{SELECT_GROUP} ORDER BY id");
    let groups = sqlx::query_as::<_, Group>(&sql)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(groups))
}

#[utoipa::path(
    post,
    path = "/groups",
    tag = "Groups",
    request_body = GroupCreateRequest,
    responses(
        (status = 201, description = "Group created", body = Group),
        (status = 409, description = "Group name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<GroupCreateRequest>,
) -> AppResult<(StatusCode, Json<Group>)> {
    state
        .authorize(AccessRequest::new(auth.user_id, MANAGE_GROUPS))
        .await?;

    if payload.name.trim().is_empty() {
        return Err(AppError::invalid("group name must not be empty"));
    }

    let result = sqlx::query("INSERT INTO groups (name, description, created_at) VALUES (?, ?, ?)")
        .bind(&payload.name)
        .bind(&payload.description)
        .bind(utc_now())
        .execute(&state.pool)
        .await
        .map_err(|err| AppError::on_insert(err, format!("group '{}' already exists", payload.name)))?;

    let group = fetch_group(&state.pool, result.last_insert_rowid()).await?;
    tracing::info!(group_id = group.id, name = %group.name, "group created");
    Ok((StatusCode::CREATED, Json(group)))
}

#[utoipa::path(
    get,
    path = "/groups/{id}",
    tag = "Groups",
    params(("id" = i64, Path, description = "Group id")),
    responses((status = 200, description = "Group detail", body = Group)),
    security(("bearerAuth" = []))
)]
pub async fn get_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Group>> {
    state
        .authorize(AccessRequest::new(auth.user_id, VIEW_GROUPS).on(id))
        .await?;

    Ok(Json(fetch_group(&state.pool, id).await?))
}

/// Deletes the group together with its memberships and grants.
#[utoipa::path(
    delete,
    path = "/groups/{id}",
    tag = "Groups",
    params(("id" = i64, Path, description = "Group id")),
    responses((status = 204, description = "Group deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_group(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state
        .authorize(AccessRequest::new(auth.user_id, MANAGE_GROUPS).on(id))
        .await?;

    let affected = sqlx::query("DELETE FROM groups WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("group not found"));
    }

    tracing::info!(group_id = id, "group deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/groups/{id}/members",
    tag = "Groups",
    params(("id" = i64, Path, description = "Group id")),
    responses((status = 200, description = "Member user ids, ascending", body = [i64])),
    security(("bearerAuth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<i64>>> {
    state
        .authorize(AccessRequest::new(auth.user_id, VIEW_GROUPS).on(id))
        .await?;

    fetch_group(&state.pool, id).await?;
    let members = membership::members_of(&state.pool, id).await?;

    Ok(Json(members.into_iter().collect()))
}

#[utoipa::path(
    post,
    path = "/groups/{id}/members",
    tag = "Groups",
    params(("id" = i64, Path, description = "Group id")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = Membership),
        (status = 409, description = "Already a member")
    ),
    security(("bearerAuth" = []))
)]
pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<AddMemberRequest>,
) -> AppResult<(StatusCode, Json<Membership>)> {
    state
        .authorize(AccessRequest::new(auth.user_id, MANAGE_GROUP_MEMBERS).on(id))
        .await?;

    let membership = membership::add(&state.pool, payload.user_id, id).await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

#[utoipa::path(
    delete,
    path = "/groups/{id}/members/{user_id}",
    tag = "Groups",
    params(
        ("id" = i64, Path, description = "Group id"),
        ("user_id" = i64, Path, description = "Member user id")
    ),
    responses((status = 204, description = "Member removed")),
    security(("bearerAuth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, user_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    state
        .authorize(AccessRequest::new(auth.user_id, MANAGE_GROUP_MEMBERS).on(id))
        .await?;

    membership::remove(&state.pool, user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_group(pool: &SqlitePool, id: i64) -> AppResult<Group> {
    let sql = format!("{SELECT_GROUP} WHERE id = ?");
    sqlx::query_as::<_, Group>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("group not found"))
}
