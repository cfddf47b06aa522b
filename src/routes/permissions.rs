use axum::extract::{Path, State};
use axum::Json;

use crate::app::AppState;
use crate::authz::assignment;
use crate::authz::capabilities::{MANAGE_GROUP_PERMISSIONS, MANAGE_USER_PERMISSIONS, VIEW_PERMISSIONS};
use crate::authz::AccessRequest;
use crate::db::{catalog, grants, GrantOwner};
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::permission::{
    AssignOutcome, AssignRequest, Capability, CheckRequest, CheckResponse, Grant, RevokeRequest,
    RevokeResponse, UpdateGrantsRequest,
};

// =============================================================================
// CATALOG
// =============================================================================

#[utoipa::path(
    get,
    path = "/permissions",
    tag = "Permissions",
    responses((status = 200, description = "Capability catalog, by name", body = [Capability])),
    security(("bearerAuth" = []))
)]
pub async fn list_capabilities(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Capability>>> {
    state
        .authorize(AccessRequest::new(auth.user_id, VIEW_PERMISSIONS))
        .await?;

    Ok(Json(catalog::describe_all(&state.pool).await?))
}

#[utoipa::path(
    get,
    path = "/permissions/{name}",
    tag = "Permissions",
    params(("name" = String, Path, description = "Capability name")),
    responses(
        (status = 200, description = "Capability detail", body = Capability),
        (status = 404, description = "Unknown capability")
    ),
    security(("bearerAuth" = []))
)]
pub async fn get_capability(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(name): Path<String>,
) -> AppResult<Json<Capability>> {
    state
        .authorize(AccessRequest::new(auth.user_id, VIEW_PERMISSIONS))
        .await?;

    Ok(Json(catalog::get(&state.pool, &name).await?))
}

/// Evaluates a capability for the caller without performing the action.
#[utoipa::path(
    post,
    path = "/permissions/check",
    tag = "Permissions",
    request_body = CheckRequest,
    responses(
        (status = 200, description = "Decision for the caller", body = CheckResponse),
        (status = 404, description = "Unknown capability")
    ),
    security(("bearerAuth" = []))
)]
pub async fn check(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CheckRequest>,
) -> AppResult<Json<CheckResponse>> {
    if matches!(payload.target, Some(id) if id <= 0) {
        return Err(AppError::invalid("target must be a positive id"));
    }

    let request = AccessRequest::new(auth.user_id, payload.capability).on_optional(payload.target);
    let decision = state.authz.decide(&request).await?;

    Ok(Json(CheckResponse {
        capability: request.capability,
        target: request.target,
        allowed: decision.allowed,
        basis: decision.basis.to_string(),
    }))
}

// =============================================================================
// USER GRANTS
// =============================================================================

#[utoipa::path(
    get,
    path = "/users/{id}/permissions",
    tag = "Permissions",
    params(("id" = i64, Path, description = "User id")),
    responses((status = 200, description = "Direct grants of the user", body = [Grant])),
    security(("bearerAuth" = []))
)]
pub async fn list_user_grants(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<Grant>>> {
    list_grants(&state, &auth, GrantOwner::Subject, id).await
}

#[utoipa::path(
    post,
    path = "/users/{id}/permissions",
    tag = "Permissions",
    params(("id" = i64, Path, description = "User id")),
    request_body = AssignRequest,
    responses(
        (status = 200, description = "Per-entry outcome: assigned or unchanged", body = [AssignOutcome]),
        (status = 404, description = "Unknown user or capability")
    ),
    security(("bearerAuth" = []))
)]
pub async fn assign_user_grants(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<AssignRequest>,
) -> AppResult<Json<Vec<AssignOutcome>>> {
    state
        .authorize(AccessRequest::new(auth.user_id, MANAGE_USER_PERMISSIONS).on(id))
        .await?;

    let outcomes = assignment::assign(&state.pool, GrantOwner::Subject, id, payload.permissions).await?;
    Ok(Json(outcomes))
}

#[utoipa::path(
    put,
    path = "/users/{id}/permissions",
    tag = "Permissions",
    params(("id" = i64, Path, description = "User id")),
    request_body = UpdateGrantsRequest,
    responses(
        (status = 200, description = "Updated grants", body = [Grant]),
        (status = 404, description = "Grant not held by the user")
    ),
    security(("bearerAuth" = []))
)]
pub async fn update_user_grants(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateGrantsRequest>,
) -> AppResult<Json<Vec<Grant>>> {
    state
        .authorize(AccessRequest::new(auth.user_id, MANAGE_USER_PERMISSIONS).on(id))
        .await?;

    let updated = assignment::update(&state.pool, GrantOwner::Subject, id, payload.grants).await?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/users/{id}/permissions",
    tag = "Permissions",
    params(("id" = i64, Path, description = "User id")),
    request_body = RevokeRequest,
    responses(
        (status = 200, description = "Revoked grants", body = RevokeResponse),
        (status = 404, description = "Named grant not held by the user")
    ),
    security(("bearerAuth" = []))
)]
pub async fn revoke_user_grants(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<RevokeRequest>,
) -> AppResult<Json<RevokeResponse>> {
    state
        .authorize(AccessRequest::new(auth.user_id, MANAGE_USER_PERMISSIONS).on(id))
        .await?;

    let revoked = assignment::revoke(&state.pool, GrantOwner::Subject, id, payload).await?;
    Ok(Json(RevokeResponse { revoked }))
}

// =============================================================================
// GROUP GRANTS
// =============================================================================

#[utoipa::path(
    get,
    path = "/groups/{id}/permissions",
    tag = "Permissions",
    params(("id" = i64, Path, description = "Group id")),
    responses((status = 200, description = "Grants held by the group", body = [Grant])),
    security(("bearerAuth" = []))
)]
pub async fn list_group_grants(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<Grant>>> {
    list_grants(&state, &auth, GrantOwner::Group, id).await
}

#[utoipa::path(
    post,
    path = "/groups/{id}/permissions",
    tag = "Permissions",
    params(("id" = i64, Path, description = "Group id")),
    request_body = AssignRequest,
    responses((status = 200, description = "Per-entry outcome: assigned or unchanged", body = [AssignOutcome])),
    security(("bearerAuth" = []))
)]
pub async fn assign_group_grants(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<AssignRequest>,
) -> AppResult<Json<Vec<AssignOutcome>>> {
    state
        .authorize(AccessRequest::new(auth.user_id, MANAGE_GROUP_PERMISSIONS).on(id))
        .await?;

    let outcomes = assignment::assign(&state.pool, GrantOwner::Group, id, payload.permissions).await?;
    Ok(Json(outcomes))
}

#[utoipa::path(
    put,
    path = "/groups/{id}/permissions",
    tag = "Permissions",
    params(("id" = i64, Path, description = "Group id")),
    request_body = UpdateGrantsRequest,
    responses((status = 200, description = "Updated grants", body = [Grant])),
    security(("bearerAuth" = []))
)]
pub async fn update_group_grants(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateGrantsRequest>,
) -> AppResult<Json<Vec<Grant>>> {
    state
        .authorize(AccessRequest::new(auth.user_id, MANAGE_GROUP_PERMISSIONS).on(id))
        .await?;

    let updated = assignment::update(&state.pool, GrantOwner::Group, id, payload.grants).await?;
    Ok(Json(updated))
}

#[utoipa::path(
    delete,
    path = "/groups/{id}/permissions",
    tag = "Permissions",
    params(("id" = i64, Path, description = "Group id")),
    request_body = RevokeRequest,
    responses((status = 200, description = "Revoked grants", body = RevokeResponse)),
    security(("bearerAuth" = []))
)]
pub async fn revoke_group_grants(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<RevokeRequest>,
) -> AppResult<Json<RevokeResponse>> {
    state
        .authorize(AccessRequest::new(auth.user_id, MANAGE_GROUP_PERMISSIONS).on(id))
        .await?;

    let revoked = assignment::revoke(&state.pool, GrantOwner::Group, id, payload).await?;
    Ok(Json(RevokeResponse { revoked }))
}

async fn list_grants(
    state: &AppState,
    auth: &AuthUser,
    owner: GrantOwner,
    owner_id: i64,
) -> AppResult<Json<Vec<Grant>>> {
    state
        .authorize(
            AccessRequest::new(auth.user_id, VIEW_PERMISSIONS)
                .on(owner_id)
                .self_scoped(owner == GrantOwner::Subject && owner_id == auth.user_id),
        )
        .await?;

    if !grants::owner_exists(&state.pool, owner, owner_id).await? {
        return Err(AppError::not_found(format!("{} {} not found", owner.label(), owner_id)));
    }

    Ok(Json(grants::list_by_owner(&state.pool, owner, owner_id).await?))
}
