use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::capabilities::{CREATE_CATEGORY, DELETE_CATEGORY, EDIT_CATEGORY, VIEW_CATEGORIES};
use crate::authz::AccessRequest;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::product::{Category, CategoryCreateRequest, CategoryUpdateRequest};
use crate::utils::utc_now;

const SELECT_CATEGORY: &str = "SELECT id, name, description, created_at, updated_at FROM categories";

#[utoipa::path(
    get,
    path = "/categories",
    tag = "Categories",
    responses((status = 200, description = "List categories", body = [Category])),
    security(("bearerAuth" = []))
)]
pub async fn list_categories(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Category>>> {
    state
        .authorize(AccessRequest::new(auth.user_id, VIEW_CATEGORIES))
        .await?;

    let sql = format!("{SELECT_CATEGORY} ORDER BY name");
    let categories = sqlx::query_as::<_, Category>(&sql)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(categories))
}

#[utoipa::path(
    post,
    path = "/categories",
    tag = "Categories",
    request_body = CategoryCreateRequest,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 409, description = "Category name already exists")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<CategoryCreateRequest>,
) -> AppResult<(StatusCode, Json<Category>)> {
    state
        .authorize(AccessRequest::new(auth.user_id, CREATE_CATEGORY))
        .await?;

    if payload.name.trim().is_empty() {
        return Err(AppError::invalid("category name must not be empty"));
    }

    let now = utc_now();
    let result = sqlx::query(
        "INSERT INTO categories (name, description, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await
    .map_err(|err| AppError::on_insert(err, format!("category '{}' already exists", payload.name)))?;

    let category = fetch_category(&state.pool, result.last_insert_rowid()).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

#[utoipa::path(
    get,
    path = "/categories/{id}",
    tag = "Categories",
    params(("id" = i64, Path, description = "Category id")),
    responses((status = 200, description = "Category detail", body = Category)),
    security(("bearerAuth" = []))
)]
pub async fn get_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Category>> {
    state
        .authorize(AccessRequest::new(auth.user_id, VIEW_CATEGORIES).on(id))
        .await?;

    Ok(Json(fetch_category(&state.pool, id).await?))
}

#[utoipa::path(
    put,
    path = "/categories/{id}",
    tag = "Categories",
    params(("id" = i64, Path, description = "Category id")),
    request_body = CategoryUpdateRequest,
    responses((status = 200, description = "Category updated", body = Category)),
    security(("bearerAuth" = []))
)]
pub async fn update_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<CategoryUpdateRequest>,
) -> AppResult<Json<Category>> {
    state
        .authorize(AccessRequest::new(auth.user_id, EDIT_CATEGORY).on(id))
        .await?;

    let mut category = fetch_category(&state.pool, id).await?;
    if let Some(name) = payload.name {
        if name.trim().is_empty() {
            return Err(AppError::invalid("category name must not be empty"));
        }
        category.name = name;
    }
    if payload.description.is_some() {
        category.description = payload.description;
    }
    category.updated_at = utc_now();

    sqlx::query("UPDATE categories SET name = ?, description = ?, updated_at = ? WHERE id = ?")
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.updated_at)
        .bind(category.id)
        .execute(&state.pool)
        .await
        .map_err(|err| AppError::on_insert(err, format!("category '{}' already exists", category.name)))?;

    Ok(Json(category))
}

#[utoipa::path(
    delete,
    path = "/categories/{id}",
    tag = "Categories",
    params(("id" = i64, Path, description = "Category id")),
    responses((status = 204, description = "Category deleted; its products become uncategorised")),
    security(("bearerAuth" = []))
)]
pub async fn delete_category(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state
        .authorize(AccessRequest::new(auth.user_id, DELETE_CATEGORY).on(id))
        .await?;

    let affected = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("category not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_category(pool: &SqlitePool, id: i64) -> AppResult<Category> {
    let sql = format!("{SELECT_CATEGORY} WHERE id = ?");
    sqlx::query_as::<_, Category>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("category not found"))
}
