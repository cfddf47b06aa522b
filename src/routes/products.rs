use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use sqlx::SqlitePool;

use crate::app::AppState;
use crate::authz::capabilities::{CREATE_PRODUCT, DELETE_PRODUCT, EDIT_PRODUCT, VIEW_PRODUCTS};
use crate::authz::AccessRequest;
use crate::errors::{AppError, AppResult};
use crate::jwt::AuthUser;
use crate::models::product::{
    Product, ProductCreateRequest, ProductOption, ProductOptionCreateRequest, ProductUpdateRequest,
};
use crate::utils::utc_now;

const SELECT_PRODUCT: &str =
    "SELECT id, category_id, name, description, price_cents, stock, created_at, updated_at FROM products";

const SELECT_OPTION: &str =
    "SELECT id, product_id, label, price_cents, stock, created_at FROM product_options";

#[utoipa::path(
    get,
    path = "/products",
    tag = "Products",
    responses((status = 200, description = "List products", body = [Product])),
    security(("bearerAuth" = []))
)]
pub async fn list_products(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Vec<Product>>> {
    state
        .authorize(AccessRequest::new(auth.user_id, VIEW_PRODUCTS))
        .await?;

    let sql = format!("{SELECT_PRODUCT} ORDER BY id");
    let products = sqlx::query_as::<_, Product>(&sql)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(products))
}

#[utoipa::path(
    post,
    path = "/products",
    tag = "Products",
    request_body = ProductCreateRequest,
    responses(
        (status = 201, description = "Product created", body = Product),
        (status = 403, description = "Missing create_product")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<ProductCreateRequest>,
) -> AppResult<(StatusCode, Json<Product>)> {
    state
        .authorize(AccessRequest::new(auth.user_id, CREATE_PRODUCT))
        .await?;

    validate_product(&payload.name, payload.price_cents, payload.stock)?;
    ensure_category(&state.pool, payload.category_id).await?;

    let now = utc_now();
    let result = sqlx::query(
        "INSERT INTO products (category_id, name, description, price_cents, stock, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(payload.category_id)
    .bind(&payload.name)
    .bind(&payload.description)
    .bind(payload.price_cents)
    .bind(payload.stock)
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let product = fetch_product(&state.pool, result.last_insert_rowid()).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[utoipa::path(
    get,
    path = "/products/{id}",
    tag = "Products",
    params(("id" = i64, Path, description = "Product id")),
    responses((status = 200, description = "Product detail", body = Product)),
    security(("bearerAuth" = []))
)]
pub async fn get_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Product>> {
    state
        .authorize(AccessRequest::new(auth.user_id, VIEW_PRODUCTS).on(id))
        .await?;

    Ok(Json(fetch_product(&state.pool, id).await?))
}

#[utoipa::path(
    put,
    path = "/products/{id}",
    tag = "Products",
    params(("id" = i64, Path, description = "Product id")),
    request_body = ProductUpdateRequest,
    responses((status = 200, description = "Product updated", body = Product)),
    security(("bearerAuth" = []))
)]
pub async fn update_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<ProductUpdateRequest>,
) -> AppResult<Json<Product>> {
    state
        .authorize(AccessRequest::new(auth.user_id, EDIT_PRODUCT).on(id))
        .await?;

    let mut product = fetch_product(&state.pool, id).await?;

    if let Some(name) = payload.name {
        product.name = name;
    }
    if payload.description.is_some() {
        product.description = payload.description;
    }
    if let Some(price_cents) = payload.price_cents {
        product.price_cents = price_cents;
    }
    if let Some(stock) = payload.stock {
        product.stock = stock;
    }
    if payload.category_id.is_some() {
        ensure_category(&state.pool, payload.category_id).await?;
        product.category_id = payload.category_id;
    }
    validate_product(&product.name, product.price_cents, product.stock)?;

    product.updated_at = utc_now();

    sqlx::query(
        "UPDATE products SET category_id = ?, name = ?, description = ?, price_cents = ?, stock = ?, updated_at = ? WHERE id = ?",
    )
    .bind(product.category_id)
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.price_cents)
    .bind(product.stock)
    .bind(product.updated_at)
    .bind(product.id)
    .execute(&state.pool)
    .await?;

    Ok(Json(product))
}

#[utoipa::path(
    delete,
    path = "/products/{id}",
    tag = "Products",
    params(("id" = i64, Path, description = "Product id")),
    responses((status = 204, description = "Product deleted")),
    security(("bearerAuth" = []))
)]
pub async fn delete_product(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    state
        .authorize(AccessRequest::new(auth.user_id, DELETE_PRODUCT).on(id))
        .await?;

    let affected = sqlx::query("DELETE FROM products WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found("product not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// OPTIONS
// =============================================================================

#[utoipa::path(
    get,
    path = "/products/{id}/options",
    tag = "Products",
    params(("id" = i64, Path, description = "Product id")),
    responses(
        (status = 200, description = "Options of the product", body = [ProductOption]),
        (status = 404, description = "Unknown product")
    ),
    security(("bearerAuth" = []))
)]
pub async fn list_options(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Vec<ProductOption>>> {
    state
        .authorize(AccessRequest::new(auth.user_id, VIEW_PRODUCTS).on(id))
        .await?;

    fetch_product(&state.pool, id).await?;

    let sql = format!("{SELECT_OPTION} WHERE product_id = ? ORDER BY id");
    let options = sqlx::query_as::<_, ProductOption>(&sql)
        .bind(id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(options))
}

/// Adding an option edits the product, so it needs `edit_product` on it.
#[utoipa::path(
    post,
    path = "/products/{id}/options",
    tag = "Products",
    params(("id" = i64, Path, description = "Product id")),
    request_body = ProductOptionCreateRequest,
    responses(
        (status = 201, description = "Option created", body = ProductOption),
        (status = 404, description = "Unknown product")
    ),
    security(("bearerAuth" = []))
)]
pub async fn create_option(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<ProductOptionCreateRequest>,
) -> AppResult<(StatusCode, Json<ProductOption>)> {
    state
        .authorize(AccessRequest::new(auth.user_id, EDIT_PRODUCT).on(id))
        .await?;

    if payload.label.trim().is_empty() {
        return Err(AppError::invalid("option label must not be empty"));
    }
    if matches!(payload.price_cents, Some(price) if price < 0) {
        return Err(AppError::invalid("price_cents must not be negative"));
    }
    if payload.stock < 0 {
        return Err(AppError::invalid("stock must not be negative"));
    }
    fetch_product(&state.pool, id).await?;

    let result = sqlx::query(
        "INSERT INTO product_options (product_id, label, price_cents, stock, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&payload.label)
    .bind(payload.price_cents)
    .bind(payload.stock)
    .bind(utc_now())
    .execute(&state.pool)
    .await?;

    let sql = format!("{SELECT_OPTION} WHERE id = ?");
    let option = sqlx::query_as::<_, ProductOption>(&sql)
        .bind(result.last_insert_rowid())
        .fetch_one(&state.pool)
        .await?;

    Ok((StatusCode::CREATED, Json(option)))
}

#[utoipa::path(
    delete,
    path = "/products/{id}/options/{option_id}",
    tag = "Products",
    params(
        ("id" = i64, Path, description = "Product id"),
        ("option_id" = i64, Path, description = "Option id")
    ),
    responses(
        (status = 204, description = "Option deleted"),
        (status = 404, description = "Option not on this product")
    ),
    security(("bearerAuth" = []))
)]
pub async fn delete_option(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((id, option_id)): Path<(i64, i64)>,
) -> AppResult<StatusCode> {
    state
        .authorize(AccessRequest::new(auth.user_id, EDIT_PRODUCT).on(id))
        .await?;

    let affected = sqlx::query("DELETE FROM product_options WHERE id = ? AND product_id = ?")
        .bind(option_id)
        .bind(id)
        .execute(&state.pool)
        .await?;

    if affected.rows_affected() == 0 {
        return Err(AppError::not_found(format!("option {option_id} not found on product {id}")));
    }

    Ok(StatusCode::NO_CONTENT)
}

fn validate_product(name: &str, price_cents: i64, stock: i64) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::invalid("product name must not be empty"));
    }
    if price_cents < 0 {
        return Err(AppError::invalid("price_cents must not be negative"));
    }
    if stock < 0 {
        return Err(AppError::invalid("stock must not be negative"));
    }
    Ok(())
}

async fn ensure_category(pool: &SqlitePool, category_id: Option<i64>) -> AppResult<()> {
    let Some(category_id) = category_id else {
        return Ok(());
    };

    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM categories WHERE id = ?")
        .bind(category_id)
        .fetch_one(pool)
        .await?;

    if count == 0 {
        return Err(AppError::not_found(format!("category {category_id} not found")));
    }
    Ok(())
}

async fn fetch_product(pool: &SqlitePool, id: i64) -> AppResult<Product> {
    let sql = format!("{SELECT_PRODUCT} WHERE id = ?");
    sqlx::query_as::<_, Product>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("product not found"))
}
