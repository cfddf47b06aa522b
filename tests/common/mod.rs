#![allow(dead_code)]

use anyhow::{Context, Result};
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

use storefront::authz::capabilities;
use storefront::db::catalog;

/// A migrated database in a temp dir with the built-in catalog synced.
/// Keep the value alive for as long as the pool is used.
pub struct TestDb {
    _dir: TempDir,
    pub pool: SqlitePool,
}

pub async fn setup() -> Result<TestDb> {
    let dir = tempfile::tempdir().context("failed to create tempdir")?;
    let opts = SqliteConnectOptions::new()
        .filename(dir.path().join("test.db"))
        .create_if_missing(true)
        .foreign_keys(true);
    let pool = SqlitePool::connect_with(opts).await?;

    let migrator = sqlx::migrate::Migrator::new(std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations"))
        .await?;
    migrator.run(&pool).await?;

    catalog::sync(&pool, &capabilities::desired()).await?;

    Ok(TestDb { _dir: dir, pool })
}

pub async fn app(pool: &SqlitePool) -> Result<Router> {
    // tests run in CI/container; ensure a JWT secret is available for signing tokens
    std::env::set_var("JWT_SECRET", "test-secret");
    Ok(storefront::create_app(pool.clone()).await?)
}

/// Inserts a user row directly and returns its id.
pub async fn insert_user(pool: &SqlitePool, email: &str) -> Result<i64> {
    let now = chrono::Utc::now();
    let result = sqlx::query(
        "INSERT INTO users (name, email, password_hash, created_at, updated_at) VALUES (?, ?, 'x', ?, ?)",
    )
    .bind(email)
    .bind(email)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn insert_group(pool: &SqlitePool, name: &str) -> Result<i64> {
    let result = sqlx::query("INSERT INTO groups (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(chrono::Utc::now())
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Sends one request and returns the status with the JSON body (`Null` when empty).
pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Result<(StatusCode, Value)> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))?,
        None => builder.body(Body::empty())?,
    };

    let resp = app.clone().oneshot(req).await?;
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), 10_485_760).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

/// Registers through the API and returns `(token, user_id)`.
pub async fn register(app: &Router, name: &str, email: &str) -> Result<(String, i64)> {
    let (status, body) = send(
        app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "name": name, "email": email, "password": "password123" })),
    )
    .await?;
    if status != StatusCode::CREATED {
        panic!("register failed: {} - {}", status, body);
    }

    let token = body["token"].as_str().context("missing token")?.to_string();
    let user_id = body["user"]["id"].as_i64().context("missing user id")?;
    Ok((token, user_id))
}
