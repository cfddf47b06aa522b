use axum::extract::State;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

use crate::app::AppState;
use crate::errors::AppResult;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub db_ok: bool,
    pub db_error: Option<String>,
    /// Number of capabilities in the synced catalog.
    pub capabilities: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/health",
    tag = "Health",
    responses((status = 200, description = "Health check", body = HealthResponse))
)]
pub async fn health(State(state): State<AppState>) -> AppResult<Json<HealthResponse>> {
    let catalog = sqlx::query_scalar::<_, i64>("SELECT COUNT(1) FROM capabilities")
        .fetch_one(&state.pool)
        .await;

    let response = match catalog {
        Ok(count) => HealthResponse {
            status: "ok",
            db_ok: true,
            db_error: None,
            capabilities: Some(count),
        },
        Err(e) => HealthResponse {
            status: "degraded",
            db_ok: false,
            db_error: Some(e.to_string()),
            capabilities: None,
        },
    };

    Ok(Json(response))
}
