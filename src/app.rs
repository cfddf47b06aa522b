use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::{self, AccessRequest, DefaultPolicyEvaluator, PolicyEvaluator};
use crate::db::SqlGrantSource;
use crate::errors::{AppError, AppResult};
use crate::jwt::JwtConfig;
use crate::routes::{auth, categories, groups, health, permissions, products, users};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub authz: Arc<dyn PolicyEvaluator>,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig) -> Self {
        let evaluator = DefaultPolicyEvaluator::new(SqlGrantSource::new(pool.clone()));
        Self {
            pool,
            jwt: Arc::new(jwt),
            authz: Arc::new(evaluator),
        }
    }

    /// Fails with `Forbidden` unless the request is allowed.
    pub async fn authorize(&self, request: AccessRequest) -> AppResult<()> {
        authz::enforce(self.authz.as_ref(), request).await
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    Ok(router(AppState::new(pool, jwt_config)))
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/refresh-token", post(auth::refresh_token))
        .route("/refresh-refresh-token", post(auth::rotate_refresh_token))
        .route("/change-password", post(auth::change_password))
        .route("/verify-password", post(auth::verify_current_password));

    let product_routes = Router::new()
        .route("/", get(products::list_products).post(products::create_product))
        .route(
            "/:id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route("/:id/options", get(products::list_options).post(products::create_option))
        .route("/:id/options/:option_id", axum::routing::delete(products::delete_option));

    let category_routes = Router::new()
        .route("/", get(categories::list_categories).post(categories::create_category))
        .route(
            "/:id",
            get(categories::get_category)
                .put(categories::update_category)
                .delete(categories::delete_category),
        );

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route(
            "/:id",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route(
            "/:id/permissions",
            get(permissions::list_user_grants)
                .post(permissions::assign_user_grants)
                .put(permissions::update_user_grants)
                .delete(permissions::revoke_user_grants),
        );

    let group_routes = Router::new()
        .route("/", get(groups::list_groups).post(groups::create_group))
        .route("/:id", get(groups::get_group).delete(groups::delete_group))
        .route("/:id/members", get(groups::list_members).post(groups::add_member))
        .route("/:id/members/:user_id", axum::routing::delete(groups::remove_member))
        .route(
            "/:id/permissions",
            get(permissions::list_group_grants)
                .post(permissions::assign_group_grants)
                .put(permissions::update_group_grants)
                .delete(permissions::revoke_group_grants),
        );

    let permission_routes = Router::new()
        .route("/", get(permissions::list_capabilities))
        .route("/check", post(permissions::check))
        .route("/:name", get(permissions::get_capability));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/products", product_routes)
        .nest("/categories", category_routes)
        .nest("/users", user_routes)
        .nest("/groups", group_routes)
        .nest("/permissions", permission_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
