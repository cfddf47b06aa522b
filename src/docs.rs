use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Map, Value};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::models;
use crate::routes::{auth, categories, groups, health, permissions, products, users};

#[derive(OpenApi)]
#[openapi(
	paths(
		health::health,
		auth::register,
		auth::login,
		auth::me,
		auth::logout,
		auth::refresh_token,
		auth::rotate_refresh_token,
		auth::change_password,
		auth::verify_current_password,
		products::list_products,
		products::create_product,
		products::get_product,
		products::update_product,
		products::delete_product,
		products::list_options,
		products::create_option,
		products::delete_option,
		categories::list_categories,
		categories::create_category,
		categories::get_category,
		categories::update_category,
		categories::delete_category,
		users::list_users,
		users::get_user,
		users::update_user,
		users::delete_user,
		groups::list_groups,
		groups::create_group,
		groups::get_group,
		groups::delete_group,
		groups::list_members,
		groups::add_member,
		groups::remove_member,
		permissions::list_capabilities,
		permissions::get_capability,
		permissions::check,
		permissions::list_user_grants,
		permissions::assign_user_grants,
		permissions::update_user_grants,
		permissions::revoke_user_grants,
		permissions::list_group_grants,
		permissions::assign_group_grants,
		permissions::update_group_grants,
		permissions::revoke_group_grants
	),
	components(
		schemas(
			health::HealthResponse,
			auth::MessageResponse,
			models::user::User,
			models::user::AuthResponse,
			models::user::LoginRequest,
			models::user::RegisterRequest,
			models::user::UserUpdateRequest,
			models::user::RefreshRequest,
			models::user::AccessTokenResponse,
			models::user::RefreshTokenResponse,
			models::user::LogoutRequest,
			models::user::ChangePasswordRequest,
			models::user::VerifyPasswordRequest,
			models::product::Product,
			models::product::ProductCreateRequest,
			models::product::ProductUpdateRequest,
			models::product::ProductOption,
			models::product::ProductOptionCreateRequest,
			models::product::Category,
			models::product::CategoryCreateRequest,
			models::product::CategoryUpdateRequest,
			models::group::Group,
			models::group::GroupCreateRequest,
			models::group::Membership,
			models::group::AddMemberRequest,
			models::permission::Capability,
			models::permission::Grant,
			models::permission::AssignEntry,
			models::permission::AssignRequest,
			models::permission::AssignStatus,
			models::permission::AssignOutcome,
			models::permission::GrantChange,
			models::permission::UpdateGrantsRequest,
			models::permission::RevokeRequest,
			models::permission::RevokeResponse,
			models::permission::CheckRequest,
			models::permission::CheckResponse
		)
	),
	tags(
		(name = "Health", description = "Liveness and database status"),
		(name = "Auth", description = "Authentication endpoints"),
		(name = "Products", description = "Product catalog"),
		(name = "Categories", description = "Product categories"),
		(name = "Users", description = "User accounts"),
		(name = "Groups", description = "Groups and memberships"),
		(name = "Permissions", description = "Capability catalog, grants and access checks")
	)
)]
pub struct ApiDoc;

pub fn build_openapi(port: u16) -> anyhow::Result<utoipa::openapi::OpenApi> {
	let mut doc = serde_json::to_value(ApiDoc::openapi())?;

	let root = doc
		.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("OpenAPI root must be an object"))?;

	ensure_security_components(root)?;
	ensure_global_security(root);
	ensure_servers(root, port);
	add_examples(root);

	Ok(serde_json::from_value(doc)?)
}

pub fn swagger_routes(doc: utoipa::openapi::OpenApi) -> anyhow::Result<Router> {
	let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
		.try_it_out_enabled(true)
		.with_credentials(true)
		.persist_authorization(true);

	let doc_json = Arc::new(serde_json::to_value(&doc)?);

	let json_route = get(move || {
		let doc_json = Arc::clone(&doc_json);
		async move { Json((*doc_json).clone()) }
	});

	Ok(Router::new()
		.route("/api-docs/openapi.json", json_route)
		.merge(SwaggerUi::new("/docs").config(swagger_config)))
}

fn ensure_security_components(root: &mut Map<String, Value>) -> anyhow::Result<()> {
	let schemes = root
		.entry("components")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("components must be an object"))?
		.entry("securitySchemes")
		.or_insert_with(|| Value::Object(Map::new()))
		.as_object_mut()
		.ok_or_else(|| anyhow::anyhow!("securitySchemes must be an object"))?;

	schemes.insert(
		"bearerAuth".to_string(),
		json!({
			"type": "http",
			"scheme": "bearer",
			"bearerFormat": "JWT"
		}),
	);
	Ok(())
}

fn ensure_global_security(root: &mut Map<String, Value>) {
	root
		.entry("security")
		.or_insert_with(|| json!([{ "bearerAuth": [] }]));
}

fn ensure_servers(root: &mut Map<String, Value>, port: u16) {
	let server_url = format!("http://localhost:{port}");

	match root.get_mut("servers") {
		Some(Value::Array(servers)) => {
			let has = servers
				.iter()
				.any(|v| v.get("url").and_then(Value::as_str) == Some(server_url.as_str()));
			if !has {
				servers.push(json!({ "url": server_url }));
			}
		}
		_ => {
			root.insert("servers".to_string(), json!([{ "url": server_url }]));
		}
	}
}

fn add_examples(root: &mut Map<String, Value>) {
	let Some(paths) = root.get_mut("paths").and_then(Value::as_object_mut) else { return; };

	for item in paths.values_mut() {
		let Some(operations) = item.as_object_mut() else { continue; };
		for operation in operations.values_mut() {
			apply_request_examples(operation);
		}
	}
}

fn apply_request_examples(operation: &mut Value) {
	let Some(request_body) = operation.get_mut("requestBody") else { return; };
	let Some(content) = request_body.get_mut("content").and_then(Value::as_object_mut) else { return; };
	let Some(app_json) = content.get_mut("application/json").and_then(Value::as_object_mut) else { return; };
	let Some(reference) = app_json
		.get("schema")
		.and_then(|schema| schema.get("$ref"))
		.and_then(Value::as_str)
	else {
		return;
	};

	let example = match reference {
		"#/components/schemas/AssignRequest" => Some(json!({
			"permissions": [
				{ "capability": "edit_product", "target": "all", "enabled": true },
				{ "capability": "delete_product", "target": 42, "denied": true }
			]
		})),
		"#/components/schemas/UpdateGrantsRequest" => Some(json!({
			"grants": [{ "id": 7, "enabled": false, "denied": true }]
		})),
		"#/components/schemas/RevokeRequest" => Some(json!({
			"grant_ids": [7],
			"capabilities": ["edit_product"]
		})),
		"#/components/schemas/CheckRequest" => Some(json!({
			"capability": "edit_product",
			"target": 42
		})),
		_ => None,
	};

	if let Some(example) = example {
		app_json.insert("example".to_string(), example);
	}
}
