use serde_json::Value;

#[test]
fn openapi_documents_permission_endpoints() -> anyhow::Result<()> {
    // Build the OpenAPI document the same way the server does
    let doc = storefront::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let paths = v
        .get("paths")
        .and_then(Value::as_object)
        .expect("paths must exist");
    for path in [
        "/permissions",
        "/permissions/check",
        "/users/{id}/permissions",
        "/groups/{id}/permissions",
        "/groups/{id}/members/{user_id}",
        "/auth/refresh-token",
        "/auth/refresh-refresh-token",
        "/auth/change-password",
        "/auth/verify-password",
    ] {
        assert!(paths.contains_key(path), "OpenAPI missing path '{}'", path);
    }

    let user_grants = &paths["/users/{id}/permissions"];
    for method in ["get", "post", "put", "delete"] {
        assert!(user_grants.get(method).is_some(), "missing {} on user grants", method);
    }

    Ok(())
}

#[test]
fn openapi_has_grant_schema_and_bearer_auth() -> anyhow::Result<()> {
    let doc = storefront::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let props = v
        .pointer("/components/schemas/Grant/properties")
        .and_then(Value::as_object)
        .expect("components.schemas.Grant.properties must exist");
    for key in ["id", "owner_id", "capability", "target", "enabled", "denied"] {
        assert!(props.contains_key(key), "OpenAPI Grant schema missing '{}'", key);
    }

    assert!(
        v.pointer("/components/securitySchemes/bearerAuth").is_some(),
        "bearerAuth scheme must be registered"
    );
    Ok(())
}
