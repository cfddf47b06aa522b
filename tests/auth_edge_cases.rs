use anyhow::Result;
use axum::http::StatusCode;
use serde_json::json;

use storefront::db::refresh_tokens;
use storefront::utils::token_digest;

mod common;

#[tokio::test]
async fn auth_edge_cases() -> Result<()> {
    let db = common::setup().await?;
    let app = common::app(&db.pool).await?;

    // 1. Register with short password
    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "name": "Short Pass", "email": "short@example.com", "password": "short" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST, "Should fail with bad request for short password");

    // 2. Register with valid user
    let (token, user_id) = common::register(&app, "Valid User", "valid@example.com").await?;

    // 3. Duplicate email
    let (status, body) = common::send(
        &app,
        "POST",
        "/auth/register",
        None,
        Some(json!({ "name": "Again", "email": "valid@example.com", "password": "password123" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "conflict");

    // 4. Login with wrong password
    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "valid@example.com", "password": "wrongpassword" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 5. Login with unknown email
    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "nobody@example.com", "password": "password123" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 6. Protected route without / with a garbage token
    let (status, _) = common::send(&app, "GET", "/auth/me", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = common::send(&app, "GET", "/auth/me", Some("not-a-jwt"), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // 7. Valid token works
    let (status, me) = common::send(&app, "GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["id"].as_i64(), Some(user_id));

    Ok(())
}

#[tokio::test]
async fn logout_revokes_the_presented_token() -> Result<()> {
    let db = common::setup().await?;
    let app = common::app(&db.pool).await?;

    let (token, _) = common::register(&app, "Leaving", "leaving@example.com").await?;

    let (status, _) = common::send(&app, "POST", "/auth/logout", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = common::send(&app, "GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A fresh login issues a token that is not revoked.
    let (status, body) = common::send(
        &app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": "leaving@example.com", "password": "password123" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let fresh = body["token"].as_str().unwrap_or_default().to_string();

    let (status, _) = common::send(&app, "GET", "/auth/me", Some(&fresh), None).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

async fn login(app: &axum::Router, email: &str, password: &str) -> Result<(StatusCode, serde_json::Value)> {
    common::send(
        app,
        "POST",
        "/auth/login",
        None,
        Some(json!({ "email": email, "password": password })),
    )
    .await
}

#[tokio::test]
async fn refresh_token_issues_access_and_rotates() -> Result<()> {
    let db = common::setup().await?;
    let app = common::app(&db.pool).await?;
    common::register(&app, "Refresher", "refresh@example.com").await?;

    let (status, body) = login(&app, "refresh@example.com", "password123").await?;
    assert_eq!(status, StatusCode::OK);
    let first = body["refresh_token"].as_str().unwrap_or_default().to_string();
    assert_eq!(first.len(), 64);

    // A refresh token buys a working access token and stays usable.
    for _ in 0..2 {
        let (status, body) = common::send(
            &app,
            "POST",
            "/auth/refresh-token",
            None,
            Some(json!({ "refresh_token": first })),
        )
        .await?;
        assert_eq!(status, StatusCode::OK);
        let access = body["token"].as_str().unwrap_or_default().to_string();
        let (status, me) = common::send(&app, "GET", "/auth/me", Some(&access), None).await?;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["email"], "refresh@example.com");
    }

    let (status, body) = common::send(
        &app,
        "POST",
        "/auth/refresh-refresh-token",
        None,
        Some(json!({ "refresh_token": first })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let second = body["refresh_token"].as_str().unwrap_or_default().to_string();
    assert_ne!(first, second);

    // The rotated token is consumed.
    for uri in ["/auth/refresh-token", "/auth/refresh-refresh-token"] {
        let (status, body) =
            common::send(&app, "POST", uri, None, Some(json!({ "refresh_token": first }))).await?;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(body["error"], "unauthorized");
    }

    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/refresh-token",
        None,
        Some(json!({ "refresh_token": second })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/refresh-token",
        None,
        Some(json!({ "refresh_token": "made-up" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn expired_and_exhausted_refresh_tokens_are_rejected() -> Result<()> {
    let db = common::setup().await?;
    let app = common::app(&db.pool).await?;
    let (_, user_id) = common::register(&app, "Old", "old@example.com").await?;

    let stale = "stale-refresh-token";
    sqlx::query(
        "INSERT INTO refresh_tokens (token_hash, user_id, rotations, expires_at, created_at) VALUES (?, ?, 0, ?, ?)",
    )
    .bind(token_digest(stale))
    .bind(user_id)
    .bind(chrono::Utc::now() - chrono::Duration::days(1))
    .bind(chrono::Utc::now() - chrono::Duration::days(61))
    .execute(&db.pool)
    .await?;

    let (status, body) = common::send(
        &app,
        "POST",
        "/auth/refresh-token",
        None,
        Some(json!({ "refresh_token": stale })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap_or_default().contains("expired"), "{body}");

    assert_eq!(refresh_tokens::purge_expired(&db.pool).await?, 1);

    let (_, body) = login(&app, "old@example.com", "password123").await?;
    let worn = body["refresh_token"].as_str().unwrap_or_default().to_string();
    sqlx::query("UPDATE refresh_tokens SET rotations = ? WHERE token_hash = ?")
        .bind(refresh_tokens::MAX_ROTATIONS)
        .bind(token_digest(&worn))
        .execute(&db.pool)
        .await?;

    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/refresh-refresh-token",
        None,
        Some(json!({ "refresh_token": worn })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A refused rotation leaves the token itself in place.
    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/refresh-token",
        None,
        Some(json!({ "refresh_token": worn })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn logout_drops_the_refresh_token_it_is_given() -> Result<()> {
    let db = common::setup().await?;
    let app = common::app(&db.pool).await?;
    common::register(&app, "Bye", "bye@example.com").await?;

    let (_, body) = login(&app, "bye@example.com", "password123").await?;
    let access = body["token"].as_str().unwrap_or_default().to_string();
    let refresh = body["refresh_token"].as_str().unwrap_or_default().to_string();

    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/logout",
        Some(&access),
        Some(json!({ "refresh_token": refresh })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/refresh-token",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn change_password_checks_current_and_ends_refresh_sessions() -> Result<()> {
    let db = common::setup().await?;
    let app = common::app(&db.pool).await?;
    let (token, _) = common::register(&app, "Mover", "mover@example.com").await?;
    let (_, body) = login(&app, "mover@example.com", "password123").await?;
    let refresh = body["refresh_token"].as_str().unwrap_or_default().to_string();

    let cases = [
        (json!({ "current_password": "not-my-password", "new_password": "brand-new-pass" }), "incorrect"),
        (json!({ "current_password": "password123", "new_password": "short" }), "at least"),
        (json!({ "current_password": "password123", "new_password": "password123" }), "differ"),
    ];
    for (payload, hint) in cases {
        let (status, body) =
            common::send(&app, "POST", "/auth/change-password", Some(&token), Some(payload)).await?;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].as_str().unwrap_or_default().contains(hint), "{body}");
    }

    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/change-password",
        None,
        Some(json!({ "current_password": "password123", "new_password": "brand-new-pass" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/change-password",
        Some(&token),
        Some(json!({ "current_password": "password123", "new_password": "brand-new-pass" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = login(&app, "mover@example.com", "password123").await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = login(&app, "mover@example.com", "brand-new-pass").await?;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/refresh-token",
        None,
        Some(json!({ "refresh_token": refresh })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // The access token used for the change keeps working.
    let (status, _) = common::send(&app, "GET", "/auth/me", Some(&token), None).await?;
    assert_eq!(status, StatusCode::OK);

    Ok(())
}

#[tokio::test]
async fn verify_password_answers_for_the_caller() -> Result<()> {
    let db = common::setup().await?;
    let app = common::app(&db.pool).await?;
    let (token, _) = common::register(&app, "Checker", "checker@example.com").await?;

    let (status, body) = common::send(
        &app,
        "POST",
        "/auth/verify-password",
        Some(&token),
        Some(json!({ "password": "password123" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Password is correct");

    let (status, body) = common::send(
        &app,
        "POST",
        "/auth/verify-password",
        Some(&token),
        Some(json!({ "password": "password124" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid");

    let (status, _) = common::send(
        &app,
        "POST",
        "/auth/verify-password",
        None,
        Some(json!({ "password": "password123" })),
    )
    .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    Ok(())
}
