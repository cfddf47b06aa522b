use anyhow::Result;
use serde_json::json;
use sqlx::SqlitePool;

use storefront::authz::assignment;
use storefront::authz::capabilities::{EDIT_PRODUCT, EDIT_USER, VIEW_PRODUCTS};
use storefront::authz::{AccessRequest, DecisionBasis, DefaultPolicyEvaluator, PolicyEvaluator};
use storefront::db::{membership, GrantOwner, SqlGrantSource};
use storefront::errors::AppError;
use storefront::models::permission::AssignEntry;

mod common;

fn entry(capability: &str, target: serde_json::Value, flags: serde_json::Value) -> AssignEntry {
    let mut value = json!({ "capability": capability, "target": target });
    if let Some(extra) = flags.as_object() {
        for (key, flag) in extra {
            value[key.as_str()] = flag.clone();
        }
    }
    serde_json::from_value(value).expect("valid assign entry")
}

fn evaluator(pool: &SqlitePool) -> DefaultPolicyEvaluator<SqlGrantSource> {
    DefaultPolicyEvaluator::new(SqlGrantSource::new(pool.clone()))
}

#[tokio::test]
async fn catalog_default_applies_without_grants() -> Result<()> {
    let db = common::setup().await?;
    let user = common::insert_user(&db.pool, "plain@example.com").await?;
    let engine = evaluator(&db.pool);

    let browse = engine.decide(&AccessRequest::new(user, VIEW_PRODUCTS).on(3)).await?;
    assert!(browse.allowed);
    assert_eq!(browse.basis, DecisionBasis::Default);

    let edit = engine.decide(&AccessRequest::new(user, EDIT_PRODUCT).on(3)).await?;
    assert!(!edit.allowed);
    assert_eq!(edit.basis, DecisionBasis::Default);

    Ok(())
}

#[tokio::test]
async fn all_target_grant_covers_every_instance_and_unscoped_requests() -> Result<()> {
    let db = common::setup().await?;
    let user = common::insert_user(&db.pool, "editor@example.com").await?;
    assignment::assign(
        &db.pool,
        GrantOwner::Subject,
        user,
        vec![entry(EDIT_PRODUCT, json!("all"), json!({ "enabled": true }))],
    )
    .await?;

    let engine = evaluator(&db.pool);
    assert!(engine.check(&AccessRequest::new(user, EDIT_PRODUCT)).await?);
    assert!(engine.check(&AccessRequest::new(user, EDIT_PRODUCT).on(1)).await?);
    assert!(engine.check(&AccessRequest::new(user, EDIT_PRODUCT).on(999)).await?);

    Ok(())
}

#[tokio::test]
async fn concrete_grant_never_answers_an_unscoped_request() -> Result<()> {
    let db = common::setup().await?;
    let user = common::insert_user(&db.pool, "one@example.com").await?;
    assignment::assign(
        &db.pool,
        GrantOwner::Subject,
        user,
        vec![entry(EDIT_PRODUCT, json!(5), json!({ "enabled": true }))],
    )
    .await?;

    let engine = evaluator(&db.pool);
    assert!(engine.check(&AccessRequest::new(user, EDIT_PRODUCT).on(5)).await?);
    assert!(!engine.check(&AccessRequest::new(user, EDIT_PRODUCT).on(6)).await?);

    let unscoped = engine.decide(&AccessRequest::new(user, EDIT_PRODUCT)).await?;
    assert!(!unscoped.allowed);
    assert_eq!(unscoped.basis, DecisionBasis::Default);

    Ok(())
}

#[tokio::test]
async fn most_specific_row_wins() -> Result<()> {
    let db = common::setup().await?;
    let user = common::insert_user(&db.pool, "mixed@example.com").await?;
    assignment::assign(
        &db.pool,
        GrantOwner::Subject,
        user,
        vec![
            entry(EDIT_PRODUCT, json!("all"), json!({ "enabled": true })),
            entry(EDIT_PRODUCT, json!(5), json!({ "denied": true })),
        ],
    )
    .await?;

    let engine = evaluator(&db.pool);
    assert!(!engine.check(&AccessRequest::new(user, EDIT_PRODUCT).on(5)).await?);
    assert!(engine.check(&AccessRequest::new(user, EDIT_PRODUCT).on(6)).await?);

    Ok(())
}

#[tokio::test]
async fn subject_deny_overrides_group_grant_and_self_scope() -> Result<()> {
    let db = common::setup().await?;
    let user = common::insert_user(&db.pool, "denied@example.com").await?;
    let group = common::insert_group(&db.pool, "editors").await?;
    membership::add(&db.pool, user, group).await?;

    assignment::assign(
        &db.pool,
        GrantOwner::Group,
        group,
        vec![
            entry(EDIT_PRODUCT, json!("all"), json!({ "enabled": true })),
            entry(EDIT_USER, json!("all"), json!({ "enabled": true })),
        ],
    )
    .await?;
    assignment::assign(
        &db.pool,
        GrantOwner::Subject,
        user,
        vec![
            entry(EDIT_PRODUCT, json!("all"), json!({ "denied": true })),
            entry(EDIT_USER, json!(user), json!({ "denied": true })),
        ],
    )
    .await?;

    let engine = evaluator(&db.pool);

    let product = engine.decide(&AccessRequest::new(user, EDIT_PRODUCT).on(1)).await?;
    assert!(!product.allowed);
    assert_eq!(product.basis, DecisionBasis::Subject);

    let own_record = engine
        .decide(&AccessRequest::new(user, EDIT_USER).on(user).self_scoped(true))
        .await?;
    assert!(!own_record.allowed);
    assert_eq!(own_record.basis, DecisionBasis::Subject);

    Ok(())
}

#[tokio::test]
async fn inert_subject_row_defers_to_groups() -> Result<()> {
    let db = common::setup().await?;
    let user = common::insert_user(&db.pool, "inert@example.com").await?;
    let group = common::insert_group(&db.pool, "staff").await?;
    membership::add(&db.pool, user, group).await?;

    // No flags: the row exists but holds no opinion.
    assignment::assign(&db.pool, GrantOwner::Subject, user, vec![entry(EDIT_PRODUCT, json!("all"), json!({}))]).await?;
    assignment::assign(
        &db.pool,
        GrantOwner::Group,
        group,
        vec![entry(EDIT_PRODUCT, json!("all"), json!({ "enabled": true }))],
    )
    .await?;

    let decision = evaluator(&db.pool)
        .decide(&AccessRequest::new(user, EDIT_PRODUCT).on(2))
        .await?;
    assert!(decision.allowed);
    assert_eq!(decision.basis, DecisionBasis::Group { group_id: group });

    Ok(())
}

#[tokio::test]
async fn self_scope_allows_when_subject_grants_are_silent() -> Result<()> {
    let db = common::setup().await?;
    let user = common::insert_user(&db.pool, "self@example.com").await?;
    let engine = evaluator(&db.pool);

    let own = engine
        .decide(&AccessRequest::new(user, EDIT_USER).on(user).self_scoped(true))
        .await?;
    assert!(own.allowed);
    assert_eq!(own.basis, DecisionBasis::SelfScope);

    let other = engine.decide(&AccessRequest::new(user, EDIT_USER).on(user + 1)).await?;
    assert!(!other.allowed);

    Ok(())
}

#[tokio::test]
async fn lowest_group_id_with_an_opinion_decides() -> Result<()> {
    let db = common::setup().await?;
    let user = common::insert_user(&db.pool, "member@example.com").await?;
    let silent = common::insert_group(&db.pool, "silent").await?;
    let blockers = common::insert_group(&db.pool, "blockers").await?;
    let granters = common::insert_group(&db.pool, "granters").await?;
    assert!(silent < blockers && blockers < granters);

    for group in [granters, silent, blockers] {
        membership::add(&db.pool, user, group).await?;
    }

    assignment::assign(&db.pool, GrantOwner::Group, silent, vec![entry(EDIT_PRODUCT, json!("all"), json!({}))]).await?;
    assignment::assign(
        &db.pool,
        GrantOwner::Group,
        blockers,
        vec![entry(EDIT_PRODUCT, json!("all"), json!({ "denied": true }))],
    )
    .await?;
    assignment::assign(
        &db.pool,
        GrantOwner::Group,
        granters,
        vec![entry(EDIT_PRODUCT, json!("all"), json!({ "enabled": true }))],
    )
    .await?;

    let decision = evaluator(&db.pool)
        .decide(&AccessRequest::new(user, EDIT_PRODUCT).on(4))
        .await?;
    assert!(!decision.allowed);
    assert_eq!(decision.basis, DecisionBasis::Group { group_id: blockers });

    Ok(())
}

#[tokio::test]
async fn unknown_capability_is_not_found_even_when_self_scoped() -> Result<()> {
    let db = common::setup().await?;
    let user = common::insert_user(&db.pool, "ghost@example.com").await?;

    let err = evaluator(&db.pool)
        .decide(&AccessRequest::new(user, "launch_rockets").on(user).self_scoped(true))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");

    Ok(())
}

#[tokio::test]
async fn leaving_a_group_drops_its_grants() -> Result<()> {
    let db = common::setup().await?;
    let user = common::insert_user(&db.pool, "leaver@example.com").await?;
    let group = common::insert_group(&db.pool, "temps").await?;
    membership::add(&db.pool, user, group).await?;
    assignment::assign(
        &db.pool,
        GrantOwner::Group,
        group,
        vec![entry(EDIT_PRODUCT, json!("all"), json!({ "enabled": true }))],
    )
    .await?;

    let engine = evaluator(&db.pool);
    assert!(engine.check(&AccessRequest::new(user, EDIT_PRODUCT).on(1)).await?);

    membership::remove(&db.pool, user, group).await?;
    assert!(!engine.check(&AccessRequest::new(user, EDIT_PRODUCT).on(1)).await?);

    Ok(())
}
