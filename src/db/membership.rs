//! Group membership index: users and groups, many-to-many.

use std::collections::BTreeSet;

use sqlx::{Executor, Sqlite, SqlitePool};

use crate::errors::{AppError, AppResult};
use crate::models::group::Membership;
use crate::utils::utc_now;

pub async fn groups_of<'e, E>(executor: E, user_id: i64) -> AppResult<BTreeSet<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let ids: Vec<i64> = sqlx::query_scalar("SELECT group_id FROM group_members WHERE user_id = ?")
        .bind(user_id)
        .fetch_all(executor)
        .await?;
    Ok(ids.into_iter().collect())
}

pub async fn members_of<'e, E>(executor: E, group_id: i64) -> AppResult<BTreeSet<i64>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let ids: Vec<i64> = sqlx::query_scalar("SELECT user_id FROM group_members WHERE group_id = ?")
        .bind(group_id)
        .fetch_all(executor)
        .await?;
    Ok(ids.into_iter().collect())
}

pub async fn exists<'e, E>(executor: E, user_id: i64, group_id: i64) -> AppResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM group_members WHERE user_id = ? AND group_id = ?")
        .bind(user_id)
        .bind(group_id)
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}

/// Adds `user_id` to `group_id`. Both must exist; a repeated add is `Conflict`.
pub async fn add(pool: &SqlitePool, user_id: i64, group_id: i64) -> AppResult<Membership> {
    let user: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    if user == 0 {
        return Err(AppError::not_found(format!("user {user_id} not found")));
    }

    let group: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM groups WHERE id = ?")
        .bind(group_id)
        .fetch_one(pool)
        .await?;
    if group == 0 {
        return Err(AppError::not_found(format!("group {group_id} not found")));
    }

    sqlx::query("INSERT INTO group_members (user_id, group_id, created_at) VALUES (?, ?, ?)")
        .bind(user_id)
        .bind(group_id)
        .bind(utc_now())
        .execute(pool)
        .await
        .map_err(|err| {
            AppError::on_insert(err, format!("user {user_id} is already a member of group {group_id}"))
        })?;

    tracing::info!(user_id, group_id, "group member added");
    Ok(Membership { user_id, group_id })
}

/// Removes a membership; `NotFound` when there was none.
pub async fn remove(pool: &SqlitePool, user_id: i64, group_id: i64) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM group_members WHERE user_id = ? AND group_id = ?")
        .bind(user_id)
        .bind(group_id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found(format!(
            "user {user_id} is not a member of group {group_id}"
        )));
    }

    tracing::info!(user_id, group_id, "group member removed");
    Ok(())
}
