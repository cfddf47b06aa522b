//! Refresh tokens: opaque random strings, persisted only as SHA-256 digests.

use chrono::{DateTime, Duration, Utc};
use rand_core::{OsRng, RngCore};
use sqlx::{Executor, FromRow, Sqlite, SqliteConnection, SqlitePool};

use crate::db::WriteTx;
use crate::errors::{AppError, AppResult};
use crate::utils::{token_digest, utc_now};

/// Rotations allowed along one chain before the user has to log in again.
pub const MAX_ROTATIONS: i64 = 12;

#[derive(Debug, Clone, FromRow)]
pub struct RefreshRecord {
    pub token_hash: String,
    pub user_id: i64,
    pub rotations: i64,
    pub expires_at: DateTime<Utc>,
}

fn generate() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

async fn insert<'e, E>(executor: E, user_id: i64, rotations: i64, ttl: Duration) -> AppResult<String>
where
    E: Executor<'e, Database = Sqlite>,
{
    let token = generate();
    let now = utc_now();

    sqlx::query(
        "INSERT INTO refresh_tokens (token_hash, user_id, rotations, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(token_digest(&token))
    .bind(user_id)
    .bind(rotations)
    .bind(now + ttl)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(token)
}

/// Issues a new token for `user_id`, purging expired rows first.
pub async fn issue(pool: &SqlitePool, user_id: i64, ttl: Duration) -> AppResult<String> {
    let purged = purge_expired(pool).await?;
    if purged > 0 {
        tracing::debug!(purged, "expired refresh tokens removed");
    }
    insert(pool, user_id, 0, ttl).await
}

/// Resolves a presented token; unknown and expired tokens are `Unauthorized`.
pub async fn find_active<'e, E>(executor: E, token: &str) -> AppResult<RefreshRecord>
where
    E: Executor<'e, Database = Sqlite>,
{
    let record = sqlx::query_as::<_, RefreshRecord>(
        "SELECT token_hash, user_id, rotations, expires_at FROM refresh_tokens WHERE token_hash = ?",
    )
    .bind(token_digest(token))
    .fetch_optional(executor)
    .await?
    .ok_or_else(|| AppError::unauthorized("refresh token not recognised"))?;

    if record.expires_at <= utc_now() {
        return Err(AppError::unauthorized("refresh token has expired"));
    }

    Ok(record)
}

/// Replaces `token` with a new one for the same user. The old token stops working.
pub async fn rotate(pool: &SqlitePool, token: &str, ttl: Duration) -> AppResult<(i64, String)> {
    let mut tx = WriteTx::begin(pool).await?;
    let result = replace(tx.conn()?, token, ttl).await;
    tx.finish(result).await
}

async fn replace(conn: &mut SqliteConnection, token: &str, ttl: Duration) -> AppResult<(i64, String)> {
    let record = find_active(&mut *conn, token).await?;
    if record.rotations >= MAX_ROTATIONS {
        return Err(AppError::unauthorized("refresh token rotated too often; log in again"));
    }

    sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = ?")
        .bind(&record.token_hash)
        .execute(&mut *conn)
        .await?;

    let fresh = insert(conn, record.user_id, record.rotations + 1, ttl).await?;
    Ok((record.user_id, fresh))
}

/// Drops one token of `user_id`; returns whether a row was removed.
pub async fn revoke<'e, E>(executor: E, user_id: i64, token: &str) -> AppResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = ? AND user_id = ?")
        .bind(token_digest(token))
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn revoke_all<'e, E>(executor: E, user_id: i64) -> AppResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = ?")
        .bind(user_id)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

pub async fn purge_expired<'e, E>(executor: E) -> AppResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at <= ?")
        .bind(utc_now())
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_tokens_are_long_and_distinct() {
        let a = generate();
        assert_eq!(a.len(), 64);
        assert_ne!(a, generate());
    }
}
