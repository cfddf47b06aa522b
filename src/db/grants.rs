//! Subject and group grant storage.
//!
//! Both tables share one shape, so every query is parameterised by [`GrantOwner`].

use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};

use crate::errors::{AppError, AppResult};
use crate::models::permission::{DbGrant, Grant, NewGrant};
use crate::utils::join_names;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrantOwner {
    /// Grants held directly by a user.
    Subject,
    /// Grants held by a group, inherited by its members.
    Group,
}

impl GrantOwner {
    fn table(self) -> &'static str {
        match self {
            GrantOwner::Subject => "subject_grants",
            GrantOwner::Group => "group_grants",
        }
    }

    fn owner_table(self) -> &'static str {
        match self {
            GrantOwner::Subject => "users",
            GrantOwner::Group => "groups",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GrantOwner::Subject => "user",
            GrantOwner::Group => "group",
        }
    }
}

/// Result of a best-effort batch: what went through and what failed, per row.
#[derive(Debug)]
pub struct BulkOutcome<T> {
    pub succeeded: Vec<T>,
    pub failed: Vec<(T, AppError)>,
}

impl<T> Default for BulkOutcome<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> BulkOutcome<T> {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

fn select_sql(owner: GrantOwner, predicate: &str) -> String {
    format!(
        "SELECT g.id, g.owner_id, c.name AS capability, g.target_id, g.enabled, g.denied \
         FROM {} g JOIN capabilities c ON c.id = g.capability_id \
         WHERE {} ORDER BY g.id",
        owner.table(),
        predicate
    )
}

pub async fn owner_exists<'e, E>(executor: E, owner: GrantOwner, owner_id: i64) -> AppResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("SELECT COUNT(1) FROM {} WHERE id = ?", owner.owner_table());
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(owner_id)
        .fetch_one(executor)
        .await?;
    Ok(count > 0)
}

/// All rows of `owner_id` for one capability.
pub async fn find<'e, E>(executor: E, owner: GrantOwner, owner_id: i64, capability: &str) -> AppResult<Vec<Grant>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = select_sql(owner, "g.owner_id = ? AND c.name = ?");
    let rows = sqlx::query_as::<_, DbGrant>(&sql)
        .bind(owner_id)
        .bind(capability)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Grant::from).collect())
}

pub async fn list_by_owner<'e, E>(executor: E, owner: GrantOwner, owner_id: i64) -> AppResult<Vec<Grant>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = select_sql(owner, "g.owner_id = ?");
    let rows = sqlx::query_as::<_, DbGrant>(&sql)
        .bind(owner_id)
        .fetch_all(executor)
        .await?;
    Ok(rows.into_iter().map(Grant::from).collect())
}

/// Rows with the given ids, whoever owns them. Missing ids are simply absent.
pub async fn find_by_ids<'e, E>(executor: E, owner: GrantOwner, ids: &[i64]) -> AppResult<Vec<Grant>>
where
    E: Executor<'e, Database = Sqlite>,
{
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = select_sql(owner, &format!("g.id IN ({placeholders})"));
    let mut query = sqlx::query_as::<_, DbGrant>(&sql);
    for id in ids {
        query = query.bind(*id);
    }

    let rows = query.fetch_all(executor).await?;
    Ok(rows.into_iter().map(Grant::from).collect())
}

/// Inserts every row or fails; a duplicate `(owner, capability, target)` is `Conflict`.
///
/// Run inside a transaction so a conflict leaves nothing behind.
pub async fn bulk_insert(conn: &mut SqliteConnection, owner: GrantOwner, rows: &[NewGrant]) -> AppResult<Vec<Grant>> {
    let sql = format!(
        "INSERT INTO {} (owner_id, capability_id, target_id, enabled, denied) VALUES (?, ?, ?, ?, ?)",
        owner.table()
    );

    let mut inserted = Vec::with_capacity(rows.len());
    for row in rows {
        if row.enabled && row.denied {
            return Err(AppError::invalid(format!(
                "grant '{}' on {} cannot be both enabled and denied",
                row.capability, row.target
            )));
        }

        let result = sqlx::query(&sql)
            .bind(row.owner_id)
            .bind(row.capability_id)
            .bind(row.target.to_column())
            .bind(row.enabled)
            .bind(row.denied)
            .execute(&mut *conn)
            .await
            .map_err(|err| {
                AppError::on_insert(
                    err,
                    format!(
                        "{} {} already holds '{}' on {}",
                        owner.label(),
                        row.owner_id,
                        row.capability,
                        row.target
                    ),
                )
            })?;

        inserted.push(Grant {
            id: result.last_insert_rowid(),
            owner_id: row.owner_id,
            capability: row.capability.clone(),
            target: row.target,
            enabled: row.enabled,
            denied: row.denied,
        });
    }

    Ok(inserted)
}

/// Writes the `enabled`/`denied` flags of each row. Target and capability never change.
pub async fn bulk_update(conn: &mut SqliteConnection, owner: GrantOwner, rows: &[Grant]) -> AppResult<()> {
    let sql = format!(
        "UPDATE {} SET enabled = ?, denied = ? WHERE id = ? AND owner_id = ?",
        owner.table()
    );

    let mut missing = Vec::new();
    for row in rows {
        if row.enabled && row.denied {
            return Err(AppError::invalid(format!(
                "grant {} cannot be both enabled and denied",
                row.id
            )));
        }

        let result = sqlx::query(&sql)
            .bind(row.enabled)
            .bind(row.denied)
            .bind(row.id)
            .bind(row.owner_id)
            .execute(&mut *conn)
            .await?;

        if result.rows_affected() == 0 {
            missing.push(row.id);
        }
    }

    if !missing.is_empty() {
        return Err(AppError::not_found(format!(
            "{} grants not found: {}",
            owner.label(),
            join_names(missing)
        )));
    }

    Ok(())
}

/// Deletes rows one at a time, collecting per-row failures instead of stopping.
pub async fn delete_each(pool: &SqlitePool, owner: GrantOwner, rows: Vec<Grant>) -> BulkOutcome<Grant> {
    let sql = format!("DELETE FROM {} WHERE id = ? AND owner_id = ?", owner.table());
    let mut outcome = BulkOutcome::default();

    for row in rows {
        let result = sqlx::query(&sql)
            .bind(row.id)
            .bind(row.owner_id)
            .execute(pool)
            .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => outcome.succeeded.push(row),
            Ok(_) => {
                let err = AppError::not_found(format!("grant {} no longer exists", row.id));
                outcome.failed.push((row, err));
            }
            Err(err) => outcome.failed.push((row, AppError::from(err))),
        }
    }

    outcome
}
