//! Capability catalog storage.

use std::collections::{BTreeMap, BTreeSet};

use sqlx::{Executor, Sqlite, SqlitePool};

use crate::errors::{AppError, AppResult};
use crate::models::permission::Capability;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySpec {
    pub description: String,
    pub default_granted: bool,
}

impl CapabilitySpec {
    pub fn new(description: impl Into<String>, default_granted: bool) -> Self {
        Self {
            description: description.into(),
            default_granted,
        }
    }
}

pub type DesiredCatalog = BTreeMap<String, CapabilitySpec>;

/// Names touched by a sync, for logging.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub inserted: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

const SELECT_CAPABILITY: &str = "SELECT id, name, description, default_granted FROM capabilities";

/// Brings the stored catalog in line with `desired` in one transaction.
///
/// Stale names are deleted along with every grant that references them.
pub async fn sync(pool: &SqlitePool, desired: &DesiredCatalog) -> AppResult<SyncReport> {
    let mut tx = pool.begin().await?;

    let stored: Vec<Capability> = sqlx::query_as(SELECT_CAPABILITY)
        .fetch_all(&mut *tx)
        .await?;
    let stored: BTreeMap<String, Capability> = stored
        .into_iter()
        .map(|capability| (capability.name.clone(), capability))
        .collect();

    let mut report = SyncReport::default();

    for (name, spec) in desired {
        match stored.get(name) {
            None => {
                sqlx::query("INSERT INTO capabilities (name, description, default_granted) VALUES (?, ?, ?)")
                    .bind(name)
                    .bind(&spec.description)
                    .bind(spec.default_granted)
                    .execute(&mut *tx)
                    .await?;
                report.inserted.push(name.clone());
            }
            Some(current)
                if current.description != spec.description
                    || current.default_granted != spec.default_granted =>
            {
                sqlx::query("UPDATE capabilities SET description = ?, default_granted = ? WHERE id = ?")
                    .bind(&spec.description)
                    .bind(spec.default_granted)
                    .bind(current.id)
                    .execute(&mut *tx)
                    .await?;
                report.updated.push(name.clone());
            }
            Some(_) => {}
        }
    }

    for (name, current) in &stored {
        if desired.contains_key(name) {
            continue;
        }
        sqlx::query("DELETE FROM capabilities WHERE id = ?")
            .bind(current.id)
            .execute(&mut *tx)
            .await?;
        report.deleted.push(name.clone());
    }

    tx.commit().await?;

    if !report.is_noop() {
        tracing::info!(
            inserted = ?report.inserted,
            updated = ?report.updated,
            deleted = ?report.deleted,
            "capability catalog synced"
        );
    }

    Ok(report)
}

pub async fn find<'e, E>(executor: E, name: &str) -> AppResult<Option<Capability>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{SELECT_CAPABILITY} WHERE name = ?");
    Ok(sqlx::query_as::<_, Capability>(&sql)
        .bind(name)
        .fetch_optional(executor)
        .await?)
}

pub async fn get<'e, E>(executor: E, name: &str) -> AppResult<Capability>
where
    E: Executor<'e, Database = Sqlite>,
{
    find(executor, name)
        .await?
        .ok_or_else(|| AppError::not_found(format!("capability '{name}' not found")))
}

pub async fn list<'e, E>(executor: E) -> AppResult<BTreeSet<String>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM capabilities")
        .fetch_all(executor)
        .await?;
    Ok(names.into_iter().collect())
}

pub async fn describe_all<'e, E>(executor: E) -> AppResult<Vec<Capability>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!("{SELECT_CAPABILITY} ORDER BY name");
    Ok(sqlx::query_as::<_, Capability>(&sql).fetch_all(executor).await?)
}
