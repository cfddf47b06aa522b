//! Assign, update and revoke workflows over subject and group grants.

use std::collections::{BTreeMap, HashMap, HashSet};

use sqlx::{SqliteConnection, SqlitePool};

use crate::db::{catalog, WriteTx};
use crate::db::grants::{self, BulkOutcome, GrantOwner};
use crate::errors::{AppError, AppResult};
use crate::models::permission::{
    AssignEntry, AssignOutcome, AssignStatus, Grant, GrantChange, NewGrant, RevokeRequest, TargetScope,
};
use crate::utils::join_names;

type GrantKey = (String, TargetScope);
type Keyed = (GrantKey, bool, bool);

async fn ensure_owner(pool: &SqlitePool, owner: GrantOwner, owner_id: i64) -> AppResult<()> {
    if grants::owner_exists(pool, owner, owner_id).await? {
        Ok(())
    } else {
        Err(AppError::not_found(format!("{} {} not found", owner.label(), owner_id)))
    }
}

/// Creates grants for `owner_id`, skipping those already present.
///
/// New rows start inert unless the entry sets `enabled` or `denied`.
pub async fn assign(
    pool: &SqlitePool,
    owner: GrantOwner,
    owner_id: i64,
    entries: Vec<AssignEntry>,
) -> AppResult<Vec<AssignOutcome>> {
    ensure_owner(pool, owner, owner_id).await?;

    let mut keyed = Vec::with_capacity(entries.len());
    for entry in &entries {
        let target = entry.target.ok_or_else(|| {
            AppError::invalid(format!("target is required for '{}'", entry.capability))
        })?;
        let enabled = entry.enabled.unwrap_or(false);
        let denied = entry.denied.unwrap_or(false);
        if enabled && denied {
            return Err(AppError::invalid(format!(
                "'{}' cannot be both enabled and denied",
                entry.capability
            )));
        }
        keyed.push(((entry.capability.clone(), target), enabled, denied));
    }

    let mut tx = WriteTx::begin(pool).await?;
    let result = insert_missing(tx.conn()?, owner, owner_id, &keyed).await;
    let (existing, inserted) = tx.finish(result).await?;

    let mut inserted: HashMap<GrantKey, Grant> = inserted
        .into_iter()
        .map(|grant| ((grant.capability.clone(), grant.target), grant))
        .collect();

    let mut reported: HashMap<GrantKey, Grant> = HashMap::new();
    let mut outcomes = Vec::with_capacity(keyed.len());
    for (key, _, _) in keyed {
        let outcome = if let Some(grant) = inserted.remove(&key) {
            reported.insert(key, grant.clone());
            AssignOutcome {
                grant,
                status: AssignStatus::Assigned,
            }
        } else {
            let grant = existing
                .get(&key)
                .or_else(|| reported.get(&key))
                .cloned()
                .ok_or_else(|| AppError::internal("assigned grant missing from batch"))?;
            AssignOutcome {
                grant,
                status: AssignStatus::Unchanged,
            }
        };
        outcomes.push(outcome);
    }

    tracing::info!(
        owner = owner.label(),
        owner_id,
        assigned = outcomes.iter().filter(|o| o.status == AssignStatus::Assigned).count(),
        unchanged = outcomes.iter().filter(|o| o.status == AssignStatus::Unchanged).count(),
        "grants assigned"
    );

    Ok(outcomes)
}

/// Looks up capabilities and current rows, then inserts the keys not yet held.
/// Returns the rows held before the call and the rows inserted by it.
async fn insert_missing(
    conn: &mut SqliteConnection,
    owner: GrantOwner,
    owner_id: i64,
    keyed: &[Keyed],
) -> AppResult<(HashMap<GrantKey, Grant>, Vec<Grant>)> {
    let mut capability_ids = BTreeMap::new();
    let mut unknown = Vec::new();
    for ((name, _), _, _) in keyed {
        if capability_ids.contains_key(name) || unknown.contains(name) {
            continue;
        }
        match catalog::find(&mut *conn, name).await? {
            Some(capability) => {
                capability_ids.insert(name.clone(), capability.id);
            }
            None => unknown.push(name.clone()),
        }
    }
    if !unknown.is_empty() {
        return Err(AppError::not_found(format!(
            "unknown capabilities: {}",
            join_names(&unknown)
        )));
    }

    let existing: HashMap<GrantKey, Grant> = grants::list_by_owner(&mut *conn, owner, owner_id)
        .await?
        .into_iter()
        .map(|grant| ((grant.capability.clone(), grant.target), grant))
        .collect();

    let mut pending = HashSet::new();
    let mut fresh = Vec::new();
    for (key, enabled, denied) in keyed {
        if existing.contains_key(key) || !pending.insert(key.clone()) {
            continue;
        }
        fresh.push(NewGrant {
            owner_id,
            capability_id: capability_ids[&key.0],
            capability: key.0.clone(),
            target: key.1,
            enabled: *enabled,
            denied: *denied,
        });
    }

    let inserted = grants::bulk_insert(conn, owner, &fresh).await?;
    Ok((existing, inserted))
}

/// Changes `enabled`/`denied` on existing rows of `owner_id`, all or nothing.
pub async fn update(
    pool: &SqlitePool,
    owner: GrantOwner,
    owner_id: i64,
    changes: Vec<GrantChange>,
) -> AppResult<Vec<Grant>> {
    ensure_owner(pool, owner, owner_id).await?;

    let mut tx = WriteTx::begin(pool).await?;
    let result = apply_changes(tx.conn()?, owner, owner_id, &changes).await;
    let updated = tx.finish(result).await?;

    tracing::info!(owner = owner.label(), owner_id, count = updated.len(), "grants updated");
    Ok(updated)
}

async fn apply_changes(
    conn: &mut SqliteConnection,
    owner: GrantOwner,
    owner_id: i64,
    changes: &[GrantChange],
) -> AppResult<Vec<Grant>> {
    let ids: Vec<i64> = changes.iter().map(|change| change.id).collect();
    let mut rows: HashMap<i64, Grant> = grants::find_by_ids(&mut *conn, owner, &ids)
        .await?
        .into_iter()
        .filter(|grant| grant.owner_id == owner_id)
        .map(|grant| (grant.id, grant))
        .collect();

    let mut unknown: Vec<i64> = ids.iter().copied().filter(|id| !rows.contains_key(id)).collect();
    unknown.sort_unstable();
    unknown.dedup();
    if !unknown.is_empty() {
        return Err(AppError::not_found(format!(
            "grants not held by {} {}: {}",
            owner.label(),
            owner_id,
            join_names(&unknown)
        )));
    }

    let mut order = Vec::new();
    for change in changes {
        let Some(row) = rows.get_mut(&change.id) else {
            continue;
        };
        if let Some(enabled) = change.enabled {
            row.enabled = enabled;
        }
        if let Some(denied) = change.denied {
            row.denied = denied;
        }
        if !order.contains(&change.id) {
            order.push(change.id);
        }
    }

    let updated: Vec<Grant> = order.iter().filter_map(|id| rows.remove(id)).collect();
    if let Some(bad) = updated.iter().find(|grant| grant.enabled && grant.denied) {
        return Err(AppError::invalid(format!(
            "grant {} cannot be both enabled and denied",
            bad.id
        )));
    }

    grants::bulk_update(conn, owner, &updated).await?;
    Ok(updated)
}

/// Removes the named grants of `owner_id`.
///
/// Every id and capability must be currently held, otherwise nothing is touched.
/// Deletion itself is per row; any row that could not be removed fails the call.
pub async fn revoke(
    pool: &SqlitePool,
    owner: GrantOwner,
    owner_id: i64,
    request: RevokeRequest,
) -> AppResult<Vec<Grant>> {
    if request.grant_ids.is_empty() && request.capabilities.is_empty() {
        return Err(AppError::invalid("nothing to revoke"));
    }

    ensure_owner(pool, owner, owner_id).await?;

    let held = grants::list_by_owner(pool, owner, owner_id).await?;

    let mut missing = Vec::new();
    for id in &request.grant_ids {
        if !held.iter().any(|grant| grant.id == *id) {
            missing.push(format!("grant {id}"));
        }
    }
    for name in &request.capabilities {
        if !held.iter().any(|grant| &grant.capability == name) {
            missing.push(format!("'{name}'"));
        }
    }
    if !missing.is_empty() {
        return Err(AppError::not_found(format!(
            "not assigned to {} {}: {}",
            owner.label(),
            owner_id,
            join_names(&missing)
        )));
    }

    let selected: Vec<Grant> = held
        .into_iter()
        .filter(|grant| {
            request.grant_ids.contains(&grant.id) || request.capabilities.contains(&grant.capability)
        })
        .collect();

    let outcome = grants::delete_each(pool, owner, selected).await;
    finish_revoke(owner, owner_id, outcome)
}

/// Counts reported by [`grant_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantAllReport {
    pub held: usize,
    pub reenabled: usize,
}

/// Gives a user every catalog capability on all targets.
///
/// Rows already present but inert or denied are switched to enabled, so the
/// user ends up allowed everywhere whatever they held before.
pub async fn grant_all(pool: &SqlitePool, user_id: i64) -> AppResult<GrantAllReport> {
    let entries = catalog::list(pool)
        .await?
        .into_iter()
        .map(|capability| AssignEntry {
            capability,
            target: Some(TargetScope::All),
            enabled: Some(true),
            denied: Some(false),
        })
        .collect();

    let outcomes = assign(pool, GrantOwner::Subject, user_id, entries).await?;

    let changes: Vec<GrantChange> = outcomes
        .iter()
        .filter(|outcome| !outcome.grant.enabled || outcome.grant.denied)
        .map(|outcome| GrantChange {
            id: outcome.grant.id,
            enabled: Some(true),
            denied: Some(false),
        })
        .collect();
    let reenabled = changes.len();
    if !changes.is_empty() {
        update(pool, GrantOwner::Subject, user_id, changes).await?;
    }

    Ok(GrantAllReport {
        held: outcomes.len(),
        reenabled,
    })
}

fn finish_revoke(owner: GrantOwner, owner_id: i64, outcome: BulkOutcome<Grant>) -> AppResult<Vec<Grant>> {
    for (grant, err) in &outcome.failed {
        tracing::warn!(
            owner = owner.label(),
            owner_id,
            grant_id = grant.id,
            error = %err,
            "grant could not be revoked"
        );
    }

    if !outcome.is_complete() {
        let failed = outcome
            .failed
            .iter()
            .map(|(grant, err)| format!("grant {} ({})", grant.id, err));
        return Err(AppError::incomplete(format!(
            "revoked {} of {} grants; failed: {}",
            outcome.succeeded.len(),
            outcome.succeeded.len() + outcome.failed.len(),
            join_names(failed)
        )));
    }

    tracing::info!(
        owner = owner.label(),
        owner_id,
        count = outcome.succeeded.len(),
        "grants revoked"
    );
    Ok(outcome.succeeded)
}
