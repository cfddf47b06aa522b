use async_trait::async_trait;
use sqlx::SqlitePool;

use super::grants::GrantOwner;
use super::{catalog, grants, membership};
use crate::authz::GrantSource;
use crate::errors::AppResult;
use crate::models::permission::{Capability, Grant};

/// [`GrantSource`] reading straight from the database; nothing is cached.
#[derive(Debug, Clone)]
pub struct SqlGrantSource {
    pool: SqlitePool,
}

impl SqlGrantSource {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GrantSource for SqlGrantSource {
    async fn capability(&self, name: &str) -> AppResult<Capability> {
        catalog::get(&self.pool, name).await
    }

    async fn subject_grants(&self, actor_id: i64, capability: &str) -> AppResult<Vec<Grant>> {
        grants::find(&self.pool, GrantOwner::Subject, actor_id, capability).await
    }

    async fn groups_of(&self, actor_id: i64) -> AppResult<Vec<i64>> {
        Ok(membership::groups_of(&self.pool, actor_id)
            .await?
            .into_iter()
            .collect())
    }

    async fn group_grants(&self, group_id: i64, capability: &str) -> AppResult<Vec<Grant>> {
        grants::find(&self.pool, GrantOwner::Group, group_id, capability).await
    }
}
