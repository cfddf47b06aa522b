//! Write transactions that take the SQLite write lock at `BEGIN`.

use sqlx::pool::PoolConnection;
use sqlx::{Sqlite, SqliteConnection, SqlitePool};

use crate::errors::{AppError, AppResult};

/// A transaction opened with `BEGIN IMMEDIATE`.
///
/// Concurrent writers wait on the busy timeout in [`WriteTx::begin`] rather than
/// failing with `SQLITE_BUSY` when a read in the transaction is followed by a
/// write. Dropping it unfinished detaches and closes the connection, which rolls
/// the transaction back.
pub struct WriteTx {
    conn: Option<PoolConnection<Sqlite>>,
}

impl WriteTx {
    pub async fn begin(pool: &SqlitePool) -> AppResult<Self> {
        let mut conn = pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;
        Ok(Self { conn: Some(conn) })
    }

    pub fn conn(&mut self) -> AppResult<&mut SqliteConnection> {
        self.conn
            .as_deref_mut()
            .ok_or_else(|| AppError::internal("write transaction already finished"))
    }

    /// Commits on `Ok`, rolls back on `Err`, and passes `result` through.
    pub async fn finish<T>(mut self, result: AppResult<T>) -> AppResult<T> {
        let statement = if result.is_ok() { "COMMIT" } else { "ROLLBACK" };
        let Some(mut conn) = self.conn.take() else {
            return Err(AppError::internal("write transaction already finished"));
        };

        if let Err(err) = sqlx::query(statement).execute(&mut *conn).await {
            drop(conn.detach());
            tracing::error!(error = %err, statement, "failed to end write transaction");
            return match result {
                Ok(_) => Err(err.into()),
                Err(original) => Err(original),
            };
        }

        result
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            drop(conn.detach());
        }
    }
}
