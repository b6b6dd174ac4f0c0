//! Per-connection gateway: explicit transaction lifecycle over one leased
//! connection, per spec.md §4.2.
//!
//! `begin_transaction`/`commit`/`rollback` are plain `BEGIN`/`COMMIT`/
//! `ROLLBACK` statements rather than sqlx's RAII `Transaction` type: the
//! spec calls for a gateway that tracks "in flight or not" as explicit
//! state queried by the caller (`begin` is a programmer-error assertion
//! when one is already open), which doesn't fit sqlx's borrow-scoped
//! `Transaction<'c, DB>` without self-referential struct tricks. Plain
//! statements on the owned connection give the same transactional
//! guarantees with a much simpler type.

use sqlx::postgres::{PgArguments, PgRow, Postgres};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::Row;

use crate::errors::SqlError;

pub struct Gateway {
    conn: PoolConnection<Postgres>,
    in_transaction: bool,
}

impl Gateway {
    pub fn new(conn: PoolConnection<Postgres>) -> Self {
        Self {
            conn,
            in_transaction: false,
        }
    }

    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Fails with `TransactionAlreadyOpen` if a transaction is already in
    /// flight on this connection — a programmer-error assertion, per
    /// spec.md §4.2.
    pub async fn begin_transaction(&mut self) -> Result<(), SqlError> {
        if self.in_transaction {
            return Err(SqlError::TransactionAlreadyOpen);
        }
        sqlx::query("BEGIN").execute(&mut *self.conn).await?;
        self.in_transaction = true;
        Ok(())
    }

    /// Clears in-flight state even when the commit itself fails, per
    /// spec.md §4.2 ("commit/rollback clear in-flight state even on
    /// error").
    pub async fn commit(&mut self) -> Result<(), SqlError> {
        if !self.in_transaction {
            return Err(SqlError::NoTransactionOpen);
        }
        let result = sqlx::query("COMMIT").execute(&mut *self.conn).await;
        self.in_transaction = false;
        result.map(|_| ()).map_err(SqlError::from)
    }

    pub async fn rollback(&mut self) -> Result<(), SqlError> {
        if !self.in_transaction {
            return Err(SqlError::NoTransactionOpen);
        }
        let result = sqlx::query("ROLLBACK").execute(&mut *self.conn).await;
        self.in_transaction = false;
        result.map(|_| ()).map_err(SqlError::from)
    }

    /// Executes a select. If a transaction is in flight it runs inside it;
    /// otherwise it runs in an implicit begin/commit, per spec.md §4.2.
    pub async fn execute_select(
        &mut self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<Vec<PgRow>, SqlError> {
        if self.in_transaction {
            Ok(query.fetch_all(&mut *self.conn).await?)
        } else {
            self.begin_transaction().await?;
            match query.fetch_all(&mut *self.conn).await {
                Ok(rows) => {
                    self.commit().await?;
                    Ok(rows)
                }
                Err(e) => {
                    let _ = self.rollback().await;
                    Err(SqlError::from(e))
                }
            }
        }
    }

    /// Executes an update/insert. Same transaction discipline as
    /// `execute_select`; returns the affected row count.
    pub async fn execute_update(
        &mut self,
        query: Query<'_, Postgres, PgArguments>,
    ) -> Result<u64, SqlError> {
        if self.in_transaction {
            Ok(query.execute(&mut *self.conn).await?.rows_affected())
        } else {
            self.begin_transaction().await?;
            match query.execute(&mut *self.conn).await {
                Ok(result) => {
                    self.commit().await?;
                    Ok(result.rows_affected())
                }
                Err(e) => {
                    let _ = self.rollback().await;
                    Err(SqlError::from(e))
                }
            }
        }
    }

    /// Executes DDL outside the `execute_select`/`execute_update`
    /// transaction dispatch. Reserved for schema bootstrap during process
    /// startup; must never be called from worker task bodies, per spec.md
    /// §4.2.
    pub async fn execute_admin(&mut self, statement: &str) -> Result<(), SqlError> {
        sqlx::query(statement).execute(&mut *self.conn).await?;
        Ok(())
    }

    /// Returns the underlying connection, e.g. when a caller needs raw
    /// access for schema bootstrap. Reserved for the process driver; never
    /// called from worker tasks, per spec.md §4.2.
    pub fn into_inner(self) -> PoolConnection<Postgres> {
        self.conn
    }
}

/// Helper for reading a named column as an owned `String`, used by the
/// propagation stage when pulling TLE lines out of a generic `PgRow`.
pub fn get_string(row: &PgRow, column: &str) -> Result<String, SqlError> {
    row.try_get::<String, _>(column).map_err(SqlError::from)
}

/// Helper for reading a named column as `f64`.
pub fn get_f64(row: &PgRow, column: &str) -> Result<f64, SqlError> {
    row.try_get::<f64, _>(column).map_err(SqlError::from)
}

/// Helper for reading a named column as `i64`.
pub fn get_i64(row: &PgRow, column: &str) -> Result<i64, SqlError> {
    row.try_get::<i64, _>(column).map_err(SqlError::from)
}
