//! sqlx Storage Backend
//!
//! One implementation serving both SQLite and PostgreSQL through sqlx's
//! `Any` driver. Everything that differs between the two comes from the
//! [`Dialect`].

use async_trait::async_trait;
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{Any, AnyPool, Executor, Row};

use super::core::{MigrationStore, MigrationTransaction};
use super::dialect::{Dialect, DialectKind};
use crate::error::{MigrationError, MigrationResult};
use crate::migrations::definitions::MigrationRecord;
use crate::transaction::TransactionOptions;

/// Record store backed by an sqlx `Any` pool
#[derive(Debug)]
pub struct SqlxStore {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlxStore {
    /// Open a pool for `url` and ensure the record table exists
    ///
    /// `url` must already be in the form sqlx expects for the dialect.
    pub async fn connect(url: &str, dialect: Dialect) -> MigrationResult<Self> {
        sqlx::any::install_default_drivers();

        // All engine reads run inside the write transaction, so a single
        // connection is enough and keeps SQLite free of lock contention.
        let max_connections = match dialect.kind() {
            DialectKind::Postgres => 2,
            DialectKind::Sqlite | DialectKind::Libsql => 1,
        };

        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| {
                MigrationError::Connection(format!("Failed to open {} database: {}", dialect.kind(), e))
            })?;

        let store = Self { pool, dialect };
        store.ensure_migrations_table().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    async fn ensure_migrations_table(&self) -> MigrationResult<()> {
        let sql = self.dialect.create_table_sql();
        self.pool.execute(sql.as_str()).await.map_err(|e| {
            MigrationError::Database(format!(
                "Failed to set up {} migrations table: {}",
                self.dialect.kind(),
                e
            ))
        })?;
        tracing::debug!(table = self.dialect.table(), "Migrations table ready");
        Ok(())
    }
}

#[async_trait]
impl MigrationStore for SqlxStore {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    async fn begin(&self, options: &TransactionOptions) -> MigrationResult<Box<dyn MigrationTransaction>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MigrationError::Transaction(format!("Failed to start transaction: {}", e)))?;

        for statement in self.dialect.transaction_preamble(options) {
            (&mut *tx).execute(statement.as_str()).await.map_err(|e| {
                MigrationError::Transaction(format!("Failed to prepare transaction ({}): {}", statement, e))
            })?;
        }

        Ok(Box::new(SqlxTransaction {
            tx: Some(tx),
            dialect: self.dialect.clone(),
        }))
    }

    async fn applied_migrations(&self) -> MigrationResult<Vec<MigrationRecord>> {
        fetch_applied(&self.pool, &self.dialect).await
    }

    async fn last_batch_number(&self) -> MigrationResult<i64> {
        fetch_last_batch(&self.pool, &self.dialect).await
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Transaction on an sqlx `Any` connection
pub struct SqlxTransaction {
    tx: Option<sqlx::Transaction<'static, Any>>,
    dialect: Dialect,
}

impl SqlxTransaction {
    fn inner(&mut self) -> MigrationResult<&mut sqlx::Transaction<'static, Any>> {
        self.tx
            .as_mut()
            .ok_or_else(|| MigrationError::Transaction("Transaction already completed".to_string()))
    }
}

#[async_trait]
impl MigrationTransaction for SqlxTransaction {
    async fn execute_script(&mut self, sql: &str) -> MigrationResult<()> {
        let tx = self.inner()?;
        // No bind arguments: sqlx sends the text as-is, which lets
        // Postgres and SQLite both run multi-statement scripts.
        (&mut **tx).execute(sql).await?;
        Ok(())
    }

    async fn record_applied(&mut self, name: &str, batch: i64) -> MigrationResult<()> {
        let sql = self.dialect.record_migration_sql();
        let tx = self.inner()?;
        sqlx::query(&sql)
            .bind(name)
            .bind(batch)
            .bind(true)
            .execute(&mut **tx)
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to record migration {}: {}", name, e)))?;
        Ok(())
    }

    async fn delete_batch(&mut self, batch: i64) -> MigrationResult<u64> {
        let sql = self.dialect.delete_batch_sql();
        let tx = self.inner()?;
        let result = sqlx::query(&sql)
            .bind(batch)
            .execute(&mut **tx)
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to delete batch {}: {}", batch, e)))?;
        Ok(result.rows_affected())
    }

    async fn applied_migrations(&mut self) -> MigrationResult<Vec<MigrationRecord>> {
        let dialect = self.dialect.clone();
        let tx = self.inner()?;
        fetch_applied(&mut **tx, &dialect).await
    }

    async fn last_batch_number(&mut self) -> MigrationResult<i64> {
        let dialect = self.dialect.clone();
        let tx = self.inner()?;
        fetch_last_batch(&mut **tx, &dialect).await
    }

    async fn commit(mut self: Box<Self>) -> MigrationResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| MigrationError::Transaction("Transaction already completed".to_string()))?;
        tx.commit()
            .await
            .map_err(|e| MigrationError::Transaction(format!("Failed to commit: {}", e)))
    }

    async fn rollback(mut self: Box<Self>) -> MigrationResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| MigrationError::Transaction("Transaction already completed".to_string()))?;
        tx.rollback()
            .await
            .map_err(|e| MigrationError::Transaction(format!("Failed to roll back: {}", e)))
    }
}

async fn fetch_applied<'c, E>(executor: E, dialect: &Dialect) -> MigrationResult<Vec<MigrationRecord>>
where
    E: Executor<'c, Database = Any>,
{
    let sql = dialect.applied_migrations_sql();
    let rows = sqlx::query(&sql)
        .fetch_all(executor)
        .await
        .map_err(|e| MigrationError::Database(format!("Failed to query applied migrations: {}", e)))?;

    rows.iter().map(record_from_row).collect()
}

async fn fetch_last_batch<'c, E>(executor: E, dialect: &Dialect) -> MigrationResult<i64>
where
    E: Executor<'c, Database = Any>,
{
    let sql = dialect.last_batch_sql();
    let row = sqlx::query(&sql)
        .fetch_one(executor)
        .await
        .map_err(|e| MigrationError::Database(format!("Failed to get latest batch: {}", e)))?;

    Ok(row.try_get::<i64, _>(0)?)
}

fn record_from_row(row: &AnyRow) -> MigrationResult<MigrationRecord> {
    let name: String = row.try_get("name")?;
    let batch: i64 = row.try_get("batch")?;
    let applied_at: Option<String> = row.try_get("applied_at")?;

    Ok(MigrationRecord {
        name,
        batch,
        applied_at: MigrationRecord::parse_applied_at(applied_at.as_deref()),
    })
}
