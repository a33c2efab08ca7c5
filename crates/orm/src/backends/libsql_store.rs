//! libSQL Storage Backend
//!
//! Serves `libsql:` and `http(s):` URLs through the libSQL remote client,
//! using the same [`Dialect`] SQL as the sqlx backend.

use async_trait::async_trait;
use libsql::{params, Builder, Connection, Database, Transaction};

use super::core::{MigrationStore, MigrationTransaction};
use super::dialect::Dialect;
use crate::error::{MigrationError, MigrationResult};
use crate::migrations::definitions::MigrationRecord;
use crate::transaction::TransactionOptions;

/// Record store on a remote libSQL database
pub struct LibsqlStore {
    _database: Database,
    conn: Connection,
    dialect: Dialect,
}

impl LibsqlStore {
    /// Connect to `url` and ensure the record table exists
    pub async fn connect(url: &str, auth_token: String, dialect: Dialect) -> MigrationResult<Self> {
        let database = Builder::new_remote(url.to_string(), auth_token)
            .build()
            .await
            .map_err(|e| MigrationError::Connection(format!("Failed to open libSQL database: {}", e)))?;
        let conn = database
            .connect()
            .map_err(|e| MigrationError::Connection(format!("Failed to connect to libSQL database: {}", e)))?;

        let store = Self {
            _database: database,
            conn,
            dialect,
        };
        store.ensure_migrations_table().await?;
        Ok(store)
    }

    async fn ensure_migrations_table(&self) -> MigrationResult<()> {
        self.conn
            .execute(&self.dialect.create_table_sql(), ())
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to set up libSQL migrations table: {}", e)))?;
        tracing::debug!(table = self.dialect.table(), "Migrations table ready");
        Ok(())
    }
}

#[async_trait]
impl MigrationStore for LibsqlStore {
    fn dialect(&self) -> &Dialect {
        &self.dialect
    }

    async fn begin(&self, options: &TransactionOptions) -> MigrationResult<Box<dyn MigrationTransaction>> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| MigrationError::Transaction(format!("Failed to start transaction: {}", e)))?;

        for statement in self.dialect.transaction_preamble(options) {
            tx.execute(&statement, ()).await?;
        }

        Ok(Box::new(LibsqlTransaction {
            tx: Some(tx),
            dialect: self.dialect.clone(),
        }))
    }

    async fn applied_migrations(&self) -> MigrationResult<Vec<MigrationRecord>> {
        fetch_applied(&self.conn, &self.dialect).await
    }

    async fn last_batch_number(&self) -> MigrationResult<i64> {
        fetch_last_batch(&self.conn, &self.dialect).await
    }

    async fn close(&self) {}
}

/// Transaction on a libSQL connection
pub struct LibsqlTransaction {
    tx: Option<Transaction>,
    dialect: Dialect,
}

impl LibsqlTransaction {
    fn inner(&self) -> MigrationResult<&Transaction> {
        self.tx
            .as_ref()
            .ok_or_else(|| MigrationError::Transaction("Transaction already completed".to_string()))
    }
}

#[async_trait]
impl MigrationTransaction for LibsqlTransaction {
    async fn execute_script(&mut self, sql: &str) -> MigrationResult<()> {
        self.inner()?.execute_batch(sql).await?;
        Ok(())
    }

    async fn record_applied(&mut self, name: &str, batch: i64) -> MigrationResult<()> {
        let sql = self.dialect.record_migration_sql();
        self.inner()?
            .execute(&sql, params![name, batch, 1_i64])
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to record migration {}: {}", name, e)))?;
        Ok(())
    }

    async fn delete_batch(&mut self, batch: i64) -> MigrationResult<u64> {
        let sql = self.dialect.delete_batch_sql();
        self.inner()?
            .execute(&sql, params![batch])
            .await
            .map_err(|e| MigrationError::Database(format!("Failed to delete batch {}: {}", batch, e)))
    }

    async fn applied_migrations(&mut self) -> MigrationResult<Vec<MigrationRecord>> {
        fetch_applied(self.inner()?, &self.dialect).await
    }

    async fn last_batch_number(&mut self) -> MigrationResult<i64> {
        fetch_last_batch(self.inner()?, &self.dialect).await
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

async fn fetch_applied(conn: &Connection, dialect: &Dialect) -> MigrationResult<Vec<MigrationRecord>> {
    let mut rows = conn
        .query(&dialect.applied_migrations_sql(), ())
        .await
        .map_err(|e| MigrationError::Database(format!("Failed to query applied migrations: {}", e)))?;

    let mut records = Vec::new();
    while let Some(row) = rows.next().await? {
        let name: String = row.get(0)?;
        let batch: i64 = row.get(1)?;
        let applied_at: Option<String> = row.get(2)?;
        records.push(MigrationRecord {
            name,
            batch,
            applied_at: MigrationRecord::parse_applied_at(applied_at.as_deref()),
        });
    }

    Ok(records)
}

async fn fetch_last_batch(conn: &Connection, dialect: &Dialect) -> MigrationResult<i64> {
    let mut rows = conn
        .query(&dialect.last_batch_sql(), ())
        .await
        .map_err(|e| MigrationError::Database(format!("Failed to get latest batch: {}", e)))?;

    match rows.next().await? {
        Some(row) => Ok(row.get::<i64>(0)?),
        None => Ok(0),
    }
}
