//! Core Storage Backend Traits
//!
//! This module defines the storage contract the migration engine drives.
//! A [`MigrationStore`] owns the applied-migration record table; a
//! [`MigrationTransaction`] is the single write handle of one apply or
//! revert invocation.

use async_trait::async_trait;

use super::dialect::Dialect;
use crate::error::{MigrationError, MigrationResult};
use crate::migrations::definitions::{MigrationDirection, MigrationRecord};
use crate::migrations::manager::MigrationManager;
use crate::transaction::TransactionOptions;

/// Abstract migration record store
#[async_trait]
pub trait MigrationStore: Send + Sync {
    /// SQL dialect used by this store
    fn dialect(&self) -> &Dialect;

    /// Begin the write transaction of one workflow
    async fn begin(&self, options: &TransactionOptions) -> MigrationResult<Box<dyn MigrationTransaction>>;

    /// All records with applied = true, read outside any transaction
    async fn applied_migrations(&self) -> MigrationResult<Vec<MigrationRecord>>;

    /// Highest recorded batch, 0 when nothing is recorded
    async fn last_batch_number(&self) -> MigrationResult<i64>;

    /// Batch the next apply would use
    async fn next_batch_number(&self) -> MigrationResult<i64> {
        Ok(self.last_batch_number().await? + 1)
    }

    /// Release the underlying connections
    async fn close(&self);
}

/// Abstract migration transaction
///
/// Dropping a transaction without calling [`commit`](Self::commit) discards
/// its changes.
#[async_trait]
pub trait MigrationTransaction: Send {
    /// Execute a SQL script verbatim; it may hold several statements
    async fn execute_script(&mut self, sql: &str) -> MigrationResult<()>;

    /// Insert an applied record for `name` in `batch`
    async fn record_applied(&mut self, name: &str, batch: i64) -> MigrationResult<()>;

    /// Remove every record of `batch`, returning how many were removed
    async fn delete_batch(&mut self, batch: i64) -> MigrationResult<u64>;

    /// All records with applied = true, as seen by this transaction
    async fn applied_migrations(&mut self) -> MigrationResult<Vec<MigrationRecord>>;

    /// Highest recorded batch as seen by this transaction
    async fn last_batch_number(&mut self) -> MigrationResult<i64>;

    async fn next_batch_number(&mut self) -> MigrationResult<i64> {
        Ok(self.last_batch_number().await? + 1)
    }

    /// Read a unit's up or down script from disk and execute it
    async fn execute_migration(
        &mut self,
        manager: &MigrationManager,
        unit: &str,
        direction: MigrationDirection,
    ) -> MigrationResult<()> {
        let sql = manager.read_script(unit, direction)?;

        if sql.trim().is_empty() {
            tracing::debug!(migration = unit, ?direction, "Script is empty, nothing to execute");
            return Ok(());
        }

        self.execute_script(&sql)
            .await
            .map_err(|e| MigrationError::ScriptExecution {
                path: manager.script_path(unit, direction),
                message: match e {
                    MigrationError::Database(message) => message,
                    other => other.to_string(),
                },
            })
    }

    /// Commit the transaction
    async fn commit(self: Box<Self>) -> MigrationResult<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> MigrationResult<()>;
}
