//! Migration Rollback - Handles rolling back applied migrations
//!
//! Reverts the most recent batch: every unit of that batch runs its down
//! script, newest first, and the batch's records are removed, all inside one
//! transaction.

use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::definitions::{MigrationDirection, RollbackResult};
use super::plan;
use super::runner::{execute_unit, finish_transaction, MigrationRunner};
use crate::backends::MigrationTransaction;
use crate::error::{MigrationError, MigrationResult};
use crate::transaction::TransactionOptions;

/// Extension trait for MigrationRunner to add rollback functionality
#[async_trait]
pub trait MigrationRollback {
    /// Rollback the last batch of migrations
    ///
    /// With nothing recorded this is a successful no-op whose result has no
    /// batch.
    async fn rollback_last_batch(&self, cancel: &CancellationToken) -> MigrationResult<RollbackResult>;
}

struct RevertOutcome {
    batch: Option<i64>,
    reverted: Vec<String>,
}

#[async_trait]
impl MigrationRollback for MigrationRunner {
    async fn rollback_last_batch(&self, cancel: &CancellationToken) -> MigrationResult<RollbackResult> {
        let start_time = Instant::now();

        if cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }

        let mut tx = self.store().begin(&TransactionOptions::exclusive()).await?;
        let outcome = revert_last_batch(self, tx.as_mut(), cancel).await;
        let outcome = finish_transaction(tx, outcome).await?;

        match outcome.batch {
            Some(batch) => tracing::info!(batch, count = outcome.reverted.len(), "Reverted batch"),
            None => tracing::info!("No migrations to revert"),
        }

        Ok(RollbackResult {
            batch: outcome.batch,
            rolled_back_count: outcome.reverted.len(),
            rolled_back_migrations: outcome.reverted,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }
}

async fn revert_last_batch(
    runner: &MigrationRunner,
    tx: &mut dyn MigrationTransaction,
    cancel: &CancellationToken,
) -> MigrationResult<RevertOutcome> {
    let last_batch = tx.last_batch_number().await?;
    if last_batch == 0 {
        return Ok(RevertOutcome {
            batch: None,
            reverted: Vec::new(),
        });
    }

    let applied = tx.applied_migrations().await?;
    let units = plan::revert_set(&applied, last_batch);
    tracing::debug!(batch = last_batch, count = units.len(), "Computed revert set");

    if units.is_empty() {
        return Ok(RevertOutcome {
            batch: None,
            reverted: Vec::new(),
        });
    }

    for unit in &units {
        tracing::info!(migration = %unit, batch = last_batch, "Reverting migration");
        execute_unit(tx, runner.manager(), unit, MigrationDirection::Down, cancel).await?;
    }

    let removed = tx.delete_batch(last_batch).await?;
    tracing::debug!(batch = last_batch, removed, "Removed batch records");

    Ok(RevertOutcome {
        batch: Some(last_batch),
        reverted: units,
    })
}
