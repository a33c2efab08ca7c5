//! Migration Runner - Executes migrations against the database
//!
//! Applies every pending unit as one batch inside a single transaction. Either
//! the whole batch is recorded or, on any failure or cancellation, nothing is.

use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::definitions::{MigrationDirection, MigrationRunResult, MigrationStatusEntry};
use super::manager::MigrationManager;
use super::plan;
use crate::backends::{MigrationStore, MigrationTransaction};
use crate::error::{MigrationError, MigrationResult};
use crate::transaction::TransactionOptions;

/// Migration runner that executes migrations against a database
pub struct MigrationRunner {
    store: Box<dyn MigrationStore>,
    manager: MigrationManager,
}

struct ApplyOutcome {
    batch: Option<i64>,
    applied: Vec<String>,
    skipped: usize,
}

impl MigrationRunner {
    /// Create a new migration runner
    pub fn new(store: Box<dyn MigrationStore>, manager: MigrationManager) -> Self {
        Self { store, manager }
    }

    /// Get the record store
    pub fn store(&self) -> &dyn MigrationStore {
        self.store.as_ref()
    }

    /// Get the migration manager
    pub fn manager(&self) -> &MigrationManager {
        &self.manager
    }

    /// Run all pending migrations as a new batch
    pub async fn run_migrations(&self, cancel: &CancellationToken) -> MigrationResult<MigrationRunResult> {
        let start_time = Instant::now();

        if cancel.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }

        let mut tx = self.store.begin(&TransactionOptions::exclusive()).await?;
        let outcome = self.apply_pending(tx.as_mut(), cancel).await;
        let outcome = finish_transaction(tx, outcome).await?;

        match outcome.batch {
            Some(batch) => tracing::info!(
                batch,
                count = outcome.applied.len(),
                "Applied migrations"
            ),
            None => tracing::info!("No pending migrations"),
        }

        Ok(MigrationRunResult {
            batch: outcome.batch,
            applied_count: outcome.applied.len(),
            applied_migrations: outcome.applied,
            skipped_count: outcome.skipped,
            execution_time_ms: start_time.elapsed().as_millis(),
        })
    }

    async fn apply_pending(
        &self,
        tx: &mut dyn MigrationTransaction,
        cancel: &CancellationToken,
    ) -> MigrationResult<ApplyOutcome> {
        let batch = tx.next_batch_number().await?;
        let applied = tx.applied_migrations().await?;
        let pending = plan::pending_migrations(self.manager.scan()?, &applied);

        tracing::debug!(batch, pending = pending.len(), applied = applied.len(), "Computed pending migrations");

        if pending.is_empty() {
            return Ok(ApplyOutcome {
                batch: None,
                applied: Vec::new(),
                skipped: applied.len(),
            });
        }

        for unit in &pending {
            tracing::info!(migration = %unit, batch, "Applying migration");
            execute_unit(tx, &self.manager, unit, MigrationDirection::Up, cancel).await?;
            tx.record_applied(unit, batch).await?;
        }

        Ok(ApplyOutcome {
            batch: Some(batch),
            applied: pending,
            skipped: applied.len(),
        })
    }

    /// Units on disk that have not been applied, in apply order
    pub async fn pending_migrations(&self) -> MigrationResult<Vec<String>> {
        let on_disk = self.manager.scan()?;
        let applied = self.store.applied_migrations().await?;
        Ok(plan::pending_migrations(on_disk, &applied))
    }

    /// Status of every known unit, in apply order
    ///
    /// A missing migrations directory is treated as empty so that records
    /// can still be listed.
    pub async fn migration_status(&self) -> MigrationResult<Vec<MigrationStatusEntry>> {
        let on_disk = match self.manager.scan() {
            Ok(units) => units,
            Err(MigrationError::DirectoryNotFound(_)) => Vec::new(),
            Err(e) => return Err(e),
        };
        let applied = self.store.applied_migrations().await?;
        Ok(plan::migration_status(on_disk, &applied))
    }

    /// Release the store's connections
    pub async fn close(&self) {
        self.store.close().await;
    }
}

/// Run one unit's script, aborting as soon as `cancel` fires
pub(crate) async fn execute_unit(
    tx: &mut dyn MigrationTransaction,
    manager: &MigrationManager,
    unit: &str,
    direction: MigrationDirection,
    cancel: &CancellationToken,
) -> MigrationResult<()> {
    if cancel.is_cancelled() {
        return Err(MigrationError::Cancelled);
    }

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MigrationError::Cancelled),
        result = tx.execute_migration(manager, unit, direction) => result,
    }
}

/// Commit on success, otherwise roll back and hand back the workflow's error
pub(crate) async fn finish_transaction<T>(
    tx: Box<dyn MigrationTransaction>,
    outcome: MigrationResult<T>,
) -> MigrationResult<T> {
    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rolling back migration transaction");
            if let Err(rollback_error) = tx.rollback().await {
                tracing::warn!(error = %rollback_error, "Failed to roll back migration transaction");
            }
            Err(e)
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backends::Dialect;
    use crate::migrations::definitions::{MigrationRecord, MigrationStatus};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// In-memory store that records every script it runs
    #[derive(Default)]
    pub(crate) struct MemoryState {
        pub records: Vec<MigrationRecord>,
        pub executed: Vec<String>,
        pub commits: usize,
        pub rollbacks: usize,
    }

    #[derive(Clone)]
    pub(crate) struct MemoryStore {
        pub state: Arc<Mutex<MemoryState>>,
        dialect: Dialect,
    }

    impl Default for MemoryStore {
        fn default() -> Self {
            Self {
                state: Arc::default(),
                dialect: Dialect::sqlite(),
            }
        }
    }

    pub(crate) struct MemoryTransaction {
        state: Arc<Mutex<MemoryState>>,
        records: Vec<MigrationRecord>,
        executed: Vec<String>,
    }

    #[async_trait]
    impl MigrationStore for MemoryStore {
        fn dialect(&self) -> &Dialect {
            &self.dialect
        }

        async fn begin(&self, _options: &TransactionOptions) -> MigrationResult<Box<dyn MigrationTransaction>> {
            let records = self.state.lock().unwrap().records.clone();
            Ok(Box::new(MemoryTransaction {
                state: self.state.clone(),
                records,
                executed: Vec::new(),
            }))
        }

        async fn applied_migrations(&self) -> MigrationResult<Vec<MigrationRecord>> {
            Ok(self.state.lock().unwrap().records.clone())
        }

        async fn last_batch_number(&self) -> MigrationResult<i64> {
            Ok(self.state.lock().unwrap().records.iter().map(|r| r.batch).max().unwrap_or(0))
        }

        async fn close(&self) {}
    }

    #[async_trait]
    impl MigrationTransaction for MemoryTransaction {
        async fn execute_script(&mut self, sql: &str) -> MigrationResult<()> {
            if sql.contains("SLOW") {
                std::future::pending::<()>().await;
            }
            if sql.contains("INVALID") {
                return Err(MigrationError::Database(format!("syntax error near {}", sql.trim())));
            }
            self.executed.push(sql.trim().to_string());
            Ok(())
        }

        async fn record_applied(&mut self, name: &str, batch: i64) -> MigrationResult<()> {
            self.records.push(MigrationRecord::new(name, batch));
            Ok(())
        }

        async fn delete_batch(&mut self, batch: i64) -> MigrationResult<u64> {
            let before = self.records.len();
            self.records.retain(|r| r.batch != batch);
            Ok((before - self.records.len()) as u64)
        }

        async fn applied_migrations(&mut self) -> MigrationResult<Vec<MigrationRecord>> {
            Ok(self.records.clone())
        }

        async fn last_batch_number(&mut self) -> MigrationResult<i64> {
            Ok(self.records.iter().map(|r| r.batch).max().unwrap_or(0))
        }

        async fn commit(self: Box<Self>) -> MigrationResult<()> {
            let MemoryTransaction { state, records, executed } = *self;
            let mut state = state.lock().unwrap();
            state.records = records;
            state.executed.extend(executed);
            state.commits += 1;
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> MigrationResult<()> {
            self.state.lock().unwrap().rollbacks += 1;
            Ok(())
        }
    }

    /// Project dir with one unit per `(name, up, down)`
    pub(crate) fn project_with(units: &[(&str, &str, &str)]) -> (TempDir, MigrationManager) {
        let temp_dir = TempDir::new().unwrap();
        let manager = MigrationManager::for_project(temp_dir.path());
        manager.create_root().unwrap();
        for (name, up, down) in units {
            let dir = manager.root().join(name);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("up.sql"), up).unwrap();
            fs::write(dir.join("down.sql"), down).unwrap();
        }
        (temp_dir, manager)
    }

    #[tokio::test]
    async fn test_applies_in_timestamp_order() {
        let (_dir, manager) = project_with(&[
            ("300_z", "up z", "down z"),
            ("100_a", "up a", "down a"),
            ("200_m", "up m", "down m"),
        ]);
        let store = MemoryStore::default();
        let runner = MigrationRunner::new(Box::new(store.clone()), manager);

        let result = runner.run_migrations(&CancellationToken::new()).await.unwrap();

        assert_eq!(result.batch, Some(1));
        assert_eq!(result.applied_migrations, vec!["100_a", "200_m", "300_z"]);
        let state = store.state.lock().unwrap();
        assert_eq!(state.executed, vec!["up a", "up m", "up z"]);
        assert_eq!(state.commits, 1);
        assert!(state.records.iter().all(|r| r.batch == 1));
    }

    #[tokio::test]
    async fn test_empty_scripts_are_recorded() {
        let (_dir, manager) = project_with(&[("1_empty", "", "")]);
        let store = MemoryStore::default();
        let runner = MigrationRunner::new(Box::new(store.clone()), manager);

        let result = runner.run_migrations(&CancellationToken::new()).await.unwrap();

        assert_eq!(result.applied_count, 1);
        let state = store.state.lock().unwrap();
        assert!(state.executed.is_empty());
        assert_eq!(state.records.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_records_nothing() {
        let (_dir, manager) = project_with(&[
            ("1_a", "up a", ""),
            ("2_b", "INVALID", ""),
            ("3_c", "up c", ""),
        ]);
        let store = MemoryStore::default();
        let runner = MigrationRunner::new(Box::new(store.clone()), manager);

        let result = runner.run_migrations(&CancellationToken::new()).await;

        match result {
            Err(MigrationError::ScriptExecution { path, message }) => {
                assert!(path.ends_with("2_b/up.sql"));
                assert!(message.contains("syntax error"));
            }
            other => panic!("Expected ScriptExecution, got {:?}", other.map(|r| r.applied_migrations)),
        }
        let state = store.state.lock().unwrap();
        assert!(state.records.is_empty());
        assert!(state.executed.is_empty());
        assert_eq!(state.commits, 0);
        assert_eq!(state.rollbacks, 1);
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let (_dir, manager) = project_with(&[("1_a", "up a", "")]);
        let store = MemoryStore::default();
        let runner = MigrationRunner::new(Box::new(store.clone()), manager);
        let cancel = CancellationToken::new();

        runner.run_migrations(&cancel).await.unwrap();
        let second = runner.run_migrations(&cancel).await.unwrap();

        assert_eq!(second.batch, None);
        assert_eq!(second.applied_count, 0);
        assert_eq!(second.skipped_count, 1);
        assert_eq!(store.last_batch_number().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let (_dir, manager) = project_with(&[("1_a", "up a", "")]);
        let store = MemoryStore::default();
        let runner = MigrationRunner::new(Box::new(store.clone()), manager);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = runner.run_migrations(&cancel).await;

        assert!(matches!(result, Err(MigrationError::Cancelled)));
        assert!(store.state.lock().unwrap().records.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_while_unit_runs() {
        let (_dir, manager) = project_with(&[
            ("1_a", "up a", ""),
            ("2_b", "SLOW", ""),
            ("3_c", "up c", ""),
        ]);
        let store = MemoryStore::default();
        let runner = MigrationRunner::new(Box::new(store.clone()), manager);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = runner.run_migrations(&cancel).await;

        assert!(matches!(result, Err(MigrationError::Cancelled)));
        let state = store.state.lock().unwrap();
        assert!(state.records.is_empty());
        assert!(state.executed.is_empty());
        assert_eq!(state.commits, 0);
        assert_eq!(state.rollbacks, 1);
    }

    #[tokio::test]
    async fn test_missing_directory_fails_and_rolls_back() {
        let temp_dir = TempDir::new().unwrap();
        let store = MemoryStore::default();
        let runner = MigrationRunner::new(
            Box::new(store.clone()),
            MigrationManager::for_project(temp_dir.path()),
        );

        let result = runner.run_migrations(&CancellationToken::new()).await;

        assert!(matches!(result, Err(MigrationError::DirectoryNotFound(_))));
        assert_eq!(store.state.lock().unwrap().rollbacks, 1);
    }

    #[tokio::test]
    async fn test_pending_and_status() {
        let (_dir, manager) = project_with(&[("1_a", "up a", ""), ("2_b", "up b", "")]);
        let store = MemoryStore::default();
        store.state.lock().unwrap().records = vec![
            MigrationRecord::new("1_a", 1),
            MigrationRecord::new("0_removed", 1),
        ];
        let runner = MigrationRunner::new(Box::new(store), manager);

        assert_eq!(runner.pending_migrations().await.unwrap(), vec!["2_b"]);

        let status = runner.migration_status().await.unwrap();
        let names: Vec<&str> = status.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["0_removed", "1_a", "2_b"]);
        assert!(!status[0].on_disk);
        assert_eq!(status[2].status, MigrationStatus::Pending);
    }
}
