//! Migration System
//!
//! Migration units on disk, the pending and revert set calculation, and the
//! runner that applies and reverts batches.

pub mod definitions;
pub mod manager;
pub mod naming;
pub mod plan;
pub mod rollback;
pub mod runner;

pub use definitions::{
    MigrationDirection, MigrationRecord, MigrationRunResult, MigrationStatus, MigrationStatusEntry,
    RollbackResult,
};
pub use manager::MigrationManager;
pub use rollback::MigrationRollback;
pub use runner::MigrationRunner;
