//! # miflo-orm: Migration engine for miflo
//!
//! Plain SQL migrations kept as `<timestamp>_<name>/{up,down}.sql` directories,
//! applied in batches against SQLite, PostgreSQL or libSQL.
//!
//! ```no_run
//! use miflo_orm::{connect, MigrationManager, MigrationRunner, StoreOptions};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> miflo_orm::MigrationResult<()> {
//! let store = connect("sqlite:./app.db", &StoreOptions::default()).await?;
//! let runner = MigrationRunner::new(store, MigrationManager::for_project("."));
//! let result = runner.run_migrations(&CancellationToken::new()).await?;
//! println!("applied {} migrations", result.applied_count);
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod error;
pub mod migrations;
pub mod transaction;

pub use backends::{connect, detect_dialect, Dialect, DialectKind, MigrationStore, MigrationTransaction, StoreOptions};
pub use error::{MigrationError, MigrationResult};
pub use migrations::{
    MigrationDirection, MigrationManager, MigrationRecord, MigrationRollback, MigrationRunResult,
    MigrationRunner, MigrationStatus, MigrationStatusEntry, RollbackResult,
};
pub use transaction::{IsolationLevel, TransactionOptions};
