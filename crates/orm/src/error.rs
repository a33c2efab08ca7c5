//! Error types for the migration system
//!
//! Every failure surfaced by the scanner, the storage backends and the
//! migration engine is a [`MigrationError`].

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The migrations root does not exist
    #[error("Migrations directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    /// Filesystem error while scanning or creating migrations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A migration script is missing or unreadable
    #[error("Failed to read migration script {}: {source}", path.display())]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The database rejected the statements of a migration script
    #[error("Failed to execute migration script {}: {message}", path.display())]
    ScriptExecution { path: PathBuf, message: String },

    /// Migration name does not match `^[A-Za-z_]+$`
    #[error("Invalid migration name '{0}': only letters and underscores are allowed")]
    InvalidName(String),

    /// A migration unit with the same directory name already exists
    #[error("Migration already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// Connection string could not be parsed
    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),

    /// Connection string names a scheme no backend serves
    #[error("Unsupported database type: {0}")]
    UnsupportedBackend(String),

    /// Could not open the database
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query against the record table failed
    #[error("Database error: {0}")]
    Database(String),

    /// Begin, commit or rollback failed
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// The workflow was cancelled; the transaction has been rolled back
    #[error("Migration cancelled, all changes rolled back")]
    Cancelled,
}

impl MigrationError {
    /// True for errors caused by the connection string rather than the database
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            MigrationError::InvalidUrl(_) | MigrationError::UnsupportedBackend(_)
        )
    }
}

impl From<sqlx::Error> for MigrationError {
    fn from(err: sqlx::Error) -> Self {
        MigrationError::Database(err.to_string())
    }
}

impl From<libsql::Error> for MigrationError {
    fn from(err: libsql::Error) -> Self {
        MigrationError::Database(err.to_string())
    }
}
