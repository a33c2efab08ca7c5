//! SQL dialect descriptor
//!
//! All SQL text the storage backends send for the record table is produced
//! here. Backends differ only in the values of a [`Dialect`], never in the
//! statements they run.

use crate::transaction::TransactionOptions;

/// Database flavors served by the storage backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectKind {
    Sqlite,
    Postgres,
    Libsql,
}

impl std::fmt::Display for DialectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialectKind::Sqlite => write!(f, "sqlite"),
            DialectKind::Postgres => write!(f, "postgresql"),
            DialectKind::Libsql => write!(f, "libsql"),
        }
    }
}

/// Per-dialect SQL text for the applied-migrations table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialect {
    kind: DialectKind,
    table: String,
}

impl Dialect {
    pub fn sqlite() -> Self {
        Self::new(DialectKind::Sqlite)
    }

    pub fn postgres() -> Self {
        Self::new(DialectKind::Postgres)
    }

    pub fn libsql() -> Self {
        Self::new(DialectKind::Libsql)
    }

    pub fn new(kind: DialectKind) -> Self {
        Self {
            kind,
            table: Self::default_table(kind).to_string(),
        }
    }

    /// Replace the record table name; callers validate it as an identifier
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Record table used when no override is configured
    pub fn default_table(kind: DialectKind) -> &'static str {
        match kind {
            DialectKind::Sqlite => "miflo_migrations",
            DialectKind::Postgres | DialectKind::Libsql => "migrations",
        }
    }

    pub fn kind(&self) -> DialectKind {
        self.kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Parameter placeholder for the 1-based position `index`
    pub fn placeholder(&self, index: usize) -> String {
        match self.kind {
            DialectKind::Postgres => format!("${}", index),
            DialectKind::Sqlite | DialectKind::Libsql => "?".to_string(),
        }
    }

    /// Idempotent DDL for the record table
    pub fn create_table_sql(&self) -> String {
        let (id, name, applied_at) = match self.kind {
            DialectKind::Postgres => (
                "id SERIAL PRIMARY KEY",
                "name VARCHAR(255) UNIQUE NOT NULL",
                "applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP",
            ),
            DialectKind::Sqlite | DialectKind::Libsql => (
                "id INTEGER PRIMARY KEY",
                "name TEXT UNIQUE NOT NULL",
                "applied_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP",
            ),
        };

        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    \
                {},\n    \
                {},\n    \
                batch INTEGER NOT NULL,\n    \
                applied BOOLEAN NOT NULL,\n    \
                {}\n\
            )",
            self.table, id, name, applied_at
        )
    }

    /// Insert of one applied record; binds name, batch, applied
    pub fn record_migration_sql(&self) -> String {
        format!(
            "INSERT INTO {} (name, batch, applied) VALUES ({}, {}, {})",
            self.table,
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3)
        )
    }

    /// Delete of every record in a batch; binds batch
    pub fn delete_batch_sql(&self) -> String {
        format!("DELETE FROM {} WHERE batch = {}", self.table, self.placeholder(1))
    }

    /// Applied records, oldest batch first
    ///
    /// Columns are cast so every backend decodes `batch` as a 64-bit integer
    /// and `applied_at` as text.
    pub fn applied_migrations_sql(&self) -> String {
        format!(
            "SELECT name, CAST(batch AS BIGINT) AS batch, CAST(applied_at AS TEXT) AS applied_at \
             FROM {} WHERE applied = TRUE ORDER BY batch ASC, id ASC",
            self.table
        )
    }

    /// Highest batch number, 0 when the table is empty
    pub fn last_batch_sql(&self) -> String {
        format!("SELECT CAST(COALESCE(MAX(batch), 0) AS BIGINT) FROM {}", self.table)
    }

    /// Statements to run right after BEGIN
    pub fn transaction_preamble(&self, options: &TransactionOptions) -> Vec<String> {
        let mut statements = Vec::new();

        if self.kind != DialectKind::Postgres {
            if options.isolation_level.is_some() || options.read_only || options.lock_records {
                tracing::debug!(
                    dialect = %self.kind,
                    "Transaction options ignored, relying on the database write lock"
                );
            }
            return statements;
        }

        if let Some(level) = options.isolation_level {
            statements.push(format!("SET TRANSACTION ISOLATION LEVEL {}", level.as_sql()));
        }
        if options.read_only {
            statements.push("SET TRANSACTION READ ONLY".to_string());
        }
        if options.lock_records {
            statements.push(format!("LOCK TABLE {} IN EXCLUSIVE MODE", self.table));
        }

        statements
    }
}
