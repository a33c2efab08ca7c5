//! Transaction options
//!
//! Options passed to [`MigrationStore::begin`](crate::backends::MigrationStore::begin).
//! Each dialect turns them into its own transaction preamble; options a
//! dialect cannot express are ignored.

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Read Uncommitted - lowest isolation level
    ReadUncommitted,
    /// Read Committed - default PostgreSQL isolation level
    ReadCommitted,
    /// Repeatable Read - stronger consistency guarantees
    RepeatableRead,
    /// Serializable - highest isolation level
    Serializable,
}

impl IsolationLevel {
    /// Convert to SQL string for SET TRANSACTION ISOLATION LEVEL command
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

/// Transaction configuration options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Transaction isolation level, `None` keeps the database default
    pub isolation_level: Option<IsolationLevel>,
    /// Whether the transaction is read-only
    pub read_only: bool,
    /// Take an exclusive lock on the record table before anything else
    pub lock_records: bool,
}

impl TransactionOptions {
    /// Options used by the apply and revert workflows
    pub fn exclusive() -> Self {
        Self {
            lock_records: true,
            ..Default::default()
        }
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }
}
