//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the fundamental types used throughout the migration system including
//! MigrationRecord, the workflow results and the status view.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// An applied migration as persisted in the record table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Migration unit name (`<timestamp>_<name>`)
    pub name: String,
    /// Batch number (for grouping migrations)
    pub batch: i64,
    /// When the migration was applied, if the stored value could be parsed
    pub applied_at: Option<NaiveDateTime>,
}

impl MigrationRecord {
    pub fn new(name: impl Into<String>, batch: i64) -> Self {
        Self {
            name: name.into(),
            batch,
            applied_at: None,
        }
    }

    /// Parse the textual `applied_at` column of any dialect
    pub fn parse_applied_at(raw: Option<&str>) -> Option<NaiveDateTime> {
        let raw = raw?.trim();
        // Postgres renders timestamptz with an offset suffix
        let raw = raw.split('+').next().unwrap_or(raw);
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
            .ok()
    }
}

/// Result of running migrations
#[derive(Debug, Clone, Serialize)]
pub struct MigrationRunResult {
    /// Batch the migrations were recorded under, `None` when nothing was pending
    pub batch: Option<i64>,
    /// Number of migrations that were applied
    pub applied_count: usize,
    /// Names of migrations that were applied, in application order
    pub applied_migrations: Vec<String>,
    /// Number of migrations that were skipped (already applied)
    pub skipped_count: usize,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Result of rolling back migrations
#[derive(Debug, Clone, Serialize)]
pub struct RollbackResult {
    /// Batch that was reverted, `None` when nothing was recorded
    pub batch: Option<i64>,
    /// Number of migrations that were rolled back
    pub rolled_back_count: usize,
    /// Names of migrations that were rolled back, in reversion order
    pub rolled_back_migrations: Vec<String>,
    /// Total execution time in milliseconds
    pub execution_time_ms: u128,
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationDirection {
    /// Apply the migration (run up.sql)
    Up,
    /// Rollback the migration (run down.sql)
    Down,
}

impl MigrationDirection {
    /// Script file name inside a migration unit directory
    pub fn script_name(&self) -> &'static str {
        match self {
            MigrationDirection::Up => "up.sql",
            MigrationDirection::Down => "down.sql",
        }
    }
}

/// Migration status in the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MigrationStatus {
    /// Migration is pending (not yet applied)
    Pending,
    /// Migration has been applied
    Applied {
        /// When it was applied
        applied_at: Option<NaiveDateTime>,
        /// Batch number
        batch: i64,
    },
}

/// One line of the status view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatusEntry {
    pub name: String,
    #[serde(flatten)]
    pub status: MigrationStatus,
    /// False when a record exists but its directory was deleted
    pub on_disk: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_applied_at_formats() {
        let sqlite = MigrationRecord::parse_applied_at(Some("2024-03-01 12:30:45"));
        let postgres = MigrationRecord::parse_applied_at(Some("2024-03-01 12:30:45.123456"));
        let with_offset = MigrationRecord::parse_applied_at(Some("2024-03-01 12:30:45+00"));

        assert_eq!(sqlite.unwrap().to_string(), "2024-03-01 12:30:45");
        assert!(postgres.is_some());
        assert_eq!(with_offset, sqlite);
        assert_eq!(MigrationRecord::parse_applied_at(Some("yesterday")), None);
        assert_eq!(MigrationRecord::parse_applied_at(None), None);
    }

    #[test]
    fn test_script_names() {
        assert_eq!(MigrationDirection::Up.script_name(), "up.sql");
        assert_eq!(MigrationDirection::Down.script_name(), "down.sql");
    }

    #[test]
    fn test_status_serialization() {
        let entry = MigrationStatusEntry {
            name: "1700000000_create_users".to_string(),
            status: MigrationStatus::Applied {
                applied_at: None,
                batch: 2,
            },
            on_disk: true,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["state"], "applied");
        assert_eq!(json["batch"], 2);
        assert_eq!(json["name"], "1700000000_create_users");
    }
}
