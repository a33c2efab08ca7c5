//! Pending and revert set calculation
//!
//! Pure functions over the on-disk unit names and the applied records.

use std::collections::{HashMap, HashSet};

use super::definitions::{MigrationRecord, MigrationStatus, MigrationStatusEntry};
use super::naming;

/// Units on disk that have no applied record, in apply order
pub fn pending_migrations<I>(on_disk: I, applied: &[MigrationRecord]) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let applied_names: HashSet<&str> = applied.iter().map(|r| r.name.as_str()).collect();

    let mut pending: Vec<String> = on_disk
        .into_iter()
        .filter(|unit| !applied_names.contains(unit.as_str()))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    naming::sort_ascending(&mut pending);
    pending
}

/// Records of `last_batch`, in revert order
pub fn revert_set(applied: &[MigrationRecord], last_batch: i64) -> Vec<String> {
    let mut units: Vec<String> = applied
        .iter()
        .filter(|r| r.batch == last_batch)
        .map(|r| r.name.clone())
        .collect();

    naming::sort_descending(&mut units);
    units
}

/// Every unit on disk or in the record table, in apply order
pub fn migration_status<I>(on_disk: I, applied: &[MigrationRecord]) -> Vec<MigrationStatusEntry>
where
    I: IntoIterator<Item = String>,
{
    let on_disk: HashSet<String> = on_disk.into_iter().collect();
    let records: HashMap<&str, &MigrationRecord> =
        applied.iter().map(|r| (r.name.as_str(), r)).collect();

    let mut names: Vec<String> = on_disk
        .iter()
        .cloned()
        .chain(records.keys().map(|name| name.to_string()))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    naming::sort_ascending(&mut names);

    names
        .into_iter()
        .map(|name| {
            let status = match records.get(name.as_str()) {
                Some(record) => MigrationStatus::Applied {
                    applied_at: record.applied_at,
                    batch: record.batch,
                },
                None => MigrationStatus::Pending,
            };
            MigrationStatusEntry {
                on_disk: on_disk.contains(&name),
                name,
                status,
            }
        })
        .collect()
}
