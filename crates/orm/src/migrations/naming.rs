//! Migration unit naming and ordering
//!
//! Unit directories are named `<unix_timestamp>_<name>`. Ordering is by the
//! integer timestamp prefix; a prefix that is not an integer sorts as 0.

use once_cell::sync::Lazy;
use regex::Regex;

static VALID_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z_]+$").expect("valid regex"));

/// Whether `name` may be used for a new migration
pub fn is_valid_name(name: &str) -> bool {
    VALID_NAME.is_match(name)
}

/// Directory name of a unit created at `timestamp`
pub fn unit_name(timestamp: i64, name: &str) -> String {
    format!("{}_{}", timestamp, name)
}

/// Integer timestamp before the first `_`, or 0 when it does not parse
pub fn timestamp_prefix(unit: &str) -> i64 {
    let prefix = unit.split('_').next().unwrap_or_default();
    match prefix.parse::<i64>() {
        Ok(timestamp) => timestamp,
        Err(_) => {
            tracing::warn!(migration = unit, "Migration name has no numeric timestamp prefix, ordering it first");
            0
        }
    }
}

/// Sort for apply: oldest first, ties by full name
pub fn sort_ascending(units: &mut [String]) {
    units.sort_by_cached_key(|unit| (timestamp_prefix(unit), unit.clone()));
}

/// Sort for revert: newest first, exact reverse of [`sort_ascending`]
pub fn sort_descending(units: &mut [String]) {
    sort_ascending(units);
    units.reverse();
}
