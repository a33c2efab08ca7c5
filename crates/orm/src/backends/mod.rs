//! Storage Backends
//!
//! This module provides the storage contract for applied-migration records and
//! the backends implementing it. The backend is chosen once, from the scheme of
//! the database URL:
//!
//! | scheme                     | dialect    | backend        |
//! |----------------------------|------------|----------------|
//! | `sqlite:<path>`            | SQLite     | [`SqlxStore`]  |
//! | `postgres:`, `postgresql:` | PostgreSQL | [`SqlxStore`]  |
//! | `libsql:`, `http:`, `https:` | libSQL   | [`LibsqlStore`] |

pub mod core;
pub mod dialect;
pub mod libsql_store;
pub mod sqlx_store;

pub use self::core::{MigrationStore, MigrationTransaction};
pub use dialect::{Dialect, DialectKind};
pub use libsql_store::LibsqlStore;
pub use sqlx_store::SqlxStore;

use crate::error::{MigrationError, MigrationResult};

/// Connection settings beyond the URL itself
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Record table override, already validated as an identifier
    pub migrations_table: Option<String>,
    /// libSQL auth token, used when the URL has no `authToken` parameter
    pub auth_token: Option<String>,
}

impl StoreOptions {
    fn dialect(&self, kind: DialectKind) -> Dialect {
        match &self.migrations_table {
            Some(table) => Dialect::new(kind).with_table(table.clone()),
            None => Dialect::new(kind),
        }
    }
}

/// Dialect a database URL dispatches to
pub fn detect_dialect(database_url: &str) -> MigrationResult<DialectKind> {
    let url = url::Url::parse(database_url)
        .map_err(|e| MigrationError::InvalidUrl(format!("{}: {}", database_url, e)))?;

    match url.scheme() {
        "sqlite" => Ok(DialectKind::Sqlite),
        "postgres" | "postgresql" => Ok(DialectKind::Postgres),
        "libsql" | "http" | "https" => Ok(DialectKind::Libsql),
        other => Err(MigrationError::UnsupportedBackend(other.to_string())),
    }
}

/// Open the store for `database_url`, creating the record table if absent
pub async fn connect(database_url: &str, options: &StoreOptions) -> MigrationResult<Box<dyn MigrationStore>> {
    let kind = detect_dialect(database_url)?;
    let dialect = options.dialect(kind);
    tracing::debug!(dialect = %kind, table = dialect.table(), "Connecting to database");

    match kind {
        DialectKind::Sqlite => {
            let url = sqlite_url(database_url)?;
            Ok(Box::new(SqlxStore::connect(&url, dialect).await?))
        }
        DialectKind::Postgres => Ok(Box::new(SqlxStore::connect(database_url, dialect).await?)),
        DialectKind::Libsql => {
            let (url, token) = libsql_url(database_url, options.auth_token.as_deref())?;
            Ok(Box::new(LibsqlStore::connect(&url, token, dialect).await?))
        }
    }
}

/// Turn `sqlite:<path>` into an sqlx URL that creates the file when missing
fn sqlite_url(database_url: &str) -> MigrationResult<String> {
    let path = database_url.strip_prefix("sqlite:").unwrap_or(database_url);

    if path.is_empty() || path.starts_with("//") {
        return Err(MigrationError::InvalidUrl(format!(
            "{}: expected sqlite:<path>",
            database_url
        )));
    }

    if path.contains('?') {
        Ok(format!("sqlite:{}", path))
    } else {
        Ok(format!("sqlite:{}?mode=rwc", path))
    }
}

/// Split an `authToken` query parameter out of a libSQL URL
fn libsql_url(database_url: &str, fallback_token: Option<&str>) -> MigrationResult<(String, String)> {
    let mut url = url::Url::parse(database_url)
        .map_err(|e| MigrationError::InvalidUrl(format!("{}: {}", database_url, e)))?;

    let mut token = None;
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(key, value)| {
            if key == "authToken" {
                token = Some(value.into_owned());
                None
            } else {
                Some((key.into_owned(), value.into_owned()))
            }
        })
        .collect();

    if remaining.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(remaining);
    }

    let token = token
        .or_else(|| fallback_token.map(str::to_string))
        .unwrap_or_default();

    Ok((url.to_string(), token))
}
