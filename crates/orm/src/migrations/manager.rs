//! Migration Manager - File system operations for migrations
//!
//! Handles scanning, creating and reading migration units. A unit is a
//! directory `<root>/<timestamp>_<name>/` holding `up.sql` and `down.sql`.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::definitions::MigrationDirection;
use super::naming;
use crate::error::{MigrationError, MigrationResult};

/// Migration manager for one migrations root directory
#[derive(Debug, Clone)]
pub struct MigrationManager {
    root: PathBuf,
}

impl MigrationManager {
    /// Manager for the given migrations root
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Manager for `<project_dir>/migrations`
    pub fn for_project(project_dir: impl AsRef<Path>) -> Self {
        Self::new(project_dir.as_ref().join("migrations"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Create the migrations root (and parents)
    pub fn create_root(&self) -> MigrationResult<()> {
        fs::create_dir_all(&self.root)?;
        tracing::info!("Created migrations directory {}", self.root.display());
        Ok(())
    }

    /// Names of all unit directories under the root, in no particular order
    pub fn scan(&self) -> MigrationResult<Vec<String>> {
        let entries = fs::read_dir(&self.root).map_err(|e| match e.kind() {
            ErrorKind::NotFound => MigrationError::DirectoryNotFound(self.root.clone()),
            _ => MigrationError::Io(e),
        })?;

        let mut units = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => units.push(name),
                Err(name) => {
                    tracing::warn!("Skipping migration directory with non UTF-8 name: {:?}", name)
                }
            }
        }

        tracing::debug!(count = units.len(), "Scanned {}", self.root.display());
        Ok(units)
    }

    /// Path of a unit's script
    pub fn script_path(&self, unit: &str, direction: MigrationDirection) -> PathBuf {
        self.root.join(unit).join(direction.script_name())
    }

    /// Contents of a unit's script
    pub fn read_script(&self, unit: &str, direction: MigrationDirection) -> MigrationResult<String> {
        let path = self.script_path(unit, direction);
        fs::read_to_string(&path).map_err(|source| MigrationError::ScriptRead { path, source })
    }

    /// Create a new unit with empty scripts, returning its directory name
    ///
    /// The name is validated before anything touches the filesystem. The
    /// root must already exist.
    pub fn create_migration(&self, name: &str, timestamp: i64) -> MigrationResult<String> {
        if !naming::is_valid_name(name) {
            return Err(MigrationError::InvalidName(name.to_string()));
        }
        if !self.exists() {
            return Err(MigrationError::DirectoryNotFound(self.root.clone()));
        }

        let unit = naming::unit_name(timestamp, name);
        let unit_dir = self.root.join(&unit);

        fs::create_dir(&unit_dir).map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => MigrationError::AlreadyExists(unit_dir.clone()),
            _ => MigrationError::Io(e),
        })?;

        fs::write(unit_dir.join(MigrationDirection::Up.script_name()), "")?;
        fs::write(unit_dir.join(MigrationDirection::Down.script_name()), "")?;

        tracing::info!(migration = %unit, "Created migration");
        Ok(unit)
    }
}
