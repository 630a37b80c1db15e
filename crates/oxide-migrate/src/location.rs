//! Migration sources on the file system.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::Result;
use crate::resolver::{MigrationSource, RawMigration};

/// Default suffix of SQL migration files.
pub const DEFAULT_SQL_SUFFIX: &str = ".sql";

/// A directory scanned recursively for migration scripts.
#[derive(Debug, Clone)]
pub struct FileSystemLocation {
    root: PathBuf,
    suffix: String,
}

impl FileSystemLocation {
    /// Creates a location for `root`, matching files ending in `suffix`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, suffix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            suffix: suffix.into(),
        }
    }

    /// Returns the scanned directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Reads every matching file, in sorted path order.
    ///
    /// A missing directory yields no migrations and a warning.
    pub fn scan(&self) -> Result<Vec<RawMigration>> {
        if !self.root.is_dir() {
            warn!(location = %self.root.display(), "Migration location not found, skipping");
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        self.collect(&self.root, &mut files)?;
        files.sort();

        let mut migrations = Vec::with_capacity(files.len());
        for path in files {
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %path.display(), "Skipping file with non UTF-8 name");
                continue;
            };
            let Some(stem) = file_name.strip_suffix(&self.suffix) else {
                continue;
            };
            debug!(path = %path.display(), "Found migration script");
            migrations.push(RawMigration {
                identifier: file_name.to_string(),
                stem: stem.to_string(),
                location: path.display().to_string(),
                source: MigrationSource::Script(fs::read_to_string(&path)?),
            });
        }
        Ok(migrations)
    }

    fn collect(&self, dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect(&path, files)?;
            } else if path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(&self.suffix))
            {
                files.push(path);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_recursive_and_sorted() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("V2__second.sql"), "SELECT 2;").unwrap();
        fs::write(dir.path().join("V1__first.sql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("nested").join("R__view.sql"), "SELECT 3;").unwrap();
        fs::write(dir.path().join("README.md"), "not a migration").unwrap();

        let found = FileSystemLocation::new(dir.path(), DEFAULT_SQL_SUFFIX)
            .scan()
            .unwrap();
        let names: Vec<&str> = found.iter().map(|m| m.identifier.as_str()).collect();
        assert_eq!(names, vec!["V1__first.sql", "V2__second.sql", "R__view.sql"]);
        assert_eq!(found[0].stem, "V1__first");
        assert!(matches!(&found[0].source, MigrationSource::Script(sql) if sql == "SELECT 1;"));
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let found = FileSystemLocation::new(dir.path().join("absent"), DEFAULT_SQL_SUFFIX)
            .scan()
            .unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn test_custom_suffix() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("V1__a.pgsql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("V2__b.sql"), "SELECT 2;").unwrap();
        let found = FileSystemLocation::new(dir.path(), ".pgsql").scan().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].stem, "V1__a");
    }
}
