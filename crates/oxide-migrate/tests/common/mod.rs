#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use oxide_migrate::prelude::*;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tempfile::TempDir;

/// A temporary migration directory.
pub struct MigrationDir {
    dir: TempDir,
}

impl MigrationDir {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Writes (or overwrites) a script.
    pub fn write(&self, name: &str, sql: &str) -> &Self {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create script directory");
        }
        fs::write(&path, sql).unwrap_or_else(|e| panic!("Failed to write {name}: {e}"));
        self
    }

    pub fn remove(&self, name: &str) {
        fs::remove_file(self.dir.path().join(name))
            .unwrap_or_else(|e| panic!("Failed to remove {name}: {e}"));
    }

    /// Default test configuration reading from this directory.
    pub fn config(&self) -> MigrateConfig {
        MigrateConfig::new()
            .with_locations([self.path()])
            .with_installed_by("tester")
            .with_lock_timeout(Duration::from_secs(10))
            .with_lock_retry_interval(Duration::from_millis(10))
    }
}

pub async fn create_test_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("Failed to create in-memory SQLite pool")
}

/// A pool on a database file, shared by several pools in concurrency tests.
pub async fn create_file_pool(path: &PathBuf) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(30));
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create file SQLite pool")
}

/// A pool on a database file with sqlx's connect options and a short busy
/// timeout, so a writer elsewhere makes statements fail with `SQLITE_BUSY`.
pub async fn create_busy_pool(path: &PathBuf) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .busy_timeout(Duration::from_millis(50));
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("Failed to create file SQLite pool")
}

pub fn migrator(pool: &SqlitePool, config: MigrateConfig) -> Migrator {
    Migrator::new(pool.clone(), SqliteDialect::new(), config)
}

pub fn v(text: &str) -> MigrationVersion {
    MigrationVersion::parse(text).unwrap()
}

pub async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
    let row: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await
            .unwrap();
    row.is_some()
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM \"{table}\""))
        .fetch_one(pool)
        .await
        .unwrap();
    row.0
}
