//! Schema history tracking.
//!
//! This module manages the history table that records every migration
//! outcome. Rows are only appended, except by `repair`, which removes failed
//! attempts and realigns checksums and descriptions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteConnection;

use crate::dialect::MigrationDialect;
use crate::error::Result;
use crate::resolver::MigrationType;
use crate::version::MigrationVersion;

/// Default name of the history table.
pub const DEFAULT_HISTORY_TABLE: &str = "oxide_schema_history";

/// A row of the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    /// Position in the history; strictly increasing, never reused.
    pub installed_rank: i64,
    /// Version, or `None` for repeatables.
    pub version: Option<MigrationVersion>,
    /// Description at the time of application.
    pub description: String,
    /// Kind of migration that produced the row.
    pub migration_type: MigrationType,
    /// Script identity.
    pub script: String,
    /// Checksum at the time of application.
    pub checksum: Option<i32>,
    /// Who applied it.
    pub installed_by: String,
    /// When it was applied.
    pub installed_on: DateTime<Utc>,
    /// How long it took, in milliseconds.
    pub execution_time_ms: i64,
    /// Whether it completed.
    pub success: bool,
}

impl AppliedMigration {
    /// Returns whether this is a baseline marker.
    #[must_use]
    pub fn is_baseline(&self) -> bool {
        self.migration_type == MigrationType::Baseline
    }
}

/// An outcome to append to the history.
#[derive(Debug, Clone)]
pub struct MigrationOutcome {
    /// Version, or `None` for repeatables.
    pub version: Option<MigrationVersion>,
    /// Description.
    pub description: String,
    /// Kind of migration.
    pub migration_type: MigrationType,
    /// Script identity.
    pub script: String,
    /// Checksum.
    pub checksum: Option<i32>,
    /// Who applied it.
    pub installed_by: String,
    /// How long it took, in milliseconds.
    pub execution_time_ms: i64,
    /// Whether it completed.
    pub success: bool,
}

type HistoryRow = (
    i64,
    Option<String>,
    String,
    String,
    String,
    Option<i32>,
    String,
    String,
    i64,
    bool,
);

/// Reads and appends the history table.
///
/// All methods run on a caller-provided connection so they can join the
/// caller's transaction.
#[derive(Debug, Clone)]
pub struct SchemaHistory {
    table: String,
    quoted: String,
    create_sql: String,
    exists_sql: &'static str,
}

impl SchemaHistory {
    /// Creates a history for `table`, using `dialect` for DDL.
    pub fn new(dialect: &dyn MigrationDialect, table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            quoted: dialect.quote_identifier(&table),
            create_sql: dialect.create_history_table_sql(&table),
            exists_sql: dialect.table_exists_sql(),
            table,
        }
    }

    /// Returns the unquoted table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Creates the table if it does not exist.
    pub async fn ensure_exists(&self, conn: &mut SqliteConnection) -> Result<()> {
        sqlx::query(&self.create_sql).execute(&mut *conn).await?;
        Ok(())
    }

    /// Returns whether the table exists.
    pub async fn exists(&self, conn: &mut SqliteConnection) -> Result<bool> {
        let row: Option<(String,)> = sqlx::query_as(self.exists_sql)
            .bind(&self.table)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    /// Returns every row, ordered by `installed_rank`.
    ///
    /// A missing table reads as an empty history.
    pub async fn current_state(&self, conn: &mut SqliteConnection) -> Result<Vec<AppliedMigration>> {
        if !self.exists(conn).await? {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT installed_rank, version, description, type, script, checksum, \
             installed_by, installed_on, execution_time, success \
             FROM {} ORDER BY installed_rank",
            self.quoted
        );
        let rows: Vec<HistoryRow> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;
        rows.into_iter().map(into_applied).collect()
    }

    /// Appends an outcome and returns its `installed_rank`.
    pub async fn record(&self, conn: &mut SqliteConnection, outcome: &MigrationOutcome) -> Result<i64> {
        let sql = format!(
            "INSERT INTO {} (version, description, type, script, checksum, \
             installed_by, installed_on, execution_time, success) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.quoted
        );
        let result = sqlx::query(&sql)
            .bind(outcome.version.as_ref().map(ToString::to_string))
            .bind(&outcome.description)
            .bind(outcome.migration_type.as_str())
            .bind(&outcome.script)
            .bind(outcome.checksum)
            .bind(&outcome.installed_by)
            .bind(Utc::now().to_rfc3339())
            .bind(outcome.execution_time_ms)
            .bind(outcome.success)
            .execute(&mut *conn)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Deletes every failed row and returns them.
    pub async fn remove_failed(&self, conn: &mut SqliteConnection) -> Result<Vec<AppliedMigration>> {
        let failed: Vec<AppliedMigration> = self
            .current_state(conn)
            .await?
            .into_iter()
            .filter(|row| !row.success)
            .collect();
        if !failed.is_empty() {
            let sql = format!("DELETE FROM {} WHERE success = 0", self.quoted);
            sqlx::query(&sql).execute(&mut *conn).await?;
        }
        Ok(failed)
    }

    /// Overwrites the checksum and description of one row.
    pub async fn realign(
        &self,
        conn: &mut SqliteConnection,
        installed_rank: i64,
        checksum: Option<i32>,
        description: &str,
    ) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET checksum = ?, description = ? WHERE installed_rank = ?",
            self.quoted
        );
        sqlx::query(&sql)
            .bind(checksum)
            .bind(description)
            .bind(installed_rank)
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    /// Drops the table.
    pub async fn drop_table(&self, conn: &mut SqliteConnection) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.quoted);
        sqlx::query(&sql).execute(&mut *conn).await?;
        Ok(())
    }
}

fn into_applied(row: HistoryRow) -> Result<AppliedMigration> {
    let (
        installed_rank,
        version,
        description,
        migration_type,
        script,
        checksum,
        installed_by,
        installed_on,
        execution_time_ms,
        success,
    ) = row;

    let version = version
        .filter(|v| !v.is_empty())
        .map(|v| MigrationVersion::parse(&v))
        .transpose()?;
    let migration_type = migration_type
        .parse::<MigrationType>()
        .map_err(|e| sqlx::Error::Decode(e.into()))?;

    Ok(AppliedMigration {
        installed_rank,
        version,
        description,
        migration_type,
        script,
        checksum,
        installed_by,
        installed_on: parse_timestamp(&installed_on),
        execution_time_ms,
        success,
    })
}

fn parse_timestamp(text: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            // SQLite datetime format fallback
            chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
                .map(|dt| dt.and_utc())
                .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::SqliteDialect;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    fn outcome(version: &str, success: bool) -> MigrationOutcome {
        MigrationOutcome {
            version: Some(MigrationVersion::parse(version).unwrap()),
            description: format!("step {version}"),
            migration_type: MigrationType::Sql,
            script: format!("V{version}__step.sql"),
            checksum: Some(42),
            installed_by: "tester".to_string(),
            execution_time_ms: 3,
            success,
        }
    }

    #[tokio::test]
    async fn test_ensure_exists_idempotent() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let history = SchemaHistory::new(&SqliteDialect::new(), DEFAULT_HISTORY_TABLE);

        assert!(!history.exists(&mut conn).await.unwrap());
        assert!(history.current_state(&mut conn).await.unwrap().is_empty());
        history.ensure_exists(&mut conn).await.unwrap();
        history.ensure_exists(&mut conn).await.unwrap();
        assert!(history.exists(&mut conn).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_assigns_increasing_ranks() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let history = SchemaHistory::new(&SqliteDialect::new(), DEFAULT_HISTORY_TABLE);
        history.ensure_exists(&mut conn).await.unwrap();

        let r1 = history.record(&mut conn, &outcome("1", true)).await.unwrap();
        let r2 = history.record(&mut conn, &outcome("2", true)).await.unwrap();
        assert!(r2 > r1);

        let rows = history.current_state(&mut conn).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].installed_rank, r1);
        assert_eq!(rows[1].version, Some(MigrationVersion::parse("2").unwrap()));
        assert_eq!(rows[1].checksum, Some(42));
        assert_eq!(rows[1].migration_type, MigrationType::Sql);
        assert!(rows[1].success);
    }

    #[tokio::test]
    async fn test_ranks_not_reused_after_removing_failed() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let history = SchemaHistory::new(&SqliteDialect::new(), DEFAULT_HISTORY_TABLE);
        history.ensure_exists(&mut conn).await.unwrap();

        history.record(&mut conn, &outcome("1", true)).await.unwrap();
        let failed = history.record(&mut conn, &outcome("2", false)).await.unwrap();

        let removed = history.remove_failed(&mut conn).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].installed_rank, failed);

        let next = history.record(&mut conn, &outcome("2", true)).await.unwrap();
        assert!(next > failed);
    }

    #[tokio::test]
    async fn test_realign_updates_row() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let history = SchemaHistory::new(&SqliteDialect::new(), "custom_history");
        history.ensure_exists(&mut conn).await.unwrap();

        let rank = history.record(&mut conn, &outcome("1", true)).await.unwrap();
        history
            .realign(&mut conn, rank, Some(7), "renamed")
            .await
            .unwrap();

        let rows = history.current_state(&mut conn).await.unwrap();
        assert_eq!(rows[0].checksum, Some(7));
        assert_eq!(rows[0].description, "renamed");
    }

    #[tokio::test]
    async fn test_drop_table() {
        let pool = create_test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        let history = SchemaHistory::new(&SqliteDialect::new(), DEFAULT_HISTORY_TABLE);
        history.ensure_exists(&mut conn).await.unwrap();
        history.drop_table(&mut conn).await.unwrap();
        assert!(!history.exists(&mut conn).await.unwrap());
    }

    #[test]
    fn test_parse_timestamp_fallback() {
        let parsed = parse_timestamp("2024-01-02 03:04:05");
        assert_eq!(parsed.to_rfc3339(), "2024-01-02T03:04:05+00:00");
        assert_eq!(parse_timestamp("garbage"), DateTime::<Utc>::UNIX_EPOCH);
    }
}
