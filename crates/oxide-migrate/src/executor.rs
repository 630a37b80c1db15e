//! Migration executor.
//!
//! The [`Migrator`] drives every operation. Anything that writes to the
//! history or the schema (`migrate`, `baseline`, `repair`, `clean`) runs
//! under the schema lock on a single connection; `info` and `validate` only
//! read.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use oxide_sql_script::SqlStatement;
use serde::Serialize;
use sqlx::Connection;
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::CodeMigration;
use crate::config::MigrateConfig;
use crate::dialect::{MigrationDialect, SchemaObject, SqliteDialect};
use crate::error::{ExecutionFailure, MigrateError, Result, StatementError};
use crate::history::{AppliedMigration, MigrationOutcome, SchemaHistory};
use crate::info::{self, MigrationInfo};
use crate::location::FileSystemLocation;
use crate::lock::{LockSettings, SchemaLock, lock_table_name};
use crate::reconcile::{self, PendingOptions, ValidationIssue, ValidationMode};
use crate::resolver::{self, MigrationType, ResolvedMigration};
use crate::version::{MigrationVersion, display_version};

/// Lets a caller interrupt a running migration.
///
/// Cancelling fails the statement in flight (or the next one) exactly like a
/// database error: the migration is rolled back if it runs in a transaction
/// and a failed row is recorded.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once cancellation is requested.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// One migration applied by `migrate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedSummary {
    /// Version, or `None` for repeatables.
    pub version: Option<MigrationVersion>,
    /// Description.
    pub description: String,
    /// Script identity.
    pub script: String,
    /// Rank assigned in the history.
    pub installed_rank: i64,
    /// How long it took, in milliseconds.
    pub execution_time_ms: i64,
}

/// Result of `migrate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrateReport {
    /// Number of migrations applied by this run.
    pub migrations_applied: usize,
    /// The migrations applied by this run, in order.
    pub applied: Vec<AppliedSummary>,
    /// Highest applied version after the run.
    pub schema_version: Option<MigrationVersion>,
}

/// Result of `repair`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Number of failed rows removed.
    pub failed_removed: usize,
    /// Versions whose checksum or description was realigned.
    pub realigned: Vec<MigrationVersion>,
    /// Issues that repair cannot fix, e.g. scripts missing on disk.
    pub remaining_issues: Vec<ValidationIssue>,
}

/// Result of `clean`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanReport {
    /// Dropped objects, e.g. `table users`.
    pub dropped: Vec<String>,
}

/// Applies and inspects migrations against a database.
pub struct Migrator<D: MigrationDialect = SqliteDialect> {
    pool: SqlitePool,
    dialect: D,
    config: MigrateConfig,
    history: SchemaHistory,
    code_migrations: Vec<Arc<dyn CodeMigration>>,
    cancel: CancelToken,
}

impl<D: MigrationDialect> Migrator<D> {
    /// Creates a new migrator.
    pub fn new(pool: SqlitePool, dialect: D, config: MigrateConfig) -> Self {
        let history = SchemaHistory::new(&dialect, config.table.clone());
        Self {
            pool,
            dialect,
            config,
            history,
            code_migrations: Vec::new(),
            cancel: CancelToken::new(),
        }
    }

    /// Registers a migration defined in Rust code.
    #[must_use]
    pub fn register(mut self, migration: impl CodeMigration + 'static) -> Self {
        self.code_migrations.push(Arc::new(migration));
        self
    }

    /// Uses `token` for cancellation.
    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns a handle that cancels this migrator's statements.
    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    /// Returns the dialect.
    #[must_use]
    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Returns the schema history.
    #[must_use]
    pub fn history(&self) -> &SchemaHistory {
        &self.history
    }

    /// Resolves every configured location and registered migration.
    pub fn resolve(&self) -> Result<Vec<ResolvedMigration>> {
        let mut raw = Vec::new();
        for location in &self.config.locations {
            raw.extend(FileSystemLocation::new(location.clone(), self.config.sql_suffix.as_str()).scan()?);
        }
        raw.extend(self.code_migrations.iter().map(|m| m.to_raw()));
        let replacer = self.config.placeholder_replacer();
        resolver::resolve(raw, &self.dialect.script_rules(), replacer.as_ref())
    }

    /// Returns the history rows.
    pub async fn applied(&self) -> Result<Vec<AppliedMigration>> {
        let mut conn = self.pool.acquire().await?;
        self.history.current_state(&mut conn).await
    }

    /// Reports the state of every resolved and applied migration.
    pub async fn info(&self) -> Result<Vec<MigrationInfo>> {
        let resolved = self.resolve()?;
        let applied = self.applied().await?;
        Ok(info::collect(
            &resolved,
            &applied,
            self.config.target.as_ref(),
            self.config.out_of_order,
        ))
    }

    /// Checks the history against the resolved migrations.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Validation`] listing every issue that the
    /// configured [`ValidationMode`] does not tolerate.
    pub async fn validate(&self) -> Result<()> {
        let resolved = self.resolve()?;
        let applied = self.applied().await?;
        let issues = reconcile::validate(&resolved, &applied, self.config.out_of_order);
        self.reject(issues)
    }

    /// Applies every pending migration.
    ///
    /// Stops at the first failing statement; migrations applied before it
    /// stay applied and recorded.
    ///
    /// # Errors
    ///
    /// Fails before executing anything on resolution, parse, placeholder or
    /// validation errors, and with [`MigrateError::LockTimeout`] when the lock
    /// cannot be taken. A failing statement yields
    /// [`MigrateError::Execution`].
    pub async fn migrate(&self) -> Result<MigrateReport> {
        let resolved = self.resolve()?;
        let mut conn = self.pool.acquire().await?;
        let lock = self.lock(&mut conn).await?;
        let result = self.migrate_locked(&mut conn, &lock, &resolved).await;
        let released = lock.release(&mut conn).await;
        let report = result?;
        released?;
        Ok(report)
    }

    /// Marks the configured baseline version as the starting point.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::Baseline`] when the history already holds
    /// anything but baseline markers.
    pub async fn baseline(&self) -> Result<MigrationVersion> {
        let mut conn = self.pool.acquire().await?;
        let lock = self.lock(&mut conn).await?;
        let result = self.baseline_locked(&mut conn).await;
        let released = lock.release(&mut conn).await;
        let version = result?;
        released?;
        Ok(version)
    }

    /// Removes failed rows and realigns checksums and descriptions of applied
    /// versions with the scripts on disk. Never runs migration content.
    pub async fn repair(&self) -> Result<RepairReport> {
        self.resolve()?;
        let mut conn = self.pool.acquire().await?;
        let lock = self.lock(&mut conn).await?;
        let result = self.repair_locked(&mut conn).await;
        let released = lock.release(&mut conn).await;
        let report = result?;
        released?;
        Ok(report)
    }

    /// Drops every object in the schema, history table included.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::CleanDisabled`] when disabled by configuration.
    pub async fn clean(&self) -> Result<CleanReport> {
        if self.config.clean_disabled {
            return Err(MigrateError::CleanDisabled);
        }
        let mut conn = self.pool.acquire().await?;
        let lock = self.lock(&mut conn).await?;
        let result = self.clean_locked(&mut conn).await;
        let released = lock.release(&mut conn).await;
        let report = result?;
        released?;
        Ok(report)
    }

    /// Removes the schema lock left behind by a run that died while holding
    /// it. Returns whether a lock was removed.
    ///
    /// Only call this when no other migration is running.
    pub async fn release_lock(&self) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        let table = lock_table_name(&self.config.table);
        let released = SchemaLock::force_release(&mut conn, &self.dialect, &table).await?;
        if released {
            warn!(table = %table, "Schema lock released by force");
        }
        Ok(released)
    }

    async fn lock(&self, conn: &mut SqliteConnection) -> Result<SchemaLock> {
        let settings = LockSettings {
            timeout: self.config.lock_timeout(),
            retry_interval: self.config.lock_retry_interval(),
            lease: self.config.lock_lease(),
        };
        SchemaLock::acquire(
            conn,
            &self.dialect,
            &lock_table_name(&self.config.table),
            settings,
        )
        .await
    }

    fn reject(&self, issues: Vec<ValidationIssue>) -> Result<()> {
        let blocking: Vec<ValidationIssue> = match self.config.validation_mode {
            ValidationMode::Strict => issues,
            ValidationMode::Relaxed => issues
                .into_iter()
                .filter(|issue| {
                    if issue.is_repeatable() {
                        warn!(%issue, "Ignoring repeatable migration issue");
                    }
                    !issue.is_repeatable()
                })
                .collect(),
        };
        if blocking.is_empty() {
            Ok(())
        } else {
            Err(MigrateError::Validation(blocking))
        }
    }

    async fn migrate_locked(
        &self,
        conn: &mut SqliteConnection,
        lock: &SchemaLock,
        resolved: &[ResolvedMigration],
    ) -> Result<MigrateReport> {
        let mut applied = self.history.current_state(conn).await?;
        if applied.is_empty() {
            let table = self.history.table();
            let non_empty = self
                .schema_objects(conn)
                .await?
                .iter()
                .any(|object| object.name != table);
            if non_empty {
                if !self.config.baseline_on_migrate {
                    return Err(MigrateError::NonEmptySchema {
                        table: table.to_string(),
                    });
                }
                self.history.ensure_exists(conn).await?;
                self.insert_baseline(conn).await?;
                info!(version = %self.config.baseline_version, "Baselined non-empty schema");
                applied = self.history.current_state(conn).await?;
            }
        }
        self.history.ensure_exists(conn).await?;

        let issues = reconcile::validate(resolved, &applied, self.config.out_of_order);
        let issues = if self.config.validate_on_migrate {
            issues
        } else {
            issues
                .into_iter()
                .filter(|issue| matches!(issue, ValidationIssue::Failed { version: Some(_), .. }))
                .collect()
        };
        self.reject(issues)?;

        let options = PendingOptions {
            out_of_order: self.config.out_of_order,
            target: self.config.target.as_ref(),
            repeatable_order: self.config.repeatable_order,
        };
        let pending = reconcile::pending(resolved, &applied, &options);
        if pending.is_empty() {
            info!(
                schema_version = %display_version(reconcile::schema_version(&applied).as_ref()),
                "Schema is up to date, no migration necessary"
            );
        }

        let installed_by = self.config.installed_by();
        let mut summaries = Vec::with_capacity(pending.len());
        for migration in pending {
            let summary = self
                .apply(conn, migration, &installed_by, summaries.len())
                .await?;
            summaries.push(summary);
            lock.refresh(conn).await?;
        }

        let applied = self.history.current_state(conn).await?;
        let schema_version = reconcile::schema_version(&applied);
        if !summaries.is_empty() {
            info!(
                count = summaries.len(),
                schema_version = %display_version(schema_version.as_ref()),
                "Successfully applied migrations"
            );
        }
        Ok(MigrateReport {
            migrations_applied: summaries.len(),
            applied: summaries,
            schema_version,
        })
    }

    async fn apply(
        &self,
        conn: &mut SqliteConnection,
        migration: &ResolvedMigration,
        installed_by: &str,
        applied_before: usize,
    ) -> Result<AppliedSummary> {
        let version = display_version(migration.version.as_ref());
        info!(
            version = %version,
            description = %migration.description,
            "Migrating schema"
        );

        let started = Instant::now();
        let transactional = self.dialect.supports_ddl_transactions()
            && SqlStatement::all_transactional(&migration.statements);

        // Recording or committing happens after the last statement.
        let last = migration.statements.len().saturating_sub(1);
        let unrecorded = |e: MigrateError| (last, StatementError::Record(Box::new(e)));

        let outcome = if transactional {
            let mut tx = conn.begin().await?;
            let recorded = match self.run_statements(&mut tx, migration).await {
                Ok(()) => {
                    let success = record_for(migration, installed_by, started, true);
                    self.history
                        .record(&mut tx, &success)
                        .await
                        .map(|rank| (rank, success.execution_time_ms))
                        .map_err(unrecorded)
                }
                Err(failed) => Err(failed),
            };
            match recorded {
                Ok(done) => tx
                    .commit()
                    .await
                    .map(|()| done)
                    .map_err(|e| unrecorded(e.into())),
                Err(failed) => {
                    if let Err(e) = tx.rollback().await {
                        warn!(error = %e, script = %migration.script, "Rollback failed");
                    }
                    Err(failed)
                }
            }
        } else {
            debug!(script = %migration.script, "Executing outside a transaction");
            match self.run_statements(conn, migration).await {
                Ok(()) => {
                    let success = record_for(migration, installed_by, started, true);
                    self.history
                        .record(conn, &success)
                        .await
                        .map(|rank| (rank, success.execution_time_ms))
                        .map_err(unrecorded)
                }
                Err(failed) => Err(failed),
            }
        };

        match outcome {
            Ok((installed_rank, execution_time_ms)) => {
                info!(
                    version = %version,
                    description = %migration.description,
                    execution_time_ms,
                    "Migration applied successfully"
                );
                Ok(AppliedSummary {
                    version: migration.version.clone(),
                    description: migration.description.clone(),
                    script: migration.script.clone(),
                    installed_rank,
                    execution_time_ms,
                })
            }
            Err((index, cause)) => {
                let failed = record_for(migration, installed_by, started, false);
                if let Err(e) = self.history.record(conn, &failed).await {
                    warn!(error = %e, script = %migration.script, "Could not record failed migration");
                }
                let statement = migration.statements.get(index);
                Err(ExecutionFailure {
                    version: migration.version.clone(),
                    description: migration.description.clone(),
                    script: migration.script.clone(),
                    statement_index: index + 1,
                    line: statement.map_or(1, |s| s.line),
                    statement: statement.map(|s| s.text.clone()).unwrap_or_default(),
                    cause,
                    migrations_applied: applied_before,
                }
                .into())
            }
        }
    }

    /// Runs a script's statements in order, returning the index and cause of
    /// the first failure.
    async fn run_statements(
        &self,
        conn: &mut SqliteConnection,
        migration: &ResolvedMigration,
    ) -> std::result::Result<(), (usize, StatementError)> {
        let timeout = self.config.statement_timeout();
        for (index, statement) in migration.statements.iter().enumerate() {
            debug!(
                script = %migration.script,
                line = statement.line,
                sql = %statement.text,
                "Executing SQL"
            );
            if self.cancel.is_cancelled() {
                return Err((index, StatementError::Cancelled));
            }
            execute(conn, &statement.text, &self.cancel, timeout)
                .await
                .map_err(|cause| (index, cause))?;
        }
        Ok(())
    }

    async fn baseline_locked(&self, conn: &mut SqliteConnection) -> Result<MigrationVersion> {
        self.history.ensure_exists(conn).await?;
        let applied = self.history.current_state(conn).await?;
        let version = &self.config.baseline_version;

        if applied.iter().any(|row| !row.is_baseline()) {
            return Err(MigrateError::Baseline(format!(
                "history table '{}' already contains migrations",
                self.history.table()
            )));
        }
        if reconcile::baseline_version(&applied).as_ref() == Some(version) {
            info!(version = %version, "Schema already baselined");
            return Ok(version.clone());
        }

        self.insert_baseline(conn).await?;
        info!(version = %version, "Successfully baselined schema");
        Ok(version.clone())
    }

    async fn insert_baseline(&self, conn: &mut SqliteConnection) -> Result<i64> {
        let marker = MigrationOutcome {
            version: Some(self.config.baseline_version.clone()),
            description: self.config.baseline_description.clone(),
            migration_type: MigrationType::Baseline,
            script: self.config.baseline_description.clone(),
            checksum: None,
            installed_by: self.config.installed_by(),
            execution_time_ms: 0,
            success: true,
        };
        self.history.record(conn, &marker).await
    }

    async fn repair_locked(&self, conn: &mut SqliteConnection) -> Result<RepairReport> {
        if !self.history.exists(conn).await? {
            return Err(MigrateError::Repair(format!(
                "history table '{}' does not exist",
                self.history.table()
            )));
        }

        let removed = self.history.remove_failed(conn).await?;
        for row in &removed {
            info!(script = %row.script, "Removed failed migration from history");
        }

        let resolved = self.resolve()?;
        let applied = self.history.current_state(conn).await?;
        let mut realigned: Vec<MigrationVersion> = Vec::new();
        for row in applied.iter().filter(|r| r.success && !r.is_baseline()) {
            let Some(version) = &row.version else {
                continue;
            };
            let Some(migration) = resolved
                .iter()
                .find(|m| m.version.as_ref() == Some(version))
            else {
                continue;
            };
            if row.checksum == migration.checksum && row.description == migration.description {
                continue;
            }
            self.history
                .realign(conn, row.installed_rank, migration.checksum, &migration.description)
                .await?;
            info!(version = %version, script = %migration.script, "Realigned applied migration");
            if !realigned.contains(version) {
                realigned.push(version.clone());
            }
        }

        let applied = self.history.current_state(conn).await?;
        let remaining_issues = reconcile::validate(&resolved, &applied, self.config.out_of_order);
        Ok(RepairReport {
            failed_removed: removed.len(),
            realigned,
            remaining_issues,
        })
    }

    async fn clean_locked(&self, conn: &mut SqliteConnection) -> Result<CleanReport> {
        let objects = self.schema_objects(conn).await?;

        if let Some(sql) = self.dialect.disable_foreign_keys_sql() {
            sqlx::query(sql).execute(&mut *conn).await?;
        }
        let dropped = self.drop_objects(conn, &objects).await;
        if let Some(sql) = self.dialect.enable_foreign_keys_sql() {
            sqlx::query(sql).execute(&mut *conn).await?;
        }
        let dropped = dropped?;

        self.history.drop_table(conn).await?;
        info!(count = dropped.len(), "Successfully cleaned schema");
        Ok(CleanReport { dropped })
    }

    async fn drop_objects(
        &self,
        conn: &mut SqliteConnection,
        objects: &[SchemaObject],
    ) -> Result<Vec<String>> {
        let mut dropped = Vec::with_capacity(objects.len());
        for object in objects {
            debug!(object = %object, "Dropping");
            sqlx::query(&self.dialect.drop_object_sql(object))
                .execute(&mut *conn)
                .await?;
            dropped.push(object.to_string());
        }
        Ok(dropped)
    }

    /// Lists schema objects, leaving out the lock table.
    async fn schema_objects(&self, conn: &mut SqliteConnection) -> Result<Vec<SchemaObject>> {
        let rows: Vec<(String, String)> = sqlx::query_as(self.dialect.list_objects_sql())
            .fetch_all(&mut *conn)
            .await?;
        let lock_table = lock_table_name(&self.config.table);
        rows.into_iter()
            .filter(|(_, name)| *name != lock_table)
            .map(|(kind, name)| -> Result<SchemaObject> {
                let kind = kind
                    .parse()
                    .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
                Ok(SchemaObject { kind, name })
            })
            .collect()
    }
}

/// Runs one statement, honouring cancellation and the statement timeout.
async fn execute(
    conn: &mut SqliteConnection,
    sql: &str,
    cancel: &CancelToken,
    timeout: Option<Duration>,
) -> std::result::Result<(), StatementError> {
    let run = async {
        let query = sqlx::raw_sql(sql).execute(&mut *conn);
        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, query).await {
                Ok(result) => result,
                Err(_) => return Err(StatementError::TimedOut(limit)),
            },
            None => query.await,
        };
        result.map(|_| ()).map_err(StatementError::Database)
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(StatementError::Cancelled),
        result = run => result,
    }
}

fn record_for(
    migration: &ResolvedMigration,
    installed_by: &str,
    started: Instant,
    success: bool,
) -> MigrationOutcome {
    MigrationOutcome {
        version: migration.version.clone(),
        description: migration.description.clone(),
        migration_type: migration.migration_type,
        script: migration.script.clone(),
        checksum: migration.checksum,
        installed_by: installed_by.to_string(),
        execution_time_ms: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
        success,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use sqlx::sqlite::SqlitePoolOptions;
    use tempfile::TempDir;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool")
    }

    fn write(dir: &TempDir, name: &str, sql: &str) {
        fs::write(dir.path().join(name), sql).unwrap();
    }

    fn migrator(pool: SqlitePool, dir: &TempDir) -> Migrator {
        let config = MigrateConfig::new()
            .with_locations([dir.path()])
            .with_installed_by("tester")
            .with_lock_timeout(Duration::from_millis(500))
            .with_lock_retry_interval(Duration::from_millis(10));
        Migrator::new(pool, SqliteDialect::new(), config)
    }

    #[tokio::test]
    async fn test_cancel_token() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let waiter = token.clone();
        let handle = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
        // Completes immediately once cancelled.
        token.cancelled().await;
    }

    #[tokio::test]
    async fn test_cancelled_migration_fails_and_rolls_back() {
        let pool = create_test_pool().await;
        let dir = TempDir::new().unwrap();
        write(&dir, "V1__create.sql", "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES (1);");

        let token = CancelToken::new();
        token.cancel();
        let migrator = migrator(pool.clone(), &dir).with_cancel_token(token);

        let err = migrator.migrate().await.unwrap_err();
        let failure = err.execution_failure().unwrap();
        assert!(matches!(failure.cause, StatementError::Cancelled));
        assert_eq!(failure.statement_index, 1);

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = 't'")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert!(tables.is_empty());

        let rows = migrator.applied().await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(!rows[0].success);
    }

    #[tokio::test]
    async fn test_non_transactional_statement_runs_outside_transaction() {
        let pool = create_test_pool().await;
        let dir = TempDir::new().unwrap();
        write(&dir, "V1__create.sql", "CREATE TABLE t (id INTEGER);\nVACUUM;\n");

        let report = migrator(pool.clone(), &dir).migrate().await.unwrap();
        assert_eq!(report.migrations_applied, 1);
        assert_eq!(report.schema_version, Some(MigrationVersion::parse("1").unwrap()));
    }

    #[tokio::test]
    async fn test_lock_released_after_failure() {
        let pool = create_test_pool().await;
        let dir = TempDir::new().unwrap();
        write(&dir, "V1__bad.sql", "CREATE TABLE t (id INTEGER);\nINSERT INTO missing VALUES (1);\n");

        let migrator = migrator(pool.clone(), &dir);
        assert!(migrator.migrate().await.is_err());

        let held: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM \"oxide_schema_history_lock\"")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(held.0, 0);
    }

    #[tokio::test]
    async fn test_clean_disabled() {
        let pool = create_test_pool().await;
        let dir = TempDir::new().unwrap();
        let config = MigrateConfig::new()
            .with_locations([dir.path()])
            .with_clean_disabled(true);
        let migrator = Migrator::new(pool, SqliteDialect::new(), config);
        assert!(matches!(
            migrator.clean().await,
            Err(MigrateError::CleanDisabled)
        ));
    }

    #[tokio::test]
    async fn test_baseline_refused_after_migrations() {
        let pool = create_test_pool().await;
        let dir = TempDir::new().unwrap();
        write(&dir, "V1__create.sql", "CREATE TABLE t (id INTEGER);");

        let migrator = migrator(pool, &dir);
        migrator.migrate().await.unwrap();
        assert!(matches!(
            migrator.baseline().await,
            Err(MigrateError::Baseline(_))
        ));
    }

    #[tokio::test]
    async fn test_repair_without_history_fails() {
        let pool = create_test_pool().await;
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            migrator(pool, &dir).repair().await,
            Err(MigrateError::Repair(_))
        ));
    }
}
