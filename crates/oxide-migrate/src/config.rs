//! Migration configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::history::DEFAULT_HISTORY_TABLE;
use crate::location::DEFAULT_SQL_SUFFIX;
use crate::placeholder::{DEFAULT_PREFIX, DEFAULT_SUFFIX, PlaceholderReplacer};
use crate::reconcile::{RepeatableOrder, ValidationMode};
use crate::version::MigrationVersion;

/// Default description of the baseline marker.
pub const DEFAULT_BASELINE_DESCRIPTION: &str = "<< Baseline >>";

/// Settings for a [`Migrator`](crate::executor::Migrator).
///
/// Every field has a default, so a JSON file only needs the fields it
/// changes:
///
/// ```json
/// { "locations": ["db/migrations"], "out_of_order": true,
///   "placeholders": { "schema": "app" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrateConfig {
    /// Directories scanned for SQL migrations.
    pub locations: Vec<PathBuf>,
    /// Suffix of SQL migration files.
    pub sql_suffix: String,
    /// Name of the history table.
    pub table: String,
    /// Never apply versions above this.
    pub target: Option<MigrationVersion>,
    /// Apply versions below the highest applied one.
    pub out_of_order: bool,
    /// Validate before migrating.
    pub validate_on_migrate: bool,
    /// How strictly drift is treated.
    pub validation_mode: ValidationMode,
    /// Where pending repeatables run.
    pub repeatable_order: RepeatableOrder,
    /// Version recorded by `baseline`.
    pub baseline_version: MigrationVersion,
    /// Description recorded by `baseline`.
    pub baseline_description: String,
    /// Baseline a non-empty schema without history instead of failing.
    pub baseline_on_migrate: bool,
    /// Refuse to run `clean`.
    pub clean_disabled: bool,
    /// Placeholder values.
    pub placeholders: BTreeMap<String, String>,
    /// Placeholder prefix.
    pub placeholder_prefix: String,
    /// Placeholder suffix.
    pub placeholder_suffix: String,
    /// Whether placeholders are replaced at all.
    pub placeholder_replacement: bool,
    /// Recorded as `installed_by`; defaults to the OS user.
    pub installed_by: Option<String>,
    /// How long to wait for the schema lock, in milliseconds.
    pub lock_timeout_ms: u64,
    /// Delay between lock attempts, in milliseconds.
    pub lock_retry_interval_ms: u64,
    /// Age in milliseconds after which an unrefreshed lock is considered
    /// abandoned and broken; `None` never breaks a lock.
    pub lock_lease_ms: Option<u64>,
    /// Per-statement timeout in milliseconds; none by default.
    pub statement_timeout_ms: Option<u64>,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            locations: vec![PathBuf::from("migrations")],
            sql_suffix: DEFAULT_SQL_SUFFIX.to_string(),
            table: DEFAULT_HISTORY_TABLE.to_string(),
            target: None,
            out_of_order: false,
            validate_on_migrate: true,
            validation_mode: ValidationMode::Strict,
            repeatable_order: RepeatableOrder::Last,
            baseline_version: MigrationVersion::from_parts([1]),
            baseline_description: DEFAULT_BASELINE_DESCRIPTION.to_string(),
            baseline_on_migrate: false,
            clean_disabled: false,
            placeholders: BTreeMap::new(),
            placeholder_prefix: DEFAULT_PREFIX.to_string(),
            placeholder_suffix: DEFAULT_SUFFIX.to_string(),
            placeholder_replacement: true,
            installed_by: None,
            lock_timeout_ms: 60_000,
            lock_retry_interval_ms: 100,
            lock_lease_ms: Some(3_600_000),
            statement_timeout_ms: None,
        }
    }
}

impl MigrateConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a configuration from a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Replaces the migration locations.
    #[must_use]
    pub fn with_locations<I, P>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.locations = locations.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the SQL file suffix.
    #[must_use]
    pub fn with_sql_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.sql_suffix = suffix.into();
        self
    }

    /// Sets the history table name.
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Sets the target version.
    #[must_use]
    pub fn with_target(mut self, target: MigrationVersion) -> Self {
        self.target = Some(target);
        self
    }

    /// Enables out-of-order application.
    #[must_use]
    pub const fn with_out_of_order(mut self, enabled: bool) -> Self {
        self.out_of_order = enabled;
        self
    }

    /// Enables validation before migrating.
    #[must_use]
    pub const fn with_validate_on_migrate(mut self, enabled: bool) -> Self {
        self.validate_on_migrate = enabled;
        self
    }

    /// Sets the validation mode.
    #[must_use]
    pub const fn with_validation_mode(mut self, mode: ValidationMode) -> Self {
        self.validation_mode = mode;
        self
    }

    /// Sets where repeatables run.
    #[must_use]
    pub const fn with_repeatable_order(mut self, order: RepeatableOrder) -> Self {
        self.repeatable_order = order;
        self
    }

    /// Sets the baseline version.
    #[must_use]
    pub fn with_baseline_version(mut self, version: MigrationVersion) -> Self {
        self.baseline_version = version;
        self
    }

    /// Sets the baseline description.
    #[must_use]
    pub fn with_baseline_description(mut self, description: impl Into<String>) -> Self {
        self.baseline_description = description.into();
        self
    }

    /// Baseline non-empty schemas on migrate.
    #[must_use]
    pub const fn with_baseline_on_migrate(mut self, enabled: bool) -> Self {
        self.baseline_on_migrate = enabled;
        self
    }

    /// Disables `clean`.
    #[must_use]
    pub const fn with_clean_disabled(mut self, disabled: bool) -> Self {
        self.clean_disabled = disabled;
        self
    }

    /// Adds a placeholder value.
    #[must_use]
    pub fn with_placeholder(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.placeholders.insert(name.into(), value.into());
        self
    }

    /// Sets the placeholder prefix and suffix.
    #[must_use]
    pub fn with_placeholder_delimiters(
        mut self,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
    ) -> Self {
        self.placeholder_prefix = prefix.into();
        self.placeholder_suffix = suffix.into();
        self
    }

    /// Enables placeholder replacement.
    #[must_use]
    pub const fn with_placeholder_replacement(mut self, enabled: bool) -> Self {
        self.placeholder_replacement = enabled;
        self
    }

    /// Sets the `installed_by` value.
    #[must_use]
    pub fn with_installed_by(mut self, user: impl Into<String>) -> Self {
        self.installed_by = Some(user.into());
        self
    }

    /// Sets the lock timeout.
    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the delay between lock attempts.
    #[must_use]
    pub fn with_lock_retry_interval(mut self, interval: Duration) -> Self {
        self.lock_retry_interval_ms = duration_ms(interval);
        self
    }

    /// Sets how old a lock must be before it is broken.
    #[must_use]
    pub fn with_lock_lease(mut self, lease: Option<Duration>) -> Self {
        self.lock_lease_ms = lease.map(duration_ms);
        self
    }

    /// Sets the per-statement timeout.
    #[must_use]
    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout_ms = Some(duration_ms(timeout));
        self
    }

    /// Returns the lock timeout.
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    /// Returns the delay between lock attempts.
    #[must_use]
    pub const fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    /// Returns the lock lease.
    #[must_use]
    pub fn lock_lease(&self) -> Option<Duration> {
        self.lock_lease_ms.map(Duration::from_millis)
    }

    /// Returns the per-statement timeout.
    #[must_use]
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    /// Returns the replacer, or `None` when replacement is disabled.
    #[must_use]
    pub fn placeholder_replacer(&self) -> Option<PlaceholderReplacer> {
        self.placeholder_replacement.then(|| {
            PlaceholderReplacer::new(
                self.placeholders.clone(),
                self.placeholder_prefix.as_str(),
                self.placeholder_suffix.as_str(),
            )
        })
    }

    /// Returns the `installed_by` value to record.
    #[must_use]
    pub fn installed_by(&self) -> String {
        self.installed_by.clone().unwrap_or_else(|| {
            std::env::var("USER")
                .or_else(|_| std::env::var("USERNAME"))
                .unwrap_or_else(|_| "oxide-migrate".to_string())
        })
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
