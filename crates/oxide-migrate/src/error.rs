//! Error types for the migration engine.

use std::time::Duration;

use oxide_sql_script::ParseError;

use crate::reconcile::ValidationIssue;
use crate::version::MigrationVersion;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// A migration script could not be split into statements.
    #[error("Failed to parse migration script '{script}': {source}")]
    Parse {
        /// Script identity of the offending migration.
        script: String,
        /// The parser error, with its line.
        #[source]
        source: ParseError,
    },

    /// A migration identity is malformed or collides with another.
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// The schema history does not match the resolved migrations.
    #[error("Validation failed:\n{}", .0.iter().map(|i| format!("  - {i}")).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<ValidationIssue>),

    /// The schema lock could not be acquired in time. Retryable.
    #[error("Timed out after {waited:?} waiting for lock on '{table}'")]
    LockTimeout {
        /// The lock table.
        table: String,
        /// How long acquisition was attempted.
        waited: Duration,
    },

    /// The schema lock was broken by another process while still in use.
    #[error("Lost lock on '{table}' to another process")]
    LockLost {
        /// The lock table.
        table: String,
    },

    /// A statement failed while applying a migration.
    #[error(transparent)]
    Execution(Box<ExecutionFailure>),

    /// The history table is not in a state that allows a baseline.
    #[error("Cannot baseline: {0}")]
    Baseline(String),

    /// Repair could not complete.
    #[error("Cannot repair: {0}")]
    Repair(String),

    /// The schema has objects but no history table.
    #[error(
        "Found non-empty schema without history table '{table}'; \
         baseline it first or enable baseline_on_migrate"
    )]
    NonEmptySchema {
        /// The expected history table.
        table: String,
    },

    /// `clean` was requested while disabled by configuration.
    #[error("clean is disabled by configuration")]
    CleanDisabled,

    /// Placeholders in a script have no configured value.
    #[error(
        "No value provided for placeholder expressions in '{script}': {}",
        .placeholders.join(", ")
    )]
    UnresolvedPlaceholders {
        /// Script identity.
        script: String,
        /// Every unresolved expression, e.g. `${schema}`.
        placeholders: Vec<String>,
    },

    /// Database error outside of migration content.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading migration files or configuration).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrateError {
    /// Returns whether retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Returns the execution failure, if this is one.
    #[must_use]
    pub fn execution_failure(&self) -> Option<&ExecutionFailure> {
        match self {
            Self::Execution(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<ExecutionFailure> for MigrateError {
    fn from(failure: ExecutionFailure) -> Self {
        Self::Execution(Box::new(failure))
    }
}

/// Errors in migration identities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolutionError {
    /// A name does not follow `V<version>__<description>` or `R__<description>`.
    #[error("Invalid migration name '{identifier}': {reason}")]
    InvalidName {
        /// The offending identifier.
        identifier: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A version string is not a sequence of integers.
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion {
        /// The offending text.
        version: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Two versioned migrations share a version.
    #[error("Found more than one migration with version {version}: '{first}' and '{second}'")]
    DuplicateVersion {
        /// The shared version.
        version: MigrationVersion,
        /// First script.
        first: String,
        /// Second script.
        second: String,
    },

    /// Two repeatable migrations share a description.
    #[error("Found more than one repeatable migration '{description}': '{first}' and '{second}'")]
    DuplicateRepeatable {
        /// The shared description.
        description: String,
        /// First script.
        first: String,
        /// Second script.
        second: String,
    },
}

/// Why a statement did not complete.
#[derive(Debug, thiserror::Error)]
pub enum StatementError {
    /// The database rejected the statement.
    #[error("{0}")]
    Database(#[source] sqlx::Error),

    /// The caller cancelled the run.
    #[error("statement cancelled")]
    Cancelled,

    /// The statement exceeded the configured statement timeout.
    #[error("statement timed out after {0:?}")]
    TimedOut(Duration),

    /// Every statement ran but the outcome could not be recorded or
    /// committed.
    #[error("could not record the migration in the schema history: {0}")]
    Record(#[source] Box<MigrateError>),
}

/// A failed statement, with enough context to locate it in its script.
#[derive(Debug, thiserror::Error)]
#[error(
    "Migration {script} failed at statement {statement_index} (line {line}): {cause}\n\
     Statement: {statement}"
)]
pub struct ExecutionFailure {
    /// Version of the failing migration (`None` for repeatables).
    pub version: Option<MigrationVersion>,
    /// Description of the failing migration.
    pub description: String,
    /// Script identity of the failing migration.
    pub script: String,
    /// 1-based index of the failing statement within the script.
    pub statement_index: usize,
    /// 1-based line where the failing statement starts.
    pub line: usize,
    /// Text of the failing statement.
    pub statement: String,
    /// What went wrong.
    #[source]
    pub cause: StatementError,
    /// Migrations successfully applied earlier in the same run.
    pub migrations_applied: usize,
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_lock_timeout_is_retryable() {
        let timeout = MigrateError::LockTimeout {
            table: "oxide_schema_history_lock".to_string(),
            waited: Duration::from_secs(1),
        };
        assert!(timeout.is_retryable());
        assert!(!MigrateError::CleanDisabled.is_retryable());
        assert!(!MigrateError::Baseline("x".into()).is_retryable());
    }

    #[test]
    fn test_execution_failure_message_locates_statement() {
        let err = MigrateError::from(ExecutionFailure {
            version: Some(MigrationVersion::parse("2").unwrap()),
            description: "add index".to_string(),
            script: "V2__add_index.sql".to_string(),
            statement_index: 3,
            line: 7,
            statement: "CREATE INDEX broken".to_string(),
            cause: StatementError::Cancelled,
            migrations_applied: 1,
        });
        let message = err.to_string();
        assert!(message.contains("V2__add_index.sql"));
        assert!(message.contains("statement 3"));
        assert!(message.contains("line 7"));
        assert!(message.contains("CREATE INDEX broken"));
        assert_eq!(err.execution_failure().unwrap().migrations_applied, 1);
    }

    #[test]
    fn test_unresolved_placeholders_message() {
        let err = MigrateError::UnresolvedPlaceholders {
            script: "V1__init.sql".to_string(),
            placeholders: vec!["${a}".to_string(), "${b}".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "No value provided for placeholder expressions in 'V1__init.sql': ${a}, ${b}"
        );
    }
}
