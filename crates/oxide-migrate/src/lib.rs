//! Versioned SQL schema migrations for Rust.
//!
//! `oxide-migrate` applies plain SQL scripts to a database in version order
//! and records each one in a schema history table, so every database knows
//! exactly which migrations it has seen:
//!
//! - Versioned scripts (`V1__create_users.sql`, `V1.2__add_index.sql`) are
//!   applied once, in ascending version order.
//! - Repeatable scripts (`R__refresh_views.sql`) are reapplied whenever their
//!   checksum changes.
//! - Checksums catch scripts edited after they were applied.
//! - A lock row keeps two processes from migrating the same schema at once.
//!
//! # Architecture
//!
//! - **Resolver** - Scans locations, parses file names, splits scripts
//! - **History** - Reads and writes the schema history table
//! - **Reconcile** - Compares resolved and applied migrations
//! - **Executor** - Runs `migrate`, `validate`, `info`, `baseline`,
//!   `repair` and `clean`
//! - **Dialect** - Database-specific SQL for the history, lock and clean
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_migrate::prelude::*;
//! use sqlx::sqlite::SqlitePoolOptions;
//!
//! let pool = SqlitePoolOptions::new().connect("sqlite:app.db").await?;
//! let config = MigrateConfig::new().with_locations(["db/migrations"]);
//! let migrator = Migrator::new(pool, SqliteDialect::new(), config);
//!
//! let report = migrator.migrate().await?;
//! println!("applied {} migrations", report.migrations_applied);
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Apply pending migrations
//! oxide-migrate migrate
//!
//! # Show migration status
//! oxide-migrate info
//!
//! # Fix the history after a failed migration
//! oxide-migrate repair
//! ```

pub mod checksum;
pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod history;
pub mod info;
pub mod location;
pub mod lock;
pub mod placeholder;
pub mod reconcile;
pub mod resolver;
pub mod version;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::CodeMigration;
    pub use crate::config::MigrateConfig;
    pub use crate::dialect::{MigrationDialect, SqliteDialect};
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{CancelToken, CleanReport, MigrateReport, Migrator, RepairReport};
    pub use crate::history::{AppliedMigration, SchemaHistory};
    pub use crate::info::{MigrationInfo, MigrationState};
    pub use crate::reconcile::{RepeatableOrder, ValidationIssue, ValidationMode};
    pub use crate::resolver::{MigrationKind, MigrationType, ResolvedMigration};
    pub use crate::version::MigrationVersion;
}

/// Trait for migrations defined in Rust code.
///
/// A code migration supplies its SQL at runtime and is named like a script
/// file without a suffix, e.g. `V3__seed_roles` or `R__refresh_views`. It is
/// versioned, ordered and recorded exactly like a SQL file, with type `RUST`
/// in the history.
pub trait CodeMigration: Send + Sync {
    /// Migration name (e.g., "V3__seed_roles").
    fn name(&self) -> &str;

    /// Returns the SQL to execute.
    fn sql(&self) -> String;

    /// Checksum recorded in the history.
    ///
    /// `None` (the default) disables checksum validation for this migration.
    fn checksum(&self) -> Option<i32> {
        None
    }

    /// Converts to a raw migration for resolution.
    fn to_raw(&self) -> resolver::RawMigration {
        resolver::RawMigration {
            identifier: self.name().to_string(),
            stem: self.name().to_string(),
            location: format!("rust:{}", self.name()),
            source: resolver::MigrationSource::Registered {
                sql: self.sql(),
                checksum: self.checksum(),
            },
        }
    }
}
