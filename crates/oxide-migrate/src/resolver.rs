//! Migration resolution: names, checksums and the ordered migration set.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use oxide_sql_script::{ScriptRules, SqlStatement};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::checksum::checksum;
use crate::error::{MigrateError, ResolutionError, Result};
use crate::placeholder::PlaceholderReplacer;
use crate::version::MigrationVersion;

static VERSIONED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^V_{0,2}([0-9]+(?:[._][0-9]+)*)__(.*)$").expect("versioned name pattern")
});

static UNDO_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^U_{0,2}[0-9]+(?:[._][0-9]+)*__").expect("undo name pattern")
});

static REPEATABLE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^R__(.+)$").expect("repeatable name pattern"));

/// Where the content of a raw migration comes from.
#[derive(Debug, Clone)]
pub enum MigrationSource {
    /// A SQL script read from a location.
    Script(String),
    /// SQL produced by a registered [`CodeMigration`](crate::CodeMigration).
    Registered {
        /// The SQL to run.
        sql: String,
        /// Explicit checksum, if the migration provides one.
        checksum: Option<i32>,
    },
}

/// A migration as found in a location, before resolution.
#[derive(Debug, Clone)]
pub struct RawMigration {
    /// Script identity, e.g. `V1__create_users.sql`.
    pub identifier: String,
    /// Identifier without its file suffix, e.g. `V1__create_users`.
    pub stem: String,
    /// Human readable origin (file path or `rust:` name).
    pub location: String,
    /// The content.
    pub source: MigrationSource,
}

/// Versioned or repeatable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationKind {
    /// Applied once, in version order.
    Versioned,
    /// Re-applied whenever its checksum changes.
    Repeatable,
}

impl MigrationKind {
    /// Returns the display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Versioned => "Versioned",
            Self::Repeatable => "Repeatable",
        }
    }
}

impl fmt::Display for MigrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `type` column of the history table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MigrationType {
    /// A SQL script.
    Sql,
    /// SQL registered from Rust code.
    Rust,
    /// A synthetic baseline marker.
    Baseline,
}

impl MigrationType {
    /// Returns the value stored in the history table.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sql => "SQL",
            Self::Rust => "RUST",
            Self::Baseline => "BASELINE",
        }
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SQL" => Ok(Self::Sql),
            "RUST" => Ok(Self::Rust),
            "BASELINE" => Ok(Self::Baseline),
            other => Err(format!("unknown migration type '{other}'")),
        }
    }
}

/// A migration ready to be compared with history and applied.
#[derive(Debug, Clone)]
pub struct ResolvedMigration {
    /// Version, or `None` for repeatables.
    pub version: Option<MigrationVersion>,
    /// Description, with underscores rendered as spaces.
    pub description: String,
    /// Checksum of the raw content.
    pub checksum: Option<i32>,
    /// Script identity.
    pub script: String,
    /// Versioned or repeatable.
    pub kind: MigrationKind,
    /// History table type.
    pub migration_type: MigrationType,
    /// Human readable origin.
    pub location: String,
    /// Statements after placeholder replacement, in source order.
    pub statements: Vec<SqlStatement>,
}

impl ResolvedMigration {
    /// Returns whether this is a repeatable migration.
    #[must_use]
    pub fn is_repeatable(&self) -> bool {
        self.kind == MigrationKind::Repeatable
    }
}

/// Parsed name of a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationName {
    /// `V<version>__<description>`.
    Versioned {
        /// The version.
        version: MigrationVersion,
        /// The description.
        description: String,
    },
    /// `R__<description>`.
    Repeatable {
        /// The description.
        description: String,
    },
    /// `U<version>__<description>`; undo scripts are not supported.
    Undo,
}

impl MigrationName {
    /// Parses a name without its file suffix.
    pub fn parse(stem: &str) -> std::result::Result<Self, ResolutionError> {
        let invalid = |reason: &str| ResolutionError::InvalidName {
            identifier: stem.to_string(),
            reason: reason.to_string(),
        };

        if UNDO_NAME.is_match(stem) {
            return Ok(Self::Undo);
        }
        if let Some(caps) = VERSIONED_NAME.captures(stem) {
            return Ok(Self::Versioned {
                version: MigrationVersion::parse(&caps[1])?,
                description: describe(&caps[2]),
            });
        }
        if let Some(caps) = REPEATABLE_NAME.captures(stem) {
            return Ok(Self::Repeatable {
                description: describe(&caps[1]),
            });
        }
        match stem.chars().next() {
            Some('V') => Err(invalid(
                "expected V<version>__<description> with a numeric version",
            )),
            Some('R') => Err(invalid("expected R__<description>")),
            Some('U') => Err(invalid(
                "expected U<version>__<description> with a numeric version",
            )),
            _ => Err(invalid("name must start with V, R or U")),
        }
    }
}

fn describe(raw: &str) -> String {
    raw.replace('_', " ")
}

/// Resolves raw migrations into an ordered set.
///
/// Every script is parsed here, so a malformed script fails the whole
/// operation before anything executes. Versioned migrations come first in
/// ascending version order, followed by repeatables ordered by description.
///
/// # Errors
///
/// Returns [`MigrateError::Resolution`] for malformed names and duplicate
/// versions or repeatable descriptions, [`MigrateError::Parse`] for scripts
/// that cannot be split, and [`MigrateError::UnresolvedPlaceholders`] when a
/// placeholder has no value.
pub fn resolve(
    raw: Vec<RawMigration>,
    rules: &ScriptRules,
    placeholders: Option<&PlaceholderReplacer>,
) -> Result<Vec<ResolvedMigration>> {
    let mut resolved = Vec::with_capacity(raw.len());

    for migration in raw {
        let (version, description, kind) = match MigrationName::parse(&migration.stem)? {
            MigrationName::Versioned {
                version,
                description,
            } => (Some(version), description, MigrationKind::Versioned),
            MigrationName::Repeatable { description } => {
                (None, description, MigrationKind::Repeatable)
            }
            MigrationName::Undo => {
                warn!(script = %migration.identifier, "Undo migrations are not supported, skipping");
                continue;
            }
        };

        let (content, checksum, migration_type) = match migration.source {
            MigrationSource::Script(sql) => {
                let sum = checksum(&sql);
                (sql, Some(sum), MigrationType::Sql)
            }
            MigrationSource::Registered { sql, checksum } => (sql, checksum, MigrationType::Rust),
        };

        let content = match placeholders {
            Some(replacer) => replacer.replace(&migration.identifier, &content)?,
            None => content,
        };
        let statements =
            oxide_sql_script::parse(&content, rules).map_err(|source| MigrateError::Parse {
                script: migration.identifier.clone(),
                source,
            })?;

        resolved.push(ResolvedMigration {
            version,
            description,
            checksum,
            script: migration.identifier,
            kind,
            migration_type,
            location: migration.location,
            statements,
        });
    }

    resolved.sort_by(|a, b| match (&a.version, &b.version) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.description.cmp(&b.description),
    });

    for pair in resolved.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        match (&a.version, &b.version) {
            (Some(x), Some(y)) if x == y => {
                return Err(ResolutionError::DuplicateVersion {
                    version: x.clone(),
                    first: a.script.clone(),
                    second: b.script.clone(),
                }
                .into());
            }
            (None, None) if a.description == b.description => {
                return Err(ResolutionError::DuplicateRepeatable {
                    description: a.description.clone(),
                    first: a.script.clone(),
                    second: b.script.clone(),
                }
                .into());
            }
            _ => {}
        }
    }

    Ok(resolved)
}
