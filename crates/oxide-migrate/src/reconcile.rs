//! Reconciliation of resolved migrations with the schema history.
//!
//! Everything here is pure: it compares two snapshots and never touches the
//! database.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::history::AppliedMigration;
use crate::resolver::ResolvedMigration;
use crate::version::{MigrationVersion, display_version};

/// How strictly `validate` and `migrate` treat history drift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Every issue fails validation.
    #[default]
    Strict,
    /// Issues that only concern repeatable migrations are logged instead.
    Relaxed,
}

/// Where pending repeatable migrations run relative to versioned ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatableOrder {
    /// After all pending versioned migrations.
    #[default]
    Last,
    /// Before all pending versioned migrations.
    First,
}

/// A mismatch between the history and the resolved migrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum ValidationIssue {
    /// An applied script was edited after it ran.
    ChecksumMismatch {
        /// The migration version.
        version: MigrationVersion,
        /// Script identity.
        script: String,
        /// Checksum in the history.
        applied: Option<i32>,
        /// Checksum of the script now.
        resolved: Option<i32>,
    },
    /// An applied script was renamed after it ran.
    DescriptionMismatch {
        /// The migration version.
        version: MigrationVersion,
        /// Description in the history.
        applied: String,
        /// Description of the script now.
        resolved: String,
    },
    /// A version below the highest applied one never ran.
    NotApplied {
        /// The migration version.
        version: MigrationVersion,
        /// Script identity.
        script: String,
    },
    /// An applied version has no script any more.
    MissingOnDisk {
        /// The migration version.
        version: MigrationVersion,
        /// Description in the history.
        description: String,
    },
    /// An applied repeatable has no script any more.
    MissingRepeatable {
        /// Description in the history.
        description: String,
    },
    /// The most recent attempt of a migration failed.
    Failed {
        /// The migration version, `None` for repeatables.
        version: Option<MigrationVersion>,
        /// Script identity.
        script: String,
    },
    /// A version was applied successfully more than once.
    DuplicateApplied {
        /// The migration version.
        version: MigrationVersion,
    },
}

impl ValidationIssue {
    /// Returns whether the issue only concerns a repeatable migration.
    #[must_use]
    pub const fn is_repeatable(&self) -> bool {
        matches!(
            self,
            Self::MissingRepeatable { .. } | Self::Failed { version: None, .. }
        )
    }

    /// Returns the version the issue is about, if any.
    #[must_use]
    pub const fn version(&self) -> Option<&MigrationVersion> {
        match self {
            Self::ChecksumMismatch { version, .. }
            | Self::DescriptionMismatch { version, .. }
            | Self::NotApplied { version, .. }
            | Self::MissingOnDisk { version, .. }
            | Self::DuplicateApplied { version } => Some(version),
            Self::Failed { version, .. } => version.as_ref(),
            Self::MissingRepeatable { .. } => None,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChecksumMismatch {
                version,
                script,
                applied,
                resolved,
            } => write!(
                f,
                "Migration checksum mismatch for version {version} ({script}): \
                 applied {}, resolved {}",
                fmt_checksum(*applied),
                fmt_checksum(*resolved)
            ),
            Self::DescriptionMismatch {
                version,
                applied,
                resolved,
            } => write!(
                f,
                "Migration description mismatch for version {version}: \
                 applied '{applied}', resolved '{resolved}'"
            ),
            Self::NotApplied { version, script } => write!(
                f,
                "Detected resolved migration not applied to database: {version} ({script})"
            ),
            Self::MissingOnDisk {
                version,
                description,
            } => write!(
                f,
                "Detected applied migration not resolved locally: {version} ({description})"
            ),
            Self::MissingRepeatable { description } => write!(
                f,
                "Detected applied repeatable migration not resolved locally: {description}"
            ),
            Self::Failed { version, script } => write!(
                f,
                "Detected failed migration to version {} ({script}); repair it first",
                display_version(version.as_ref())
            ),
            Self::DuplicateApplied { version } => {
                write!(f, "Version {version} was applied more than once")
            }
        }
    }
}

fn fmt_checksum(checksum: Option<i32>) -> String {
    checksum.map_or_else(|| "none".to_string(), |c| c.to_string())
}

/// History facts derived once from the applied rows.
struct HistoryView<'a> {
    /// Successful versioned rows, by version.
    versioned: HashMap<&'a MigrationVersion, Vec<&'a AppliedMigration>>,
    /// The most recent versioned row of every version.
    latest_versioned: HashMap<&'a MigrationVersion, &'a AppliedMigration>,
    /// The most recent row of every repeatable, by description.
    latest_repeatable: HashMap<&'a str, &'a AppliedMigration>,
    /// Version of the most recent baseline marker.
    baseline: Option<&'a MigrationVersion>,
    /// Highest successfully applied version, baseline included.
    highest: Option<&'a MigrationVersion>,
}

impl<'a> HistoryView<'a> {
    fn new(applied: &'a [AppliedMigration]) -> Self {
        let mut view = Self {
            versioned: HashMap::new(),
            latest_versioned: HashMap::new(),
            latest_repeatable: HashMap::new(),
            baseline: None,
            highest: None,
        };
        // Rows arrive in rank order, so later inserts overwrite earlier ones.
        for row in applied {
            match &row.version {
                Some(version) if row.is_baseline() => {
                    view.baseline = Some(version);
                    view.raise(version);
                }
                Some(version) => {
                    view.latest_versioned.insert(version, row);
                    if row.success {
                        view.versioned.entry(version).or_default().push(row);
                        view.raise(version);
                    }
                }
                None => {
                    view.latest_repeatable.insert(row.description.as_str(), row);
                }
            }
        }
        view
    }

    fn raise(&mut self, version: &'a MigrationVersion) {
        if self.highest.is_none_or(|h| version > h) {
            self.highest = Some(version);
        }
    }

    fn is_applied(&self, version: &MigrationVersion) -> bool {
        self.versioned.contains_key(version)
    }

    fn below_baseline(&self, version: &MigrationVersion) -> bool {
        self.baseline.is_some_and(|b| version <= b)
    }
}

/// Compares the resolved migrations with the history.
///
/// Returns every issue found, in resolved order followed by history order.
#[must_use]
pub fn validate(
    resolved: &[ResolvedMigration],
    applied: &[AppliedMigration],
    out_of_order: bool,
) -> Vec<ValidationIssue> {
    let view = HistoryView::new(applied);
    let mut issues = Vec::new();

    for migration in resolved {
        let Some(version) = &migration.version else {
            continue;
        };
        if let Some(rows) = view.versioned.get(version) {
            let row = rows[0];
            if row.checksum != migration.checksum {
                issues.push(ValidationIssue::ChecksumMismatch {
                    version: version.clone(),
                    script: migration.script.clone(),
                    applied: row.checksum,
                    resolved: migration.checksum,
                });
            }
            if row.description != migration.description {
                issues.push(ValidationIssue::DescriptionMismatch {
                    version: version.clone(),
                    applied: row.description.clone(),
                    resolved: migration.description.clone(),
                });
            }
        } else if !view.below_baseline(version)
            && !out_of_order
            && view.highest.is_some_and(|h| version < h)
            && !view.latest_versioned.contains_key(version)
        {
            issues.push(ValidationIssue::NotApplied {
                version: version.clone(),
                script: migration.script.clone(),
            });
        }
    }

    let mut seen_duplicates = Vec::new();
    for row in applied {
        let Some(version) = &row.version else {
            continue;
        };
        if row.is_baseline() {
            continue;
        }
        let latest = view.latest_versioned.get(version).copied();
        if !row.success && latest == Some(row) {
            issues.push(ValidationIssue::Failed {
                version: Some(version.clone()),
                script: row.script.clone(),
            });
            continue;
        }
        if !row.success {
            continue;
        }
        if view.versioned.get(version).is_some_and(|rows| rows.len() > 1) {
            if !seen_duplicates.contains(&version) {
                seen_duplicates.push(version);
                issues.push(ValidationIssue::DuplicateApplied {
                    version: version.clone(),
                });
            }
            continue;
        }
        if !resolved.iter().any(|m| m.version.as_ref() == Some(version)) {
            issues.push(ValidationIssue::MissingOnDisk {
                version: version.clone(),
                description: row.description.clone(),
            });
        }
    }

    for row in applied.iter().filter(|r| r.version.is_none()) {
        if view.latest_repeatable.get(row.description.as_str()) != Some(&row) {
            continue;
        }
        if !row.success {
            issues.push(ValidationIssue::Failed {
                version: None,
                script: row.script.clone(),
            });
        } else if !resolved
            .iter()
            .any(|m| m.is_repeatable() && m.description == row.description)
        {
            issues.push(ValidationIssue::MissingRepeatable {
                description: row.description.clone(),
            });
        }
    }

    issues
}

/// Options that shape the pending set.
#[derive(Debug, Clone, Default)]
pub struct PendingOptions<'a> {
    /// Allow versions below the highest applied one.
    pub out_of_order: bool,
    /// Never apply versions above this.
    pub target: Option<&'a MigrationVersion>,
    /// Where repeatables run.
    pub repeatable_order: RepeatableOrder,
}

/// Returns the migrations to apply, in execution order.
///
/// Versioned migrations run in ascending version order, so with
/// out-of-order enabled an older, newly added version runs before newer
/// ones. Repeatables run first or last as configured, ordered by
/// description, whenever they are new, changed or last failed.
#[must_use]
pub fn pending<'r>(
    resolved: &'r [ResolvedMigration],
    applied: &[AppliedMigration],
    options: &PendingOptions<'_>,
) -> Vec<&'r ResolvedMigration> {
    let view = HistoryView::new(applied);

    let mut versioned: Vec<&ResolvedMigration> = resolved
        .iter()
        .filter(|m| {
            let Some(version) = &m.version else {
                return false;
            };
            !view.is_applied(version)
                && !view.below_baseline(version)
                && options.target.is_none_or(|t| version <= t)
                && (options.out_of_order || view.highest.is_none_or(|h| version > h))
        })
        .collect();
    versioned.sort_by(|a, b| a.version.cmp(&b.version));

    let repeatables: Vec<&ResolvedMigration> = resolved
        .iter()
        .filter(|m| m.is_repeatable())
        .filter(|m| {
            view.latest_repeatable
                .get(m.description.as_str())
                .is_none_or(|row| !row.success || row.checksum != m.checksum)
        })
        .collect();

    match options.repeatable_order {
        RepeatableOrder::Last => versioned.into_iter().chain(repeatables).collect(),
        RepeatableOrder::First => repeatables.into_iter().chain(versioned).collect(),
    }
}

/// Returns the highest version with a successful row, baseline included.
#[must_use]
pub fn schema_version(applied: &[AppliedMigration]) -> Option<MigrationVersion> {
    HistoryView::new(applied).highest.cloned()
}

/// Returns the version of the most recent baseline marker, if any.
#[must_use]
pub fn baseline_version(applied: &[AppliedMigration]) -> Option<MigrationVersion> {
    HistoryView::new(applied).baseline.cloned()
}
