//! Migration status reporting.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::history::AppliedMigration;
use crate::reconcile::{baseline_version, schema_version};
use crate::resolver::{MigrationKind, MigrationType, ResolvedMigration};
use crate::version::{MigrationVersion, display_version};

/// State of one migration as shown by `info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MigrationState {
    /// Resolved and waiting to be applied.
    Pending,
    /// Applied successfully.
    Success,
    /// The last attempt failed.
    Failed,
    /// The baseline marker.
    Baseline,
    /// Resolved at or below the baseline; never applied.
    BelowBaseline,
    /// Resolved below the highest applied version and not applied.
    Ignored,
    /// Applied, but no longer resolved.
    Missing,
    /// A repeatable run superseded by a later run or a changed script.
    Outdated,
    /// Applied above every resolved version.
    Future,
    /// Resolved above the configured target.
    AboveTarget,
}

impl MigrationState {
    /// Returns the display name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Success => "Success",
            Self::Failed => "Failed",
            Self::Baseline => "Baseline",
            Self::BelowBaseline => "Below Baseline",
            Self::Ignored => "Ignored",
            Self::Missing => "Missing",
            Self::Outdated => "Outdated",
            Self::Future => "Future",
            Self::AboveTarget => "Above Target",
        }
    }
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the `info` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationInfo {
    /// Versioned or repeatable.
    pub category: MigrationKind,
    /// Version, or `None` for repeatables.
    pub version: Option<MigrationVersion>,
    /// Description.
    pub description: String,
    /// Kind of migration.
    pub migration_type: MigrationType,
    /// Script identity.
    pub script: String,
    /// History rank, if applied.
    pub installed_rank: Option<i64>,
    /// When it was applied.
    pub installed_on: Option<DateTime<Utc>>,
    /// The state.
    pub state: MigrationState,
}

impl MigrationInfo {
    fn from_applied(row: &AppliedMigration, state: MigrationState) -> Self {
        Self {
            category: kind_of(row.version.as_ref()),
            version: row.version.clone(),
            description: row.description.clone(),
            migration_type: row.migration_type,
            script: row.script.clone(),
            installed_rank: Some(row.installed_rank),
            installed_on: Some(row.installed_on),
            state,
        }
    }

    fn from_resolved(migration: &ResolvedMigration, state: MigrationState) -> Self {
        Self {
            category: migration.kind,
            version: migration.version.clone(),
            description: migration.description.clone(),
            migration_type: migration.migration_type,
            script: migration.script.clone(),
            installed_rank: None,
            installed_on: None,
            state,
        }
    }
}

const fn kind_of(version: Option<&MigrationVersion>) -> MigrationKind {
    if version.is_some() {
        MigrationKind::Versioned
    } else {
        MigrationKind::Repeatable
    }
}

/// Merges resolved migrations and history into `info` rows.
///
/// History rows come first in rank order, followed by unapplied resolved
/// migrations in execution order.
#[must_use]
pub fn collect(
    resolved: &[ResolvedMigration],
    applied: &[AppliedMigration],
    target: Option<&MigrationVersion>,
    out_of_order: bool,
) -> Vec<MigrationInfo> {
    let by_version: HashMap<&MigrationVersion, &ResolvedMigration> = resolved
        .iter()
        .filter_map(|m| m.version.as_ref().map(|v| (v, m)))
        .collect();
    let by_description: HashMap<&str, &ResolvedMigration> = resolved
        .iter()
        .filter(|m| m.is_repeatable())
        .map(|m| (m.description.as_str(), m))
        .collect();
    let mut latest_repeatable: HashMap<&str, &AppliedMigration> = HashMap::new();
    for row in applied.iter().filter(|r| r.version.is_none()) {
        latest_repeatable.insert(row.description.as_str(), row);
    }
    let max_resolved = by_version.keys().max().copied();
    let highest = schema_version(applied);
    let baseline = baseline_version(applied);

    let mut infos = Vec::with_capacity(resolved.len() + applied.len());

    for row in applied {
        let state = match &row.version {
            Some(_) if row.is_baseline() => MigrationState::Baseline,
            _ if !row.success => MigrationState::Failed,
            Some(version) if by_version.contains_key(version) => MigrationState::Success,
            Some(version) if max_resolved.is_none_or(|max| version > max) => {
                MigrationState::Future
            }
            Some(_) => MigrationState::Missing,
            None => {
                let is_latest = latest_repeatable.get(row.description.as_str()) == Some(&row);
                match by_description.get(row.description.as_str()) {
                    _ if !is_latest => MigrationState::Outdated,
                    Some(m) if m.checksum != row.checksum => MigrationState::Outdated,
                    Some(_) => MigrationState::Success,
                    None => MigrationState::Missing,
                }
            }
        };
        infos.push(MigrationInfo::from_applied(row, state));
    }

    for migration in resolved {
        let state = match &migration.version {
            Some(version) => {
                // A baseline marker stands in for the script at its version.
                let recorded = applied.iter().any(|r| r.version.as_ref() == Some(version));
                if recorded {
                    continue;
                }
                if baseline.as_ref().is_some_and(|b| version <= b) {
                    MigrationState::BelowBaseline
                } else if target.is_some_and(|t| version > t) {
                    MigrationState::AboveTarget
                } else if !out_of_order && highest.as_ref().is_some_and(|h| version < h) {
                    MigrationState::Ignored
                } else {
                    MigrationState::Pending
                }
            }
            None => match latest_repeatable.get(migration.description.as_str()) {
                Some(row) if row.success && row.checksum == migration.checksum => continue,
                _ => MigrationState::Pending,
            },
        };
        infos.push(MigrationInfo::from_resolved(migration, state));
    }

    infos
}

/// Renders `info` rows as an ASCII table.
#[must_use]
pub fn render_table(infos: &[MigrationInfo]) -> String {
    let rows: Vec<Vec<String>> = infos
        .iter()
        .map(|info| {
            vec![
                info.category.to_string(),
                display_version(info.version.as_ref()),
                info.description.clone(),
                info.migration_type.to_string(),
                info.installed_on
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
                info.state.to_string(),
            ]
        })
        .collect();
    AsciiTable {
        columns: &["Category", "Version", "Description", "Type", "Installed On", "State"],
        rows: &rows,
        empty_text: "No migrations found",
    }
    .render()
}

/// Renders `info` rows as pretty JSON.
pub fn render_json(infos: &[MigrationInfo]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(infos)
}

struct AsciiTable<'a> {
    columns: &'a [&'a str],
    rows: &'a [Vec<String>],
    empty_text: &'a str,
}

impl AsciiTable<'_> {
    fn render(&self) -> String {
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in self.rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.chars().count());
            }
        }

        let mut ruler = String::from("+");
        for width in &widths {
            ruler.push_str(&"-".repeat(width + 2));
            ruler.push('+');
        }
        ruler.push('\n');

        let mut out = ruler.clone();
        out.push_str(&line(self.columns.iter().copied(), &widths));
        out.push_str(&ruler);
        if self.rows.is_empty() {
            let inner = ruler.len() - 5;
            out.push_str(&format!("| {:<inner$} |\n", self.empty_text));
        } else {
            for row in self.rows {
                out.push_str(&line(row.iter().map(String::as_str), &widths));
            }
        }
        out.push_str(&ruler);
        out
    }
}

fn line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let mut out = String::from("|");
    for (cell, width) in cells.zip(widths.iter().copied()) {
        out.push_str(&format!(" {cell:<width$} |"));
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(text: &str) -> MigrationVersion {
        MigrationVersion::parse(text).unwrap()
    }

    fn resolved(version: Option<&str>, description: &str, checksum: i32) -> ResolvedMigration {
        ResolvedMigration {
            version: version.map(v),
            description: description.to_string(),
            checksum: Some(checksum),
            script: format!("{description}.sql"),
            kind: kind_of(version.map(v).as_ref()),
            migration_type: MigrationType::Sql,
            location: String::new(),
            statements: Vec::new(),
        }
    }

    fn row(rank: i64, m: &ResolvedMigration, success: bool) -> AppliedMigration {
        AppliedMigration {
            installed_rank: rank,
            version: m.version.clone(),
            description: m.description.clone(),
            migration_type: m.migration_type,
            script: m.script.clone(),
            checksum: m.checksum,
            installed_by: "tester".to_string(),
            installed_on: DateTime::<Utc>::UNIX_EPOCH,
            execution_time_ms: 1,
            success,
        }
    }

    fn states(infos: &[MigrationInfo]) -> Vec<(String, MigrationState)> {
        infos
            .iter()
            .map(|i| (i.description.clone(), i.state))
            .collect()
    }

    #[test]
    fn test_states() {
        let m1 = resolved(Some("1"), "one", 1);
        let m2 = resolved(Some("2"), "two", 2);
        let m3 = resolved(Some("3"), "three", 3);
        let m4 = resolved(Some("4"), "four", 4);
        let view = resolved(None, "view", 5);
        let gone = resolved(Some("1.5"), "gone", 6);
        let future = resolved(Some("9"), "future", 7);
        let mut old_view = row(5, &view, true);
        old_view.checksum = Some(-5);

        let set = vec![m1.clone(), m2, m3.clone(), m4, view];
        let applied = vec![
            row(1, &m1, true),
            row(2, &gone, true),
            row(3, &m3, true),
            row(4, &future, true),
            old_view,
        ];
        let target = v("3");
        let infos = collect(&set, &applied, Some(&target), false);

        assert_eq!(
            states(&infos),
            vec![
                ("one".to_string(), MigrationState::Success),
                ("gone".to_string(), MigrationState::Missing),
                ("three".to_string(), MigrationState::Success),
                ("future".to_string(), MigrationState::Future),
                ("view".to_string(), MigrationState::Outdated),
                ("two".to_string(), MigrationState::Ignored),
                ("four".to_string(), MigrationState::AboveTarget),
                ("view".to_string(), MigrationState::Pending),
            ]
        );
    }

    #[test]
    fn test_baseline_states() {
        let m1 = resolved(Some("1"), "one", 1);
        let m3 = resolved(Some("3"), "three", 3);
        let mut marker = row(1, &resolved(Some("2"), "<< Baseline >>", 0), true);
        marker.migration_type = MigrationType::Baseline;
        marker.checksum = None;

        let infos = collect(&[m1, m3], &[marker], None, false);
        assert_eq!(
            states(&infos),
            vec![
                ("<< Baseline >>".to_string(), MigrationState::Baseline),
                ("one".to_string(), MigrationState::BelowBaseline),
                ("three".to_string(), MigrationState::Pending),
            ]
        );
    }

    #[test]
    fn test_failed_row_not_duplicated_as_pending() {
        let m1 = resolved(Some("1"), "one", 1);
        let infos = collect(std::slice::from_ref(&m1), &[row(1, &m1, false)], None, false);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].state, MigrationState::Failed);
    }

    #[test]
    fn test_script_at_baseline_version_shown_once() {
        let m2 = resolved(Some("2"), "two", 2);
        let mut marker = row(1, &resolved(Some("2"), "<< Baseline >>", 0), true);
        marker.migration_type = MigrationType::Baseline;

        let infos = collect(std::slice::from_ref(&m2), &[marker], None, false);
        assert_eq!(
            states(&infos),
            vec![("<< Baseline >>".to_string(), MigrationState::Baseline)]
        );
    }

    #[test]
    fn test_render_table() {
        let m1 = resolved(Some("1"), "one", 1);
        let infos = collect(std::slice::from_ref(&m1), &[row(1, &m1, true)], None, false);
        let table = render_table(&infos);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], lines[2]);
        assert_eq!(lines[0], lines[4]);
        assert_eq!(
            lines[1],
            "| Category  | Version | Description | Type | Installed On        | State   |"
        );
        assert_eq!(
            lines[3],
            "| Versioned | 1       | one         | SQL  | 1970-01-01 00:00:00 | Success |"
        );
        assert!(lines.iter().all(|l| l.chars().count() == lines[0].chars().count()));
    }

    #[test]
    fn test_render_empty_table() {
        let table = render_table(&[]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[3].starts_with("| No migrations found"));
        assert_eq!(lines[3].len(), lines[0].len());
    }

    #[test]
    fn test_render_json() {
        let m1 = resolved(Some("1.2"), "one", 1);
        let infos = collect(std::slice::from_ref(&m1), &[], None, false);
        let json: serde_json::Value = serde_json::from_str(&render_json(&infos).unwrap()).unwrap();
        assert_eq!(json[0]["version"], "1.2");
        assert_eq!(json[0]["state"], "Pending");
        assert_eq!(json[0]["migration_type"], "SQL");
        assert!(json[0]["installed_on"].is_null());
    }
}
