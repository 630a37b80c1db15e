//! Database dialect implementations.
//!
//! A dialect turns the engine's abstract needs (quote a name, create the
//! history table, enumerate and drop every object) into SQL text for one
//! database product. The engine only ever holds a `MigrationDialect`.

mod sqlite;

pub use sqlite::SqliteDialect;

use std::fmt;
use std::str::FromStr;

use oxide_sql_script::ScriptRules;

/// Kind of a schema object that `clean` can drop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SchemaObjectKind {
    /// A table.
    Table,
    /// A view.
    View,
    /// A trigger.
    Trigger,
    /// An index.
    Index,
}

impl SchemaObjectKind {
    /// Returns the SQL keyword for this kind.
    #[must_use]
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Table => "TABLE",
            Self::View => "VIEW",
            Self::Trigger => "TRIGGER",
            Self::Index => "INDEX",
        }
    }
}

impl FromStr for SchemaObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "view" => Ok(Self::View),
            "trigger" => Ok(Self::Trigger),
            "index" => Ok(Self::Index),
            other => Err(format!("unknown schema object kind '{other}'")),
        }
    }
}

/// A named schema object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaObject {
    /// The object kind.
    pub kind: SchemaObjectKind,
    /// The unquoted object name.
    pub name: String,
}

impl fmt::Display for SchemaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.keyword().to_ascii_lowercase(), self.name)
    }
}

/// Database-specific capabilities the migration engine relies on.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the scanning rules for splitting this product's scripts.
    fn script_rules(&self) -> ScriptRules;

    /// Returns whether DDL statements take part in transactions.
    fn supports_ddl_transactions(&self) -> bool;

    /// Generates DDL for the schema history table.
    fn create_history_table_sql(&self, table: &str) -> String;

    /// Generates DDL for the single-row lock table.
    fn create_lock_table_sql(&self, table: &str) -> String;

    /// Query with one bound parameter (the table name) that returns a row
    /// when that table exists.
    fn table_exists_sql(&self) -> &'static str;

    /// Query returning `(kind, name)` rows for every user object, in an
    /// order that is safe to drop in.
    fn list_objects_sql(&self) -> &'static str;

    /// Generates SQL that drops one object.
    fn drop_object_sql(&self, object: &SchemaObject) -> String {
        format!(
            "DROP {} IF EXISTS {}",
            object.kind.keyword(),
            self.quote_identifier(&object.name)
        )
    }

    /// Statement disabling referential integrity checks, if needed around
    /// a bulk drop.
    fn disable_foreign_keys_sql(&self) -> Option<&'static str> {
        None
    }

    /// Statement re-enabling referential integrity checks.
    fn enable_foreign_keys_sql(&self) -> Option<&'static str> {
        None
    }

    /// Quote an identifier (table name, column name, etc.).
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}
