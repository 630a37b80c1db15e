//! SQLite dialect for migrations.
//!
//! SQLite runs DDL inside transactions, so every script whose statements
//! allow it is applied atomically. `installed_rank` is an `AUTOINCREMENT`
//! key: SQLite persists the highest rank ever handed out, so ranks stay
//! unique even after `repair` deletes the newest row.

use oxide_sql_script::ScriptRules;

use super::MigrationDialect;

/// SQLite migration dialect.
#[derive(Debug, Clone, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn script_rules(&self) -> ScriptRules {
        ScriptRules::sqlite()
    }

    fn supports_ddl_transactions(&self) -> bool {
        true
    }

    fn create_history_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
    installed_rank INTEGER PRIMARY KEY AUTOINCREMENT,
    version TEXT,
    description TEXT NOT NULL,
    type TEXT NOT NULL,
    script TEXT NOT NULL,
    checksum INTEGER,
    installed_by TEXT NOT NULL,
    installed_on TEXT NOT NULL,
    execution_time INTEGER NOT NULL,
    success INTEGER NOT NULL
)",
            self.quote_identifier(table)
        )
    }

    fn create_lock_table_sql(&self, table: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
    id INTEGER PRIMARY KEY,
    owner TEXT NOT NULL,
    acquired_on TEXT NOT NULL
)",
            self.quote_identifier(table)
        )
    }

    fn table_exists_sql(&self) -> &'static str {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?"
    }

    // Dropping a table takes its indexes and triggers with it, so only
    // free-standing triggers and views need to go before the tables.
    fn list_objects_sql(&self) -> &'static str {
        "SELECT type, name FROM sqlite_master \
         WHERE type IN ('trigger', 'view', 'table') AND name NOT LIKE 'sqlite_%' \
         ORDER BY CASE type WHEN 'trigger' THEN 0 WHEN 'view' THEN 1 ELSE 2 END, name"
    }

    fn disable_foreign_keys_sql(&self) -> Option<&'static str> {
        Some("PRAGMA foreign_keys = OFF")
    }

    fn enable_foreign_keys_sql(&self) -> Option<&'static str> {
        Some("PRAGMA foreign_keys = ON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    fn dialect() -> SqliteDialect {
        SqliteDialect::new()
    }

    #[test]
    fn test_history_table_sql() {
        let sql = dialect().create_history_table_sql("oxide_schema_history");
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"oxide_schema_history\""));
        assert!(sql.contains("installed_rank INTEGER PRIMARY KEY AUTOINCREMENT"));
        assert!(sql.contains("success INTEGER NOT NULL"));
    }

    #[test]
    fn test_script_rules_are_sqlite() {
        let rules = dialect().script_rules();
        assert_eq!(rules.name, "sqlite");
        assert!(dialect().supports_ddl_transactions());
    }

    #[tokio::test]
    async fn test_generated_sql_runs() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");
        let d = dialect();

        sqlx::query(&d.create_history_table_sql("history"))
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(&d.create_lock_table_sql("history_lock"))
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE VIEW v AS SELECT 1")
            .execute(&pool)
            .await
            .unwrap();

        let exists: Option<(String,)> = sqlx::query_as(d.table_exists_sql())
            .bind("history")
            .fetch_optional(&pool)
            .await
            .unwrap();
        assert!(exists.is_some());

        let objects: Vec<(String, String)> = sqlx::query_as(d.list_objects_sql())
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(
            objects,
            vec![
                ("view".to_string(), "v".to_string()),
                ("table".to_string(), "history".to_string()),
                ("table".to_string(), "history_lock".to_string()),
            ]
        );
    }
}
