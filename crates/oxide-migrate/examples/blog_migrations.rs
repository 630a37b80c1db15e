//! Example: Blog Application Migrations
//!
//! This example demonstrates how to use oxide-migrate to manage database
//! schema changes for a blog application with users, posts, and comments.
//!
//! Run with: cargo run --example blog_migrations -p oxide-migrate

use std::fs;

use oxide_migrate::info::render_table;
use oxide_migrate::prelude::*;

// =============================================================================
// Migration Scripts
// =============================================================================

const SCRIPTS: &[(&str, &str)] = &[
    (
        "V1__create_users.sql",
        "CREATE TABLE users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username VARCHAR(100) NOT NULL UNIQUE,
    email VARCHAR(255) NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT 1,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
",
    ),
    (
        "V2__create_posts.sql",
        "CREATE TABLE posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    author_id INTEGER NOT NULL REFERENCES users (id) ON DELETE CASCADE,
    title VARCHAR(200) NOT NULL,
    body TEXT NOT NULL, -- markdown; may contain ';'
    published BOOLEAN NOT NULL DEFAULT 0
);

CREATE INDEX idx_posts_author ON posts (author_id);
",
    ),
    (
        "V3__create_comments.sql",
        "CREATE TABLE comments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    post_id INTEGER NOT NULL REFERENCES posts (id) ON DELETE CASCADE,
    body TEXT NOT NULL
);

/* Keep a comment counter on posts; the trigger body has its own ';'. */
ALTER TABLE posts ADD COLUMN comment_count INTEGER NOT NULL DEFAULT 0;

CREATE TRIGGER comments_count AFTER INSERT ON comments
BEGIN
    UPDATE posts SET comment_count = comment_count + 1 WHERE id = NEW.post_id;
END;
",
    ),
    (
        "R__published_posts.sql",
        "DROP VIEW IF EXISTS ${schema_prefix}published_posts;
CREATE VIEW ${schema_prefix}published_posts AS
    SELECT p.id, p.title, u.username
    FROM posts p JOIN users u ON u.id = p.author_id
    WHERE p.published = 1;
",
    ),
];

// =============================================================================
// Code Migrations
// =============================================================================

/// Seeds the admin account from Rust code.
struct SeedAdmin;

impl CodeMigration for SeedAdmin {
    fn name(&self) -> &str {
        "V4__seed_admin"
    }

    fn sql(&self) -> String {
        "INSERT INTO users (username, email) VALUES ('admin', 'admin@example.com');".to_string()
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("{}", "=".repeat(70));
    println!(" OXIDE-MIGRATE: Blog Application Example");
    println!("{}", "=".repeat(70));
    println!();

    // Write the scripts to a scratch migrations directory
    let dir = tempfile::TempDir::new()?;
    for (name, sql) in SCRIPTS {
        fs::write(dir.path().join(name), sql)?;
    }

    // Create in-memory SQLite database
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await?;

    let config = MigrateConfig::new()
        .with_locations([dir.path()])
        .with_placeholder("schema_prefix", "");
    let migrator = Migrator::new(pool.clone(), SqliteDialect::new(), config).register(SeedAdmin);

    println!("[1] Migration status before migrating:");
    print!("{}", render_table(&migrator.info().await?));
    println!();

    println!("[2] Applying migrations...");
    let report = migrator.migrate().await?;
    for applied in &report.applied {
        println!(
            "    [X] {:<4} {} ({} ms)",
            applied.version.as_ref().map_or_else(String::new, ToString::to_string),
            applied.description,
            applied.execution_time_ms
        );
    }
    println!(
        "    Schema version: {}\n",
        report.schema_version.map_or_else(|| "<none>".to_string(), |v| v.to_string())
    );

    println!("[3] Migration status after migrating:");
    print!("{}", render_table(&migrator.info().await?));
    println!();

    println!("[4] Running again applies nothing:");
    let report = migrator.migrate().await?;
    println!("    {} migrations applied\n", report.migrations_applied);

    println!("[5] Validating history against the scripts...");
    migrator.validate().await?;
    println!("    OK\n");

    let (users,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&pool)
        .await?;
    println!("Users in database: {users}");

    Ok(())
}
