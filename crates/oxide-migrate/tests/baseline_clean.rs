mod common;

use common::*;
use oxide_migrate::prelude::*;

fn four_versions() -> MigrationDir {
    let dir = MigrationDir::new();
    dir.write("V1__create_users.sql", "CREATE TABLE users (id INTEGER PRIMARY KEY);\n")
        .write("V2__create_posts.sql", "CREATE TABLE posts (id INTEGER PRIMARY KEY);\n")
        .write("V3__create_tags.sql", "CREATE TABLE tags (id INTEGER PRIMARY KEY);\n")
        .write(
            "V4__create_view.sql",
            "CREATE VIEW post_ids AS SELECT id FROM posts;\n\
             CREATE TRIGGER posts_guard AFTER INSERT ON posts BEGIN SELECT 1; END;\n",
        );
    dir
}

#[tokio::test]
async fn baseline_skips_lower_versions() {
    let pool = create_test_pool().await;
    let dir = four_versions();

    let config = dir.config().with_baseline_version(v("2"));
    let version = migrator(&pool, config).baseline().await.unwrap();
    assert_eq!(version, v("2"));

    // The baselined schema already holds what V2 created.
    sqlx::query("CREATE TABLE posts (id INTEGER PRIMARY KEY)")
        .execute(&pool)
        .await
        .unwrap();

    let report = migrator(&pool, dir.config()).migrate().await.unwrap();
    let versions: Vec<_> = report.applied.iter().map(|a| a.version.clone()).collect();
    assert_eq!(versions, vec![Some(v("3")), Some(v("4"))]);
    assert!(!table_exists(&pool, "users").await);

    let rows = migrator(&pool, dir.config()).applied().await.unwrap();
    assert_eq!(rows[0].migration_type, MigrationType::Baseline);
    assert_eq!(rows[0].description, "<< Baseline >>");
    assert_eq!(rows[0].checksum, None);
}

#[tokio::test]
async fn baseline_twice_is_idempotent() {
    let pool = create_test_pool().await;
    let dir = four_versions();

    let config = dir.config().with_baseline_version(v("2"));
    migrator(&pool, config.clone()).baseline().await.unwrap();
    migrator(&pool, config).baseline().await.unwrap();
    assert_eq!(count_rows(&pool, "oxide_schema_history").await, 1);
}

#[tokio::test]
async fn baseline_uses_configured_description() {
    let pool = create_test_pool().await;
    let dir = MigrationDir::new();

    let config = dir
        .config()
        .with_baseline_version(v("5"))
        .with_baseline_description("legacy schema");
    migrator(&pool, config).baseline().await.unwrap();

    let rows = migrator(&pool, dir.config()).applied().await.unwrap();
    assert_eq!(rows[0].version, Some(v("5")));
    assert_eq!(rows[0].description, "legacy schema");
}

#[tokio::test]
async fn baseline_after_migrations_is_refused() {
    let pool = create_test_pool().await;
    let dir = four_versions();
    migrator(&pool, dir.config()).migrate().await.unwrap();

    let err = migrator(&pool, dir.config()).baseline().await.unwrap_err();
    assert!(matches!(err, MigrateError::Baseline(_)));
}

#[tokio::test]
async fn clean_drops_everything() {
    let pool = create_test_pool().await;
    let dir = four_versions();
    migrator(&pool, dir.config()).migrate().await.unwrap();

    let report = migrator(&pool, dir.config()).clean().await.unwrap();
    assert!(report.dropped.contains(&"table users".to_string()));
    assert!(report.dropped.contains(&"view post_ids".to_string()));
    assert!(report.dropped.contains(&"trigger posts_guard".to_string()));
    assert!(!table_exists(&pool, "users").await);
    assert!(!table_exists(&pool, "oxide_schema_history").await);

    // A cleaned schema migrates from scratch.
    let report = migrator(&pool, dir.config()).migrate().await.unwrap();
    assert_eq!(report.migrations_applied, 4);
}

#[tokio::test]
async fn clean_handles_foreign_keys() {
    let pool = create_test_pool().await;
    let dir = MigrationDir::new();
    dir.write(
        "V1__create.sql",
        "CREATE TABLE authors (id INTEGER PRIMARY KEY);\n\
         CREATE TABLE books (id INTEGER PRIMARY KEY, author_id INTEGER REFERENCES authors (id));\n\
         INSERT INTO authors (id) VALUES (1);\n\
         INSERT INTO books (id, author_id) VALUES (1, 1);\n",
    );
    migrator(&pool, dir.config()).migrate().await.unwrap();

    migrator(&pool, dir.config()).clean().await.unwrap();
    assert!(!table_exists(&pool, "authors").await);
    assert!(!table_exists(&pool, "books").await);
}

#[tokio::test]
async fn clean_can_be_disabled() {
    let pool = create_test_pool().await;
    let dir = four_versions();
    migrator(&pool, dir.config()).migrate().await.unwrap();

    let config = dir.config().with_clean_disabled(true);
    let err = migrator(&pool, config).clean().await.unwrap_err();
    assert!(matches!(err, MigrateError::CleanDisabled));
    assert!(table_exists(&pool, "users").await);
}
