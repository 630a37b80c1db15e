//! oxide-migrate CLI
//!
//! Command-line tool for managing database migrations.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use oxide_migrate::info::{render_json, render_table};
use oxide_migrate::prelude::*;

/// Versioned SQL schema migrations.
#[derive(Parser)]
#[command(name = "oxide-migrate")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Migration directory (repeatable, replaces the configured locations).
    #[arg(short, long = "location")]
    locations: Vec<PathBuf>,

    /// Schema history table.
    #[arg(long)]
    table: Option<String>,

    /// Do not apply versions above this one.
    #[arg(long)]
    target: Option<MigrationVersion>,

    /// Allow applying versions below the current schema version.
    #[arg(long)]
    out_of_order: bool,

    /// Placeholder value as `name=value` (repeatable).
    #[arg(short, long = "placeholder", value_parser = parse_placeholder)]
    placeholders: Vec<(String, String)>,

    /// Schema lock timeout in milliseconds.
    #[arg(long)]
    lock_timeout: Option<u64>,

    /// Break locks older than this many milliseconds.
    #[arg(long)]
    lock_lease: Option<u64>,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending migrations.
    Migrate,

    /// Show migration status.
    Info {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Check applied migrations against the scripts on disk.
    Validate,

    /// Mark an existing schema as migrated up to a version.
    Baseline {
        /// Version to record.
        #[arg(long)]
        baseline_version: Option<MigrationVersion>,

        /// Description to record.
        #[arg(long)]
        description: Option<String>,
    },

    /// Remove failed migrations and realign checksums.
    Repair,

    /// Drop every object in the schema.
    Clean,

    /// Remove a schema lock left behind by an interrupted run.
    Unlock,
}

fn parse_placeholder(text: &str) -> std::result::Result<(String, String), String> {
    text.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected name=value, got '{text}'"))
}

impl Cli {
    fn migrate_config(&self) -> anyhow::Result<MigrateConfig> {
        let mut config = match &self.config {
            Some(path) => MigrateConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => MigrateConfig::new(),
        };

        if !self.locations.is_empty() {
            config = config.with_locations(self.locations.iter().cloned());
        }
        if let Some(table) = &self.table {
            config = config.with_table(table.clone());
        }
        if let Some(target) = &self.target {
            config = config.with_target(target.clone());
        }
        if self.out_of_order {
            config = config.with_out_of_order(true);
        }
        for (name, value) in &self.placeholders {
            config = config.with_placeholder(name.clone(), value.clone());
        }
        if let Some(ms) = self.lock_timeout {
            config = config.with_lock_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.lock_lease {
            config = config.with_lock_lease(Some(Duration::from_millis(ms)));
        }

        if let Commands::Baseline {
            baseline_version,
            description,
        } = &self.command
        {
            if let Some(version) = baseline_version {
                config = config.with_baseline_version(version.clone());
            }
            if let Some(description) = description {
                config = config.with_baseline_description(description.clone());
            }
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = cli.migrate_config()?;

    // Connect to database
    let options = SqliteConnectOptions::from_str(&cli.database)
        .with_context(|| format!("invalid database URL '{}'", cli.database))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    let migrator = Migrator::new(pool, SqliteDialect::new(), config);

    // Ctrl-C interrupts the statement in flight.
    let cancel = migrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling current statement");
            cancel.cancel();
        }
    });

    match cli.command {
        Commands::Migrate => {
            let report = migrator.migrate().await?;
            for applied in &report.applied {
                println!(
                    " [X] {} {} ({} ms)",
                    applied.version.as_ref().map_or_else(String::new, ToString::to_string),
                    applied.description,
                    applied.execution_time_ms
                );
            }
            match &report.schema_version {
                Some(version) => info!(
                    "Applied {} migration(s), schema version {version}",
                    report.migrations_applied
                ),
                None => info!("Applied {} migration(s)", report.migrations_applied),
            }
        }

        Commands::Info { json } => {
            let infos = migrator.info().await?;
            if json {
                println!("{}", render_json(&infos)?);
            } else {
                print!("{}", render_table(&infos));
            }
        }

        Commands::Validate => match migrator.validate().await {
            Ok(()) => info!("Successfully validated migrations."),
            Err(MigrateError::Validation(issues)) => {
                for issue in &issues {
                    println!(" - {issue}");
                }
                bail!("validation failed with {} issue(s)", issues.len());
            }
            Err(e) => return Err(e.into()),
        },

        Commands::Baseline { .. } => {
            let version = migrator.baseline().await?;
            info!("Schema baselined at version {version}");
        }

        Commands::Repair => {
            let report = migrator.repair().await?;
            info!(
                "Removed {} failed migration(s), realigned {} migration(s)",
                report.failed_removed,
                report.realigned.len()
            );
            for issue in &report.remaining_issues {
                println!(" - {issue}");
            }
        }

        Commands::Clean => {
            let report = migrator.clean().await?;
            for object in &report.dropped {
                println!(" [-] {object}");
            }
            info!("Dropped {} object(s)", report.dropped.len());
        }

        Commands::Unlock => {
            if migrator.release_lock().await? {
                info!("Schema lock released");
            } else {
                info!("Schema was not locked");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_placeholder() {
        assert_eq!(
            parse_placeholder("schema = app=1").unwrap(),
            ("schema".to_string(), " app=1".to_string())
        );
        assert!(parse_placeholder("schema").is_err());
        assert!(parse_placeholder("=app").is_err());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "oxide-migrate",
            "--database",
            "sqlite::memory:",
            "-p",
            "schema=app",
            "--lock-lease",
            "5000",
            "unlock",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Unlock));

        let config = cli.migrate_config().unwrap();
        assert_eq!(config.placeholders["schema"], "app");
        assert_eq!(config.lock_lease(), Some(Duration::from_secs(5)));
    }
}
