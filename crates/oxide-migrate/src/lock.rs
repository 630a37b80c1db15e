//! Cross-process schema lock.
//!
//! The lock is a single row in a dedicated table. Inserting the row takes
//! the lock; a primary key conflict means another process holds it, and so
//! does a busy database, since the holder is usually mid-write. The holder
//! refreshes the row's timestamp as it makes progress, and a row older than
//! the configured lease is treated as abandoned and broken.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use sqlx::error::DatabaseError;
use sqlx::sqlite::SqliteConnection;
use tracing::{debug, warn};

use crate::dialect::MigrationDialect;
use crate::error::{MigrateError, Result};

static NEXT_OWNER: AtomicU64 = AtomicU64::new(0);

/// SQLite primary result codes for a database held by another connection.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Returns the lock table used alongside a history table.
#[must_use]
pub fn lock_table_name(history_table: &str) -> String {
    format!("{history_table}_lock")
}

/// How long to wait for the lock and how often to retry.
#[derive(Debug, Clone, Copy)]
pub struct LockSettings {
    /// Give up after this long.
    pub timeout: Duration,
    /// Delay between attempts.
    pub retry_interval: Duration,
    /// Break a lock not refreshed for this long.
    pub lease: Option<Duration>,
}

/// A held schema lock. Must be released with [`SchemaLock::release`].
#[derive(Debug)]
#[must_use = "the lock must be released"]
pub struct SchemaLock {
    table: String,
    quoted: String,
    owner: String,
}

impl SchemaLock {
    /// Acquires the lock stored in `table`, creating the table if needed.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::LockTimeout`] when the lock is still held by
    /// someone else after `settings.timeout`.
    pub async fn acquire(
        conn: &mut SqliteConnection,
        dialect: &dyn MigrationDialect,
        table: &str,
        settings: LockSettings,
    ) -> Result<Self> {
        let create = dialect.create_lock_table_sql(table);
        let quoted = dialect.quote_identifier(table);
        let owner = owner_id();
        let insert = format!("INSERT INTO {quoted} (id, owner, acquired_on) VALUES (1, ?, ?)");
        let started = Instant::now();
        let mut warned = false;

        loop {
            let attempt = try_insert(conn, &create, &insert, &owner).await;
            match attempt {
                Ok(()) => {
                    debug!(table, owner = %owner, "Schema lock acquired");
                    return Ok(Self {
                        table: table.to_string(),
                        quoted,
                        owner,
                    });
                }
                Err(sqlx::Error::Database(db)) if is_contention(db.as_ref()) => {
                    // Only a visible row can be inspected for expiry.
                    let lease = settings.lease.filter(|_| db.is_unique_violation());
                    if let Some(lease) = lease {
                        match break_stale(conn, table, &quoted, lease).await {
                            Ok(true) => continue,
                            Ok(false) => {}
                            Err(sqlx::Error::Database(db)) if is_contention(db.as_ref()) => {}
                            Err(e) => return Err(e.into()),
                        }
                    }
                    let waited = started.elapsed();
                    if waited >= settings.timeout {
                        return Err(MigrateError::LockTimeout {
                            table: table.to_string(),
                            waited,
                        });
                    }
                    if !warned {
                        warn!(table, "Schema is locked by another migration, waiting");
                        warned = true;
                    }
                    let remaining = settings.timeout.saturating_sub(waited);
                    tokio::time::sleep(settings.retry_interval.min(remaining)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Removes the lock row whoever holds it. Returns whether a row was
    /// removed.
    ///
    /// Only safe when the holder is known to be gone.
    pub async fn force_release(
        conn: &mut SqliteConnection,
        dialect: &dyn MigrationDialect,
        table: &str,
    ) -> Result<bool> {
        sqlx::query(&dialect.create_lock_table_sql(table))
            .execute(&mut *conn)
            .await?;
        let sql = format!(
            "DELETE FROM {} WHERE id = 1",
            dialect.quote_identifier(table)
        );
        let deleted = sqlx::query(&sql).execute(&mut *conn).await?;
        Ok(deleted.rows_affected() > 0)
    }

    /// Returns the owner id written into the lock row.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Renews the lease.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::LockLost`] when the row no longer belongs to
    /// this holder.
    pub async fn refresh(&self, conn: &mut SqliteConnection) -> Result<()> {
        let sql = format!(
            "UPDATE {} SET acquired_on = ? WHERE id = 1 AND owner = ?",
            self.quoted
        );
        let updated = sqlx::query(&sql)
            .bind(Utc::now().to_rfc3339())
            .bind(&self.owner)
            .execute(&mut *conn)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(MigrateError::LockLost {
                table: self.table.clone(),
            });
        }
        Ok(())
    }

    /// Releases the lock.
    pub async fn release(self, conn: &mut SqliteConnection) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = 1 AND owner = ?", self.quoted);
        sqlx::query(&sql).bind(&self.owner).execute(&mut *conn).await?;
        debug!(owner = %self.owner, "Schema lock released");
        Ok(())
    }
}

async fn try_insert(
    conn: &mut SqliteConnection,
    create: &str,
    insert: &str,
    owner: &str,
) -> std::result::Result<(), sqlx::Error> {
    sqlx::query(create).execute(&mut *conn).await?;
    sqlx::query(insert)
        .bind(owner)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// Whether an error means someone else holds the lock row or the database.
fn is_contention(db: &dyn DatabaseError) -> bool {
    db.is_unique_violation()
        || db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
}

/// Deletes the lock row if it has not been refreshed within `lease`.
async fn break_stale(
    conn: &mut SqliteConnection,
    table: &str,
    quoted: &str,
    lease: Duration,
) -> std::result::Result<bool, sqlx::Error> {
    let select = format!("SELECT owner, acquired_on FROM {quoted} WHERE id = 1");
    let row: Option<(String, String)> = sqlx::query_as(&select)
        .fetch_optional(&mut *conn)
        .await?;
    let Some((owner, acquired_on)) = row else {
        return Ok(false);
    };
    // Unreadable timestamps are never treated as expired.
    let Ok(acquired) = DateTime::parse_from_rfc3339(&acquired_on) else {
        return Ok(false);
    };
    let age = Utc::now()
        .signed_duration_since(acquired)
        .to_std()
        .unwrap_or_default();
    if age < lease {
        return Ok(false);
    }

    let delete = format!("DELETE FROM {quoted} WHERE id = 1 AND owner = ? AND acquired_on = ?");
    let deleted = sqlx::query(&delete)
        .bind(&owner)
        .bind(&acquired_on)
        .execute(&mut *conn)
        .await?;
    let broken = deleted.rows_affected() > 0;
    if broken {
        warn!(table, owner = %owner, acquired_on = %acquired_on, "Broke abandoned schema lock");
    }
    Ok(broken)
}

fn owner_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let seq = NEXT_OWNER.fetch_add(1, Ordering::Relaxed);
    format!("{}-{nanos}-{seq}", std::process::id())
}
