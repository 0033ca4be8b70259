//! SQLite migration registry and executor.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply each pending migration step in its own transaction.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - The latest version equals `PETS_SCHEMA.version`.
//! - A failed step is rolled back together with its `user_version` bump, so the
//!   file always sits at a complete schema version.

use crate::db::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_init.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_pets_name_index.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Returns the schema version recorded in the database file.
pub fn current_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Applies all pending migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current = current_version(conn)?;
    let latest = latest_version();

    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }

    migrate(conn, current, latest)
}

/// Runs the steps in `(from, to]` in ascending order.
///
/// # Errors
/// - Returns `DbError::Migration` for the first failing step; earlier steps
///   stay committed and later steps are not attempted.
pub fn migrate(conn: &mut Connection, from: u32, to: u32) -> DbResult<()> {
    for migration in MIGRATIONS
        .iter()
        .filter(|migration| migration.version > from && migration.version <= to)
    {
        apply_step(conn, migration)?;
    }
    Ok(())
}

fn apply_step(conn: &mut Connection, migration: &Migration) -> DbResult<()> {
    let started_at = Instant::now();
    let tx = conn.transaction()?;

    let applied = tx.execute_batch(migration.sql).and_then(|()| {
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))
    });

    if let Err(err) = applied {
        error!(
            "event=db_migrate module=db status=error version={} duration_ms={} error={}",
            migration.version,
            started_at.elapsed().as_millis(),
            err
        );
        // Dropping `tx` rolls the step back.
        return Err(DbError::Migration {
            version: migration.version,
            source: err,
        });
    }

    tx.commit().map_err(|err| DbError::Migration {
        version: migration.version,
        source: err,
    })?;

    info!(
        "event=db_migrate module=db status=ok version={} duration_ms={}",
        migration.version,
        started_at.elapsed().as_millis()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{latest_version, MIGRATIONS};

    #[test]
    fn migration_versions_are_strictly_increasing() {
        let versions = MIGRATIONS.iter().map(|m| m.version).collect::<Vec<_>>();
        assert!(versions.windows(2).all(|pair| pair[0] < pair[1]));
        assert_eq!(versions.first(), Some(&1));
    }

    #[test]
    fn latest_version_matches_catalog() {
        assert_eq!(latest_version(), crate::model::schema::PETS_SCHEMA.version);
    }
}
