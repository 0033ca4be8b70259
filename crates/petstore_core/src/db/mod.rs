//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure the single SQLite connection owned by the store.
//! - Apply schema migrations in deterministic order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Pet data must not be read or written before migrations succeed.
//! - Every variant of [`DbError`] is fatal for engine startup.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_db_with_timeout};

pub type DbResult<T> = Result<T, DbError>;

/// Storage initialization and transport failures.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// A migration step failed and was rolled back.
    Migration {
        version: u32,
        source: rusqlite::Error,
    },
    /// The parent directory of the database file could not be created.
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    InvalidConfig(String),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Migration { version, source } => {
                write!(f, "migration to schema version {version} failed: {source}")
            }
            Self::Io { path, source } => {
                write!(f, "cannot prepare database path `{}`: {source}", path.display())
            }
            Self::InvalidConfig(message) => write!(f, "invalid store config: {message}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Migration { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            Self::UnsupportedSchemaVersion { .. } | Self::InvalidConfig(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
