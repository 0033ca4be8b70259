//! Store configuration.
//!
//! # Responsibility
//! - Describe where the database lives and how the engine and loaders run.
//! - Normalize and validate caller-supplied values before the engine opens.
//!
//! # Invariants
//! - A validated config has at least one loader worker.
//! - The authority only contains URI-safe characters.

use crate::model::schema::CONTENT_AUTHORITY;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_DB_FILE_NAME: &str = "shelter.db";
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
const MAX_LOADER_WORKERS: usize = 16;

static AUTHORITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("valid authority regex"));

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatabaseTarget {
    File { path: PathBuf },
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database: DatabaseTarget,
    pub busy_timeout_ms: u64,
    /// Background threads used by query loaders.
    pub loader_workers: usize,
    pub authority: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database: DatabaseTarget::File {
                path: PathBuf::from(DEFAULT_DB_FILE_NAME),
            },
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            loader_workers: 1,
            authority: CONTENT_AUTHORITY.to_string(),
        }
    }
}

impl StoreConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            database: DatabaseTarget::File { path: path.into() },
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self {
            database: DatabaseTarget::Memory,
            ..Self::default()
        }
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Returns a normalized copy, or a human-readable error.
    ///
    /// # Errors
    /// - Empty database path.
    /// - `loader_workers` outside `1..=16`.
    /// - Authority with characters outside `[A-Za-z0-9._-]`.
    pub fn validate(&self) -> Result<StoreConfig, String> {
        let database = match &self.database {
            DatabaseTarget::File { path } => {
                if path.as_os_str().is_empty() {
                    return Err("database path cannot be empty".to_string());
                }
                DatabaseTarget::File { path: path.clone() }
            }
            DatabaseTarget::Memory => DatabaseTarget::Memory,
        };

        if self.loader_workers == 0 || self.loader_workers > MAX_LOADER_WORKERS {
            return Err(format!(
                "loader_workers must be between 1 and {MAX_LOADER_WORKERS}, got {}",
                self.loader_workers
            ));
        }

        let authority = self.authority.trim();
        if !AUTHORITY_RE.is_match(authority) {
            return Err(format!("authority `{authority}` is not a valid uri authority"));
        }

        Ok(StoreConfig {
            database,
            busy_timeout_ms: self.busy_timeout_ms,
            loader_workers: self.loader_workers,
            authority: authority.to_string(),
        })
    }
}
