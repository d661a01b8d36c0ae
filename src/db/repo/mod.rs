//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by domain:
//! - `accounts.rs` - Coin accounts and ledger entries
//! - `battles.rs` - Battles, teams, song snapshots and status transitions
//! - `streams.rs` - Stream events, applied-event markers and team counters
//! - `settlements.rs` - Settlement records
//! - `bot_tasks.rs` - Bot program tasks
//!
//! Functions taking a `&mut SqliteConnection` run inside a caller-owned
//! transaction so that several components can commit together. Every write
//! transaction opens with a write statement, which takes the SQLite write lock
//! up front and keeps concurrent writers queued behind `busy_timeout`.

mod accounts;
mod battles;
mod bot_tasks;
mod settlements;
mod streams;

pub use accounts::AppendError;
pub use streams::TeamCounters;

use crate::domain::TimeMs;
use sqlx::sqlite::{Sqlite, SqlitePool};
use sqlx::Transaction;

/// Repository for database operations.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Open a transaction spanning several repository calls.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }
}

fn opt_time(ms: Option<i64>) -> Option<TimeMs> {
    ms.map(TimeMs::new)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::migrations::init_db;
    use tempfile::TempDir;

    pub async fn setup_test_db() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir
            .path()
            .join("test.db")
            .to_string_lossy()
            .to_string();
        let pool = init_db(&db_path).await.expect("init_db failed");
        (Repository::new(pool), temp_dir)
    }
}
