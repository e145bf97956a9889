//! Pooled `SQLite` access for the outcome feed.
//!
//! Every connection the pool hands out has already been switched to WAL
//! with foreign keys on, a busy timeout, and a bounded page cache, so the
//! repositories never deal with per-connection setup.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::errors::Result;

/// Pool of feed connections.
pub type ConnectionPool = Pool<SqliteConnectionManager>;

/// One checked-out feed connection.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool sizing and per-connection pragma knobs.
#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Connections the pool keeps.
    pub pool_size: u32,
    /// How long a statement waits on a locked database before erroring.
    pub busy_timeout_ms: u32,
    /// Page cache ceiling per connection, in KiB.
    pub cache_size_kib: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pool_size: 8,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
        }
    }
}

/// Applied to every connection the pool opens.
#[derive(Debug)]
struct FeedPragmas {
    busy_timeout_ms: u32,
    cache_size_kib: i64,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for FeedPragmas {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        // cache_size is negative so the unit is KiB, not pages.
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = {timeout};
             PRAGMA cache_size = -{cache};",
            timeout = self.busy_timeout_ms,
            cache = self.cache_size_kib,
        ))
    }
}

fn build_pool(
    manager: SqliteConnectionManager,
    max_size: u32,
    config: &ConnectionConfig,
) -> Result<ConnectionPool> {
    let pool = Pool::builder()
        .max_size(max_size)
        .connection_timeout(std::time::Duration::from_secs(5))
        .connection_customizer(Box::new(FeedPragmas {
            busy_timeout_ms: config.busy_timeout_ms,
            cache_size_kib: config.cache_size_kib,
        }))
        .build(manager)?;
    Ok(pool)
}

/// File-backed pool for the gateway binary.
pub fn new_file(path: &str, config: &ConnectionConfig) -> Result<ConnectionPool> {
    build_pool(SqliteConnectionManager::file(path), config.pool_size, config)
}

/// In-memory pool for tests. Pinned to a single connection because each
/// `:memory:` handle is its own database.
pub fn new_in_memory(config: &ConnectionConfig) -> Result<ConnectionPool> {
    build_pool(SqliteConnectionManager::memory(), 1, config)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
