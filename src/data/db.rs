//! SQLite-backed relational store shared by the market-data components.
//!
//! One connection per database, wrapped for shared ownership. The
//! (contract, timestamp) composite key on each series table is enforced
//! here, not in application code, so re-ingestion can never create
//! duplicates.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Storage configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Path to SQLite database file.
    pub path: String,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: "spydata.db".to_string(),
        }
    }
}

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
PRAGMA temp_store = MEMORY;

-- Contract identity. AUTOINCREMENT keeps keys monotonic so a purged
-- contract's key is never handed out again.
CREATE TABLE IF NOT EXISTS contracts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    strike_milli INTEGER NOT NULL,
    expiration TEXT NOT NULL,
    right TEXT NOT NULL CHECK (right IN ('C', 'P')),
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now')),
    UNIQUE(symbol, strike_milli, expiration, right)
);

CREATE INDEX IF NOT EXISTS idx_contracts_symbol_expiration
    ON contracts(symbol, expiration);

-- Trade bars. One row per (contract, timestamp).
CREATE TABLE IF NOT EXISTS bars (
    contract_id INTEGER NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
    ts INTEGER NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    close REAL NOT NULL,
    volume INTEGER NOT NULL,
    PRIMARY KEY (contract_id, ts)
) WITHOUT ROWID;

-- Greeks snapshots. Sensitivity columns are nullable so an aligned
-- placeholder row ("no observation at this bar") is representable.
CREATE TABLE IF NOT EXISTS greeks (
    contract_id INTEGER NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
    ts INTEGER NOT NULL,
    delta REAL,
    gamma REAL,
    theta REAL,
    vega REAL,
    rho REAL,
    PRIMARY KEY (contract_id, ts)
) WITHOUT ROWID;

-- Implied volatility. NULL implied_vol means "not yet observed".
CREATE TABLE IF NOT EXISTS iv (
    contract_id INTEGER NOT NULL REFERENCES contracts(id) ON DELETE CASCADE,
    ts INTEGER NOT NULL,
    implied_vol REAL,
    PRIMARY KEY (contract_id, ts)
) WITHOUT ROWID;
"#;

/// Shared handle to the options dataset database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database at the configured path.
    pub fn open(config: &DbConfig) -> Result<Self> {
        let path = Path::new(&config.path);

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = Connection::open_with_flags(&config.path, flags)
            .with_context(|| format!("Failed to open database: {}", config.path))?;

        conn.execute_batch(SCHEMA_SQL)?;

        info!(path = %config.path, "options dataset database opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Shared connection handle for components built on this database.
    pub(crate) fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }
}
