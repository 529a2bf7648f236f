//! Append-only per-contract storage of the three aligned series.
//!
//! Every `insert_*` call is bulk insert-or-skip: a duplicate
//! (contract, timestamp) key is silently ignored, never overwritten.
//! First write wins. This is a documented contract, not an accident of
//! the insert statement - re-downloads must not corrupt already
//! validated data, and the congruence repair pass relies on it for
//! idempotence.

use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::sync::Arc;
use tracing::debug;

use super::db::Database;
use crate::models::{BarRecord, ContractKey, GreeksRecord, IvRecord, SeriesCounts};

pub struct MarketDataStore {
    conn: Arc<Mutex<Connection>>,
}

impl MarketDataStore {
    pub fn new(db: &Database) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Bulk insert-or-skip of trade bars. Returns rows actually inserted.
    pub fn insert_bars(&self, contract: ContractKey, records: &[BarRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO bars (contract_id, ts, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(contract_id, ts) DO NOTHING",
            )?;
            for bar in records {
                inserted += stmt.execute(params![
                    contract,
                    bar.ts,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            contract_id = contract,
            offered = records.len(),
            inserted = inserted,
            "bars inserted"
        );
        Ok(inserted)
    }

    /// Bulk insert-or-skip of Greeks snapshots. Returns rows actually inserted.
    pub fn insert_greeks(&self, contract: ContractKey, records: &[GreeksRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO greeks (contract_id, ts, delta, gamma, theta, vega, rho)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(contract_id, ts) DO NOTHING",
            )?;
            for g in records {
                inserted += stmt.execute(params![
                    contract, g.ts, g.delta, g.gamma, g.theta, g.vega, g.rho,
                ])?;
            }
        }
        tx.commit()?;

        debug!(
            contract_id = contract,
            offered = records.len(),
            inserted = inserted,
            "greeks inserted"
        );
        Ok(inserted)
    }

    /// Bulk insert-or-skip of IV observations. Returns rows actually inserted.
    pub fn insert_iv(&self, contract: ContractKey, records: &[IvRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO iv (contract_id, ts, implied_vol)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(contract_id, ts) DO NOTHING",
            )?;
            for rec in records {
                inserted += stmt.execute(params![contract, rec.ts, rec.implied_vol])?;
            }
        }
        tx.commit()?;

        debug!(
            contract_id = contract,
            offered = records.len(),
            inserted = inserted,
            "iv inserted"
        );
        Ok(inserted)
    }

    /// Row counts across the three series for one contract.
    pub fn counts(&self, contract: ContractKey) -> Result<SeriesCounts> {
        let conn = self.conn.lock();
        let count = |table: &str| -> Result<u64> {
            let sql = format!("SELECT COUNT(*) FROM {table} WHERE contract_id = ?1");
            let n: u64 = conn.query_row(&sql, params![contract], |row| row.get(0))?;
            Ok(n)
        };
        Ok(SeriesCounts {
            bars: count("bars")?,
            greeks: count("greeks")?,
            iv: count("iv")?,
        })
    }

    /// Ordered bar timestamps for one contract.
    pub fn bar_timestamps(&self, contract: ContractKey) -> Result<Vec<i64>> {
        self.timestamps("bars", contract)
    }

    /// Ordered Greeks timestamps for one contract.
    pub fn greeks_timestamps(&self, contract: ContractKey) -> Result<Vec<i64>> {
        self.timestamps("greeks", contract)
    }

    /// Ordered IV timestamps for one contract.
    pub fn iv_timestamps(&self, contract: ContractKey) -> Result<Vec<i64>> {
        self.timestamps("iv", contract)
    }

    /// Number of IV rows holding the NULL "not yet observed" placeholder.
    pub fn null_iv_count(&self, contract: ContractKey) -> Result<u64> {
        let conn = self.conn.lock();
        let n: u64 = conn.query_row(
            "SELECT COUNT(*) FROM iv WHERE contract_id = ?1 AND implied_vol IS NULL",
            params![contract],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    fn timestamps(&self, table: &str, contract: ContractKey) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT ts FROM {table} WHERE contract_id = ?1 ORDER BY ts");
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params![contract], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(rows)
    }
}
