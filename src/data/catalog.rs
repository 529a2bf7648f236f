//! Contract identity resolution.
//!
//! The catalog is the source of truth for "does this contract exist".
//! `resolve` is idempotent: the first sighting of a (symbol, strike,
//! expiration, right) tuple allocates a synthetic key, every later
//! sighting returns the same key. Strikes are keyed as integer
//! milli-dollars so identity never depends on float equality.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use super::db::Database;
use crate::models::{Contract, ContractKey, InvalidContractSpec, OptionRight};

/// Rows removed by a dataset reset, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeStats {
    pub contracts: u64,
    pub bars: u64,
    pub greeks: u64,
    pub iv: u64,
}

pub struct ContractCatalog {
    conn: Arc<Mutex<Connection>>,
}

impl ContractCatalog {
    pub fn new(db: &Database) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Get-or-create the key for a contract identity.
    ///
    /// Never fails on a well-formed tuple; malformed input (empty symbol,
    /// non-positive or non-finite strike) is rejected with
    /// [`InvalidContractSpec`] before touching storage.
    pub fn resolve(
        &self,
        symbol: &str,
        strike: f64,
        expiration: NaiveDate,
        right: OptionRight,
    ) -> Result<ContractKey> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(InvalidContractSpec {
                symbol: symbol.to_string(),
                strike,
                reason: "empty symbol".to_string(),
            }
            .into());
        }
        if !strike.is_finite() || strike <= 0.0 {
            return Err(InvalidContractSpec {
                symbol: symbol.to_string(),
                strike,
                reason: "strike must be a positive finite number".to_string(),
            }
            .into());
        }

        let strike_milli = to_strike_milli(strike);
        let expiration_str = expiration.to_string();

        let conn = self.conn.lock();

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM contracts
                 WHERE symbol = ?1 AND strike_milli = ?2 AND expiration = ?3 AND right = ?4",
                params![symbol, strike_milli, expiration_str, right.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(id) = existing {
            return Ok(id);
        }

        conn.execute(
            "INSERT INTO contracts (symbol, strike_milli, expiration, right)
             VALUES (?1, ?2, ?3, ?4)",
            params![symbol, strike_milli, expiration_str, right.as_str()],
        )
        .with_context(|| format!("Failed to create contract {} {}", symbol, strike))?;

        let id = conn.last_insert_rowid();
        debug!(
            contract_id = id,
            symbol = %symbol,
            strike = strike,
            expiration = %expiration,
            right = right.as_str(),
            "contract created"
        );
        Ok(id)
    }

    /// Look up a contract by key.
    pub fn get(&self, key: ContractKey) -> Result<Option<Contract>> {
        let conn = self.conn.lock();
        let contract = conn
            .query_row(
                "SELECT id, symbol, strike_milli, expiration, right
                 FROM contracts WHERE id = ?1",
                params![key],
                row_to_contract,
            )
            .optional()?;
        Ok(contract)
    }

    /// All contracts, ordered by key.
    pub fn contracts(&self) -> Result<Vec<Contract>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, symbol, strike_milli, expiration, right
             FROM contracts ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], row_to_contract)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All contracts for a symbol whose expiration falls in the inclusive range.
    pub fn contracts_for_symbol(
        &self,
        symbol: &str,
        expiration_from: NaiveDate,
        expiration_to: NaiveDate,
    ) -> Result<Vec<Contract>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, symbol, strike_milli, expiration, right
             FROM contracts
             WHERE symbol = ?1 AND expiration >= ?2 AND expiration <= ?3
             ORDER BY id",
        )?;
        let rows = stmt
            .query_map(
                params![symbol, expiration_from.to_string(), expiration_to.to_string()],
                row_to_contract,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn len(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let n: u64 = conn.query_row("SELECT COUNT(*) FROM contracts", [], |row| row.get(0))?;
        Ok(n)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Dataset reset: delete every contract for `symbol` whose expiration
    /// falls in the inclusive range, cascading into all three series.
    ///
    /// Runs in one transaction: either the contracts and every dependent
    /// record vanish, or none do.
    pub fn purge(
        &self,
        symbol: &str,
        expiration_from: NaiveDate,
        expiration_to: NaiveDate,
    ) -> Result<PurgeStats> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;

        let (from_str, to_str) = (expiration_from.to_string(), expiration_to.to_string());

        let count_dependent = |table: &str| -> Result<u64> {
            let sql = format!(
                "SELECT COUNT(*) FROM {table}
                 WHERE contract_id IN (
                     SELECT id FROM contracts
                     WHERE symbol = ?1 AND expiration >= ?2 AND expiration <= ?3
                 )"
            );
            let n: u64 = tx.query_row(&sql, params![symbol, from_str, to_str], |row| row.get(0))?;
            Ok(n)
        };

        let stats = PurgeStats {
            bars: count_dependent("bars")?,
            greeks: count_dependent("greeks")?,
            iv: count_dependent("iv")?,
            contracts: tx.execute(
                "DELETE FROM contracts
                 WHERE symbol = ?1 AND expiration >= ?2 AND expiration <= ?3",
                params![symbol, from_str, to_str],
            )? as u64,
        };

        tx.commit()?;

        info!(
            symbol = %symbol,
            from = %expiration_from,
            to = %expiration_to,
            contracts = stats.contracts,
            bars = stats.bars,
            greeks = stats.greeks,
            iv = stats.iv,
            "purged expiration range"
        );
        Ok(stats)
    }
}

fn row_to_contract(row: &rusqlite::Row<'_>) -> rusqlite::Result<Contract> {
    let strike_milli: i64 = row.get(2)?;
    let expiration_str: String = row.get(3)?;
    let right_code: String = row.get(4)?;
    Ok(Contract {
        id: row.get(0)?,
        symbol: row.get(1)?,
        strike: strike_milli as f64 / 1000.0,
        expiration: expiration_str.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                3,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?,
        right: OptionRight::from_code(&right_code).unwrap_or(OptionRight::Call),
    })
}

pub(crate) fn to_strike_milli(strike: f64) -> i64 {
    (strike * 1000.0).round() as i64
}
