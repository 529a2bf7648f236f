//! Congruence enforcement across the bar / Greeks / IV triple.
//!
//! The three series are fetched independently from the upstream feed, so
//! they drift: Greeks rows with no matching trade bar (theoretical
//! values computed off-session), missing IV where a bar exists, a
//! spurious end-of-day Greeks snapshot the feed emits at the session
//! cutoff, and - on 0DTE datasets - rows whose session date does not
//! match the contract's expiration at all. The enforcer repairs each
//! contract into one canonical state, in one transaction per contract.
//!
//! # Invariants
//!
//! 1. **Bars are authoritative**: a bar is the record that a trade
//!    happened and a repair pass never deletes one (the end-of-day
//!    artifact and 0DTE contamination rules are the only exceptions,
//!    both of which mark the row as not-a-real-observation).
//! 2. **Missing IV is "not yet observed"**: repaired by inserting a NULL
//!    placeholder row, never by deleting the bar.
//! 3. **Idempotence**: a second pass over a repaired contract reports
//!    zero changes.
//! 4. **Strict postcondition**: after a strict pass the (contract, ts)
//!    key sets of all three series are identical.
//!
//! # Modes
//!
//! - `Strict`: orphaned Greeks/IV keys (absent from bars) are deleted.
//! - `Complete`: orphans survive; only gaps are filled and artifacts
//!   removed.

use anyhow::{Context, Result};
use chrono::{NaiveTime, Timelike};
use parking_lot::Mutex;
use rusqlite::{params, Connection, Transaction};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::db::Database;
use crate::models::Contract;

const SECS_PER_DAY: i64 = 86_400;

/// Target state of a repair pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairMode {
    /// Only keys present in bars survive in Greeks/IV; gaps filled.
    Strict,
    /// Gaps filled, artifacts removed, orphans kept.
    Complete,
}

/// Repair configuration.
#[derive(Debug, Clone)]
pub struct CongruenceConfig {
    /// Same-day-expiring dataset: rows whose session date differs from
    /// the contract's expiration date are contamination and removed.
    pub zero_dte: bool,
    /// Fixed offset from UTC of the exchange session, in hours.
    pub session_utc_offset_hours: i32,
    /// Session-local time-of-day of the spurious end-of-day feed
    /// snapshot. Rows at this time-of-day are always removed.
    pub eod_artifact_time: NaiveTime,
}

impl Default for CongruenceConfig {
    fn default() -> Self {
        Self {
            zero_dte: true,
            session_utc_offset_hours: -5,
            eod_artifact_time: NaiveTime::from_hms_opt(16, 0, 0).expect("valid time"),
        }
    }
}

/// Per-contract repair outcome, by category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairStats {
    pub contaminated_bars: u64,
    pub contaminated_greeks: u64,
    pub contaminated_iv: u64,
    pub artifact_bars: u64,
    pub artifact_greeks: u64,
    pub artifact_iv: u64,
    pub orphan_greeks: u64,
    pub orphan_iv: u64,
    pub greeks_placeholders: u64,
    pub iv_placeholders: u64,
}

impl RepairStats {
    /// True when the pass deleted or inserted anything.
    pub fn changed(&self) -> bool {
        self.rows_removed() > 0 || self.rows_inserted() > 0
    }

    pub fn rows_removed(&self) -> u64 {
        self.contaminated_bars
            + self.contaminated_greeks
            + self.contaminated_iv
            + self.artifact_bars
            + self.artifact_greeks
            + self.artifact_iv
            + self.orphan_greeks
            + self.orphan_iv
    }

    pub fn rows_inserted(&self) -> u64 {
        self.greeks_placeholders + self.iv_placeholders
    }

    fn absorb(&mut self, other: &RepairStats) {
        self.contaminated_bars += other.contaminated_bars;
        self.contaminated_greeks += other.contaminated_greeks;
        self.contaminated_iv += other.contaminated_iv;
        self.artifact_bars += other.artifact_bars;
        self.artifact_greeks += other.artifact_greeks;
        self.artifact_iv += other.artifact_iv;
        self.orphan_greeks += other.orphan_greeks;
        self.orphan_iv += other.orphan_iv;
        self.greeks_placeholders += other.greeks_placeholders;
        self.iv_placeholders += other.iv_placeholders;
    }
}

/// A contract whose repair transaction could not complete. The
/// transaction was rolled back; the contract's stored state is whatever
/// it was before the pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairFailure {
    pub contract_id: i64,
    pub contract: String,
    pub error: String,
}

/// Outcome of a batch repair over many contracts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchRepairReport {
    pub contracts_seen: u64,
    pub contracts_changed: u64,
    pub failures: Vec<RepairFailure>,
    pub totals: RepairStats,
}

impl BatchRepairReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct CongruenceEnforcer {
    conn: Arc<Mutex<Connection>>,
    config: CongruenceConfig,
}

impl CongruenceEnforcer {
    pub fn new(db: &Database, config: CongruenceConfig) -> Self {
        Self {
            conn: db.connection(),
            config,
        }
    }

    /// Repair a single contract in one transaction.
    ///
    /// On error the transaction rolls back and the contract keeps its
    /// pre-pass state.
    pub fn repair_contract(&self, contract: &Contract, mode: RepairMode) -> Result<RepairStats> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        let stats = self
            .repair_in_tx(&tx, contract, mode)
            .with_context(|| format!("repair failed for {}", contract.display()))?;
        tx.commit()?;

        if stats.changed() {
            debug!(
                contract_id = contract.id,
                contract = %contract.display(),
                removed = stats.rows_removed(),
                inserted = stats.rows_inserted(),
                "contract repaired"
            );
        }
        Ok(stats)
    }

    /// Repair every contract, isolating failures: a contract whose
    /// transaction fails is rolled back, recorded, and the batch moves
    /// on. After a strict pass each repaired contract is re-checked for
    /// the count postcondition; a miss is recorded as a failure.
    pub fn repair_all(&self, contracts: &[Contract], mode: RepairMode) -> BatchRepairReport {
        let mut report = BatchRepairReport::default();

        for contract in contracts {
            report.contracts_seen += 1;
            match self.repair_contract(contract, mode) {
                Ok(stats) => {
                    if mode == RepairMode::Strict {
                        match self.is_congruent(contract.id) {
                            Ok(true) => {}
                            Ok(false) => {
                                warn!(
                                    contract = %contract.display(),
                                    "strict repair left unequal series counts"
                                );
                                report.failures.push(RepairFailure {
                                    contract_id: contract.id,
                                    contract: contract.display(),
                                    error: "post-repair series counts unequal".to_string(),
                                });
                                continue;
                            }
                            Err(e) => {
                                report.failures.push(RepairFailure {
                                    contract_id: contract.id,
                                    contract: contract.display(),
                                    error: e.to_string(),
                                });
                                continue;
                            }
                        }
                    }
                    if stats.changed() {
                        report.contracts_changed += 1;
                    }
                    report.totals.absorb(&stats);
                }
                Err(e) => {
                    warn!(
                        contract = %contract.display(),
                        error = %e,
                        "contract repair failed, skipping"
                    );
                    report.failures.push(RepairFailure {
                        contract_id: contract.id,
                        contract: contract.display(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            contracts = report.contracts_seen,
            changed = report.contracts_changed,
            failed = report.failures.len(),
            removed = report.totals.rows_removed(),
            inserted = report.totals.rows_inserted(),
            "congruence repair batch finished"
        );
        report
    }

    /// True when the three series carry identical row counts.
    pub fn is_congruent(&self, contract_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count = |table: &str| -> Result<u64> {
            let sql = format!("SELECT COUNT(*) FROM {table} WHERE contract_id = ?1");
            let n: u64 = conn.query_row(&sql, params![contract_id], |row| row.get(0))?;
            Ok(n)
        };
        let bars = count("bars")?;
        Ok(bars == count("greeks")? && bars == count("iv")?)
    }

    fn repair_in_tx(
        &self,
        tx: &Transaction<'_>,
        contract: &Contract,
        mode: RepairMode,
    ) -> Result<RepairStats> {
        let mut stats = RepairStats::default();
        let cid = contract.id;
        let off = i64::from(self.config.session_utc_offset_hours) * 3_600;
        let cutoff = i64::from(self.config.eod_artifact_time.num_seconds_from_midnight());

        // 0DTE contamination: the session-local date of every row must
        // equal the contract's expiration date.
        if self.config.zero_dte {
            let day_start = contract
                .expiration
                .and_time(NaiveTime::MIN)
                .and_utc()
                .timestamp();
            let day_end = day_start + SECS_PER_DAY;

            let purge = |table: &str| -> Result<u64> {
                let sql = format!(
                    "DELETE FROM {table}
                     WHERE contract_id = ?1 AND (ts + ?2 < ?3 OR ts + ?2 >= ?4)"
                );
                Ok(tx.execute(&sql, params![cid, off, day_start, day_end])? as u64)
            };
            stats.contaminated_bars = purge("bars")?;
            stats.contaminated_greeks = purge("greeks")?;
            stats.contaminated_iv = purge("iv")?;
        }

        // End-of-day artifact: the upstream feed emits a spurious extra
        // snapshot at the daily cutoff. Removed from every series
        // regardless of alignment.
        {
            let purge = |table: &str| -> Result<u64> {
                let sql = format!(
                    "DELETE FROM {table}
                     WHERE contract_id = ?1 AND ((ts + ?2) % ?3) = ?4"
                );
                Ok(tx.execute(&sql, params![cid, off, SECS_PER_DAY, cutoff])? as u64)
            };
            stats.artifact_bars = purge("bars")?;
            stats.artifact_greeks = purge("greeks")?;
            stats.artifact_iv = purge("iv")?;
        }

        // Orphaned Greeks/IV: keys with no matching trade bar are
        // theoretical/off-session computations. Strict mode only.
        if mode == RepairMode::Strict {
            let purge = |table: &str| -> Result<u64> {
                let sql = format!(
                    "DELETE FROM {table}
                     WHERE contract_id = ?1
                       AND ts NOT IN (SELECT ts FROM bars WHERE contract_id = ?1)"
                );
                Ok(tx.execute(&sql, params![cid])? as u64)
            };
            stats.orphan_greeks = purge("greeks")?;
            stats.orphan_iv = purge("iv")?;
        }

        // Gap fill: every bar timestamp gets an IV row (NULL = not yet
        // observed) and a Greeks row (NULL sensitivities). Bars are
        // never deleted to reach alignment.
        stats.iv_placeholders = tx.execute(
            "INSERT OR IGNORE INTO iv (contract_id, ts)
             SELECT contract_id, ts FROM bars WHERE contract_id = ?1",
            params![cid],
        )? as u64;
        stats.greeks_placeholders = tx.execute(
            "INSERT OR IGNORE INTO greeks (contract_id, ts)
             SELECT contract_id, ts FROM bars WHERE contract_id = ?1",
            params![cid],
        )? as u64;

        Ok(stats)
    }
}
