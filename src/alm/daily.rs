//! Daily rollup of the account ledger.
//!
//! One row per trading day in the account's reporting timezone. The
//! rollup is derived, never independently mutated: opening NAV chains
//! from the previous day's close, closing NAV is the last entry's NAV
//! for the date. `closing = opening + total_pnl + net_cash_flow` is the
//! reconciliation identity that validates the whole ledger
//! construction; a miss is escalated, never silently corrected.

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use super::amount::{from_amount, Amount, CENT};
use super::ledger::NavLedger;

/// Aggregation configuration.
#[derive(Debug, Clone)]
pub struct DailySummaryConfig {
    /// Reporting timezone as a fixed offset from UTC.
    pub reporting_offset: FixedOffset,
}

impl Default for DailySummaryConfig {
    fn default() -> Self {
        Self {
            reporting_offset: FixedOffset::west_opt(5 * 3_600).expect("valid offset"),
        }
    }
}

/// One trading day of the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySummaryRow {
    pub date: NaiveDate,
    pub opening_nav: Amount,
    pub closing_nav: Amount,
    pub total_pnl: Amount,
    pub net_cash_flow: Amount,
}

/// The daily reconciliation identity failed for some date. Indicates an
/// upstream data or ledger-construction bug; requires investigation.
#[derive(Debug, Clone)]
pub struct ReconciliationMismatch {
    pub date: NaiveDate,
    pub opening_nav: Amount,
    pub closing_nav: Amount,
    pub total_pnl: Amount,
    pub net_cash_flow: Amount,
    pub difference: Amount,
}

impl std::fmt::Display for ReconciliationMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "reconciliation mismatch on {}: closing {} != opening {} + pnl {} + cash flow {} (off by {})",
            self.date,
            from_amount(self.closing_nav),
            from_amount(self.opening_nav),
            from_amount(self.total_pnl),
            from_amount(self.net_cash_flow),
            from_amount(self.difference),
        )
    }
}

impl std::error::Error for ReconciliationMismatch {}

pub struct DailySummaryAggregator {
    config: DailySummaryConfig,
}

impl DailySummaryAggregator {
    pub fn new(config: DailySummaryConfig) -> Self {
        Self { config }
    }

    /// Fold the ledger into one row per calendar date, in order.
    pub fn aggregate(&self, ledger: &NavLedger) -> Vec<DailySummaryRow> {
        let mut rows: Vec<DailySummaryRow> = Vec::new();

        for entry in ledger.entries() {
            let date = entry
                .timestamp
                .with_timezone(&self.config.reporting_offset)
                .date_naive();

            match rows.last_mut() {
                Some(row) if row.date == date => {
                    row.closing_nav = entry.nav_after_event;
                    row.total_pnl += entry.realized_pnl_impact;
                    row.net_cash_flow += entry.cash_impact;
                }
                _ => {
                    let opening = rows
                        .last()
                        .map_or(ledger.starting_nav(), |row| row.closing_nav);
                    rows.push(DailySummaryRow {
                        date,
                        opening_nav: opening,
                        closing_nav: entry.nav_after_event,
                        total_pnl: entry.realized_pnl_impact,
                        net_cash_flow: entry.cash_impact,
                    });
                }
            }
        }

        rows
    }

    /// Check `closing = opening + total_pnl + net_cash_flow` for every
    /// row, to the cent.
    pub fn validate(&self, rows: &[DailySummaryRow]) -> Result<(), ReconciliationMismatch> {
        for row in rows {
            let expected = row.opening_nav + row.total_pnl + row.net_cash_flow;
            let difference = row.closing_nav - expected;
            if difference.abs() > CENT {
                return Err(ReconciliationMismatch {
                    date: row.date,
                    opening_nav: row.opening_nav,
                    closing_nav: row.closing_nav,
                    total_pnl: row.total_pnl,
                    net_cash_flow: row.net_cash_flow,
                    difference,
                });
            }
        }
        Ok(())
    }
}
