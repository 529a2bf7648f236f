//! Account-level ALM reporting.
//!
//! Raw broker events (trades, assignments, expirations, cash movements,
//! financing) fold into one strictly time-ordered ledger
//! ([`EventLedgerBuilder`]), which rolls up into one row per trading
//! day ([`DailySummaryAggregator`]) - the reconciliation target the
//! ledger must balance against exactly.

pub mod amount;
pub mod daily;
pub mod events;
pub mod ledger;


// Re-exports for convenience
pub use amount::{from_amount, to_amount, Amount, AMOUNT_SCALE, CENT};
pub use daily::{
    DailySummaryAggregator, DailySummaryConfig, DailySummaryRow, ReconciliationMismatch,
};
pub use events::{EventKind, RawAccountEvent};
pub use ledger::{EventLedgerBuilder, LedgerBuildConfig, LedgerBuildReport, LedgerEntry, NavLedger};
