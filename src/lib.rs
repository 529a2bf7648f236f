//! SPY options dataset backend library.
//!
//! Exposes the market-data reconciliation subsystem and the ALM ledger
//! for use by the binary and tests.

pub mod alm;
pub mod data;
pub mod models;
