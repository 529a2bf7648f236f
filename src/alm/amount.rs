//! Fixed-point money for ledger accounting.
//!
//! NAV chaining (`nav[i] = nav[i-1] + cash[i] + pnl[i]`) and the daily
//! reconciliation identity must hold exactly, so ledger arithmetic runs
//! on integers rather than floats.

/// Fixed-point amount with 8 decimal places.
pub type Amount = i128;

/// Conversion factor: 1 currency unit = 100_000_000 units.
pub const AMOUNT_SCALE: i128 = 100_000_000;

/// One cent, the reconciliation tolerance.
pub const CENT: Amount = AMOUNT_SCALE / 100;

/// Convert f64 to fixed-point Amount.
#[inline]
pub fn to_amount(value: f64) -> Amount {
    (value * AMOUNT_SCALE as f64).round() as Amount
}

/// Convert fixed-point Amount to f64.
#[inline]
pub fn from_amount(amount: Amount) -> f64 {
    amount as f64 / AMOUNT_SCALE as f64
}
