//! Raw account events as delivered by the broker statement ingester.
//!
//! The ingester parses the wire format; this module only sees flat
//! records carrying a timestamp, a string kind tag, a description and
//! the numeric fields each kind consumes. Unknown tags are legal input:
//! the ledger builder turns them into zero-impact entries rather than
//! aborting the build.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw event from the broker statement.
///
/// Field conventions (signed, in the instrument's trading currency):
/// - `proceeds`: trade proceeds, negative for buys;
/// - `cost_basis`: basis being settled by a trade / assignment /
///   expiration (negative for short positions);
/// - `commission`: always a cost, stored positive;
/// - `strike`, `quantity`: assignment terms, `quantity` signed by the
///   direction stock enters or leaves the book;
/// - `amount`: cash amount for deposits/withdrawals (signed) and
///   financing charges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAccountEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub proceeds: f64,
    #[serde(default)]
    pub cost_basis: f64,
    #[serde(default)]
    pub commission: f64,
    #[serde(default)]
    pub strike: f64,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub amount: f64,
}

/// Recognized event families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Trade,
    Assignment,
    Expiration,
    CashTransfer,
    FinancingCharge,
    Other,
}

impl EventKind {
    /// Map a raw kind tag to an event family. Tags are matched
    /// case-insensitively; `None` means the tag is unrecognized.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "TRADE" | "TRD" => Some(EventKind::Trade),
            "ASSIGNMENT" | "EXERCISE" => Some(EventKind::Assignment),
            "EXPIRATION" | "EXPIRY" => Some(EventKind::Expiration),
            "DEPOSIT" | "WITHDRAWAL" | "DEPOSIT/WITHDRAWAL" => Some(EventKind::CashTransfer),
            "FINANCING" | "INTEREST" | "FINANCING_CHARGE" => Some(EventKind::FinancingCharge),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Trade => "trade",
            EventKind::Assignment => "assignment",
            EventKind::Expiration => "expiration",
            EventKind::CashTransfer => "cash_transfer",
            EventKind::FinancingCharge => "financing_charge",
            EventKind::Other => "other",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
