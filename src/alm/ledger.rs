//! Chronological account ledger.
//!
//! The builder folds heterogeneous raw broker events into one strictly
//! time-ordered ledger where every entry carries a cash impact, a
//! realized-P&L impact and the NAV after the event.
//!
//! # Invariants
//!
//! 1. **Append-only**: entries are immutable once appended; corrections
//!    are modeled as new offsetting events upstream, never in-place
//!    edits.
//! 2. **Monotonic**: entries are ordered by timestamp, ties broken by
//!    input order (stable sort).
//! 3. **NAV chaining**: `nav_after_event[i] = nav_after_event[i-1] +
//!    cash_impact[i] + realized_pnl_impact[i]`, seeded by the starting
//!    NAV supplied at build time.
//! 4. **No abort on bad input**: an unrecognized event kind becomes a
//!    zero-impact entry and a warning, never a failed build.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::amount::{from_amount, to_amount, Amount};
use super::events::{EventKind, RawAccountEvent};
use chrono::{DateTime, Utc};

/// Shares delivered per option contract on assignment/exercise.
const CONTRACT_MULTIPLIER: f64 = 100.0;

/// Ledger build parameters.
#[derive(Debug, Clone)]
pub struct LedgerBuildConfig {
    /// Account NAV before the first event. External input, not derived.
    pub starting_nav: f64,
    /// Single fixed conversion rate from the instruments' trading
    /// currency into the account's base currency, applied to every
    /// impact. Keeps the ledger internally consistent even when a
    /// multi-currency broker statement would not match to the cent.
    pub fx_rate: f64,
}

impl Default for LedgerBuildConfig {
    fn default() -> Self {
        Self {
            starting_nav: 0.0,
            fx_rate: 1.0,
        }
    }
}

/// One immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub description: String,
    pub cash_impact: Amount,
    pub realized_pnl_impact: Amount,
    pub nav_after_event: Amount,
}

/// Build outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerBuildReport {
    pub entries: u64,
    pub unrecognized: u64,
}

/// The built ledger: starting NAV plus an ordered, read-only entry
/// sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavLedger {
    starting_nav: Amount,
    entries: Vec<LedgerEntry>,
    report: LedgerBuildReport,
}

impl NavLedger {
    pub fn starting_nav(&self) -> Amount {
        self.starting_nav
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// NAV after the last entry (starting NAV for an empty ledger).
    pub fn final_nav(&self) -> Amount {
        self.entries
            .last()
            .map_or(self.starting_nav, |e| e.nav_after_event)
    }

    pub fn report(&self) -> LedgerBuildReport {
        self.report
    }
}

/// Folds raw events into a [`NavLedger`].
pub struct EventLedgerBuilder {
    config: LedgerBuildConfig,
}

impl EventLedgerBuilder {
    pub fn new(config: LedgerBuildConfig) -> Self {
        Self { config }
    }

    /// Build the ledger for one account.
    ///
    /// Events are processed in ascending timestamp order; equal
    /// timestamps keep their input order. NAV accumulation is
    /// sequential by definition, so a single account's build is one
    /// ordered pass.
    pub fn build(&self, events: &[RawAccountEvent]) -> NavLedger {
        let mut ordered: Vec<&RawAccountEvent> = events.iter().collect();
        ordered.sort_by_key(|e| e.timestamp);

        let starting_nav = to_amount(self.config.starting_nav);
        let mut current_nav = starting_nav;
        let mut entries = Vec::with_capacity(ordered.len());
        let mut report = LedgerBuildReport::default();

        for event in ordered {
            let (kind, cash, pnl) = match EventKind::from_tag(&event.kind) {
                Some(kind) => {
                    let (cash, pnl) = self.impacts(kind, event);
                    (kind, cash, pnl)
                }
                None => {
                    warn!(
                        kind = %event.kind,
                        timestamp = %event.timestamp,
                        description = %event.description,
                        "unrecognized event type, recording zero-impact entry"
                    );
                    report.unrecognized += 1;
                    (EventKind::Other, 0, 0)
                }
            };

            current_nav += cash + pnl;
            entries.push(LedgerEntry {
                timestamp: event.timestamp,
                kind,
                description: event.description.clone(),
                cash_impact: cash,
                realized_pnl_impact: pnl,
                nav_after_event: current_nav,
            });
            report.entries += 1;
        }

        debug!(
            entries = report.entries,
            unrecognized = report.unrecognized,
            final_nav = from_amount(current_nav),
            "ledger built"
        );

        NavLedger {
            starting_nav,
            entries,
            report,
        }
    }

    /// (cash_impact, realized_pnl_impact) for one recognized event, in
    /// base currency.
    fn impacts(&self, kind: EventKind, event: &RawAccountEvent) -> (Amount, Amount) {
        let fx = self.config.fx_rate;
        let (cash, pnl) = match kind {
            // Commission always reduces cash and realized P&L.
            EventKind::Trade => (
                event.proceeds - event.commission,
                event.proceeds - event.cost_basis - event.commission,
            ),
            // Stock enters or leaves the book at strike; the option's
            // basis settles out of the option book.
            EventKind::Assignment => (
                event.strike * event.quantity * CONTRACT_MULTIPLIER,
                -event.cost_basis,
            ),
            // Worthless expiry: long basis realizes as a loss, short
            // basis (negative) as the premium retained. No cash moves.
            EventKind::Expiration => (0.0, -event.cost_basis),
            EventKind::CashTransfer => (event.amount, 0.0),
            EventKind::FinancingCharge => (-event.amount.abs(), 0.0),
            EventKind::Other => (0.0, 0.0),
        };
        (to_amount(cash * fx), to_amount(pnl * fx))
    }
}
