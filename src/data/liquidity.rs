//! Liquidity-based contract selection.
//!
//! Two independent gates bound which contracts enter the downstream
//! dataset: a minimum bar-count activity threshold, and a
//! volatility-scaled strike band around at-the-money. Contracts failing
//! either gate are excluded, never deleted from storage.

use anyhow::Result;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::db::Database;
use crate::models::ContractKey;

/// Selection configuration.
#[derive(Debug, Clone)]
pub struct LiquidityConfig {
    /// Minimum bar count for a contract to count as active. The default
    /// represents roughly three hours of one-minute session bars.
    pub min_bar_count: u64,
    /// Standard-deviation multiplier applied to the expected move when
    /// sizing the strike band.
    pub sd_multiplier: f64,
    /// Distance between adjacent listed strikes.
    pub strike_spacing: f64,
    /// Band clamp, in strikes per side.
    pub min_strikes_per_side: u32,
    pub max_strikes_per_side: u32,
    /// Strikes per side when no usable IV is available.
    pub fallback_strikes_per_side: u32,
}

impl Default for LiquidityConfig {
    fn default() -> Self {
        Self {
            min_bar_count: 180,
            sd_multiplier: 2.0,
            strike_spacing: 1.0,
            min_strikes_per_side: 2,
            max_strikes_per_side: 25,
            fallback_strikes_per_side: 10,
        }
    }
}

/// Inclusive strike interval centered on at-the-money.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrikeBand {
    pub low_strike: f64,
    pub high_strike: f64,
    pub strikes_per_side: u32,
}

impl StrikeBand {
    pub fn contains(&self, strike: f64) -> bool {
        strike >= self.low_strike && strike <= self.high_strike
    }
}

pub struct LiquidityFilter {
    conn: Arc<Mutex<Connection>>,
    config: LiquidityConfig,
}

impl LiquidityFilter {
    pub fn new(db: &Database, config: LiquidityConfig) -> Self {
        Self {
            conn: db.connection(),
            config,
        }
    }

    /// True iff the contract's bar count clears the configured minimum.
    pub fn passes_activity_threshold(&self, contract: ContractKey) -> Result<bool> {
        let conn = self.conn.lock();
        let bars: u64 = conn.query_row(
            "SELECT COUNT(*) FROM bars WHERE contract_id = ?1",
            params![contract],
            |row| row.get(0),
        )?;
        Ok(bars >= self.config.min_bar_count)
    }

    /// Volatility-scaled strike band around at-the-money.
    ///
    /// The expected move is `price * iv * sqrt(day_fraction_remaining)`;
    /// the band half-width is the configured multiple of that move,
    /// rounded OUTWARD to whole strikes (a marginally-qualifying strike
    /// is included, never excluded) and clamped to the configured
    /// min/max strikes per side. Missing or non-positive IV falls back
    /// to the fixed strike count per side - never a zero-width band.
    pub fn select_strike_band(
        &self,
        underlying_price: f64,
        implied_vol: Option<f64>,
        day_fraction_remaining: f64,
    ) -> StrikeBand {
        let cfg = &self.config;
        let atm = (underlying_price / cfg.strike_spacing).round() * cfg.strike_spacing;

        let strikes_per_side = match implied_vol {
            Some(iv) if iv > 0.0 && day_fraction_remaining > 0.0 => {
                let expected_move =
                    underlying_price * iv * day_fraction_remaining.sqrt();
                let half_width = cfg.sd_multiplier * expected_move;
                let n = (half_width / cfg.strike_spacing).ceil() as u32;
                n.clamp(cfg.min_strikes_per_side, cfg.max_strikes_per_side)
            }
            _ => cfg.fallback_strikes_per_side,
        };

        let half = f64::from(strikes_per_side) * cfg.strike_spacing;
        let low = (atm - half).max(cfg.strike_spacing);
        StrikeBand {
            low_strike: low,
            high_strike: atm + half,
            strikes_per_side,
        }
    }
}
