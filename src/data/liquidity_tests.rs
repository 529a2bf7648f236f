//! Liquidity filter tests: activity threshold boundary, strike band
//! sizing and degenerate fallbacks.

use chrono::NaiveDate;

use crate::data::catalog::ContractCatalog;
use crate::data::db::Database;
use crate::data::liquidity::{LiquidityConfig, LiquidityFilter};
use crate::data::store::MarketDataStore;
use crate::models::{BarRecord, ContractKey, OptionRight};

fn bar(ts: i64) -> BarRecord {
    BarRecord {
        ts,
        open: 1.0,
        high: 1.1,
        low: 0.95,
        close: 1.05,
        volume: 10,
    }
}

fn setup(min_bar_count: u64) -> (Database, MarketDataStore, LiquidityFilter, ContractKey) {
    let db = Database::open_memory().unwrap();
    let catalog = ContractCatalog::new(&db);
    let key = catalog
        .resolve(
            "SPY",
            450.0,
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            OptionRight::Call,
        )
        .unwrap();
    let store = MarketDataStore::new(&db);
    let filter = LiquidityFilter::new(
        &db,
        LiquidityConfig {
            min_bar_count,
            ..LiquidityConfig::default()
        },
    );
    (db, store, filter, key)
}

#[test]
fn activity_threshold_is_an_exact_boundary() {
    let (_db, store, filter, key) = setup(3);

    store
        .insert_bars(key, &[bar(1_000), bar(1_060)])
        .unwrap();
    assert!(
        !filter.passes_activity_threshold(key).unwrap(),
        "one bar short of the minimum must fail"
    );

    store.insert_bars(key, &[bar(1_120)]).unwrap();
    assert!(
        filter.passes_activity_threshold(key).unwrap(),
        "exactly the minimum must pass"
    );
}

fn band_filter(config: LiquidityConfig) -> LiquidityFilter {
    let db = Database::open_memory().unwrap();
    LiquidityFilter::new(&db, config)
}

#[test]
fn strike_band_scales_with_expected_move() {
    let filter = band_filter(LiquidityConfig::default());

    // Expected move = 450 * 0.01 * 1.0 = 4.5; half-width = 2 sd = 9.
    let band = filter.select_strike_band(450.0, Some(0.01), 1.0);
    assert_eq!(band.strikes_per_side, 9);
    assert_eq!(band.low_strike, 441.0);
    assert_eq!(band.high_strike, 459.0);
    assert!(band.contains(441.0) && band.contains(459.0));
    assert!(!band.contains(440.0) && !band.contains(460.0));
}

#[test]
fn fractional_band_rounds_outward() {
    let filter = band_filter(LiquidityConfig::default());

    // Half-width = 2 * 450 * 0.011 = 9.9 strikes: must widen to 10,
    // never narrow to 9.
    let band = filter.select_strike_band(450.0, Some(0.011), 1.0);
    assert_eq!(band.strikes_per_side, 10);
}

#[test]
fn missing_or_zero_iv_falls_back_to_fixed_width() {
    let filter = band_filter(LiquidityConfig::default());

    for iv in [None, Some(0.0), Some(-0.5)] {
        let band = filter.select_strike_band(450.0, iv, 0.5);
        assert_eq!(band.strikes_per_side, 10, "fallback width for iv {iv:?}");
        assert!(
            band.high_strike > band.low_strike,
            "band must never collapse to zero width"
        );
    }

    // Exhausted session: nothing left of the day to move through.
    let band = filter.select_strike_band(450.0, Some(0.2), 0.0);
    assert_eq!(band.strikes_per_side, 10);
}

#[test]
fn band_width_is_clamped_per_side() {
    let filter = band_filter(LiquidityConfig::default());

    // Huge IV: 2 * 450 * 0.5 = 450 strikes, clamped to the max.
    let wide = filter.select_strike_band(450.0, Some(0.5), 1.0);
    assert_eq!(wide.strikes_per_side, 25);

    // Tiny IV: sub-strike move, clamped up to the min.
    let narrow = filter.select_strike_band(450.0, Some(0.000_001), 1.0);
    assert_eq!(narrow.strikes_per_side, 2);
}

#[test]
fn band_is_centered_on_the_nearest_listed_strike() {
    let filter = band_filter(LiquidityConfig::default());

    let band = filter.select_strike_band(450.4, Some(0.01), 1.0);
    // ATM rounds to 450; expected move uses the untouched spot price.
    // 2 * 450.4 * 0.01 = 9.008 -> 10 strikes per side.
    assert_eq!(band.strikes_per_side, 10);
    assert_eq!(band.low_strike, 440.0);
    assert_eq!(band.high_strike, 460.0);
}

#[test]
fn band_floor_never_reaches_zero() {
    let filter = band_filter(LiquidityConfig::default());

    let band = filter.select_strike_band(4.0, None, 1.0);
    assert!(band.low_strike >= 1.0);
}
