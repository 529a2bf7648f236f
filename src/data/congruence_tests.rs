//! Congruence enforcer tests: orphan removal, NULL IV placeholders,
//! 0DTE contamination, end-of-day artifacts, idempotence.

use chrono::NaiveDate;

use crate::data::catalog::ContractCatalog;
use crate::data::congruence::{CongruenceConfig, CongruenceEnforcer, RepairMode};
use crate::data::db::Database;
use crate::data::store::MarketDataStore;
use crate::models::{BarRecord, Contract, GreeksRecord, IvRecord, OptionRight};

/// Default config runs the session five hours behind UTC.
const SESSION_OFFSET_SECS: i64 = 5 * 3_600;

fn expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

/// Epoch seconds for a session-local wall-clock time.
fn session_ts(date: NaiveDate, h: u32, m: u32) -> i64 {
    date.and_hms_opt(h, m, 0).unwrap().and_utc().timestamp() + SESSION_OFFSET_SECS
}

fn bar(ts: i64) -> BarRecord {
    BarRecord {
        ts,
        open: 1.0,
        high: 1.2,
        low: 0.9,
        close: 1.1,
        volume: 30,
    }
}

fn greeks(ts: i64) -> GreeksRecord {
    GreeksRecord {
        ts,
        delta: 0.5,
        gamma: 0.1,
        theta: -0.4,
        vega: 0.06,
        rho: 0.01,
    }
}

fn iv(ts: i64) -> IvRecord {
    IvRecord {
        ts,
        implied_vol: Some(0.17),
    }
}

struct Fixture {
    db: Database,
    store: MarketDataStore,
    contract: Contract,
}

fn fixture() -> Fixture {
    let db = Database::open_memory().unwrap();
    let catalog = ContractCatalog::new(&db);
    let key = catalog
        .resolve("SPY", 450.0, expiry(), OptionRight::Call)
        .unwrap();
    let contract = catalog.get(key).unwrap().unwrap();
    let store = MarketDataStore::new(&db);
    Fixture {
        db,
        store,
        contract,
    }
}

fn enforcer(db: &Database) -> CongruenceEnforcer {
    CongruenceEnforcer::new(db, CongruenceConfig::default())
}

#[test]
fn orphaned_greeks_and_eod_artifact_are_removed() {
    let f = fixture();
    let (t1, t2, t3) = (
        session_ts(expiry(), 9, 30),
        session_ts(expiry(), 9, 31),
        session_ts(expiry(), 9, 32),
    );
    let t_eod = session_ts(expiry(), 16, 0);

    f.store.insert_bars(f.contract.id, &[bar(t1), bar(t2), bar(t3)]).unwrap();
    // Greeks at every bar, plus the end-of-day feed artifact.
    f.store
        .insert_greeks(
            f.contract.id,
            &[greeks(t1), greeks(t2), greeks(t3), greeks(t_eod)],
        )
        .unwrap();
    f.store
        .insert_iv(f.contract.id, &[iv(t1), iv(t2), iv(t3)])
        .unwrap();

    let stats = enforcer(&f.db)
        .repair_contract(&f.contract, RepairMode::Strict)
        .unwrap();

    assert_eq!(stats.artifact_greeks, 1);
    assert_eq!(stats.orphan_greeks, 0);
    let counts = f.store.counts(f.contract.id).unwrap();
    assert_eq!(counts.bars, 3);
    assert_eq!(counts.greeks, 3, "exactly the three bar-aligned snapshots survive");
    assert_eq!(
        f.store.greeks_timestamps(f.contract.id).unwrap(),
        f.store.bar_timestamps(f.contract.id).unwrap(),
    );
}

#[test]
fn off_session_greeks_are_orphans_in_strict_mode() {
    let f = fixture();
    let t1 = session_ts(expiry(), 10, 0);
    let t_orphan = session_ts(expiry(), 10, 15);

    f.store.insert_bars(f.contract.id, &[bar(t1)]).unwrap();
    f.store
        .insert_greeks(f.contract.id, &[greeks(t1), greeks(t_orphan)])
        .unwrap();
    f.store
        .insert_iv(f.contract.id, &[iv(t1), iv(t_orphan)])
        .unwrap();

    let stats = enforcer(&f.db)
        .repair_contract(&f.contract, RepairMode::Strict)
        .unwrap();

    assert_eq!(stats.orphan_greeks, 1);
    assert_eq!(stats.orphan_iv, 1);
    let counts = f.store.counts(f.contract.id).unwrap();
    assert!(counts.congruent());
    assert_eq!(counts.bars, 1);
}

#[test]
fn complete_mode_keeps_orphans_but_fills_gaps() {
    let f = fixture();
    let t1 = session_ts(expiry(), 10, 0);
    let t_orphan = session_ts(expiry(), 10, 15);

    f.store.insert_bars(f.contract.id, &[bar(t1)]).unwrap();
    f.store
        .insert_greeks(f.contract.id, &[greeks(t_orphan)])
        .unwrap();

    let stats = enforcer(&f.db)
        .repair_contract(&f.contract, RepairMode::Complete)
        .unwrap();

    assert_eq!(stats.orphan_greeks, 0, "complete mode never deletes orphans");
    assert_eq!(stats.greeks_placeholders, 1);
    assert_eq!(stats.iv_placeholders, 1);
    let counts = f.store.counts(f.contract.id).unwrap();
    assert_eq!(counts.bars, 1);
    assert_eq!(counts.greeks, 2, "orphan plus bar-aligned placeholder");
    assert_eq!(counts.iv, 1);
}

#[test]
fn missing_iv_becomes_a_null_placeholder_and_stays_one() {
    let f = fixture();
    let t1 = session_ts(expiry(), 11, 0);
    f.store.insert_bars(f.contract.id, &[bar(t1)]).unwrap();

    let e = enforcer(&f.db);
    let first = e.repair_contract(&f.contract, RepairMode::Strict).unwrap();
    assert_eq!(first.iv_placeholders, 1);
    assert_eq!(f.store.counts(f.contract.id).unwrap().iv, 1);
    assert_eq!(f.store.null_iv_count(f.contract.id).unwrap(), 1);

    // Second pass: the placeholder is canonical state, not a gap.
    let second = e.repair_contract(&f.contract, RepairMode::Strict).unwrap();
    assert!(!second.changed(), "strict repair must be idempotent");
    assert_eq!(f.store.counts(f.contract.id).unwrap().iv, 1);
    assert_eq!(f.store.null_iv_count(f.contract.id).unwrap(), 1);
}

#[test]
fn zero_dte_contamination_is_removed() {
    let f = fixture();
    let on_expiry = session_ts(expiry(), 9, 30);
    let day_before = session_ts(expiry().pred_opt().unwrap(), 9, 30);

    f.store
        .insert_bars(f.contract.id, &[bar(on_expiry), bar(day_before)])
        .unwrap();
    f.store
        .insert_greeks(f.contract.id, &[greeks(day_before)])
        .unwrap();

    let stats = enforcer(&f.db)
        .repair_contract(&f.contract, RepairMode::Strict)
        .unwrap();

    assert_eq!(stats.contaminated_bars, 1);
    assert_eq!(stats.contaminated_greeks, 1);
    assert_eq!(
        f.store.bar_timestamps(f.contract.id).unwrap(),
        vec![on_expiry]
    );
}

#[test]
fn non_0dte_datasets_keep_off_expiry_rows() {
    let f = fixture();
    let day_before = session_ts(expiry().pred_opt().unwrap(), 9, 30);
    f.store.insert_bars(f.contract.id, &[bar(day_before)]).unwrap();

    let e = CongruenceEnforcer::new(
        &f.db,
        CongruenceConfig {
            zero_dte: false,
            ..CongruenceConfig::default()
        },
    );
    let stats = e.repair_contract(&f.contract, RepairMode::Strict).unwrap();

    assert_eq!(stats.contaminated_bars, 0);
    assert_eq!(f.store.counts(f.contract.id).unwrap().bars, 1);
}

#[test]
fn eod_artifact_is_removed_even_when_aligned() {
    let f = fixture();
    let t_eod = session_ts(expiry(), 16, 0);

    f.store.insert_bars(f.contract.id, &[bar(t_eod)]).unwrap();
    f.store.insert_greeks(f.contract.id, &[greeks(t_eod)]).unwrap();
    f.store.insert_iv(f.contract.id, &[iv(t_eod)]).unwrap();

    let e = enforcer(&f.db);
    let first = e.repair_contract(&f.contract, RepairMode::Strict).unwrap();
    assert_eq!(first.artifact_bars, 1);
    assert_eq!(first.artifact_greeks, 1);
    assert_eq!(first.artifact_iv, 1);

    let counts = f.store.counts(f.contract.id).unwrap();
    assert_eq!(counts.bars, 0);
    assert!(counts.congruent());

    let second = e.repair_contract(&f.contract, RepairMode::Strict).unwrap();
    assert!(!second.changed());
}

#[test]
fn repair_reaches_a_fixed_point_on_a_messy_contract() {
    let f = fixture();
    let (t1, t2, t3) = (
        session_ts(expiry(), 9, 30),
        session_ts(expiry(), 9, 31),
        session_ts(expiry(), 9, 32),
    );
    let t_eod = session_ts(expiry(), 16, 0);
    let stale = session_ts(expiry().pred_opt().unwrap(), 14, 0);
    let t_orphan = session_ts(expiry(), 12, 0);

    f.store
        .insert_bars(f.contract.id, &[bar(t1), bar(t2), bar(t3), bar(stale)])
        .unwrap();
    f.store
        .insert_greeks(
            f.contract.id,
            &[greeks(t1), greeks(t_orphan), greeks(t_eod), greeks(stale)],
        )
        .unwrap();
    f.store.insert_iv(f.contract.id, &[iv(t2)]).unwrap();

    let e = enforcer(&f.db);
    let first = e.repair_contract(&f.contract, RepairMode::Strict).unwrap();
    assert!(first.changed());

    let counts = f.store.counts(f.contract.id).unwrap();
    assert!(counts.congruent(), "strict pass must equalize the triple");
    assert_eq!(counts.bars, 3);
    assert_eq!(
        f.store.iv_timestamps(f.contract.id).unwrap(),
        f.store.bar_timestamps(f.contract.id).unwrap()
    );

    let second = e.repair_contract(&f.contract, RepairMode::Strict).unwrap();
    assert!(!second.changed(), "second pass must be a no-op");
}

#[test]
fn repair_all_covers_every_contract_and_verifies_congruence() {
    let db = Database::open_memory().unwrap();
    let catalog = ContractCatalog::new(&db);
    let store = MarketDataStore::new(&db);

    for strike in [449.0, 450.0] {
        let key = catalog
            .resolve("SPY", strike, expiry(), OptionRight::Call)
            .unwrap();
        let t1 = session_ts(expiry(), 9, 30);
        store.insert_bars(key, &[bar(t1)]).unwrap();
        store
            .insert_greeks(key, &[greeks(t1), greeks(session_ts(expiry(), 16, 0))])
            .unwrap();
    }

    let e = enforcer(&db);
    let contracts = catalog.contracts().unwrap();
    let report = e.repair_all(&contracts, RepairMode::Strict);

    assert!(report.is_clean());
    assert_eq!(report.contracts_seen, 2);
    assert_eq!(report.contracts_changed, 2);
    assert_eq!(report.totals.artifact_greeks, 2);
    assert_eq!(report.totals.iv_placeholders, 2);
    for contract in &contracts {
        assert!(e.is_congruent(contract.id).unwrap());
    }
}
