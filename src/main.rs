//! SPY options dataset backend - operational entrypoint.
//!
//! One binary replaces the pile of one-off cleanup and reporting
//! scripts: congruence repair passes, dataset resets, count
//! diagnostics, and ALM ledger reconstruction from a broker event file.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spydata_backend::alm::{
    from_amount, DailySummaryAggregator, DailySummaryConfig, EventLedgerBuilder,
    LedgerBuildConfig, RawAccountEvent,
};
use spydata_backend::data::{
    CongruenceConfig, CongruenceEnforcer, ContractCatalog, Database, DbConfig, MarketDataStore,
    RepairMode,
};
use spydata_backend::models::Config;

#[derive(Parser)]
#[command(name = "spydata", about = "SPY options dataset operations")]
struct Cli {
    /// Database path (overrides DATABASE_PATH).
    #[arg(long, global = true)]
    db: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Strict,
    Complete,
}

impl From<ModeArg> for RepairMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Strict => RepairMode::Strict,
            ModeArg::Complete => RepairMode::Complete,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Run a congruence repair pass over stored contracts.
    Repair {
        #[arg(long, value_enum, default_value = "strict")]
        mode: ModeArg,
        /// Restrict to one underlying symbol.
        #[arg(long)]
        symbol: Option<String>,
        /// Treat the dataset as non-0DTE (skip contamination removal).
        #[arg(long)]
        keep_off_expiry: bool,
    },
    /// Print per-contract series counts.
    Counts {
        #[arg(long)]
        symbol: Option<String>,
    },
    /// Dataset reset: delete contracts (and all series rows) for an
    /// expiration range.
    Purge {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
    /// Build the ALM ledger from a broker event JSON file and print the
    /// daily summary.
    Ledger {
        /// JSON file holding an array of raw account events.
        #[arg(long)]
        events: String,
        #[arg(long)]
        starting_nav: f64,
        #[arg(long, default_value_t = 1.0)]
        fx_rate: f64,
        /// Emit the full ledger as JSON instead of the daily table.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let db_path = cli.db.unwrap_or(config.database_path);

    match cli.command {
        Command::Repair {
            mode,
            symbol,
            keep_off_expiry,
        } => {
            let db = Database::open(&DbConfig { path: db_path })?;
            let catalog = ContractCatalog::new(&db);
            let enforcer = CongruenceEnforcer::new(
                &db,
                CongruenceConfig {
                    zero_dte: !keep_off_expiry,
                    ..CongruenceConfig::default()
                },
            );

            let contracts = match symbol {
                Some(sym) => catalog
                    .contracts()?
                    .into_iter()
                    .filter(|c| c.symbol == sym)
                    .collect(),
                None => catalog.contracts()?,
            };

            let report = enforcer.repair_all(&contracts, mode.into());
            println!(
                "repaired {}/{} contracts ({} rows removed, {} inserted, {} failed)",
                report.contracts_changed,
                report.contracts_seen,
                report.totals.rows_removed(),
                report.totals.rows_inserted(),
                report.failures.len(),
            );
            for failure in &report.failures {
                println!("  FAILED {}: {}", failure.contract, failure.error);
            }
            if !report.is_clean() {
                anyhow::bail!("{} contracts failed repair", report.failures.len());
            }
        }

        Command::Counts { symbol } => {
            let db = Database::open(&DbConfig { path: db_path })?;
            let catalog = ContractCatalog::new(&db);
            let store = MarketDataStore::new(&db);

            for contract in catalog.contracts()? {
                if let Some(sym) = &symbol {
                    if &contract.symbol != sym {
                        continue;
                    }
                }
                let counts = store.counts(contract.id)?;
                println!(
                    "{:>6}  {:<24} bars={:<6} greeks={:<6} iv={:<6} {}",
                    contract.id,
                    contract.display(),
                    counts.bars,
                    counts.greeks,
                    counts.iv,
                    if counts.congruent() { "congruent" } else { "MISALIGNED" },
                );
            }
        }

        Command::Purge { symbol, from, to } => {
            let db = Database::open(&DbConfig { path: db_path })?;
            let catalog = ContractCatalog::new(&db);
            let stats = catalog.purge(&symbol, from, to)?;
            println!(
                "purged {} contracts ({} bars, {} greeks, {} iv rows)",
                stats.contracts, stats.bars, stats.greeks, stats.iv,
            );
        }

        Command::Ledger {
            events,
            starting_nav,
            fx_rate,
            json,
        } => {
            let raw = std::fs::read_to_string(&events)
                .with_context(|| format!("Failed to read event file: {events}"))?;
            let events: Vec<RawAccountEvent> =
                serde_json::from_str(&raw).context("Failed to parse event file")?;
            info!(events = events.len(), "building ledger");

            let builder = EventLedgerBuilder::new(LedgerBuildConfig {
                starting_nav,
                fx_rate,
            });
            let ledger = builder.build(&events);

            let aggregator = DailySummaryAggregator::new(DailySummaryConfig::default());
            let rows = aggregator.aggregate(&ledger);
            aggregator.validate(&rows)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&ledger)?);
            } else {
                println!(
                    "{:<12} {:>14} {:>14} {:>12} {:>12}",
                    "date", "opening", "closing", "pnl", "cash flow"
                );
                for row in &rows {
                    println!(
                        "{:<12} {:>14.2} {:>14.2} {:>12.2} {:>12.2}",
                        row.date.to_string(),
                        from_amount(row.opening_nav),
                        from_amount(row.closing_nav),
                        from_amount(row.total_pnl),
                        from_amount(row.net_cash_flow),
                    );
                }
                let report = ledger.report();
                if report.unrecognized > 0 {
                    println!("({} unrecognized events recorded as no-ops)", report.unrecognized);
                }
            }
        }
    }

    Ok(())
}
