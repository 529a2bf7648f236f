use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Option right (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    /// Single-letter code used in storage and display ("C" / "P").
    pub fn as_str(&self) -> &str {
        match self {
            OptionRight::Call => "C",
            OptionRight::Put => "P",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "C" | "c" | "CALL" | "call" => Some(OptionRight::Call),
            "P" | "p" | "PUT" | "put" => Some(OptionRight::Put),
            _ => None,
        }
    }
}

/// Synthetic contract key assigned by the catalog at creation.
/// Keys are never reused, even after a purge.
pub type ContractKey = i64;

/// A resolved option contract identity.
///
/// (symbol, strike, expiration, right) is unique and immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractKey,
    pub symbol: String,
    pub strike: f64,
    pub expiration: NaiveDate,
    pub right: OptionRight,
}

impl Contract {
    /// Compact display form, e.g. "SPY 2024-03-15 450C".
    pub fn display(&self) -> String {
        format!(
            "{} {} {}{}",
            self.symbol,
            self.expiration,
            self.strike,
            self.right.as_str()
        )
    }
}

/// One OHLC trade bar. Timestamp is Unix epoch seconds (UTC).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarRecord {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// One Greeks snapshot. Timestamp keying matches [`BarRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GreeksRecord {
    pub ts: i64,
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

/// One implied-volatility observation.
///
/// `implied_vol = None` is a legitimate placeholder meaning "no IV
/// observation, interpolate later" - distinct from the row not existing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IvRecord {
    pub ts: i64,
    pub implied_vol: Option<f64>,
}

/// Per-contract row counts across the three series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesCounts {
    pub bars: u64,
    pub greeks: u64,
    pub iv: u64,
}

impl SeriesCounts {
    /// True when all three series carry the same number of rows.
    pub fn congruent(&self) -> bool {
        self.bars == self.greeks && self.bars == self.iv
    }
}

/// Malformed contract identity rejected at resolution time.
#[derive(Debug, Clone)]
pub struct InvalidContractSpec {
    pub symbol: String,
    pub strike: f64,
    pub reason: String,
}

impl std::fmt::Display for InvalidContractSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid contract spec ({} strike {}): {}",
            self.symbol, self.strike, self.reason
        )
    }
}

impl std::error::Error for InvalidContractSpec {}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let database_path =
            std::env::var("DATABASE_PATH").unwrap_or_else(|_| "./spydata.db".to_string());

        Ok(Self { database_path })
    }
}
