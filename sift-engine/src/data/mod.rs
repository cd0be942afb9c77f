//! Core market data types.
//!
//! Snapshot rows come from the realtime quote board; historical bars come
//! from the daily and intraday K-line endpoints. Prices and amounts are in
//! yuan throughout.

mod provider;

pub use provider::{
    FundFlowRecord, MarketDataProvider, ProviderError, SectorFlow,
};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Percent change at or above which a session counts as limit-up.
pub const LIMIT_UP_PCT: f64 = 9.5;

/// Code prefixes outside the main board (ChiNext, STAR, Beijing exchange).
const NON_MAIN_BOARD_PREFIXES: &[&str] = &["300", "688", "689", "430", "830", "839"];

// ============================================================================
// Snapshot
// ============================================================================

/// One row of the realtime quote board, immutable for a refresh cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSnapshot {
    /// Instrument code (e.g. "000001")
    pub symbol: String,
    /// Display name
    pub name: String,
    /// Last traded price
    pub last_price: f64,
    /// Percent change vs the previous close
    pub percent_change: f64,
    /// Turnover rate (%)
    pub turnover_rate: f64,
    /// Volume ratio vs the recent average
    pub volume_ratio: f64,
    /// Total market capitalization (yuan)
    pub market_cap: f64,
    /// Traded amount this session (yuan)
    pub traded_amount: f64,
    /// Industry tag, when the board supplies one
    #[serde(default)]
    pub industry: Option<String>,
}

impl InstrumentSnapshot {
    /// Whether this session sits at or above the limit-up threshold.
    pub fn is_limit_up(&self) -> bool {
        self.percent_change >= LIMIT_UP_PCT
    }
}

// ============================================================================
// Bars
// ============================================================================

/// One trading session (or intraday sample) of OHLCV data.
///
/// Series are ordered strictly ascending by date with one entry per
/// session; missing sessions are tolerated and never interpolated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Percent change vs the prior session, when the source provides it
    #[serde(default)]
    pub percent_change: f64,
}

/// Close column of a series.
pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

/// Volume column of a series.
pub fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume).collect()
}

// ============================================================================
// Board classification
// ============================================================================

/// Whether a symbol belongs to the main board.
///
/// Growth/innovation/regional exchange code prefixes are excluded.
pub fn is_main_board(symbol: &str) -> bool {
    !NON_MAIN_BOARD_PREFIXES
        .iter()
        .any(|prefix| symbol.starts_with(prefix))
}

// ============================================================================
// Tests
// ============================================================================
