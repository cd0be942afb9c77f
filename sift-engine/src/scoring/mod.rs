//! Rule-based scoring engines.
//!
//! Three independent scorers consume the indicator library: per-candidate
//! trading signals, limit-up streak ratings, and the market-level trend
//! report. Labels and reasons are closed enums carrying the display text,
//! so scoring logic stays testable independent of locale strings.

mod limit_up;
mod market;
mod signal;

pub use limit_up::{
    FactorInputs, FeatureTag, LimitUpAnalysis, LimitUpRating, LimitUpRatingScorer, MacdState,
    RatingReason, TrendOutlook, consecutive_limit_ups,
};
pub use market::{
    IndexAnalysis, MarketTrend, MarketTrendClassifier, MarketTrendReport, SectorSummary,
    VolumeState,
};
pub use signal::{Advice, TradingSignal, TradingSignalScorer};

use serde::{Deserialize, Serialize};

/// Percent position below which a price counts as "low" in its window.
pub(crate) const LOW_POSITION_PCT: f64 = 30.0;
/// Percent position above which a price counts as "high" in its window.
pub(crate) const HIGH_POSITION_PCT: f64 = 70.0;

/// Price position within a trailing close window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PricePosition {
    Low,
    Mid,
    High,
    /// Zero-range window or no history
    Unknown,
}

impl PricePosition {
    /// Classify a 0-100 percent position; `None` maps to `Unknown`.
    pub fn from_percent(position: Option<f64>) -> Self {
        match position {
            None => Self::Unknown,
            Some(p) if p < LOW_POSITION_PCT => Self::Low,
            Some(p) if p > HIGH_POSITION_PCT => Self::High,
            Some(_) => Self::Mid,
        }
    }
}

impl std::fmt::Display for PricePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "低位"),
            Self::Mid => write!(f, "中位"),
            Self::High => write!(f, "高位"),
            Self::Unknown => write!(f, "未知"),
        }
    }
}
