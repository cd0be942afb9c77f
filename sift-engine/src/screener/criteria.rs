//! Screening criteria configuration.

use serde::{Deserialize, Serialize};

// ============================================================================
// Range
// ============================================================================

/// Inclusive numeric range. A range with `min > max` matches nothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

// ============================================================================
// Filter Criteria
// ============================================================================

/// All range and boolean options consumed by the filter pipeline.
///
/// The serde defaults are the permissive "cleared" state that lets every
/// instrument through the range checks; [`FilterCriteria::preset`] is the
/// opinionated everyday preset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Turnover rate range (%)
    #[serde(default = "default_turnover")]
    pub turnover: Range,

    /// Percent change range
    #[serde(default = "default_percent_change")]
    pub percent_change: Range,

    /// Minimum volume ratio
    #[serde(default)]
    pub volume_ratio_min: f64,

    /// Maximum volume ratio; non-positive means unbounded above
    #[serde(default)]
    pub volume_ratio_max: f64,

    /// Price range (yuan)
    #[serde(default = "default_price")]
    pub price: Range,

    /// Market cap range in 亿 (hundred million yuan)
    #[serde(default = "default_market_cap")]
    pub market_cap_yi: Range,

    /// Drop instruments with non-positive percent change
    #[serde(default)]
    pub remove_green: bool,

    /// Drop instruments at or above the limit-up threshold
    #[serde(default)]
    pub remove_limit_up: bool,

    /// Require intraday volume to rise across the last three samples
    #[serde(default)]
    pub volume_increasing: bool,

    /// Require instantaneous MA5 > MA10 > MA20
    #[serde(default)]
    pub ma_alignment: bool,

    /// Require a fresh MACD golden cross
    #[serde(default)]
    pub macd_golden_cross: bool,

    /// Require a fresh KDJ golden cross
    #[serde(default)]
    pub kdj_golden_cross: bool,

    /// Keep only the top N by traded amount (0 disables)
    #[serde(default)]
    pub hot_top_n: usize,

    /// Keep only the top N per industry by market cap (0 disables)
    #[serde(default)]
    pub industry_top_n: usize,

    /// Trailing window for the limit-up count filter, in months (0 disables)
    #[serde(default)]
    pub limit_up_months: u32,

    /// Exact number of limit-up sessions required in the window (0 disables)
    #[serde(default)]
    pub limit_up_count: u32,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            turnover: default_turnover(),
            percent_change: default_percent_change(),
            volume_ratio_min: 0.0,
            volume_ratio_max: 0.0,
            price: default_price(),
            market_cap_yi: default_market_cap(),
            remove_green: false,
            remove_limit_up: false,
            volume_increasing: false,
            ma_alignment: false,
            macd_golden_cross: false,
            kdj_golden_cross: false,
            hot_top_n: 0,
            industry_top_n: 0,
            limit_up_months: 0,
            limit_up_count: 0,
        }
    }
}

fn default_turnover() -> Range {
    Range::new(0.0, 100.0)
}

fn default_percent_change() -> Range {
    Range::new(-20.0, 20.0)
}

fn default_price() -> Range {
    Range::new(0.0, 10_000.0)
}

fn default_market_cap() -> Range {
    Range::new(0.0, 10_000.0)
}

impl FilterCriteria {
    /// The everyday screening preset: modest turnover and change bands,
    /// cheap mid-cap names, green rows removed.
    pub fn preset() -> Self {
        Self {
            turnover: Range::new(3.0, 10.0),
            percent_change: Range::new(3.0, 10.0),
            volume_ratio_min: 1.0,
            volume_ratio_max: 10.0,
            price: Range::new(1.0, 5.0),
            market_cap_yi: Range::new(50.0, 300.0),
            remove_green: true,
            limit_up_months: 1,
            limit_up_count: 1,
            ..Self::default()
        }
    }

    /// Whether any technical sub-check is enabled.
    pub fn wants_technical(&self) -> bool {
        self.ma_alignment || self.macd_golden_cross || self.kdj_golden_cross
    }
}

// ============================================================================
// Tests
// ============================================================================
