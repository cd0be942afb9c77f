//! Market-level trend classification.
//!
//! Classifies the benchmark index from MA alignment and MACD posture,
//! attaches support/resistance and volume context, and surveys sectors
//! for strength (already moving, money in) and potential (quiet price,
//! heavy inflow).

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::data::{self, Bar, MarketDataProvider};
use crate::indicators::{last_value, macd, rsi, sma, RSI_PERIOD};
use crate::money_flow::parse_flow_value;

/// Bars behind the support/resistance window.
const SUPPORT_WINDOW: usize = 20;
/// Volume expansion multiple vs the 5-session volume mean.
const VOLUME_EXPAND_RATIO: f64 = 1.5;
/// Volume shrink multiple vs the 5-session volume mean.
const VOLUME_SHRINK_RATIO: f64 = 0.8;
/// Mean constituent change above which a sector counts as strong (%).
const STRONG_SECTOR_MIN_CHANGE: f64 = 2.0;
/// Net inflow above which a quiet sector counts as potential (yuan).
const POTENTIAL_SECTOR_MIN_INFLOW: f64 = 5e7;

// ============================================================================
// Market Trend
// ============================================================================

/// Index-level trend category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarketTrend {
    StrongUp,
    MildUp,
    Consolidating,
    MildDown,
    StrongDown,
}

impl MarketTrend {
    /// Fixed advisory string for the category.
    pub fn advisory(&self) -> &'static str {
        match self {
            Self::StrongUp => "可以积极做多，但注意高位风险",
            Self::MildUp => "可以逢低买入，注意节奏",
            Self::Consolidating => "建议观望，等待方向明确",
            Self::MildDown => "建议轻仓观望，等待企稳",
            Self::StrongDown => "建议清仓观望，等待企稳",
        }
    }
}

impl fmt::Display for MarketTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StrongUp => write!(f, "强势上涨"),
            Self::MildUp => write!(f, "震荡上涨"),
            Self::Consolidating => write!(f, "震荡整理"),
            Self::MildDown => write!(f, "震荡下跌"),
            Self::StrongDown => write!(f, "强势下跌"),
        }
    }
}

/// Session volume relative to its recent mean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeState {
    Expanding,
    Shrinking,
    Steady,
}

// ============================================================================
// Report Types
// ============================================================================

/// Benchmark index analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexAnalysis {
    pub trend: MarketTrend,
    pub advisory: String,
    pub current_price: f64,
    /// 20-bar low
    pub support: f64,
    /// 20-bar high
    pub resistance: f64,
    pub rsi: Option<f64>,
    pub volume_state: VolumeState,
    /// 5-session volume mean above the 10-session mean
    pub volume_trend_rising: bool,
}

/// One sector in the landscape survey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorSummary {
    pub sector: String,
    /// Mean percent change of the constituents
    pub mean_change: f64,
    /// Parsed net inflow in yuan
    pub net_inflow: f64,
}

/// Full market-trend report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketTrendReport {
    /// Absent when the index history is empty or unavailable
    pub index: Option<IndexAnalysis>,
    /// Sorted by mean change descending
    pub strong_sectors: Vec<SectorSummary>,
    /// Sorted by raw inflow descending
    pub potential_sectors: Vec<SectorSummary>,
}

// ============================================================================
// Classifier
// ============================================================================

/// Classifies the benchmark index and the sector landscape.
pub struct MarketTrendClassifier {
    index_symbol: String,
}

impl MarketTrendClassifier {
    pub fn new(index_symbol: impl Into<String>) -> Self {
        Self {
            index_symbol: index_symbol.into(),
        }
    }

    /// Build the full report. Missing index data degrades to a report
    /// without an index section rather than an error.
    pub async fn analyze<P: MarketDataProvider + ?Sized>(&self, provider: &P) -> MarketTrendReport {
        let index = match provider.get_index_daily_history(&self.index_symbol).await {
            Ok(bars) if !bars.is_empty() => Some(Self::analyze_index(&bars)),
            Ok(_) => {
                warn!(index = %self.index_symbol, "index history is empty");
                None
            }
            Err(e) => {
                warn!(index = %self.index_symbol, error = %e, "index history unavailable");
                None
            }
        };

        let (strong_sectors, potential_sectors) = Self::analyze_sectors(provider).await;
        info!(
            strong = strong_sectors.len(),
            potential = potential_sectors.len(),
            "market trend report built"
        );

        MarketTrendReport {
            index,
            strong_sectors,
            potential_sectors,
        }
    }

    /// Pure index classification over a non-empty series.
    pub fn analyze_index(bars: &[Bar]) -> IndexAnalysis {
        let closes = data::closes(bars);
        let volumes = data::volumes(bars);

        let ma5 = last_value(&sma(&closes, 5));
        let ma10 = last_value(&sma(&closes, 10));
        let ma20 = last_value(&sma(&closes, 20));
        let ma60 = last_value(&sma(&closes, 60));
        let macd = macd(&closes);
        let latest_rsi = last_value(&rsi(&closes, RSI_PERIOD));

        let bullish = matches!(
            (ma5, ma10, ma20, ma60),
            (Some(a), Some(b), Some(c), Some(d)) if a > b && b > c && c > d
        );
        let bearish = matches!(
            (ma5, ma10, ma20, ma60),
            (Some(a), Some(b), Some(c), Some(d)) if a < b && b < c && c < d
        );

        let trend = if bullish && macd.golden_cross() {
            MarketTrend::StrongUp
        } else if bullish && macd.above_zero() {
            MarketTrend::MildUp
        } else if bearish && macd.death_cross() {
            MarketTrend::StrongDown
        } else if bearish && macd.below_zero() {
            MarketTrend::MildDown
        } else {
            MarketTrend::Consolidating
        };

        let window = if bars.len() > SUPPORT_WINDOW {
            &bars[bars.len() - SUPPORT_WINDOW..]
        } else {
            bars
        };
        let support = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let resistance = window
            .iter()
            .map(|b| b.high)
            .fold(f64::NEG_INFINITY, f64::max);

        let vol_ma5 = last_value(&sma(&volumes, 5));
        let vol_ma10 = last_value(&sma(&volumes, 10));
        let latest_volume = volumes.last().copied().unwrap_or_default();
        let volume_state = match vol_ma5 {
            Some(mean) if latest_volume > mean * VOLUME_EXPAND_RATIO => VolumeState::Expanding,
            Some(mean) if latest_volume < mean * VOLUME_SHRINK_RATIO => VolumeState::Shrinking,
            _ => VolumeState::Steady,
        };
        let volume_trend_rising = matches!(
            (vol_ma5, vol_ma10),
            (Some(short), Some(long)) if short > long
        );

        IndexAnalysis {
            trend,
            advisory: trend.advisory().to_string(),
            current_price: closes.last().copied().unwrap_or_default(),
            support,
            resistance,
            rsi: latest_rsi,
            volume_state,
            volume_trend_rising,
        }
    }

    async fn analyze_sectors<P: MarketDataProvider + ?Sized>(
        provider: &P,
    ) -> (Vec<SectorSummary>, Vec<SectorSummary>) {
        let flows = match provider.get_sector_fund_flow().await {
            Ok(flows) => flows,
            Err(e) => {
                warn!(error = %e, "sector fund flow unavailable");
                return (Vec::new(), Vec::new());
            }
        };

        let mut strong = Vec::new();
        let mut potential = Vec::new();
        for flow in flows {
            let net_inflow = parse_flow_value(&flow.net_inflow_raw);
            let constituents = match provider.get_sector_constituents(&flow.sector).await {
                Ok(constituents) if !constituents.is_empty() => constituents,
                Ok(_) => continue,
                Err(e) => {
                    warn!(sector = %flow.sector, error = %e, "constituent fetch failed, skipping sector");
                    continue;
                }
            };
            let mean_change = constituents
                .iter()
                .map(|c| c.percent_change)
                .sum::<f64>()
                / constituents.len() as f64;

            let summary = SectorSummary {
                sector: flow.sector,
                mean_change,
                net_inflow,
            };
            if mean_change > STRONG_SECTOR_MIN_CHANGE && net_inflow > 0.0 {
                strong.push(summary);
            } else if mean_change < STRONG_SECTOR_MIN_CHANGE
                && net_inflow > POTENTIAL_SECTOR_MIN_INFLOW
            {
                potential.push(summary);
            }
        }

        strong.sort_by(|a, b| {
            b.mean_change
                .partial_cmp(&a.mean_change)
                .unwrap_or(Ordering::Equal)
        });
        potential.sort_by(|a, b| {
            b.net_inflow
                .partial_cmp(&a.net_inflow)
                .unwrap_or(Ordering::Equal)
        });
        (strong, potential)
    }
}

// ============================================================================
// Tests
// ============================================================================
