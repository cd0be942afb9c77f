//! Limit-up streak rating.
//!
//! Rates every main-board instrument sitting at limit-up: feature tags,
//! nine additive scoring factors, a short-horizon outlook, and a final
//! rating label. Factor extraction and scoring are split so the rating
//! rules can be tested without building a bar series.

use std::collections::HashMap;
use std::fmt;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::{
    self, is_main_board, Bar, InstrumentSnapshot, MarketDataProvider, LIMIT_UP_PCT,
};
use crate::indicators::{
    growth_pct, last_value, macd, price_position, rsi, sma, MacdSeries, RSI_PERIOD,
};
use crate::money_flow::parse_flow_value;

use super::{HIGH_POSITION_PCT, LOW_POSITION_PCT};

/// Calendar days of daily history fetched per candidate.
const HISTORY_CALENDAR_DAYS: i64 = 30;

// Factor thresholds.
const STREAK_STRONG: u32 = 3;
const VOLUME_RATIO_SURGE: f64 = 3.0;
const VOLUME_RATIO_HEALTHY: f64 = 2.0;
const VOLUME_RATIO_WEAK: f64 = 0.8;
const MA5_GROWTH_STRONG_PCT: f64 = 2.0;
const RSI_HEALTHY_LOW: f64 = 50.0;
const RSI_HEALTHY_HIGH: f64 = 70.0;
const RSI_OVERBOUGHT: f64 = 80.0;
const RSI_OVERSOLD: f64 = 30.0;
/// The feature tag uses a deeper oversold bound than the scoring factor.
const RSI_FEATURE_OVERSOLD: f64 = 20.0;
const SECTOR_FLOW_STRONG_YUAN: f64 = 1e8;
const VOLUME_VS_MEAN_SURGE: f64 = 3.0;
const VOLUME_VS_MEAN_UP: f64 = 2.0;
const VOLUME_VS_MEAN_SHRINK: f64 = 0.5;
const TURNOVER_FULL_PCT: f64 = 15.0;
const TURNOVER_ACTIVE_PCT: f64 = 10.0;
const TURNOVER_THIN_PCT: f64 = 3.0;
/// Neutral percent position when the window range is zero.
const NEUTRAL_POSITION_PCT: f64 = 50.0;

// Label cutoffs.
const STRONG_RECOMMEND_MIN_RATING: u32 = 8;
const STRONG_RECOMMEND_MAX_RISK: u32 = 2;
const WATCH_MIN_RATING: u32 = 6;
const WATCH_MAX_RISK: u32 = 3;
const STRONG_RISK_MIN_RISK: u32 = 5;
const CAUTION_MIN_RISK: u32 = 3;

// ============================================================================
// Tags and Labels
// ============================================================================

/// Feature tags attached to a limit-up candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureTag {
    ConsecutiveLimitUps(u32),
    HighVolumeLimitUp,
    LowVolumeLimitUp,
    BullishMaStack,
    BearishMaStack,
    RsiOverbought,
    RsiOversold,
    MacdGoldenCross,
    MacdDeathCross,
    SectorInflow(String),
    SectorOutflow(String),
    RelatedNews(usize),
}

impl fmt::Display for FeatureTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConsecutiveLimitUps(n) => write!(f, "连续涨停{n}次"),
            Self::HighVolumeLimitUp => write!(f, "放量涨停"),
            Self::LowVolumeLimitUp => write!(f, "缩量涨停"),
            Self::BullishMaStack => write!(f, "均线多头排列"),
            Self::BearishMaStack => write!(f, "均线空头排列"),
            Self::RsiOverbought => write!(f, "RSI超买"),
            Self::RsiOversold => write!(f, "RSI超卖"),
            Self::MacdGoldenCross => write!(f, "MACD金叉"),
            Self::MacdDeathCross => write!(f, "MACD死叉"),
            Self::SectorInflow(sector) => write!(f, "{sector}资金净流入"),
            Self::SectorOutflow(sector) => write!(f, "{sector}资金净流出"),
            Self::RelatedNews(n) => write!(f, "相关消息{n}条"),
        }
    }
}

/// Reason tags explaining where rating and risk points came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatingReason {
    ThreePlusBoards,
    TwoBoards,
    VolumeSurge,
    VolumeHealthy,
    VolumeWeak,
    MaStrong,
    MaImproving,
    MaWeak,
    RsiHealthy,
    RsiOverbought,
    RsiOversold,
    MacdGoldenCross,
    MacdStrong,
    MacdDeathCross,
    SectorStrongInflow,
    SectorInflow,
    SectorStrongOutflow,
    SectorOutflow,
    LowBreakout,
    HighRisk,
    SessionVolumeSurge,
    SessionVolumeUp,
    SessionVolumeShrink,
    TurnoverFull,
    TurnoverActive,
    TurnoverThin,
}

impl fmt::Display for RatingReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ThreePlusBoards => "连续三板以上",
            Self::TwoBoards => "连续两板",
            Self::VolumeSurge => "量能显著放大",
            Self::VolumeHealthy => "量能良好",
            Self::VolumeWeak => "量能不足",
            Self::MaStrong => "均线系统强势",
            Self::MaImproving => "均线系统向好",
            Self::MaWeak => "均线系统弱势",
            Self::RsiHealthy => "RSI健康",
            Self::RsiOverbought => "RSI超买",
            Self::RsiOversold => "RSI超卖",
            Self::MacdGoldenCross => "MACD金叉",
            Self::MacdStrong => "MACD强势",
            Self::MacdDeathCross => "MACD死叉",
            Self::SectorStrongInflow => "行业资金大幅流入",
            Self::SectorInflow => "行业资金净流入",
            Self::SectorStrongOutflow => "行业资金大幅流出",
            Self::SectorOutflow => "行业资金净流出",
            Self::LowBreakout => "低位突破",
            Self::HighRisk => "高位风险",
            Self::SessionVolumeSurge => "成交量显著放大",
            Self::SessionVolumeUp => "成交量放大",
            Self::SessionVolumeShrink => "成交量萎缩",
            Self::TurnoverFull => "换手充分",
            Self::TurnoverActive => "换手活跃",
            Self::TurnoverThin => "换手不足",
        };
        write!(f, "{text}")
    }
}

/// Final rating label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LimitUpRating {
    StrongRecommend,
    Watch,
    StrongRisk,
    Caution,
    Neutral,
}

impl fmt::Display for LimitUpRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StrongRecommend => write!(f, "强烈推荐"),
            Self::Watch => write!(f, "建议关注"),
            Self::StrongRisk => write!(f, "强烈风险"),
            Self::Caution => write!(f, "注意风险"),
            Self::Neutral => write!(f, "中性"),
        }
    }
}

/// Short-horizon outlook from the composite trend score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendOutlook {
    StrongRally,
    ChoppyRally,
    Sideways,
    PullbackRisk,
}

impl fmt::Display for TrendOutlook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StrongRally => write!(f, "强势上涨"),
            Self::ChoppyRally => write!(f, "震荡上涨"),
            Self::Sideways => write!(f, "震荡整理"),
            Self::PullbackRisk => write!(f, "可能回调"),
        }
    }
}

/// MACD condition on the most recent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacdState {
    FreshGoldenCross,
    AboveZero,
    FreshDeathCross,
    Neutral,
}

impl MacdState {
    fn from_series(series: &MacdSeries) -> Self {
        if series.golden_cross() {
            Self::FreshGoldenCross
        } else if series.above_zero() {
            Self::AboveZero
        } else if series.death_cross() {
            Self::FreshDeathCross
        } else {
            Self::Neutral
        }
    }
}

// ============================================================================
// Factor Inputs
// ============================================================================

/// Everything the nine scoring factors look at, extracted from the
/// snapshot and the candidate's history.
#[derive(Debug, Clone)]
pub struct FactorInputs {
    pub streak: u32,
    pub volume_ratio: f64,
    pub turnover_rate: f64,
    pub ma_bullish: bool,
    pub ma_bearish: bool,
    /// MA5 above MA10 without requiring the full stack
    pub ma5_above_ma10: bool,
    /// Percent growth of MA5 over its last five slots
    pub ma5_growth_pct: Option<f64>,
    pub rsi: Option<f64>,
    pub macd_state: MacdState,
    /// Latest MACD histogram value (line minus signal)
    pub macd_histogram: f64,
    /// Parsed sector net inflow in yuan, when the sector is known
    pub sector_flow: Option<f64>,
    /// Percent position of the latest close in the fetched window
    pub position_pct: f64,
    /// Latest session volume relative to the window mean
    pub volume_vs_mean: f64,
}

/// Count limit-up sessions walking backward from the most recent bar.
pub fn consecutive_limit_ups(bars: &[Bar]) -> u32 {
    bars.iter()
        .rev()
        .take_while(|b| b.percent_change >= LIMIT_UP_PCT)
        .count() as u32
}

// ============================================================================
// Analysis Result
// ============================================================================

/// Full analysis of one limit-up instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitUpAnalysis {
    pub symbol: String,
    pub name: String,
    pub last_price: f64,
    pub percent_change: f64,
    pub volume_ratio: f64,
    pub turnover_rate: f64,
    pub streak: u32,
    pub features: Vec<FeatureTag>,
    pub outlook: TrendOutlook,
    pub rating_score: u32,
    pub risk_score: u32,
    pub reasons: Vec<RatingReason>,
    pub rating: LimitUpRating,
}

// ============================================================================
// Scorer
// ============================================================================

/// Rates main-board limit-up instruments.
pub struct LimitUpRatingScorer;

impl LimitUpRatingScorer {
    /// Analyze every main-board limit-up instrument in the snapshot.
    ///
    /// Per-instrument fetch failures skip that instrument; the batch
    /// itself always completes.
    pub async fn analyze<P: MarketDataProvider + ?Sized>(
        snapshots: &[InstrumentSnapshot],
        provider: &P,
    ) -> Vec<LimitUpAnalysis> {
        let sector_flows = Self::sector_flow_map(provider).await;
        let end = Utc::now().date_naive();
        let start = end - Duration::days(HISTORY_CALENDAR_DAYS);

        let mut results = Vec::new();
        for snapshot in snapshots {
            if !snapshot.is_limit_up() || !is_main_board(&snapshot.symbol) {
                continue;
            }
            let bars = match provider
                .get_daily_history(&snapshot.symbol, start, end)
                .await
            {
                Ok(bars) if !bars.is_empty() => bars,
                Ok(_) => continue,
                Err(e) => {
                    warn!(
                        symbol = %snapshot.symbol,
                        error = %e,
                        "history fetch failed, skipping instrument"
                    );
                    continue;
                }
            };
            let news_count = provider
                .get_news_count(&snapshot.symbol)
                .await
                .unwrap_or(0);
            let sector_flow = snapshot
                .industry
                .as_ref()
                .and_then(|industry| sector_flows.get(industry).copied());
            results.push(Self::rate(snapshot, &bars, sector_flow, news_count));
        }
        results
    }

    async fn sector_flow_map<P: MarketDataProvider + ?Sized>(
        provider: &P,
    ) -> HashMap<String, f64> {
        match provider.get_sector_fund_flow().await {
            Ok(flows) => flows
                .into_iter()
                .map(|flow| (flow.sector, parse_flow_value(&flow.net_inflow_raw)))
                .collect(),
            Err(e) => {
                warn!(error = %e, "sector fund flow unavailable");
                HashMap::new()
            }
        }
    }

    /// Rate one candidate from its snapshot and a non-empty history.
    pub fn rate(
        snapshot: &InstrumentSnapshot,
        bars: &[Bar],
        sector_flow: Option<f64>,
        news_count: usize,
    ) -> LimitUpAnalysis {
        let closes = data::closes(bars);
        let volumes = data::volumes(bars);
        let ma5 = sma(&closes, 5);
        let ma10 = sma(&closes, 10);
        let ma20 = sma(&closes, 20);
        let rsi = rsi(&closes, RSI_PERIOD);
        let macd = macd(&closes);

        let streak = consecutive_limit_ups(bars);
        let ma_bullish = matches!(
            (last_value(&ma5), last_value(&ma10), last_value(&ma20)),
            (Some(m5), Some(m10), Some(m20)) if m5 > m10 && m10 > m20
        );
        let ma_bearish = matches!(
            (last_value(&ma5), last_value(&ma10), last_value(&ma20)),
            (Some(m5), Some(m10), Some(m20)) if m5 < m10 && m10 < m20
        );
        let ma5_above_ma10 = matches!(
            (last_value(&ma5), last_value(&ma10)),
            (Some(m5), Some(m10)) if m5 > m10
        );
        let latest_rsi = last_value(&rsi);
        let macd_state = MacdState::from_series(&macd);
        let macd_histogram = macd.histogram.last().copied().unwrap_or_default();

        let latest_close = closes.last().copied().unwrap_or_default();
        let position_pct = price_position(&closes, closes.len(), latest_close)
            .unwrap_or(NEUTRAL_POSITION_PCT);

        let vol_mean = volumes.iter().sum::<f64>() / volumes.len() as f64;
        let latest_volume = volumes.last().copied().unwrap_or_default();
        let volume_vs_mean = if vol_mean > 0.0 {
            latest_volume / vol_mean
        } else {
            1.0
        };

        let inputs = FactorInputs {
            streak,
            volume_ratio: snapshot.volume_ratio,
            turnover_rate: snapshot.turnover_rate,
            ma_bullish,
            ma_bearish,
            ma5_above_ma10,
            ma5_growth_pct: growth_pct(&ma5, 5),
            rsi: latest_rsi,
            macd_state,
            macd_histogram,
            sector_flow,
            position_pct,
            volume_vs_mean,
        };

        let features = Self::features(snapshot, &inputs, news_count);
        let (rating_score, risk_score, reasons) = Self::score_factors(&inputs);
        let rating = Self::label(rating_score, risk_score);
        let outlook = Self::outlook(&inputs);

        LimitUpAnalysis {
            symbol: snapshot.symbol.clone(),
            name: snapshot.name.clone(),
            last_price: snapshot.last_price,
            percent_change: snapshot.percent_change,
            volume_ratio: snapshot.volume_ratio,
            turnover_rate: snapshot.turnover_rate,
            streak,
            features,
            outlook,
            rating_score,
            risk_score,
            reasons,
            rating,
        }
    }

    fn features(
        snapshot: &InstrumentSnapshot,
        inputs: &FactorInputs,
        news_count: usize,
    ) -> Vec<FeatureTag> {
        let mut features = vec![FeatureTag::ConsecutiveLimitUps(inputs.streak)];

        if snapshot.volume_ratio > VOLUME_RATIO_HEALTHY {
            features.push(FeatureTag::HighVolumeLimitUp);
        } else if snapshot.volume_ratio < VOLUME_RATIO_WEAK {
            features.push(FeatureTag::LowVolumeLimitUp);
        }

        if inputs.ma_bullish {
            features.push(FeatureTag::BullishMaStack);
        } else if inputs.ma_bearish {
            features.push(FeatureTag::BearishMaStack);
        }

        if let Some(rsi) = inputs.rsi {
            if rsi > RSI_OVERBOUGHT {
                features.push(FeatureTag::RsiOverbought);
            } else if rsi < RSI_FEATURE_OVERSOLD {
                features.push(FeatureTag::RsiOversold);
            }
        }

        match inputs.macd_state {
            MacdState::FreshGoldenCross => features.push(FeatureTag::MacdGoldenCross),
            MacdState::FreshDeathCross => features.push(FeatureTag::MacdDeathCross),
            _ => {}
        }

        if let Some(flow) = inputs.sector_flow {
            let sector = snapshot.industry.clone().unwrap_or_default();
            if flow > 0.0 {
                features.push(FeatureTag::SectorInflow(sector));
            } else {
                features.push(FeatureTag::SectorOutflow(sector));
            }
        }

        if news_count > 0 {
            features.push(FeatureTag::RelatedNews(news_count));
        }

        features
    }

    /// The nine additive scoring factors.
    pub fn score_factors(inputs: &FactorInputs) -> (u32, u32, Vec<RatingReason>) {
        let mut rating = 0u32;
        let mut risk = 0u32;
        let mut reasons = Vec::new();

        // 1. Consecutive boards. Three or more is momentum and crowding
        // at once, so it scores on both sides.
        if inputs.streak >= STREAK_STRONG {
            rating += 2;
            risk += 1;
            reasons.push(RatingReason::ThreePlusBoards);
        } else if inputs.streak == 2 {
            rating += 1;
            reasons.push(RatingReason::TwoBoards);
        }

        // 2. Volume ratio.
        if inputs.volume_ratio > VOLUME_RATIO_SURGE {
            rating += 2;
            reasons.push(RatingReason::VolumeSurge);
        } else if inputs.volume_ratio > VOLUME_RATIO_HEALTHY {
            rating += 1;
            reasons.push(RatingReason::VolumeHealthy);
        } else if inputs.volume_ratio < VOLUME_RATIO_WEAK {
            risk += 1;
            reasons.push(RatingReason::VolumeWeak);
        }

        // 3. MA stack.
        if inputs.ma_bullish {
            if inputs
                .ma5_growth_pct
                .is_some_and(|growth| growth > MA5_GROWTH_STRONG_PCT)
            {
                rating += 2;
                reasons.push(RatingReason::MaStrong);
            } else {
                rating += 1;
                reasons.push(RatingReason::MaImproving);
            }
        } else if inputs.ma_bearish {
            risk += 1;
            reasons.push(RatingReason::MaWeak);
        }

        // 4. RSI zone.
        if let Some(rsi) = inputs.rsi {
            if rsi > RSI_HEALTHY_LOW && rsi < RSI_HEALTHY_HIGH {
                rating += 1;
                reasons.push(RatingReason::RsiHealthy);
            } else if rsi > RSI_OVERBOUGHT {
                risk += 2;
                reasons.push(RatingReason::RsiOverbought);
            } else if rsi < RSI_OVERSOLD {
                risk += 1;
                reasons.push(RatingReason::RsiOversold);
            }
        }

        // 5. MACD.
        match inputs.macd_state {
            MacdState::FreshGoldenCross => {
                rating += 2;
                reasons.push(RatingReason::MacdGoldenCross);
            }
            MacdState::AboveZero => {
                rating += 1;
                reasons.push(RatingReason::MacdStrong);
            }
            MacdState::FreshDeathCross => {
                risk += 1;
                reasons.push(RatingReason::MacdDeathCross);
            }
            MacdState::Neutral => {}
        }

        // 6. Sector flow.
        if let Some(flow) = inputs.sector_flow {
            if flow > SECTOR_FLOW_STRONG_YUAN {
                rating += 2;
                reasons.push(RatingReason::SectorStrongInflow);
            } else if flow > 0.0 {
                rating += 1;
                reasons.push(RatingReason::SectorInflow);
            } else if flow < -SECTOR_FLOW_STRONG_YUAN {
                risk += 2;
                reasons.push(RatingReason::SectorStrongOutflow);
            } else if flow < 0.0 {
                risk += 1;
                reasons.push(RatingReason::SectorOutflow);
            }
        }

        // 7. Price position.
        if inputs.position_pct < LOW_POSITION_PCT {
            rating += 2;
            reasons.push(RatingReason::LowBreakout);
        } else if inputs.position_pct > HIGH_POSITION_PCT {
            risk += 2;
            reasons.push(RatingReason::HighRisk);
        }

        // 8. Session volume vs window mean.
        if inputs.volume_vs_mean > VOLUME_VS_MEAN_SURGE {
            rating += 2;
            reasons.push(RatingReason::SessionVolumeSurge);
        } else if inputs.volume_vs_mean > VOLUME_VS_MEAN_UP {
            rating += 1;
            reasons.push(RatingReason::SessionVolumeUp);
        } else if inputs.volume_vs_mean < VOLUME_VS_MEAN_SHRINK {
            risk += 1;
            reasons.push(RatingReason::SessionVolumeShrink);
        }

        // 9. Turnover.
        if inputs.turnover_rate > TURNOVER_FULL_PCT {
            rating += 2;
            reasons.push(RatingReason::TurnoverFull);
        } else if inputs.turnover_rate > TURNOVER_ACTIVE_PCT {
            rating += 1;
            reasons.push(RatingReason::TurnoverActive);
        } else if inputs.turnover_rate < TURNOVER_THIN_PCT {
            risk += 1;
            reasons.push(RatingReason::TurnoverThin);
        }

        (rating, risk, reasons)
    }

    fn label(rating: u32, risk: u32) -> LimitUpRating {
        if rating >= STRONG_RECOMMEND_MIN_RATING && risk <= STRONG_RECOMMEND_MAX_RISK {
            LimitUpRating::StrongRecommend
        } else if rating >= WATCH_MIN_RATING && risk <= WATCH_MAX_RISK {
            LimitUpRating::Watch
        } else if risk >= STRONG_RISK_MIN_RISK {
            LimitUpRating::StrongRisk
        } else if risk >= CAUTION_MIN_RISK {
            LimitUpRating::Caution
        } else {
            LimitUpRating::Neutral
        }
    }

    /// Short-horizon outlook from a coarse trend score.
    fn outlook(inputs: &FactorInputs) -> TrendOutlook {
        let mut score = 0i32;

        if inputs.ma_bullish {
            score += 2;
        } else if inputs.ma5_above_ma10 {
            score += 1;
        }

        if let Some(rsi) = inputs.rsi {
            if (30.0..=70.0).contains(&rsi) {
                score += 1;
            } else if rsi > 70.0 {
                score -= 1;
            }
        }

        if inputs.macd_histogram > 0.0 {
            score += 1;
        } else if inputs.macd_histogram < 0.0 {
            score -= 1;
        }

        if inputs.volume_vs_mean > 1.0 {
            score += 1;
        }

        if score >= 3 {
            TrendOutlook::StrongRally
        } else if score >= 1 {
            TrendOutlook::ChoppyRally
        } else if score >= -1 {
            TrendOutlook::Sideways
        } else {
            TrendOutlook::PullbackRisk
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
