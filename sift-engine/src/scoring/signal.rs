//! Per-candidate trading-signal scoring.
//!
//! Scores filtered candidates on momentum, liquidity and price position
//! within a 120-day window, then attaches a buy/watch/hold/risk label.

use std::fmt;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::{self, InstrumentSnapshot, MarketDataProvider};
use crate::indicators::price_position;

use super::PricePosition;

/// Calendar days of history behind the price-position window.
const POSITION_WINDOW_DAYS: i64 = 120;

// Factor thresholds.
const STRONG_CHANGE_PCT: f64 = 5.0;
const MILD_CHANGE_PCT: f64 = 2.0;
const ACTIVE_VOLUME_RATIO: f64 = 2.0;
const ACTIVE_TURNOVER_PCT: f64 = 5.0;

// Label cutoffs.
const BUY_MIN_RATING: u32 = 4;
const BUY_MAX_RISK: u32 = 1;
const WATCH_MIN_RATING: u32 = 2;
const WATCH_MAX_RISK: u32 = 2;
const RISK_WARNING_MIN_RISK: u32 = 3;

// ============================================================================
// Advice
// ============================================================================

/// Advice label attached to a scored candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Advice {
    Buy,
    Watch,
    RiskWarning,
    Hold,
}

impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "建议买入"),
            Self::Watch => write!(f, "可以关注"),
            Self::RiskWarning => write!(f, "注意风险"),
            Self::Hold => write!(f, "建议观望"),
        }
    }
}

// ============================================================================
// Trading Signal
// ============================================================================

/// Scored trading signal for one instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    pub symbol: String,
    pub name: String,
    pub last_price: f64,
    pub percent_change: f64,
    pub volume_ratio: f64,
    pub turnover_rate: f64,
    pub position: PricePosition,
    pub rating_score: u32,
    pub risk_score: u32,
    pub advice: Advice,
}

// ============================================================================
// Scorer
// ============================================================================

/// Scores candidates that survived the filter pipeline.
pub struct TradingSignalScorer;

impl TradingSignalScorer {
    /// Score every candidate, fetching one history per instrument for the
    /// price-position window. Fetch failures degrade the position to
    /// `Unknown` instead of dropping the candidate.
    pub async fn analyze<P: MarketDataProvider + ?Sized>(
        snapshots: &[InstrumentSnapshot],
        provider: &P,
    ) -> Vec<TradingSignal> {
        let mut results = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            let position = Self::position_of(snapshot, provider).await;
            results.push(Self::score(snapshot, position));
        }
        results
    }

    async fn position_of<P: MarketDataProvider + ?Sized>(
        snapshot: &InstrumentSnapshot,
        provider: &P,
    ) -> PricePosition {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(POSITION_WINDOW_DAYS);
        match provider
            .get_daily_history(&snapshot.symbol, start, end)
            .await
        {
            Ok(bars) if !bars.is_empty() => {
                let closes = data::closes(&bars);
                PricePosition::from_percent(price_position(
                    &closes,
                    closes.len(),
                    snapshot.last_price,
                ))
            }
            Ok(_) => PricePosition::Unknown,
            Err(e) => {
                warn!(
                    symbol = %snapshot.symbol,
                    error = %e,
                    "price position lookup failed"
                );
                PricePosition::Unknown
            }
        }
    }

    /// Pure scoring over snapshot metrics and a resolved price position.
    pub fn score(snapshot: &InstrumentSnapshot, position: PricePosition) -> TradingSignal {
        let mut rating = 0u32;
        let mut risk = 0u32;

        if snapshot.percent_change > STRONG_CHANGE_PCT {
            rating += 2;
        } else if snapshot.percent_change > MILD_CHANGE_PCT {
            rating += 1;
        }
        if snapshot.volume_ratio > ACTIVE_VOLUME_RATIO {
            rating += 1;
        }
        if snapshot.turnover_rate > ACTIVE_TURNOVER_PCT {
            rating += 1;
        }
        match position {
            PricePosition::Low => rating += 2,
            PricePosition::High => risk += 2,
            _ => {}
        }

        let advice = if rating >= BUY_MIN_RATING && risk <= BUY_MAX_RISK {
            Advice::Buy
        } else if rating >= WATCH_MIN_RATING && risk <= WATCH_MAX_RISK {
            Advice::Watch
        } else if risk >= RISK_WARNING_MIN_RISK {
            Advice::RiskWarning
        } else {
            Advice::Hold
        };

        TradingSignal {
            symbol: snapshot.symbol.clone(),
            name: snapshot.name.clone(),
            last_price: snapshot.last_price,
            percent_change: snapshot.percent_change,
            volume_ratio: snapshot.volume_ratio,
            turnover_rate: snapshot.turnover_rate,
            position,
            rating_score: rating,
            risk_score: risk,
            advice,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bars_from_closes, snapshot, FixtureProvider};

    #[test]
    fn test_score_buy_label() {
        let mut candidate = snapshot("000001", "甲");
        candidate.percent_change = 6.0; // +2
        candidate.volume_ratio = 2.5; // +1
        candidate.turnover_rate = 6.0; // +1
        let signal = TradingSignalScorer::score(&candidate, PricePosition::Low); // +2

        assert_eq!(signal.rating_score, 6);
        assert_eq!(signal.risk_score, 0);
        assert_eq!(signal.advice, Advice::Buy);
    }

    #[test]
    fn test_score_watch_label() {
        let mut candidate = snapshot("000001", "甲");
        candidate.percent_change = 3.0; // +1
        candidate.volume_ratio = 2.5; // +1
        let signal = TradingSignalScorer::score(&candidate, PricePosition::Mid);

        assert_eq!(signal.rating_score, 2);
        assert_eq!(signal.advice, Advice::Watch);
    }

    #[test]
    fn test_score_high_position_risk() {
        let mut candidate = snapshot("000001", "甲");
        candidate.percent_change = 0.5;
        let signal = TradingSignalScorer::score(&candidate, PricePosition::High);

        assert_eq!(signal.rating_score, 0);
        assert_eq!(signal.risk_score, 2);
        // rating < 2 and risk < 3: neither buy, watch, nor risk warning.
        assert_eq!(signal.advice, Advice::Hold);
    }

    #[test]
    fn test_unknown_position_scores_nothing() {
        let mut candidate = snapshot("000001", "甲");
        candidate.percent_change = 6.0;
        let signal = TradingSignalScorer::score(&candidate, PricePosition::Unknown);
        assert_eq!(signal.rating_score, 2);
        assert_eq!(signal.risk_score, 0);
    }

    #[tokio::test]
    async fn test_analyze_resolves_position_from_history() {
        let mut provider = FixtureProvider::default();
        // Window range 10..30; last price 12 sits at 10%.
        let closes: Vec<f64> = vec![10.0, 30.0, 20.0, 15.0];
        provider
            .daily
            .insert("000001".to_string(), bars_from_closes(&closes));

        let mut candidate = snapshot("000001", "甲");
        candidate.last_price = 12.0;

        let signals = TradingSignalScorer::analyze(&[candidate], &provider).await;
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].position, PricePosition::Low);
    }

    #[tokio::test]
    async fn test_analyze_missing_history_is_unknown() {
        let provider = FixtureProvider::default();
        let signals =
            TradingSignalScorer::analyze(&[snapshot("000001", "甲")], &provider).await;
        assert_eq!(signals[0].position, PricePosition::Unknown);

        let provider = FixtureProvider {
            fail_daily: true,
            ..Default::default()
        };
        let signals =
            TradingSignalScorer::analyze(&[snapshot("000001", "甲")], &provider).await;
        assert_eq!(signals[0].position, PricePosition::Unknown);
    }
}
