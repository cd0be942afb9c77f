//! Moving-average trend classification with a per-cycle cache.
//!
//! A symbol is classified at most once per refresh cycle: the first call
//! fetches daily history and computes, every later call is served from the
//! cache without touching the provider. The cache is cleared wholesale at
//! the start of the next cycle, never per symbol.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{Duration, Utc};
use tracing::{debug, warn};

use crate::data::{self, Bar, MarketDataProvider};
use crate::indicators::{last_value, slope, sma};

/// Calendar days of daily history fetched per classification.
const TREND_LOOKBACK_CALENDAR_DAYS: i64 = 60;
/// Sessions inspected when detecting a turning point.
const TURNING_POINT_LOOKBACK: usize = 3;
/// Minimum bars for a classification (MA30 warm-up plus one slope step).
const MIN_CLASSIFIABLE_BARS: usize = 31;

// ============================================================================
// Trend Signal
// ============================================================================

/// Outcome of a trend classification.
#[derive(Debug, Clone)]
pub struct TrendSignal {
    /// Turning-up or bullish-aligned
    pub is_positive: bool,
    /// Most recent bar of the series the classification saw
    pub latest_bar: Option<Bar>,
}

impl TrendSignal {
    fn flat() -> Self {
        Self {
            is_positive: false,
            latest_bar: None,
        }
    }
}

// ============================================================================
// Trend Classifier
// ============================================================================

/// Classifies per-symbol MA trends, memoizing results for one cycle.
#[derive(Default)]
pub struct TrendClassifier {
    cache: RwLock<HashMap<String, TrendSignal>>,
}

impl TrendClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every cached classification.
    ///
    /// Call at the start of each refresh cycle; there is deliberately no
    /// per-symbol invalidation.
    pub fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.write() {
            cache.clear();
        }
    }

    /// Number of symbols classified so far this cycle.
    pub fn cached_len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Classify a symbol, fetching history at most once per cycle.
    pub async fn classify<P: MarketDataProvider + ?Sized>(
        &self,
        symbol: &str,
        provider: &P,
    ) -> TrendSignal {
        if let Ok(cache) = self.cache.read() {
            if let Some(hit) = cache.get(symbol) {
                debug!(symbol, "trend cache hit");
                return hit.clone();
            }
        }

        let end = Utc::now().date_naive();
        let start = end - Duration::days(TREND_LOOKBACK_CALENDAR_DAYS);
        let signal = match provider.get_daily_history(symbol, start, end).await {
            Ok(bars) => classify_series(&bars),
            Err(e) => {
                warn!(symbol, error = %e, "history fetch failed, treating trend as flat");
                TrendSignal::flat()
            }
        };

        if let Ok(mut cache) = self.cache.write() {
            cache.insert(symbol.to_string(), signal.clone());
        }
        signal
    }
}

// ============================================================================
// Pure Classification
// ============================================================================

/// Classify an already-fetched daily series.
///
/// Positive means either a synchronized turn-up of MA5/10/20 or a strict
/// bullish alignment MA5 > MA10 > MA20 > MA30 with all four slopes rising.
/// Series shorter than 31 bars classify as flat.
pub fn classify_series(bars: &[Bar]) -> TrendSignal {
    if bars.len() < MIN_CLASSIFIABLE_BARS {
        return TrendSignal::flat();
    }

    let closes = data::closes(bars);
    let ma5 = sma(&closes, 5);
    let ma10 = sma(&closes, 10);
    let ma20 = sma(&closes, 20);
    let ma30 = sma(&closes, 30);
    let slopes = [slope(&ma5), slope(&ma10), slope(&ma20), slope(&ma30)];

    // Turning points only consider the three shorter averages.
    let turning_up = slopes[..3].iter().all(|s| turned_up(s));

    let aligned = matches!(
        (
            last_value(&ma5),
            last_value(&ma10),
            last_value(&ma20),
            last_value(&ma30),
        ),
        (Some(m5), Some(m10), Some(m20), Some(m30)) if m5 > m10 && m10 > m20 && m20 > m30
    );
    let all_rising = slopes
        .iter()
        .all(|s| matches!(last_value(s), Some(v) if v > 0.0));
    let bullish = aligned && all_rising;

    TrendSignal {
        is_positive: turning_up || bullish,
        latest_bar: bars.last().cloned(),
    }
}

/// Latest slope positive while the mean of the prior (lookback−1) slopes
/// is non-positive.
fn turned_up(slopes: &[Option<f64>]) -> bool {
    let n = slopes.len();
    if n < TURNING_POINT_LOOKBACK {
        return false;
    }
    if !matches!(slopes[n - 1], Some(v) if v > 0.0) {
        return false;
    }

    let prior: Vec<f64> = slopes[n - TURNING_POINT_LOOKBACK..n - 1]
        .iter()
        .filter_map(|s| *s)
        .collect();
    if prior.is_empty() {
        return false;
    }
    let mean = prior.iter().sum::<f64>() / prior.len() as f64;
    mean <= 0.0
}

/// True when close and volume both rise strictly on each of the most
/// recent `days` consecutive day-pairs.
pub fn volume_price_rising(bars: &[Bar], days: usize) -> bool {
    if days == 0 || bars.len() < days + 1 {
        return false;
    }
    let n = bars.len();
    for i in 0..days {
        let today = &bars[n - 1 - i];
        let prior = &bars[n - 2 - i];
        if !(today.close > prior.close && today.volume > prior.volume) {
            return false;
        }
    }
    true
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{bars_from_closes, FixtureProvider};
    use std::sync::atomic::Ordering;

    #[test]
    fn test_short_series_classifies_flat() {
        let bars = bars_from_closes(&[10.0; 30]);
        let signal = classify_series(&bars);
        assert!(!signal.is_positive);
        assert!(signal.latest_bar.is_none());
    }

    #[test]
    fn test_turning_up_series() {
        // Long decline with a sharp recovery on the final bar: MA5/10/20
        // slopes flip positive after a non-positive stretch.
        let mut closes: Vec<f64> = (0..39).map(|i| 100.0 - i as f64).collect();
        closes.push(100.0);
        let bars = bars_from_closes(&closes);

        let signal = classify_series(&bars);
        assert!(signal.is_positive);
        assert_eq!(signal.latest_bar.unwrap().close, 100.0);
    }

    #[test]
    fn test_bullish_alignment_series() {
        // Strictly rising closes give MA5 > MA10 > MA20 > MA30 with every
        // slope positive.
        let closes: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let bars = bars_from_closes(&closes);
        assert!(classify_series(&bars).is_positive);
    }

    #[test]
    fn test_steady_decline_is_not_positive() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 - i as f64).collect();
        let bars = bars_from_closes(&closes);
        assert!(!classify_series(&bars).is_positive);
    }

    #[test]
    fn test_volume_price_rising() {
        let mut bars = bars_from_closes(&[10.0, 10.5, 11.0, 11.5]);
        for (i, bar) in bars.iter_mut().enumerate() {
            bar.volume = 1000.0 + i as f64 * 100.0;
        }
        assert!(volume_price_rising(&bars, 3));

        // One broken close kills the streak.
        bars[2].close = 10.4;
        assert!(!volume_price_rising(&bars, 3));

        // One shrinking volume kills it too.
        let mut bars = bars_from_closes(&[10.0, 10.5, 11.0, 11.5]);
        for (i, bar) in bars.iter_mut().enumerate() {
            bar.volume = 1000.0 + i as f64 * 100.0;
        }
        bars[3].volume = 900.0;
        assert!(!volume_price_rising(&bars, 3));

        // Too few bars.
        assert!(!volume_price_rising(&bars[..3], 3));
    }

    #[tokio::test]
    async fn test_classify_caches_per_symbol() {
        let closes: Vec<f64> = (0..40).map(|i| i as f64 + 1.0).collect();
        let mut provider = FixtureProvider::default();
        provider
            .daily
            .insert("000001".to_string(), bars_from_closes(&closes));

        let classifier = TrendClassifier::new();
        let first = classifier.classify("000001", &provider).await;
        let second = classifier.classify("000001", &provider).await;

        assert!(first.is_positive);
        assert!(second.is_positive);
        // The second call is a cache hit: only one fetch happened.
        assert_eq!(provider.daily_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(classifier.cached_len(), 1);

        // Invalidation re-enables fetching.
        classifier.invalidate();
        assert_eq!(classifier.cached_len(), 0);
        classifier.classify("000001", &provider).await;
        assert_eq!(provider.daily_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_classify_fetch_failure_is_flat() {
        let provider = FixtureProvider {
            fail_daily: true,
            ..Default::default()
        };
        let classifier = TrendClassifier::new();
        let signal = classifier.classify("000001", &provider).await;
        assert!(!signal.is_positive);
        assert!(signal.latest_bar.is_none());
    }
}
