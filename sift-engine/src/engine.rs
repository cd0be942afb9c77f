//! Engine orchestration: refresh cycle, screening and batch analyses.
//!
//! `ScreenerEngine` is what the UI shell talks to. It owns the filter
//! criteria, the provider handle and the per-cycle trend cache, and runs
//! each operation to completion with strictly sequential provider calls.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use sift_common::config::Config;

use crate::data::{is_main_board, InstrumentSnapshot, MarketDataProvider};
use crate::money_flow::{bucket, MoneyFlowBuckets, MoneyFlowEntry};
use crate::scoring::{
    LimitUpAnalysis, LimitUpRatingScorer, MarketTrendClassifier, MarketTrendReport,
    TradingSignal, TradingSignalScorer,
};
use crate::screener::{FilterCriteria, FilterPipeline, FilterStageResult};
use crate::trend::{volume_price_rising, TrendClassifier};

/// Calendar days of history behind the volume-price-rising check.
const VOLUME_PRICE_LOOKBACK_DAYS: i64 = 5;
/// Day-pairs the volume-price-rising check inspects.
const VOLUME_PRICE_DAYS: usize = 3;

// ============================================================================
// Overview Types
// ============================================================================

/// Market-wide overview built on refresh.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketOverview {
    /// Advancing instruments, sorted by percent change descending
    pub advancing: Vec<InstrumentSnapshot>,
    /// Advancing instruments on the main board
    pub main_board_advancing: Vec<InstrumentSnapshot>,
    /// Main-board instruments at limit-up
    pub main_board_limit_ups: Vec<InstrumentSnapshot>,
}

/// Main-board bullish-trend names, partitioned by session outcome, each
/// group with its volume-price-backed subset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BullishBreakdown {
    /// Up on the session, below the limit
    pub rising: Vec<String>,
    pub rising_volume_backed: Vec<String>,
    /// At limit-up
    pub limit_up: Vec<String>,
    pub limit_up_volume_backed: Vec<String>,
    /// Down or flat on the session
    pub falling: Vec<String>,
    pub falling_volume_backed: Vec<String>,
}

// ============================================================================
// Screener Engine
// ============================================================================

/// The screening engine.
///
/// One engine instance serves one caller at a time; overlapping refresh
/// cycles must be serialized by the caller.
pub struct ScreenerEngine<P: MarketDataProvider> {
    provider: Arc<P>,
    criteria: FilterCriteria,
    trend: TrendClassifier,
    market: MarketTrendClassifier,
}

impl<P: MarketDataProvider> ScreenerEngine<P> {
    pub fn new(provider: Arc<P>, criteria: FilterCriteria, index_symbol: impl Into<String>) -> Self {
        Self {
            provider,
            criteria,
            trend: TrendClassifier::new(),
            market: MarketTrendClassifier::new(index_symbol),
        }
    }

    /// Build an engine from the shared configuration.
    pub fn from_config(provider: Arc<P>, criteria: FilterCriteria, config: &Config) -> Self {
        Self::new(provider, criteria, config.market.index_symbol.clone())
    }

    /// Replace the active filter criteria.
    pub fn set_criteria(&mut self, criteria: FilterCriteria) {
        self.criteria = criteria;
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Begin a refresh cycle: invalidate the trend cache, pull a fresh
    /// snapshot and build the market overview.
    pub async fn refresh(&self) -> Result<MarketOverview> {
        self.trend.invalidate();

        let snapshots = self
            .provider
            .get_snapshot()
            .await
            .context("snapshot fetch failed")?;
        info!(
            provider = self.provider.name(),
            count = snapshots.len(),
            "snapshot refreshed"
        );

        let mut advancing: Vec<InstrumentSnapshot> = snapshots
            .iter()
            .filter(|s| s.percent_change > 0.0)
            .cloned()
            .collect();
        advancing.sort_by(|a, b| {
            b.percent_change
                .partial_cmp(&a.percent_change)
                .unwrap_or(Ordering::Equal)
        });

        let main_board_advancing = advancing
            .iter()
            .filter(|s| is_main_board(&s.symbol))
            .cloned()
            .collect();
        let main_board_limit_ups = snapshots
            .iter()
            .filter(|s| s.is_limit_up() && is_main_board(&s.symbol))
            .cloned()
            .collect();

        Ok(MarketOverview {
            advancing,
            main_board_advancing,
            main_board_limit_ups,
        })
    }

    /// Filter the current snapshot and score the survivors.
    pub async fn screen(&self) -> Result<(Vec<TradingSignal>, Vec<FilterStageResult>)> {
        let snapshots = self
            .provider
            .get_snapshot()
            .await
            .context("snapshot fetch failed")?;

        let pipeline = FilterPipeline::new(self.criteria.clone());
        let (filtered, stages) = pipeline.apply(&snapshots, self.provider.as_ref()).await;
        info!(
            input = snapshots.len(),
            passed = filtered.len(),
            "screen complete"
        );

        let signals = TradingSignalScorer::analyze(&filtered, self.provider.as_ref()).await;
        Ok((signals, stages))
    }

    /// Search the snapshot by code or name.
    ///
    /// Terms are comma-separated (Chinese commas accepted); exact matches
    /// win per term, substring matches fill in, duplicates collapse by
    /// symbol in first-seen order.
    pub async fn search(&self, query: &str) -> Result<Vec<InstrumentSnapshot>> {
        let snapshots = self
            .provider
            .get_snapshot()
            .await
            .context("snapshot fetch failed")?;

        let normalized = query.replace('，', ",");
        let mut seen = HashSet::new();
        let mut matches = Vec::new();
        for term in normalized.split(',') {
            let term = term.trim();
            if term.is_empty() {
                continue;
            }
            let exact: Vec<&InstrumentSnapshot> = snapshots
                .iter()
                .filter(|s| s.symbol == term || s.name == term)
                .collect();
            let candidates = if exact.is_empty() {
                snapshots
                    .iter()
                    .filter(|s| s.symbol.contains(term) || s.name.contains(term))
                    .collect()
            } else {
                exact
            };
            for snapshot in candidates {
                if seen.insert(snapshot.symbol.clone()) {
                    matches.push(snapshot.clone());
                }
            }
        }
        Ok(matches)
    }

    /// Partition main-board bullish-trend stocks by session outcome.
    ///
    /// Trend classifications go through the per-cycle cache, so repeated
    /// calls within a cycle cost one history fetch per symbol at most.
    pub async fn bullish_breakdown(&self) -> Result<BullishBreakdown> {
        let snapshots = self
            .provider
            .get_snapshot()
            .await
            .context("snapshot fetch failed")?;

        let end = Utc::now().date_naive();
        let start = end - Duration::days(VOLUME_PRICE_LOOKBACK_DAYS);

        let mut breakdown = BullishBreakdown::default();
        for snapshot in snapshots.iter().filter(|s| is_main_board(&s.symbol)) {
            let signal = self.trend.classify(&snapshot.symbol, self.provider.as_ref()).await;
            if !signal.is_positive {
                continue;
            }

            let recent = match self
                .provider
                .get_daily_history(&snapshot.symbol, start, end)
                .await
            {
                Ok(bars) => bars,
                Err(e) => {
                    warn!(
                        symbol = %snapshot.symbol,
                        error = %e,
                        "recent history fetch failed, skipping instrument"
                    );
                    continue;
                }
            };
            let volume_backed = volume_price_rising(&recent, VOLUME_PRICE_DAYS);

            let name = snapshot.name.clone();
            if snapshot.percent_change > 0.0 {
                if snapshot.is_limit_up() {
                    breakdown.limit_up.push(name.clone());
                    if volume_backed {
                        breakdown.limit_up_volume_backed.push(name);
                    }
                } else {
                    breakdown.rising.push(name.clone());
                    if volume_backed {
                        breakdown.rising_volume_backed.push(name);
                    }
                }
            } else {
                breakdown.falling.push(name.clone());
                if volume_backed {
                    breakdown.falling_volume_backed.push(name);
                }
            }
        }

        info!(
            rising = breakdown.rising.len(),
            limit_up = breakdown.limit_up.len(),
            falling = breakdown.falling.len(),
            "bullish breakdown complete"
        );
        Ok(breakdown)
    }

    /// Rate every main-board limit-up instrument.
    pub async fn analyze_limit_ups(&self) -> Result<Vec<LimitUpAnalysis>> {
        let snapshots = self
            .provider
            .get_snapshot()
            .await
            .context("snapshot fetch failed")?;
        Ok(LimitUpRatingScorer::analyze(&snapshots, self.provider.as_ref()).await)
    }

    /// Classify the benchmark index and the sector landscape.
    pub async fn market_report(&self) -> MarketTrendReport {
        self.market.analyze(self.provider.as_ref()).await
    }

    /// Fetch, normalize and bucket per-instrument fund flows.
    pub async fn money_flow_buckets(&self) -> MoneyFlowBuckets {
        match self.provider.get_fund_flow_rank().await {
            Ok(records) => bucket(
                records
                    .into_iter()
                    .map(MoneyFlowEntry::from_record)
                    .collect(),
            ),
            Err(e) => {
                warn!(error = %e, "fund flow rank unavailable");
                MoneyFlowBuckets::default()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FundFlowRecord;
    use crate::test_support::{bars_from_closes, snapshot, FixtureProvider};
    use std::sync::atomic::Ordering as AtomicOrdering;

    fn engine_with(provider: FixtureProvider) -> ScreenerEngine<FixtureProvider> {
        ScreenerEngine::new(
            Arc::new(provider),
            FilterCriteria::default(),
            "sh000001",
        )
    }

    #[tokio::test]
    async fn test_refresh_builds_overview() {
        let mut provider = FixtureProvider::default();

        let mut up_main = snapshot("000001", "甲");
        up_main.percent_change = 3.0;
        let mut up_more = snapshot("600000", "乙");
        up_more.percent_change = 5.0;
        let mut up_chinext = snapshot("300750", "创");
        up_chinext.percent_change = 4.0;
        let mut down = snapshot("000002", "丁");
        down.percent_change = -2.0;
        let mut limit_main = snapshot("000003", "戊");
        limit_main.percent_change = 10.0;
        let mut limit_star = snapshot("688981", "己");
        limit_star.percent_change = 10.0;

        provider.snapshots = vec![up_main, up_more, up_chinext, down, limit_main, limit_star];
        let engine = engine_with(provider);

        let overview = engine.refresh().await.unwrap();

        let advancing: Vec<_> = overview.advancing.iter().map(|s| s.symbol.as_str()).collect();
        // Sorted by change descending; limit-ups advance too.
        assert_eq!(advancing, vec!["000003", "688981", "600000", "300750", "000001"]);

        let main_advancing: Vec<_> = overview
            .main_board_advancing
            .iter()
            .map(|s| s.symbol.as_str())
            .collect();
        assert_eq!(main_advancing, vec!["000003", "600000", "000001"]);

        let limit_ups: Vec<_> = overview
            .main_board_limit_ups
            .iter()
            .map(|s| s.symbol.as_str())
            .collect();
        assert_eq!(limit_ups, vec!["000003"]);
    }

    #[tokio::test]
    async fn test_refresh_invalidates_trend_cache() {
        let mut provider = FixtureProvider::default();
        provider.snapshots = vec![snapshot("000001", "甲")];
        let rising: Vec<f64> = (0..40).map(|i| i as f64 + 1.0).collect();
        provider
            .daily
            .insert("000001".to_string(), bars_from_closes(&rising));

        let engine = engine_with(provider);

        engine.refresh().await.unwrap();
        engine
            .trend
            .classify("000001", engine.provider.as_ref())
            .await;
        assert_eq!(engine.trend.cached_len(), 1);

        engine.refresh().await.unwrap();
        assert_eq!(engine.trend.cached_len(), 0);
    }

    #[tokio::test]
    async fn test_screen_filters_and_scores() {
        let mut provider = FixtureProvider::default();

        let mut keep = snapshot("000001", "甲");
        keep.percent_change = 6.0;
        keep.turnover_rate = 6.0;
        keep.volume_ratio = 2.5;
        let mut green = snapshot("000002", "乙");
        green.percent_change = -3.0;

        provider.snapshots = vec![keep, green];

        let mut engine = engine_with(provider);
        let mut criteria = FilterCriteria::default();
        criteria.remove_green = true;
        engine.set_criteria(criteria);

        let (signals, stages) = engine.screen().await.unwrap();
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].symbol, "000001");
        assert!(signals[0].rating_score >= 4);
        assert_eq!(stages[0].eliminated, 1);
    }

    #[tokio::test]
    async fn test_search_exact_fuzzy_and_dedup() {
        let mut provider = FixtureProvider::default();
        provider.snapshots = vec![
            snapshot("000001", "平安银行"),
            snapshot("600036", "招商银行"),
            snapshot("000333", "美的集团"),
        ];
        let engine = engine_with(provider);

        // Exact symbol match wins over substring expansion.
        let results = engine.search("000001").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "平安银行");

        // Substring fallback and Chinese comma handling; the duplicate
        // term collapses.
        let results = engine.search("银行，美的集团，银行").await.unwrap();
        let names: Vec<_> = results.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["平安银行", "招商银行", "美的集团"]);

        let results = engine.search("   ").await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_bullish_breakdown_partitions() {
        let mut provider = FixtureProvider::default();

        // Bullish trend series for every symbol under test.
        let rising: Vec<f64> = (0..40).map(|i| 10.0 + i as f64).collect();
        let mut volume_backed_bars = bars_from_closes(&rising);
        let n = volume_backed_bars.len();
        for (offset, bar) in volume_backed_bars[n - 4..].iter_mut().enumerate() {
            bar.volume = 1000.0 + offset as f64 * 100.0;
        }

        let flat_volume_bars = bars_from_closes(&rising);
        let falling_series: Vec<f64> = (0..40).map(|i| 100.0 - i as f64).collect();

        provider
            .daily
            .insert("000001".to_string(), volume_backed_bars);
        provider.daily.insert("000002".to_string(), flat_volume_bars.clone());
        provider.daily.insert("000003".to_string(), flat_volume_bars);
        provider
            .daily
            .insert("000004".to_string(), bars_from_closes(&falling_series));

        let mut rising_backed = snapshot("000001", "甲");
        rising_backed.percent_change = 4.0;
        let mut limit = snapshot("000002", "乙");
        limit.percent_change = 10.0;
        let mut down = snapshot("000003", "丙");
        down.percent_change = -1.0;
        let mut not_bullish = snapshot("000004", "丁");
        not_bullish.percent_change = 2.0;
        let mut chinext = snapshot("300001", "戊");
        chinext.percent_change = 2.0;

        provider.snapshots = vec![rising_backed, limit, down, not_bullish, chinext];
        let engine = engine_with(provider);

        let breakdown = engine.bullish_breakdown().await.unwrap();
        assert_eq!(breakdown.rising, vec!["甲"]);
        assert_eq!(breakdown.rising_volume_backed, vec!["甲"]);
        assert_eq!(breakdown.limit_up, vec!["乙"]);
        assert!(breakdown.limit_up_volume_backed.is_empty());
        assert_eq!(breakdown.falling, vec!["丙"]);
        // 丁 never classified bullish, 戊 is off the main board.
    }

    #[tokio::test]
    async fn test_bullish_breakdown_uses_cache_across_calls() {
        let mut provider = FixtureProvider::default();
        let rising: Vec<f64> = (0..40).map(|i| 10.0 + i as f64).collect();
        provider
            .daily
            .insert("000001".to_string(), bars_from_closes(&rising));
        let mut up = snapshot("000001", "甲");
        up.percent_change = 2.0;
        provider.snapshots = vec![up];

        let engine = engine_with(provider);
        engine.bullish_breakdown().await.unwrap();
        let first = engine.provider.daily_fetches.load(AtomicOrdering::SeqCst);

        engine.bullish_breakdown().await.unwrap();
        let second = engine.provider.daily_fetches.load(AtomicOrdering::SeqCst);

        // Classification is cached; only the volume-price fetch repeats.
        assert_eq!(first, 2);
        assert_eq!(second, 3);
    }

    #[tokio::test]
    async fn test_money_flow_buckets_end_to_end() {
        let mut provider = FixtureProvider::default();
        provider.fund_flow_rank = vec![
            FundFlowRecord {
                symbol: "000001".to_string(),
                name: "甲".to_string(),
                percent_change: 3.0,
                main_inflow_raw: "0.6亿".to_string(),
                super_large_inflow_raw: "0.4亿".to_string(),
                large_inflow_raw: "0.2亿".to_string(),
                medium_inflow_raw: "-0.1亿".to_string(),
            },
            FundFlowRecord {
                symbol: "000002".to_string(),
                name: "乙".to_string(),
                percent_change: -1.0,
                main_inflow_raw: "-2000万".to_string(),
                super_large_inflow_raw: "-1500万".to_string(),
                large_inflow_raw: "-500万".to_string(),
                medium_inflow_raw: "0".to_string(),
            },
            FundFlowRecord {
                symbol: "000003".to_string(),
                name: "丙".to_string(),
                percent_change: 0.5,
                main_inflow_raw: "50万".to_string(),
                super_large_inflow_raw: "0".to_string(),
                large_inflow_raw: "0".to_string(),
                medium_inflow_raw: "50万".to_string(),
            },
        ];

        let engine = engine_with(provider);
        let buckets = engine.money_flow_buckets().await;

        assert_eq!(buckets.tier_5000w.len(), 1);
        assert_eq!(buckets.tier_5000w[0].symbol, "000001");
        assert_eq!(buckets.tier_1000w.len(), 1);
        assert_eq!(buckets.tier_1000w[0].symbol, "000002");
        // 50万 is under the lowest tier threshold.
        assert!(buckets.tier_100w.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_failure_propagates() {
        let provider = FixtureProvider {
            fail_snapshot: true,
            ..Default::default()
        };
        let engine = engine_with(provider);
        assert!(engine.refresh().await.is_err());
        assert!(engine.screen().await.is_err());
    }
}
