//! Multi-stage filter pipeline.
//!
//! Predicates run in a fixed order, each narrowing the working set. The
//! cheap snapshot-only checks go first; checks that need a per-candidate
//! history fetch only see what survives them. A per-instrument fetch
//! failure drops that instrument and never aborts the batch.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::{self, Bar, InstrumentSnapshot, MarketDataProvider, LIMIT_UP_PCT};
use crate::indicators::{kdj, last_value, macd, sma};
use crate::money_flow::YI;

use super::criteria::{FilterCriteria, Range};

/// Intraday samples compared by the volume-increasing check.
const INTRADAY_SAMPLES: usize = 3;
/// Calendar days of daily history fetched for the technical block.
const TECHNICAL_LOOKBACK_CALENDAR_DAYS: i64 = 60;
/// Calendar days per month used by the limit-up count window.
const DAYS_PER_MONTH: i64 = 30;

// ============================================================================
// Filter Stage
// ============================================================================

/// Filter stage identifier for tracking where instruments are eliminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterStage {
    /// Snapshot-only range and boolean checks
    Quote,
    /// Intraday volume strictly increasing
    Intraday,
    /// MA alignment / MACD / KDJ sub-checks
    Technical,
    /// Top N by traded amount
    HotStocks,
    /// Top N per industry by market cap
    IndustryLeaders,
    /// Exact limit-up count over the trailing window
    LimitUpCount,
}

impl std::fmt::Display for FilterStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quote => write!(f, "行情筛选"),
            Self::Intraday => write!(f, "量能筛选"),
            Self::Technical => write!(f, "技术筛选"),
            Self::HotStocks => write!(f, "热门筛选"),
            Self::IndustryLeaders => write!(f, "行业龙头"),
            Self::LimitUpCount => write!(f, "涨停次数"),
        }
    }
}

/// Result of one filtering stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterStageResult {
    pub stage: FilterStage,
    pub passed: usize,
    pub eliminated: usize,
    /// Elimination rate (%)
    pub elimination_rate: f64,
}

impl FilterStageResult {
    pub fn new(stage: FilterStage, input_count: usize, passed_count: usize) -> Self {
        let eliminated = input_count.saturating_sub(passed_count);
        let elimination_rate = if input_count > 0 {
            (eliminated as f64 / input_count as f64) * 100.0
        } else {
            0.0
        };
        Self {
            stage,
            passed: passed_count,
            eliminated,
            elimination_rate,
        }
    }
}

// ============================================================================
// Filter Pipeline
// ============================================================================

/// The screening filter pipeline.
pub struct FilterPipeline {
    criteria: FilterCriteria,
}

impl FilterPipeline {
    pub fn new(criteria: FilterCriteria) -> Self {
        Self { criteria }
    }

    pub fn with_defaults() -> Self {
        Self::new(FilterCriteria::default())
    }

    /// Apply every enabled predicate in order.
    ///
    /// Returns the surviving snapshots and the per-stage funnel accounting.
    pub async fn apply<P: MarketDataProvider + ?Sized>(
        &self,
        snapshots: &[InstrumentSnapshot],
        provider: &P,
    ) -> (Vec<InstrumentSnapshot>, Vec<FilterStageResult>) {
        let mut stages = Vec::new();
        let input = snapshots.len();

        let mut working: Vec<InstrumentSnapshot> = snapshots
            .iter()
            .filter(|s| self.passes_quote_filter(s))
            .cloned()
            .collect();
        stages.push(FilterStageResult::new(FilterStage::Quote, input, working.len()));

        if self.criteria.volume_increasing {
            let before = working.len();
            working = self.filter_intraday_volume(working, provider).await;
            stages.push(FilterStageResult::new(
                FilterStage::Intraday,
                before,
                working.len(),
            ));
        }

        if self.criteria.wants_technical() {
            let before = working.len();
            working = self.filter_technical(working, provider).await;
            stages.push(FilterStageResult::new(
                FilterStage::Technical,
                before,
                working.len(),
            ));
        }

        if self.criteria.hot_top_n > 0 {
            let before = working.len();
            working.sort_by(|a, b| {
                b.traded_amount
                    .partial_cmp(&a.traded_amount)
                    .unwrap_or(Ordering::Equal)
            });
            working.truncate(self.criteria.hot_top_n);
            stages.push(FilterStageResult::new(
                FilterStage::HotStocks,
                before,
                working.len(),
            ));
        }

        if self.criteria.industry_top_n > 0 {
            let before = working.len();
            working = industry_leaders(&working, self.criteria.industry_top_n);
            stages.push(FilterStageResult::new(
                FilterStage::IndustryLeaders,
                before,
                working.len(),
            ));
        }

        if self.criteria.limit_up_count > 0 && self.criteria.limit_up_months > 0 {
            let before = working.len();
            working = self.filter_limit_up_count(working, provider).await;
            stages.push(FilterStageResult::new(
                FilterStage::LimitUpCount,
                before,
                working.len(),
            ));
        }

        debug!(input, passed = working.len(), "filter pipeline complete");
        (working, stages)
    }

    // ========================================================================
    // Stage 1: Quote Filter
    // ========================================================================

    fn passes_quote_filter(&self, snapshot: &InstrumentSnapshot) -> bool {
        let c = &self.criteria;

        if !c.turnover.contains(snapshot.turnover_rate) {
            return false;
        }
        if !c.percent_change.contains(snapshot.percent_change) {
            return false;
        }
        if snapshot.volume_ratio < c.volume_ratio_min {
            return false;
        }
        if c.volume_ratio_max > 0.0 && snapshot.volume_ratio > c.volume_ratio_max {
            return false;
        }
        if !c.price.contains(snapshot.last_price) {
            return false;
        }

        // Criteria express market cap in 亿; snapshots carry yuan.
        let cap = Range::new(c.market_cap_yi.min * YI, c.market_cap_yi.max * YI);
        if !cap.contains(snapshot.market_cap) {
            return false;
        }

        if c.remove_green && snapshot.percent_change <= 0.0 {
            return false;
        }
        if c.remove_limit_up && snapshot.percent_change >= LIMIT_UP_PCT {
            return false;
        }

        true
    }

    // ========================================================================
    // Stage 2: Intraday Volume
    // ========================================================================

    async fn filter_intraday_volume<P: MarketDataProvider + ?Sized>(
        &self,
        working: Vec<InstrumentSnapshot>,
        provider: &P,
    ) -> Vec<InstrumentSnapshot> {
        let today = Utc::now().date_naive();
        let mut kept = Vec::with_capacity(working.len());
        for snapshot in working {
            match provider.get_intraday_minutes(&snapshot.symbol, today).await {
                Ok(bars) if bars.len() >= INTRADAY_SAMPLES => {
                    let tail = &bars[bars.len() - INTRADAY_SAMPLES..];
                    if tail.windows(2).all(|pair| pair[1].volume > pair[0].volume) {
                        kept.push(snapshot);
                    }
                }
                // Too few samples to confirm a rising streak.
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        symbol = %snapshot.symbol,
                        error = %e,
                        "intraday fetch failed, skipping instrument"
                    );
                }
            }
        }
        kept
    }

    // ========================================================================
    // Stage 3: Technical Block
    // ========================================================================

    async fn filter_technical<P: MarketDataProvider + ?Sized>(
        &self,
        working: Vec<InstrumentSnapshot>,
        provider: &P,
    ) -> Vec<InstrumentSnapshot> {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(TECHNICAL_LOOKBACK_CALENDAR_DAYS);
        let mut kept = Vec::with_capacity(working.len());
        for snapshot in working {
            match provider
                .get_daily_history(&snapshot.symbol, start, end)
                .await
            {
                Ok(bars) => {
                    if self.passes_technical_block(&bars) {
                        kept.push(snapshot);
                    }
                }
                Err(e) => {
                    warn!(
                        symbol = %snapshot.symbol,
                        error = %e,
                        "history fetch failed, skipping instrument"
                    );
                }
            }
        }
        kept
    }

    /// An empty history skips the whole block (the candidate survives);
    /// an enabled sub-check that fails on available data drops it.
    fn passes_technical_block(&self, bars: &[Bar]) -> bool {
        if bars.is_empty() {
            return true;
        }
        let closes = data::closes(bars);

        if self.criteria.ma_alignment {
            // Instantaneous level check only; the trend classifier's
            // slope-aware test is deliberately a separate notion.
            let aligned = matches!(
                (
                    last_value(&sma(&closes, 5)),
                    last_value(&sma(&closes, 10)),
                    last_value(&sma(&closes, 20)),
                ),
                (Some(m5), Some(m10), Some(m20)) if m5 > m10 && m10 > m20
            );
            if !aligned {
                return false;
            }
        }

        if self.criteria.macd_golden_cross && !macd(&closes).golden_cross() {
            return false;
        }

        if self.criteria.kdj_golden_cross && !kdj(bars).golden_cross() {
            return false;
        }

        true
    }

    // ========================================================================
    // Stage 6: Limit-Up Count
    // ========================================================================

    async fn filter_limit_up_count<P: MarketDataProvider + ?Sized>(
        &self,
        working: Vec<InstrumentSnapshot>,
        provider: &P,
    ) -> Vec<InstrumentSnapshot> {
        let end = Utc::now().date_naive();
        let start = end - Duration::days(DAYS_PER_MONTH * self.criteria.limit_up_months as i64);
        let required = self.criteria.limit_up_count as usize;

        let mut kept = Vec::with_capacity(working.len());
        for snapshot in working {
            match provider
                .get_daily_history(&snapshot.symbol, start, end)
                .await
            {
                Ok(bars) if !bars.is_empty() => {
                    let count = bars
                        .iter()
                        .filter(|b| b.percent_change >= LIMIT_UP_PCT)
                        .count();
                    // Exact match is deliberate: "the Nth limit-up within
                    // M months", not "at least N".
                    if count == required {
                        kept.push(snapshot);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(
                        symbol = %snapshot.symbol,
                        error = %e,
                        "history fetch failed, skipping instrument"
                    );
                }
            }
        }
        kept
    }
}

/// Keep the top N per industry partition by market cap, preserving the
/// incoming order of survivors.
fn industry_leaders(working: &[InstrumentSnapshot], top_n: usize) -> Vec<InstrumentSnapshot> {
    let mut by_industry: HashMap<&str, Vec<&InstrumentSnapshot>> = HashMap::new();
    for snapshot in working {
        by_industry
            .entry(snapshot.industry.as_deref().unwrap_or(""))
            .or_default()
            .push(snapshot);
    }

    let mut keep: HashSet<&str> = HashSet::new();
    for group in by_industry.values_mut() {
        group.sort_by(|a, b| {
            b.market_cap
                .partial_cmp(&a.market_cap)
                .unwrap_or(Ordering::Equal)
        });
        for snapshot in group.iter().take(top_n) {
            keep.insert(snapshot.symbol.as_str());
        }
    }

    working
        .iter()
        .filter(|s| keep.contains(s.symbol.as_str()))
        .cloned()
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money_flow::YI;
    use crate::test_support::{bars_from_closes, snapshot, FixtureProvider};

    fn quote_only(criteria: FilterCriteria) -> FilterPipeline {
        FilterPipeline::new(criteria)
    }

    #[tokio::test]
    async fn test_quote_ranges() {
        let mut criteria = FilterCriteria::default();
        criteria.turnover = Range::new(3.0, 10.0);
        criteria.percent_change = Range::new(3.0, 10.0);
        criteria.price = Range::new(1.0, 5.0);

        let mut a = snapshot("000001", "甲");
        a.turnover_rate = 5.0;
        a.percent_change = 4.0;
        a.last_price = 3.0;

        let mut b = snapshot("000002", "乙");
        b.turnover_rate = 12.0; // out of band
        b.percent_change = 4.0;
        b.last_price = 3.0;

        let provider = FixtureProvider::default();
        let (passed, stages) = quote_only(criteria)
            .apply(&[a, b], &provider)
            .await;

        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].symbol, "000001");
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].stage, FilterStage::Quote);
        assert_eq!(stages[0].eliminated, 1);
        assert!((stages[0].elimination_rate - 50.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_default_criteria_pass_everything_through() {
        let provider = FixtureProvider::default();
        let rows = vec![snapshot("000001", "甲"), snapshot("000002", "乙")];
        let (passed, stages) = FilterPipeline::with_defaults().apply(&rows, &provider).await;
        assert_eq!(passed.len(), 2);
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].eliminated, 0);
    }

    #[tokio::test]
    async fn test_inverted_range_yields_empty_set() {
        let mut criteria = FilterCriteria::default();
        criteria.turnover = Range::new(10.0, 3.0);

        let mut a = snapshot("000001", "甲");
        a.turnover_rate = 5.0;

        let provider = FixtureProvider::default();
        let (passed, _) = quote_only(criteria).apply(&[a], &provider).await;
        assert!(passed.is_empty());
    }

    #[tokio::test]
    async fn test_volume_ratio_max_unbounded_when_nonpositive() {
        let mut criteria = FilterCriteria::default();
        criteria.volume_ratio_min = 1.0;
        criteria.volume_ratio_max = 0.0; // unbounded above

        let mut a = snapshot("000001", "甲");
        a.volume_ratio = 55.0;
        let mut b = snapshot("000002", "乙");
        b.volume_ratio = 0.5;

        let provider = FixtureProvider::default();
        let (passed, _) = quote_only(criteria.clone()).apply(&[a.clone(), b], &provider).await;
        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].symbol, "000001");

        criteria.volume_ratio_max = 10.0;
        let (passed, _) = quote_only(criteria).apply(&[a], &provider).await;
        assert!(passed.is_empty());
    }

    #[tokio::test]
    async fn test_market_cap_unit_conversion() {
        let mut criteria = FilterCriteria::default();
        criteria.market_cap_yi = Range::new(50.0, 300.0);

        let mut a = snapshot("000001", "甲");
        a.market_cap = 100.0 * YI;
        let mut b = snapshot("000002", "乙");
        b.market_cap = 10.0 * YI;

        let provider = FixtureProvider::default();
        let (passed, _) = quote_only(criteria).apply(&[a, b], &provider).await;
        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].symbol, "000001");
    }

    #[tokio::test]
    async fn test_remove_green_and_limit_up() {
        let mut criteria = FilterCriteria::default();
        criteria.remove_green = true;
        criteria.remove_limit_up = true;

        let mut green = snapshot("000001", "甲");
        green.percent_change = -1.0;
        let mut limit = snapshot("000002", "乙");
        limit.percent_change = 10.0;
        let mut ok = snapshot("000003", "丙");
        ok.percent_change = 4.0;

        let provider = FixtureProvider::default();
        let (passed, _) = quote_only(criteria)
            .apply(&[green, limit, ok], &provider)
            .await;
        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].symbol, "000003");
    }

    #[tokio::test]
    async fn test_intraday_volume_increasing() {
        let mut criteria = FilterCriteria::default();
        criteria.volume_increasing = true;

        let mut provider = FixtureProvider::default();
        let mut rising = bars_from_closes(&[10.0, 10.1, 10.2, 10.3]);
        for (i, bar) in rising.iter_mut().enumerate() {
            bar.volume = 100.0 + i as f64;
        }
        provider.intraday.insert("000001".to_string(), rising);

        let mut flat = bars_from_closes(&[10.0, 10.1, 10.2, 10.3]);
        for bar in flat.iter_mut() {
            bar.volume = 100.0;
        }
        provider.intraday.insert("000002".to_string(), flat);
        // 000003 has no intraday data at all and is dropped.

        let (passed, stages) = quote_only(criteria)
            .apply(
                &[
                    snapshot("000001", "甲"),
                    snapshot("000002", "乙"),
                    snapshot("000003", "丙"),
                ],
                &provider,
            )
            .await;

        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].symbol, "000001");
        assert_eq!(stages[1].stage, FilterStage::Intraday);
        assert_eq!(stages[1].eliminated, 2);
    }

    #[tokio::test]
    async fn test_technical_ma_alignment() {
        let mut criteria = FilterCriteria::default();
        criteria.ma_alignment = true;

        let mut provider = FixtureProvider::default();
        let rising: Vec<f64> = (0..30).map(|i| 10.0 + i as f64).collect();
        provider
            .daily
            .insert("000001".to_string(), bars_from_closes(&rising));
        let falling: Vec<f64> = (0..30).map(|i| 40.0 - i as f64).collect();
        provider
            .daily
            .insert("000002".to_string(), bars_from_closes(&falling));
        // 000003 has an empty history: the technical block is skipped and
        // the candidate survives by default.

        let (passed, _) = quote_only(criteria)
            .apply(
                &[
                    snapshot("000001", "甲"),
                    snapshot("000002", "乙"),
                    snapshot("000003", "丙"),
                ],
                &provider,
            )
            .await;

        let symbols: Vec<_> = passed.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["000001", "000003"]);
    }

    #[tokio::test]
    async fn test_technical_macd_and_kdj_crosses() {
        let mut criteria = FilterCriteria::default();
        criteria.macd_golden_cross = true;

        let mut provider = FixtureProvider::default();
        let crossing = [50.0, 50.123, 50.246, 50.369, 49.511, 48.653, 51.501];
        provider
            .daily
            .insert("000001".to_string(), bars_from_closes(&crossing));
        provider
            .daily
            .insert("000002".to_string(), bars_from_closes(&[50.0; 10]));

        let (passed, _) = quote_only(criteria)
            .apply(
                &[snapshot("000001", "甲"), snapshot("000002", "乙")],
                &provider,
            )
            .await;
        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].symbol, "000001");

        let mut criteria = FilterCriteria::default();
        criteria.kdj_golden_cross = true;

        let mut provider = FixtureProvider::default();
        let kdj_cross = [
            50.0, 51.1117, 52.6765, 54.147, 54.0227, 53.446, 52.1789, 51.0102, 49.8071, 49.2489,
            50.5288, 48.8865, 49.8996, 48.2616, 48.559, 47.9145, 46.8242, 48.6906, 46.8549,
            45.6021, 46.773,
        ];
        provider
            .daily
            .insert("000001".to_string(), bars_from_closes(&kdj_cross));
        provider
            .daily
            .insert("000002".to_string(), bars_from_closes(&[50.0; 21]));

        let (passed, _) = quote_only(criteria)
            .apply(
                &[snapshot("000001", "甲"), snapshot("000002", "乙")],
                &provider,
            )
            .await;
        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].symbol, "000001");
    }

    #[tokio::test]
    async fn test_hot_stocks_top_n() {
        let mut criteria = FilterCriteria::default();
        criteria.hot_top_n = 2;

        let mut a = snapshot("000001", "甲");
        a.traded_amount = 3.0e9;
        let mut b = snapshot("000002", "乙");
        b.traded_amount = 9.0e9;
        let mut c = snapshot("000003", "丙");
        c.traded_amount = 1.0e9;

        let provider = FixtureProvider::default();
        let (passed, _) = quote_only(criteria).apply(&[a, b, c], &provider).await;
        let symbols: Vec<_> = passed.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["000002", "000001"]);
    }

    #[tokio::test]
    async fn test_industry_leaders_partition() {
        let mut criteria = FilterCriteria::default();
        criteria.industry_top_n = 1;

        let mut a = snapshot("000001", "大银行");
        a.industry = Some("银行".to_string());
        a.market_cap = 500.0 * YI;
        let mut b = snapshot("000002", "小银行");
        b.industry = Some("银行".to_string());
        b.market_cap = 80.0 * YI;
        let mut c = snapshot("000003", "药厂");
        c.industry = Some("医药".to_string());
        c.market_cap = 60.0 * YI;

        let provider = FixtureProvider::default();
        let (passed, _) = quote_only(criteria).apply(&[a, b, c], &provider).await;
        let symbols: Vec<_> = passed.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["000001", "000003"]);
    }

    #[tokio::test]
    async fn test_limit_up_count_exact_match() {
        let mut criteria = FilterCriteria::default();
        criteria.limit_up_months = 1;
        criteria.limit_up_count = 2;

        let mut provider = FixtureProvider::default();

        let mut two = bars_from_closes(&[10.0, 11.0, 12.1, 12.0]);
        two[1].percent_change = 10.0;
        two[2].percent_change = 10.0;
        provider.daily.insert("000001".to_string(), two);

        let mut three = bars_from_closes(&[10.0, 11.0, 12.1, 13.3]);
        three[1].percent_change = 10.0;
        three[2].percent_change = 10.0;
        three[3].percent_change = 10.0;
        provider.daily.insert("000002".to_string(), three);

        let (passed, _) = quote_only(criteria)
            .apply(
                &[snapshot("000001", "甲"), snapshot("000002", "乙")],
                &provider,
            )
            .await;

        // Three limit-ups is not two: exact equality is required.
        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].symbol, "000001");
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_instrument_not_batch() {
        let mut criteria = FilterCriteria::default();
        criteria.limit_up_months = 1;
        criteria.limit_up_count = 1;

        let mut provider = FixtureProvider::default();
        provider.fail_daily_for.insert("000001".to_string());
        let mut one = bars_from_closes(&[10.0, 11.0]);
        one[1].percent_change = 10.0;
        provider.daily.insert("000002".to_string(), one);

        let (passed, _) = quote_only(criteria)
            .apply(
                &[snapshot("000001", "甲"), snapshot("000002", "乙")],
                &provider,
            )
            .await;
        assert_eq!(passed.len(), 1);
        assert_eq!(passed[0].symbol, "000002");
    }
}
