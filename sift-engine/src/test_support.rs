//! Shared fixtures for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

use crate::data::{
    Bar, FundFlowRecord, InstrumentSnapshot, MarketDataProvider, ProviderError, SectorFlow,
};
use crate::money_flow::YI;

/// In-memory provider. Missing symbols yield empty series; fetch counters
/// let tests assert cache behavior.
#[derive(Default)]
pub struct FixtureProvider {
    pub snapshots: Vec<InstrumentSnapshot>,
    pub daily: HashMap<String, Vec<Bar>>,
    pub intraday: HashMap<String, Vec<Bar>>,
    pub index_daily: Vec<Bar>,
    pub sector_flows: Vec<SectorFlow>,
    pub constituents: HashMap<String, Vec<InstrumentSnapshot>>,
    pub fund_flow_rank: Vec<FundFlowRecord>,
    pub news_counts: HashMap<String, usize>,
    /// Fail every daily-history fetch
    pub fail_daily: bool,
    /// Fail daily-history fetches for these symbols only
    pub fail_daily_for: HashSet<String>,
    /// Fail the snapshot fetch
    pub fail_snapshot: bool,
    pub daily_fetches: AtomicUsize,
}

#[async_trait]
impl MarketDataProvider for FixtureProvider {
    fn name(&self) -> &'static str {
        "fixture"
    }

    async fn get_snapshot(&self) -> Result<Vec<InstrumentSnapshot>, ProviderError> {
        if self.fail_snapshot {
            return Err(ProviderError::Network("snapshot offline".into()));
        }
        Ok(self.snapshots.clone())
    }

    async fn get_daily_history(
        &self,
        symbol: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        self.daily_fetches.fetch_add(1, Ordering::SeqCst);
        if self.fail_daily || self.fail_daily_for.contains(symbol) {
            return Err(ProviderError::Network("history offline".into()));
        }
        Ok(self.daily.get(symbol).cloned().unwrap_or_default())
    }

    async fn get_intraday_minutes(
        &self,
        symbol: &str,
        _date: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        Ok(self.intraday.get(symbol).cloned().unwrap_or_default())
    }

    async fn get_index_daily_history(
        &self,
        _index_symbol: &str,
    ) -> Result<Vec<Bar>, ProviderError> {
        Ok(self.index_daily.clone())
    }

    async fn get_sector_fund_flow(&self) -> Result<Vec<SectorFlow>, ProviderError> {
        Ok(self.sector_flows.clone())
    }

    async fn get_sector_constituents(
        &self,
        sector: &str,
    ) -> Result<Vec<InstrumentSnapshot>, ProviderError> {
        Ok(self.constituents.get(sector).cloned().unwrap_or_default())
    }

    async fn get_fund_flow_rank(&self) -> Result<Vec<FundFlowRecord>, ProviderError> {
        Ok(self.fund_flow_rank.clone())
    }

    async fn get_news_count(&self, symbol: &str) -> Result<usize, ProviderError> {
        Ok(self.news_counts.get(symbol).copied().unwrap_or(0))
    }
}

/// Snapshot row that passes the permissive default criteria.
pub fn snapshot(symbol: &str, name: &str) -> InstrumentSnapshot {
    InstrumentSnapshot {
        symbol: symbol.to_string(),
        name: name.to_string(),
        last_price: 10.0,
        percent_change: 0.0,
        turnover_rate: 5.0,
        volume_ratio: 1.0,
        market_cap: 100.0 * YI,
        traded_amount: 1.0e9,
        industry: None,
    }
}

/// Daily bars from a close column; highs/lows straddle the close by one
/// yuan so window-range indicators stay defined.
pub fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            date: start + Duration::days(i as i64),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1000.0,
            percent_change: 0.0,
        })
        .collect()
}

/// Perfectly flat bars (high == low == close), for zero-range edge cases.
pub fn flat_bars(close: f64, len: usize) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    (0..len)
        .map(|i| Bar {
            date: start + Duration::days(i as i64),
            open: close,
            high: close,
            low: close,
            close,
            volume: 1000.0,
            percent_change: 0.0,
        })
        .collect()
}
