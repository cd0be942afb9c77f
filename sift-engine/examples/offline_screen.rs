//! Offline demonstration of the screening engine against canned data.
//!
//! Run with `cargo run --example offline_screen`. No network access: a
//! small in-memory provider stands in for the quote vendor.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

use sift_common::config::Config;
use sift_common::logging::init_logging;
use sift_engine::data::{
    Bar, FundFlowRecord, InstrumentSnapshot, MarketDataProvider, ProviderError, SectorFlow,
};
use sift_engine::screener::{FilterCriteria, Range};
use sift_engine::ScreenerEngine;

struct CannedProvider {
    snapshots: Vec<InstrumentSnapshot>,
    daily: HashMap<String, Vec<Bar>>,
    index_daily: Vec<Bar>,
    sector_flows: Vec<SectorFlow>,
    constituents: HashMap<String, Vec<InstrumentSnapshot>>,
    fund_flow_rank: Vec<FundFlowRecord>,
}

#[async_trait]
impl MarketDataProvider for CannedProvider {
    fn name(&self) -> &'static str {
        "canned"
    }

    async fn get_snapshot(&self) -> Result<Vec<InstrumentSnapshot>, ProviderError> {
        Ok(self.snapshots.clone())
    }

    async fn get_daily_history(
        &self,
        symbol: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        Ok(self.daily.get(symbol).cloned().unwrap_or_default())
    }

    async fn get_intraday_minutes(
        &self,
        _symbol: &str,
        _date: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError> {
        Ok(Vec::new())
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
}

fn bars(closes: &[f64]) -> Vec<Bar> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Bar {
            date: start + Duration::days(i as i64),
            open: close,
            high: close + 0.5,
            low: close - 0.5,
            close,
            volume: 1_000_000.0 + i as f64 * 10_000.0,
            percent_change: 0.0,
        })
        .collect()
}

fn row(
    symbol: &str,
    name: &str,
    price: f64,
    change: f64,
    turnover: f64,
    volume_ratio: f64,
    cap_yi: f64,
    industry: &str,
) -> InstrumentSnapshot {
    InstrumentSnapshot {
        symbol: symbol.to_string(),
        name: name.to_string(),
        last_price: price,
        percent_change: change,
        turnover_rate: turnover,
        volume_ratio,
        market_cap: cap_yi * 1e8,
        traded_amount: 5.0e8,
        industry: Some(industry.to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    let rising: Vec<f64> = (0..60).map(|i| 2.0 + i as f64 * 0.03).collect();
    let choppy: Vec<f64> = (0..60)
        .map(|i| 3.0 + if i % 2 == 0 { 0.05 } else { -0.05 })
        .collect();
    let index: Vec<f64> = (0..80).map(|i| 3000.0 + i as f64 * 4.0).collect();

    let snapshots = vec![
        row("000001", "甲股份", 3.7, 6.2, 7.5, 2.6, 120.0, "银行"),
        row("000002", "乙控股", 3.1, 4.0, 5.5, 1.4, 90.0, "地产"),
        row("600100", "丙科技", 4.4, 10.0, 16.0, 3.5, 150.0, "软件"),
        row("300999", "丁创业", 2.8, 5.0, 6.0, 1.8, 60.0, "软件"),
    ];

    let mut daily = HashMap::new();
    daily.insert("000001".to_string(), bars(&rising));
    daily.insert("000002".to_string(), bars(&choppy));
    daily.insert("600100".to_string(), bars(&rising));

    let mut constituents = HashMap::new();
    constituents.insert(
        "软件".to_string(),
        vec![row("600100", "丙科技", 4.4, 10.0, 16.0, 3.5, 150.0, "软件")],
    );

    let provider = Arc::new(CannedProvider {
        snapshots,
        daily,
        index_daily: bars(&index),
        sector_flows: vec![SectorFlow {
            sector: "软件".to_string(),
            net_inflow_raw: "2.3亿".to_string(),
        }],
        constituents,
        fund_flow_rank: vec![FundFlowRecord {
            symbol: "600100".to_string(),
            name: "丙科技".to_string(),
            percent_change: 10.0,
            main_inflow_raw: "1.1亿".to_string(),
            super_large_inflow_raw: "8000万".to_string(),
            large_inflow_raw: "3000万".to_string(),
            medium_inflow_raw: "-500万".to_string(),
        }],
    });

    let mut criteria = FilterCriteria::preset();
    // The canned universe is tiny; widen the bands so something survives.
    criteria.percent_change = Range::new(3.0, 20.0);
    criteria.turnover = Range::new(3.0, 20.0);
    criteria.limit_up_months = 0;
    criteria.limit_up_count = 0;

    let engine = ScreenerEngine::from_config(provider, criteria, &config);

    let overview = engine.refresh().await?;
    tracing::info!(
        advancing = overview.advancing.len(),
        main_board_limit_ups = overview.main_board_limit_ups.len(),
        "market overview"
    );

    let (signals, stages) = engine.screen().await?;
    for stage in &stages {
        tracing::info!(stage = %stage.stage, passed = stage.passed, eliminated = stage.eliminated, "funnel");
    }
    for signal in &signals {
        println!(
            "{} {} 评分={} 风险={} 建议={}",
            signal.symbol, signal.name, signal.rating_score, signal.risk_score, signal.advice
        );
    }

    let report = engine.market_report().await;
    if let Some(index) = &report.index {
        println!("大盘: {} ({})", index.trend, index.advisory);
    }
    for sector in &report.strong_sectors {
        println!("强势板块: {} 涨幅 {:.2}%", sector.sector, sector.mean_change);
    }

    let analyses = engine.analyze_limit_ups().await?;
    for analysis in &analyses {
        println!(
            "涨停分析: {} {} 连板={} 评级={}",
            analysis.symbol, analysis.name, analysis.streak, analysis.rating
        );
    }

    let buckets = engine.money_flow_buckets().await;
    println!(
        "资金分档: 5000万+ {} 只, 1000万+ {} 只, 100万+ {} 只",
        buckets.tier_5000w.len(),
        buckets.tier_1000w.len(),
        buckets.tier_100w.len()
    );

    Ok(())
}
