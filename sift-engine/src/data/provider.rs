//! Market data provider abstraction.
//!
//! The engine never talks to a quote vendor directly; every fetch goes
//! through this trait so the UI shell can plug in its own transport.
//! Retries, timeouts and failover belong to the implementation, not the
//! engine.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Bar, InstrumentSnapshot};

// ============================================================================
// Provider Error
// ============================================================================

/// Errors surfaced by a market data provider.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Network error (connection failed, timeout)
    #[error("network error: {0}")]
    Network(String),

    /// Data not available for the requested symbol or range
    #[error("data not available: {0}")]
    DataNotAvailable(String),

    /// Invalid request parameters
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Internal provider error
    #[error("internal provider error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Whether the error is transient and worth retrying upstream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

// ============================================================================
// Vendor Row Types
// ============================================================================

/// Net fund flow for one industry sector.
///
/// `net_inflow_raw` is the vendor's display string ("12.5亿", "-3000万",
/// plain yuan); the money-flow parser normalizes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorFlow {
    pub sector: String,
    pub net_inflow_raw: String,
}

/// One row of the per-instrument fund-flow ranking.
///
/// The four magnitude fields are the vendor's display strings; the
/// money-flow parser normalizes them to yuan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundFlowRecord {
    pub symbol: String,
    pub name: String,
    pub percent_change: f64,
    pub main_inflow_raw: String,
    pub super_large_inflow_raw: String,
    pub large_inflow_raw: String,
    pub medium_inflow_raw: String,
}

// ============================================================================
// Data Provider Trait
// ============================================================================

/// Trait for market data providers.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Provider name for logging (e.g. "eastmoney").
    fn name(&self) -> &'static str;

    /// Fetch the full realtime quote board.
    async fn get_snapshot(&self) -> Result<Vec<InstrumentSnapshot>, ProviderError>;

    /// Fetch daily bars for a symbol over an inclusive date range.
    async fn get_daily_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError>;

    /// Fetch one-minute bars for a symbol on a given date.
    async fn get_intraday_minutes(
        &self,
        symbol: &str,
        date: NaiveDate,
    ) -> Result<Vec<Bar>, ProviderError>;

    /// Fetch daily bars for a benchmark index.
    async fn get_index_daily_history(
        &self,
        index_symbol: &str,
    ) -> Result<Vec<Bar>, ProviderError>;

    /// Fetch per-sector net fund flows.
    async fn get_sector_fund_flow(&self) -> Result<Vec<SectorFlow>, ProviderError>;

    /// Fetch the constituent snapshots of one sector.
    async fn get_sector_constituents(
        &self,
        sector: &str,
    ) -> Result<Vec<InstrumentSnapshot>, ProviderError>;

    /// Fetch the per-instrument fund-flow ranking.
    async fn get_fund_flow_rank(&self) -> Result<Vec<FundFlowRecord>, ProviderError>;

    /// Number of recent news items mentioning the symbol.
    ///
    /// Providers without a news feed can rely on the default.
    async fn get_news_count(&self, _symbol: &str) -> Result<usize, ProviderError> {
        Ok(0)
    }
}

// ============================================================================
// Tests
// ============================================================================
