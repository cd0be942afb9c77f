//! Money-flow magnitude parsing and bucketing.
//!
//! Quote vendors report net inflows as display strings with Chinese unit
//! suffixes ("12.5亿", "-3000万") or plain yuan. The parser normalizes
//! them; the bucketer groups instruments by absolute main-flow magnitude.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::data::FundFlowRecord;

/// One 亿 (hundred million yuan).
pub const YI: f64 = 1e8;
/// One 万 (ten thousand yuan).
pub const WAN: f64 = 1e4;

/// Tier thresholds in yuan.
const TIER_5000W_MIN: f64 = 5e7;
const TIER_1000W_MIN: f64 = 1e7;
const TIER_100W_MIN: f64 = 1e6;

// ============================================================================
// Parsing
// ============================================================================

/// Parse a vendor magnitude string into yuan.
///
/// Thousands separators and whitespace are stripped, a leading '-' is
/// reapplied after unit scaling, 亿 multiplies by 1e8 and 万 by 1e4.
/// Unsuffixed values are taken as already in yuan. Anything unparseable
/// yields 0.0; this function never fails.
pub fn parse_flow_value(raw: &str) -> f64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ',')
        .collect();

    let (negative, body) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.as_str()),
    };

    let (digits, unit) = if let Some(prefix) = body.strip_suffix('亿') {
        (prefix, YI)
    } else if let Some(prefix) = body.strip_suffix('万') {
        (prefix, WAN)
    } else {
        (body, 1.0)
    };

    let value = match digits.parse::<f64>() {
        Ok(v) => v * unit,
        Err(_) => return 0.0,
    };

    if negative {
        -value
    } else {
        value
    }
}

// ============================================================================
// Entries and Buckets
// ============================================================================

/// Per-instrument net inflow magnitudes by order-size tier, in yuan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoneyFlowEntry {
    pub symbol: String,
    pub name: String,
    pub percent_change: f64,
    /// Main (主力) net inflow
    pub main_inflow: f64,
    /// Super-large order (超大单) net inflow
    pub super_large_inflow: f64,
    /// Large order (大单) net inflow
    pub large_inflow: f64,
    /// Medium order (中单) net inflow
    pub medium_inflow: f64,
}

impl MoneyFlowEntry {
    /// Normalize a raw vendor row.
    pub fn from_record(record: FundFlowRecord) -> Self {
        Self {
            symbol: record.symbol,
            name: record.name,
            percent_change: record.percent_change,
            main_inflow: parse_flow_value(&record.main_inflow_raw),
            super_large_inflow: parse_flow_value(&record.super_large_inflow_raw),
            large_inflow: parse_flow_value(&record.large_inflow_raw),
            medium_inflow: parse_flow_value(&record.medium_inflow_raw),
        }
    }
}

/// Magnitude tier by absolute main flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowTier {
    /// |flow| >= 5000万
    Tier5000w,
    /// 1000万 <= |flow| < 5000万
    Tier1000w,
    /// 100万 <= |flow| < 1000万
    Tier100w,
}

/// Tier for a main-flow value; flows under 100万 fall outside every tier.
pub fn tier_of(main_inflow: f64) -> Option<FlowTier> {
    let magnitude = main_inflow.abs();
    if magnitude >= TIER_5000W_MIN {
        Some(FlowTier::Tier5000w)
    } else if magnitude >= TIER_1000W_MIN {
        Some(FlowTier::Tier1000w)
    } else if magnitude >= TIER_100W_MIN {
        Some(FlowTier::Tier100w)
    } else {
        None
    }
}

/// Instruments grouped by absolute main-flow magnitude, each tier sorted
/// by |flow| descending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoneyFlowBuckets {
    pub tier_5000w: Vec<MoneyFlowEntry>,
    pub tier_1000w: Vec<MoneyFlowEntry>,
    pub tier_100w: Vec<MoneyFlowEntry>,
}

/// Assign each entry to exactly one tier.
pub fn bucket(entries: Vec<MoneyFlowEntry>) -> MoneyFlowBuckets {
    let mut buckets = MoneyFlowBuckets::default();
    for entry in entries {
        match tier_of(entry.main_inflow) {
            Some(FlowTier::Tier5000w) => buckets.tier_5000w.push(entry),
            Some(FlowTier::Tier1000w) => buckets.tier_1000w.push(entry),
            Some(FlowTier::Tier100w) => buckets.tier_100w.push(entry),
            None => {}
        }
    }
    buckets.tier_5000w.sort_by(by_abs_flow);
    buckets.tier_1000w.sort_by(by_abs_flow);
    buckets.tier_100w.sort_by(by_abs_flow);
    buckets
}

fn by_abs_flow(a: &MoneyFlowEntry, b: &MoneyFlowEntry) -> Ordering {
    b.main_inflow
        .abs()
        .partial_cmp(&a.main_inflow.abs())
        .unwrap_or(Ordering::Equal)
}

// ============================================================================
// Tests
// ============================================================================
