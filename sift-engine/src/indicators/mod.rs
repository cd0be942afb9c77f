//! Technical indicator library.
//!
//! Pure functions over price/volume columns. Every function returns one
//! output slot per input bar; slots before a window's warm-up are `None`,
//! never zero, so downstream code can tell "not enough data" from "flat".
//! Series shorter than a window simply yield all-`None` output instead of
//! failing.

use crate::data::{self, Bar};

/// MACD fast EMA span.
pub const MACD_FAST_SPAN: usize = 12;
/// MACD slow EMA span.
pub const MACD_SLOW_SPAN: usize = 26;
/// MACD signal EMA span.
pub const MACD_SIGNAL_SPAN: usize = 9;
/// KDJ RSV rolling window.
pub const KDJ_WINDOW: usize = 9;
/// KDJ center-of-mass smoothing for K and D.
pub const KDJ_SMOOTHING_COM: f64 = 2.0;
/// Default RSI period.
pub const RSI_PERIOD: usize = 14;

// ============================================================================
// Moving Averages
// ============================================================================

/// Simple moving average over a trailing window.
pub fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = Some(sum / window as f64);
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out[i] = Some(sum / window as f64);
    }
    out
}

/// First difference of an indicator sequence.
pub fn slope(values: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    for i in 1..values.len() {
        if let (Some(prev), Some(cur)) = (values[i - 1], values[i]) {
            out[i] = Some(cur - prev);
        }
    }
    out
}

/// Exponential moving average with span smoothing (alpha = 2/(span+1)).
///
/// No bias adjustment; the first value seeds the average, so output is
/// defined for every index.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let Some(&first) = values.first() else {
        return out;
    };
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut acc = first;
    out.push(acc);
    for &value in &values[1..] {
        acc = alpha * value + (1.0 - alpha) * acc;
        out.push(acc);
    }
    out
}

/// EMA over an optional sequence with center-of-mass smoothing
/// (alpha = 1/(1+com)).
///
/// `None` inputs produce `None` outputs and leave the running average
/// untouched; the first defined input seeds it.
pub fn ema_com(values: &[Option<f64>], com: f64) -> Vec<Option<f64>> {
    let alpha = 1.0 / (1.0 + com);
    let mut out = vec![None; values.len()];
    let mut acc: Option<f64> = None;
    for (i, value) in values.iter().enumerate() {
        if let Some(value) = value {
            let next = match acc {
                Some(prev) => alpha * value + (1.0 - alpha) * prev,
                None => *value,
            };
            acc = Some(next);
            out[i] = acc;
        }
    }
    out
}

/// Last defined value of an indicator sequence.
pub fn last_value(values: &[Option<f64>]) -> Option<f64> {
    values.last().copied().flatten()
}

/// Percent growth of an indicator over its last `span` slots
/// ((latest − value `span−1` slots back) / base × 100).
pub fn growth_pct(values: &[Option<f64>], span: usize) -> Option<f64> {
    let n = values.len();
    if span == 0 || n < span {
        return None;
    }
    let latest = values[n - 1]?;
    let base = values[n - span]?;
    if base == 0.0 {
        return None;
    }
    Some((latest - base) / base * 100.0)
}

// ============================================================================
// MACD
// ============================================================================

/// MACD line, signal line and histogram, index-aligned with the input.
#[derive(Debug, Clone)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Compute MACD (EMA12 − EMA26), its signal (EMA9 of MACD) and histogram.
pub fn macd(closes: &[f64]) -> MacdSeries {
    let fast = ema(closes, MACD_FAST_SPAN);
    let slow = ema(closes, MACD_SLOW_SPAN);
    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal = ema(&line, MACD_SIGNAL_SPAN);
    let histogram = line.iter().zip(&signal).map(|(m, s)| m - s).collect();
    MacdSeries {
        macd: line,
        signal,
        histogram,
    }
}

impl MacdSeries {
    /// Fresh golden cross on the most recent session.
    pub fn golden_cross(&self) -> bool {
        let n = self.macd.len();
        n >= 2 && self.macd[n - 1] > self.signal[n - 1] && self.macd[n - 2] <= self.signal[n - 2]
    }

    /// Fresh death cross on the most recent session.
    pub fn death_cross(&self) -> bool {
        let n = self.macd.len();
        n >= 2 && self.macd[n - 1] < self.signal[n - 1] && self.macd[n - 2] >= self.signal[n - 2]
    }

    /// Both legs above the zero axis on the most recent session.
    pub fn above_zero(&self) -> bool {
        matches!(
            (self.macd.last(), self.signal.last()),
            (Some(m), Some(s)) if *m > 0.0 && *s > 0.0
        )
    }

    /// Both legs below the zero axis on the most recent session.
    pub fn below_zero(&self) -> bool {
        matches!(
            (self.macd.last(), self.signal.last()),
            (Some(m), Some(s)) if *m < 0.0 && *s < 0.0
        )
    }
}

// ============================================================================
// KDJ
// ============================================================================

/// K, D and J sequences, index-aligned with the input.
#[derive(Debug, Clone)]
pub struct KdjSeries {
    pub k: Vec<Option<f64>>,
    pub d: Vec<Option<f64>>,
    pub j: Vec<Option<f64>>,
}

/// Compute KDJ over a bar series.
///
/// RSV is undefined while the 9-bar window is incomplete or when the
/// window's high-low range is zero.
pub fn kdj(bars: &[Bar]) -> KdjSeries {
    let n = bars.len();
    let mut rsv = vec![None; n];
    for i in (KDJ_WINDOW.saturating_sub(1))..n {
        let window = &bars[i + 1 - KDJ_WINDOW..=i];
        let low = window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min);
        let high = window
            .iter()
            .map(|b| b.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let range = high - low;
        if range > 0.0 {
            rsv[i] = Some((bars[i].close - low) / range * 100.0);
        }
    }
    let k = ema_com(&rsv, KDJ_SMOOTHING_COM);
    let d = ema_com(&k, KDJ_SMOOTHING_COM);
    let j = k
        .iter()
        .zip(&d)
        .map(|(k, d)| match (k, d) {
            (Some(k), Some(d)) => Some(3.0 * k - 2.0 * d),
            _ => None,
        })
        .collect();
    KdjSeries { k, d, j }
}

impl KdjSeries {
    /// Fresh K/D golden cross on the most recent session.
    pub fn golden_cross(&self) -> bool {
        let n = self.k.len();
        if n < 2 {
            return false;
        }
        match (self.k[n - 1], self.d[n - 1], self.k[n - 2], self.d[n - 2]) {
            (Some(k1), Some(d1), Some(k0), Some(d0)) => k1 > d1 && k0 <= d0,
            _ => false,
        }
    }
}

// ============================================================================
// RSI
// ============================================================================

/// Relative strength index over trailing `period` deltas.
///
/// Zero mean loss yields 100.0 by convention (the division is guarded).
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = closes.len();
    let mut out = vec![None; n];
    if period == 0 || n < period + 1 {
        return out;
    }
    for i in period..n {
        let mut gain = 0.0;
        let mut loss = 0.0;
        for j in (i + 1 - period)..=i {
            let delta = closes[j] - closes[j - 1];
            if delta > 0.0 {
                gain += delta;
            } else {
                loss += -delta;
            }
        }
        let gain = gain / period as f64;
        let loss = loss / period as f64;
        out[i] = Some(if loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        });
    }
    out
}

// ============================================================================
// Price Position
// ============================================================================

/// Position of `price` inside the trailing `window` close range, 0-100.
///
/// `None` when the series is empty or the range is zero.
pub fn price_position(closes: &[f64], window: usize, price: f64) -> Option<f64> {
    if closes.is_empty() || window == 0 {
        return None;
    }
    let tail = if closes.len() > window {
        &closes[closes.len() - window..]
    } else {
        closes
    };
    let min = tail.iter().copied().fold(f64::INFINITY, f64::min);
    let max = tail.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range == 0.0 {
        return None;
    }
    Some((price - min) / range * 100.0)
}

// ============================================================================
// Indicator Set
// ============================================================================

/// All standard indicators for one series, index-aligned.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    pub ma5: Vec<Option<f64>>,
    pub ma10: Vec<Option<f64>>,
    pub ma20: Vec<Option<f64>>,
    pub ma30: Vec<Option<f64>>,
    pub ma60: Vec<Option<f64>>,
    pub ma5_slope: Vec<Option<f64>>,
    pub ma10_slope: Vec<Option<f64>>,
    pub ma20_slope: Vec<Option<f64>>,
    pub ma30_slope: Vec<Option<f64>>,
    pub macd: MacdSeries,
    pub kdj: KdjSeries,
    pub rsi: Vec<Option<f64>>,
}

impl IndicatorSet {
    /// Compute the full set for a bar series.
    pub fn compute(bars: &[Bar]) -> Self {
        let closes = data::closes(bars);
        let ma5 = sma(&closes, 5);
        let ma10 = sma(&closes, 10);
        let ma20 = sma(&closes, 20);
        let ma30 = sma(&closes, 30);
        let ma60 = sma(&closes, 60);
        let ma5_slope = slope(&ma5);
        let ma10_slope = slope(&ma10);
        let ma20_slope = slope(&ma20);
        let ma30_slope = slope(&ma30);
        let macd = macd(&closes);
        let kdj = kdj(bars);
        let rsi = rsi(&closes, RSI_PERIOD);
        Self {
            ma5,
            ma10,
            ma20,
            ma30,
            ma60,
            ma5_slope,
            ma10_slope,
            ma20_slope,
            ma30_slope,
            macd,
            kdj,
            rsi,
        }
    }

    /// Length of every sequence (equals the input series length).
    pub fn len(&self) -> usize {
        self.ma5.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ma5.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
