//! Indicator trait and concrete implementations.
//!
//! Indicators are pure functions: bar history in, numeric series out, one
//! value per bar. Values that cannot be computed yet (window not full, or a
//! NaN inside the window) are `f64::NAN`, never zero. Consumers convert to
//! `Option<f64>` at the boundary.
//!
//! # Look-ahead contamination guard
//! No indicator value at bar t may depend on price data from bar t+1 or later.
//! Every indicator must pass the truncated-vs-full series test.

pub mod atr;
pub mod kst;
pub mod roc;
pub mod sma;

pub use atr::{Atr, WilderAtr};
pub use kst::Kst;
pub use roc::Roc;
pub use sma::Sma;

use crate::domain::Bar;
use serde::{Deserialize, Serialize};

/// Trait for indicators.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_5_high", "atr_252").
    fn name(&self) -> &str;

    /// Number of leading bars whose output is NaN.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    ///
    /// Returns a `Vec<f64>` of the same length as `bars`.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

/// Which bar price an indicator reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    High,
    Low,
    Close,
    Ohlc4,
}

impl PriceSource {
    pub fn of(&self, bar: &Bar) -> f64 {
        match self {
            PriceSource::High => bar.high,
            PriceSource::Low => bar.low,
            PriceSource::Close => bar.close,
            PriceSource::Ohlc4 => bar.ohlc4(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            PriceSource::High => "high",
            PriceSource::Low => "low",
            PriceSource::Close => "close",
            PriceSource::Ohlc4 => "ohlc4",
        }
    }

    pub fn series(&self, bars: &[Bar]) -> Vec<f64> {
        bars.iter().map(|b| self.of(b)).collect()
    }
}

/// Rolling mean over `period` values. NaN wherever the window is short or
/// contains a NaN.
pub fn rolling_mean(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for (i, &entering) in values.iter().enumerate() {
        if entering.is_nan() {
            nan_count += 1;
        } else {
            sum += entering;
        }
        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                nan_count -= 1;
            } else {
                sum -= leaving;
            }
        }
        if i + 1 >= period && nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }

    result
}

/// Lag a series by `offset` bars: `out[i] = values[i - offset]`.
pub fn shift(values: &[f64], offset: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    for i in offset..n {
        result[i] = values[i - offset];
    }
    result
}

/// NaN-to-`None` conversion at the boundary between series and consumers.
pub fn defined(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLC: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, one minute apart.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                symbol: "TEST".to_string(),
                timestamp: base + chrono::Duration::minutes(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
            }
        })
        .collect()
}

/// Bars from explicit (open, high, low, close) tuples, one minute apart.
#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 2)
        .unwrap()
        .and_hms_opt(9, 15, 0)
        .unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            symbol: "TEST".to_string(),
            timestamp: base + chrono::Duration::minutes(i as i64),
            open,
            high,
            low,
            close,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
