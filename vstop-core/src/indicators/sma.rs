//! Simple Moving Average (SMA).
//!
//! Rolling mean of one bar price over a lookback window.
//! Lookback: period - 1 (first valid value at index period-1).

use super::{rolling_mean, Indicator, PriceSource};
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    source: PriceSource,
    name: String,
}

impl Sma {
    /// SMA of close prices.
    pub fn new(period: usize) -> Self {
        Self::of(PriceSource::Close, period)
    }

    pub fn of(source: PriceSource, period: usize) -> Self {
        assert!(period >= 1, "SMA period must be >= 1");
        Self {
            period,
            source,
            name: format!("sma_{period}_{}", source.label()),
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        rolling_mean(&self.source.series(bars), self.period)
    }
}
