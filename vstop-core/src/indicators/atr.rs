//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing (alpha = 1/period) seeded with the mean of the
//! first `period` true ranges that have a previous close.
//! Lookback: period (first valid value at index `period`).
//!
//! [`WilderAtr`] is the same computation one bar at a time. It is what the
//! engine carries across restarts.

use serde::{Deserialize, Serialize};

use super::Indicator;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
    name: String,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            name: format!("atr_{period}"),
        }
    }
}

/// True Range series. TR[0] is NaN: without a previous close the first bar
/// has no true range, only a high-low span.
pub fn true_range(bars: &[Bar]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; bars.len()];
    for (i, pair) in bars.windows(2).enumerate() {
        if let Some(value) = true_range_since(&pair[1], pair[0].close) {
            tr[i + 1] = value;
        }
    }
    tr
}

fn true_range_since(bar: &Bar, prev_close: f64) -> Option<f64> {
    let (h, l, pc) = (bar.high, bar.low, prev_close);
    if h.is_nan() || l.is_nan() || pc.is_nan() {
        return None;
    }
    Some((h - l).max((h - pc).abs()).max((l - pc).abs()))
}

/// Wilder smoothing. Seed: mean of the first run of `period` consecutive
/// non-NaN values. A NaN after the seed ends the series (rest stays NaN).
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    // End (exclusive) of the first window of `period` consecutive valid values.
    let mut run = 0usize;
    let mut seed_end = None;
    for (i, v) in values.iter().enumerate() {
        run = if v.is_nan() { 0 } else { run + 1 };
        if run == period {
            seed_end = Some(i + 1);
            break;
        }
    }
    let Some(seed_end) = seed_end else {
        return result;
    };

    let seed = values[seed_end - period..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = seed;

    let alpha = 1.0 / period as f64;
    let mut prev = seed;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }

    result
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        wilder_smooth(&true_range(bars), self.period)
    }
}

/// Streaming Wilder ATR.
///
/// Over bars with finite prices it yields exactly the values of
/// [`Atr::compute`], bar for bar. A missing true range after the seed
/// returns `None` and keeps the carried value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WilderAtr {
    period: usize,
    prev_close: Option<f64>,
    seed_sum: f64,
    seed_count: usize,
    value: Option<f64>,
}

impl WilderAtr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self {
            period,
            prev_close: None,
            seed_sum: 0.0,
            seed_count: 0,
            value: None,
        }
    }

    pub fn period(&self) -> usize {
        self.period
    }

    /// ATR as of the last bar fed, once seeded.
    pub fn value(&self) -> Option<f64> {
        self.value
    }

    /// Feed the next bar; returns the ATR at that bar.
    pub fn update(&mut self, bar: &Bar) -> Option<f64> {
        let tr = self.prev_close.and_then(|pc| true_range_since(bar, pc));
        self.prev_close = Some(bar.close);

        let Some(tr) = tr else {
            if self.value.is_none() {
                self.seed_sum = 0.0;
                self.seed_count = 0;
            }
            return None;
        };

        match self.value {
            Some(prev) => {
                let alpha = 1.0 / self.period as f64;
                let next = alpha * tr + (1.0 - alpha) * prev;
                self.value = Some(next);
                Some(next)
            }
            None => {
                self.seed_sum += tr;
                self.seed_count += 1;
                if self.seed_count < self.period {
                    return None;
                }
                let seed = self.seed_sum / self.period as f64;
                self.value = Some(seed);
                Some(seed)
            }
        }
    }
}
