//! Know Sure Thing (KST) momentum composite.
//!
//! KST = Σ weight_j · SMA(ROC(close, roc_j), sma_j) over four legs, and a
//! signal line SMA(KST, signal_period). Defaults: ROC 20/30/40/60 smoothed by
//! 20/20/20/30, weights 1/2/3/4, signal 26.

use super::roc::rate_of_change;
use super::{rolling_mean, Indicator};
use crate::config::KstConfig;
use crate::domain::Bar;

#[derive(Debug, Clone)]
pub struct Kst {
    params: KstConfig,
    name: String,
}

/// KST line and its signal line, both bar-aligned.
#[derive(Debug, Clone)]
pub struct KstSeries {
    pub kst: Vec<f64>,
    pub signal: Vec<f64>,
}

impl Kst {
    pub fn new(params: KstConfig) -> Self {
        let name = format!(
            "kst_{}_{}",
            params
                .roc_periods
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join("_"),
            params.signal_period
        );
        Self { params, name }
    }

    /// Lookback of the signal line.
    pub fn signal_lookback(&self) -> usize {
        self.lookback() + self.params.signal_period - 1
    }

    pub fn compute_with_signal(&self, bars: &[Bar]) -> KstSeries {
        let kst = self.compute(bars);
        let signal = rolling_mean(&kst, self.params.signal_period);
        KstSeries { kst, signal }
    }
}

impl Default for Kst {
    fn default() -> Self {
        Self::new(KstConfig::default())
    }
}

impl Indicator for Kst {
    fn name(&self) -> &str {
        &self.name
    }

    fn lookback(&self) -> usize {
        self.params
            .roc_periods
            .iter()
            .zip(self.params.sma_periods.iter())
            .map(|(roc, sma)| roc + sma - 1)
            .max()
            .unwrap_or(0)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let mut kst = vec![0.0; closes.len()];

        for ((&roc_period, &sma_period), &weight) in self
            .params
            .roc_periods
            .iter()
            .zip(self.params.sma_periods.iter())
            .zip(self.params.weights.iter())
        {
            let leg = rolling_mean(&rate_of_change(&closes, roc_period), sma_period);
            // NaN in any leg poisons the sum, which is the intent.
            for (acc, v) in kst.iter_mut().zip(leg) {
                *acc += weight * v;
            }
        }

        kst
    }
}
