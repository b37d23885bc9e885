//! Smoothing stage: every lagging series the detectors read, computed in one
//! pass over the bar history.
//!
//! Series are stored as bar-aligned `Vec<f64>` with NaN for indeterminate
//! values; `DerivedSeries::row` converts to `Option<f64>` so that consumers
//! cannot mistake a warm-up gap for a zero reading.

use serde::{Deserialize, Serialize};

use crate::config::SmoothingConfig;
use crate::domain::Bar;
use crate::indicators::{defined, shift, Atr, Indicator, Kst, PriceSource, Sma};

/// Bar-aligned derived series. All vectors have the length of the history.
#[derive(Debug, Clone, Default)]
pub struct DerivedSeries {
    pub ohlc4: Vec<f64>,
    pub ohlc4_sma: Vec<f64>,
    pub high_sma: Vec<f64>,
    pub low_sma: Vec<f64>,
    pub close_sma_mid: Vec<f64>,
    pub close_sma_slow: Vec<f64>,
    pub high_sma_lagged: Vec<f64>,
    pub low_sma_lagged: Vec<f64>,
    pub atr: Vec<f64>,
    pub kst: Vec<f64>,
    pub kst_signal: Vec<f64>,
}

/// Derived values at one bar. `None` means indeterminate.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DerivedRow {
    pub ohlc4: Option<f64>,
    pub ohlc4_sma: Option<f64>,
    pub high_sma: Option<f64>,
    pub low_sma: Option<f64>,
    pub close_sma_mid: Option<f64>,
    pub close_sma_slow: Option<f64>,
    pub high_sma_lagged: Option<f64>,
    pub low_sma_lagged: Option<f64>,
    pub atr: Option<f64>,
    pub kst: Option<f64>,
    pub kst_signal: Option<f64>,
}

impl DerivedSeries {
    /// Pure transform of the whole history.
    pub fn compute(bars: &[Bar], config: &SmoothingConfig) -> Self {
        let high_sma = Sma::of(PriceSource::High, config.fast).compute(bars);
        let low_sma = Sma::of(PriceSource::Low, config.fast).compute(bars);
        let kst = Kst::new(config.kst.clone()).compute_with_signal(bars);

        Self {
            ohlc4: PriceSource::Ohlc4.series(bars),
            ohlc4_sma: Sma::of(PriceSource::Ohlc4, config.fast).compute(bars),
            high_sma_lagged: shift(&high_sma, config.band_offset),
            low_sma_lagged: shift(&low_sma, config.band_offset),
            high_sma,
            low_sma,
            close_sma_mid: Sma::of(PriceSource::Close, config.mid).compute(bars),
            close_sma_slow: Sma::of(PriceSource::Close, config.slow).compute(bars),
            atr: Atr::new(config.atr_period).compute(bars),
            kst: kst.kst,
            kst_signal: kst.signal,
        }
    }

    pub fn len(&self) -> usize {
        self.ohlc4.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ohlc4.is_empty()
    }

    /// Values at `index`, or an all-`None` row past the end.
    pub fn row(&self, index: usize) -> DerivedRow {
        let at = |series: &Vec<f64>| series.get(index).copied().and_then(defined);
        DerivedRow {
            ohlc4: at(&self.ohlc4),
            ohlc4_sma: at(&self.ohlc4_sma),
            high_sma: at(&self.high_sma),
            low_sma: at(&self.low_sma),
            close_sma_mid: at(&self.close_sma_mid),
            close_sma_slow: at(&self.close_sma_slow),
            high_sma_lagged: at(&self.high_sma_lagged),
            low_sma_lagged: at(&self.low_sma_lagged),
            atr: at(&self.atr),
            kst: at(&self.kst),
            kst_signal: at(&self.kst_signal),
        }
    }

    /// The latest row, if any bar exists.
    pub fn last(&self) -> Option<DerivedRow> {
        self.len().checked_sub(1).map(|i| self.row(i))
    }
}
