//! Engine configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! production parameters: SMA 5/9/26, band lag 3, ATR 252, KST 20/30/40/60,
//! VStop multipliers 2 and 3, prominence threshold 100, strikes on a 100 grid,
//! unbounded bar history.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::arbiter::StrikeAnchor;
use crate::cross::CrossFamily;
use crate::error::ConfigError;
use crate::indicators::Kst;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub smoothing: SmoothingConfig,
    pub trailing_stop: TrailingStopConfig,
    pub extrema: ExtremaConfig,
    pub arbitration: ArbitrationConfig,
    pub strike: StrikeConfig,
    pub history: HistoryConfig,
}

/// Window lengths for the derived series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// SMA length for ohlc4, high and low.
    pub fast: usize,
    /// SMA length for the mid close average.
    pub mid: usize,
    /// SMA length for the slow close average.
    pub slow: usize,
    /// Lag applied to the high/low band.
    pub band_offset: usize,
    /// ATR lookback; also the VStop warm-up.
    pub atr_period: usize,
    pub kst: KstConfig,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            fast: 5,
            mid: 9,
            slow: 26,
            band_offset: 3,
            atr_period: 252,
            kst: KstConfig::default(),
        }
    }
}

impl SmoothingConfig {
    /// Index of the first bar at which every windowed series is defined.
    /// ATR is excluded: it is carried incrementally, not recomputed.
    pub fn derived_lookback(&self) -> usize {
        let fast = self.fast.saturating_sub(1);
        [
            fast + self.band_offset,
            self.mid.saturating_sub(1),
            self.slow.saturating_sub(1),
            Kst::new(self.kst.clone()).signal_lookback(),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Know Sure Thing momentum composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KstConfig {
    pub roc_periods: [usize; 4],
    pub sma_periods: [usize; 4],
    pub weights: [f64; 4],
    pub signal_period: usize,
}

impl Default for KstConfig {
    fn default() -> Self {
        Self {
            roc_periods: [20, 30, 40, 60],
            sma_periods: [20, 20, 20, 30],
            weights: [1.0, 2.0, 3.0, 4.0],
            signal_period: 26,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrailingStopConfig {
    /// One independent VStop instance per multiplier.
    pub multipliers: Vec<f64>,
    /// Instance that gates the trend band, drives the flip family and
    /// supplies the stop-based entry trigger.
    pub primary: f64,
}

impl Default for TrailingStopConfig {
    fn default() -> Self {
        Self {
            multipliers: vec![2.0, 3.0],
            primary: 2.0,
        }
    }
}

impl TrailingStopConfig {
    /// Position of the primary multiplier in `multipliers`.
    pub fn primary_index(&self) -> Option<usize> {
        self.multipliers.iter().position(|&k| k == self.primary)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtremaConfig {
    /// Neighbourhood radius for the strict local-extremum test.
    pub radius: usize,
    /// Swings with prominence at or below this are discarded.
    pub prominence_threshold: f64,
}

impl Default for ExtremaConfig {
    fn default() -> Self {
        Self {
            radius: 1,
            prominence_threshold: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Tie-break order for events on the same bar, highest priority first.
    pub priority: Vec<CrossFamily>,
    /// Require KST agreement on trend-band crosses.
    pub momentum_gate: bool,
    /// Require the winning side to agree with the latest retained swing.
    pub require_swing_agreement: bool,
    pub strike_anchor: StrikeAnchor,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            priority: vec![
                CrossFamily::TrendBand,
                CrossFamily::Momentum,
                CrossFamily::TrailingStopFlip,
            ],
            momentum_gate: false,
            require_swing_agreement: false,
            strike_anchor: StrikeAnchor::Trigger,
        }
    }
}

impl ArbitrationConfig {
    /// Rank of a family in the tie-break order; lower wins.
    pub fn rank(&self, family: CrossFamily) -> usize {
        self.priority
            .iter()
            .position(|&f| f == family)
            .unwrap_or(self.priority.len())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrikeConfig {
    /// Strike grid spacing.
    pub step: i64,
    /// Distance from the floored level to the traded strike.
    pub offset: i64,
}

impl Default for StrikeConfig {
    fn default() -> Self {
        Self {
            step: 100,
            offset: 100,
        }
    }
}

/// Bars retained per symbol for the per-cycle recompute.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Oldest bars are dropped beyond this. Unbounded when unset. Swings
    /// and cross events older than the window are no longer seen.
    pub max_bars: Option<usize>,
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.smoothing;
        let periods = [
            ("smoothing.fast", s.fast),
            ("smoothing.mid", s.mid),
            ("smoothing.slow", s.slow),
            ("smoothing.atr_period", s.atr_period),
            ("smoothing.kst.signal_period", s.kst.signal_period),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(invalid(format!("{name} must be >= 1")));
            }
        }
        if s.kst.roc_periods.contains(&0) || s.kst.sma_periods.contains(&0) {
            return Err(invalid("smoothing.kst periods must be >= 1"));
        }
        if s.kst.weights.iter().any(|w| !w.is_finite()) {
            return Err(invalid("smoothing.kst.weights must be finite"));
        }

        let ts = &self.trailing_stop;
        if ts.multipliers.is_empty() {
            return Err(invalid("trailing_stop.multipliers must not be empty"));
        }
        if ts.multipliers.iter().any(|k| !k.is_finite() || *k <= 0.0) {
            return Err(invalid("trailing_stop.multipliers must be positive"));
        }
        for (i, k) in ts.multipliers.iter().enumerate() {
            if ts.multipliers[..i].contains(k) {
                return Err(invalid(format!("duplicate multiplier {k}")));
            }
        }
        if ts.primary_index().is_none() {
            return Err(invalid(format!(
                "trailing_stop.primary {} is not one of the multipliers",
                ts.primary
            )));
        }

        if self.extrema.radius == 0 {
            return Err(invalid("extrema.radius must be >= 1"));
        }
        if !self.extrema.prominence_threshold.is_finite() {
            return Err(invalid("extrema.prominence_threshold must be finite"));
        }

        let priority = &self.arbitration.priority;
        for family in CrossFamily::ALL {
            match priority.iter().filter(|&&f| f == family).count() {
                1 => {}
                0 => return Err(invalid(format!("arbitration.priority is missing {family}"))),
                _ => return Err(invalid(format!("arbitration.priority repeats {family}"))),
            }
        }

        if self.strike.step <= 0 {
            return Err(invalid("strike.step must be positive"));
        }
        if self.strike.offset < 0 {
            return Err(invalid("strike.offset must not be negative"));
        }

        if let Some(max_bars) = self.history.max_bars {
            // The latest bar and the one before it need every series defined.
            let min = s.derived_lookback() + 2;
            if max_bars < min {
                return Err(invalid(format!(
                    "history.max_bars {max_bars} is below the {min} bars the smoothing windows need"
                )));
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
