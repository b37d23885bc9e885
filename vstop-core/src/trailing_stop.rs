//! Volatility stop (VStop) — ATR-scaled trailing stop with trend flips.
//!
//! Inherently sequential: each bar's state depends on the previous bar's.
//! The transition itself is the pure function [`TrailingStopState::advance`];
//! [`TrailingStopEngine`] wraps it with warm-up handling and NaN suspension.
//!
//! Per bar, with `delta = atr * k`:
//! 1. `max = max(max, close)`, `min = min(min, close)`
//! 2. up: `stop = max(stop, max - delta)`; down: `stop = min(stop, min + delta)`
//! 3. `trend_up = close >= stop`
//! 4. on a flip: `max = min = close`, stop reseeded from the flip bar
//!
//! Within a trend the stop only tightens. A close exactly on the stop keeps
//! the trend up.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::engine::warmup::WarmupState;
use crate::indicators::defined;

/// Recurrence state carried from one bar to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrailingStopState {
    pub running_max: f64,
    pub running_min: f64,
    pub trend_up: bool,
    /// Undefined only in the seed state that precedes the first live bar.
    pub stop: Option<f64>,
}

impl TrailingStopState {
    /// State assumed for the bar before the first live bar.
    pub fn seed(close: f64) -> Self {
        Self {
            running_max: close,
            running_min: close,
            trend_up: true,
            stop: None,
        }
    }

    /// One step of the recurrence. Pure: the same inputs always give the same state.
    pub fn advance(&self, close: f64, delta: f64) -> Self {
        let mut running_max = self.running_max.max(close);
        let mut running_min = self.running_min.min(close);
        let anchor = self.stop.unwrap_or(close);

        let mut stop = if self.trend_up {
            anchor.max(running_max - delta)
        } else {
            anchor.min(running_min + delta)
        };

        let trend_up = close >= stop;
        if trend_up != self.trend_up {
            running_max = close;
            running_min = close;
            stop = if trend_up {
                running_max - delta
            } else {
                running_min + delta
            };
        }

        Self {
            running_max,
            running_min,
            trend_up,
            stop: Some(stop),
        }
    }
}

/// Output of one live bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopPoint {
    pub stop: f64,
    pub trend_up: bool,
    /// Trend differs from the previous bar's.
    pub flipped: bool,
}

/// Serializable form of a [`TrailingStopEngine`], persisted per (symbol, multiplier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopSnapshot {
    pub multiplier: f64,
    pub state: Option<TrailingStopState>,
    /// Close of the last warm-up bar, used to seed the first live bar.
    pub seed_close: Option<f64>,
    pub warmup: WarmupState,
}

/// Stateful VStop for one multiplier.
#[derive(Debug, Clone, PartialEq)]
pub struct TrailingStopEngine {
    multiplier: f64,
    state: Option<TrailingStopState>,
    seed_close: Option<f64>,
    warmup: WarmupState,
}

impl TrailingStopEngine {
    /// `lookback` is the ATR lookback: bars with index below it produce no value.
    pub fn new(multiplier: f64, lookback: usize) -> Self {
        Self {
            multiplier,
            state: None,
            seed_close: None,
            warmup: WarmupState::new(lookback),
        }
    }

    pub fn from_snapshot(snapshot: StopSnapshot) -> Self {
        Self {
            multiplier: snapshot.multiplier,
            state: snapshot.state,
            seed_close: snapshot.seed_close,
            warmup: snapshot.warmup,
        }
    }

    pub fn snapshot(&self) -> StopSnapshot {
        StopSnapshot {
            multiplier: self.multiplier,
            state: self.state,
            seed_close: self.seed_close,
            warmup: self.warmup.clone(),
        }
    }

    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn state(&self) -> Option<&TrailingStopState> {
        self.state.as_ref()
    }

    pub fn is_warm(&self) -> bool {
        self.warmup.is_warm()
    }

    /// Bars of warm-up before the first live bar.
    pub fn lookback(&self) -> usize {
        self.warmup.warmup_bars()
    }

    /// Feed one bar. Returns `None` during warm-up and for suspended bars.
    ///
    /// A non-finite close skips the bar entirely. A missing ATR after
    /// warm-up suspends the update but still counts the bar.
    pub fn update(&mut self, close: f64, atr: Option<f64>) -> Option<StopPoint> {
        if !close.is_finite() {
            warn!(multiplier = self.multiplier, close, "non-finite close, bar skipped");
            return None;
        }

        let live = self.warmup.is_warm();
        self.warmup.process_bar();

        let atr = match (live, atr.and_then(defined)) {
            (true, Some(atr)) => atr,
            (_, atr) => {
                if self.state.is_none() {
                    self.seed_close = Some(close);
                } else if atr.is_none() {
                    debug!(multiplier = self.multiplier, "indeterminate ATR, update suspended");
                }
                return None;
            }
        };

        let prev = self
            .state
            .unwrap_or_else(|| TrailingStopState::seed(self.seed_close.unwrap_or(close)));
        let next = prev.advance(close, atr * self.multiplier);
        self.state = Some(next);
        self.seed_close = None;

        next.stop.map(|stop| StopPoint {
            stop,
            trend_up: next.trend_up,
            flipped: next.trend_up != prev.trend_up,
        })
    }
}

/// Replay the recurrence over a full history (cold start).
pub fn trailing_stop_series(
    closes: &[f64],
    atr: &[f64],
    multiplier: f64,
    lookback: usize,
) -> Vec<Option<StopPoint>> {
    let mut engine = TrailingStopEngine::new(multiplier, lookback);
    closes
        .iter()
        .zip(atr.iter())
        .map(|(&close, &a)| engine.update(close, Some(a)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prior() -> TrailingStopState {
        TrailingStopState {
            running_max: 100.0,
            running_min: 80.0,
            trend_up: true,
            stop: Some(90.0),
        }
    }

    #[test]
    fn no_flip_keeps_stop() {
        // ATR 10, k 2 → delta 20
        let next = prior().advance(95.0, 20.0);
        assert_eq!(next.running_max, 100.0);
        assert_eq!(next.running_min, 80.0);
        assert_eq!(next.stop, Some(90.0));
        assert!(next.trend_up);
    }

    #[test]
    fn close_below_stop_flips_and_reseeds() {
        let next = prior().advance(70.0, 20.0);
        assert!(!next.trend_up);
        assert_eq!(next.running_max, 70.0);
        assert_eq!(next.running_min, 70.0);
        assert_eq!(next.stop, Some(90.0));
    }

    #[test]
    fn close_on_stop_does_not_flip() {
        let next = prior().advance(90.0, 20.0);
        assert!(next.trend_up);
        assert_eq!(next.stop, Some(90.0));
    }

    #[test]
    fn up_trend_stop_ratchets_with_new_highs() {
        let next = prior().advance(130.0, 20.0);
        assert_eq!(next.running_max, 130.0);
        assert_eq!(next.stop, Some(110.0));
    }

    #[test]
    fn down_trend_stop_tightens_with_new_lows() {
        let down = TrailingStopState {
            running_max: 70.0,
            running_min: 70.0,
            trend_up: false,
            stop: Some(90.0),
        };
        let next = down.advance(60.0, 20.0);
        assert!(!next.trend_up);
        assert_eq!(next.stop, Some(80.0));

        // Bounce that stays under the stop leaves it in place.
        let next = next.advance(75.0, 20.0);
        assert!(!next.trend_up);
        assert_eq!(next.stop, Some(80.0));
    }

    #[test]
    fn seed_state_uses_close_as_anchor() {
        let next = TrailingStopState::seed(100.0).advance(100.0, 20.0);
        // stop = max(100, 100 - 20) = 100, close >= stop → still up
        assert!(next.trend_up);
        assert_eq!(next.stop, Some(100.0));
    }

    #[test]
    fn advance_is_idempotent() {
        let state = prior();
        assert_eq!(state.advance(70.0, 20.0), state.advance(70.0, 20.0));
    }

    #[test]
    fn engine_reports_nothing_before_lookback() {
        let mut engine = TrailingStopEngine::new(2.0, 3);
        assert_eq!(engine.update(100.0, None), None);
        assert_eq!(engine.update(101.0, None), None);
        // A defined ATR before the lookback is still warm-up.
        assert_eq!(engine.update(102.0, Some(1.0)), None);
        let point = engine.update(103.0, Some(1.0)).unwrap();
        // Seeded from the previous close 102: max=103, stop=max(103, 103-2)=103
        assert!(point.trend_up);
        assert_eq!(point.stop, 103.0);
        assert!(!point.flipped);
    }

    #[test]
    fn engine_skips_nan_close() {
        let mut engine = TrailingStopEngine::new(2.0, 0);
        engine.update(100.0, Some(10.0));
        let before = engine.snapshot();
        assert_eq!(engine.update(f64::NAN, Some(10.0)), None);
        assert_eq!(engine.snapshot(), before);
    }

    #[test]
    fn engine_suspends_on_missing_atr() {
        let mut engine = TrailingStopEngine::new(2.0, 0);
        engine.update(100.0, Some(10.0));
        let state = *engine.state().unwrap();
        assert_eq!(engine.update(50.0, None), None);
        assert_eq!(engine.state(), Some(&state));
    }

    #[test]
    fn snapshot_roundtrip_continues_identically() {
        let closes = [100.0, 104.0, 99.0, 90.0, 95.0, 110.0, 108.0];
        let mut straight = TrailingStopEngine::new(3.0, 2);
        let mut resumed = TrailingStopEngine::new(3.0, 2);
        for &c in &closes[..4] {
            straight.update(c, Some(2.0));
            resumed.update(c, Some(2.0));
        }
        let json = serde_json::to_string(&resumed.snapshot()).unwrap();
        let mut resumed = TrailingStopEngine::from_snapshot(serde_json::from_str(&json).unwrap());
        for &c in &closes[4..] {
            assert_eq!(straight.update(c, Some(2.0)), resumed.update(c, Some(2.0)));
        }
    }

    #[test]
    fn series_flags_flips() {
        let closes = [100.0, 100.0, 120.0, 80.0, 70.0, 130.0];
        let atr = [5.0; 6];
        let points = trailing_stop_series(&closes, &atr, 2.0, 1);
        assert_eq!(points[0], None);
        let flips: Vec<usize> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_some_and(|p| p.flipped))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(flips, vec![3, 5]);
    }
}
