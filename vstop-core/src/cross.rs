//! Cross events — sign-change transitions between indicator pairs.
//!
//! Crossover at bar i: `a[i] > b[i] && a[i-1] <= b[i-1]`.
//! Crossunder at bar i: `a[i] < b[i] && a[i-1] >= b[i-1]`.
//! Any indeterminate input on either bar means no event.
//!
//! Three families are tracked; each yields at most its most recent event per
//! direction over the available history.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::derived::{DerivedRow, DerivedSeries};
use crate::domain::Bar;
use crate::indicators::defined;
use crate::trailing_stop::StopPoint;

/// Signal family an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossFamily {
    /// Smoothed four-price average crossing the lagged high/low band.
    TrendBand,
    /// KST crossing its signal line.
    Momentum,
    /// Primary VStop trend changing direction.
    TrailingStopFlip,
}

impl CrossFamily {
    pub const ALL: [CrossFamily; 3] = [
        CrossFamily::TrendBand,
        CrossFamily::Momentum,
        CrossFamily::TrailingStopFlip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CrossFamily::TrendBand => "trend_band",
            CrossFamily::Momentum => "momentum",
            CrossFamily::TrailingStopFlip => "trailing_stop_flip",
        }
    }
}

impl fmt::Display for CrossFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossDirection {
    Up,
    Down,
}

/// Price levels captured at the event bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventLevels {
    pub close: f64,
    pub derived: DerivedRow,
    /// Primary trailing stop at the event bar.
    pub stop: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossEvent {
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    pub family: CrossFamily,
    pub direction: CrossDirection,
    pub levels: EventLevels,
}

/// `a` crosses above `b` between bars i-1 and i.
pub fn crossover(a: &[f64], b: &[f64], i: usize) -> bool {
    match pair_at(a, b, i) {
        Some(((a_prev, b_prev), (a_cur, b_cur))) => a_cur > b_cur && a_prev <= b_prev,
        None => false,
    }
}

/// `a` crosses below `b` between bars i-1 and i.
pub fn crossunder(a: &[f64], b: &[f64], i: usize) -> bool {
    match pair_at(a, b, i) {
        Some(((a_prev, b_prev), (a_cur, b_cur))) => a_cur < b_cur && a_prev >= b_prev,
        None => false,
    }
}

type Pair = (f64, f64);

fn pair_at(a: &[f64], b: &[f64], i: usize) -> Option<(Pair, Pair)> {
    if i == 0 {
        return None;
    }
    let value = |s: &[f64], j: usize| s.get(j).copied().and_then(defined);
    Some((
        (value(a, i - 1)?, value(b, i - 1)?),
        (value(a, i)?, value(b, i)?),
    ))
}

/// Most recent bar index in `1..len` satisfying `pred`.
fn latest_where(len: usize, pred: impl Fn(usize) -> bool) -> Option<usize> {
    (1..len).rev().find(|&i| pred(i))
}

/// Latest events, at most one per (family, direction).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossEvents {
    pub events: Vec<CrossEvent>,
}

impl CrossEvents {
    pub fn get(&self, family: CrossFamily, direction: CrossDirection) -> Option<&CrossEvent> {
        self.events
            .iter()
            .find(|e| e.family == family && e.direction == direction)
    }

    pub fn in_direction(&self, direction: CrossDirection) -> impl Iterator<Item = &CrossEvent> {
        self.events.iter().filter(move |e| e.direction == direction)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrossEventDetector {
    momentum_gate: bool,
}

impl CrossEventDetector {
    pub fn new(momentum_gate: bool) -> Self {
        Self { momentum_gate }
    }

    /// Detect the latest event of each family and direction.
    ///
    /// `primary` is the primary trailing stop, bar-aligned with `bars`; `None`
    /// marks bars without a stop value (warm-up, suspension, or before resume).
    pub fn detect(
        &self,
        bars: &[Bar],
        derived: &DerivedSeries,
        primary: &[Option<StopPoint>],
    ) -> CrossEvents {
        let n = bars.len().min(derived.len()).min(primary.len());
        let trend_at = |i: usize| primary[i].map(|p| p.trend_up);

        let band_up = latest_where(n, |i| {
            trend_at(i) == Some(true)
                && crossover(&derived.ohlc4_sma, &derived.high_sma_lagged, i)
                && self.momentum_allows(derived, i, CrossDirection::Up)
        });
        let band_down = latest_where(n, |i| {
            trend_at(i) == Some(false)
                && crossunder(&derived.ohlc4_sma, &derived.low_sma_lagged, i)
                && self.momentum_allows(derived, i, CrossDirection::Down)
        });
        let momentum_up = latest_where(n, |i| crossover(&derived.kst, &derived.kst_signal, i));
        let momentum_down = latest_where(n, |i| crossunder(&derived.kst, &derived.kst_signal, i));
        let flip_up = latest_where(n, |i| primary[i].is_some_and(|p| p.flipped && p.trend_up));
        let flip_down = latest_where(n, |i| primary[i].is_some_and(|p| p.flipped && !p.trend_up));

        let found = [
            (CrossFamily::TrendBand, CrossDirection::Up, band_up),
            (CrossFamily::TrendBand, CrossDirection::Down, band_down),
            (CrossFamily::Momentum, CrossDirection::Up, momentum_up),
            (CrossFamily::Momentum, CrossDirection::Down, momentum_down),
            (CrossFamily::TrailingStopFlip, CrossDirection::Up, flip_up),
            (CrossFamily::TrailingStopFlip, CrossDirection::Down, flip_down),
        ];

        let events = found
            .into_iter()
            .filter_map(|(family, direction, index)| {
                index.map(|i| CrossEvent {
                    bar_index: i,
                    timestamp: bars[i].timestamp,
                    family,
                    direction,
                    levels: EventLevels {
                        close: bars[i].close,
                        derived: derived.row(i),
                        stop: primary[i].map(|p| p.stop),
                    },
                })
            })
            .collect();

        CrossEvents { events }
    }

    /// KST agreement for trend-band crosses: KST on the right side of its
    /// signal line, or the signal line moving in the cross direction.
    fn momentum_allows(&self, derived: &DerivedSeries, i: usize, direction: CrossDirection) -> bool {
        if !self.momentum_gate {
            return true;
        }
        let at = |s: &[f64], j: usize| s.get(j).copied().and_then(defined);
        let kst = at(&derived.kst, i);
        let signal = at(&derived.kst_signal, i);
        let prev_signal = i.checked_sub(1).and_then(|j| at(&derived.kst_signal, j));

        let (above, rising) = match direction {
            CrossDirection::Up => (
                kst.zip(signal).is_some_and(|(k, s)| k > s),
                signal.zip(prev_signal).is_some_and(|(s, p)| s > p),
            ),
            CrossDirection::Down => (
                kst.zip(signal).is_some_and(|(k, s)| k < s),
                signal.zip(prev_signal).is_some_and(|(s, p)| s < p),
            ),
        };
        above || rising
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    const NAN: f64 = f64::NAN;

    fn up(stop: f64) -> Option<StopPoint> {
        Some(StopPoint {
            stop,
            trend_up: true,
            flipped: false,
        })
    }

    fn down(stop: f64) -> Option<StopPoint> {
        Some(StopPoint {
            stop,
            trend_up: false,
            flipped: false,
        })
    }

    fn flip(point: Option<StopPoint>) -> Option<StopPoint> {
        point.map(|p| StopPoint { flipped: true, ..p })
    }

    /// Derived series of length `n` with every series NaN.
    fn blank(n: usize) -> DerivedSeries {
        let nan = vec![NAN; n];
        DerivedSeries {
            ohlc4: nan.clone(),
            ohlc4_sma: nan.clone(),
            high_sma: nan.clone(),
            low_sma: nan.clone(),
            close_sma_mid: nan.clone(),
            close_sma_slow: nan.clone(),
            high_sma_lagged: nan.clone(),
            low_sma_lagged: nan.clone(),
            atr: nan.clone(),
            kst: nan.clone(),
            kst_signal: nan,
        }
    }

    #[test]
    fn crossover_requires_strict_current_and_weak_previous() {
        assert!(crossover(&[1.0, 3.0], &[2.0, 2.0], 1));
        assert!(crossover(&[2.0, 3.0], &[2.0, 2.0], 1)); // touch then cross
        assert!(!crossover(&[1.0, 2.0], &[2.0, 2.0], 1)); // touch only
        assert!(!crossover(&[3.0, 4.0], &[2.0, 2.0], 1)); // already above
    }

    #[test]
    fn crossunder_mirrors_crossover() {
        assert!(crossunder(&[3.0, 1.0], &[2.0, 2.0], 1));
        assert!(crossunder(&[2.0, 1.0], &[2.0, 2.0], 1));
        assert!(!crossunder(&[3.0, 2.0], &[2.0, 2.0], 1));
    }

    #[test]
    fn indeterminate_inputs_never_cross() {
        assert!(!crossover(&[NAN, 3.0], &[2.0, 2.0], 1));
        assert!(!crossover(&[1.0, 3.0], &[2.0, NAN], 1));
        assert!(!crossover(&[1.0], &[2.0], 0));
        assert!(!crossover(&[1.0, 3.0], &[2.0], 1));
    }

    #[test]
    fn momentum_family_reports_latest_per_direction() {
        let bars = make_bars(&[100.0; 6]);
        let mut derived = blank(6);
        derived.kst = vec![NAN, 1.0, 3.0, 1.0, 3.0, 4.0];
        derived.kst_signal = vec![NAN, 2.0, 2.0, 2.0, 2.0, 2.0];
        let primary = vec![None; 6];

        let events = CrossEventDetector::new(false).detect(&bars, &derived, &primary);
        let up = events.get(CrossFamily::Momentum, CrossDirection::Up).unwrap();
        let down = events.get(CrossFamily::Momentum, CrossDirection::Down).unwrap();
        assert_eq!(up.bar_index, 4);
        assert_eq!(down.bar_index, 3);
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn trend_band_is_gated_by_primary_trend() {
        let bars = make_bars(&[100.0; 4]);
        let mut derived = blank(4);
        derived.ohlc4_sma = vec![NAN, 9.0, 11.0, 12.0];
        derived.high_sma_lagged = vec![NAN, 10.0, 10.0, 10.0];
        derived.low_sma_lagged = vec![NAN, 5.0, 5.0, 5.0];

        let trending_down = vec![None, down(20.0), down(20.0), down(20.0)];
        let events = CrossEventDetector::new(false).detect(&bars, &derived, &trending_down);
        assert!(events.get(CrossFamily::TrendBand, CrossDirection::Up).is_none());

        let trending_up = vec![None, up(8.0), up(8.5), up(9.0)];
        let events = CrossEventDetector::new(false).detect(&bars, &derived, &trending_up);
        let event = events.get(CrossFamily::TrendBand, CrossDirection::Up).unwrap();
        assert_eq!(event.bar_index, 2);
        assert_eq!(event.levels.stop, Some(8.5));
        assert_eq!(event.levels.derived.ohlc4_sma, Some(11.0));
    }

    #[test]
    fn trend_band_without_stop_value_is_no_event() {
        let bars = make_bars(&[100.0; 3]);
        let mut derived = blank(3);
        derived.ohlc4_sma = vec![9.0, 9.0, 11.0];
        derived.high_sma_lagged = vec![10.0, 10.0, 10.0];
        let events = CrossEventDetector::new(false).detect(&bars, &derived, &[None, None, None]);
        assert!(events.is_empty());
    }

    #[test]
    fn momentum_gate_blocks_disagreeing_band_cross() {
        let bars = make_bars(&[100.0; 3]);
        let mut derived = blank(3);
        derived.ohlc4_sma = vec![9.0, 9.0, 11.0];
        derived.high_sma_lagged = vec![10.0, 10.0, 10.0];
        derived.kst = vec![0.0, 0.0, -1.0];
        derived.kst_signal = vec![0.0, 1.0, 0.5]; // below and falling
        let primary = vec![up(5.0), up(5.0), up(5.0)];

        let ungated = CrossEventDetector::new(false).detect(&bars, &derived, &primary);
        assert!(ungated.get(CrossFamily::TrendBand, CrossDirection::Up).is_some());

        let gated = CrossEventDetector::new(true).detect(&bars, &derived, &primary);
        assert!(gated.get(CrossFamily::TrendBand, CrossDirection::Up).is_none());

        // Rising signal line is enough on its own.
        derived.kst_signal = vec![0.0, 0.0, 0.5];
        let gated = CrossEventDetector::new(true).detect(&bars, &derived, &primary);
        assert!(gated.get(CrossFamily::TrendBand, CrossDirection::Up).is_some());
    }

    #[test]
    fn flip_family_follows_primary_trend_changes() {
        let bars = make_bars(&[100.0, 90.0, 95.0, 110.0, 105.0]);
        let derived = blank(5);
        let primary = vec![
            None,
            flip(down(100.0)),
            down(99.0),
            flip(up(100.0)),
            up(100.0),
        ];

        let events = CrossEventDetector::new(false).detect(&bars, &derived, &primary);
        let up_event = events
            .get(CrossFamily::TrailingStopFlip, CrossDirection::Up)
            .unwrap();
        let down_event = events
            .get(CrossFamily::TrailingStopFlip, CrossDirection::Down)
            .unwrap();
        assert_eq!(up_event.bar_index, 3);
        assert_eq!(up_event.levels.close, 110.0);
        assert_eq!(down_event.bar_index, 1);
        assert_eq!(events.in_direction(CrossDirection::Up).count(), 1);
    }

    #[test]
    fn family_names_serialize_snake_case() {
        let json = serde_json::to_string(&CrossFamily::ALL).unwrap();
        assert_eq!(json, r#"["trend_band","momentum","trailing_stop_flip"]"#);
        assert_eq!(CrossFamily::TrailingStopFlip.to_string(), "trailing_stop_flip");
    }
}
