//! Swing extrema — strict local maxima/minima scored by topographic prominence.
//!
//! A peak is strictly greater than every value within `radius` on both sides.
//! Neighbourhoods clip at the series edges; the first and last points never
//! qualify. Prominence follows the usual definition: walk outwards from the
//! peak until a strictly higher value (or the series edge) is met, take the
//! lowest point passed on each side, and subtract the higher of the two bases.
//!
//! Troughs are peaks of the negated series.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::config::ExtremaConfig;
use crate::derived::DerivedSeries;
use crate::domain::Bar;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwingKind {
    Peak,
    Trough,
}

/// A retained, prominence-filtered local extremum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwingPoint {
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    /// Value in the original (un-negated) series.
    pub value: f64,
    pub prominence: f64,
    pub kind: SwingKind,
}

/// Indices of strict local maxima. Non-finite values never qualify.
pub fn find_peaks(values: &[f64], radius: usize) -> Vec<usize> {
    let n = values.len();
    if n < 3 || radius == 0 {
        return Vec::new();
    }

    (1..n - 1)
        .filter(|&i| {
            let v = values[i];
            if !v.is_finite() {
                return false;
            }
            let lo = i.saturating_sub(radius);
            let hi = (i + radius).min(n - 1);
            (lo..=hi).filter(|&j| j != i).all(|j| values[j] < v)
        })
        .collect()
}

/// Prominence of each peak in `peaks`.
///
/// The base scan on each side stops at the first strictly higher value or at
/// a non-finite value.
pub fn prominences(values: &[f64], peaks: &[usize]) -> Vec<f64> {
    peaks
        .iter()
        .map(|&peak| {
            let height = values[peak];

            let mut left_base = height;
            for &v in values[..peak].iter().rev() {
                if !v.is_finite() || v > height {
                    break;
                }
                left_base = left_base.min(v);
            }

            let mut right_base = height;
            for &v in &values[peak + 1..] {
                if !v.is_finite() || v > height {
                    break;
                }
                right_base = right_base.min(v);
            }

            height - left_base.max(right_base)
        })
        .collect()
}

/// Retained peaks and troughs, each in bar order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SwingPoints {
    pub peaks: Vec<SwingPoint>,
    pub troughs: Vec<SwingPoint>,
}

impl SwingPoints {
    pub fn latest_peak(&self) -> Option<&SwingPoint> {
        self.peaks.last()
    }

    pub fn latest_trough(&self) -> Option<&SwingPoint> {
        self.troughs.last()
    }

    /// The most recent retained swing of either kind.
    pub fn latest(&self) -> Option<&SwingPoint> {
        match (self.latest_peak(), self.latest_trough()) {
            (Some(p), Some(t)) => Some(if p.bar_index >= t.bar_index { p } else { t }),
            (p, t) => p.or(t),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty() && self.troughs.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtremaDetector {
    radius: usize,
    threshold: f64,
}

impl ExtremaDetector {
    pub fn new(config: &ExtremaConfig) -> Self {
        Self {
            radius: config.radius,
            threshold: config.prominence_threshold,
        }
    }

    /// Peaks of `values` whose prominence exceeds the threshold.
    pub fn peaks(&self, values: &[f64], timestamps: &[NaiveDateTime]) -> Vec<SwingPoint> {
        self.retain(values, timestamps, SwingKind::Peak, 1.0)
    }

    /// Troughs of `values`, found as peaks of the negated series.
    pub fn troughs(&self, values: &[f64], timestamps: &[NaiveDateTime]) -> Vec<SwingPoint> {
        let negated: Vec<f64> = values.iter().map(|v| -v).collect();
        self.retain(&negated, timestamps, SwingKind::Trough, -1.0)
    }

    /// Swings of the smoothed high (peaks) and smoothed low (troughs).
    pub fn detect(&self, bars: &[Bar], derived: &DerivedSeries) -> SwingPoints {
        let timestamps: Vec<NaiveDateTime> = bars.iter().map(|b| b.timestamp).collect();
        SwingPoints {
            peaks: self.peaks(&derived.high_sma, &timestamps),
            troughs: self.troughs(&derived.low_sma, &timestamps),
        }
    }

    fn retain(
        &self,
        values: &[f64],
        timestamps: &[NaiveDateTime],
        kind: SwingKind,
        sign: f64,
    ) -> Vec<SwingPoint> {
        let peaks = find_peaks(values, self.radius);
        let proms = prominences(values, &peaks);

        peaks
            .into_iter()
            .zip(proms)
            .filter(|&(_, prominence)| prominence > self.threshold)
            .filter_map(|(bar_index, prominence)| {
                timestamps.get(bar_index).map(|&timestamp| SwingPoint {
                    bar_index,
                    timestamp,
                    value: sign * values[bar_index],
                    prominence,
                    kind,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, make_bars, DEFAULT_EPSILON};

    fn timestamps(n: usize) -> Vec<NaiveDateTime> {
        make_bars(&vec![100.0; n]).iter().map(|b| b.timestamp).collect()
    }

    fn detector(threshold: f64) -> ExtremaDetector {
        ExtremaDetector::new(&ExtremaConfig {
            radius: 1,
            prominence_threshold: threshold,
        })
    }

    #[test]
    fn finds_strict_local_maxima() {
        let series = [1.0, 3.0, 2.0, 5.0, 1.0, 4.0, 1.0];
        assert_eq!(find_peaks(&series, 1), vec![1, 3, 5]);
    }

    #[test]
    fn prominence_of_reference_series() {
        let series = [1.0, 3.0, 2.0, 5.0, 1.0, 4.0, 1.0];
        let proms = prominences(&series, &[1, 3, 5]);
        assert_approx(proms[0], 1.0, DEFAULT_EPSILON);
        assert_approx(proms[1], 4.0, DEFAULT_EPSILON);
        assert_approx(proms[2], 3.0, DEFAULT_EPSILON);
        assert!(proms[1] > proms[0]);
    }

    #[test]
    fn plateaus_are_not_peaks() {
        assert!(find_peaks(&[1.0, 3.0, 3.0, 1.0], 1).is_empty());
    }

    #[test]
    fn edges_never_qualify() {
        assert!(find_peaks(&[5.0, 1.0, 0.0, 1.0, 5.0], 1).is_empty());
    }

    #[test]
    fn wider_radius_suppresses_minor_peaks() {
        let series = [1.0, 3.0, 2.0, 5.0, 1.0, 4.0, 1.0];
        assert_eq!(find_peaks(&series, 2), vec![3]);
    }

    #[test]
    fn nan_never_qualifies_and_stops_base_scan() {
        let series = [f64::NAN, 2.0, 1.0, 4.0, 1.0];
        assert_eq!(find_peaks(&series, 1), vec![3]);
        // Left scan stops at NaN: bases are min(1,2)=1 and 1.
        assert_approx(prominences(&series, &[3])[0], 3.0, DEFAULT_EPSILON);
        assert!(find_peaks(&[1.0, f64::NAN, 1.0], 1).is_empty());
    }

    #[test]
    fn threshold_filters_by_prominence() {
        let series = [1.0, 3.0, 2.0, 5.0, 1.0, 4.0, 1.0];
        let peaks = detector(2.0).peaks(&series, &timestamps(7));
        let indices: Vec<usize> = peaks.iter().map(|p| p.bar_index).collect();
        assert_eq!(indices, vec![3, 5]);
        assert!(peaks.iter().all(|p| p.kind == SwingKind::Peak));
    }

    #[test]
    fn prominence_must_strictly_exceed_threshold() {
        let series = [1.0, 3.0, 2.0, 5.0, 1.0, 4.0, 1.0];
        let peaks = detector(3.0).peaks(&series, &timestamps(7));
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].value, 5.0);
    }

    #[test]
    fn troughs_report_original_values() {
        let series = [5.0, 2.0, 4.0, 0.0, 6.0];
        let troughs = detector(0.5).troughs(&series, &timestamps(5));
        let values: Vec<f64> = troughs.iter().map(|t| t.value).collect();
        assert_eq!(values, vec![2.0, 0.0]);
        assert!(troughs.iter().all(|t| t.kind == SwingKind::Trough));
    }

    #[test]
    fn latest_picks_most_recent_kind() {
        let series_high = [1.0, 3.0, 1.0, 1.0, 1.0, 1.0];
        let series_low = [5.0, 5.0, 5.0, 2.0, 5.0, 5.0];
        let ts = timestamps(6);
        let d = detector(0.5);
        let swings = SwingPoints {
            peaks: d.peaks(&series_high, &ts),
            troughs: d.troughs(&series_low, &ts),
        };
        let latest = swings.latest().unwrap();
        assert_eq!(latest.kind, SwingKind::Trough);
        assert_eq!(latest.bar_index, 3);
    }

    #[test]
    fn empty_series_yields_no_swings() {
        let swings = SwingPoints::default();
        assert!(swings.is_empty());
        assert!(swings.latest().is_none());
        assert!(find_peaks(&[], 1).is_empty());
    }
}
