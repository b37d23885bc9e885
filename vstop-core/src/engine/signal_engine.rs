//! Per-symbol evaluation engine — one cycle per bar.
//!
//! A cycle validates the bar, extends the derived series, advances the ATR
//! carry and every trailing-stop instance, detects cross events and swings
//! over the retained history, and arbitrates. A rejected bar leaves the
//! engine untouched; the recurrence state is advanced on a clone and
//! committed in one assignment.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::arbiter::{Arbitration, SignalArbiter};
use crate::config::EngineConfig;
use crate::cross::CrossEventDetector;
use crate::derived::{DerivedRow, DerivedSeries};
use crate::domain::{Bar, Signal, Symbol};
use crate::error::{BarError, ConfigError, StateError};
use crate::extrema::ExtremaDetector;
use crate::indicators::WilderAtr;
use crate::persistence::EngineSnapshot;
use crate::trailing_stop::{StopPoint, TrailingStopEngine};

/// One multiplier's output for a bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopReading {
    pub multiplier: f64,
    pub point: Option<StopPoint>,
}

/// Result of one evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cycle {
    pub symbol: Symbol,
    /// Count of accepted bars before this one, across restarts.
    pub bar_index: usize,
    pub timestamp: NaiveDateTime,
    /// `atr` is the carried Wilder ATR the stops were advanced with.
    pub derived: DerivedRow,
    pub stops: Vec<StopReading>,
    pub arbitration: Arbitration,
}

impl Cycle {
    pub fn signal(&self) -> Option<&Signal> {
        self.arbitration.signal.as_ref()
    }

    pub fn stop(&self, multiplier: f64) -> Option<StopPoint> {
        self.stops
            .iter()
            .find(|r| r.multiplier == multiplier)
            .and_then(|r| r.point)
    }
}

#[derive(Debug, Clone)]
pub struct SignalEngine {
    symbol: Symbol,
    config: EngineConfig,
    /// Retained window, at most `history.max_bars` long.
    bars: Vec<Bar>,
    atr: WilderAtr,
    stops: Vec<TrailingStopEngine>,
    primary_index: usize,
    /// Primary stop output, bar-aligned with `bars`.
    primary: Vec<Option<StopPoint>>,
    bars_seen: usize,
    last_timestamp: Option<NaiveDateTime>,
    last_close: Option<f64>,
    extrema: ExtremaDetector,
    crosses: CrossEventDetector,
    arbiter: SignalArbiter,
}

impl SignalEngine {
    /// Fresh engine with no history.
    pub fn new(symbol: impl Into<Symbol>, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let primary_index = config.trailing_stop.primary_index().ok_or_else(|| {
            ConfigError::Invalid("primary multiplier missing from multipliers".into())
        })?;
        let stops = config
            .trailing_stop
            .multipliers
            .iter()
            .map(|&k| TrailingStopEngine::new(k, config.smoothing.atr_period))
            .collect();

        Ok(Self {
            symbol: symbol.into(),
            extrema: ExtremaDetector::new(&config.extrema),
            crosses: CrossEventDetector::new(config.arbitration.momentum_gate),
            arbiter: SignalArbiter::new(&config.arbitration, &config.strike),
            atr: WilderAtr::new(config.smoothing.atr_period),
            config,
            bars: Vec::new(),
            stops,
            primary_index,
            primary: Vec::new(),
            bars_seen: 0,
            last_timestamp: None,
            last_close: None,
        })
    }

    /// Cold start: replay a full history without arbitrating.
    ///
    /// Malformed bars in the history are logged and skipped.
    pub fn from_history(
        symbol: impl Into<Symbol>,
        config: EngineConfig,
        history: impl IntoIterator<Item = Bar>,
    ) -> Result<Self, ConfigError> {
        let mut engine = Self::new(symbol, config)?;
        engine.absorb(history);

        for bar in &engine.bars {
            let atr = engine.atr.update(bar);
            let mut primary = None;
            for (k, stop) in engine.stops.iter_mut().enumerate() {
                let point = stop.update(bar.close, atr);
                if k == engine.primary_index {
                    primary = point;
                }
            }
            engine.primary.push(primary);
        }
        engine.bars_seen = engine.bars.len();
        engine.trim();

        debug!(
            symbol = %engine.symbol,
            bars = engine.bars_seen,
            "engine replayed history"
        );
        Ok(engine)
    }

    /// Warm restart: trust `snapshot` as the state after its last bar.
    ///
    /// `history` only seeds the derived-series window and may be empty. When
    /// it is not, it must end on the snapshot's last bar. Stop flips inside
    /// `history` are not replayed.
    pub fn resume(
        config: EngineConfig,
        snapshot: EngineSnapshot,
        history: impl IntoIterator<Item = Bar>,
    ) -> Result<Self, StateError> {
        let mut engine = Self::new(snapshot.symbol.clone(), config)?;
        engine.absorb(history);

        if let Some(last) = engine.bars.last() {
            if Some(last.timestamp) != snapshot.last_timestamp {
                return Err(StateError::HistoryMismatch {
                    history_end: Some(last.timestamp),
                    snapshot: snapshot.last_timestamp,
                });
            }
            if Some(last.close) != snapshot.last_close {
                return Err(StateError::LastCloseMismatch {
                    timestamp: last.timestamp,
                    history: last.close,
                    snapshot: snapshot.last_close,
                });
            }
        }

        let lookback = engine.config.smoothing.atr_period;
        engine.stops = engine
            .config
            .trailing_stop
            .multipliers
            .iter()
            .map(|&k| -> Result<TrailingStopEngine, StateError> {
                let stop = snapshot
                    .stop(k)
                    .cloned()
                    .map(TrailingStopEngine::from_snapshot)
                    .ok_or_else(|| StateError::MissingMultiplier {
                        symbol: snapshot.symbol.clone(),
                        multiplier: k,
                    })?;
                if stop.lookback() != lookback {
                    return Err(StateError::LookbackMismatch {
                        multiplier: k,
                        snapshot: stop.lookback(),
                        configured: lookback,
                    });
                }
                Ok(stop)
            })
            .collect::<Result<Vec<_>, _>>()?;

        match snapshot.atr {
            Some(atr) if atr.period() == lookback => engine.atr = atr,
            Some(atr) => {
                return Err(StateError::AtrPeriodMismatch {
                    snapshot: atr.period(),
                    configured: lookback,
                })
            }
            None => {
                warn!(
                    symbol = %engine.symbol,
                    window = engine.bars.len(),
                    "snapshot has no ATR carry, rebuilding from history"
                );
                for bar in &engine.bars {
                    engine.atr.update(bar);
                }
            }
        }

        engine.primary = vec![None; engine.bars.len()];
        engine.bars_seen = snapshot.bars_seen;
        engine.last_timestamp = snapshot.last_timestamp;
        engine.last_close = snapshot.last_close;
        engine.trim();

        info!(
            symbol = %engine.symbol,
            bars_seen = engine.bars_seen,
            window = engine.bars.len(),
            "engine resumed from snapshot"
        );
        Ok(engine)
    }

    /// Append valid bars from `history`, skipping malformed ones.
    fn absorb(&mut self, history: impl IntoIterator<Item = Bar>) {
        for bar in history {
            match self.check(&bar) {
                Ok(()) => {
                    self.last_timestamp = Some(bar.timestamp);
                    self.last_close = Some(bar.close);
                    self.bars.push(bar);
                }
                Err(err) => warn!(symbol = %self.symbol, %err, "malformed history bar skipped"),
            }
        }
    }

    fn check(&self, bar: &Bar) -> Result<(), BarError> {
        if bar.symbol != self.symbol {
            return Err(BarError::SymbolMismatch {
                expected: self.symbol.clone(),
                got: bar.symbol.clone(),
            });
        }
        bar.validate(self.last_timestamp)
    }

    /// Drop the oldest bars beyond `history.max_bars`.
    fn trim(&mut self) {
        let Some(max) = self.config.history.max_bars else {
            return;
        };
        if self.bars.len() > max {
            let excess = self.bars.len() - max;
            self.bars.drain(..excess);
            self.primary.drain(..excess);
        }
    }

    /// Run one evaluation cycle for a new bar.
    ///
    /// A malformed bar is rejected with the engine state unchanged.
    pub fn on_bar(&mut self, bar: Bar) -> Result<Cycle, BarError> {
        if let Err(err) = self.check(&bar) {
            warn!(symbol = %self.symbol, %err, "malformed bar rejected");
            return Err(err);
        }

        let mut atr = self.atr.clone();
        let atr_value = atr.update(&bar);
        let mut next = self.stops.clone();
        let stops: Vec<StopReading> = next
            .iter_mut()
            .map(|engine| StopReading {
                multiplier: engine.multiplier(),
                point: engine.update(bar.close, atr_value),
            })
            .collect();
        self.atr = atr;
        self.stops = next;

        self.last_timestamp = Some(bar.timestamp);
        self.last_close = Some(bar.close);
        self.bars.push(bar);
        self.primary
            .push(stops.get(self.primary_index).and_then(|r| r.point));
        self.trim();
        let bar_index = self.bars_seen;
        self.bars_seen += 1;

        let index = self.bars.len() - 1;
        let derived = DerivedSeries::compute(&self.bars, &self.config.smoothing);
        let row = DerivedRow {
            atr: atr_value,
            ..derived.row(index)
        };
        let bar = &self.bars[index];

        let events = self.crosses.detect(&self.bars, &derived, &self.primary);
        let swings = self.extrema.detect(&self.bars, &derived);
        let arbitration = self.arbiter.arbitrate(bar, &events, &swings);

        debug!(
            symbol = %self.symbol,
            bar_index,
            timestamp = %bar.timestamp,
            events = events.len(),
            verdict = ?arbitration.verdict,
            "cycle evaluated"
        );
        if let Some(signal) = &arbitration.signal {
            info!(
                symbol = %signal.symbol,
                side = %signal.side,
                strike = signal.strike_price,
                trigger = signal.entry_trigger,
                family = %signal.family,
                "signal emitted"
            );
        }

        Ok(Cycle {
            symbol: self.symbol.clone(),
            bar_index,
            timestamp: bar.timestamp,
            derived: row,
            stops,
            arbitration,
        })
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            symbol: self.symbol.clone(),
            last_timestamp: self.last_timestamp,
            last_close: self.last_close,
            bars_seen: self.bars_seen,
            stops: self.stops.iter().map(|s| s.snapshot()).collect(),
            atr: Some(self.atr.clone()),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The retained bar window.
    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }

    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.last_timestamp
    }

    /// Trailing-stop instances, in configured multiplier order.
    pub fn stops(&self) -> &[TrailingStopEngine] {
        &self.stops
    }

    pub fn primary_stop(&self) -> Option<&TrailingStopEngine> {
        self.stops.get(self.primary_index)
    }
}
