//! Multi-symbol driver — one isolated `SignalEngine` per symbol.
//!
//! Symbols share no mutable state, so a batch is processed in parallel across
//! symbols with Rayon, and in bar order within each symbol.

use std::collections::BTreeMap;

use rayon::prelude::*;

use super::signal_engine::{Cycle, SignalEngine};
use crate::config::EngineConfig;
use crate::domain::{Bar, Symbol};
use crate::error::{BarError, ConfigError};

/// Per-symbol outcome of a batch, in the order the bars were given.
#[derive(Debug, Clone)]
pub struct SymbolCycles {
    pub symbol: Symbol,
    pub results: Vec<Result<Cycle, BarError>>,
}

#[derive(Debug, Clone)]
pub struct Universe {
    config: EngineConfig,
    engines: BTreeMap<Symbol, SignalEngine>,
    parallel: bool,
}

impl Universe {
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            engines: BTreeMap::new(),
            parallel: true,
        })
    }

    /// Enables or disables parallel execution across symbols.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Add or replace the engine for its symbol.
    pub fn insert(&mut self, engine: SignalEngine) {
        self.engines.insert(engine.symbol().to_string(), engine);
    }

    pub fn engine(&self, symbol: &str) -> Option<&SignalEngine> {
        self.engines.get(symbol)
    }

    pub fn engines(&self) -> impl Iterator<Item = &SignalEngine> {
        self.engines.values()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.engines.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Route a batch of bars to their symbols' engines and run the cycles.
    ///
    /// Symbols without an engine get a fresh one. Results come back ordered
    /// by symbol.
    pub fn process_batch(
        &mut self,
        bars: impl IntoIterator<Item = Bar>,
    ) -> Result<Vec<SymbolCycles>, ConfigError> {
        let mut grouped: BTreeMap<Symbol, Vec<Bar>> = BTreeMap::new();
        for bar in bars {
            grouped.entry(bar.symbol.clone()).or_default().push(bar);
        }

        for symbol in grouped.keys() {
            if !self.engines.contains_key(symbol) {
                let engine = SignalEngine::new(symbol.clone(), self.config.clone())?;
                self.engines.insert(symbol.clone(), engine);
            }
        }

        let work: Vec<(&mut SignalEngine, Vec<Bar>)> = self
            .engines
            .iter_mut()
            .filter_map(|(symbol, engine)| grouped.remove(symbol).map(|bars| (engine, bars)))
            .collect();

        let run = |(engine, bars): (&mut SignalEngine, Vec<Bar>)| SymbolCycles {
            symbol: engine.symbol().to_string(),
            results: bars.into_iter().map(|bar| engine.on_bar(bar)).collect(),
        };

        let results = if self.parallel {
            work.into_par_iter().map(run).collect()
        } else {
            work.into_iter().map(run).collect()
        };
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::make_bars;

    fn config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.smoothing.atr_period = 3;
        config
    }

    fn bars_for(symbol: &str, closes: &[f64]) -> Vec<Bar> {
        make_bars(closes)
            .into_iter()
            .map(|mut b| {
                b.symbol = symbol.to_string();
                b
            })
            .collect()
    }

    #[test]
    fn creates_engines_on_first_bar() {
        let mut universe = Universe::new(config()).unwrap();
        let mut batch = bars_for("NIFTY", &[100.0, 101.0]);
        batch.extend(bars_for("BANKNIFTY", &[200.0]));

        let out = universe.process_batch(batch).unwrap();
        assert_eq!(universe.len(), 2);
        let symbols: Vec<&str> = out.iter().map(|c| c.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BANKNIFTY", "NIFTY"]);
        assert_eq!(out[1].results.len(), 2);
        assert_eq!(universe.engine("NIFTY").unwrap().bars().len(), 2);
    }

    #[test]
    fn malformed_bar_only_affects_its_symbol() {
        let mut universe = Universe::new(config()).unwrap().with_parallelism(false);
        let mut batch = bars_for("NIFTY", &[100.0, 101.0]);
        batch[1].close = f64::NAN;
        batch.extend(bars_for("BANKNIFTY", &[200.0, 201.0]));

        let out = universe.process_batch(batch).unwrap();
        let nifty = out.iter().find(|c| c.symbol == "NIFTY").unwrap();
        assert!(nifty.results[0].is_ok());
        assert!(matches!(
            nifty.results[1],
            Err(BarError::NonFinitePrice { .. })
        ));
        let bank = out.iter().find(|c| c.symbol == "BANKNIFTY").unwrap();
        assert!(bank.results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn invalid_config_rejected_up_front() {
        let mut bad = config();
        bad.extrema.radius = 0;
        assert!(Universe::new(bad).is_err());
    }
}
