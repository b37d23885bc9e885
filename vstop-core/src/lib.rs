//! VStop Core — indicator and signal-arbitration engine for intraday option entries.
//!
//! This crate contains the whole decision path from bars to signals:
//! - Domain types (bars, signals, option sides)
//! - Smoothing stage (SMA bands, Wilder ATR, KST momentum composite)
//! - Volatility trailing stop (VStop) with flip/reset semantics
//! - Swing extrema with topographic prominence
//! - Cross-event detection across three signal families
//! - Arbitration, entry confirmation and strike selection
//! - Per-symbol engine, multi-symbol universe, snapshot persistence

pub mod arbiter;
pub mod config;
pub mod cross;
pub mod derived;
pub mod domain;
pub mod engine;
pub mod error;
pub mod extrema;
pub mod indicators;
pub mod persistence;
pub mod strike;
pub mod trailing_stop;

pub use arbiter::{Arbitration, ArbitrationVerdict, SignalArbiter, StrikeAnchor};
pub use config::EngineConfig;
pub use cross::{CrossDirection, CrossEvent, CrossEventDetector, CrossFamily};
pub use derived::{DerivedRow, DerivedSeries};
pub use domain::{Bar, OptionSide, Signal};
pub use engine::{Cycle, SignalEngine, Universe};
pub use error::{BarError, ConfigError, StateError};
pub use extrema::{ExtremaDetector, SwingKind, SwingPoint, SwingPoints};
pub use persistence::{EngineSnapshot, JsonStateStore, MemoryStateStore, StateStore};
pub use strike::StrikeSelector;
pub use trailing_stop::{StopPoint, TrailingStopEngine, TrailingStopState};
