//! Error types.
//!
//! None of these are fatal to the engine. A `BarError` rejects one bar and the
//! engine carries on with the next; `ConfigError` and `StateError` surface at
//! startup, before any bar is processed.

use chrono::NaiveDateTime;
use std::path::PathBuf;
use thiserror::Error;

/// A bar rejected at the engine boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarError {
    #[error("bar at {timestamp} has a non-finite price")]
    NonFinitePrice { timestamp: NaiveDateTime },

    #[error("bar at {timestamp} has high {high} below low {low}")]
    InvertedRange {
        timestamp: NaiveDateTime,
        high: f64,
        low: f64,
    },

    #[error("bar at {timestamp} does not advance past {previous}")]
    NonIncreasingTimestamp {
        timestamp: NaiveDateTime,
        previous: NaiveDateTime,
    },

    #[error("bar for {got} routed to engine for {expected}")]
    SymbolMismatch { expected: String, got: String },
}

/// Invalid or unreadable engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failure loading or saving persisted engine state.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("state io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("state encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("snapshot for {symbol} has no stop for multiplier {multiplier}")]
    MissingMultiplier { symbol: String, multiplier: f64 },

    #[error("snapshot is for {got}, expected {expected}")]
    SymbolMismatch { expected: String, got: String },

    #[error("history ends at {history_end:?} but snapshot was taken at {snapshot:?}")]
    HistoryMismatch {
        history_end: Option<NaiveDateTime>,
        snapshot: Option<NaiveDateTime>,
    },

    #[error("history bar at {timestamp} closed at {history}, snapshot recorded {snapshot:?}")]
    LastCloseMismatch {
        timestamp: NaiveDateTime,
        history: f64,
        snapshot: Option<f64>,
    },

    #[error("snapshot lookback {snapshot} for multiplier {multiplier} does not match configured ATR period {configured}")]
    LookbackMismatch {
        multiplier: f64,
        snapshot: usize,
        configured: usize,
    },

    #[error("snapshot ATR period {snapshot} does not match configured {configured}")]
    AtrPeriodMismatch { snapshot: usize, configured: usize },

    #[error(transparent)]
    Config(#[from] ConfigError),
}
