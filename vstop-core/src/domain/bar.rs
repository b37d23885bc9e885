//! Bar — the fundamental market data unit.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::BarError;

/// OHLC bar for a single symbol over one fixed-width intraday interval.
///
/// Produced by the ingestion collaborator and immutable once appended to a
/// history. Timestamps are exchange-local.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: NaiveDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            open,
            high,
            low,
            close,
        }
    }

    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Average of the four prices.
    pub fn ohlc4(&self) -> f64 {
        (self.open + self.high + self.low + self.close) / 4.0
    }

    /// Validate this bar against the last accepted timestamp of its history.
    ///
    /// Checks run cheapest first: price finiteness, then range, then ordering.
    pub fn validate(&self, previous: Option<NaiveDateTime>) -> Result<(), BarError> {
        if self.is_void() {
            return Err(BarError::NonFinitePrice {
                timestamp: self.timestamp,
            });
        }
        if self.high < self.low {
            return Err(BarError::InvertedRange {
                timestamp: self.timestamp,
                high: self.high,
                low: self.low,
            });
        }
        if let Some(prev) = previous {
            if self.timestamp <= prev {
                return Err(BarError::NonIncreasingTimestamp {
                    timestamp: self.timestamp,
                    previous: prev,
                });
            }
        }
        Ok(())
    }
}
