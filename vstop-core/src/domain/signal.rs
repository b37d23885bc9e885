//! Signal — the terminal output handed to the execution collaborator.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cross::CrossFamily;

/// Option side of a trading intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionSide {
    Call,
    Put,
}

impl fmt::Display for OptionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionSide::Call => write!(f, "call"),
            OptionSide::Put => write!(f, "put"),
        }
    }
}

/// A confirmed directional intent. At most one is produced per evaluation cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: String,
    /// Timestamp of the bar that confirmed the entry.
    pub timestamp: NaiveDateTime,
    pub side: OptionSide,
    pub strike_price: i64,
    /// Price level the confirming bar had to clear.
    pub entry_trigger: f64,
    /// Family of the cross event that won arbitration.
    pub family: CrossFamily,
}
