//! Evaluation engine — per-symbol cycles and the multi-symbol driver.
//!
//! Each bar runs one cycle:
//!
//! 1. Validate the bar (symbol, finite prices, range, timestamp order)
//! 2. Extend the derived series
//! 3. Advance every trailing-stop instance (atomic commit)
//! 4. Detect cross events and retained swings
//! 5. Arbitrate; emit at most one signal

pub mod signal_engine;
pub mod universe;
pub mod warmup;

pub use signal_engine::{Cycle, SignalEngine, StopReading};
pub use universe::{SymbolCycles, Universe};
pub use warmup::WarmupState;
