use serde::{Deserialize, Serialize};

/// Warmup state tracker
///
/// `is_warm()` answers "may the bar about to be processed produce a value?".
/// With `warmup_bars = n`, bars 0..n are warm-up and bar n is the first live one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupState {
    warmup_bars: usize,
    bars_processed: usize,
}

impl WarmupState {
    pub fn new(warmup_bars: usize) -> Self {
        Self {
            warmup_bars,
            bars_processed: 0,
        }
    }

    pub fn process_bar(&mut self) {
        self.bars_processed += 1;
    }

    pub fn warmup_bars(&self) -> usize {
        self.warmup_bars
    }

    pub fn is_warm(&self) -> bool {
        self.bars_processed >= self.warmup_bars
    }
}
