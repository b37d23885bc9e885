//! Strike selection: floor the level to the strike grid, then step one
//! offset away from price (up for calls, down for puts).

use crate::config::StrikeConfig;
use crate::domain::OptionSide;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikeSelector {
    step: i64,
    offset: i64,
}

impl StrikeSelector {
    pub fn new(config: &StrikeConfig) -> Self {
        Self {
            step: config.step,
            offset: config.offset,
        }
    }

    /// Largest grid point at or below `level`.
    pub fn floor_step(&self, level: f64) -> i64 {
        let step = self.step as f64;
        ((level / step).floor() * step) as i64
    }

    pub fn strike(&self, side: OptionSide, level: f64) -> i64 {
        let base = self.floor_step(level);
        match side {
            OptionSide::Call => base + self.offset,
            OptionSide::Put => base - self.offset,
        }
    }
}

impl Default for StrikeSelector {
    fn default() -> Self {
        Self::new(&StrikeConfig::default())
    }
}
