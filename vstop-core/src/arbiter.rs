//! Signal arbitration — one decision from many concurrent cross events.
//!
//! 1. Latest event across all families wins; ties on the same bar go to the
//!    family ranked highest in the configured priority.
//! 2. The winner's event levels give the entry trigger.
//! 3. The live bar must confirm: call needs `trigger <= low`, put needs
//!    `trigger >= high`.
//! 4. Confirmed intents are mapped to a strike and emitted.
//!
//! Every cycle produces an [`Arbitration`] record explaining the outcome,
//! whether or not a [`Signal`] was emitted.

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use crate::config::{ArbitrationConfig, StrikeConfig};
use crate::cross::{CrossDirection, CrossEvent, CrossEvents};
use crate::domain::{Bar, OptionSide, Signal};
use crate::extrema::{SwingKind, SwingPoints};
use crate::strike::StrikeSelector;

/// Level the strike is anchored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrikeAnchor {
    /// The entry trigger.
    #[default]
    Trigger,
    /// The latest retained trough (calls) or peak (puts); the trigger if none.
    Swing,
}

/// Why a cycle did or did not emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArbitrationVerdict {
    Emitted,
    NoEvent,
    IndeterminateTrigger,
    Unconfirmed,
    SwingDisagrees,
}

impl ArbitrationVerdict {
    pub fn is_emitted(&self) -> bool {
        matches!(self, Self::Emitted)
    }
}

/// Diagnostic record of one arbitration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arbitration {
    pub winner: Option<CrossEvent>,
    pub side: Option<OptionSide>,
    pub entry_trigger: Option<f64>,
    pub verdict: ArbitrationVerdict,
    pub signal: Option<Signal>,
}

impl Arbitration {
    fn rejected(
        winner: Option<CrossEvent>,
        side: Option<OptionSide>,
        entry_trigger: Option<f64>,
        verdict: ArbitrationVerdict,
    ) -> Self {
        Self {
            winner,
            side,
            entry_trigger,
            verdict,
            signal: None,
        }
    }
}

pub fn side_for(direction: CrossDirection) -> OptionSide {
    match direction {
        CrossDirection::Up => OptionSide::Call,
        CrossDirection::Down => OptionSide::Put,
    }
}

/// Entry trigger for `side` from the levels at the event bar.
///
/// Calls use the smoothed four-price average when the event bar closed at or
/// above the smoothed high, otherwise the primary stop. Puts mirror this
/// against the smoothed low.
pub fn entry_trigger(event: &CrossEvent, side: OptionSide) -> Option<f64> {
    let levels = &event.levels;
    let beyond_band = match side {
        OptionSide::Call => levels.derived.high_sma.is_some_and(|h| levels.close >= h),
        OptionSide::Put => levels.derived.low_sma.is_some_and(|l| levels.close <= l),
    };
    if beyond_band {
        levels.derived.ohlc4_sma
    } else {
        levels.stop
    }
}

/// Whether `bar` confirms an entry at `trigger` for `side`.
pub fn confirms(side: OptionSide, trigger: f64, bar: &Bar) -> bool {
    match side {
        OptionSide::Call => trigger <= bar.low,
        OptionSide::Put => trigger >= bar.high,
    }
}

#[derive(Debug, Clone)]
pub struct SignalArbiter {
    config: ArbitrationConfig,
    strikes: StrikeSelector,
}

impl SignalArbiter {
    pub fn new(config: &ArbitrationConfig, strike: &StrikeConfig) -> Self {
        Self {
            config: config.clone(),
            strikes: StrikeSelector::new(strike),
        }
    }

    /// Most recent event; same-timestamp ties resolved by family priority.
    pub fn select<'a>(&self, events: &'a CrossEvents) -> Option<&'a CrossEvent> {
        events
            .events
            .iter()
            .max_by_key(|e| (e.timestamp, Reverse(self.config.rank(e.family))))
    }

    pub fn arbitrate(&self, bar: &Bar, events: &CrossEvents, swings: &SwingPoints) -> Arbitration {
        let Some(winner) = self.select(events).cloned() else {
            return Arbitration::rejected(None, None, None, ArbitrationVerdict::NoEvent);
        };
        let side = side_for(winner.direction);

        if self.config.require_swing_agreement && !Self::swing_agrees(&winner, side, swings) {
            return Arbitration::rejected(
                Some(winner),
                Some(side),
                None,
                ArbitrationVerdict::SwingDisagrees,
            );
        }

        let Some(trigger) = entry_trigger(&winner, side) else {
            return Arbitration::rejected(
                Some(winner),
                Some(side),
                None,
                ArbitrationVerdict::IndeterminateTrigger,
            );
        };

        if !confirms(side, trigger, bar) {
            return Arbitration::rejected(
                Some(winner),
                Some(side),
                Some(trigger),
                ArbitrationVerdict::Unconfirmed,
            );
        }

        let anchor = match self.config.strike_anchor {
            StrikeAnchor::Trigger => trigger,
            StrikeAnchor::Swing => {
                let swing = match side {
                    OptionSide::Call => swings.latest_trough(),
                    OptionSide::Put => swings.latest_peak(),
                };
                swing.map_or(trigger, |s| s.value)
            }
        };

        let signal = Signal {
            symbol: bar.symbol.clone(),
            timestamp: bar.timestamp,
            side,
            strike_price: self.strikes.strike(side, anchor),
            entry_trigger: trigger,
            family: winner.family,
        };

        Arbitration {
            winner: Some(winner),
            side: Some(side),
            entry_trigger: Some(trigger),
            verdict: ArbitrationVerdict::Emitted,
            signal: Some(signal),
        }
    }

    /// The latest swing implies a side (peak → put, trough → call) and must
    /// predate the winning event.
    fn swing_agrees(winner: &CrossEvent, side: OptionSide, swings: &SwingPoints) -> bool {
        swings.latest().is_some_and(|swing| {
            let implied = match swing.kind {
                SwingKind::Peak => OptionSide::Put,
                SwingKind::Trough => OptionSide::Call,
            };
            implied == side && winner.bar_index > swing.bar_index
        })
    }
}
