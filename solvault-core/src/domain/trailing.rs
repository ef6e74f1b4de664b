//! Trailing stop tracking.
//!
//! **Core rule:** the trigger may tighten, never loosen.
//!
//! The only mutable state is the water-mark (best price since activation).
//! It moves monotonically in the position's favor, and the trigger is always
//! re-derived from it through [`trailing_trigger`], so the ratchet holds by
//! construction.

use super::side::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Trigger price for a trailing stop at a given water-mark.
///
/// - Long: `water_mark * (1 - trail_percent)`
/// - Short: `water_mark * (1 + trail_percent)`
///
/// `trail_percent` is a fraction (`0.05` = 5%). Zero yields a stop at the
/// water-mark itself. Saturates at the `Decimal` bounds.
pub fn trailing_trigger(water_mark: Decimal, trail_percent: Decimal, side: Side) -> Decimal {
    let factor = match side {
        Side::Long => Decimal::ONE.saturating_sub(trail_percent),
        Side::Short => Decimal::ONE.saturating_add(trail_percent),
    };
    water_mark.saturating_mul(factor)
}

/// Water-mark state for a trailing stop protecting a `side` exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailingStopTracker {
    side: Side,
    trail_percent: Decimal,
    /// High-water for longs, low-water for shorts. `None` until activation.
    water_mark: Option<Decimal>,
    /// Optional hard level the trigger never goes looser than.
    floor: Option<Decimal>,
}

impl TrailingStopTracker {
    pub fn new(side: Side, trail_percent: Decimal) -> Self {
        Self {
            side,
            trail_percent,
            water_mark: None,
            floor: None,
        }
    }

    /// Keep the trigger at least as tight as `level` (bracket stop price).
    pub fn with_floor(mut self, level: Decimal) -> Self {
        self.floor = Some(level);
        self
    }

    /// Start tracking from the exposure's entry price.
    pub fn activate(&mut self, entry_price: Decimal) {
        self.water_mark = Some(entry_price);
    }

    pub fn is_active(&self) -> bool {
        self.water_mark.is_some()
    }

    /// Fold a tick into the water-mark and return the re-derived trigger.
    ///
    /// An inactive tracker activates at `price`.
    pub fn observe(&mut self, price: Decimal) -> Decimal {
        let mark = match (self.water_mark, self.side) {
            (None, _) => price,
            (Some(current), Side::Long) => current.max(price),
            (Some(current), Side::Short) => current.min(price),
        };
        self.water_mark = Some(mark);
        self.derive(mark)
    }

    /// Current trigger, if activated.
    pub fn trigger_price(&self) -> Option<Decimal> {
        self.water_mark.map(|mark| self.derive(mark))
    }

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn trail_percent(&self) -> Decimal {
        self.trail_percent
    }

    pub fn water_mark(&self) -> Option<Decimal> {
        self.water_mark
    }

    pub fn high_water(&self) -> Option<Decimal> {
        match self.side {
            Side::Long => self.water_mark,
            Side::Short => None,
        }
    }

    pub fn low_water(&self) -> Option<Decimal> {
        match self.side {
            Side::Short => self.water_mark,
            Side::Long => None,
        }
    }

    fn derive(&self, mark: Decimal) -> Decimal {
        let raw = trailing_trigger(mark, self.trail_percent, self.side);
        match (self.floor, self.side) {
            (Some(floor), Side::Long) => raw.max(floor),
            (Some(floor), Side::Short) => raw.min(floor),
            (None, _) => raw,
        }
    }
}
