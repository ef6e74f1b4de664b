//! Position: a single directional exposure and its P&L.

use super::ids::PositionId;
use super::side::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from applying a fill to a position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("fill side {fill} contradicts {position} position")]
    SideMismatch { position: Side, fill: Side },

    #[error("position {0} is already closed")]
    Closed(PositionId),

    #[error("closing size {requested} exceeds open size {open}")]
    Overclose { requested: Decimal, open: Decimal },

    #[error("fill price and size must be positive (price {price}, size {size})")]
    NonPositive { price: Decimal, size: Decimal },

    #[error("arithmetic overflow applying fill of {size} at {price}")]
    Overflow { price: Decimal, size: Decimal },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    Open,
    Closed,
}

/// An open or closed exposure.
///
/// While open, `size` is the remaining quantity and `entry_price` the
/// size-weighted average of all opening fills. Closing fills realize P&L
/// against `entry_price` and shrink `size`; at zero the position is closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub side: Side,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub status: PositionStatus,
    pub realized_pnl: Decimal,
}

impl Position {
    pub fn new(id: PositionId, side: Side, entry_price: Decimal, size: Decimal) -> Self {
        Self {
            id,
            side,
            entry_price,
            size,
            status: PositionStatus::Open,
            realized_pnl: Decimal::ZERO,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// P&L of the remaining size at `current_price`. Saturates at the
    /// `Decimal` bounds.
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Decimal {
        let per_unit = match self.side {
            Side::Long => current_price.saturating_sub(self.entry_price),
            Side::Short => self.entry_price.saturating_sub(current_price),
        };
        per_unit.saturating_mul(self.size)
    }

    /// Saturates at the `Decimal` bounds.
    pub fn market_value(&self, current_price: Decimal) -> Decimal {
        self.size.saturating_mul(current_price)
    }

    /// Apply a fill and return the P&L it realized (zero for opening fills).
    pub fn apply_fill(
        &mut self,
        side: Side,
        fill_price: Decimal,
        fill_size: Decimal,
        is_opening: bool,
    ) -> Result<Decimal, PositionError> {
        if !self.is_open() {
            return Err(PositionError::Closed(self.id));
        }
        if side != self.side {
            return Err(PositionError::SideMismatch {
                position: self.side,
                fill: side,
            });
        }
        if fill_price <= Decimal::ZERO || fill_size <= Decimal::ZERO {
            return Err(PositionError::NonPositive {
                price: fill_price,
                size: fill_size,
            });
        }

        let overflow = || PositionError::Overflow {
            price: fill_price,
            size: fill_size,
        };

        if is_opening {
            let total = self.size.checked_add(fill_size).ok_or_else(overflow)?;
            let entry_price = self
                .entry_price
                .checked_mul(self.size)
                .zip(fill_price.checked_mul(fill_size))
                .and_then(|(held, added)| held.checked_add(added))
                .and_then(|cost| cost.checked_div(total))
                .ok_or_else(overflow)?;
            self.entry_price = entry_price;
            self.size = total;
            return Ok(Decimal::ZERO);
        }

        if fill_size > self.size {
            return Err(PositionError::Overclose {
                requested: fill_size,
                open: self.size,
            });
        }

        let realized =
            pnl(self.side, self.entry_price, fill_price, fill_size).ok_or_else(overflow)?;
        let total_realized = self.realized_pnl.checked_add(realized).ok_or_else(overflow)?;
        self.realized_pnl = total_realized;
        self.size -= fill_size;
        if self.size.is_zero() {
            self.status = PositionStatus::Closed;
        }
        Ok(realized)
    }
}

/// `None` on overflow.
fn pnl(side: Side, entry: Decimal, exit: Decimal, size: Decimal) -> Option<Decimal> {
    let per_unit = match side {
        Side::Long => exit.checked_sub(entry),
        Side::Short => entry.checked_sub(exit),
    };
    per_unit?.checked_mul(size)
}
