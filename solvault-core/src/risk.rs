//! Risk/reward calculation for an entry with a stop and a target.
//!
//! Pure functions only; no registry state.

use crate::domain::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RiskError {
    #[error("risk is zero: stop equals entry ({0})")]
    DivisionByZeroRisk(Decimal),

    #[error("invalid bracket for {side}: stop {stop}, entry {entry}, target {target}")]
    InvalidBracket {
        side: Side,
        entry: Decimal,
        stop: Decimal,
        target: Decimal,
    },

    #[error("size must be positive, got {0}")]
    NonPositiveSize(Decimal),

    #[error("arithmetic overflow computing risk/reward")]
    Overflow,
}

/// Result of [`compute`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReward {
    pub side: Side,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub target_price: Decimal,
    pub size: Decimal,
    /// `|entry - stop| * size`
    pub risk: Decimal,
    /// `|target - entry| * size`
    pub reward: Decimal,
    /// `reward / risk`
    pub ratio: Decimal,
}

impl RiskReward {
    /// P&L if the exposure were closed at `exit_price`.
    /// Saturates at the `Decimal` bounds.
    pub fn projected_pnl(&self, exit_price: Decimal) -> Decimal {
        let per_unit = match self.side {
            Side::Long => exit_price.saturating_sub(self.entry_price),
            Side::Short => self.entry_price.saturating_sub(exit_price),
        };
        per_unit.saturating_mul(self.size)
    }
}

/// Compute risk, reward and their ratio.
///
/// Zero risk is reported before the side ordering is checked, so a stop at
/// the entry price always yields [`RiskError::DivisionByZeroRisk`].
pub fn compute(
    entry_price: Decimal,
    stop_price: Decimal,
    target_price: Decimal,
    side: Side,
    size: Decimal,
) -> Result<RiskReward, RiskError> {
    if size <= Decimal::ZERO {
        return Err(RiskError::NonPositiveSize(size));
    }

    let risk = distance(entry_price, stop_price, size)?;
    if risk.is_zero() {
        return Err(RiskError::DivisionByZeroRisk(entry_price));
    }

    let ordered = match side {
        Side::Long => stop_price < entry_price && entry_price < target_price,
        Side::Short => target_price < entry_price && entry_price < stop_price,
    };
    if !ordered {
        return Err(RiskError::InvalidBracket {
            side,
            entry: entry_price,
            stop: stop_price,
            target: target_price,
        });
    }

    let reward = distance(target_price, entry_price, size)?;
    let ratio = reward.checked_div(risk).ok_or(RiskError::Overflow)?;
    Ok(RiskReward {
        side,
        entry_price,
        stop_price,
        target_price,
        size,
        risk,
        reward,
        ratio,
    })
}

/// `|a - b| * size`
fn distance(a: Decimal, b: Decimal, size: Decimal) -> Result<Decimal, RiskError> {
    a.checked_sub(b)
        .and_then(|d| d.abs().checked_mul(size))
        .ok_or(RiskError::Overflow)
}
