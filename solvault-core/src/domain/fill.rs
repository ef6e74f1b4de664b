//! Execution outcomes: fills and venue rejections.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Execution report for a triggered order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub price: Decimal,
    pub size: Decimal,
}

impl Fill {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self { price, size }
    }

    /// `price * size`, saturating at the `Decimal` bounds.
    pub fn notional(&self) -> Decimal {
        self.price.saturating_mul(self.size)
    }
}

/// Why the venue refused to execute a triggered order.
///
/// These are normal market outcomes: the registry records them on the order
/// and reports them as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    #[error("insufficient liquidity")]
    InsufficientLiquidity,

    #[error("invalid amount")]
    InvalidAmount,

    #[error("slippage exceeded")]
    SlippageExceeded,
}

/// Outcome of a gateway call.
pub type ExecutionResult = Result<Fill, RejectionReason>;
