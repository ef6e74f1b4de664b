//! Execution gateway seam.
//!
//! The registry hands every triggered order to an [`ExecutionGateway`] and
//! records whatever comes back. Venue behavior (liquidity, slippage, latency)
//! lives entirely behind this trait.

use crate::domain::{ExecutionResult, Fill, Order};
use rust_decimal::Decimal;

/// Executes triggered orders against a venue.
pub trait ExecutionGateway {
    /// Execute `order` at or near `market_price`.
    ///
    /// Must return before the tick pass continues. A rejection is a normal
    /// outcome, not an error.
    fn execute(&mut self, order: &Order, market_price: Decimal) -> ExecutionResult;
}

impl<F> ExecutionGateway for F
where
    F: FnMut(&Order, Decimal) -> ExecutionResult,
{
    fn execute(&mut self, order: &Order, market_price: Decimal) -> ExecutionResult {
        self(order, market_price)
    }
}

/// Fills every order in full at the market price.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateFill;

impl ExecutionGateway for ImmediateFill {
    fn execute(&mut self, order: &Order, market_price: Decimal) -> ExecutionResult {
        Ok(Fill::new(market_price, order.size))
    }
}
