//! Trigger checking: does a price trigger a given order?
//!
//! Trailing stops must have their water-mark folded in by the caller first;
//! this module only compares the current trigger level against the price.

use crate::domain::{Action, Order, OrderKind, Side};
use rust_decimal::Decimal;

/// Whether `price` meets `order`'s trigger condition.
///
/// An order without a trigger level (inactive trailing stop) never triggers.
pub fn is_triggered(order: &Order, price: Decimal) -> bool {
    let Some(trigger) = order.trigger_price else {
        return false;
    };

    match order.kind {
        OrderKind::Limit | OrderKind::OcoLeg => match order.action() {
            // Buy at or below the limit, sell at or above it
            Action::Buy => price <= trigger,
            Action::Sell => price >= trigger,
        },
        OrderKind::Stop | OrderKind::BracketStop | OrderKind::TrailingStop => {
            stop_hit(order.side, trigger, price)
        }
        OrderKind::BracketTarget => match order.side {
            Side::Long => price >= trigger,
            Side::Short => price <= trigger,
        },
    }
}

/// Protective stop: long exits on a fall through the level, short on a rise.
fn stop_hit(side: Side, trigger: Decimal, price: Decimal) -> bool {
    match side {
        Side::Long => price <= trigger,
        Side::Short => price >= trigger,
    }
}
