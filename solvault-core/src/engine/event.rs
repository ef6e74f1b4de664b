//! Events emitted by a tick pass.

use crate::domain::{Fill, OrderId, PositionId, RejectionReason};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an order was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    /// Explicit `cancel` call.
    User,
    /// Another member of its OCO/bracket group filled.
    GroupSiblingFilled,
    /// Its bracket entry was cancelled before filling.
    BracketEntryCancelled,
    /// The position it protected was fully closed.
    PositionClosed,
    /// Registry torn down at session end.
    SessionClosed,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CancelReason::User => "user cancel",
            CancelReason::GroupSiblingFilled => "group sibling filled",
            CancelReason::BracketEntryCancelled => "bracket entry cancelled",
            CancelReason::PositionClosed => "position closed",
            CancelReason::SessionClosed => "session closed",
        };
        f.write_str(s)
    }
}

/// One outcome of a tick pass, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    /// A trailing stop's trigger tightened.
    TrailingStopMoved {
        order_id: OrderId,
        trigger_price: Decimal,
    },
    Triggered {
        order_id: OrderId,
        price: Decimal,
    },
    Filled {
        order_id: OrderId,
        fill: Fill,
        position_id: PositionId,
        realized_pnl: Decimal,
    },
    Rejected {
        order_id: OrderId,
        reason: RejectionReason,
    },
    Cancelled {
        order_id: OrderId,
        reason: CancelReason,
    },
    /// A bracket leg attached to the position its entry opened. Eligible from
    /// the next tick.
    BracketLegActivated {
        order_id: OrderId,
        position_id: PositionId,
    },
    PositionClosed {
        position_id: PositionId,
        realized_pnl: Decimal,
    },
}

impl OrderEvent {
    /// The order this event concerns, if any.
    pub fn order_id(&self) -> Option<OrderId> {
        match self {
            OrderEvent::TrailingStopMoved { order_id, .. }
            | OrderEvent::Triggered { order_id, .. }
            | OrderEvent::Filled { order_id, .. }
            | OrderEvent::Rejected { order_id, .. }
            | OrderEvent::Cancelled { order_id, .. }
            | OrderEvent::BracketLegActivated { order_id, .. } => Some(*order_id),
            OrderEvent::PositionClosed { .. } => None,
        }
    }
}
