//! Orders, placement specs, OCO/bracket groups, and audit entries.

use super::fill::{Fill, RejectionReason};
use super::ids::{GroupId, OrderId, PositionId};
use super::side::{Action, Intent, Side};
use super::trailing::TrailingStopTracker;
use crate::risk::RiskReward;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What kind of conditional instruction an order is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Limit,
    Stop,
    TrailingStop,
    OcoLeg,
    BracketStop,
    BracketTarget,
}

impl OrderKind {
    /// Protective kinds only ever close exposure.
    pub fn is_protective(self) -> bool {
        matches!(
            self,
            OrderKind::Stop
                | OrderKind::TrailingStop
                | OrderKind::BracketStop
                | OrderKind::BracketTarget
        )
    }
}

/// Order lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Live, evaluated on every tick.
    Pending,
    /// Trigger condition met, execution outstanding.
    Triggered,
    Filled,
    Cancelled,
    /// The venue refused execution.
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Triggered => "TRIGGERED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Rejected => "REJECTED",
        };
        f.write_str(s)
    }
}

/// A placement request. Build with the kind-specific constructors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSpec {
    pub kind: OrderKind,
    pub side: Side,
    pub intent: Intent,
    pub size: Decimal,
    #[serde(default)]
    pub trigger_price: Option<Decimal>,
    #[serde(default)]
    pub trail_percent: Option<Decimal>,
    #[serde(default)]
    pub position_id: Option<PositionId>,
    #[serde(default)]
    pub linked_order_ids: Vec<OrderId>,
}

impl OrderSpec {
    fn base(kind: OrderKind, side: Side, intent: Intent, size: Decimal) -> Self {
        Self {
            kind,
            side,
            intent,
            size,
            trigger_price: None,
            trail_percent: None,
            position_id: None,
            linked_order_ids: Vec::new(),
        }
    }

    pub fn limit(side: Side, intent: Intent, limit_price: Decimal, size: Decimal) -> Self {
        Self {
            trigger_price: Some(limit_price),
            ..Self::base(OrderKind::Limit, side, intent, size)
        }
    }

    pub fn oco_leg(side: Side, intent: Intent, trigger_price: Decimal, size: Decimal) -> Self {
        Self {
            trigger_price: Some(trigger_price),
            ..Self::base(OrderKind::OcoLeg, side, intent, size)
        }
    }

    pub fn stop(side: Side, stop_price: Decimal, size: Decimal) -> Self {
        Self {
            trigger_price: Some(stop_price),
            ..Self::base(OrderKind::Stop, side, Intent::Close, size)
        }
    }

    pub fn trailing_stop(side: Side, trail_percent: Decimal, size: Decimal) -> Self {
        Self {
            trail_percent: Some(trail_percent),
            ..Self::base(OrderKind::TrailingStop, side, Intent::Close, size)
        }
    }

    pub fn bracket_stop(side: Side, stop_price: Decimal, size: Decimal) -> Self {
        Self {
            trigger_price: Some(stop_price),
            ..Self::base(OrderKind::BracketStop, side, Intent::Close, size)
        }
    }

    pub fn bracket_target(side: Side, target_price: Decimal, size: Decimal) -> Self {
        Self {
            trigger_price: Some(target_price),
            ..Self::base(OrderKind::BracketTarget, side, Intent::Close, size)
        }
    }

    /// Attach to an existing position.
    pub fn on_position(mut self, position_id: PositionId) -> Self {
        self.position_id = Some(position_id);
        self
    }

    /// Join an OCO group with already-placed orders.
    pub fn linked_to(mut self, ids: impl IntoIterator<Item = OrderId>) -> Self {
        self.linked_order_ids.extend(ids);
        self
    }
}

/// Entry + stop-loss + take-profit, placed as one unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketSpec {
    pub side: Side,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub target_price: Decimal,
    /// Trail the stop leg by this fraction, never looser than `stop_price`.
    #[serde(default)]
    pub trail_percent: Option<Decimal>,
}

/// Ids handed back from a bracket placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bracket {
    pub entry_id: OrderId,
    pub stop_id: OrderId,
    pub target_id: OrderId,
    pub group_id: GroupId,
    pub risk: RiskReward,
}

/// A single order in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub kind: OrderKind,
    pub side: Side,
    pub intent: Intent,
    pub size: Decimal,
    /// Current trigger level. For trailing stops this mirrors the tracker and
    /// is `None` until activation.
    pub trigger_price: Option<Decimal>,
    pub trailing: Option<TrailingStopTracker>,
    pub position_id: Option<PositionId>,
    pub group_id: Option<GroupId>,
    /// Bracket entry this leg belongs to.
    pub parent_id: Option<OrderId>,
    pub status: OrderStatus,
    pub fill: Option<Fill>,
    pub rejection: Option<RejectionReason>,
    pub created_tick: u64,
    pub closed_tick: Option<u64>,
}

impl Order {
    pub fn action(&self) -> Action {
        Action::of(self.side, self.intent)
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Triggered)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn trail_percent(&self) -> Option<Decimal> {
        self.trailing.as_ref().map(|t| t.trail_percent())
    }

    pub fn high_water(&self) -> Option<Decimal> {
        self.trailing.as_ref().and_then(|t| t.high_water())
    }

    pub fn low_water(&self) -> Option<Decimal> {
        self.trailing.as_ref().and_then(|t| t.low_water())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    Oco,
    Bracket,
}

/// Orders that exclude each other: when one fills, all others are cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderGroup {
    pub id: GroupId,
    pub kind: GroupKind,
    /// Membership in placement order.
    pub member_order_ids: Vec<OrderId>,
    /// Risk/reward computed when the group came from a bracket.
    pub risk: Option<RiskReward>,
}

/// Audit trail entry for an order state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAuditEntry {
    pub order_id: OrderId,
    pub tick: u64,
    pub from_status: OrderStatus,
    pub to_status: OrderStatus,
    pub reason: String,
}
