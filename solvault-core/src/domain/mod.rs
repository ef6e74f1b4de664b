//! Domain types for the SolVault order engine

pub mod fill;
pub mod ids;
pub mod order;
pub mod position;
pub mod side;
pub mod tick;
pub mod trailing;

pub use fill::{ExecutionResult, Fill, RejectionReason};
pub use ids::{GroupId, OrderId, PositionId};
pub use order::{
    Bracket, BracketSpec, GroupKind, Order, OrderAuditEntry, OrderGroup, OrderKind, OrderSpec,
    OrderStatus,
};
pub use position::{Position, PositionError, PositionStatus};
pub use side::{Action, Intent, Side};
pub use tick::PriceTick;
pub use trailing::{trailing_trigger, TrailingStopTracker};
