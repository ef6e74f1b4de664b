//! Order engine: registry state machine, trigger rules and tick events.
//!
//! Each price tick runs one pass over the registry:
//!
//! 1. Trailing stops fold the tick into their water-mark
//! 2. Trigger check per live order, ascending id
//! 3. Triggered orders go to the execution gateway
//! 4. Fills settle positions, then cascade (group siblings, bracket legs,
//!    orders on a position that just closed)

pub mod event;
pub mod registry;
pub mod trigger;

pub use event::{CancelReason, OrderEvent};
pub use registry::{OrderError, OrderRegistry, SessionReport};
pub use trigger::is_triggered;
