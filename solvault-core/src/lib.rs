//! SolVault Core: order engine for a quote/swap venue.
//!
//! This crate contains the heart of the engine:
//! - Domain types (positions, orders, fills, ticks, ids)
//! - Order registry with OCO and bracket cascades
//! - Trailing stop tracker with a ratchet-only trigger
//! - Risk/reward calculator
//! - Execution gateway and price feed seams
//!
//! Venue simulation and session driving live in `solvault-sim`.

pub mod domain;
pub mod engine;
pub mod feed;
pub mod gateway;
pub mod risk;

pub use engine::{OrderError, OrderEvent, OrderRegistry, SessionReport};
pub use gateway::{ExecutionGateway, ImmediateFill};
pub use feed::{PriceFeed, ReplayFeed};
