//! SolVault Sim: simulated venue, quote feed and session driver.
//!
//! Everything outside the order engine proper:
//! - Random-walk quote feed (seeded, reproducible)
//! - Simulated venue with a liquidity pool and injected slippage
//! - Trader account with balance checks and portfolio history
//! - Session driver tying registry, feed, venue and account together
//! - TOML session configuration
//! - Tracing setup

pub mod account;
pub mod config;
pub mod feed;
pub mod logging;
pub mod session;
pub mod venue;

pub use account::{Account, Dashboard, PortfolioSnapshot};
pub use config::{ConfigError, OrderConfig, PositionConfig, SessionConfig, SlippageConfig};
pub use feed::RandomWalkFeed;
pub use logging::init_tracing;
pub use session::{Placement, SessionError, SessionSummary, TickReport, TradingSession};
pub use venue::{SimulatedVenue, SlippageModel};
