//! Trading session: one registry driven by a feed against the simulated venue.
//!
//! A session owns everything for one run:
//! - the [`OrderRegistry`] for the configured instrument
//! - a [`PriceFeed`] (random walk by default)
//! - the [`SimulatedVenue`] acting as execution gateway
//! - the trader's [`Account`]
//!
//! Orders are placed up front, then [`TradingSession::step`] runs one tick at
//! a time. [`TradingSession::finish`] tears the registry down and returns a
//! serializable summary.

use crate::account::{positions_value, Account, Dashboard, PortfolioSnapshot};
use crate::config::{ConfigError, OrderConfig, SessionConfig};
use crate::feed::RandomWalkFeed;
use crate::venue::{slippage_from_config, SimulatedVenue};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solvault_core::domain::{
    Bracket, BracketSpec, Intent, Order, OrderSpec, OrderStatus, PositionId, PriceTick, Side,
};
use solvault_core::engine::{OrderError, OrderEvent, OrderRegistry, SessionReport};
use solvault_core::PriceFeed;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("insufficient balance: need {required}, have {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },
}

/// What a configured order turned into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "placed", rename_all = "snake_case")]
pub enum Placement {
    Order(Order),
    Bracket(Bracket),
}

/// Outcome of one tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: PriceTick,
    pub events: Vec<OrderEvent>,
    pub dashboard: Dashboard,
}

/// End-of-session totals plus the full registry report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub instrument: String,
    pub ticks: u64,
    pub final_price: Option<Decimal>,
    pub initial_balance: Decimal,
    pub final_balance: Decimal,
    pub realized_pnl: Decimal,
    pub portfolio_value: Decimal,
    pub liquidity_remaining: Decimal,
    pub orders_filled: usize,
    pub orders_cancelled: usize,
    pub orders_rejected: usize,
    pub history: Vec<PortfolioSnapshot>,
    pub report: SessionReport,
}

#[derive(Debug)]
pub struct TradingSession<F: PriceFeed = RandomWalkFeed> {
    registry: OrderRegistry,
    feed: F,
    venue: SimulatedVenue,
    account: Account,
    /// Seeded positions, by config index.
    positions: Vec<PositionId>,
}

impl TradingSession<RandomWalkFeed> {
    /// Build a session whose quotes come from the config's random walk.
    pub fn from_config(config: &SessionConfig) -> Result<Self, SessionError> {
        let feed = RandomWalkFeed::new(
            config.instrument.clone(),
            config.starting_price,
            config.max_step,
            config.seed,
            config.ticks,
        );
        Self::with_feed(config, feed)
    }
}

impl<F: PriceFeed> TradingSession<F> {
    /// Build a session over any feed, then seed positions and place the
    /// configured orders.
    pub fn with_feed(config: &SessionConfig, feed: F) -> Result<Self, SessionError> {
        config.validate()?;

        let mut registry = OrderRegistry::new(config.instrument.clone());
        let positions = config
            .positions
            .iter()
            .map(|p| registry.open_position(p.side, p.entry_price, p.size))
            .collect::<Result<Vec<_>, _>>()?;

        // Offset so slippage draws are independent of the quote walk
        let slippage = slippage_from_config(&config.slippage, config.seed.wrapping_add(1));

        let mut session = Self {
            registry,
            feed,
            venue: SimulatedVenue::new(config.liquidity_pool, slippage),
            account: Account::new(config.initial_balance),
            positions,
        };
        for order in &config.orders {
            session.place(order)?;
        }

        info!(
            instrument = %config.instrument,
            ticks = config.ticks,
            orders = config.orders.len(),
            balance = %config.initial_balance,
            "session ready"
        );
        Ok(session)
    }

    /// Check the balance, then place one configured order.
    ///
    /// Opening orders must be covered by the cash balance at their limit
    /// price; closing orders are not checked.
    pub fn place(&mut self, order: &OrderConfig) -> Result<Placement, SessionError> {
        match order {
            OrderConfig::Limit {
                side,
                intent,
                price,
                size,
                position,
            } => {
                if *intent == Intent::Open {
                    self.ensure_affordable(*price * *size)?;
                }
                let mut spec = OrderSpec::limit(*side, *intent, *price, *size);
                if let Some(idx) = position {
                    spec = spec.on_position(self.seeded(*idx)?);
                }
                Ok(Placement::Order(self.registry.place(spec)?))
            }
            OrderConfig::Stop {
                position,
                price,
                size,
            } => {
                let (pid, side, open) = self.seeded_position(*position)?;
                let spec = OrderSpec::stop(side, *price, size.unwrap_or(open)).on_position(pid);
                Ok(Placement::Order(self.registry.place(spec)?))
            }
            OrderConfig::TrailingStop {
                position,
                trail_percent,
                size,
            } => {
                let (pid, side, open) = self.seeded_position(*position)?;
                let spec = OrderSpec::trailing_stop(side, *trail_percent, size.unwrap_or(open))
                    .on_position(pid);
                Ok(Placement::Order(self.registry.place(spec)?))
            }
            OrderConfig::Bracket {
                side,
                size,
                entry_price,
                stop_price,
                target_price,
                trail_percent,
            } => {
                self.ensure_affordable(*entry_price * *size)?;
                let bracket = self.registry.place_bracket(BracketSpec {
                    side: *side,
                    size: *size,
                    entry_price: *entry_price,
                    stop_price: *stop_price,
                    target_price: *target_price,
                    trail_percent: *trail_percent,
                })?;
                Ok(Placement::Bracket(bracket))
            }
        }
    }

    /// Process the next tick. `None` once the feed is exhausted.
    pub fn step(&mut self) -> Option<TickReport> {
        let tick = self.feed.next_tick()?;
        let events = self.registry.on_price_tick(&tick, &mut self.venue);

        for event in &events {
            if let OrderEvent::Filled { order_id, fill, .. } = event {
                if let Some(order) = self.registry.get(*order_id) {
                    self.account.settle(order.action(), fill);
                }
            }
        }

        let snapshot = PortfolioSnapshot {
            tick: self.registry.ticks_processed(),
            timestamp: tick.timestamp,
            price: tick.price,
            balance: self.account.balance(),
            positions_value: positions_value(self.registry.positions(), tick.price),
        };
        self.account.record_snapshot(snapshot);

        Some(TickReport {
            dashboard: self.dashboard(),
            tick,
            events,
        })
    }

    /// Run the feed to exhaustion, handing each tick to `on_tick`.
    pub fn run(mut self, mut on_tick: impl FnMut(&TickReport)) -> SessionSummary {
        while let Some(report) = self.step() {
            on_tick(&report);
        }
        self.finish()
    }

    pub fn dashboard(&self) -> Dashboard {
        let price = self.registry.last_price();
        let open_positions: Vec<_> = self.registry.open_positions().into_iter().cloned().collect();
        let marked = price.map_or(Decimal::ZERO, |p| positions_value(&open_positions, p));
        Dashboard {
            instrument: self.registry.instrument().to_string(),
            price,
            balance: self.account.balance(),
            active_orders: self.registry.active_orders().len(),
            portfolio_value: self.account.balance() + marked,
            open_positions,
            latest: self.account.latest().cloned(),
        }
    }

    pub fn registry(&self) -> &OrderRegistry {
        &self.registry
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn venue(&self) -> &SimulatedVenue {
        &self.venue
    }

    /// Tear down the registry and total up the session.
    pub fn finish(self) -> SessionSummary {
        let dashboard = self.dashboard();
        let liquidity_remaining = self.venue.liquidity();
        let report = self.registry.teardown();

        let count = |status: OrderStatus| report.orders.iter().filter(|o| o.status == status).count();
        let summary = SessionSummary {
            instrument: report.instrument.clone(),
            ticks: report.ticks_processed,
            final_price: report.last_price,
            initial_balance: self.account.initial_balance(),
            final_balance: self.account.balance(),
            realized_pnl: report.realized_pnl(),
            portfolio_value: dashboard.portfolio_value,
            liquidity_remaining,
            orders_filled: count(OrderStatus::Filled),
            orders_cancelled: count(OrderStatus::Cancelled),
            orders_rejected: count(OrderStatus::Rejected),
            history: self.account.history().to_vec(),
            report,
        };
        info!(
            ticks = summary.ticks,
            filled = summary.orders_filled,
            realized_pnl = %summary.realized_pnl,
            portfolio_value = %summary.portfolio_value,
            "session finished"
        );
        summary
    }

    fn ensure_affordable(&self, notional: Decimal) -> Result<(), SessionError> {
        if self.account.can_afford(notional) {
            return Ok(());
        }
        warn!(%notional, balance = %self.account.balance(), "insufficient balance");
        Err(SessionError::InsufficientBalance {
            required: notional,
            available: self.account.balance(),
        })
    }

    fn seeded(&self, idx: usize) -> Result<PositionId, SessionError> {
        self.positions.get(idx).copied().ok_or_else(|| {
            SessionError::Config(ConfigError::Invalid(format!("no positions[{idx}]")))
        })
    }

    fn seeded_position(&self, idx: usize) -> Result<(PositionId, Side, Decimal), SessionError> {
        let pid = self.seeded(idx)?;
        let position = self.registry.position(pid).ok_or_else(|| {
            SessionError::Config(ConfigError::Invalid(format!("positions[{idx}] missing")))
        })?;
        Ok((pid, position.side, position.size))
    }
}
