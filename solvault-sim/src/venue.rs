//! Simulated quote/swap venue.
//!
//! Implements [`ExecutionGateway`] over a single liquidity pool. Opening
//! fills draw their notional from the pool, closing fills return it. Price
//! impact is delegated to an injected [`SlippageModel`].

use crate::config::SlippageConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use solvault_core::domain::{Action, ExecutionResult, Fill, Intent, Order, RejectionReason};
use solvault_core::ExecutionGateway;
use tracing::debug;

const BPS: Decimal = Decimal::from_parts(10_000, 0, 0, false, 0);

/// Samples adverse slippage for one execution, in basis points.
pub trait SlippageModel: Send {
    fn sample_bps(&mut self, order: &Order, market_price: Decimal) -> Decimal;

    /// Largest slippage the venue will fill at. `None` accepts anything.
    fn tolerance_bps(&self) -> Option<Decimal> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoSlippage;

impl SlippageModel for NoSlippage {
    fn sample_bps(&mut self, _order: &Order, _market_price: Decimal) -> Decimal {
        Decimal::ZERO
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedSlippage {
    pub bps: Decimal,
}

impl SlippageModel for FixedSlippage {
    fn sample_bps(&mut self, _order: &Order, _market_price: Decimal) -> Decimal {
        self.bps
    }
}

/// Uniform slippage in hundredths of a basis point.
#[derive(Debug, Clone)]
pub struct RandomSlippage {
    max_hundredths: i64,
    tolerance_bps: Decimal,
    rng: StdRng,
}

impl RandomSlippage {
    pub fn new(max_bps: Decimal, tolerance_bps: Decimal, seed: u64) -> Self {
        let max_hundredths = (max_bps.abs() * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .unwrap_or(0);
        Self {
            max_hundredths,
            tolerance_bps,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl SlippageModel for RandomSlippage {
    fn sample_bps(&mut self, _order: &Order, _market_price: Decimal) -> Decimal {
        Decimal::new(self.rng.gen_range(0..=self.max_hundredths), 2)
    }

    fn tolerance_bps(&self) -> Option<Decimal> {
        Some(self.tolerance_bps)
    }
}

/// Build the slippage strategy a config names. `seed` drives random models.
pub fn slippage_from_config(config: &SlippageConfig, seed: u64) -> Box<dyn SlippageModel> {
    match config {
        SlippageConfig::None => Box::new(NoSlippage),
        SlippageConfig::FixedBps { bps } => Box::new(FixedSlippage { bps: *bps }),
        SlippageConfig::RandomBps {
            max_bps,
            tolerance_bps,
        } => Box::new(RandomSlippage::new(*max_bps, *tolerance_bps, seed)),
    }
}

/// A venue with finite liquidity and injected slippage.
pub struct SimulatedVenue {
    liquidity_pool: Decimal,
    slippage: Box<dyn SlippageModel>,
    executions: u64,
}

impl std::fmt::Debug for SimulatedVenue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedVenue")
            .field("liquidity_pool", &self.liquidity_pool)
            .field("executions", &self.executions)
            .finish_non_exhaustive()
    }
}

impl SimulatedVenue {
    pub fn new(liquidity_pool: Decimal, slippage: Box<dyn SlippageModel>) -> Self {
        Self {
            liquidity_pool,
            slippage,
            executions: 0,
        }
    }

    /// A venue that fills at the tick price.
    pub fn frictionless(liquidity_pool: Decimal) -> Self {
        Self::new(liquidity_pool, Box::new(NoSlippage))
    }

    pub fn liquidity(&self) -> Decimal {
        self.liquidity_pool
    }

    /// Successful fills so far.
    pub fn executions(&self) -> u64 {
        self.executions
    }
}

impl ExecutionGateway for SimulatedVenue {
    fn execute(&mut self, order: &Order, market_price: Decimal) -> ExecutionResult {
        if order.size <= Decimal::ZERO || market_price <= Decimal::ZERO {
            return Err(RejectionReason::InvalidAmount);
        }

        let bps = self.slippage.sample_bps(order, market_price);
        if let Some(tolerance) = self.slippage.tolerance_bps() {
            if bps > tolerance {
                debug!(order_id = %order.id, %bps, %tolerance, "slippage past tolerance");
                return Err(RejectionReason::SlippageExceeded);
            }
        }

        // Slippage always works against the trader
        let Some(impact) = market_price
            .checked_mul(bps)
            .and_then(|scaled| scaled.checked_div(BPS))
        else {
            return Err(RejectionReason::InvalidAmount);
        };
        let price = match order.action() {
            Action::Buy => market_price.checked_add(impact),
            Action::Sell => market_price.checked_sub(impact),
        }
        .ok_or(RejectionReason::InvalidAmount)?;
        if price <= Decimal::ZERO {
            return Err(RejectionReason::SlippageExceeded);
        }

        let notional = price
            .checked_mul(order.size)
            .ok_or(RejectionReason::InvalidAmount)?;
        match order.intent {
            Intent::Open => {
                if notional > self.liquidity_pool {
                    debug!(
                        order_id = %order.id,
                        %notional,
                        pool = %self.liquidity_pool,
                        "not enough liquidity"
                    );
                    return Err(RejectionReason::InsufficientLiquidity);
                }
                self.liquidity_pool -= notional;
            }
            Intent::Close => self.liquidity_pool = self.liquidity_pool.saturating_add(notional),
        }

        self.executions += 1;
        Ok(Fill::new(price, order.size))
    }
}
