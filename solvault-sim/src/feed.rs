//! Seeded random-walk quote feed.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use solvault_core::domain::PriceTick;
use solvault_core::PriceFeed;

/// Lowest quote the walk can reach.
pub const PRICE_FLOOR: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Random walk in whole cents: each tick moves by a uniform step in
/// `[-max_step, +max_step]`, never below [`PRICE_FLOOR`].
///
/// The same seed always yields the same path.
#[derive(Debug, Clone)]
pub struct RandomWalkFeed {
    instrument: String,
    price: Decimal,
    max_step_cents: i64,
    rng: StdRng,
    remaining: u64,
    clock: DateTime<Utc>,
}

impl RandomWalkFeed {
    pub fn new(
        instrument: impl Into<String>,
        starting_price: Decimal,
        max_step: Decimal,
        seed: u64,
        ticks: u64,
    ) -> Self {
        let max_step_cents = (max_step.abs() * Decimal::ONE_HUNDRED)
            .trunc()
            .to_i64()
            .unwrap_or(0);
        Self {
            instrument: instrument.into(),
            price: starting_price.max(PRICE_FLOOR),
            max_step_cents,
            rng: StdRng::seed_from_u64(seed),
            remaining: ticks,
            clock: Utc::now(),
        }
    }

    /// Pin the first tick's timestamp (ticks follow one second apart).
    pub fn starting_at(mut self, start: DateTime<Utc>) -> Self {
        self.clock = start;
        self
    }

    /// The last quoted price (the starting price before the first tick).
    pub fn current_price(&self) -> Decimal {
        self.price
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl PriceFeed for RandomWalkFeed {
    fn next_tick(&mut self) -> Option<PriceTick> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let step = self
            .rng
            .gen_range(-self.max_step_cents..=self.max_step_cents);
        self.price = (self.price + Decimal::new(step, 2)).max(PRICE_FLOOR);

        let tick = PriceTick::new(self.instrument.clone(), self.price, self.clock);
        self.clock += Duration::seconds(1);
        Some(tick)
    }
}

impl Iterator for RandomWalkFeed {
    type Item = PriceTick;

    fn next(&mut self) -> Option<PriceTick> {
        self.next_tick()
    }
}
