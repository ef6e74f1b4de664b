//! Price feed seam.

use crate::domain::PriceTick;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// A producer of sequential price observations.
pub trait PriceFeed {
    /// Next tick, or `None` when the feed is exhausted.
    fn next_tick(&mut self) -> Option<PriceTick>;
}

/// Replays a fixed price sequence, one second apart.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    ticks: VecDeque<PriceTick>,
}

impl ReplayFeed {
    pub fn new(instrument: &str, prices: &[Decimal], start: DateTime<Utc>) -> Self {
        let ticks = prices
            .iter()
            .enumerate()
            .map(|(i, &price)| PriceTick::new(instrument, price, start + Duration::seconds(i as i64)))
            .collect();
        Self { ticks }
    }

    pub fn remaining(&self) -> usize {
        self.ticks.len()
    }
}

impl PriceFeed for ReplayFeed {
    fn next_tick(&mut self) -> Option<PriceTick> {
        self.ticks.pop_front()
    }
}

impl Iterator for ReplayFeed {
    type Item = PriceTick;

    fn next(&mut self) -> Option<PriceTick> {
        self.next_tick()
    }
}
