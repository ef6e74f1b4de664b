//! Exposure direction, order intent, and the buy/sell action they imply.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// Whether an order opens (or adds to) exposure or closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Open,
    Close,
}

/// What actually crosses the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Buy,
    Sell,
}

impl Action {
    /// Buy opens a long or closes a short; sell opens a short or closes a long.
    pub fn of(side: Side, intent: Intent) -> Self {
        match (side, intent) {
            (Side::Long, Intent::Open) | (Side::Short, Intent::Close) => Action::Buy,
            (Side::Short, Intent::Open) | (Side::Long, Intent::Close) => Action::Sell,
        }
    }
}
