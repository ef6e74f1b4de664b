//! Session configuration.
//!
//! A session is described by a TOML file: the instrument and quote walk,
//! the venue (liquidity pool and slippage), the account's starting balance,
//! any pre-existing positions, and the orders to place before the first tick.
//!
//! ```toml
//! instrument = "SOL"
//! seed = 42
//! ticks = 15
//! starting_price = "100"
//! max_step = "1.5"
//! liquidity_pool = "10000"
//! initial_balance = "5000"
//!
//! [slippage]
//! type = "random_bps"
//! max_bps = "20"
//! tolerance_bps = "15"
//!
//! [[orders]]
//! type = "bracket"
//! side = "long"
//! size = "10"
//! entry_price = "102"
//! stop_price = "98"
//! target_price = "110"
//! trail_percent = "0.02"
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solvault_core::domain::{Intent, Side};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("serialize config TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Venue slippage, in basis points against the trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SlippageConfig {
    /// Fill exactly at the tick price.
    None,

    /// Every fill moves by the same amount.
    FixedBps { bps: Decimal },

    /// Uniform in `[0, max_bps]`; fills past `tolerance_bps` are rejected.
    RandomBps {
        max_bps: Decimal,
        tolerance_bps: Decimal,
    },
}

/// An exposure that exists before the session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionConfig {
    pub side: Side,
    pub entry_price: Decimal,
    pub size: Decimal,
}

fn default_intent() -> Intent {
    Intent::Open
}

/// An order placed before the first tick.
///
/// `position` refers to an entry of [`SessionConfig::positions`] by index.
/// A missing `size` on a closing order means the whole position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderConfig {
    Limit {
        side: Side,
        #[serde(default = "default_intent")]
        intent: Intent,
        price: Decimal,
        size: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<usize>,
    },
    Stop {
        position: usize,
        price: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<Decimal>,
    },
    TrailingStop {
        position: usize,
        trail_percent: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        size: Option<Decimal>,
    },
    Bracket {
        side: Side,
        size: Decimal,
        entry_price: Decimal,
        stop_price: Decimal,
        target_price: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trail_percent: Option<Decimal>,
    },
}

impl OrderConfig {
    fn position_ref(&self) -> Option<usize> {
        match self {
            OrderConfig::Limit { position, .. } => *position,
            OrderConfig::Stop { position, .. } | OrderConfig::TrailingStop { position, .. } => {
                Some(*position)
            }
            OrderConfig::Bracket { .. } => None,
        }
    }
}

/// Everything needed to reproduce a simulated session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub instrument: String,
    /// Seed for the quote walk and random slippage.
    pub seed: u64,
    pub ticks: u64,
    pub starting_price: Decimal,
    /// Largest move per tick in either direction.
    pub max_step: Decimal,
    /// Venue liquidity in quote currency.
    pub liquidity_pool: Decimal,
    pub initial_balance: Decimal,
    pub slippage: SlippageConfig,
    pub positions: Vec<PositionConfig>,
    pub orders: Vec<OrderConfig>,
}

impl Default for SessionConfig {
    /// One trader with 5000 on hand and a long bracket trailing 2%.
    fn default() -> Self {
        Self {
            instrument: "SOL".into(),
            seed: 42,
            ticks: 15,
            starting_price: Decimal::from(100),
            max_step: Decimal::new(15, 1),
            liquidity_pool: Decimal::from(10_000),
            initial_balance: Decimal::from(5_000),
            slippage: SlippageConfig::None,
            positions: Vec::new(),
            orders: vec![OrderConfig::Bracket {
                side: Side::Long,
                size: Decimal::from(10),
                entry_price: Decimal::from(102),
                stop_price: Decimal::from(98),
                target_price: Decimal::from(110),
                trail_percent: Some(Decimal::new(2, 2)),
            }],
        }
    }
}

impl SessionConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.instrument.trim().is_empty() {
            return invalid("instrument must not be empty".into());
        }
        if self.ticks == 0 {
            return invalid("ticks must be at least 1".into());
        }
        if self.starting_price <= Decimal::ZERO {
            return invalid(format!("starting_price must be positive, got {}", self.starting_price));
        }
        if self.max_step < Decimal::ZERO {
            return invalid(format!("max_step must not be negative, got {}", self.max_step));
        }
        if self.liquidity_pool <= Decimal::ZERO {
            return invalid(format!("liquidity_pool must be positive, got {}", self.liquidity_pool));
        }
        if self.initial_balance <= Decimal::ZERO {
            return invalid(format!("initial_balance must be positive, got {}", self.initial_balance));
        }

        match &self.slippage {
            SlippageConfig::None => {}
            SlippageConfig::FixedBps { bps } if *bps < Decimal::ZERO => {
                return invalid(format!("slippage bps must not be negative, got {bps}"));
            }
            SlippageConfig::FixedBps { .. } => {}
            SlippageConfig::RandomBps {
                max_bps,
                tolerance_bps,
            } => {
                if *max_bps < Decimal::ZERO || *tolerance_bps < Decimal::ZERO {
                    return invalid("slippage bounds must not be negative".into());
                }
            }
        }

        for (i, p) in self.positions.iter().enumerate() {
            if p.entry_price <= Decimal::ZERO || p.size <= Decimal::ZERO {
                return invalid(format!("positions[{i}]: entry_price and size must be positive"));
            }
        }
        for (i, order) in self.orders.iter().enumerate() {
            if let Some(idx) = order.position_ref() {
                if idx >= self.positions.len() {
                    return invalid(format!(
                        "orders[{i}] refers to positions[{idx}], but only {} configured",
                        self.positions.len()
                    ));
                }
            }
        }
        Ok(())
    }
}
