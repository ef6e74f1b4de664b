//! Trader account: cash balance, portfolio history and the dashboard view.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solvault_core::domain::{Action, Fill, Position, Side};
use std::fmt;

/// Balance and positions value at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub tick: u64,
    pub timestamp: DateTime<Utc>,
    pub price: Decimal,
    pub balance: Decimal,
    pub positions_value: Decimal,
}

impl PortfolioSnapshot {
    pub fn portfolio_value(&self) -> Decimal {
        self.balance + self.positions_value
    }
}

/// Signed mark-to-market of open positions: longs add, shorts owe.
pub fn positions_value<'a>(positions: impl IntoIterator<Item = &'a Position>, price: Decimal) -> Decimal {
    positions
        .into_iter()
        .filter(|p| p.is_open())
        .map(|p| match p.side {
            Side::Long => p.market_value(price),
            Side::Short => -p.market_value(price),
        })
        .fold(Decimal::ZERO, Decimal::saturating_add)
}

/// Cash ledger for one trader.
///
/// Buys debit the notional, sells credit it, so balance plus signed
/// positions value stays the portfolio value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    initial_balance: Decimal,
    balance: Decimal,
    history: Vec<PortfolioSnapshot>,
}

impl Account {
    pub fn new(initial_balance: Decimal) -> Self {
        Self {
            initial_balance,
            balance: initial_balance,
            history: Vec::new(),
        }
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn initial_balance(&self) -> Decimal {
        self.initial_balance
    }

    pub fn can_afford(&self, notional: Decimal) -> bool {
        self.balance >= notional
    }

    /// Book a fill's cash flow. Saturates at the `Decimal` bounds.
    pub fn settle(&mut self, action: Action, fill: &Fill) {
        let notional = fill.notional();
        self.balance = match action {
            Action::Buy => self.balance.saturating_sub(notional),
            Action::Sell => self.balance.saturating_add(notional),
        };
    }

    pub fn record_snapshot(&mut self, snapshot: PortfolioSnapshot) {
        self.history.push(snapshot);
    }

    pub fn history(&self) -> &[PortfolioSnapshot] {
        &self.history
    }

    pub fn latest(&self) -> Option<&PortfolioSnapshot> {
        self.history.last()
    }
}

/// What a trader sees after each tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub instrument: String,
    pub price: Option<Decimal>,
    pub balance: Decimal,
    pub open_positions: Vec<Position>,
    pub active_orders: usize,
    pub portfolio_value: Decimal,
    pub latest: Option<PortfolioSnapshot>,
}

impl fmt::Display for Dashboard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== SolVault Dashboard ({}) ===", self.instrument)?;
        if let Some(price) = self.price {
            writeln!(f, "Price: {:.2}", price)?;
        }
        writeln!(f, "Balance: {:.2}", self.balance)?;
        if self.open_positions.is_empty() {
            writeln!(f, "Positions: none")?;
        } else {
            writeln!(f, "Positions:")?;
            for p in &self.open_positions {
                writeln!(
                    f,
                    "  {} {} {} @ {:.2} (realized {:.2})",
                    p.id, p.side, p.size, p.entry_price, p.realized_pnl
                )?;
            }
        }
        writeln!(f, "Active Orders: {}", self.active_orders)?;
        writeln!(f, "Portfolio Value: {:.2}", self.portfolio_value)?;
        if let Some(latest) = &self.latest {
            writeln!(
                f,
                "Latest Portfolio Update: Balance={:.2}, Positions Value={:.2}",
                latest.balance, latest.positions_value
            )?;
        }
        write!(f, "====================")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use solvault_core::domain::PositionId;

    #[test]
    fn buys_debit_sells_credit() {
        let mut account = Account::new(dec!(5000));
        account.settle(Action::Buy, &Fill::new(dec!(102), dec!(10)));
        assert_eq!(account.balance(), dec!(3980));
        account.settle(Action::Sell, &Fill::new(dec!(110), dec!(10)));
        assert_eq!(account.balance(), dec!(5080));
        assert_eq!(account.initial_balance(), dec!(5000));
    }

    #[test]
    fn affordability() {
        let account = Account::new(dec!(1000));
        assert!(account.can_afford(dec!(1000)));
        assert!(!account.can_afford(dec!(1000.01)));
    }

    #[test]
    fn shorts_count_against_positions_value() {
        let long = Position::new(PositionId(1), Side::Long, dec!(100), dec!(2));
        let short = Position::new(PositionId(2), Side::Short, dec!(100), dec!(1));
        assert_eq!(positions_value([&long, &short], dec!(110)), dec!(110));
    }

    #[test]
    fn dashboard_renders() {
        let mut account = Account::new(dec!(5000));
        account.record_snapshot(PortfolioSnapshot {
            tick: 1,
            timestamp: Utc::now(),
            price: dec!(101),
            balance: dec!(3980),
            positions_value: dec!(1010),
        });
        assert_eq!(account.latest().unwrap().portfolio_value(), dec!(4990));

        let dashboard = Dashboard {
            instrument: "SOL".into(),
            price: Some(dec!(101)),
            balance: account.balance(),
            open_positions: vec![Position::new(PositionId(1), Side::Long, dec!(102), dec!(10))],
            active_orders: 2,
            portfolio_value: dec!(6010),
            latest: account.latest().cloned(),
        };
        let text = dashboard.to_string();
        assert!(text.contains("Balance: 5000.00"));
        assert!(text.contains("P1 LONG 10 @ 102.00"));
        assert!(text.contains("Active Orders: 2"));
        assert!(text.contains("Positions Value=1010.00"));
    }
}
