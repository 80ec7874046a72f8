//! Cash, open positions and the daily equity record of a simulation.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;

use super::position::{ClosedTrade, ExitReason, Position};

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub positions: HashMap<String, Position>,
    pub closed_trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            positions: HashMap::new(),
            closed_trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    pub fn position_count(&self) -> usize {
        self.positions.len()
    }

    /// Buy into `position` if cash covers its cost. Returns whether it was
    /// taken.
    pub fn open(&mut self, position: Position) -> bool {
        let cost = position.cost_basis();
        if position.shares <= 0.0 || cost > self.cash || self.has_position(&position.symbol) {
            return false;
        }
        self.cash -= cost;
        self.positions.insert(position.symbol.clone(), position);
        true
    }

    /// Sell the whole holding in `symbol` and book the trade.
    pub fn close(
        &mut self,
        symbol: &str,
        exit_price: f64,
        exit_date: DateTime<Utc>,
        reason: ExitReason,
    ) -> Option<&ClosedTrade> {
        let position = self.positions.remove(symbol)?;
        self.cash += position.market_value(exit_price);
        self.closed_trades
            .push(position.close(exit_price, exit_date, reason));
        self.closed_trades.last()
    }

    /// Cash plus the cost basis of open positions.
    pub fn equity_at_cost(&self) -> f64 {
        self.cash + self.positions.values().map(Position::cost_basis).sum::<f64>()
    }

    /// Cash plus open positions marked at `prices`; unpriced positions count
    /// at cost.
    pub fn total_equity(&self, prices: &HashMap<String, f64>) -> f64 {
        let held: f64 = self
            .positions
            .values()
            .map(|pos| match prices.get(&pos.symbol) {
                Some(&price) => pos.market_value(price),
                None => pos.cost_basis(),
            })
            .sum();
        self.cash + held
    }

    pub fn record_equity(&mut self, date: NaiveDate, equity: f64) {
        self.equity_curve.push(EquityPoint { date, equity });
    }
}
