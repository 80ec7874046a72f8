//! Open positions and closed-trade records.

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    SupertrendBearish,
    TimeLimit,
    EndOfBacktest,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::StopLoss => "Stop Loss",
            ExitReason::TakeProfit => "Take Profit",
            ExitReason::SupertrendBearish => "Supertrend Bearish",
            ExitReason::TimeLimit => "Time Limit",
            ExitReason::EndOfBacktest => "End of Backtest",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A long holding of fractional shares.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub symbol: String,
    pub shares: f64,
    pub entry_price: f64,
    pub entry_date: DateTime<Utc>,
}

impl Position {
    pub fn cost_basis(&self) -> f64 {
        self.shares * self.entry_price
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.shares * price
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.shares * (price - self.entry_price)
    }

    /// Settle the position at `exit_price`.
    pub fn close(
        self,
        exit_price: f64,
        exit_date: DateTime<Utc>,
        reason: ExitReason,
    ) -> ClosedTrade {
        let cost = self.cost_basis();
        let pnl = self.market_value(exit_price) - cost;
        let pnl_pct = if cost != 0.0 { pnl / cost * 100.0 } else { 0.0 };
        ClosedTrade {
            symbol: self.symbol,
            shares: self.shares,
            entry_price: self.entry_price,
            exit_price,
            entry_date: self.entry_date,
            exit_date,
            pnl,
            pnl_pct,
            reason,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub symbol: String,
    pub shares: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_date: DateTime<Utc>,
    pub exit_date: DateTime<Utc>,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub reason: ExitReason,
}

impl ClosedTrade {
    pub fn holding_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }
}
