//! Performance metrics for a finished simulation.
//!
//! Returns are annualized on a 252-day year; one equity point is one day.

use super::portfolio::{EquityPoint, Portfolio};
use super::position::ClosedTrade;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    pub total_return: f64,
    pub annualized_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: i64,
    pub trades_won: usize,
    pub trades_lost: usize,
    pub trades_breakeven: usize,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub largest_win: f64,
    pub largest_loss: f64,
    pub avg_trade_duration: f64,
}

impl Metrics {
    pub fn compute(portfolio: &Portfolio, risk_free_rate: f64) -> Self {
        Self::from_parts(
            &portfolio.equity_curve,
            &portfolio.closed_trades,
            portfolio.initial_capital,
            risk_free_rate,
        )
    }

    pub fn from_parts(
        equity_curve: &[EquityPoint],
        trades: &[ClosedTrade],
        initial_capital: f64,
        risk_free_rate: f64,
    ) -> Self {
        let final_equity = equity_curve
            .last()
            .map_or(initial_capital, |p| p.equity);
        let total_return = ratio(final_equity - initial_capital, initial_capital);

        let years = equity_curve.len() as f64 / TRADING_DAYS_PER_YEAR;
        let annualized_return = if years > 0.0 && total_return.is_finite() {
            (1.0 + total_return).powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let drawdown = Drawdown::of(equity_curve);
        let (sharpe_ratio, sortino_ratio) =
            risk_adjusted(equity_curve, risk_free_rate / TRADING_DAYS_PER_YEAR);
        let tally = TradeTally::of(trades);

        let profit_factor = if tally.gross_loss > 0.0 {
            tally.gross_win / tally.gross_loss
        } else if tally.gross_win > 0.0 {
            f64::INFINITY
        } else {
            0.0
        };

        Metrics {
            total_return,
            annualized_return,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown: drawdown.depth,
            max_drawdown_duration: drawdown.duration,
            trades_won: tally.won,
            trades_lost: tally.lost,
            trades_breakeven: tally.breakeven,
            win_rate: ratio(tally.won as f64, trades.len() as f64),
            profit_factor,
            avg_win: ratio(tally.gross_win, tally.won as f64),
            avg_loss: ratio(tally.gross_loss, tally.lost as f64),
            largest_win: tally.largest_win,
            largest_loss: tally.largest_loss,
            avg_trade_duration: ratio(tally.holding_days as f64, trades.len() as f64),
        }
    }
}

/// num / den, or 0 when den is not positive.
fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

#[derive(Debug, Default)]
struct TradeTally {
    won: usize,
    lost: usize,
    breakeven: usize,
    gross_win: f64,
    gross_loss: f64,
    largest_win: f64,
    largest_loss: f64,
    holding_days: i64,
}

impl TradeTally {
    fn of(trades: &[ClosedTrade]) -> Self {
        trades.iter().fold(Self::default(), |mut t, trade| {
            let pnl = trade.pnl;
            if pnl > 0.0 {
                t.won += 1;
                t.gross_win += pnl;
                t.largest_win = t.largest_win.max(pnl);
            } else if pnl < 0.0 {
                t.lost += 1;
                t.gross_loss += -pnl;
                t.largest_loss = t.largest_loss.max(-pnl);
            } else {
                t.breakeven += 1;
            }
            t.holding_days += trade.holding_days();
            t
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Drawdown {
    /// Deepest peak-to-trough fall as a fraction of the peak.
    depth: f64,
    /// Longest run of points below the running peak.
    duration: i64,
}

impl Drawdown {
    fn of(curve: &[EquityPoint]) -> Self {
        let Some(first) = curve.first() else {
            return Drawdown {
                depth: 0.0,
                duration: 0,
            };
        };

        let mut peak = first.equity;
        let mut depth = 0.0_f64;
        let mut run = 0i64;
        let mut duration = 0i64;

        for point in curve {
            if point.equity > peak {
                peak = point.equity;
                run = 0;
            } else if peak > 0.0 {
                depth = depth.max((peak - point.equity) / peak);
                run += 1;
                duration = duration.max(run);
            }
        }

        Drawdown { depth, duration }
    }
}

fn risk_adjusted(curve: &[EquityPoint], daily_rf: f64) -> (f64, f64) {
    let returns: Vec<f64> = curve
        .windows(2)
        .map(|w| ratio(w[1].equity - w[0].equity, w[0].equity))
        .collect();
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let stddev = (returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt();
    let downside = (returns
        .iter()
        .filter(|&&r| r < daily_rf)
        .map(|r| (r - daily_rf).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();

    let excess = mean - daily_rf;
    let annualize = TRADING_DAYS_PER_YEAR.sqrt();
    let sharpe = if stddev > 0.0 {
        excess / stddev * annualize
    } else {
        0.0
    };
    let sortino = if downside > 0.0 {
        excess / downside * annualize
    } else {
        0.0
    };
    (sharpe, sortino)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::ExitReason;
    use chrono::{Duration, NaiveDate, TimeZone, Utc};

    fn make_equity_curve(values: &[f64]) -> Vec<EquityPoint> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        values
            .iter()
            .enumerate()
            .map(|(i, &equity)| EquityPoint {
                date: start + Duration::days(i as i64),
                equity,
            })
            .collect()
    }

    fn make_trade(symbol: &str, pnl: f64, days: i64) -> ClosedTrade {
        let entry_date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        ClosedTrade {
            symbol: symbol.to_string(),
            shares: 1.0,
            entry_price: 100.0,
            exit_price: 100.0 + pnl,
            entry_date,
            exit_date: entry_date + Duration::days(days),
            pnl,
            pnl_pct: pnl,
            reason: ExitReason::SupertrendBearish,
        }
    }

    fn metrics(equity: &[f64], trades: &[ClosedTrade]) -> Metrics {
        let initial = equity.first().copied().unwrap_or(1000.0);
        Metrics::from_parts(&make_equity_curve(equity), trades, initial, 0.0)
    }

    #[test]
    fn empty_portfolio() {
        let m = Metrics::compute(&Portfolio::new(1000.0), 0.05);
        assert_eq!(m.total_return, 0.0);
        assert_eq!(m.trades_won + m.trades_lost + m.trades_breakeven, 0);
        assert_eq!(m.profit_factor, 0.0);
    }

    #[test]
    fn total_return_sign() {
        assert!((metrics(&[1000.0, 1100.0], &[]).total_return - 0.10).abs() < 1e-9);
        assert!((metrics(&[1000.0, 900.0], &[]).total_return + 0.10).abs() < 1e-9);
    }

    #[test]
    fn flat_year_has_zero_annualized_return() {
        let m = metrics(&[1000.0; 252], &[]);
        assert!(m.annualized_return.abs() < 1e-12);
        assert_eq!(m.sharpe_ratio, 0.0);
    }

    #[test]
    fn trade_statistics() {
        let trades = vec![
            make_trade("A", 100.0, 5),
            make_trade("B", -60.0, 3),
            make_trade("C", 200.0, 10),
            make_trade("D", -40.0, 2),
            make_trade("E", 0.0, 0),
        ];
        let m = metrics(&[1000.0, 1200.0], &trades);

        assert_eq!(m.trades_won, 2);
        assert_eq!(m.trades_lost, 2);
        assert_eq!(m.trades_breakeven, 1);
        assert!((m.win_rate - 0.4).abs() < 1e-12);
        assert!((m.profit_factor - 3.0).abs() < 1e-12);
        assert!((m.avg_win - 150.0).abs() < 1e-12);
        assert!((m.avg_loss - 50.0).abs() < 1e-12);
        assert!((m.largest_win - 200.0).abs() < 1e-12);
        assert!((m.largest_loss - 60.0).abs() < 1e-12);
        assert!((m.avg_trade_duration - 4.0).abs() < 1e-12);
    }

    #[test]
    fn all_winners_profit_factor_is_infinite() {
        let m = metrics(&[1000.0, 1010.0], &[make_trade("A", 10.0, 1)]);
        assert!(m.profit_factor.is_infinite());
    }

    #[test]
    fn max_drawdown_depth_and_duration() {
        let dd = Drawdown::of(&make_equity_curve(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]));
        assert!((dd.depth - 30.0 / 110.0).abs() < 1e-9);
        assert_eq!(dd.duration, 4);

        let dd = Drawdown::of(&make_equity_curve(&[100.0, 110.0, 100.0, 120.0, 119.0]));
        assert_eq!(dd.duration, 1);
    }

    #[test]
    fn steady_growth_has_positive_sharpe() {
        let values: Vec<f64> = (0..253).map(|i| 1000.0 * (1.0 + 0.001 * i as f64)).collect();
        let m = metrics(&values, &[]);
        assert!(m.sharpe_ratio > 0.0);
        // No down days: no downside deviation.
        assert_eq!(m.sortino_ratio, 0.0);
    }

    #[test]
    fn choppy_curve_has_finite_ratios() {
        let (sharpe, sortino) =
            risk_adjusted(&make_equity_curve(&[100.0, 101.0, 100.5, 101.5, 100.0, 102.0]), 0.0);
        assert!(sharpe.is_finite());
        assert!(sortino.is_finite());
        assert!(sortino > 0.0);
    }
}
