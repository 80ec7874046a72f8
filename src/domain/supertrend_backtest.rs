//! Supertrend trend-following portfolio backtest.
//!
//! Runs in two passes. [`simulate_symbol`] walks one symbol's daily sticks
//! and produces candidate trades as if capital were unlimited. [`run_portfolio`]
//! then replays every candidate on a calendar-day clock against a shared
//! cash balance, sizing each entry by volatility.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::domain::config_validation::{fraction, non_negative_f64, positive_f64, positive_usize};
use crate::domain::error::SticklabError;
use crate::domain::indicator::adx::{adx_value, calculate_adx};
use crate::domain::indicator::atr::calculate_rolling_atr;
use crate::domain::indicator::ema::calculate_ema;
use crate::domain::indicator::rsi::calculate_rsi;
use crate::domain::indicator::supertrend::{BEARISH, BULLISH, calculate_supertrend, direction};
use crate::domain::metrics::Metrics;
use crate::domain::portfolio::{EquityPoint, Portfolio};
use crate::domain::position::{ClosedTrade, ExitReason, Position};
use crate::domain::stick::{DAILY, PriceSide, Stick, StickQuery};
use crate::domain::stick_codec::get_sticks;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::StickPort;

const SECTION: &str = "supertrend";
const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, PartialEq)]
pub struct SupertrendConfig {
    pub period: usize,
    pub multiplier: f64,
    pub ema_span: usize,
    pub rsi_period: usize,
    pub adx_period: usize,
    pub warmup_bars: usize,
    pub min_avg_volume: f64,
    pub adx_threshold: f64,
    pub rsi_ceiling: f64,
    /// Stop distance in multiples of the rolling ATR.
    pub stop_atr_multiple: f64,
    pub risk_per_trade: f64,
    pub max_position_pct: f64,
    pub initial_balance: f64,
    pub risk_free_rate: f64,
}

impl Default for SupertrendConfig {
    fn default() -> Self {
        Self {
            period: 10,
            multiplier: 3.0,
            ema_span: 200,
            rsi_period: 14,
            adx_period: 14,
            warmup_bars: 200,
            min_avg_volume: 10_000.0,
            adx_threshold: 25.0,
            rsi_ceiling: 70.0,
            stop_atr_multiple: 3.0,
            risk_per_trade: 0.01,
            max_position_pct: 0.20,
            initial_balance: 1000.0,
            risk_free_rate: 0.0,
        }
    }
}

impl SupertrendConfig {
    /// Read the `[supertrend]` section, defaulting absent keys.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SticklabError> {
        let d = Self::default();
        Ok(Self {
            period: positive_usize(config, SECTION, "period", d.period)?,
            multiplier: positive_f64(config, SECTION, "multiplier", d.multiplier)?,
            ema_span: positive_usize(config, SECTION, "ema_span", d.ema_span)?,
            rsi_period: positive_usize(config, SECTION, "rsi_period", d.rsi_period)?,
            adx_period: positive_usize(config, SECTION, "adx_period", d.adx_period)?,
            warmup_bars: positive_usize(config, SECTION, "warmup_bars", d.warmup_bars)?,
            min_avg_volume: non_negative_f64(config, SECTION, "min_avg_volume", d.min_avg_volume)?,
            adx_threshold: non_negative_f64(config, SECTION, "adx_threshold", d.adx_threshold)?,
            rsi_ceiling: positive_f64(config, SECTION, "rsi_ceiling", d.rsi_ceiling)?,
            stop_atr_multiple: positive_f64(
                config,
                SECTION,
                "stop_atr_multiple",
                d.stop_atr_multiple,
            )?,
            risk_per_trade: fraction(config, SECTION, "risk_per_trade", d.risk_per_trade)?,
            max_position_pct: fraction(config, SECTION, "max_position_pct", d.max_position_pct)?,
            initial_balance: positive_f64(config, SECTION, "initial_balance", d.initial_balance)?,
            risk_free_rate: non_negative_f64(config, SECTION, "risk_free_rate", d.risk_free_rate)?,
        })
    }

    /// Sticks are fetched from twice the warmup length, in calendar days,
    /// before the simulation start.
    pub fn fetch_start(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        start - Duration::days(self.warmup_bars as i64 * 2)
    }
}

/// A trade found by the single-symbol pass, before capital is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateTrade {
    pub symbol: String,
    pub entry_date: DateTime<Utc>,
    pub exit_date: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub reason: ExitReason,
    pub initial_stop_dist: f64,
}

struct OpenCandidate {
    entry_date: DateTime<Utc>,
    entry_price: f64,
    stop_loss: f64,
    initial_stop_dist: f64,
}

impl OpenCandidate {
    fn close(
        self,
        symbol: &str,
        exit_date: DateTime<Utc>,
        exit_price: f64,
        reason: ExitReason,
    ) -> CandidateTrade {
        let pnl = exit_price - self.entry_price;
        CandidateTrade {
            symbol: symbol.to_string(),
            entry_date: self.entry_date,
            exit_date,
            entry_price: self.entry_price,
            exit_price,
            pnl,
            pnl_pct: pnl / self.entry_price * 100.0,
            reason,
            initial_stop_dist: self.initial_stop_dist,
        }
    }
}

/// Walk `sticks` (ascending, daily) from `sim_start` and collect trades.
///
/// Symbols with fewer than `warmup_bars` sticks or a mean volume below
/// `min_avg_volume` yield nothing.
pub fn simulate_symbol(
    symbol: &str,
    sticks: &[Stick],
    sim_start: DateTime<Utc>,
    config: &SupertrendConfig,
) -> Vec<CandidateTrade> {
    if sticks.len() < config.warmup_bars {
        tracing::debug!(symbol, sticks = sticks.len(), "not enough history, skipping");
        return Vec::new();
    }
    let mean_volume = sticks.iter().map(|s| s.volume).sum::<f64>() / sticks.len() as f64;
    if mean_volume < config.min_avg_volume {
        tracing::debug!(symbol, mean_volume, "volume filter rejected symbol");
        return Vec::new();
    }

    let side = PriceSide::Ask;
    let trend = calculate_supertrend(sticks, config.period, config.multiplier, side);
    let ema = calculate_ema(sticks, config.ema_span, side);
    let rsi = calculate_rsi(sticks, config.rsi_period, side);
    let adx = calculate_adx(sticks, config.adx_period, side);
    let atr = calculate_rolling_atr(sticks, config.adx_period, side);

    let Some(first) = sticks.iter().position(|s| s.datetime >= sim_start) else {
        return Vec::new();
    };

    let mut trades = Vec::new();
    let mut open: Option<OpenCandidate> = None;

    // Each bar compares against its predecessor, so the walk starts at 1.
    for i in first.max(1)..sticks.len() {
        let stick = &sticks[i];
        let price = stick.ask_close;
        let (Some(atr), Some(adx)) = (atr.values[i].simple(), adx_value(&adx.values[i])) else {
            continue;
        };
        if price <= 0.0 || price.is_nan() {
            continue;
        }

        let prev_dir = direction(&trend.values[i - 1]);
        let curr_dir = direction(&trend.values[i]);
        let flipped_bullish = prev_dir == Some(BEARISH) && curr_dir == Some(BULLISH);
        let flipped_bearish = prev_dir == Some(BULLISH) && curr_dir == Some(BEARISH);

        match open.as_mut() {
            None => {
                let uptrend = ema.values[i].simple().is_some_and(|e| price > e);
                let not_overbought = rsi.values[i]
                    .simple()
                    .is_some_and(|r| r < config.rsi_ceiling);
                let strong = adx > config.adx_threshold;

                if flipped_bullish && uptrend && not_overbought && strong {
                    let stop_dist = config.stop_atr_multiple * atr;
                    open = Some(OpenCandidate {
                        entry_date: stick.datetime,
                        entry_price: price,
                        stop_loss: price - stop_dist,
                        initial_stop_dist: stop_dist,
                    });
                }
            }
            Some(position) => {
                let trailing = price - config.stop_atr_multiple * atr;
                if trailing > position.stop_loss {
                    position.stop_loss = trailing;
                }

                let exit = if price <= position.stop_loss {
                    Some(ExitReason::StopLoss)
                } else if flipped_bearish {
                    Some(ExitReason::SupertrendBearish)
                } else {
                    None
                };
                if let Some(reason) = exit {
                    if let Some(position) = open.take() {
                        trades.push(position.close(symbol, stick.datetime, price, reason));
                    }
                }
            }
        }
    }

    if let (Some(position), Some(last)) = (open, sticks.last()) {
        trades.push(position.close(
            symbol,
            last.datetime,
            last.ask_close,
            ExitReason::EndOfBacktest,
        ));
    }

    trades
}

#[derive(Debug, Clone)]
pub struct PortfolioRun {
    pub trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: Metrics,
    pub initial_balance: f64,
    pub final_equity: f64,
}

/// Replay `candidates` day by day up to `end` with shared capital.
///
/// Each day settles exits dated on or before it, then takes the entries
/// dated that day, then records cash plus open cost basis as equity.
pub fn run_portfolio(
    mut candidates: Vec<CandidateTrade>,
    end: DateTime<Utc>,
    config: &SupertrendConfig,
) -> PortfolioRun {
    candidates.sort_by_key(|c| c.entry_date);

    let mut portfolio = Portfolio::new(config.initial_balance);
    let mut holding: Vec<CandidateTrade> = Vec::new();
    let end_day = end.date_naive();

    if let Some(first) = candidates.first() {
        let mut today: NaiveDate = first.entry_date.date_naive();
        let mut next = 0;

        while today <= end_day {
            let (due, still_open): (Vec<_>, Vec<_>) = holding
                .drain(..)
                .partition(|c| c.exit_date.date_naive() <= today);
            holding = still_open;
            for trade in due {
                portfolio.close(&trade.symbol, trade.exit_price, trade.exit_date, trade.reason);
            }

            while let Some(candidate) = candidates.get(next) {
                let entry_day = candidate.entry_date.date_naive();
                if entry_day > today {
                    break;
                }
                if entry_day == today && try_enter(&mut portfolio, candidate, config) {
                    holding.push(candidate.clone());
                }
                next += 1;
            }

            portfolio.record_equity(today, portfolio.equity_at_cost());
            let Some(tomorrow) = today.succ_opt() else {
                break;
            };
            today = tomorrow;
        }
    }

    tracing::info!(
        candidates = candidates.len(),
        taken = portfolio.closed_trades.len() + portfolio.position_count(),
        "portfolio simulation finished"
    );

    let metrics = Metrics::compute(&portfolio, config.risk_free_rate);
    let final_equity = portfolio
        .equity_curve
        .last()
        .map_or(portfolio.cash, |p| p.equity);

    PortfolioRun {
        trades: portfolio.closed_trades,
        equity_curve: portfolio.equity_curve,
        metrics,
        initial_balance: config.initial_balance,
        final_equity,
    }
}

/// Size by risk, cap by position value, and buy if cash allows.
fn try_enter(portfolio: &mut Portfolio, candidate: &CandidateTrade, config: &SupertrendConfig) -> bool {
    if candidate.initial_stop_dist <= 0.0 || candidate.entry_price <= 0.0 {
        return false;
    }
    let equity = portfolio.equity_at_cost();
    let by_risk = config.risk_per_trade * equity / candidate.initial_stop_dist;
    let by_cap = config.max_position_pct * equity / candidate.entry_price;

    portfolio.open(Position {
        symbol: candidate.symbol.clone(),
        shares: by_risk.min(by_cap),
        entry_price: candidate.entry_price,
        entry_date: candidate.entry_date,
    })
}

/// Fetch, simulate and replay `symbols` between `start` and `end`.
///
/// Symbols that fail to load are logged and skipped.
pub fn run_backtest(
    port: &dyn StickPort,
    symbols: &[String],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    config: &SupertrendConfig,
) -> Result<PortfolioRun, SticklabError> {
    tracing::info!(symbols = symbols.len(), "collecting candidate trades");
    let fetch_from = config.fetch_start(start);

    let mut candidates = Vec::new();
    for (idx, symbol) in symbols.iter().enumerate() {
        if idx % PROGRESS_EVERY == 0 {
            tracing::info!("scanning symbol {}/{}", idx, symbols.len());
        }
        let query = StickQuery::new(symbol.as_str(), DAILY).between(fetch_from, end);
        match get_sticks(port, &query) {
            Ok(sticks) => candidates.extend(simulate_symbol(symbol, &sticks, start, config)),
            Err(e) => tracing::warn!(symbol = %symbol, error = %e, "skipping symbol"),
        }
    }

    tracing::info!(candidates = candidates.len(), "starting portfolio simulation");
    Ok(run_portfolio(candidates, end, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use chrono::TimeZone;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn make_sticks(closes: &[f64]) -> Vec<Stick> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| {
                let datetime = day(i as i64);
                Stick {
                    datetime,
                    epoch_utc_ms: datetime.timestamp_millis(),
                    ask_open: close,
                    ask_high: close + 1.0,
                    ask_low: close - 1.0,
                    ask_close: close,
                    bid_open: close - 0.1,
                    bid_high: close + 0.9,
                    bid_low: close - 1.1,
                    bid_close: close - 0.1,
                    volume: 20_000.0,
                }
            })
            .collect()
    }

    /// 40 sticks falling by 1, then `rise` sticks climbing by 3.
    fn v_shape(rise: usize) -> Vec<f64> {
        let mut closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        let bottom = closes[39];
        closes.extend((1..=rise).map(|i| bottom + 3.0 * i as f64));
        closes
    }

    fn test_config() -> SupertrendConfig {
        SupertrendConfig {
            ema_span: 5,
            warmup_bars: 20,
            ..SupertrendConfig::default()
        }
    }

    fn candidate(symbol: &str, entry: i64, exit: i64, prices: (f64, f64), stop: f64) -> CandidateTrade {
        let (entry_price, exit_price) = prices;
        CandidateTrade {
            symbol: symbol.into(),
            entry_date: day(entry),
            exit_date: day(exit),
            entry_price,
            exit_price,
            pnl: exit_price - entry_price,
            pnl_pct: (exit_price - entry_price) / entry_price * 100.0,
            reason: ExitReason::SupertrendBearish,
            initial_stop_dist: stop,
        }
    }

    #[test]
    fn default_config_values() {
        let c = SupertrendConfig::default();
        assert_eq!(c.period, 10);
        assert_eq!(c.ema_span, 200);
        assert_eq!(c.warmup_bars, 200);
        assert!((c.risk_per_trade - 0.01).abs() < f64::EPSILON);
        assert!((c.max_position_pct - 0.20).abs() < f64::EPSILON);
        assert_eq!(c.fetch_start(day(400)), day(0));
    }

    #[test]
    fn config_section_overrides_defaults() {
        let ini = FileConfigAdapter::from_string(
            "[supertrend]\nperiod = 7\nmultiplier = 2.5\ninitial_balance = 5000\n",
        )
        .unwrap();
        let c = SupertrendConfig::from_config(&ini).unwrap();
        assert_eq!(c.period, 7);
        assert!((c.multiplier - 2.5).abs() < f64::EPSILON);
        assert!((c.initial_balance - 5000.0).abs() < f64::EPSILON);
        assert_eq!(c.adx_period, 14);
    }

    #[test]
    fn config_rejects_bad_risk() {
        let ini = FileConfigAdapter::from_string("[supertrend]\nrisk_per_trade = 2\n").unwrap();
        let err = SupertrendConfig::from_config(&ini).unwrap_err();
        assert!(matches!(err, SticklabError::ConfigInvalid { key, .. } if key == "risk_per_trade"));
    }

    #[test]
    fn short_history_is_skipped() {
        let sticks = make_sticks(&v_shape(5)[..10]);
        assert!(simulate_symbol("AAA", &sticks, day(0), &test_config()).is_empty());
    }

    #[test]
    fn low_volume_is_skipped() {
        let mut sticks = make_sticks(&v_shape(20));
        for s in &mut sticks {
            s.volume = 500.0;
        }
        assert!(simulate_symbol("AAA", &sticks, day(0), &test_config()).is_empty());
    }

    #[test]
    fn reversal_enters_and_holds_to_end() {
        let closes = v_shape(20);
        let sticks = make_sticks(&closes);
        let trades = simulate_symbol("AAA", &sticks, day(0), &test_config());

        assert_eq!(trades.len(), 1, "{trades:?}");
        let trade = &trades[0];
        assert!(trade.entry_date > day(39));
        assert!(trade.entry_price > closes[39]);
        assert!(trade.initial_stop_dist > 0.0);
        assert_eq!(trade.reason, ExitReason::EndOfBacktest);
        assert_eq!(trade.exit_date, sticks.last().unwrap().datetime);
        assert!(trade.pnl > 0.0);
    }

    #[test]
    fn crash_after_entry_hits_stop() {
        let mut closes = v_shape(10);
        let top = *closes.last().unwrap();
        closes.push(top - 20.0);
        closes.extend((1..=5).map(|i| top - 20.0 - i as f64));
        let sticks = make_sticks(&closes);

        let trades = simulate_symbol("AAA", &sticks, day(0), &test_config());
        assert_eq!(trades.len(), 1, "{trades:?}");
        assert_eq!(trades[0].reason, ExitReason::StopLoss);
        assert_eq!(trades[0].exit_date, day(50));
    }

    #[test]
    fn sim_start_after_data_yields_nothing() {
        let sticks = make_sticks(&v_shape(20));
        assert!(simulate_symbol("AAA", &sticks, day(365), &test_config()).is_empty());
    }

    #[test]
    fn portfolio_sizes_and_settles() {
        let config = SupertrendConfig::default();
        let candidates = vec![
            candidate("AAA", 0, 4, (10.0, 12.0), 1.0),
            candidate("BBB", 2, 3, (50.0, 45.0), 0.5),
        ];

        let run = run_portfolio(candidates, day(5), &config);

        // AAA: min(10/1, 200/10) = 10 shares ; BBB: min(10/0.5, 200/50) = 4 shares
        assert_eq!(run.trades.len(), 2);
        let bbb = run.trades.iter().find(|t| t.symbol == "BBB").unwrap();
        assert!((bbb.shares - 4.0).abs() < 1e-9);
        assert!((bbb.pnl + 20.0).abs() < 1e-9);
        let aaa = run.trades.iter().find(|t| t.symbol == "AAA").unwrap();
        assert!((aaa.shares - 10.0).abs() < 1e-9);
        assert!((aaa.pnl - 20.0).abs() < 1e-9);

        let equity: Vec<f64> = run.equity_curve.iter().map(|p| p.equity).collect();
        let expected = [1000.0, 1000.0, 1000.0, 980.0, 1000.0, 1000.0];
        assert_eq!(equity.len(), expected.len());
        for (got, want) in equity.iter().zip(expected) {
            assert!((got - want).abs() < 1e-9, "{equity:?}");
        }
        assert!((run.final_equity - 1000.0).abs() < 1e-9);
        assert_eq!(run.metrics.trades_won, 1);
        assert_eq!(run.metrics.trades_lost, 1);
    }

    #[test]
    fn portfolio_skips_zero_stop_distance() {
        let run = run_portfolio(
            vec![candidate("AAA", 0, 2, (10.0, 12.0), 0.0)],
            day(3),
            &SupertrendConfig::default(),
        );
        assert!(run.trades.is_empty());
        assert_eq!(run.equity_curve.len(), 4);
    }

    #[test]
    fn portfolio_without_candidates_is_empty() {
        let run = run_portfolio(Vec::new(), day(10), &SupertrendConfig::default());
        assert!(run.trades.is_empty());
        assert!(run.equity_curve.is_empty());
        assert!((run.final_equity - 1000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn open_position_at_end_is_not_booked() {
        let run = run_portfolio(
            vec![candidate("AAA", 0, 30, (10.0, 12.0), 1.0)],
            day(5),
            &SupertrendConfig::default(),
        );
        assert!(run.trades.is_empty());
        assert!((run.final_equity - 1000.0).abs() < 1e-9);
    }
}
