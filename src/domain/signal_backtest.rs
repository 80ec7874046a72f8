//! Fixed-horizon backtest of externally generated buy signals.
//!
//! Signals arrive as chart images named `<score>-<SYMBOL>.jpg`. Every signal
//! buys a fixed notional at the first stick's ask close and is checked daily
//! at the bid close against a take-profit and a stop-loss; otherwise it is
//! sold at the end of the holding horizon.

use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;

use crate::domain::config_validation::{positive_f64, positive_usize};
use crate::domain::error::SticklabError;
use crate::domain::position::ExitReason;
use crate::domain::stick::{DAILY, Stick, StickQuery};
use crate::domain::stick_codec::get_sticks;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::StickPort;

const SECTION: &str = "signal_backtest";
const PROGRESS_EVERY: usize = 10;

static SIGNAL_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)-(.+)\.jpg$").expect("signal file pattern compiles"));

#[derive(Debug, Clone, PartialEq)]
pub struct SignalBacktestConfig {
    /// Percent gain that closes the trade.
    pub take_profit_pct: f64,
    /// Percent loss that closes the trade.
    pub stop_loss_pct: f64,
    pub horizon_days: usize,
    pub notional: f64,
}

impl Default for SignalBacktestConfig {
    fn default() -> Self {
        Self {
            take_profit_pct: 7.5,
            stop_loss_pct: 5.0,
            horizon_days: 14,
            notional: 1000.0,
        }
    }
}

impl SignalBacktestConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, SticklabError> {
        let d = Self::default();
        Ok(Self {
            take_profit_pct: positive_f64(config, SECTION, "take_profit_pct", d.take_profit_pct)?,
            stop_loss_pct: percent_below_100(config, "stop_loss_pct", d.stop_loss_pct)?,
            horizon_days: positive_usize(config, SECTION, "horizon_days", d.horizon_days)?,
            notional: positive_f64(config, SECTION, "notional", d.notional)?,
        })
    }
}

/// A loss of 100% or more can never trigger.
fn percent_below_100(
    config: &dyn ConfigPort,
    key: &str,
    default: f64,
) -> Result<f64, SticklabError> {
    let value = positive_f64(config, SECTION, key, default)?;
    if value >= 100.0 {
        return Err(SticklabError::ConfigInvalid {
            section: SECTION.to_string(),
            key: key.to_string(),
            reason: format!("{key} must be below 100, got {value}"),
        });
    }
    Ok(value)
}

/// `"70-AC.D.2800HK.DAILY.IP.jpg"` → `Some("AC.D.2800HK.DAILY.IP")`
pub fn extract_symbol_from_filename(filename: &str) -> Option<String> {
    SIGNAL_FILE
        .captures(filename)
        .and_then(|c| c.get(2))
        .map(|m| m.as_str().to_string())
        .filter(|s| !s.is_empty())
}

/// Symbols of every signal file in `dir`, sorted.
pub fn symbols_from_dir(dir: &Path) -> Result<Vec<String>, SticklabError> {
    let mut symbols = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if let Some(symbol) = entry
            .file_name()
            .to_str()
            .and_then(extract_symbol_from_filename)
        {
            symbols.push(symbol);
        }
    }
    symbols.sort();
    tracing::info!(dir = %dir.display(), signals = symbols.len(), "found signal files");
    Ok(symbols)
}

/// Which side of the book a fill was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Ask,
    Bid,
    AskFallback,
    BidFallback,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Ask => "ask",
            PriceSource::Bid => "bid",
            PriceSource::AskFallback => "ask_fallback",
            PriceSource::BidFallback => "bid_fallback",
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, PriceSource::AskFallback | PriceSource::BidFallback)
    }
}

fn entry_fill(stick: &Stick) -> Option<(f64, PriceSource)> {
    if stick.ask_close != 0.0 {
        Some((stick.ask_close, PriceSource::Ask))
    } else if stick.bid_close != 0.0 {
        Some((stick.bid_close, PriceSource::BidFallback))
    } else {
        None
    }
}

fn exit_fill(stick: &Stick) -> Option<(f64, PriceSource)> {
    if stick.bid_close != 0.0 {
        Some((stick.bid_close, PriceSource::Bid))
    } else if stick.ask_close != 0.0 {
        Some((stick.ask_close, PriceSource::AskFallback))
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalTrade {
    pub entry_date: DateTime<Utc>,
    pub exit_date: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_source: PriceSource,
    pub exit_source: PriceSource,
    pub position_size: f64,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub days_held: i64,
    pub exit_reason: ExitReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalOutcome {
    Success(SignalTrade),
    NoData,
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalTradeResult {
    pub symbol: String,
    pub outcome: SignalOutcome,
}

impl SignalTradeResult {
    pub fn trade(&self) -> Option<&SignalTrade> {
        match &self.outcome {
            SignalOutcome::Success(trade) => Some(trade),
            _ => None,
        }
    }

    pub fn status(&self) -> &'static str {
        match self.outcome {
            SignalOutcome::Success(_) => "SUCCESS",
            SignalOutcome::NoData => "NO_DATA",
            SignalOutcome::Error(_) => "ERROR",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            SignalOutcome::Error(reason) => Some(reason),
            SignalOutcome::NoData => Some("no data available for the specified date range"),
            SignalOutcome::Success(_) => None,
        }
    }
}

/// Simulate one signal over `sticks` (ascending daily sticks from the
/// signal date).
pub fn simulate_trade(
    symbol: &str,
    sticks: &[Stick],
    config: &SignalBacktestConfig,
) -> SignalTradeResult {
    let outcome = match simulate(sticks, config) {
        Ok(Some(trade)) => SignalOutcome::Success(trade),
        Ok(None) => SignalOutcome::NoData,
        Err(reason) => SignalOutcome::Error(reason),
    };
    SignalTradeResult {
        symbol: symbol.to_string(),
        outcome,
    }
}

fn simulate(sticks: &[Stick], config: &SignalBacktestConfig) -> Result<Option<SignalTrade>, String> {
    let Some(entry) = sticks.first() else {
        return Ok(None);
    };
    let (entry_price, entry_source) =
        entry_fill(entry).ok_or("both ask and bid prices are zero at entry")?;
    let position_size = config.notional / entry_price;
    // Early exits are checked on every fetched stick; the horizon only
    // picks the time-limit exit.
    let horizon = config.horizon_days.clamp(1, sticks.len());

    let mut exit: Option<(&Stick, ExitReason)> = None;
    for stick in &sticks[1..] {
        let Some((price, _)) = exit_fill(stick) else {
            continue;
        };
        let change_pct = (price - entry_price) / entry_price * 100.0;
        if change_pct >= config.take_profit_pct {
            exit = Some((stick, ExitReason::TakeProfit));
            break;
        }
        if change_pct <= -config.stop_loss_pct {
            exit = Some((stick, ExitReason::StopLoss));
            break;
        }
    }

    let (exit_stick, exit_reason) = exit.unwrap_or((&sticks[horizon - 1], ExitReason::TimeLimit));
    let (exit_price, exit_source) =
        exit_fill(exit_stick).ok_or("both bid and ask prices are zero at exit")?;

    let pnl = (exit_price - entry_price) * position_size;
    Ok(Some(SignalTrade {
        entry_date: entry.datetime,
        exit_date: exit_stick.datetime,
        entry_price,
        exit_price,
        entry_source,
        exit_source,
        position_size,
        pnl,
        pnl_pct: pnl / config.notional * 100.0,
        days_held: (exit_stick.datetime - entry.datetime).num_days(),
        exit_reason,
    }))
}

/// Run every symbol from `start` over the holding horizon.
pub fn run_signal_backtest(
    port: &dyn StickPort,
    symbols: &[String],
    start: DateTime<Utc>,
    config: &SignalBacktestConfig,
) -> Vec<SignalTradeResult> {
    let end = start + Duration::days(config.horizon_days as i64);
    tracing::info!(
        from = %start.date_naive(),
        to = %end.date_naive(),
        take_profit = config.take_profit_pct,
        stop_loss = config.stop_loss_pct,
        "starting signal backtest"
    );

    let mut results = Vec::with_capacity(symbols.len());
    for (i, symbol) in symbols.iter().enumerate() {
        if i % PROGRESS_EVERY == 0 {
            tracing::info!("processing symbol {}/{}: {}", i + 1, symbols.len(), symbol);
        }
        let query = StickQuery::new(symbol.as_str(), DAILY).between(start, end);
        let result = match get_sticks(port, &query) {
            Ok(sticks) => simulate_trade(symbol, &sticks, config),
            Err(e) => SignalTradeResult {
                symbol: symbol.clone(),
                outcome: SignalOutcome::Error(e.to_string()),
            },
        };
        if let SignalOutcome::Error(reason) = &result.outcome {
            tracing::warn!(symbol = %symbol, %reason, "signal trade failed");
        }
        results.push(result);
    }
    results
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeExtreme {
    pub symbol: String,
    pub pnl: f64,
    pub pnl_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SignalSummary {
    pub total_trades: usize,
    pub successful_trades: usize,
    pub failed_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Percent of successful trades that won.
    pub win_rate: f64,
    pub avg_pnl: f64,
    pub avg_pnl_pct: f64,
    pub median_pnl_pct: f64,
    /// Sample standard deviation; 0 with fewer than two trades.
    pub std_pnl_pct: f64,
    pub total_pnl: f64,
    pub best_trade: Option<TradeExtreme>,
    pub worst_trade: Option<TradeExtreme>,
    pub entry_fallbacks: usize,
    pub exit_fallbacks: usize,
    pub take_profit_exits: usize,
    pub stop_loss_exits: usize,
    pub time_limit_exits: usize,
}

impl SignalSummary {
    pub fn from_results(results: &[SignalTradeResult]) -> Self {
        let trades: Vec<(&str, &SignalTrade)> = results
            .iter()
            .filter_map(|r| r.trade().map(|t| (r.symbol.as_str(), t)))
            .collect();

        let mut summary = SignalSummary {
            total_trades: results.len(),
            successful_trades: trades.len(),
            failed_trades: results.len() - trades.len(),
            ..Default::default()
        };
        if trades.is_empty() {
            return summary;
        }

        let n = trades.len() as f64;
        let mut pcts: Vec<f64> = trades.iter().map(|(_, t)| t.pnl_pct).collect();

        summary.winning_trades = trades.iter().filter(|(_, t)| t.pnl > 0.0).count();
        summary.losing_trades = trades.iter().filter(|(_, t)| t.pnl < 0.0).count();
        summary.win_rate = summary.winning_trades as f64 / n * 100.0;
        summary.total_pnl = trades.iter().map(|(_, t)| t.pnl).sum();
        summary.avg_pnl = summary.total_pnl / n;
        summary.avg_pnl_pct = pcts.iter().sum::<f64>() / n;
        summary.std_pnl_pct = sample_std(&pcts, summary.avg_pnl_pct);
        summary.median_pnl_pct = median(&mut pcts);

        let extreme = |(symbol, t): &(&str, &SignalTrade)| TradeExtreme {
            symbol: symbol.to_string(),
            pnl: t.pnl,
            pnl_pct: t.pnl_pct,
        };
        summary.best_trade = trades
            .iter()
            .max_by(|a, b| a.1.pnl.total_cmp(&b.1.pnl))
            .map(extreme);
        summary.worst_trade = trades
            .iter()
            .min_by(|a, b| a.1.pnl.total_cmp(&b.1.pnl))
            .map(extreme);

        for (_, t) in &trades {
            summary.entry_fallbacks += usize::from(t.entry_source.is_fallback());
            summary.exit_fallbacks += usize::from(t.exit_source.is_fallback());
            match t.exit_reason {
                ExitReason::TakeProfit => summary.take_profit_exits += 1,
                ExitReason::StopLoss => summary.stop_loss_exits += 1,
                _ => summary.time_limit_exits += 1,
            }
        }
        summary
    }
}

fn sample_std(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

fn median(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn make_sticks(asks: &[f64], bids: &[f64]) -> Vec<Stick> {
        let start = Utc.with_ymd_and_hms(2025, 6, 13, 0, 0, 0).unwrap();
        asks.iter()
            .zip(bids)
            .enumerate()
            .map(|(i, (&ask, &bid))| {
                let datetime = start + Duration::days(i as i64);
                Stick {
                    datetime,
                    epoch_utc_ms: datetime.timestamp_millis(),
                    ask_open: ask,
                    ask_high: ask,
                    ask_low: ask,
                    ask_close: ask,
                    bid_open: bid,
                    bid_high: bid,
                    bid_low: bid,
                    bid_close: bid,
                    volume: 1000.0,
                }
            })
            .collect()
    }

    fn success(result: &SignalTradeResult) -> &SignalTrade {
        result.trade().unwrap_or_else(|| panic!("expected success, got {result:?}"))
    }

    #[test]
    fn config_reads_percentages() {
        use crate::adapters::file_config_adapter::FileConfigAdapter;

        let ini = FileConfigAdapter::from_string(
            "[signal_backtest]\ntake_profit_pct = 10\nstop_loss_pct = 2.5\n",
        )
        .unwrap();
        let config = SignalBacktestConfig::from_config(&ini).unwrap();
        assert!((config.take_profit_pct - 10.0).abs() < f64::EPSILON);
        assert!((config.stop_loss_pct - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.horizon_days, 14);

        let ini = FileConfigAdapter::from_string("[signal_backtest]\nstop_loss_pct = 150\n").unwrap();
        assert!(SignalBacktestConfig::from_config(&ini).is_err());
    }

    #[test]
    fn extracts_symbol_from_signal_file() {
        assert_eq!(extract_symbol_from_filename("70-SYM.jpg"), Some("SYM".into()));
        assert_eq!(
            extract_symbol_from_filename("100-AC.D.2800HK.DAILY.IP.jpg"),
            Some("AC.D.2800HK.DAILY.IP".into())
        );
        assert_eq!(extract_symbol_from_filename("7-A-B.jpg"), Some("A-B".into()));
    }

    #[test]
    fn rejects_other_filenames() {
        assert_eq!(extract_symbol_from_filename("70-.jpg"), None);
        assert_eq!(extract_symbol_from_filename("SYM.jpg"), None);
        assert_eq!(extract_symbol_from_filename("x70-SYM.jpg"), None);
        assert_eq!(extract_symbol_from_filename("70-SYM.png"), None);
        assert_eq!(extract_symbol_from_filename("-SYM.jpg"), None);
    }

    #[test]
    fn symbols_from_dir_reads_signal_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["70-MSFT.jpg", "100-AAPL.jpg", "notes.txt", "70-.jpg"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let symbols = symbols_from_dir(dir.path()).unwrap();
        assert_eq!(symbols, vec!["AAPL".to_string(), "MSFT".to_string()]);
    }

    #[test]
    fn symbols_from_missing_dir_is_io_error() {
        let err = symbols_from_dir(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, SticklabError::Io(_)));
    }

    #[test]
    fn take_profit_exit() {
        let sticks = make_sticks(&[100.0, 101.0, 109.0, 90.0], &[99.0, 100.0, 108.0, 89.0]);
        let result = simulate_trade("TP", &sticks, &SignalBacktestConfig::default());
        let trade = success(&result);

        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert!((trade.entry_price - 100.0).abs() < f64::EPSILON);
        assert!((trade.exit_price - 108.0).abs() < f64::EPSILON);
        assert!((trade.position_size - 10.0).abs() < 1e-12);
        assert!((trade.pnl - 80.0).abs() < 1e-9);
        assert!((trade.pnl_pct - 8.0).abs() < 1e-9);
        assert_eq!(trade.days_held, 2);
    }

    #[test]
    fn stop_loss_exit() {
        let sticks = make_sticks(&[100.0, 98.0, 96.0], &[99.0, 97.0, 95.0]);
        let trade = success(&simulate_trade("SL", &sticks, &SignalBacktestConfig::default())).clone();
        assert_eq!(trade.exit_reason, ExitReason::StopLoss);
        assert_eq!(trade.days_held, 2);
        assert!(trade.pnl < 0.0);
    }

    #[test]
    fn time_limit_exits_at_horizon() {
        let asks: Vec<f64> = (0..20).map(|i| 100.0 + 0.1 * i as f64).collect();
        let bids: Vec<f64> = asks.iter().map(|a| a - 0.05).collect();
        let sticks = make_sticks(&asks, &bids);

        let trade = success(&simulate_trade("TL", &sticks, &SignalBacktestConfig::default())).clone();
        assert_eq!(trade.exit_reason, ExitReason::TimeLimit);
        assert_eq!(trade.exit_date, sticks[13].datetime);
        assert_eq!(trade.days_held, 13);
    }

    #[test]
    fn time_limit_uses_last_stick_when_short() {
        let sticks = make_sticks(&[100.0, 101.0, 102.0], &[99.5, 100.5, 101.5]);
        let trade = success(&simulate_trade("TL", &sticks, &SignalBacktestConfig::default())).clone();
        assert_eq!(trade.exit_reason, ExitReason::TimeLimit);
        assert_eq!(trade.exit_date, sticks[2].datetime);
    }

    #[test]
    fn take_profit_past_the_horizon_stick() {
        let mut asks = vec![100.0; 14];
        asks.push(120.0);
        let bids: Vec<f64> = asks.iter().map(|a| a - 0.5).collect();
        let sticks = make_sticks(&asks, &bids);

        let trade = success(&simulate_trade("LATE", &sticks, &SignalBacktestConfig::default())).clone();
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(trade.exit_date, sticks[14].datetime);
        assert!((trade.exit_price - 119.5).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_horizon_exits_on_the_entry_stick() {
        let sticks = make_sticks(&[100.0, 100.5, 101.0], &[99.5, 100.0, 100.5]);
        let config = SignalBacktestConfig {
            horizon_days: 0,
            ..SignalBacktestConfig::default()
        };

        let trade = success(&simulate_trade("ZERO", &sticks, &config)).clone();
        assert_eq!(trade.exit_reason, ExitReason::TimeLimit);
        assert_eq!(trade.exit_date, sticks[0].datetime);
        assert_eq!(trade.days_held, 0);
    }

    #[test]
    fn fallbacks_when_a_side_is_zero() {
        let sticks = make_sticks(&[0.0, 101.0], &[100.0, 0.0]);
        let trade = success(&simulate_trade("FB", &sticks, &SignalBacktestConfig::default())).clone();
        assert_eq!(trade.entry_source, PriceSource::BidFallback);
        assert_eq!(trade.exit_source, PriceSource::AskFallback);
        assert!((trade.exit_price - 101.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_prices_skip_daily_check() {
        let sticks = make_sticks(&[100.0, 0.0, 100.5], &[99.9, 0.0, 100.4]);
        let trade = success(&simulate_trade("Z", &sticks, &SignalBacktestConfig::default())).clone();
        assert_eq!(trade.exit_reason, ExitReason::TimeLimit);
        assert_eq!(trade.exit_date, sticks[2].datetime);
    }

    #[test]
    fn zero_entry_prices_are_an_error() {
        let sticks = make_sticks(&[0.0, 1.0], &[0.0, 1.0]);
        let result = simulate_trade("ERR", &sticks, &SignalBacktestConfig::default());
        assert_eq!(result.status(), "ERROR");
        assert!(result.error().unwrap().contains("entry"));
    }

    #[test]
    fn no_sticks_is_no_data() {
        let result = simulate_trade("NONE", &[], &SignalBacktestConfig::default());
        assert_eq!(result.outcome, SignalOutcome::NoData);
        assert_eq!(result.status(), "NO_DATA");
    }

    #[test]
    fn summary_statistics() {
        let config = SignalBacktestConfig::default();
        let win = make_sticks(&[100.0, 110.0], &[99.0, 109.0]);
        let loss = make_sticks(&[100.0, 90.0], &[99.0, 89.0]);
        let flat = make_sticks(&[0.0, 101.0], &[100.0, 101.0]);
        let results = vec![
            simulate_trade("WIN", &win, &config),
            simulate_trade("LOSS", &loss, &config),
            simulate_trade("FLAT", &flat, &config),
            simulate_trade("NONE", &[], &config),
        ];

        let s = SignalSummary::from_results(&results);
        assert_eq!(s.total_trades, 4);
        assert_eq!(s.successful_trades, 3);
        assert_eq!(s.failed_trades, 1);
        assert_eq!(s.winning_trades, 2);
        assert_eq!(s.losing_trades, 1);
        assert!((s.win_rate - 200.0 / 3.0).abs() < 1e-9);
        // pnl_pct: +9, -11, +1
        assert!((s.total_pnl - (90.0 - 110.0 + 10.0)).abs() < 1e-9);
        assert!((s.avg_pnl_pct - (-1.0 / 3.0)).abs() < 1e-9);
        assert!((s.median_pnl_pct - 1.0).abs() < 1e-9);
        let mean: f64 = -1.0 / 3.0;
        let var = ((9.0 - mean).powi(2) + (-11.0 - mean).powi(2) + (1.0 - mean).powi(2)) / 2.0;
        assert!((s.std_pnl_pct - var.sqrt()).abs() < 1e-9);
        assert_eq!(s.best_trade.as_ref().unwrap().symbol, "WIN");
        assert_eq!(s.worst_trade.as_ref().unwrap().symbol, "LOSS");
        assert_eq!(s.entry_fallbacks, 1);
        assert_eq!(s.exit_fallbacks, 0);
        assert_eq!(s.take_profit_exits, 1);
        assert_eq!(s.stop_loss_exits, 1);
        assert_eq!(s.time_limit_exits, 1);
    }

    #[test]
    fn summary_of_failures_only() {
        let results = vec![simulate_trade("NONE", &[], &SignalBacktestConfig::default())];
        let s = SignalSummary::from_results(&results);
        assert_eq!(s.failed_trades, 1);
        assert_eq!(s.win_rate, 0.0);
        assert!(s.best_trade.is_none());
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert_eq!(median(&mut []), 0.0);
    }
}
