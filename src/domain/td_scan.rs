//! TD Sequential setup scanner over the hot-stock list.
//!
//! Only the most recent daily stick is inspected: a completed nine-count on
//! it is a signal.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use std::fmt;

use crate::domain::error::SticklabError;
use crate::domain::indicator::td_sequential::{SETUP_COMPLETE, calculate_td_setup, setup_counts};
use crate::domain::stick::{DAILY, Stick, StickQuery};
use crate::domain::stick_codec::get_sticks;
use crate::ports::data_port::MarketDataPort;

pub const LOOKBACK_DAYS: i64 = 30;
const PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalType {
    Bullish,
    Bearish,
}

impl SignalType {
    pub fn signal_name(&self) -> &'static str {
        match self {
            SignalType::Bullish => "TD Buy Setup 9",
            SignalType::Bearish => "TD Sell Setup 9",
        }
    }
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalType::Bullish => f.write_str("BULLISH"),
            SignalType::Bearish => f.write_str("BEARISH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TdSignal {
    pub symbol: String,
    pub date: NaiveDate,
    pub signal_type: SignalType,
    /// Mid close of the signal stick.
    pub close_price: f64,
    pub bid_close: f64,
    pub ask_close: f64,
    pub volume: f64,
    pub dollar_volume: f64,
}

/// Signals completed on the last of `sticks`.
pub fn find_td_signals(symbol: &str, sticks: &[Stick]) -> Vec<TdSignal> {
    let series = calculate_td_setup(sticks);
    let (Some(last), Some(stick)) = (series.last(), sticks.last()) else {
        return Vec::new();
    };
    let Some((buy, sell)) = setup_counts(last) else {
        return Vec::new();
    };

    let signal = |signal_type| {
        let close_price = stick.mid_close();
        TdSignal {
            symbol: symbol.to_string(),
            date: stick.datetime.date_naive(),
            signal_type,
            close_price,
            bid_close: stick.bid_close,
            ask_close: stick.ask_close,
            volume: stick.volume,
            dollar_volume: close_price * stick.volume,
        }
    };

    let mut signals = Vec::new();
    if buy == SETUP_COMPLETE {
        signals.push(signal(SignalType::Bullish));
    }
    if sell == SETUP_COMPLETE {
        signals.push(signal(SignalType::Bearish));
    }
    signals
}

/// Scan every hot symbol as of `now`, most liquid signals first.
///
/// A symbol whose sticks cannot be loaded is logged and skipped.
pub fn scan(port: &dyn MarketDataPort, now: DateTime<Utc>) -> Result<Vec<TdSignal>, SticklabError> {
    let symbols = port.hot_symbols()?;
    tracing::info!(symbols = symbols.len(), "scanning hot stocks for TD setups");

    let from = now - Duration::days(LOOKBACK_DAYS);
    let mut signals = Vec::new();

    for (i, symbol) in symbols.iter().enumerate() {
        if i % PROGRESS_EVERY == 0 {
            tracing::info!("processing {}/{}: {}", i + 1, symbols.len(), symbol);
        }
        let query = StickQuery::new(symbol.as_str(), DAILY).between(from, now);
        match get_sticks(port.as_stick_port(), &query) {
            Ok(sticks) => signals.extend(find_td_signals(symbol, &sticks)),
            Err(e) => tracing::warn!(symbol = %symbol, error = %e, "skipping symbol"),
        }
    }

    signals.sort_by(|a, b| b.dollar_volume.total_cmp(&a.dollar_volume));
    tracing::info!(signals = signals.len(), "TD scan finished");
    Ok(signals)
}
