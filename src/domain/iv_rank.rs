//! Implied-volatility rank.
//!
//! IV Rank = (current IV - 1y low) / (1y high - 1y low) * 100, where the
//! one-year window is the 365 days ending at the latest data point rather
//! than today, so stale histories still rank against their own year.

use chrono::{Duration, NaiveDate};

use crate::domain::error::SticklabError;
use crate::ports::data_port::OptionsPort;

/// Strikes within 5% of the underlying count as near the money.
pub const DEFAULT_MONEYNESS: f64 = 0.05;

const WINDOW_DAYS: i64 = 365;

/// One day of averaged near-the-money implied volatility.
#[derive(Debug, Clone, PartialEq)]
pub struct IvPoint {
    pub date: NaiveDate,
    pub avg_iv: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IvRank {
    pub symbol: String,
    pub current_iv: f64,
    pub iv_rank: f64,
    pub year_high: f64,
    pub year_low: f64,
    pub data_start: NaiveDate,
    pub data_end: NaiveDate,
    pub total_data_points: usize,
}

pub fn compute_iv_rank(symbol: &str, history: &[IvPoint]) -> Result<IvRank, SticklabError> {
    let mut sorted: Vec<&IvPoint> = history.iter().collect();
    sorted.sort_by_key(|p| p.date);

    let last = sorted.last().ok_or_else(|| SticklabError::NoData {
        symbol: symbol.to_string(),
    })?;
    let current_iv = last.avg_iv;
    let data_end = last.date;
    let window_start = data_end - Duration::days(WINDOW_DAYS);

    let year: Vec<&IvPoint> = sorted
        .iter()
        .copied()
        .filter(|p| p.date >= window_start)
        .collect();

    // The window always holds at least the latest point.
    let year_low = year.iter().map(|p| p.avg_iv).fold(f64::INFINITY, f64::min);
    let year_high = year
        .iter()
        .map(|p| p.avg_iv)
        .fold(f64::NEG_INFINITY, f64::max);
    let data_start = year.first().map(|p| p.date).unwrap_or(data_end);

    let iv_rank = if year_high == year_low {
        0.0
    } else {
        (current_iv - year_low) / (year_high - year_low) * 100.0
    };

    Ok(IvRank {
        symbol: symbol.to_string(),
        current_iv,
        iv_rank,
        year_high,
        year_low,
        data_start,
        data_end,
        total_data_points: year.len(),
    })
}

/// Load the IV history for `symbol` and rank its latest value.
pub fn get_iv_rank(port: &dyn OptionsPort, symbol: &str) -> Result<IvRank, SticklabError> {
    let history = port.iv_history(symbol, DEFAULT_MONEYNESS)?;
    tracing::debug!(symbol, points = history.len(), "loaded IV history");
    compute_iv_rank(symbol, &history)
}
