//! Relative currency strength across timeframes.
//!
//! Every pair return is credited to its base currency and debited from its
//! quote currency, so a strong currency scores positive against the basket.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;

use crate::domain::error::SticklabError;
use crate::domain::stick::{DAILY, FIFTEEN_MINUTES, FOUR_HOURLY, HOURLY, Interval, PriceSide, StickQuery};
use crate::domain::stick_codec::get_sticks;
use crate::ports::data_port::StickPort;

pub const MAJORS: [&str; 8] = ["EUR", "JPY", "GBP", "NZD", "AUD", "CHF", "CAD", "USD"];

/// Open and close of one pair over a timeframe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairMove {
    pub open: f64,
    pub close: f64,
}

impl PairMove {
    pub fn pct_return(&self) -> f64 {
        (self.close - self.open) / self.open
    }
}

/// Scores keyed by timeframe, then currency. Timeframes and currencies keep
/// the order they were requested in.
#[derive(Debug, Clone, PartialEq)]
pub struct StrengthMatrix {
    pub timeframes: Vec<String>,
    pub currencies: Vec<String>,
    /// `scores[t][c]` is the strength of `currencies[c]` on `timeframes[t]`.
    pub scores: Vec<Vec<f64>>,
}

impl StrengthMatrix {
    pub fn get(&self, timeframe: &str, currency: &str) -> Option<f64> {
        let t = self.timeframes.iter().position(|x| x == timeframe)?;
        let c = self.currencies.iter().position(|x| x == currency)?;
        Some(self.scores[t][c])
    }
}

/// Split `EURUSD` into `("EUR", "USD")`. Shorter names are not pairs.
pub fn split_pair(pair: &str) -> Option<(&str, &str)> {
    if pair.len() < 6 || !pair.is_char_boundary(3) {
        return None;
    }
    Some(pair.split_at(3))
}

/// Pair name of an IG epic such as `CS.D.EURUSD.TODAY.IP`.
pub fn pair_from_epic(epic: &str) -> Option<&str> {
    let mut parts = epic.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some("CS"), Some("D"), Some(pair)) if pair.len() == 6 => Some(pair),
        _ => None,
    }
}

pub fn compute_currency_strength(
    feed: &BTreeMap<String, BTreeMap<String, PairMove>>,
    currencies: &[&str],
    timeframes: &[&str],
) -> StrengthMatrix {
    let scores = timeframes
        .iter()
        .map(|tf| {
            let mut row = vec![0.0; currencies.len()];
            let Some(pairs) = feed.get(*tf) else {
                return row;
            };
            for (pair, mv) in pairs {
                let Some((base, quote)) = split_pair(pair) else {
                    continue;
                };
                let b = currencies.iter().position(|c| *c == base);
                let q = currencies.iter().position(|c| *c == quote);
                if let (Some(b), Some(q)) = (b, q) {
                    let ret = mv.pct_return();
                    row[b] += ret;
                    row[q] -= ret;
                }
            }
            row
        })
        .collect();

    StrengthMatrix {
        timeframes: timeframes.iter().map(|s| s.to_string()).collect(),
        currencies: currencies.iter().map(|s| s.to_string()).collect(),
        scores,
    }
}

/// Timeframe labels and the stick interval each one reads.
pub const TIMEFRAMES: [(&str, Interval); 4] = [
    ("M15", FIFTEEN_MINUTES),
    ("H1", HOURLY),
    ("H4", FOUR_HOURLY),
    ("D1", DAILY),
];

/// Mid open to mid close of the latest stick per epic and timeframe.
///
/// Epics that are not currency pairs, or that have no stick within a week of
/// `now`, are left out of that timeframe.
pub fn latest_moves(
    port: &dyn StickPort,
    epics: &[String],
    now: DateTime<Utc>,
) -> Result<BTreeMap<String, BTreeMap<String, PairMove>>, SticklabError> {
    let from = now - Duration::days(7);
    let mut feed: BTreeMap<String, BTreeMap<String, PairMove>> = BTreeMap::new();

    for epic in epics {
        let Some(pair) = pair_from_epic(epic) else {
            tracing::warn!(epic = %epic, "not a currency pair epic, skipping");
            continue;
        };
        for (label, interval) in TIMEFRAMES {
            let query = StickQuery::new(epic.as_str(), interval).between(from, now);
            let sticks = get_sticks(port, &query)?;
            let Some(last) = sticks.last() else {
                continue;
            };
            let open = last.open(PriceSide::Mid);
            if open == 0.0 {
                tracing::warn!(epic = %epic, timeframe = label, "zero mid open, skipping");
                continue;
            }
            feed.entry(label.to_string()).or_default().insert(
                pair.to_string(),
                PairMove {
                    open,
                    close: last.close(PriceSide::Mid),
                },
            );
        }
    }
    Ok(feed)
}
