//! Commitments of Traders (COT) report access.
//!
//! Reports are stored one row per asset per weekly report date. Callers
//! usually ask by category (`fx`, `bonds`, ...) rather than by the long CFTC
//! market names.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::domain::error::SticklabError;
use crate::ports::data_port::CotPort;

const FX: &[&str] = &[
    "CANADIAN DOLLAR - CHICAGO MERCANTILE EXCHANGE",
    "SWISS FRANC - CHICAGO MERCANTILE EXCHANGE",
    "BRITISH POUND - CHICAGO MERCANTILE EXCHANGE",
    "JAPANESE YEN - CHICAGO MERCANTILE EXCHANGE",
    "EURO FX - CHICAGO MERCANTILE EXCHANGE",
    "AUSTRALIAN DOLLAR - CHICAGO MERCANTILE EXCHANGE",
    "EURO FX/BRITISH POUND XRATE - CHICAGO MERCANTILE EXCHANGE",
    "MEXICAN PESO - CHICAGO MERCANTILE EXCHANGE",
    "BRAZILIAN REAL - CHICAGO MERCANTILE EXCHANGE",
    "NZ DOLLAR - CHICAGO MERCANTILE EXCHANGE",
    "SO AFRICAN RAND - CHICAGO MERCANTILE EXCHANGE",
];

const STOCK_INDEX: &[&str] = &[
    "DJIA Consolidated - CHICAGO BOARD OF TRADE",
    "DJIA x $5 - CHICAGO BOARD OF TRADE",
    "S&P 500 Consolidated - CHICAGO MERCANTILE EXCHANGE",
    "E-MINI S&P 500 - CHICAGO MERCANTILE EXCHANGE",
    "NASDAQ-100 Consolidated - CHICAGO MERCANTILE EXCHANGE",
    "NASDAQ MINI - CHICAGO MERCANTILE EXCHANGE",
    "RUSSELL E-MINI - CHICAGO MERCANTILE EXCHANGE",
    "MICRO E-MINI S&P 500 INDEX - CHICAGO MERCANTILE EXCHANGE",
    "MICRO E-MINI NASDAQ-100 INDEX - CHICAGO MERCANTILE EXCHANGE",
    "MICRO E-MINI RUSSELL 2000 INDX - CHICAGO MERCANTILE EXCHANGE",
];

const COMMODITIES: &[&str] = &["CRUDE OIL", "GOLD", "SILVER", "COPPER", "NATURAL GAS"];

const BONDS: &[&str] = &[
    "UST BOND - CHICAGO BOARD OF TRADE",
    "ULTRA UST BOND - CHICAGO BOARD OF TRADE",
    "UST 2Y NOTE - CHICAGO BOARD OF TRADE",
    "UST 10Y NOTE - CHICAGO BOARD OF TRADE",
    "ULTRA UST 10Y - CHICAGO BOARD OF TRADE",
    "UST 5Y NOTE - CHICAGO BOARD OF TRADE",
    "FED FUNDS - CHICAGO BOARD OF TRADE",
];

const CRYPTO: &[&str] = &["BITCOIN", "ETHEREUM"];

pub const CATEGORIES: &[&str] = &["fx", "stock_index", "commodities", "bonds", "crypto"];

/// Long/short positioning of one trader group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TraderPositions {
    pub long: i64,
    pub short: i64,
    pub delta_long: i64,
    pub delta_short: i64,
    pub long_pct: f64,
    pub short_pct: f64,
    pub net: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CotReport {
    pub asset: String,
    pub report_date: NaiveDate,
    pub as_of_date: NaiveDate,
    pub open_interest: i64,
    pub delta_open_interest: i64,
    pub asset_mgr: TraderPositions,
    pub dealer: TraderPositions,
    pub lev_money: TraderPositions,
    pub other_rept: TraderPositions,
    pub ingest_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CotDateRange {
    pub earliest: NaiveDate,
    pub latest: NaiveDate,
    pub total_records: i64,
}

/// Market names for a category. Unknown categories are taken as a single
/// asset name, verbatim.
pub fn assets_for_category(category: &str) -> Vec<String> {
    let assets = match category.to_lowercase().as_str() {
        "fx" => FX,
        "stock_index" => STOCK_INDEX,
        "commodities" => COMMODITIES,
        "bonds" => BONDS,
        "crypto" => CRYPTO,
        _ => return vec![category.to_string()],
    };
    assets.iter().map(|a| a.to_string()).collect()
}

/// Reports for `category` published within `days_back` days of `today`,
/// newest first.
pub fn get_cot_data(
    port: &dyn CotPort,
    category: &str,
    days_back: i64,
    limit: Option<usize>,
    today: NaiveDate,
) -> Result<Vec<CotReport>, SticklabError> {
    let assets = assets_for_category(category);
    let since = today - Duration::days(days_back);
    tracing::debug!(category, assets = assets.len(), %since, "querying COT reports");
    port.cot_reports(&assets, since, limit)
}
