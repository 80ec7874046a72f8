//! Liquidity snapshot per hot stock, kept in `stock_metadata`.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

use crate::domain::error::SticklabError;
use crate::domain::stick::{DAILY, Stick, StickQuery};
use crate::domain::stick_codec::get_sticks;
use crate::ports::data_port::MarketDataPort;

pub const LOOKBACK_DAYS: i64 = 60;
pub const VOLUME_WINDOW: usize = 30;
pub const UPSERT_CHUNK: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataStatus {
    Active,
    Inactive,
}

impl MetadataStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataStatus::Active => "Active",
            MetadataStatus::Inactive => "Inactive",
        }
    }
}

impl fmt::Display for MetadataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StockMetadata {
    pub symbol: String,
    pub status: MetadataStatus,
    pub last_stick_datetime: Option<DateTime<Utc>>,
    pub dollar_volume: f64,
    pub avg_volume_30d: f64,
    pub close_price: f64,
}

impl StockMetadata {
    pub fn inactive(symbol: &str) -> Self {
        StockMetadata {
            symbol: symbol.to_string(),
            status: MetadataStatus::Inactive,
            last_stick_datetime: None,
            dollar_volume: 0.0,
            avg_volume_30d: 0.0,
            close_price: 0.0,
        }
    }
}

/// Metadata from a symbol's recent daily sticks (ascending).
pub fn compute_metadata(symbol: &str, sticks: &[Stick]) -> StockMetadata {
    let Some(last) = sticks.last() else {
        return StockMetadata::inactive(symbol);
    };

    let close_price = last.mid_close();
    let recent = &sticks[sticks.len().saturating_sub(VOLUME_WINDOW)..];
    let avg_volume_30d = recent.iter().map(|s| s.volume).sum::<f64>() / recent.len() as f64;

    StockMetadata {
        symbol: symbol.to_string(),
        status: MetadataStatus::Active,
        last_stick_datetime: Some(last.datetime),
        dollar_volume: close_price * last.volume,
        avg_volume_30d,
        close_price,
    }
}

/// Recompute metadata for every hot symbol and upsert it in chunks.
///
/// A symbol whose sticks cannot be read is recorded as inactive. Returns
/// the number of records written.
pub fn refresh_metadata(
    port: &dyn MarketDataPort,
    now: DateTime<Utc>,
) -> Result<usize, SticklabError> {
    let symbols = port.hot_symbols()?;
    tracing::info!(symbols = symbols.len(), "refreshing stock metadata");

    let from = now - Duration::days(LOOKBACK_DAYS);
    let mut chunk = Vec::with_capacity(UPSERT_CHUNK);
    let mut written = 0;

    for (i, symbol) in symbols.iter().enumerate() {
        let query = StickQuery::new(symbol.as_str(), DAILY).between(from, now);
        let record = match get_sticks(port.as_stick_port(), &query) {
            Ok(sticks) => compute_metadata(symbol, &sticks),
            Err(e) => {
                tracing::warn!(symbol = %symbol, error = %e, "marking symbol inactive");
                StockMetadata::inactive(symbol)
            }
        };
        chunk.push(record);

        if chunk.len() >= UPSERT_CHUNK {
            port.upsert_metadata(&chunk)?;
            written += chunk.len();
            chunk.clear();
            tracing::info!("processed {}/{}", i + 1, symbols.len());
        }
    }

    if !chunk.is_empty() {
        port.upsert_metadata(&chunk)?;
        written += chunk.len();
    }

    tracing::info!(written, "stock metadata refreshed");
    Ok(written)
}
