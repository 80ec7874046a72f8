//! Data access port traits.
//!
//! Each trait covers one family of tables. Adapters return raw or lightly
//! typed rows; decoding and analysis stay in the domain.

use crate::domain::cot::{CotDateRange, CotReport};
use crate::domain::error::SticklabError;
use crate::domain::iv_rank::IvPoint;
use crate::domain::stick::StickQuery;
use crate::domain::stock_metadata::StockMetadata;
use chrono::NaiveDate;

pub trait StickPort {
    /// Compressed bucket payloads matching the query, newest bucket first.
    fn fetch_compressed(&self, query: &StickQuery) -> Result<Vec<Vec<u8>>, SticklabError>;

    fn list_symbols(&self) -> Result<Vec<String>, SticklabError>;
}

pub trait OptionsPort {
    /// Daily average implied volatility of options whose strike lies within
    /// `moneyness` (fractional distance) of the underlying, ascending by date.
    fn iv_history(&self, symbol: &str, moneyness: f64) -> Result<Vec<IvPoint>, SticklabError>;
}

pub trait CotPort {
    fn cot_reports(
        &self,
        assets: &[String],
        since: NaiveDate,
        limit: Option<usize>,
    ) -> Result<Vec<CotReport>, SticklabError>;

    fn available_assets(&self) -> Result<Vec<String>, SticklabError>;

    fn date_range(&self) -> Result<Option<CotDateRange>, SticklabError>;
}

pub trait SymbolPort {
    fn hot_symbols(&self) -> Result<Vec<String>, SticklabError>;

    fn upsert_metadata(&self, records: &[StockMetadata]) -> Result<(), SticklabError>;
}

/// Everything the command-line tools read from a single database.
pub trait MarketDataPort: StickPort + OptionsPort + CotPort + SymbolPort {
    fn as_stick_port(&self) -> &dyn StickPort;
    fn as_options_port(&self) -> &dyn OptionsPort;
    fn as_cot_port(&self) -> &dyn CotPort;
}

impl<T: StickPort + OptionsPort + CotPort + SymbolPort> MarketDataPort for T {
    fn as_stick_port(&self) -> &dyn StickPort {
        self
    }

    fn as_options_port(&self) -> &dyn OptionsPort {
        self
    }

    fn as_cot_port(&self) -> &dyn CotPort {
        self
    }
}
