#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use sticklab::domain::cot::{CotDateRange, CotReport, TraderPositions};
use sticklab::domain::error::SticklabError;
use sticklab::domain::iv_rank::IvPoint;
pub use sticklab::domain::stick::Stick;
use sticklab::domain::stick::{Interval, StickQuery};
use sticklab::domain::stick_codec::encode_sticks;
use sticklab::domain::stock_metadata::StockMetadata;
use sticklab::ports::data_port::{CotPort, OptionsPort, StickPort, SymbolPort};
use std::cell::RefCell;
use std::collections::HashMap;

/// In-memory stand-in for a database. Sticks are stored encoded, one bucket
/// per `with_sticks` call, so reads go through the real decoder.
pub struct MockMarketDataPort {
    pub buckets: HashMap<(String, Interval), Vec<Vec<u8>>>,
    pub errors: HashMap<String, String>,
    pub hot: Vec<String>,
    pub iv: HashMap<String, Vec<IvPoint>>,
    pub cot: Vec<CotReport>,
    pub upserts: RefCell<Vec<Vec<StockMetadata>>>,
}

impl MockMarketDataPort {
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            errors: HashMap::new(),
            hot: Vec::new(),
            iv: HashMap::new(),
            cot: Vec::new(),
            upserts: RefCell::new(Vec::new()),
        }
    }

    pub fn with_sticks(mut self, symbol: &str, interval: Interval, sticks: &[Stick]) -> Self {
        let payload = encode_sticks(sticks).unwrap();
        self.buckets
            .entry((symbol.to_string(), interval))
            .or_default()
            .insert(0, payload);
        self
    }

    pub fn with_raw_bucket(mut self, symbol: &str, interval: Interval, bytes: Vec<u8>) -> Self {
        self.buckets
            .entry((symbol.to_string(), interval))
            .or_default()
            .insert(0, bytes);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }

    pub fn with_hot(mut self, symbols: &[&str]) -> Self {
        self.hot = symbols.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_iv(mut self, symbol: &str, points: Vec<IvPoint>) -> Self {
        self.iv.insert(symbol.to_string(), points);
        self
    }

    pub fn with_cot(mut self, report: CotReport) -> Self {
        self.cot.push(report);
        self
    }

    pub fn upserted(&self) -> Vec<StockMetadata> {
        self.upserts.borrow().iter().flatten().cloned().collect()
    }
}

impl StickPort for MockMarketDataPort {
    fn fetch_compressed(&self, query: &StickQuery) -> Result<Vec<Vec<u8>>, SticklabError> {
        if let Some(reason) = self.errors.get(&query.symbol) {
            return Err(SticklabError::DatabaseQuery {
                reason: reason.clone(),
            });
        }
        let buckets = self
            .buckets
            .get(&(query.symbol.clone(), query.interval))
            .cloned()
            .unwrap_or_default();
        Ok(match query.limit {
            Some(n) => buckets.into_iter().take(n).collect(),
            None => buckets,
        })
    }

    fn list_symbols(&self) -> Result<Vec<String>, SticklabError> {
        let mut symbols: Vec<String> = self.buckets.keys().map(|(s, _)| s.clone()).collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }
}

impl OptionsPort for MockMarketDataPort {
    fn iv_history(&self, symbol: &str, _moneyness: f64) -> Result<Vec<IvPoint>, SticklabError> {
        Ok(self.iv.get(symbol).cloned().unwrap_or_default())
    }
}

impl CotPort for MockMarketDataPort {
    fn cot_reports(
        &self,
        assets: &[String],
        since: NaiveDate,
        limit: Option<usize>,
    ) -> Result<Vec<CotReport>, SticklabError> {
        let mut reports: Vec<CotReport> = self
            .cot
            .iter()
            .filter(|r| assets.contains(&r.asset) && r.report_date >= since)
            .cloned()
            .collect();
        reports.sort_by(|a, b| {
            b.report_date
                .cmp(&a.report_date)
                .then_with(|| a.asset.cmp(&b.asset))
        });
        if let Some(n) = limit {
            reports.truncate(n);
        }
        Ok(reports)
    }

    fn available_assets(&self) -> Result<Vec<String>, SticklabError> {
        let mut assets: Vec<String> = self.cot.iter().map(|r| r.asset.clone()).collect();
        assets.sort();
        assets.dedup();
        Ok(assets)
    }

    fn date_range(&self) -> Result<Option<CotDateRange>, SticklabError> {
        let earliest = self.cot.iter().map(|r| r.report_date).min();
        let latest = self.cot.iter().map(|r| r.report_date).max();
        Ok(earliest.zip(latest).map(|(earliest, latest)| CotDateRange {
            earliest,
            latest,
            total_records: self.cot.len() as i64,
        }))
    }
}

impl SymbolPort for MockMarketDataPort {
    fn hot_symbols(&self) -> Result<Vec<String>, SticklabError> {
        Ok(self.hot.clone())
    }

    fn upsert_metadata(&self, records: &[StockMetadata]) -> Result<(), SticklabError> {
        self.upserts.borrow_mut().push(records.to_vec());
        Ok(())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn utc(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
}

/// A stick whose ask sits a quarter above `mid` and bid a quarter below.
pub fn make_stick(datetime: DateTime<Utc>, mid: f64, volume: f64) -> Stick {
    Stick {
        datetime,
        epoch_utc_ms: datetime.timestamp_millis(),
        ask_open: mid + 0.25,
        ask_high: mid + 1.25,
        ask_low: mid - 0.75,
        ask_close: mid + 0.25,
        bid_open: mid - 0.25,
        bid_high: mid + 0.75,
        bid_low: mid - 1.25,
        bid_close: mid - 0.25,
        volume,
    }
}

/// One stick per `step`, mids taken in order.
pub fn sticks_from_mids(
    start: DateTime<Utc>,
    step: Duration,
    mids: &[f64],
    volume: f64,
) -> Vec<Stick> {
    mids.iter()
        .enumerate()
        .map(|(i, &mid)| make_stick(start + step * i as i32, mid, volume))
        .collect()
}

/// Daily sticks rising by `slope` per day from `start_mid`.
pub fn daily_trend(start: DateTime<Utc>, count: usize, start_mid: f64, slope: f64) -> Vec<Stick> {
    let mids: Vec<f64> = (0..count).map(|i| start_mid + slope * i as f64).collect();
    sticks_from_mids(start, Duration::days(1), &mids, 100_000.0)
}

pub fn make_cot(asset: &str, report_date: NaiveDate, lev_net: i64) -> CotReport {
    CotReport {
        asset: asset.to_string(),
        report_date,
        as_of_date: report_date - Duration::days(3),
        open_interest: 250_000,
        delta_open_interest: -1_200,
        asset_mgr: TraderPositions::default(),
        dealer: TraderPositions::default(),
        lev_money: TraderPositions {
            long: 60_000 + lev_net.max(0),
            short: 60_000 - lev_net.min(0),
            net: lev_net,
            ..TraderPositions::default()
        },
        other_rept: TraderPositions::default(),
        ingest_ts: None,
    }
}
