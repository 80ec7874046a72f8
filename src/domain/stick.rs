//! Stick (OHLCV bar) representation.
//!
//! A stick carries both sides of the book. Indicators pick a side through
//! [`PriceSide`]; the mid price is the mean of ask and bid.

use chrono::{DateTime, Utc};

/// Bar interval in minutes, as stored in the `interval` column.
pub type Interval = i32;

pub const MINUTE: Interval = 1;
pub const FIFTEEN_MINUTES: Interval = 15;
pub const HOURLY: Interval = 60;
pub const FOUR_HOURLY: Interval = 240;
pub const DAILY: Interval = 1440;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PriceSide {
    Ask,
    Bid,
    Mid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stick {
    pub datetime: DateTime<Utc>,
    pub epoch_utc_ms: i64,
    pub ask_open: f64,
    pub ask_high: f64,
    pub ask_low: f64,
    pub ask_close: f64,
    pub bid_open: f64,
    pub bid_high: f64,
    pub bid_low: f64,
    pub bid_close: f64,
    pub volume: f64,
}

impl Stick {
    pub fn open(&self, side: PriceSide) -> f64 {
        pick(side, self.ask_open, self.bid_open)
    }

    pub fn high(&self, side: PriceSide) -> f64 {
        pick(side, self.ask_high, self.bid_high)
    }

    pub fn low(&self, side: PriceSide) -> f64 {
        pick(side, self.ask_low, self.bid_low)
    }

    pub fn close(&self, side: PriceSide) -> f64 {
        pick(side, self.ask_close, self.bid_close)
    }

    /// (ask_close + bid_close) / 2
    pub fn mid_close(&self) -> f64 {
        self.close(PriceSide::Mid)
    }

    /// max(high - low, |high - prev_close|, |low - prev_close|)
    pub fn true_range(&self, side: PriceSide, prev_close: f64) -> f64 {
        let high = self.high(side);
        let low = self.low(side);
        let hl = high - low;
        let hc = (high - prev_close).abs();
        let lc = (low - prev_close).abs();
        hl.max(hc).max(lc)
    }
}

fn pick(side: PriceSide, ask: f64, bid: f64) -> f64 {
    match side {
        PriceSide::Ask => ask,
        PriceSide::Bid => bid,
        PriceSide::Mid => (ask + bid) / 2.0,
    }
}

/// Inclusive UTC time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.from && t <= self.to
    }
}

/// Parameters of a stick lookup against the `stick` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StickQuery {
    pub symbol: String,
    pub interval: Interval,
    pub window: Option<TimeWindow>,
    pub limit: Option<usize>,
}

impl StickQuery {
    pub fn new(symbol: impl Into<String>, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            interval,
            window: None,
            limit: None,
        }
    }

    pub fn between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.window = Some(TimeWindow::new(from, to));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}
