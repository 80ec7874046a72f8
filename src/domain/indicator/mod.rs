//! Technical indicator implementations.
//!
//! This module provides types for representing indicator values and series:
//! - `IndicatorPoint`: A single point in an indicator time series
//! - `IndicatorValue`: Enum for different indicator output shapes
//! - `IndicatorType`: Enum for indicator identity + parameters (serves as HashMap key)
//! - `IndicatorSeries`: A time series of indicator values, one point per stick

pub mod adx;
pub mod atr;
pub mod ema;
pub mod rsi;
pub mod supertrend;
pub mod td_sequential;

use chrono::{DateTime, Utc};
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorPoint {
    pub datetime: DateTime<Utc>,
    pub valid: bool,
    pub value: IndicatorValue,
}

impl IndicatorPoint {
    /// The scalar value when the point is valid and `Simple`.
    pub fn simple(&self) -> Option<f64> {
        match self.value {
            IndicatorValue::Simple(v) if self.valid => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IndicatorValue {
    Simple(f64),
    Supertrend {
        line: f64,
        /// +1 bullish, -1 bearish.
        direction: i8,
    },
    Adx {
        adx: f64,
        plus_di: f64,
        minus_di: f64,
    },
    TdSetup {
        buy: u8,
        sell: u8,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndicatorType {
    Ema(usize),
    Rsi(usize),
    Atr(usize),
    RollingAtr(usize),
    Adx(usize),
    Supertrend {
        period: usize,
        multiplier_x100: u32,
    },
    TdSequential,
}

#[derive(Debug, Clone)]
pub struct IndicatorSeries {
    pub indicator_type: IndicatorType,
    pub values: Vec<IndicatorPoint>,
}

impl IndicatorSeries {
    pub fn empty(indicator_type: IndicatorType) -> Self {
        Self {
            indicator_type,
            values: Vec::new(),
        }
    }

    pub fn last(&self) -> Option<&IndicatorPoint> {
        self.values.last()
    }
}

impl fmt::Display for IndicatorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorType::Ema(span) => write!(f, "EMA({})", span),
            IndicatorType::Rsi(period) => write!(f, "RSI({})", period),
            IndicatorType::Atr(period) => write!(f, "ATR({})", period),
            IndicatorType::RollingAtr(period) => write!(f, "ROLLING_ATR({})", period),
            IndicatorType::Adx(period) => write!(f, "ADX({})", period),
            IndicatorType::Supertrend {
                period,
                multiplier_x100,
            } => {
                let mult = *multiplier_x100 as f64 / 100.0;
                write!(f, "SUPERTREND({},{})", period, mult)
            }
            IndicatorType::TdSequential => write!(f, "TD_SEQUENTIAL"),
        }
    }
}
