//! Exponential Moving Average indicator.
//!
//! alpha = 2/(span+1), EMA[0] = C[0], then EMA[i] = C[i]*alpha + EMA[i-1]*(1-alpha).
//! No warmup: every point is valid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::indicator_helpers::ewm_recursive;
use crate::domain::stick::{PriceSide, Stick};

pub const RIBBON_SPANS: [usize; 3] = [18, 50, 200];

pub fn calculate_ema(sticks: &[Stick], span: usize, side: PriceSide) -> IndicatorSeries {
    if span == 0 || sticks.is_empty() {
        return IndicatorSeries::empty(IndicatorType::Ema(span));
    }

    let closes: Vec<f64> = sticks.iter().map(|s| s.close(side)).collect();
    let alpha = 2.0 / (span as f64 + 1.0);

    let values = sticks
        .iter()
        .zip(ewm_recursive(&closes, alpha))
        .map(|(stick, ema)| IndicatorPoint {
            datetime: stick.datetime,
            valid: true,
            value: IndicatorValue::Simple(ema),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Ema(span),
        values,
    }
}

/// EMA 18/50/200 of the ask close, one row per stick.
#[derive(Debug, Clone, PartialEq)]
pub struct EmaRibbon {
    pub ema18: Vec<f64>,
    pub ema50: Vec<f64>,
    pub ema200: Vec<f64>,
}

impl EmaRibbon {
    pub fn row(&self, i: usize) -> Option<[f64; 3]> {
        Some([
            *self.ema18.get(i)?,
            *self.ema50.get(i)?,
            *self.ema200.get(i)?,
        ])
    }
}

pub fn ema_ribbon(sticks: &[Stick]) -> EmaRibbon {
    let closes: Vec<f64> = sticks.iter().map(|s| s.ask_close).collect();
    let [fast, medium, slow] =
        RIBBON_SPANS.map(|span| ewm_recursive(&closes, 2.0 / (span as f64 + 1.0)));
    EmaRibbon {
        ema18: fast,
        ema50: medium,
        ema200: slow,
    }
}
