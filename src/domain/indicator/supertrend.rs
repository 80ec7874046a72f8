//! Supertrend.
//!
//! Basic bands are hl2 ± multiplier * ATR (Wilder). The final upper band only
//! moves down and the final lower band only moves up, unless the previous
//! close broke through them. The line rides the upper band until a close
//! above it, then the lower band until a close below it.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::indicator_helpers::{ewm_recursive, true_ranges};
use crate::domain::stick::{PriceSide, Stick};

pub const BULLISH: i8 = 1;
pub const BEARISH: i8 = -1;

pub fn calculate_supertrend(
    sticks: &[Stick],
    period: usize,
    multiplier: f64,
    side: PriceSide,
) -> IndicatorSeries {
    let indicator_type = IndicatorType::Supertrend {
        period,
        multiplier_x100: (multiplier * 100.0).round() as u32,
    };
    if period == 0 || sticks.is_empty() {
        return IndicatorSeries::empty(indicator_type);
    }

    let atr = ewm_recursive(&true_ranges(sticks, side), 1.0 / period as f64);
    let close: Vec<f64> = sticks.iter().map(|s| s.close(side)).collect();

    let mut values = Vec::with_capacity(sticks.len());
    let mut upper = 0.0;
    let mut lower = 0.0;
    let mut line = 0.0;

    for (i, stick) in sticks.iter().enumerate() {
        let hl2 = (stick.high(side) + stick.low(side)) / 2.0;
        let basic_upper = hl2 + multiplier * atr[i];
        let basic_lower = hl2 - multiplier * atr[i];

        if i == 0 {
            upper = basic_upper;
            lower = basic_lower;
            line = upper;
        } else {
            let prev_close = close[i - 1];
            let (prev_upper, prev_lower, prev_line) = (upper, lower, line);

            upper = if basic_upper < prev_upper || prev_close > prev_upper {
                basic_upper
            } else {
                prev_upper
            };
            lower = if basic_lower > prev_lower || prev_close < prev_lower {
                basic_lower
            } else {
                prev_lower
            };

            line = if prev_line == prev_upper {
                if close[i] <= upper { upper } else { lower }
            } else if close[i] >= lower {
                lower
            } else {
                upper
            };
        }

        let direction = if close[i] > line { BULLISH } else { BEARISH };
        values.push(IndicatorPoint {
            datetime: stick.datetime,
            valid: true,
            value: IndicatorValue::Supertrend { line, direction },
        });
    }

    IndicatorSeries {
        indicator_type,
        values,
    }
}

/// Direction of a Supertrend point, if it is one.
pub fn direction(point: &IndicatorPoint) -> Option<i8> {
    match point.value {
        IndicatorValue::Supertrend { direction, .. } if point.valid => Some(direction),
        _ => None,
    }
}
