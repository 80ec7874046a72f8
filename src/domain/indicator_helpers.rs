//! Shared helper functions for indicator calculations.
//!
//! The smoothing helpers mirror the three averaging modes the indicators
//! need: recursive EWM seeded with the first value, bias-adjusted EWM that
//! skips leading gaps, and a plain rolling mean.

use std::collections::HashMap;

use crate::domain::indicator::{
    IndicatorSeries, IndicatorType, adx, atr, ema, rsi, supertrend, td_sequential,
};
use crate::domain::stick::{PriceSide, Stick};

/// y[0] = x[0]; y[t] = (1 - alpha) * y[t-1] + alpha * x[t]
pub fn ewm_recursive(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &x in values {
        let y = match prev {
            None => x,
            Some(p) => (1.0 - alpha) * p + alpha * x,
        };
        out.push(y);
        prev = Some(y);
    }
    out
}

/// Bias-adjusted exponentially weighted mean over a series with gaps.
///
/// Each output is sum((1-a)^k * x[t-k]) / sum((1-a)^k) over the observed
/// points so far. Gaps still advance the decay. Positions before the first
/// observation are `None`.
pub fn ewm_adjusted(values: &[Option<f64>], alpha: f64) -> Vec<Option<f64>> {
    let decay = 1.0 - alpha;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    let mut out = Vec::with_capacity(values.len());

    for value in values {
        numerator *= decay;
        denominator *= decay;
        if let Some(x) = value {
            numerator += x;
            denominator += 1.0;
        }
        out.push((denominator > 0.0).then(|| numerator / denominator));
    }
    out
}

/// Simple moving average over `window` points; `None` until the window is
/// full or while it contains a gap.
pub fn rolling_mean(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }

    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                return None;
            }
            let slice = &values[i + 1 - window..=i];
            let sum: Option<f64> = slice.iter().copied().sum();
            sum.map(|s| s / window as f64)
        })
        .collect()
}

/// True range per stick; the first stick uses high - low.
pub fn true_ranges(sticks: &[Stick], side: PriceSide) -> Vec<f64> {
    sticks
        .iter()
        .enumerate()
        .map(|(i, stick)| {
            if i == 0 {
                stick.high(side) - stick.low(side)
            } else {
                stick.true_range(side, sticks[i - 1].close(side))
            }
        })
        .collect()
}

/// Compute every requested indicator over `sticks`.
pub fn compute_indicators(
    sticks: &[Stick],
    types: &[IndicatorType],
    side: PriceSide,
) -> HashMap<IndicatorType, IndicatorSeries> {
    let mut out = HashMap::with_capacity(types.len());
    for indicator_type in types {
        if out.contains_key(indicator_type) {
            continue;
        }
        let series = match indicator_type {
            IndicatorType::Ema(span) => ema::calculate_ema(sticks, *span, side),
            IndicatorType::Rsi(period) => rsi::calculate_rsi(sticks, *period, side),
            IndicatorType::Atr(period) => atr::calculate_atr(sticks, *period, side),
            IndicatorType::RollingAtr(period) => atr::calculate_rolling_atr(sticks, *period, side),
            IndicatorType::Adx(period) => adx::calculate_adx(sticks, *period, side),
            IndicatorType::Supertrend {
                period,
                multiplier_x100,
            } => supertrend::calculate_supertrend(
                sticks,
                *period,
                *multiplier_x100 as f64 / 100.0,
                side,
            ),
            IndicatorType::TdSequential => td_sequential::calculate_td_setup(sticks),
        };
        out.insert(indicator_type.clone(), series);
    }
    out
}
