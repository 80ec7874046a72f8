//! Average Directional Index.
//!
//! +DM = max(high - prev_high, 0), -DM = max(prev_low - low, 0), taken
//! independently. Both are smoothed with a bias-adjusted EWM (alpha = 1/n)
//! and normalized by the rolling ATR:
//!
//!   +DI = 100 * ewm(+DM) / atr,  -DI = 100 * ewm(-DM) / atr
//!   DX  = |+DI - -DI| / (+DI + -DI) * 100
//!   ADX = ewm((DX[t-1] * (n-1) + DX[t]) / n)
//!
//! Warmup: the first `n` sticks are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::indicator_helpers::{ewm_adjusted, rolling_mean, true_ranges};
use crate::domain::stick::{PriceSide, Stick};

pub fn calculate_adx(sticks: &[Stick], period: usize, side: PriceSide) -> IndicatorSeries {
    if period == 0 || sticks.is_empty() {
        return IndicatorSeries::empty(IndicatorType::Adx(period));
    }

    let n = period as f64;
    let alpha = 1.0 / n;

    let mut plus_dm: Vec<Option<f64>> = vec![None];
    let mut minus_dm: Vec<Option<f64>> = vec![None];
    for pair in sticks.windows(2) {
        let (prev, curr) = (&pair[0], &pair[1]);
        plus_dm.push(Some((curr.high(side) - prev.high(side)).max(0.0)));
        minus_dm.push(Some((prev.low(side) - curr.low(side)).max(0.0)));
    }

    let tr: Vec<Option<f64>> = true_ranges(sticks, side).into_iter().map(Some).collect();
    let atr = rolling_mean(&tr, period);
    let plus_smoothed = ewm_adjusted(&plus_dm, alpha);
    let minus_smoothed = ewm_adjusted(&minus_dm, alpha);

    let directional = |smoothed: &[Option<f64>]| -> Vec<Option<f64>> {
        smoothed
            .iter()
            .zip(&atr)
            .map(|(dm, atr)| match (dm, atr) {
                (Some(dm), Some(atr)) if *atr != 0.0 => Some(100.0 * dm / atr),
                _ => None,
            })
            .collect()
    };
    let plus_di = directional(&plus_smoothed);
    let minus_di = directional(&minus_smoothed);

    let dx: Vec<Option<f64>> = plus_di
        .iter()
        .zip(&minus_di)
        .map(|(p, m)| match (p, m) {
            (Some(p), Some(m)) if p + m != 0.0 => Some((p - m).abs() / (p + m).abs() * 100.0),
            _ => None,
        })
        .collect();

    let raw: Vec<Option<f64>> = (0..dx.len())
        .map(|i| {
            let prev = dx.get(i.checked_sub(1)?).copied().flatten()?;
            Some((prev * (n - 1.0) + dx[i]?) / n)
        })
        .collect();
    let adx = ewm_adjusted(&raw, alpha);

    let values = sticks
        .iter()
        .enumerate()
        .map(|(i, stick)| IndicatorPoint {
            datetime: stick.datetime,
            valid: adx[i].is_some(),
            value: IndicatorValue::Adx {
                adx: adx[i].unwrap_or(0.0),
                plus_di: plus_di[i].unwrap_or(0.0),
                minus_di: minus_di[i].unwrap_or(0.0),
            },
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Adx(period),
        values,
    }
}

/// The ADX line of a valid point.
pub fn adx_value(point: &IndicatorPoint) -> Option<f64> {
    match point.value {
        IndicatorValue::Adx { adx, .. } if point.valid => Some(adx),
        _ => None,
    }
}
