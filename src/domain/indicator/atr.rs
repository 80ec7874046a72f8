//! Average True Range.
//!
//! Two flavours are in use: Wilder's ATR (recursive EWM with alpha = 1/n,
//! seeded with TR[0]) drives Supertrend, while the rolling ATR (simple mean
//! of the last n true ranges) sizes trailing stops and normalizes ADX.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::indicator_helpers::{ewm_recursive, rolling_mean, true_ranges};
use crate::domain::stick::{PriceSide, Stick};

pub fn calculate_atr(sticks: &[Stick], period: usize, side: PriceSide) -> IndicatorSeries {
    if period == 0 || sticks.is_empty() {
        return IndicatorSeries::empty(IndicatorType::Atr(period));
    }

    let tr = true_ranges(sticks, side);
    let atr = ewm_recursive(&tr, 1.0 / period as f64);

    let values = sticks
        .iter()
        .zip(atr)
        .map(|(stick, value)| IndicatorPoint {
            datetime: stick.datetime,
            valid: true,
            value: IndicatorValue::Simple(value),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Atr(period),
        values,
    }
}

pub fn calculate_rolling_atr(sticks: &[Stick], period: usize, side: PriceSide) -> IndicatorSeries {
    let tr: Vec<Option<f64>> = true_ranges(sticks, side).into_iter().map(Some).collect();
    let atr = rolling_mean(&tr, period);

    let values = sticks
        .iter()
        .zip(atr)
        .map(|(stick, value)| IndicatorPoint {
            datetime: stick.datetime,
            valid: value.is_some(),
            value: IndicatorValue::Simple(value.unwrap_or(0.0)),
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::RollingAtr(period),
        values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn make_stick(day: i64, high: f64, low: f64, close: f64) -> Stick {
        let datetime = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::days(day);
        Stick {
            datetime,
            epoch_utc_ms: datetime.timestamp_millis(),
            ask_open: close,
            ask_high: high,
            ask_low: low,
            ask_close: close,
            bid_open: close,
            bid_high: high,
            bid_low: low,
            bid_close: close,
            volume: 1000.0,
        }
    }

    fn rising() -> Vec<Stick> {
        vec![
            make_stick(0, 110.0, 100.0, 105.0),
            make_stick(1, 115.0, 105.0, 110.0),
            make_stick(2, 120.0, 110.0, 115.0),
            make_stick(3, 125.0, 115.0, 120.0),
        ]
    }

    #[test]
    fn atr_seeded_with_first_range() {
        let series = calculate_atr(&rising(), 3, PriceSide::Ask);
        assert_eq!(series.values.len(), 4);
        assert!(series.values.iter().all(|p| p.valid));
        assert!((series.values[0].simple().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn atr_wilder_smoothing() {
        let sticks = vec![
            make_stick(0, 110.0, 100.0, 105.0),
            make_stick(1, 130.0, 120.0, 125.0),
        ];
        let series = calculate_atr(&sticks, 4, PriceSide::Ask);

        // TR[1] = |130 - 105| = 25 ; ATR = 0.75*10 + 0.25*25
        let expected = 0.75 * 10.0 + 0.25 * 25.0;
        assert!((series.values[1].simple().unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn atr_period_zero_is_empty() {
        assert!(calculate_atr(&rising(), 0, PriceSide::Ask).values.is_empty());
    }

    #[test]
    fn rolling_atr_warmup_and_mean() {
        let series = calculate_rolling_atr(&rising(), 3, PriceSide::Ask);

        assert_eq!(series.indicator_type, IndicatorType::RollingAtr(3));
        assert!(!series.values[0].valid);
        assert!(!series.values[1].valid);
        assert!((series.values[2].simple().unwrap() - 10.0).abs() < 1e-9);
        assert!((series.values[3].simple().unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_atr_handles_gaps() {
        let sticks = vec![
            make_stick(0, 110.0, 100.0, 105.0),
            make_stick(1, 130.0, 120.0, 125.0),
        ];
        let series = calculate_rolling_atr(&sticks, 2, PriceSide::Ask);
        // (10 + 25) / 2
        assert!((series.values[1].simple().unwrap() - 17.5).abs() < 1e-9);
    }
}
