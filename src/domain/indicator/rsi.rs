//! RSI (Relative Strength Index) indicator implementation.
//!
//! Average gain and loss are simple rolling means over the last `period`
//! close-to-close changes (not Wilder smoothing):
//!
//! Formula: RSI = 100 - (100 / (1 + avg_gain / avg_loss))
//! If avg_loss == 0 and avg_gain > 0: RSI = 100
//! If both are 0 the point is invalid.
//!
//! Warmup: first `period` sticks are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::indicator_helpers::rolling_mean;
use crate::domain::stick::{PriceSide, Stick};

pub fn calculate_rsi(sticks: &[Stick], period: usize, side: PriceSide) -> IndicatorSeries {
    let mut gains: Vec<Option<f64>> = Vec::with_capacity(sticks.len());
    let mut losses: Vec<Option<f64>> = Vec::with_capacity(sticks.len());

    for (i, stick) in sticks.iter().enumerate() {
        if i == 0 {
            gains.push(None);
            losses.push(None);
            continue;
        }
        let change = stick.close(side) - sticks[i - 1].close(side);
        gains.push(Some(change.max(0.0)));
        losses.push(Some((-change).max(0.0)));
    }

    let avg_gain = rolling_mean(&gains, period);
    let avg_loss = rolling_mean(&losses, period);

    let values = sticks
        .iter()
        .enumerate()
        .map(|(i, stick)| {
            let rsi = match (avg_gain[i], avg_loss[i]) {
                (Some(gain), Some(loss)) => rsi_from_averages(gain, loss),
                _ => None,
            };
            IndicatorPoint {
                datetime: stick.datetime,
                valid: rsi.is_some(),
                value: IndicatorValue::Simple(rsi.unwrap_or(0.0)),
            }
        })
        .collect();

    IndicatorSeries {
        indicator_type: IndicatorType::Rsi(period),
        values,
    }
}

fn rsi_from_averages(gain: f64, loss: f64) -> Option<f64> {
    if loss == 0.0 {
        return (gain > 0.0).then_some(100.0);
    }
    Some(100.0 - 100.0 / (1.0 + gain / loss))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn make_stick(date: &str, close: f64) -> Stick {
        let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
        let datetime = Utc.from_utc_datetime(&day.and_hms_opt(0, 0, 0).unwrap());
        Stick {
            datetime,
            epoch_utc_ms: datetime.timestamp_millis(),
            ask_open: close,
            ask_high: close,
            ask_low: close,
            ask_close: close,
            bid_open: close,
            bid_high: close,
            bid_low: close,
            bid_close: close,
            volume: 1000.0,
        }
    }

    fn series_of(closes: impl Iterator<Item = f64>) -> Vec<Stick> {
        closes
            .enumerate()
            .map(|(i, c)| make_stick(&format!("2024-01-{:02}", i + 1), c))
            .collect()
    }

    #[test]
    fn rsi_empty_sticks() {
        let series = calculate_rsi(&[], 14, PriceSide::Ask);
        assert_eq!(series.values.len(), 0);
    }

    #[test]
    fn rsi_single_stick() {
        let sticks = vec![make_stick("2024-01-01", 100.0)];
        let series = calculate_rsi(&sticks, 14, PriceSide::Ask);
        assert_eq!(series.values.len(), 1);
        assert!(!series.values[0].valid);
    }

    #[test]
    fn rsi_warmup_period() {
        let sticks = series_of((1..=15).map(|i| 100.0 + (i as f64 % 5.0) * 2.0));
        let series = calculate_rsi(&sticks, 14, PriceSide::Ask);

        assert_eq!(series.values.len(), 15);
        for i in 0..14 {
            assert!(!series.values[i].valid, "Stick {} should be invalid", i);
        }
        assert!(series.values[14].valid, "Stick 14 should be valid");
    }

    #[test]
    fn rsi_all_gains_no_losses() {
        let sticks = series_of((0..15).map(|i| 100.0 + i as f64));
        let series = calculate_rsi(&sticks, 14, PriceSide::Ask);
        assert_eq!(series.values[14].simple(), Some(100.0));
    }

    #[test]
    fn rsi_all_losses_no_gains() {
        let sticks = series_of((0..15).map(|i| 100.0 - i as f64));
        let series = calculate_rsi(&sticks, 14, PriceSide::Ask);
        assert_eq!(series.values[14].simple(), Some(0.0));
    }

    #[test]
    fn rsi_flat_prices_invalid() {
        let sticks = series_of((0..16).map(|_| 50.0));
        let series = calculate_rsi(&sticks, 14, PriceSide::Ask);
        assert!(series.values.iter().all(|p| !p.valid));
    }

    #[test]
    fn rsi_rolling_mean_not_wilder() {
        // Changes: +2, -1, +3 ; period 2 → last window is (-1, +3)
        let sticks = series_of([10.0, 12.0, 11.0, 14.0].into_iter());
        let series = calculate_rsi(&sticks, 2, PriceSide::Ask);

        let gain = 3.0 / 2.0;
        let loss = 1.0 / 2.0;
        let expected = 100.0 - 100.0 / (1.0 + gain / loss);
        let rsi = series.values[3].simple().unwrap();
        assert!((rsi - expected).abs() < 1e-12);
    }

    #[test]
    fn rsi_in_range() {
        let sticks = series_of((1..=20).map(|i| 100.0 + (i as f64 % 7.0 - 3.0) * 2.0));
        let series = calculate_rsi(&sticks, 14, PriceSide::Ask);

        for point in &series.values {
            if let Some(rsi) = point.simple() {
                assert!((0.0..=100.0).contains(&rsi), "RSI {} out of range", rsi);
            }
        }
    }

    #[test]
    fn rsi_zero_period() {
        let sticks = vec![make_stick("2024-01-01", 100.0), make_stick("2024-01-02", 101.0)];
        let series = calculate_rsi(&sticks, 0, PriceSide::Ask);
        assert_eq!(series.values.len(), 2);
        assert!(series.values.iter().all(|p| !p.valid));
        assert_eq!(series.indicator_type, IndicatorType::Rsi(0));
    }
}
