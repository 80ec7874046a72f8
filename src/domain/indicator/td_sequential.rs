//! TD Sequential setup counts on the mid close.
//!
//! From the fifth stick on, a close below the close four sticks earlier
//! extends the buy setup and clears the sell setup; a close above does the
//! opposite; an equal close clears both. A count past 9 restarts at 1.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType, IndicatorValue};
use crate::domain::stick::Stick;

pub const LOOKBACK: usize = 4;
pub const SETUP_COMPLETE: u8 = 9;
/// Four sticks of lookback plus a full nine-count.
pub const MIN_STICKS: usize = 13;

pub fn calculate_td_setup(sticks: &[Stick]) -> IndicatorSeries {
    let closes: Vec<f64> = sticks.iter().map(Stick::mid_close).collect();
    let enough = sticks.len() >= MIN_STICKS;

    let mut buy: u8 = 0;
    let mut sell: u8 = 0;
    let mut values = Vec::with_capacity(sticks.len());

    for (i, stick) in sticks.iter().enumerate() {
        if enough && i >= LOOKBACK {
            let current = closes[i];
            let compare = closes[i - LOOKBACK];
            if current < compare {
                buy += 1;
                sell = 0;
            } else if current > compare {
                sell += 1;
                buy = 0;
            } else {
                buy = 0;
                sell = 0;
            }
            if buy > SETUP_COMPLETE {
                buy = 1;
            }
            if sell > SETUP_COMPLETE {
                sell = 1;
            }
        }

        values.push(IndicatorPoint {
            datetime: stick.datetime,
            valid: enough,
            value: IndicatorValue::TdSetup { buy, sell },
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::TdSequential,
        values,
    }
}

/// (buy, sell) counts of a valid point.
pub fn setup_counts(point: &IndicatorPoint) -> Option<(u8, u8)> {
    match point.value {
        IndicatorValue::TdSetup { buy, sell } if point.valid => Some((buy, sell)),
        _ => None,
    }
}
