//! Compacted stick bucket codec.
//!
//! Each row of the `stick` table holds one interval bucket as a MessagePack
//! map of ten parallel arrays. Every array stores successive differences
//! (the first element is absolute), so decoding is a prefix sum per field
//! followed by zipping the arrays index-for-index into [`Stick`]s.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::domain::error::SticklabError;
use crate::domain::stick::{Stick, StickQuery, TimeWindow};
use crate::ports::data_port::StickPort;

/// Wire shape of the `compressed_sticks` column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedSticks {
    pub epoch: Vec<i64>,
    pub ask_open: Vec<f64>,
    pub ask_high: Vec<f64>,
    pub ask_low: Vec<f64>,
    pub ask_close: Vec<f64>,
    pub bid_open: Vec<f64>,
    pub bid_high: Vec<f64>,
    pub bid_low: Vec<f64>,
    pub bid_close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl CompressedSticks {
    pub fn len(&self) -> usize {
        self.epoch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epoch.is_empty()
    }

    fn check_lengths(&self) -> Result<usize, SticklabError> {
        let expected = self.epoch.len();
        let fields: [(&'static str, usize); 9] = [
            ("askOpen", self.ask_open.len()),
            ("askHigh", self.ask_high.len()),
            ("askLow", self.ask_low.len()),
            ("askClose", self.ask_close.len()),
            ("bidOpen", self.bid_open.len()),
            ("bidHigh", self.bid_high.len()),
            ("bidLow", self.bid_low.len()),
            ("bidClose", self.bid_close.len()),
            ("volume", self.volume.len()),
        ];
        for (field, found) in fields {
            if found != expected {
                return Err(SticklabError::MalformedPayload {
                    field,
                    expected,
                    found,
                });
            }
        }
        Ok(expected)
    }
}

/// Running sum of `deltas`.
pub fn undiff(deltas: &[f64]) -> Vec<f64> {
    deltas
        .iter()
        .scan(0.0, |acc, d| {
            *acc += d;
            Some(*acc)
        })
        .collect()
}

/// Running sum of epoch deltas; overflow is a decode error.
pub fn undiff_epochs(deltas: &[i64]) -> Result<Vec<i64>, SticklabError> {
    let mut out = Vec::with_capacity(deltas.len());
    let mut acc: i64 = 0;
    for &d in deltas {
        acc = acc.checked_add(d).ok_or_else(|| SticklabError::Decode {
            reason: format!("epoch prefix sum overflows after {} entries", out.len()),
        })?;
        out.push(acc);
    }
    Ok(out)
}

/// Inverse of [`undiff`]: first value, then successive differences.
pub fn diff(values: &[f64]) -> Vec<f64> {
    let mut prev = 0.0;
    values
        .iter()
        .map(|&v| {
            let d = v - prev;
            prev = v;
            d
        })
        .collect()
}

/// Inverse of [`undiff_epochs`].
pub fn diff_epochs(values: &[i64]) -> Result<Vec<i64>, SticklabError> {
    let mut prev: i64 = 0;
    values
        .iter()
        .map(|&v| {
            let d = v.checked_sub(prev).ok_or_else(|| SticklabError::Decode {
                reason: format!("epoch difference {v} - {prev} overflows"),
            })?;
            prev = v;
            Ok(d)
        })
        .collect()
}

pub fn decode_payload(bytes: &[u8]) -> Result<CompressedSticks, SticklabError> {
    rmp_serde::from_slice(bytes).map_err(|e| SticklabError::Decode {
        reason: e.to_string(),
    })
}

/// Reconstruct absolute sticks from one delta-encoded bucket.
pub fn explode(payload: &CompressedSticks) -> Result<Vec<Stick>, SticklabError> {
    let n = payload.check_lengths()?;

    let epochs = undiff_epochs(&payload.epoch)?;
    let ask_open = undiff(&payload.ask_open);
    let ask_high = undiff(&payload.ask_high);
    let ask_low = undiff(&payload.ask_low);
    let ask_close = undiff(&payload.ask_close);
    let bid_open = undiff(&payload.bid_open);
    let bid_high = undiff(&payload.bid_high);
    let bid_low = undiff(&payload.bid_low);
    let bid_close = undiff(&payload.bid_close);
    let volume = undiff(&payload.volume);

    let mut sticks = Vec::with_capacity(n);
    for i in 0..n {
        let epoch = epochs[i];
        let datetime =
            DateTime::from_timestamp(epoch, 0).ok_or(SticklabError::InvalidEpoch(epoch))?;
        let epoch_utc_ms = epoch
            .checked_mul(1000)
            .ok_or(SticklabError::InvalidEpoch(epoch))?;
        sticks.push(Stick {
            datetime,
            epoch_utc_ms,
            ask_open: ask_open[i],
            ask_high: ask_high[i],
            ask_low: ask_low[i],
            ask_close: ask_close[i],
            bid_open: bid_open[i],
            bid_high: bid_high[i],
            bid_low: bid_low[i],
            bid_close: bid_close[i],
            volume: volume[i],
        });
    }

    Ok(sticks)
}

/// Delta-encode sticks into the bucket wire shape.
pub fn compress(sticks: &[Stick]) -> Result<CompressedSticks, SticklabError> {
    let column = |f: fn(&Stick) -> f64| diff(&sticks.iter().map(f).collect::<Vec<_>>());
    let epochs: Vec<i64> = sticks.iter().map(|s| s.datetime.timestamp()).collect();

    Ok(CompressedSticks {
        epoch: diff_epochs(&epochs)?,
        ask_open: column(|s| s.ask_open),
        ask_high: column(|s| s.ask_high),
        ask_low: column(|s| s.ask_low),
        ask_close: column(|s| s.ask_close),
        bid_open: column(|s| s.bid_open),
        bid_high: column(|s| s.bid_high),
        bid_low: column(|s| s.bid_low),
        bid_close: column(|s| s.bid_close),
        volume: column(|s| s.volume),
    })
}

/// Delta-encode and serialize one bucket as a MessagePack map.
pub fn encode_sticks(sticks: &[Stick]) -> Result<Vec<u8>, SticklabError> {
    let payload = compress(sticks)?;
    rmp_serde::to_vec_named(&payload).map_err(|e| SticklabError::Decode {
        reason: e.to_string(),
    })
}

/// Decode every payload, drop zero-volume sticks, apply the optional
/// inclusive window and return the result in ascending time order.
pub fn assemble<B: AsRef<[u8]>>(
    payloads: &[B],
    window: Option<TimeWindow>,
) -> Result<Vec<Stick>, SticklabError> {
    let mut sticks = Vec::new();
    for bytes in payloads {
        let payload = decode_payload(bytes.as_ref())?;
        sticks.extend(explode(&payload)?);
    }

    let decoded = sticks.len();
    sticks.retain(|s| s.volume != 0.0 && window.is_none_or(|w| w.contains(s.datetime)));
    sticks.sort_by_key(|s| s.datetime);

    tracing::debug!(
        buckets = payloads.len(),
        decoded,
        kept = sticks.len(),
        "assembled sticks"
    );

    Ok(sticks)
}

/// Fetch and decode the sticks matching `query`.
///
/// An empty query result is an empty vector, not an error.
pub fn get_sticks(port: &dyn StickPort, query: &StickQuery) -> Result<Vec<Stick>, SticklabError> {
    let payloads = port.fetch_compressed(query)?;
    assemble(&payloads, query.window)
}
