//! Raw (unimputed, unscaled) feature rows
//!
//! NaN marks a missing value; the fitted transform fills it later.

use super::geo::haversine_km;
use super::transform::{CategoryEncoder, FittedTransform};
use super::{FeatureVector, N_FEATURES, ONLINE_DISTANCE_KM, ONLINE_RAPID_TRANSACTIONS};
use crate::error::Result;
use crate::types::{MergedRecord, TransactionRequest};
use chrono::{NaiveDateTime, Timelike};
use std::collections::VecDeque;
use std::f64::consts::PI;

/// Gaps averaged by `rapid_transactions`
const RAPID_WINDOW: usize = 3;

/// Batch rows in `(cc_num, timestamp)` order
pub(crate) struct BatchRows {
    pub keys: Vec<String>,
    pub rows: Vec<[f64; N_FEATURES]>,
    pub labels: Vec<u8>,
}

pub(crate) fn batch_rows(
    records: &[MergedRecord],
    category: &CategoryEncoder,
    merchant: &CategoryEncoder,
) -> BatchRows {
    let mut order: Vec<&MergedRecord> = records.iter().collect();
    order.sort_by_key(|r| (r.cc_num, r.trans_date_trans_time));

    let mut out = BatchRows {
        keys: Vec::with_capacity(order.len()),
        rows: Vec::with_capacity(order.len()),
        labels: Vec::with_capacity(order.len()),
    };

    let mut card: Option<u64> = None;
    let mut previous: Option<NaiveDateTime> = None;
    let mut gaps: VecDeque<Option<f64>> = VecDeque::with_capacity(RAPID_WINDOW);

    for record in order {
        if card != Some(record.cc_num) {
            card = Some(record.cc_num);
            previous = None;
            gaps.clear();
        }

        let gap = previous.map(|p| (record.trans_date_trans_time - p).num_milliseconds() as f64 / 1000.0);
        previous = Some(record.trans_date_trans_time);
        if gaps.len() == RAPID_WINDOW {
            gaps.pop_front();
        }
        gaps.push_back(gap);

        let distance = match (record.lat, record.long, record.merch_lat, record.merch_long) {
            (Some(lat), Some(long), Some(merch_lat), Some(merch_long)) => {
                haversine_km(lat, long, merch_lat, merch_long)
            }
            _ => f64::NAN,
        };

        let (hour_sin, hour_cos) = hour_cycle(record.hour);
        let vector = FeatureVector {
            category_code: category.encode(record.category.as_deref()),
            merchant_code: merchant.encode(record.merchant.as_deref()),
            merch_lat: record.merch_lat.unwrap_or(f64::NAN),
            merch_long: record.merch_long.unwrap_or(f64::NAN),
            hour_sin,
            hour_cos,
            log_amt: record.amt.map(f64::ln_1p).unwrap_or(f64::NAN),
            rapid_transactions: rolling_mean(&gaps),
            distance_km: distance,
        };

        out.keys.push(record.trans_num.clone());
        out.rows.push(vector.to_array());
        out.labels.push(record.is_fraud);
    }

    out
}

/// Single-record row. Card history and home location are unavailable, so
/// `rapid_transactions` and `distance_km` carry fixed sentinels.
pub(crate) fn online_row(fitted: &FittedTransform, request: &TransactionRequest) -> Result<FeatureVector> {
    let timestamp = request.timestamp()?;
    let (hour_sin, hour_cos) = hour_cycle(timestamp.hour());

    Ok(FeatureVector {
        category_code: fitted.category.encode(request.category.as_deref()),
        merchant_code: fitted.merchant.encode(request.merchant.as_deref()),
        merch_lat: request.merch_lat.unwrap_or(f64::NAN),
        merch_long: request.merch_long.unwrap_or(f64::NAN),
        hour_sin,
        hour_cos,
        log_amt: request.amt.map(f64::ln_1p).unwrap_or(f64::NAN),
        rapid_transactions: ONLINE_RAPID_TRANSACTIONS,
        distance_km: ONLINE_DISTANCE_KM,
    })
}

fn hour_cycle(hour: u32) -> (f64, f64) {
    let angle = hour as f64 * (2.0 * PI / 24.0);
    (angle.sin(), angle.cos())
}

/// Mean of the observed gaps in the window, NaN when none is observed.
fn rolling_mean(gaps: &VecDeque<Option<f64>>) -> f64 {
    let (sum, n) = gaps
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), g| (s + g, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}
