//! Join, normalization and description of the merged record set

use super::dates::{parse_dob, parse_timestamp, timestamp_from_millis};
use super::sources::{RawSources, RawTimestamp, TRANSACTION_MODELED};
use crate::error::{PipelineError, Result};
use crate::storage::{ArtifactKind, ArtifactStore};
use crate::types::{CustomerProfile, MergedRecord, MergedSet};
use chrono::{Datelike, Timelike};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{info, warn};

const DERIVED_COLUMNS: [&str; 3] = ["hour", "day_of_week", "month"];
/// Customer columns with a typed profile field; the rest are demographics.
const PROFILE_MODELED: [&str; 4] = ["cc_num", "lat", "long", "dob"];

/// Left-join transactions to profiles and labels, parse dates, derive time
/// columns and sort by timestamp.
pub fn transform(raw: RawSources) -> Result<MergedSet> {
    let mut profiles: HashMap<u64, CustomerProfile> = HashMap::with_capacity(raw.customers.len());
    let mut duplicate_profiles = 0usize;
    let mut unknown_dob = 0usize;

    for customer in raw.customers {
        if profiles.contains_key(&customer.cc_num) {
            duplicate_profiles += 1;
            continue;
        }
        let dob = customer.dob.as_deref().and_then(parse_dob);
        if dob.is_none() {
            unknown_dob += 1;
        }
        profiles.insert(
            customer.cc_num,
            CustomerProfile {
                cc_num: customer.cc_num,
                lat: customer.lat,
                long: customer.long,
                dob,
                demographics: customer.demographics,
            },
        );
    }

    if duplicate_profiles > 0 {
        warn!(duplicate_profiles, "Duplicate cc_num in customer source, kept first profile");
    }

    // Demographic columns also present among transactions keep both values.
    let overlapping: BTreeSet<String> = raw
        .customer_columns
        .iter()
        .filter(|c| !PROFILE_MODELED.contains(&c.as_str()) && raw.transaction_columns.contains(*c))
        .cloned()
        .collect();
    if !overlapping.is_empty() {
        warn!(columns = ?overlapping, "Columns in both sources, suffixed _x (transaction) and _y (profile)");
    }

    let mut unmatched_cards = 0usize;
    let mut seen_trans_nums = HashSet::with_capacity(raw.transactions.len());
    let mut duplicate_trans_nums = 0usize;
    let mut records = Vec::with_capacity(raw.transactions.len());

    for tx in raw.transactions {
        if !seen_trans_nums.insert(tx.trans_num.clone()) {
            duplicate_trans_nums += 1;
        }

        let timestamp = match &tx.trans_date_trans_time {
            RawTimestamp::Text(text) => parse_timestamp(text),
            RawTimestamp::EpochMillis(millis) => timestamp_from_millis(*millis),
        }
        .ok_or_else(|| PipelineError::DateParse {
            trans_num: tx.trans_num.clone(),
            value: match &tx.trans_date_trans_time {
                RawTimestamp::Text(text) => text.clone(),
                RawTimestamp::EpochMillis(millis) => millis.to_string(),
            },
        })?;

        let profile = profiles.get(&tx.cc_num);
        if profile.is_none() {
            unmatched_cards += 1;
        }

        let mut extra = suffixed(tx.extra, &overlapping, "_x");
        if let Some(profile) = profile {
            extra.extend(suffixed(profile.demographics.clone(), &overlapping, "_y"));
        }

        records.push(MergedRecord {
            is_fraud: raw.labels.get(&tx.trans_num).copied().unwrap_or(0),
            trans_num: tx.trans_num,
            trans_date_trans_time: timestamp,
            unix_time: tx.unix_time,
            cc_num: tx.cc_num,
            merchant: tx.merchant,
            category: tx.category,
            amt: tx.amt,
            merch_lat: tx.merch_lat,
            merch_long: tx.merch_long,
            lat: profile.and_then(|p| p.lat),
            long: profile.and_then(|p| p.long),
            dob: profile.and_then(|p| p.dob),
            extra,
            hour: timestamp.hour(),
            day_of_week: timestamp.weekday().num_days_from_monday(),
            month: timestamp.month(),
        });
    }

    if duplicate_trans_nums > 0 {
        warn!(duplicate_trans_nums, "Duplicate trans_num in transaction source, kept every row");
    }

    // Stable: equal timestamps keep source order.
    records.sort_by_key(|r| r.trans_date_trans_time);

    let mut columns: Vec<String> = raw
        .transaction_columns
        .into_iter()
        .map(|c| {
            if overlapping.contains(&c) && !TRANSACTION_MODELED.contains(&c.as_str()) {
                format!("{}_x", c)
            } else {
                c
            }
        })
        .collect();
    for column in raw.customer_columns {
        let column = if overlapping.contains(&column) {
            format!("{}_y", column)
        } else {
            column
        };
        if !columns.contains(&column) {
            columns.push(column);
        }
    }
    for column in std::iter::once("is_fraud").chain(DERIVED_COLUMNS) {
        if !columns.iter().any(|c| c == column) {
            columns.push(column.to_string());
        }
    }

    let merged = MergedSet { columns, records };
    info!(
        rows = merged.len(),
        unmatched_cards,
        unknown_dob,
        fraud_ratio = merged.fraud_ratio(),
        "Raw sources merged"
    );

    Ok(merged)
}

fn suffixed(values: BTreeMap<String, String>, overlapping: &BTreeSet<String>, suffix: &str) -> BTreeMap<String, String> {
    values
        .into_iter()
        .map(|(name, value)| {
            if overlapping.contains(&name) {
                (format!("{}{}", name, suffix), value)
            } else {
                (name, value)
            }
        })
        .collect()
}

/// Operational summary of a merged set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedDescription {
    /// (rows, columns)
    pub shape: (usize, usize),
    pub columns: Vec<String>,
    pub dtypes: BTreeMap<String, String>,
    pub null_counts: BTreeMap<String, usize>,
    pub fraud_ratio: f64,
}

/// Describe a merged set. Pure; used for operational visibility only.
pub fn describe(merged: &MergedSet) -> MergedDescription {
    let dtypes = merged
        .columns
        .iter()
        .map(|c| (c.clone(), column_dtype(c).to_string()))
        .collect();

    let null_counts = merged
        .columns
        .iter()
        .map(|c| {
            let nulls = merged.records.iter().filter(|r| is_null(r, c)).count();
            (c.clone(), nulls)
        })
        .collect();

    MergedDescription {
        shape: (merged.len(), merged.columns.len()),
        columns: merged.columns.clone(),
        dtypes,
        null_counts,
        fraud_ratio: merged.fraud_ratio(),
    }
}

/// Persist a merged set under a version tag.
pub fn load(store: &ArtifactStore, version: &str, merged: &MergedSet) -> Result<()> {
    let path = store.save(ArtifactKind::MergedSet, version, merged)?;
    info!(version, path = %path.display(), rows = merged.len(), "Merged set stored");
    Ok(())
}

fn column_dtype(column: &str) -> &'static str {
    match column {
        "trans_date_trans_time" => "datetime",
        "dob" => "date",
        "cc_num" => "uint64",
        "unix_time" => "int64",
        "amt" | "merch_lat" | "merch_long" | "lat" | "long" => "float64",
        "hour" | "day_of_week" | "month" => "uint32",
        "is_fraud" => "uint8",
        _ => "string",
    }
}

fn is_null(record: &MergedRecord, column: &str) -> bool {
    match column {
        "trans_num" | "trans_date_trans_time" | "cc_num" | "is_fraud" => false,
        "hour" | "day_of_week" | "month" => false,
        "unix_time" => record.unix_time.is_none(),
        "merchant" => record.merchant.is_none(),
        "category" => record.category.is_none(),
        "amt" => record.amt.is_none(),
        "merch_lat" => record.merch_lat.is_none(),
        "merch_long" => record.merch_long.is_none(),
        "lat" => record.lat.is_none(),
        "long" => record.long.is_none(),
        "dob" => record.dob.is_none(),
        other => !record.extra.contains_key(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::sources::{RawCustomer, RawTransaction};

    fn customer(cc_num: u64, dob: &str) -> RawCustomer {
        RawCustomer {
            cc_num,
            lat: Some(40.0),
            long: Some(-75.0),
            dob: Some(dob.to_string()),
            demographics: BTreeMap::from([("job".to_string(), format!("job_{}", cc_num))]),
        }
    }

    fn transaction(trans_num: &str, ts: &str, cc_num: u64) -> RawTransaction {
        RawTransaction {
            trans_num: trans_num.to_string(),
            trans_date_trans_time: RawTimestamp::Text(ts.to_string()),
            unix_time: None,
            cc_num,
            merchant: Some("m".to_string()),
            category: Some("c".to_string()),
            amt: Some(1.0),
            merch_lat: Some(40.1),
            merch_long: Some(-75.1),
            extra: BTreeMap::new(),
        }
    }

    fn raw() -> RawSources {
        RawSources {
            customer_columns: vec!["cc_num".into(), "lat".into(), "long".into(), "dob".into(), "job".into()],
            customers: vec![customer(1, "03/04/1988"), customer(1, "01/01/1900"), customer(2, "bad")],
            transaction_columns: vec![
                "trans_num".into(),
                "trans_date_trans_time".into(),
                "cc_num".into(),
                "amt".into(),
            ],
            transactions: vec![
                transaction("t1", "2020-01-03 10:00:00", 1),
                transaction("t2", "2020-01-01 23:30:00", 2),
                transaction("t3", "2020-01-02 08:15:00", 9),
            ],
            labels: HashMap::from([("t3".to_string(), 1), ("ghost".to_string(), 1)]),
        }
    }

    #[test]
    fn test_transform_joins_sorts_and_defaults_labels() {
        let merged = transform(raw()).unwrap();

        let order: Vec<&str> = merged.records.iter().map(|r| r.trans_num.as_str()).collect();
        assert_eq!(order, vec!["t2", "t3", "t1"]);

        let labels: Vec<u8> = merged.records.iter().map(|r| r.is_fraud).collect();
        assert_eq!(labels, vec![0, 1, 0]);

        // Card 9 has no profile: left join leaves profile fields empty.
        let t3 = &merged.records[1];
        assert_eq!((t3.lat, t3.long, t3.dob), (None, None, None));

        // First profile wins for the duplicated card.
        let t1 = &merged.records[2];
        assert_eq!(t1.dob.map(|d| d.to_string()), Some("1988-04-03".to_string()));
        assert_eq!(t1.extra.get("job").map(String::as_str), Some("job_1"));

        let t2 = &merged.records[0];
        assert_eq!(t2.dob, None);
        assert_eq!((t2.hour, t2.day_of_week, t2.month), (23, 2, 1));
    }

    #[test]
    fn test_transform_rejects_unparseable_timestamp() {
        let mut sources = raw();
        sources.transactions.push(transaction("t4", "32/13/2020 25:00", 1));

        let err = transform(sources).unwrap_err();
        assert!(matches!(err, PipelineError::DateParse { trans_num, .. } if trans_num == "t4"));
    }

    #[test]
    fn test_shared_column_keeps_both_values() {
        let mut sources = raw();
        sources.transaction_columns.push("job".into());
        for tx in &mut sources.transactions {
            tx.extra.insert("job".to_string(), format!("tx_job_{}", tx.trans_num));
        }

        let merged = transform(sources).unwrap();
        let t1 = merged.records.iter().find(|r| r.trans_num == "t1").unwrap();
        assert_eq!(t1.extra.get("job_x").map(String::as_str), Some("tx_job_t1"));
        assert_eq!(t1.extra.get("job_y").map(String::as_str), Some("job_1"));
        assert!(!t1.extra.contains_key("job"));

        // No profile for card 9: only the transaction side is present.
        let t3 = merged.records.iter().find(|r| r.trans_num == "t3").unwrap();
        assert_eq!(t3.extra.get("job_x").map(String::as_str), Some("tx_job_t3"));
        assert!(!t3.extra.contains_key("job_y"));

        assert!(merged.columns.iter().any(|c| c == "job_x"));
        assert!(merged.columns.iter().any(|c| c == "job_y"));
        assert!(!merged.columns.iter().any(|c| c == "job"));
    }

    #[test]
    fn test_duplicate_trans_num_rows_are_kept() {
        let mut sources = raw();
        sources.transactions.push(transaction("t3", "2020-01-04 09:00:00", 1));

        let merged = transform(sources).unwrap();
        let t3: Vec<u8> = merged
            .records
            .iter()
            .filter(|r| r.trans_num == "t3")
            .map(|r| r.is_fraud)
            .collect();
        assert_eq!(t3, vec![1, 1]);
        assert_eq!(merged.len(), 4);
    }

    #[test]
    fn test_describe_reports_ratio_and_nulls() {
        let merged = transform(raw()).unwrap();
        let description = describe(&merged);

        assert_eq!(description.shape, (3, merged.columns.len()));
        assert!((description.fraud_ratio - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(description.fraud_ratio, merged.fraud_ratio());
        assert_eq!(description.null_counts["lat"], 1);
        assert_eq!(description.null_counts["dob"], 2);
        assert_eq!(description.null_counts["job"], 1);
        assert_eq!(description.dtypes["trans_date_trans_time"], "datetime");
        assert!(description.columns.iter().any(|c| c == "is_fraud"));
        assert!(description.columns.iter().any(|c| c == "hour"));
    }
}
