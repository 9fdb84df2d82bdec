//! Merged, denormalized transaction records produced by the ETL stage

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Customer profile joined onto transactions by `cc_num`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerProfile {
    pub cc_num: u64,
    /// Home latitude
    pub lat: Option<f64>,
    /// Home longitude
    pub long: Option<f64>,
    /// Date of birth; `None` when no accepted format matched
    pub dob: Option<NaiveDate>,
    /// Remaining profile columns (name, address, job, ...) as raw strings
    pub demographics: BTreeMap<String, String>,
}

/// One transaction joined with its profile and fraud label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRecord {
    pub trans_num: String,
    pub trans_date_trans_time: NaiveDateTime,
    pub unix_time: Option<i64>,
    pub cc_num: u64,
    pub merchant: Option<String>,
    pub category: Option<String>,
    pub amt: Option<f64>,
    pub merch_lat: Option<f64>,
    pub merch_long: Option<f64>,

    // Profile side of the left join; all `None` when the card had no profile.
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub dob: Option<NaiveDate>,
    /// Remaining source columns (profile demographics, unmodeled transaction columns)
    pub extra: BTreeMap<String, String>,

    /// Derived from the timestamp
    pub hour: u32,
    /// Monday = 0
    pub day_of_week: u32,
    pub month: u32,

    /// Fraud label, 0 when the transaction was absent from the label source
    pub is_fraud: u8,
}

/// The merged record set, sorted by timestamp ascending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedSet {
    /// Normalized column names present in the sources plus derived columns
    pub columns: Vec<String>,
    pub records: Vec<MergedRecord>,
}

impl MergedSet {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Mean of the label column; 0 for an empty set.
    pub fn fraud_ratio(&self) -> f64 {
        fraud_ratio(&self.records)
    }

    /// Number of rows labeled fraudulent.
    pub fn positives(&self) -> usize {
        self.records.iter().filter(|r| r.is_fraud == 1).count()
    }

    /// Keep the schema, replace the rows.
    pub fn with_records(&self, records: Vec<MergedRecord>) -> Self {
        Self {
            columns: self.columns.clone(),
            records,
        }
    }
}

pub(crate) fn fraud_ratio(records: &[MergedRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let positives = records.iter().filter(|r| r.is_fraud == 1).count();
    positives as f64 / records.len() as f64
}
