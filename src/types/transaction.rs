//! Single-transaction request schema used by online scoring

use crate::error::{PipelineError, Result};
use crate::etl::dates::parse_timestamp;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// An unlabeled transaction submitted for scoring.
///
/// Every field is optional at the type level so that validation can report all
/// missing fields at once; [`TransactionRequest::validate`] enforces presence.
/// Fields outside this schema are rejected at deserialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransactionRequest {
    /// Transaction identifier (informational)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trans_num: Option<String>,

    /// Transaction timestamp, e.g. "2020-06-21 12:14:25"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trans_date_trans_time: Option<String>,

    /// Card identifier
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc_num: Option<u64>,

    /// Transaction time as unix seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unix_time: Option<i64>,

    /// Merchant name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,

    /// Merchant category
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// Transaction amount
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amt: Option<f64>,

    /// Merchant latitude
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merch_lat: Option<f64>,

    /// Merchant longitude
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merch_long: Option<f64>,
}

impl TransactionRequest {
    /// Parse a JSON payload, rejecting malformed input and unknown fields.
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| PipelineError::Validation(e.to_string()))
    }

    /// Names of required fields that are absent, in schema order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let checks = [
            ("trans_date_trans_time", self.trans_date_trans_time.is_some()),
            ("cc_num", self.cc_num.is_some()),
            ("unix_time", self.unix_time.is_some()),
            ("merchant", self.merchant.is_some()),
            ("category", self.category.is_some()),
            ("amt", self.amt.is_some()),
            ("merch_lat", self.merch_lat.is_some()),
            ("merch_long", self.merch_long.is_some()),
        ];

        checks
            .iter()
            .filter(|(_, present)| !present)
            .map(|(name, _)| *name)
            .collect()
    }

    /// Fail with a validation error naming every missing required field.
    pub fn validate(&self) -> Result<()> {
        let missing = self.missing_fields();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }

    /// Parsed transaction timestamp.
    pub fn timestamp(&self) -> Result<NaiveDateTime> {
        let raw = self
            .trans_date_trans_time
            .as_deref()
            .ok_or_else(|| PipelineError::Validation("missing trans_date_trans_time".into()))?;
        parse_timestamp(raw).ok_or_else(|| {
            PipelineError::Validation(format!("unparseable trans_date_trans_time {:?}", raw))
        })
    }

    /// Stable serialization used as the prediction-history key.
    ///
    /// Keys are sorted and absent fields omitted, so logically identical
    /// requests always map to the same string.
    pub fn canonical_key(&self) -> Result<String> {
        let value = serde_json::to_value(self)
            .map_err(|e| PipelineError::Validation(e.to_string()))?;
        Ok(value.to_string())
    }
}
