//! Feature derivation for fraud model training and inference.
//!
//! The nine-field feature contract is shared by the batch path (training,
//! holdout and audit sets) and the online path (single request). Imputation
//! and scaling statistics are fit on the training partition only and carried
//! inside the model artifact, so every later path re-applies them unchanged.

mod derive;
pub mod geo;
pub mod transform;

pub use transform::{CategoryEncoder, FittedTransform};

use crate::error::{PipelineError, Result};
use crate::partition::Partition;
use crate::storage::{ArtifactKind, ArtifactStore};
use crate::types::{MergedSet, TransactionRequest};
use derive::{batch_rows, online_row};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

pub const N_FEATURES: usize = 9;

/// Feature names in model input order
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "category_code",
    "merchant_code",
    "merch_lat",
    "merch_long",
    "hour_sin",
    "hour_cos",
    "log_amt",
    "rapid_transactions",
    "distance_km",
];

/// Indices of the categorical codes
pub(crate) const CATEGORICAL: [usize; 2] = [0, 1];

/// Code of a category never seen in training
pub const UNKNOWN_CODE: f64 = -1.0;

pub const ONLINE_RAPID_TRANSACTIONS: f64 = -1.0;
pub const ONLINE_DISTANCE_KM: f64 = 0.0;

/// Merged-set columns the batch path reads
pub const REQUIRED_COLUMNS: [&str; 10] = [
    "trans_date_trans_time",
    "cc_num",
    "category",
    "merchant",
    "amt",
    "merch_lat",
    "merch_long",
    "lat",
    "long",
    "is_fraud",
];

/// One feature row with named fields
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub category_code: f64,
    pub merchant_code: f64,
    pub merch_lat: f64,
    pub merch_long: f64,
    pub hour_sin: f64,
    pub hour_cos: f64,
    pub log_amt: f64,
    pub rapid_transactions: f64,
    pub distance_km: f64,
}

impl FeatureVector {
    /// Values in `FEATURE_NAMES` order
    pub fn to_array(&self) -> [f64; N_FEATURES] {
        [
            self.category_code,
            self.merchant_code,
            self.merch_lat,
            self.merch_long,
            self.hour_sin,
            self.hour_cos,
            self.log_amt,
            self.rapid_transactions,
            self.distance_km,
        ]
    }

    pub fn from_array(values: [f64; N_FEATURES]) -> Self {
        let [category_code, merchant_code, merch_lat, merch_long, hour_sin, hour_cos, log_amt, rapid_transactions, distance_km] =
            values;
        Self {
            category_code,
            merchant_code,
            merch_lat,
            merch_long,
            hour_sin,
            hour_cos,
            log_amt,
            rapid_transactions,
            distance_km,
        }
    }
}

/// Online feature row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OnlineRow {
    /// Derived values before imputation and scaling, sentinels included
    pub raw: FeatureVector,
    /// Model input
    pub scaled: Array1<f64>,
}

/// Standardized feature matrix with targets, keyed by `trans_num`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub keys: Vec<String>,
    pub x: Array2<f64>,
    pub y: Array1<u8>,
}

impl FeatureMatrix {
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn describe(&self) -> MatrixDescription {
        let null_counts = FEATURE_NAMES
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let nulls = self.x.column(j).iter().filter(|v| !v.is_finite()).count();
                (name.to_string(), nulls)
            })
            .collect();
        let positives = self.y.iter().filter(|&&label| label == 1).count();

        MatrixDescription {
            shape: self.x.dim(),
            columns: FEATURE_NAMES.iter().map(|c| c.to_string()).collect(),
            null_counts,
            fraud_ratio: if self.is_empty() {
                0.0
            } else {
                positives as f64 / self.len() as f64
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixDescription {
    pub shape: (usize, usize),
    pub columns: Vec<String>,
    pub null_counts: BTreeMap<String, usize>,
    pub fraud_ratio: f64,
}

/// Versioned train/holdout features with the transform fit on the train side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSet {
    pub version: String,
    pub train: FeatureMatrix,
    pub holdout: FeatureMatrix,
    pub transform: FittedTransform,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureSetDescription {
    pub version: String,
    pub train: MatrixDescription,
    pub holdout: MatrixDescription,
}

impl FeatureSet {
    /// Fit on the train side of a partition and transform both sides.
    pub fn derive(version: &str, partition: &Partition) -> Result<Self> {
        let (train, fitted) = fit_transform(&partition.train)?;
        let holdout = transform(&fitted, &partition.holdout)?;

        info!(
            version,
            train_rows = train.len(),
            holdout_rows = holdout.len(),
            categories = fitted.category.classes().len(),
            merchants = fitted.merchant.classes().len(),
            "Feature set derived"
        );

        Ok(Self {
            version: version.to_string(),
            train,
            holdout,
            transform: fitted,
        })
    }

    pub fn describe(&self) -> FeatureSetDescription {
        FeatureSetDescription {
            version: self.version.clone(),
            train: self.train.describe(),
            holdout: self.holdout.describe(),
        }
    }
}

/// Fail with `SchemaError` listing every required column the set lacks.
pub fn check_schema(set: &MergedSet) -> Result<()> {
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !set.has_column(c))
        .map(|c| c.to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Schema(missing))
    }
}

/// Fit encoders, imputation and scaling on a training set and transform it.
pub fn fit_transform(train: &MergedSet) -> Result<(FeatureMatrix, FittedTransform)> {
    check_schema(train)?;
    if train.is_empty() {
        return Err(PipelineError::InsufficientData(
            "cannot fit features on an empty training set".to_string(),
        ));
    }

    let category = CategoryEncoder::fit(train.records.iter().filter_map(|r| r.category.as_deref()));
    let merchant = CategoryEncoder::fit(train.records.iter().filter_map(|r| r.merchant.as_deref()));

    let batch = batch_rows(&train.records, &category, &merchant);
    let fitted = FittedTransform::fit(category, merchant, &batch.rows);
    debug!(fill = ?fitted.fill, mean = ?fitted.mean, scale = ?fitted.scale, "Feature transform fitted");

    let matrix = FeatureMatrix {
        x: fitted.apply_rows(&batch.rows),
        y: Array1::from(batch.labels),
        keys: batch.keys,
    };
    Ok((matrix, fitted))
}

/// Transform another set with already fitted statistics.
pub fn transform(fitted: &FittedTransform, other: &MergedSet) -> Result<FeatureMatrix> {
    check_schema(other)?;
    let batch = batch_rows(&other.records, &fitted.category, &fitted.merchant);

    Ok(FeatureMatrix {
        x: fitted.apply_rows(&batch.rows),
        y: Array1::from(batch.labels),
        keys: batch.keys,
    })
}

/// Derive the model input for a single validated request.
pub fn transform_single(fitted: &FittedTransform, request: &TransactionRequest) -> Result<OnlineRow> {
    request.validate()?;
    let raw = online_row(fitted, request)?;
    let scaled = Array1::from(fitted.apply(&raw.to_array()).to_vec());
    Ok(OnlineRow { raw, scaled })
}

/// Persist a feature set under its version tag.
pub fn load(store: &ArtifactStore, features: &FeatureSet) -> Result<()> {
    let path = store.save(ArtifactKind::FeatureSet, &features.version, features)?;
    info!(version = %features.version, path = %path.display(), "Feature set stored");
    Ok(())
}
