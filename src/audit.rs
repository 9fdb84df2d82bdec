//! Error-rate audit of the selected model against a labeled dataset version
//!
//! Every merged row of the version is scored; no split is involved.

use crate::error::Result;
use crate::features;
use crate::lifecycle::{check_version, DatasetLifecycle};
use crate::metrics::ConfusionMatrix;
use crate::serving::ServingPipeline;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    pub model: String,
    pub dataset_version: String,
    pub rows: usize,
    pub false_positive_rate: f64,
    pub false_negative_rate: f64,
    pub confusion: ConfusionMatrix,
}

/// Score every row of `dataset_version` with the selected model.
///
/// Rows are transformed with the model's own fitted transform; nothing is refit.
pub fn audit(pipeline: &ServingPipeline, lifecycle: &DatasetLifecycle, dataset_version: &str) -> Result<AuditReport> {
    let fitted = pipeline.fitted_transform()?;
    check_version(dataset_version)?;

    let merged = lifecycle.merged_set(dataset_version)?;
    let scored = features::transform(fitted, &merged)?;
    let predicted = pipeline.predict_matrix(scored.x.view())?;
    let confusion = ConfusionMatrix::from_predictions(scored.y.view(), predicted.view())?;

    let report = AuditReport {
        model: pipeline.model_info().map(|m| m.name).unwrap_or_default(),
        dataset_version: dataset_version.to_string(),
        rows: scored.len(),
        false_positive_rate: confusion.false_positive_rate(),
        false_negative_rate: confusion.false_negative_rate(),
        confusion,
    };

    info!(
        model = %report.model,
        dataset_version,
        rows = report.rows,
        false_positive_rate = report.false_positive_rate,
        false_negative_rate = report.false_negative_rate,
        "Audit finished"
    );
    Ok(report)
}
