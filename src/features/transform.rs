//! Fitted encoding, imputation and scaling statistics
//!
//! Everything here is fit once on the training partition and then re-applied
//! unchanged to holdout, audit and online rows.

use super::{CATEGORICAL, N_FEATURES, UNKNOWN_CODE};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Maps category labels to their index in the sorted distinct training values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    classes: Vec<String>,
}

impl CategoryEncoder {
    pub fn fit<'a, I>(values: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let classes: BTreeSet<&str> = values.into_iter().collect();
        Self {
            classes: classes.into_iter().map(str::to_string).collect(),
        }
    }

    /// Code of a value: its class index, `UNKNOWN_CODE` when unseen, NaN when absent.
    pub fn encode(&self, value: Option<&str>) -> f64 {
        match value {
            None => f64::NAN,
            Some(v) => match self.classes.binary_search_by(|c| c.as_str().cmp(v)) {
                Ok(index) => index as f64,
                Err(_) => UNKNOWN_CODE,
            },
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

/// Category encoders plus imputation fills and standardization statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedTransform {
    pub category: CategoryEncoder,
    pub merchant: CategoryEncoder,
    /// Training mean for numeric fields, training mode for categorical codes
    pub fill: [f64; N_FEATURES],
    pub mean: [f64; N_FEATURES],
    /// Population standard deviation, 1 where it is zero
    pub scale: [f64; N_FEATURES],
}

impl FittedTransform {
    /// Fit imputation and scaling on raw training rows (NaN marks a missing value).
    pub(crate) fn fit(
        category: CategoryEncoder,
        merchant: CategoryEncoder,
        rows: &[[f64; N_FEATURES]],
    ) -> Self {
        let mut fill = [0.0; N_FEATURES];
        for (j, slot) in fill.iter_mut().enumerate() {
            let observed = rows.iter().map(|r| r[j]).filter(|v| v.is_finite());
            *slot = if CATEGORICAL.contains(&j) {
                mode(observed).unwrap_or(UNKNOWN_CODE)
            } else {
                mean(observed).unwrap_or(0.0)
            };
        }

        let imputed: Vec<[f64; N_FEATURES]> = rows.iter().map(|r| impute(r, &fill)).collect();

        let mut mean_ = [0.0; N_FEATURES];
        let mut scale = [1.0; N_FEATURES];
        for j in 0..N_FEATURES {
            let m = mean(imputed.iter().map(|r| r[j])).unwrap_or(0.0);
            let variance = mean(imputed.iter().map(|r| (r[j] - m).powi(2))).unwrap_or(0.0);
            let std = variance.sqrt();
            mean_[j] = m;
            // Rounding noise on a constant column is not spread.
            let floor = 10.0 * f64::EPSILON * m.abs().max(1.0);
            scale[j] = if std > floor && std.is_finite() { std } else { 1.0 };
        }

        Self {
            category,
            merchant,
            fill,
            mean: mean_,
            scale,
        }
    }

    /// Replace missing values with the fitted fills.
    pub fn impute(&self, row: &[f64; N_FEATURES]) -> [f64; N_FEATURES] {
        impute(row, &self.fill)
    }

    /// Standardize an imputed row.
    pub fn scale(&self, row: &[f64; N_FEATURES]) -> [f64; N_FEATURES] {
        let mut out = [0.0; N_FEATURES];
        for j in 0..N_FEATURES {
            out[j] = (row[j] - self.mean[j]) / self.scale[j];
        }
        out
    }

    /// Impute then standardize.
    pub fn apply(&self, row: &[f64; N_FEATURES]) -> [f64; N_FEATURES] {
        self.scale(&self.impute(row))
    }

    pub(crate) fn apply_rows(&self, rows: &[[f64; N_FEATURES]]) -> Array2<f64> {
        let mut x = Array2::zeros((rows.len(), N_FEATURES));
        for (i, row) in rows.iter().enumerate() {
            for (j, v) in self.apply(row).into_iter().enumerate() {
                x[[i, j]] = v;
            }
        }
        x
    }
}

fn impute(row: &[f64; N_FEATURES], fill: &[f64; N_FEATURES]) -> [f64; N_FEATURES] {
    let mut out = *row;
    for (v, f) in out.iter_mut().zip(fill) {
        if !v.is_finite() {
            *v = *f;
        }
    }
    out
}

fn mean<I: Iterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// Most frequent code; the smallest code wins ties.
fn mode<I: Iterator<Item = f64>>(values: I) -> Option<f64> {
    let mut counts: BTreeMap<i64, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v as i64).or_default() += 1;
    }
    let mut best: Option<(i64, usize)> = None;
    for (code, count) in counts {
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((code, count));
        }
    }
    best.map(|(code, _)| code as f64)
}
