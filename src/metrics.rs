//! Classification metrics and serving statistics for the fraud pipeline.

use crate::error::{PipelineError, Result};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

/// Latency samples kept for percentile estimates
const LATENCY_WINDOW: usize = 10_000;

/// Binary confusion matrix, fraud being the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_positives: u64,
    pub false_positives: u64,
    pub true_negatives: u64,
    pub false_negatives: u64,
}

impl ConfusionMatrix {
    /// Count decisions against labels.
    pub fn from_predictions(actual: ArrayView1<u8>, predicted: ArrayView1<u8>) -> Result<Self> {
        if actual.len() != predicted.len() {
            return Err(PipelineError::Model(format!(
                "{} labels but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }

        let mut matrix = Self::default();
        for (&a, &p) in actual.iter().zip(predicted.iter()) {
            match (a == 1, p == 1) {
                (true, true) => matrix.true_positives += 1,
                (false, true) => matrix.false_positives += 1,
                (false, false) => matrix.true_negatives += 1,
                (true, false) => matrix.false_negatives += 1,
            }
        }
        Ok(matrix)
    }

    pub fn total(&self) -> u64 {
        self.true_positives + self.false_positives + self.true_negatives + self.false_negatives
    }

    /// FP / (FP + TN), 0 when there are no negatives
    pub fn false_positive_rate(&self) -> f64 {
        ratio(self.false_positives, self.false_positives + self.true_negatives)
    }

    /// FN / (FN + TP), 0 when there are no positives
    pub fn false_negative_rate(&self) -> f64 {
        ratio(self.false_negatives, self.false_negatives + self.true_positives)
    }

    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_positives)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Holdout scores of a trained model
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub accuracy: f64,
    pub false_positive_rate: f64,
    pub false_negative_rate: f64,
    pub confusion: ConfusionMatrix,
}

impl From<ConfusionMatrix> for ClassificationMetrics {
    fn from(confusion: ConfusionMatrix) -> Self {
        Self {
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
            accuracy: confusion.accuracy(),
            false_positive_rate: confusion.false_positive_rate(),
            false_negative_rate: confusion.false_negative_rate(),
            confusion,
        }
    }
}

impl ClassificationMetrics {
    pub fn evaluate(actual: ArrayView1<u8>, predicted: ArrayView1<u8>) -> Result<Self> {
        ConfusionMatrix::from_predictions(actual, predicted).map(Self::from)
    }
}

/// Online prediction counters of a serving pipeline
#[derive(Debug, Default)]
pub struct ServingStats {
    predictions: u64,
    flagged: u64,
    failures: u64,
    /// Latencies in microseconds, most recent last
    latencies: Vec<u64>,
}

impl ServingStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed prediction
    pub fn record_prediction(&mut self, latency: Duration, flagged: bool) {
        self.predictions += 1;
        if flagged {
            self.flagged += 1;
        }

        self.latencies.push(latency.as_micros() as u64);
        if self.latencies.len() > LATENCY_WINDOW {
            self.latencies.drain(0..LATENCY_WINDOW / 2);
        }
    }

    /// Record a rejected or failed prediction
    pub fn record_failure(&mut self) {
        self.failures += 1;
    }

    pub fn predictions(&self) -> u64 {
        self.predictions
    }

    pub fn flagged(&self) -> u64 {
        self.flagged
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Latency statistics over the retained window
    pub fn latency_stats(&self) -> LatencyStats {
        if self.latencies.is_empty() {
            return LatencyStats::default();
        }

        let mut sorted = self.latencies.clone();
        sorted.sort_unstable();
        let count = sorted.len();
        let percentile = |q: f64| sorted[((count as f64 * q) as usize).min(count - 1)];

        LatencyStats {
            count: count as u64,
            mean_us: sorted.iter().sum::<u64>() / count as u64,
            p50_us: percentile(0.50),
            p95_us: percentile(0.95),
            p99_us: percentile(0.99),
            max_us: sorted[count - 1],
        }
    }

    /// Log a summary of the counters
    pub fn log_summary(&self) {
        let flag_rate = if self.predictions > 0 {
            (self.flagged as f64 / self.predictions as f64) * 100.0
        } else {
            0.0
        };
        let latency = self.latency_stats();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║               FRAUD SERVING PIPELINE - SUMMARY               ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Predictions: {:>8}  │  Flagged: {:>6} ({:>5.1}%)  │  Failed: {:>5} ║",
            self.predictions, self.flagged, flag_rate, self.failures
        );
        info!(
            "║ Latency (μs): mean={:>5} p50={:>5} p95={:>5} p99={:>5}      ║",
            latency.mean_us, latency.p50_us, latency.p95_us, latency.p99_us
        );
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

/// Prediction latency statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_confusion_and_rates() {
        let actual = array![1u8, 1, 0, 0, 0, 1];
        let predicted = array![1u8, 0, 0, 1, 0, 1];
        let m = ConfusionMatrix::from_predictions(actual.view(), predicted.view()).unwrap();

        assert_eq!(
            m,
            ConfusionMatrix {
                true_positives: 2,
                false_positives: 1,
                true_negatives: 2,
                false_negatives: 1,
            }
        );
        assert!((m.false_positive_rate() - 1.0 / 3.0).abs() < 1e-12);
        assert!((m.false_negative_rate() - 1.0 / 3.0).abs() < 1e-12);
        assert!((m.precision() - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(m.accuracy(), 4.0 / 6.0);
    }

    #[test]
    fn test_zero_denominators_are_zero() {
        // No positives at all, nothing flagged.
        let actual = array![0u8, 0, 0];
        let metrics = ClassificationMetrics::evaluate(actual.view(), actual.view()).unwrap();

        assert_eq!(metrics.precision, 0.0);
        assert_eq!(metrics.recall, 0.0);
        assert_eq!(metrics.f1, 0.0);
        assert_eq!(metrics.false_negative_rate, 0.0);
        assert_eq!(metrics.false_positive_rate, 0.0);
        assert_eq!(metrics.accuracy, 1.0);

        let empty = ConfusionMatrix::default();
        assert_eq!(empty.false_positive_rate(), 0.0);
        assert_eq!(empty.accuracy(), 0.0);
    }

    #[test]
    fn test_length_mismatch() {
        let actual = array![0u8, 1];
        let predicted = array![0u8];
        assert!(ConfusionMatrix::from_predictions(actual.view(), predicted.view()).is_err());
    }

    #[test]
    fn test_serving_stats() {
        let mut stats = ServingStats::new();
        stats.record_prediction(Duration::from_micros(100), false);
        stats.record_prediction(Duration::from_micros(300), true);
        stats.record_failure();

        assert_eq!(stats.predictions(), 2);
        assert_eq!(stats.flagged(), 1);
        assert_eq!(stats.failures(), 1);

        let latency = stats.latency_stats();
        assert_eq!(latency.count, 2);
        assert_eq!(latency.mean_us, 200);
        assert_eq!(latency.max_us, 300);
        assert_eq!(latency.p50_us, 300);
    }
}
