//! Linear soft-margin SVM trained with Pegasos (stochastic sub-gradient on the hinge loss)

use super::{check_training_input, check_width, Classifier};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SvmConfig {
    /// Regularization strength
    pub lambda: f64,
    /// Passes over the training rows
    pub epochs: usize,
    /// Seed of the per-epoch row order
    pub seed: u64,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            lambda: 1e-3,
            epochs: 20,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearSvm {
    config: SvmConfig,
    /// Feature weights followed by the bias
    weights: Option<Array1<f64>>,
}

impl LinearSvm {
    pub fn new(config: SvmConfig) -> Self {
        Self { config, weights: None }
    }

    fn margin(weights: &Array1<f64>, row: ArrayView1<f64>) -> f64 {
        let width = row.len();
        row.dot(&weights.slice(ndarray::s![..width])) + weights[width]
    }

    /// Signed distance-like score per row; positive means fraud.
    pub fn decision_function(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let weights = self
            .weights
            .as_ref()
            .ok_or_else(|| PipelineError::Model("svm is not fitted".to_string()))?;
        check_width(weights.len() - 1, &x)?;

        Ok(x.rows().into_iter().map(|row| Self::margin(weights, row)).collect())
    }
}

impl Classifier for LinearSvm {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Result<()> {
        check_training_input(&x, &y)?;
        let lambda = self.config.lambda;
        if !(lambda > 0.0) {
            return Err(PipelineError::Config(format!("svm lambda must be positive, got {}", lambda)));
        }

        let width = x.ncols();
        let radius = 1.0 / lambda.sqrt();
        let mut weights = Array1::<f64>::zeros(width + 1);
        let mut order: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut t = 0usize;

        for _ in 0..self.config.epochs {
            order.shuffle(&mut rng);
            let mut violations = 0usize;

            for &i in &order {
                t += 1;
                let eta = 1.0 / (lambda * t as f64);
                let label = if y[i] == 1 { 1.0 } else { -1.0 };
                let row = x.row(i);
                let margin = label * Self::margin(&weights, row);

                weights *= 1.0 - eta * lambda;
                if margin < 1.0 {
                    violations += 1;
                    weights.slice_mut(ndarray::s![..width]).scaled_add(eta * label, &row);
                    weights[width] += eta * label;
                }

                // Project back onto the ball of radius 1/sqrt(lambda).
                let norm = weights.dot(&weights).sqrt();
                if norm > radius {
                    weights *= radius / norm;
                }
            }

            debug!(steps = t, violations, "Svm epoch finished");
        }

        self.weights = Some(weights);
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<u8>> {
        Ok(self.decision_function(x)?.mapv(|score| u8::from(score > 0.0)))
    }
}
