//! L2-regularized logistic regression trained by batch gradient descent

use super::{check_training_input, check_width, Classifier};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticConfig {
    pub learning_rate: f64,
    pub max_iter: usize,
    /// Stop once the log loss improves by less than this
    pub tolerance: f64,
    /// L2 penalty on the coefficients (the intercept is not penalized)
    pub l2: f64,
    /// Probability at or above which a row is flagged
    pub threshold: f64,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            max_iter: 1000,
            tolerance: 1e-6,
            l2: 1e-4,
            threshold: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    config: LogisticConfig,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl LogisticRegression {
    pub fn new(config: LogisticConfig) -> Self {
        Self {
            config,
            coefficients: None,
            intercept: 0.0,
        }
    }

    /// Numerically stable sigmoid
    fn sigmoid(z: f64) -> f64 {
        if z >= 0.0 {
            1.0 / (1.0 + (-z).exp())
        } else {
            let exp_z = z.exp();
            exp_z / (1.0 + exp_z)
        }
    }

    fn log_loss(y: &Array1<f64>, p: &Array1<f64>) -> f64 {
        let eps = 1e-15;
        -y.iter()
            .zip(p.iter())
            .map(|(&y, &p)| {
                let p = p.clamp(eps, 1.0 - eps);
                y * p.ln() + (1.0 - y) * (1.0 - p).ln()
            })
            .sum::<f64>()
            / y.len() as f64
    }

    /// Fraud probability per row.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let weights = self
            .coefficients
            .as_ref()
            .ok_or_else(|| PipelineError::Model("logistic regression is not fitted".to_string()))?;
        check_width(weights.len(), &x)?;

        Ok((x.dot(weights) + self.intercept).mapv(Self::sigmoid))
    }

    pub fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Result<()> {
        check_training_input(&x, &y)?;
        let n = x.nrows() as f64;
        let y = y.mapv(f64::from);

        let mut weights = Array1::<f64>::zeros(x.ncols());
        let mut bias = 0.0;
        let mut previous_cost = f64::INFINITY;

        for iter in 0..self.config.max_iter {
            let predictions = (x.dot(&weights) + bias).mapv(Self::sigmoid);
            let errors = &predictions - &y;

            let dw = x.t().dot(&errors) / n + &weights * self.config.l2;
            let db = errors.sum() / n;
            weights = weights - dw * self.config.learning_rate;
            bias -= self.config.learning_rate * db;

            let cost = Self::log_loss(&y, &predictions);
            if (previous_cost - cost).abs() < self.config.tolerance {
                debug!(iter, cost, "Logistic regression converged");
                break;
            }
            previous_cost = cost;
        }

        self.coefficients = Some(weights);
        self.intercept = bias;
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<u8>> {
        let threshold = self.config.threshold;
        Ok(self.predict_proba(x)?.mapv(|p| u8::from(p >= threshold)))
    }
}
