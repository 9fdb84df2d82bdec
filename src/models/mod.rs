//! Fraud classifiers and the persisted model artifact

pub mod artifact;
pub mod forest;
pub mod logistic;
pub mod svm;

pub use artifact::ModelArtifact;
pub use forest::{DecisionTree, ForestConfig, RandomForest};
pub use logistic::{LogisticConfig, LogisticRegression};
pub use svm::{LinearSvm, SvmConfig};

use crate::config::ModelsConfig;
use crate::error::{PipelineError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Binary classifier capability shared by every model variant
pub trait Classifier {
    /// Fit on a standardized feature matrix and 0/1 targets.
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Result<()>;

    /// Predict 0/1 decisions, one per row.
    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<u8>>;
}

/// Supported classifier variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LogisticRegression,
    RandomForest,
    Svm,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [ModelKind::LogisticRegression, ModelKind::RandomForest, ModelKind::Svm];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::LogisticRegression => "logistic_regression",
            ModelKind::RandomForest => "random_forest",
            ModelKind::Svm => "svm",
        }
    }
}

impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| PipelineError::UnknownModelKind(s.to_string()))
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classifier of any supported kind
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ClassifierModel {
    LogisticRegression(LogisticRegression),
    RandomForest(RandomForest),
    Svm(LinearSvm),
}

impl ClassifierModel {
    /// Unfitted classifier of a kind, configured from the `[models]` table.
    pub fn new(kind: ModelKind, config: &ModelsConfig) -> Self {
        match kind {
            ModelKind::LogisticRegression => {
                ClassifierModel::LogisticRegression(LogisticRegression::new(config.logistic_regression.clone()))
            }
            ModelKind::RandomForest => ClassifierModel::RandomForest(RandomForest::new(config.random_forest.clone())),
            ModelKind::Svm => ClassifierModel::Svm(LinearSvm::new(config.svm.clone())),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ClassifierModel::LogisticRegression(_) => ModelKind::LogisticRegression,
            ClassifierModel::RandomForest(_) => ModelKind::RandomForest,
            ClassifierModel::Svm(_) => ModelKind::Svm,
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            ClassifierModel::LogisticRegression(m) => m,
            ClassifierModel::RandomForest(m) => m,
            ClassifierModel::Svm(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            ClassifierModel::LogisticRegression(m) => m,
            ClassifierModel::RandomForest(m) => m,
            ClassifierModel::Svm(m) => m,
        }
    }
}

impl Classifier for ClassifierModel {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<u8>> {
        self.inner().predict(x)
    }
}

/// Reject empty or misaligned training input.
pub(crate) fn check_training_input(x: &ArrayView2<f64>, y: &ArrayView1<u8>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(PipelineError::InsufficientData("no training rows".to_string()));
    }
    if x.nrows() != y.len() {
        return Err(PipelineError::Model(format!(
            "{} feature rows but {} targets",
            x.nrows(),
            y.len()
        )));
    }
    Ok(())
}

/// Reject a prediction matrix whose width differs from the fitted one.
pub(crate) fn check_width(expected: usize, x: &ArrayView2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(PipelineError::Model(format!(
            "expected {} features, got {}",
            expected,
            x.ncols()
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    /// Two informative columns plus noise; label is `x0 + x1 > 0` with a margin.
    pub(crate) fn separable(n: usize, seed: u64) -> (Array2<f64>, Array1<u8>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut x = Array2::zeros((n, 4));
        let mut y = Array1::zeros(n);
        let mut i = 0;
        while i < n {
            let a: f64 = rng.gen_range(-2.0..2.0);
            let b: f64 = rng.gen_range(-2.0..2.0);
            if (a + b).abs() < 0.3 {
                continue;
            }
            x[[i, 0]] = a;
            x[[i, 1]] = b;
            x[[i, 2]] = rng.gen_range(-1.0..1.0);
            x[[i, 3]] = rng.gen_range(-1.0..1.0);
            y[i] = u8::from(a + b > 0.0);
            i += 1;
        }
        (x, y)
    }

    pub(crate) fn accuracy(predicted: &Array1<u8>, actual: &Array1<u8>) -> f64 {
        let correct = predicted.iter().zip(actual).filter(|(p, a)| p == a).count();
        correct as f64 / actual.len() as f64
    }

    #[test]
    fn test_kind_names() {
        for kind in ModelKind::ALL {
            assert_eq!(kind.as_str().parse::<ModelKind>().unwrap(), kind);
        }
        assert!(matches!(
            "gradient_boosting".parse::<ModelKind>(),
            Err(PipelineError::UnknownModelKind(name)) if name == "gradient_boosting"
        ));
    }

    #[test]
    fn test_every_kind_learns_separable_data() {
        let (x, y) = separable(400, 1);
        let (x_test, y_test) = separable(200, 2);
        let mut config = ModelsConfig::default();
        config.random_forest.n_trees = 15;

        for kind in ModelKind::ALL {
            let mut model = ClassifierModel::new(kind, &config);
            assert_eq!(model.kind(), kind);
            model.fit(x.view(), y.view()).unwrap();

            let predicted = model.predict(x_test.view()).unwrap();
            let acc = accuracy(&predicted, &y_test);
            assert!(acc > 0.9, "{} accuracy {}", kind, acc);
        }
    }

    #[test]
    fn test_unfitted_and_misaligned_input() {
        let (x, y) = separable(20, 3);
        for kind in ModelKind::ALL {
            let mut model = ClassifierModel::new(kind, &ModelsConfig::default());
            assert!(matches!(model.predict(x.view()), Err(PipelineError::Model(_))));
            assert!(model.fit(x.view(), y.slice(ndarray::s![..10])).is_err());
        }
    }
}
