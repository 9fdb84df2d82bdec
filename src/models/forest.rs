//! Gini decision trees and a bootstrap random forest over them

use super::{check_training_input, check_width, Classifier};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Random forest configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub n_trees: usize,
    /// Maximum depth of each tree
    pub max_depth: usize,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features considered per split (ceil of sqrt of the width if None)
    pub max_features: Option<usize>,
    /// Bootstrap sampling
    pub bootstrap: bool,
    /// Random seed
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 12,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            bootstrap: true,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct TreeConfig {
    max_depth: usize,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: usize,
    seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        /// Share of fraud rows that reached this leaf
        fraud_probability: f64,
        n_samples: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 1,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

fn gini(positives: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    1.0 - p * p - (1.0 - p) * (1.0 - p)
}

/// Binary classification tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    config: TreeConfig,
    n_features: usize,
    root: Option<Node>,
}

impl DecisionTree {
    fn new(config: TreeConfig) -> Self {
        Self {
            config,
            n_features: 0,
            root: None,
        }
    }

    /// Grow the tree on the given rows. Rows may repeat (bootstrap samples).
    fn grow(&mut self, x: &ArrayView2<f64>, y: &ArrayView1<u8>, rows: &[usize]) {
        self.n_features = x.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        self.root = Some(self.build(x, y, rows, 0, &mut rng));
    }

    fn build(
        &self,
        x: &ArrayView2<f64>,
        y: &ArrayView1<u8>,
        rows: &[usize],
        depth: usize,
        rng: &mut ChaCha8Rng,
    ) -> Node {
        let n = rows.len();
        let positives = rows.iter().filter(|&&i| y[i] == 1).count();
        let impurity = gini(positives, n);

        let leaf = Node::Leaf {
            fraud_probability: if n == 0 { 0.0 } else { positives as f64 / n as f64 },
            n_samples: n,
        };

        if depth >= self.config.max_depth || n < self.config.min_samples_split || impurity < 1e-10 {
            return leaf;
        }

        let Some(split) = self.best_split(x, y, rows, positives, impurity, rng) else {
            return leaf;
        };

        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.iter().copied().partition(|&i| x[[i, split.feature]] <= split.threshold);

        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.build(x, y, &left, depth + 1, rng)),
            right: Box::new(self.build(x, y, &right, depth + 1, rng)),
        }
    }

    /// Best midpoint threshold over a random subset of features, found with one
    /// sorted sweep per feature.
    fn best_split(
        &self,
        x: &ArrayView2<f64>,
        y: &ArrayView1<u8>,
        rows: &[usize],
        positives: usize,
        impurity: f64,
        rng: &mut ChaCha8Rng,
    ) -> Option<SplitCandidate> {
        let n = rows.len();
        let min_leaf = self.config.min_samples_leaf.max(1);

        let mut features: Vec<usize> = (0..x.ncols()).collect();
        features.shuffle(rng);
        features.truncate(self.config.max_features.max(1));

        let mut best: Option<SplitCandidate> = None;
        let mut column: Vec<(f64, u8)> = Vec::with_capacity(n);

        for feature in features {
            column.clear();
            column.extend(rows.iter().map(|&i| (x[[i, feature]], y[i])));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_n = 0usize;
            let mut left_pos = 0usize;
            for k in 0..n - 1 {
                left_n += 1;
                left_pos += usize::from(column[k].1 == 1);

                let (value, next) = (column[k].0, column[k + 1].0);
                if value >= next {
                    continue;
                }
                let right_n = n - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let weighted = (left_n as f64 * gini(left_pos, left_n)
                    + right_n as f64 * gini(positives - left_pos, right_n))
                    / n as f64;
                let gain = impurity - weighted;

                if gain > best.as_ref().map_or(0.0, |b| b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (value + next) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }

    fn predict_proba_row(&self, row: ArrayView1<f64>) -> Option<f64> {
        let mut node = self.root.as_ref()?;
        loop {
            match node {
                Node::Leaf { fraud_probability, .. } => return Some(*fraud_probability),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { &**left } else { &**right };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.root.as_ref().map_or(0, Node::depth)
    }
}

/// Random forest of bootstrap-trained trees; the decision is the mean leaf probability above 0.5.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(config: ForestConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
        }
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    /// Mean fraud probability over all trees, per row.
    pub fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array1<f64>> {
        let first = self
            .trees
            .first()
            .ok_or_else(|| PipelineError::Model("random forest is not fitted".to_string()))?;
        check_width(first.n_features, &x)?;

        let n_trees = self.trees.len() as f64;
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.trees
                    .iter()
                    .filter_map(|tree| tree.predict_proba_row(row))
                    .sum::<f64>()
                    / n_trees
            })
            .collect())
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: ArrayView2<f64>, y: ArrayView1<u8>) -> Result<()> {
        check_training_input(&x, &y)?;
        if self.config.n_trees == 0 {
            return Err(PipelineError::Config("random forest needs at least one tree".to_string()));
        }

        let n = x.nrows();
        let max_features = self
            .config
            .max_features
            .unwrap_or_else(|| (x.ncols() as f64).sqrt().ceil() as usize);

        self.trees = (0..self.config.n_trees)
            .map(|i| {
                let seed = self.config.seed.wrapping_add(i as u64);
                let rows: Vec<usize> = if self.config.bootstrap {
                    let mut rng = ChaCha8Rng::seed_from_u64(seed);
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };

                let mut tree = DecisionTree::new(TreeConfig {
                    max_depth: self.config.max_depth,
                    min_samples_split: self.config.min_samples_split,
                    min_samples_leaf: self.config.min_samples_leaf,
                    max_features,
                    seed,
                });
                tree.grow(&x, &y, &rows);
                tree
            })
            .collect();

        debug!(
            n_trees = self.trees.len(),
            max_depth = self.trees.iter().map(DecisionTree::depth).max().unwrap_or(0),
            "Random forest fitted"
        );
        Ok(())
    }

    fn predict(&self, x: ArrayView2<f64>) -> Result<Array1<u8>> {
        Ok(self.predict_proba(x)?.mapv(|p| u8::from(p > 0.5)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tests::{accuracy, separable};
    use ndarray::array;

    fn small_forest() -> ForestConfig {
        ForestConfig {
            n_trees: 10,
            ..ForestConfig::default()
        }
    }

    #[test]
    fn test_gini() {
        assert_eq!(gini(0, 10), 0.0);
        assert_eq!(gini(5, 10), 0.5);
        assert_eq!(gini(0, 0), 0.0);
    }

    #[test]
    fn test_single_tree_finds_threshold() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![0u8, 0, 0, 1, 1, 1];
        let mut tree = DecisionTree::new(TreeConfig {
            max_depth: 5,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: 1,
            seed: 0,
        });
        tree.grow(&x.view(), &y.view(), &[0, 1, 2, 3, 4, 5]);

        assert_eq!(tree.depth(), 2);
        match tree.root.as_ref().unwrap() {
            Node::Split { feature, threshold, .. } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 6.5);
            }
            Node::Leaf { .. } => panic!("expected a split"),
        }
    }

    #[test]
    fn test_forest_is_reproducible() {
        let (x, y) = separable(200, 21);
        let mut a = RandomForest::new(small_forest());
        let mut b = RandomForest::new(small_forest());
        a.fit(x.view(), y.view()).unwrap();
        b.fit(x.view(), y.view()).unwrap();

        assert_eq!(a.predict_proba(x.view()).unwrap(), b.predict_proba(x.view()).unwrap());
    }

    #[test]
    fn test_forest_accuracy_and_probabilities() {
        let (x, y) = separable(300, 22);
        let (x_test, y_test) = separable(150, 23);
        let mut forest = RandomForest::new(small_forest());
        forest.fit(x.view(), y.view()).unwrap();

        assert_eq!(forest.trees().len(), 10);
        let proba = forest.predict_proba(x_test.view()).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(accuracy(&forest.predict(x_test.view()).unwrap(), &y_test) > 0.85);
    }

    #[test]
    fn test_single_class_training() {
        let (x, _) = separable(30, 24);
        let y = Array1::<u8>::zeros(30);
        let mut forest = RandomForest::new(small_forest());
        forest.fit(x.view(), y.view()).unwrap();
        assert!(forest.predict(x.view()).unwrap().iter().all(|&p| p == 0));
    }
}
