//! CART regression trees and the random-forest ensemble.
//!
//! Trees split on the feature/threshold pair that most reduces the total
//! squared error of the target values; leaves predict the mean of their
//! samples. The forest averages trees fitted on bootstrap samples. Fitting
//! with a seed is fully deterministic.

use std::cmp::Ordering;

use rand::distributions::{Distribution, Uniform};
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::dataset::Matrix;
use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f32,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
    Leaf {
        value: f32,
        n_samples: usize,
    },
}

impl TreeNode {
    pub fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Single CART regression tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTreeRegressor {
    root: Option<TreeNode>,
    n_features: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
}

impl DecisionTreeRegressor {
    pub fn new() -> Self {
        Self {
            root: None,
            n_features: 0,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    pub fn fit(&mut self, x: &Matrix, y: &[f32]) -> Result<()> {
        let (n_samples, n_features) = x.shape();
        if n_samples != y.len() {
            return Err(CoreError::ShapeMismatch {
                expected: format!("{n_samples} targets"),
                actual: format!("{} targets", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(CoreError::Dataset("cannot fit on zero samples".into()));
        }

        let rows: Vec<usize> = (0..n_samples).collect();
        self.n_features = n_features;
        self.root = Some(self.build_node(x, y, &rows, 0));
        Ok(())
    }

    /// Predicts one sample. The row must have the training feature count.
    pub fn predict_row(&self, row: &[f32]) -> Result<f32> {
        let mut node = self.root.as_ref().ok_or(CoreError::NotFitted)?;
        if row.len() != self.n_features {
            return Err(CoreError::ShapeMismatch {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", row.len()),
            });
        }
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return Ok(*value),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f32>> {
        (0..x.n_rows()).map(|i| self.predict_row(x.row(i))).collect()
    }

    fn build_node(&self, x: &Matrix, y: &[f32], rows: &[usize], depth: usize) -> TreeNode {
        let n = rows.len();
        let (mean, sse) = mean_and_sse(y, rows);
        let depth_reached = self.max_depth.is_some_and(|d| depth >= d);
        if n < self.min_samples_split || depth_reached || sse < 1e-10 {
            return TreeNode::Leaf {
                value: mean,
                n_samples: n,
            };
        }

        let Some((feature, threshold)) = best_split(x, y, rows, sse, self.min_samples_leaf) else {
            return TreeNode::Leaf {
                value: mean,
                n_samples: n,
            };
        };

        let mut left_rows = Vec::new();
        let mut right_rows = Vec::new();
        for &row in rows {
            if x.get(row, feature) <= threshold {
                left_rows.push(row);
            } else {
                right_rows.push(row);
            }
        }
        if left_rows.len() < self.min_samples_leaf || right_rows.len() < self.min_samples_leaf {
            return TreeNode::Leaf {
                value: mean,
                n_samples: n,
            };
        }

        TreeNode::Split {
            feature,
            threshold,
            left: Box::new(self.build_node(x, y, &left_rows, depth + 1)),
            right: Box::new(self.build_node(x, y, &right_rows, depth + 1)),
        }
    }
}

impl Default for DecisionTreeRegressor {
    fn default() -> Self {
        Self::new()
    }
}

/// Mean and total squared error of the selected targets.
fn mean_and_sse(y: &[f32], rows: &[usize]) -> (f32, f64) {
    let n = rows.len() as f64;
    if rows.is_empty() {
        return (0.0, 0.0);
    }
    let sum: f64 = rows.iter().map(|&i| f64::from(y[i])).sum();
    let sum_sq: f64 = rows.iter().map(|&i| f64::from(y[i]).powi(2)).sum();
    let mean = sum / n;
    ((mean as f32), (sum_sq - sum * sum / n).max(0.0))
}

/// Best (feature, threshold) by total squared error, using a sorted sweep
/// with prefix sums per feature. Returns None when no split improves on the
/// parent error.
fn best_split(
    x: &Matrix,
    y: &[f32],
    rows: &[usize],
    parent_sse: f64,
    min_samples_leaf: usize,
) -> Option<(usize, f32)> {
    let n = rows.len();
    let total_sum: f64 = rows.iter().map(|&i| f64::from(y[i])).sum();
    let total_sq: f64 = rows.iter().map(|&i| f64::from(y[i]).powi(2)).sum();

    let mut best_sse = parent_sse;
    let mut best: Option<(usize, f32)> = None;
    let mut order: Vec<usize> = Vec::with_capacity(n);

    for feature in 0..x.n_cols() {
        order.clear();
        order.extend_from_slice(rows);
        order.sort_by(|&a, &b| {
            x.get(a, feature)
                .partial_cmp(&x.get(b, feature))
                .unwrap_or(Ordering::Equal)
        });

        let mut left_sum = 0.0f64;
        let mut left_sq = 0.0f64;
        for i in 0..n - 1 {
            let target = f64::from(y[order[i]]);
            left_sum += target;
            left_sq += target * target;

            let value = x.get(order[i], feature);
            let next = x.get(order[i + 1], feature);
            if value == next {
                continue; // no boundary between equal values
            }
            let n_left = i + 1;
            let n_right = n - n_left;
            if n_left < min_samples_leaf || n_right < min_samples_leaf {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / n_left as f64).max(0.0)
                + (right_sq - right_sum * right_sum / n_right as f64).max(0.0);
            if sse < best_sse {
                best_sse = sse;
                best = Some((feature, (value + next) / 2.0));
            }
        }
    }

    best
}

/// Ensemble of regression trees fitted on bootstrap samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    trees: Vec<DecisionTreeRegressor>,
    n_estimators: usize,
    max_depth: Option<usize>,
    seed: Option<u64>,
}

impl RandomForestRegressor {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            trees: Vec::new(),
            n_estimators,
            max_depth: None,
            seed: None,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn n_estimators(&self) -> usize {
        self.n_estimators
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Fits one tree per estimator on a bootstrap sample. With a seed set,
    /// tree `i` draws from `seed + i`, so refitting on the same data gives
    /// an identical forest.
    pub fn fit(&mut self, x: &Matrix, y: &[f32]) -> Result<()> {
        let (n_samples, _) = x.shape();
        if n_samples != y.len() {
            return Err(CoreError::ShapeMismatch {
                expected: format!("{n_samples} targets"),
                actual: format!("{} targets", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(CoreError::Dataset("cannot fit on zero samples".into()));
        }
        if self.n_estimators == 0 {
            return Err(CoreError::Dataset("n_estimators must be at least 1".into()));
        }

        self.trees = Vec::with_capacity(self.n_estimators);
        for i in 0..self.n_estimators {
            let tree_seed = self.seed.map(|s| s.wrapping_add(i as u64));
            let indices = bootstrap_sample(n_samples, tree_seed);
            let sample_x = x.select_rows(&indices);
            let sample_y: Vec<f32> = indices.iter().map(|&idx| y[idx]).collect();

            let mut tree = DecisionTreeRegressor::new();
            if let Some(depth) = self.max_depth {
                tree = tree.with_max_depth(depth);
            }
            tree.fit(&sample_x, &sample_y)?;
            self.trees.push(tree);
        }
        Ok(())
    }

    /// Averages the per-tree predictions for one sample.
    pub fn predict_row(&self, row: &[f32]) -> Result<f32> {
        if self.trees.is_empty() {
            return Err(CoreError::NotFitted);
        }
        let mut sum = 0.0f64;
        for tree in &self.trees {
            sum += f64::from(tree.predict_row(row)?);
        }
        Ok((sum / self.trees.len() as f64) as f32)
    }

    pub fn predict(&self, x: &Matrix) -> Result<Vec<f32>> {
        (0..x.n_rows()).map(|i| self.predict_row(x.row(i))).collect()
    }
}

/// Draws `n_samples` indices with replacement, seeded when reproducibility
/// is required.
fn bootstrap_sample(n_samples: usize, seed: Option<u64>) -> Vec<usize> {
    let dist = Uniform::from(0..n_samples);
    let mut indices = Vec::with_capacity(n_samples);
    match seed {
        Some(seed) => {
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            for _ in 0..n_samples {
                indices.push(dist.sample(&mut rng));
            }
        }
        None => {
            let mut rng = rand::thread_rng();
            for _ in 0..n_samples {
                indices.push(dist.sample(&mut rng));
            }
        }
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;

    // y = 2*x1 + 3*x2, easily captured by a few splits
    fn regression_data() -> (Matrix, Vec<f32>) {
        let x = Matrix::from_vec(
            8,
            2,
            vec![
                1.0, 0.0, // 2
                0.0, 1.0, // 3
                1.0, 1.0, // 5
                2.0, 0.0, // 4
                0.0, 2.0, // 6
                2.0, 1.0, // 7
                1.0, 2.0, // 8
                3.0, 1.0, // 9
            ],
        )
        .expect("regression data matrix");
        let y = vec![2.0, 3.0, 5.0, 4.0, 6.0, 7.0, 8.0, 9.0];
        (x, y)
    }

    #[test]
    fn tree_fits_training_data_exactly() {
        let (x, y) = regression_data();
        let mut tree = DecisionTreeRegressor::new();
        tree.fit(&x, &y).unwrap();
        let preds = tree.predict(&x).unwrap();
        for (pred, truth) in preds.iter().zip(&y) {
            assert!((pred - truth).abs() < 1e-5, "pred {pred} vs truth {truth}");
        }
    }

    #[test]
    fn tree_respects_max_depth() {
        let (x, y) = regression_data();
        let mut tree = DecisionTreeRegressor::new().with_max_depth(1);
        tree.fit(&x, &y).unwrap();
        // depth 1 means a single split, so at most two distinct leaf values
        assert!(tree.root.as_ref().unwrap().depth() <= 1);
        let preds = tree.predict(&x).unwrap();
        let distinct: std::collections::BTreeSet<u32> =
            preds.iter().map(|p| p.to_bits()).collect();
        assert!(distinct.len() <= 2);
    }

    #[test]
    fn unfitted_tree_refuses_to_predict() {
        let tree = DecisionTreeRegressor::new();
        assert!(matches!(
            tree.predict_row(&[1.0, 2.0]),
            Err(CoreError::NotFitted)
        ));
    }

    #[test]
    fn forest_builds_requested_number_of_trees() {
        let (x, y) = regression_data();
        let mut forest = RandomForestRegressor::new(5).with_seed(42);
        forest.fit(&x, &y).unwrap();
        assert!(forest.is_fitted());
        assert_eq!(forest.trees.len(), 5);
    }

    #[test]
    fn forest_predictions_track_targets() {
        let (x, y) = regression_data();
        let mut forest = RandomForestRegressor::new(30).with_seed(42);
        forest.fit(&x, &y).unwrap();
        let preds = forest.predict(&x).unwrap();
        for (pred, truth) in preds.iter().zip(&y) {
            assert!(
                (pred - truth).abs() < 2.5,
                "pred {pred} too far from truth {truth}"
            );
        }
    }

    #[test]
    fn same_seed_gives_identical_forests() {
        let (x, y) = regression_data();
        let mut a = RandomForestRegressor::new(7).with_seed(42);
        a.fit(&x, &y).unwrap();
        let mut b = RandomForestRegressor::new(7).with_seed(42);
        b.fit(&x, &y).unwrap();

        let probe = [1.5, 0.5];
        assert_eq!(
            a.predict_row(&probe).unwrap().to_bits(),
            b.predict_row(&probe).unwrap().to_bits()
        );
    }

    #[test]
    fn different_seeds_give_different_forests() {
        let (x, y) = regression_data();
        let mut a = RandomForestRegressor::new(7).with_seed(1);
        a.fit(&x, &y).unwrap();
        let mut b = RandomForestRegressor::new(7).with_seed(2);
        b.fit(&x, &y).unwrap();
        let probe = [1.5, 0.5];
        assert_ne!(
            a.predict_row(&probe).unwrap().to_bits(),
            b.predict_row(&probe).unwrap().to_bits()
        );
    }

    #[test]
    fn unfitted_forest_refuses_to_predict() {
        let forest = RandomForestRegressor::new(3);
        assert!(matches!(
            forest.predict_row(&[0.0, 0.0]),
            Err(CoreError::NotFitted)
        ));
    }

    #[test]
    fn wrong_feature_count_is_rejected() {
        let (x, y) = regression_data();
        let mut forest = RandomForestRegressor::new(3).with_seed(7);
        forest.fit(&x, &y).unwrap();
        assert!(matches!(
            forest.predict_row(&[1.0, 2.0, 3.0]),
            Err(CoreError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn mismatched_inputs_fail_fit() {
        let (x, _) = regression_data();
        let mut forest = RandomForestRegressor::new(3);
        assert!(forest.fit(&x, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn serde_round_trip_preserves_predictions() {
        let (x, y) = regression_data();
        let mut forest = RandomForestRegressor::new(5).with_seed(9);
        forest.fit(&x, &y).unwrap();

        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForestRegressor = serde_json::from_str(&json).unwrap();
        let probe = [2.0, 2.0];
        assert_eq!(
            forest.predict_row(&probe).unwrap().to_bits(),
            restored.predict_row(&probe).unwrap().to_bits()
        );
    }
}
