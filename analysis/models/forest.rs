// analysis/models/forest.rs

//! # Random Forests
//!
//! Bootstrap ensembles of the CART trees in [`super::tree`]. The classifier
//! subsamples `sqrt(p)` features per split and averages leaf probabilities
//! (soft voting); the regressor searches every feature and averages leaf
//! means. Each tree seeds its own generator from the ensemble seed plus the
//! tree index, so fits are reproducible while the rayon tree loop runs in
//! any order.

use crate::models::tree::{DecisionTree, SplitCriterion, TreeParams};
use crate::models::{Classifier, ModelError, Regressor};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

const N_TREES: usize = 100;
const MAX_DEPTH: usize = 8;
const MIN_SAMPLES_SPLIT: usize = 10;

#[derive(Debug, Clone)]
pub struct ForestClassifier {
    trees: Vec<DecisionTree>,
    importance: Array1<f64>,
}

impl ForestClassifier {
    pub fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        sample_weights: ArrayView1<f64>,
        seed: u64,
    ) -> Result<Self, ModelError> {
        let max_features = ((x.ncols() as f64).sqrt().floor() as usize).max(1);
        let params = TreeParams {
            criterion: SplitCriterion::Gini,
            max_depth: MAX_DEPTH,
            min_samples_split: MIN_SAMPLES_SPLIT,
            min_samples_leaf: 1,
            max_features: Some(max_features),
        };
        let trees = grow_ensemble(x, y, sample_weights, seed, &params)?;
        let importance = mean_importance(&trees, x.ncols());
        Ok(ForestClassifier { trees, importance })
    }
}

impl Classifier for ForestClassifier {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.predict_proba(x)
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 })
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        average_predictions(&self.trees, x)
    }

    fn feature_importance(&self) -> Option<Array1<f64>> {
        Some(self.importance.clone())
    }
}

#[derive(Debug, Clone)]
pub struct ForestRegressor {
    trees: Vec<DecisionTree>,
    importance: Array1<f64>,
}

impl ForestRegressor {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, seed: u64) -> Result<Self, ModelError> {
        let params = TreeParams {
            criterion: SplitCriterion::Variance,
            max_depth: MAX_DEPTH,
            min_samples_split: MIN_SAMPLES_SPLIT,
            min_samples_leaf: 1,
            max_features: None,
        };
        let weights = Array1::ones(x.nrows());
        let trees = grow_ensemble(x, y, weights.view(), seed, &params)?;
        let importance = mean_importance(&trees, x.ncols());
        Ok(ForestRegressor { trees, importance })
    }
}

impl Regressor for ForestRegressor {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        average_predictions(&self.trees, x)
    }

    fn feature_importance(&self) -> Option<Array1<f64>> {
        Some(self.importance.clone())
    }
}

fn grow_ensemble(
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    weights: ArrayView1<f64>,
    seed: u64,
    params: &TreeParams,
) -> Result<Vec<DecisionTree>, ModelError> {
    let n = x.nrows();
    if n == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    let trees = (0..N_TREES)
        .into_par_iter()
        .map(|t| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t as u64));
            let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
            let xb = x.select(Axis(0), &bootstrap);
            let yb = y.select(Axis(0), &bootstrap);
            let wb = weights.select(Axis(0), &bootstrap);
            DecisionTree::fit(xb.view(), yb.view(), wb.view(), params, &mut rng)
        })
        .collect();
    Ok(trees)
}

fn average_predictions(trees: &[DecisionTree], x: ArrayView2<f64>) -> Array1<f64> {
    let mut total = Array1::zeros(x.nrows());
    for tree in trees {
        total += &tree.predict(x);
    }
    total / trees.len() as f64
}

fn mean_importance(trees: &[DecisionTree], p: usize) -> Array1<f64> {
    let mut total = Array1::zeros(p);
    for tree in trees {
        total += tree.importance();
    }
    total / trees.len() as f64
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Array1, Array2};

    fn threshold_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                ((i * 7) % 13) as f64
            }
        });
        let y = Array1::from_shape_fn(n, |i| if i >= n / 2 { 1.0 } else { 0.0 });
        (x, y)
    }

    #[test]
    fn classifier_learns_a_threshold_rule() {
        let (x, y) = threshold_data(120);
        let weights = Array1::ones(120);
        let forest = ForestClassifier::fit(x.view(), y.view(), weights.view(), 42).unwrap();
        let predicted = forest.predict(x.view());
        let accuracy = crate::metrics::accuracy(y.view(), predicted.view());
        assert!(accuracy > 0.9, "train accuracy {accuracy} too low");

        let proba = forest.predict_proba(x.view());
        assert!(proba[0] < 0.3);
        assert!(proba[119] > 0.7);
    }

    #[test]
    fn classifier_is_deterministic_per_seed() {
        let (x, y) = threshold_data(60);
        let weights = Array1::ones(60);
        let a = ForestClassifier::fit(x.view(), y.view(), weights.view(), 7).unwrap();
        let b = ForestClassifier::fit(x.view(), y.view(), weights.view(), 7).unwrap();
        let pa = a.predict_proba(x.view());
        let pb = b.predict_proba(x.view());
        for (left, right) in pa.iter().zip(pb.iter()) {
            assert_eq!(left, right);
        }
    }

    #[test]
    fn regressor_tracks_a_smooth_target() {
        let n = 150;
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(n, |i| 2.0 * i as f64);
        let forest = ForestRegressor::fit(x.view(), y.view(), 42).unwrap();
        let predicted = forest.predict(x.view());
        let mae = crate::metrics::mae(y.view(), predicted.view());
        assert!(mae < 10.0, "mae {mae} too high");
    }

    #[test]
    fn importance_is_normalized_and_concentrated() {
        let (x, y) = threshold_data(120);
        let weights = Array1::ones(120);
        let forest = ForestClassifier::fit(x.view(), y.view(), weights.view(), 42).unwrap();
        let importance = Classifier::feature_importance(&forest).unwrap();
        assert_abs_diff_eq!(importance.sum(), 1.0, epsilon = 1e-6);
        assert!(importance[0] > importance[1]);
    }

    #[test]
    fn tiny_sample_collapses_to_the_prior() {
        // Below min_samples_split every tree is a single leaf.
        let x = Array2::from_shape_fn((6, 1), |(i, _)| i as f64);
        let y = ndarray::array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let weights = Array1::ones(6);
        let forest = ForestClassifier::fit(x.view(), y.view(), weights.view(), 1).unwrap();
        let proba = forest.predict_proba(x.view());
        for pair in proba.windows(2) {
            assert_abs_diff_eq!(pair[0], pair[1], epsilon = 1e-12);
        }
    }
}
