// analysis/models/boost.rs

//! # Boosted Classifiers
//!
//! Two stagewise additive models over raw log-odds scores. The gradient
//! booster fits shallow variance trees to deviance residuals and installs a
//! per-leaf Newton step, the classic first-order formulation. The extreme
//! booster, compiled only with the `extreme-boost` capability, grows its
//! trees from per-sample gradient/hessian pairs with an L2-regularized gain,
//! the second-order formulation the optional external libraries use. The
//! harness treats the latter as a probed capability; nothing else in the
//! crate depends on it.

use crate::models::sigmoid;
use crate::models::tree::{DecisionTree, SplitCriterion, TreeParams};
use crate::models::{Classifier, ModelError};
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashMap;

const N_STAGES: usize = 100;
const LEARNING_RATE: f64 = 0.1;
const MAX_DEPTH: usize = 5;
const HESSIAN_FLOOR: f64 = 1e-12;

/// Stagewise gradient boosting on binomial deviance.
#[derive(Debug, Clone)]
pub struct GradientBoosting {
    base_score: f64,
    trees: Vec<DecisionTree>,
    importance: Array1<f64>,
}

impl GradientBoosting {
    pub fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        sample_weights: ArrayView1<f64>,
    ) -> Result<Self, ModelError> {
        let n = x.nrows();
        if n == 0 {
            return Err(ModelError::EmptyTrainingSet);
        }
        let params = TreeParams {
            criterion: SplitCriterion::Variance,
            max_depth: MAX_DEPTH,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        };
        // No stochastic element without feature subsampling; the generator
        // is only here to satisfy the tree builder.
        let mut rng = StdRng::seed_from_u64(0);

        let weight_total = sample_weights.sum();
        let prior = (y
            .iter()
            .zip(sample_weights.iter())
            .map(|(&yi, &wi)| yi * wi)
            .sum::<f64>()
            / weight_total)
            .clamp(1e-6, 1.0 - 1e-6);
        let base_score = (prior / (1.0 - prior)).ln();

        let mut raw = Array1::from_elem(n, base_score);
        let mut trees = Vec::with_capacity(N_STAGES);

        for _ in 0..N_STAGES {
            let probability = raw.mapv(sigmoid);
            let residual = &y - &probability;

            let mut tree =
                DecisionTree::fit(x, residual.view(), sample_weights, &params, &mut rng);

            // Newton step per leaf: sum of residuals over sum of p(1-p),
            // both sample-weighted.
            let mut numerator: HashMap<usize, f64> = HashMap::new();
            let mut denominator: HashMap<usize, f64> = HashMap::new();
            for i in 0..n {
                let leaf = tree.leaf_of(x.row(i));
                let w = sample_weights[i];
                let p = probability[i];
                *numerator.entry(leaf).or_insert(0.0) += w * residual[i];
                *denominator.entry(leaf).or_insert(0.0) += w * p * (1.0 - p);
            }
            for (leaf, num) in &numerator {
                let den = denominator.get(leaf).copied().unwrap_or(0.0);
                let step = if den.abs() < HESSIAN_FLOOR {
                    0.0
                } else {
                    num / den
                };
                tree.set_leaf_value(*leaf, step);
            }

            raw += &(tree.predict(x) * LEARNING_RATE);
            trees.push(tree);
        }

        let importance = stage_importance(&trees, x.ncols());
        Ok(GradientBoosting {
            base_score,
            trees,
            importance,
        })
    }

    fn raw_scores(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let mut raw = Array1::from_elem(x.nrows(), self.base_score);
        for tree in &self.trees {
            raw += &(tree.predict(x) * LEARNING_RATE);
        }
        raw
    }
}

impl Classifier for GradientBoosting {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.predict_proba(x)
            .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 })
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.raw_scores(x).mapv(sigmoid)
    }

    fn feature_importance(&self) -> Option<Array1<f64>> {
        Some(self.importance.clone())
    }
}

fn stage_importance(trees: &[DecisionTree], p: usize) -> Array1<f64> {
    let mut total = Array1::zeros(p);
    let mut contributing = 0usize;
    for tree in trees {
        let importance = tree.importance();
        if importance.sum() > 0.0 {
            total += importance;
            contributing += 1;
        }
    }
    if contributing > 0 {
        total /= contributing as f64;
    }
    total
}

/// Second-order boosting with an L2-regularized split gain, standing for the
/// optional external booster behind the `extreme-boost` capability.
#[cfg(feature = "extreme-boost")]
pub use extreme::ExtremeBoosting;

#[cfg(feature = "extreme-boost")]
mod extreme {
    use super::*;

    const L2_LAMBDA: f64 = 1.0;
    const MIN_GAIN: f64 = 1e-12;
    /// Minimum hessian mass per child; with logloss hessians this behaves
    /// like a minimum child size of a few samples.
    const MIN_CHILD_WEIGHT: f64 = 1.0;

    #[derive(Debug, Clone)]
    enum XNode {
        Leaf {
            weight: f64,
        },
        Split {
            feature: usize,
            threshold: f64,
            left: usize,
            right: usize,
        },
    }

    #[derive(Debug, Clone)]
    struct XTree {
        nodes: Vec<XNode>,
        gain: Array1<f64>,
    }

    impl XTree {
        fn fit(x: ArrayView2<f64>, gradient: &Array1<f64>, hessian: &Array1<f64>) -> Self {
            let mut tree = XTree {
                nodes: Vec::new(),
                gain: Array1::zeros(x.ncols()),
            };
            let indices: Vec<usize> = (0..x.nrows()).collect();
            tree.build(x, gradient, hessian, indices, 0);
            tree
        }

        fn build(
            &mut self,
            x: ArrayView2<f64>,
            gradient: &Array1<f64>,
            hessian: &Array1<f64>,
            indices: Vec<usize>,
            depth: usize,
        ) -> usize {
            let id = self.nodes.len();
            self.nodes.push(XNode::Leaf { weight: 0.0 });

            let g_total: f64 = indices.iter().map(|&i| gradient[i]).sum();
            let h_total: f64 = indices.iter().map(|&i| hessian[i]).sum();
            let leaf_weight = -g_total / (h_total + L2_LAMBDA);

            if depth >= MAX_DEPTH || indices.len() < 2 {
                self.nodes[id] = XNode::Leaf {
                    weight: leaf_weight,
                };
                return id;
            }

            match best_gain_split(x, gradient, hessian, &indices, g_total, h_total) {
                None => {
                    self.nodes[id] = XNode::Leaf {
                        weight: leaf_weight,
                    };
                }
                Some((feature, threshold, gain)) => {
                    self.gain[feature] += gain;
                    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                        .into_iter()
                        .partition(|&i| x[[i, feature]] < threshold);
                    let left = self.build(x, gradient, hessian, left_idx, depth + 1);
                    let right = self.build(x, gradient, hessian, right_idx, depth + 1);
                    self.nodes[id] = XNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    };
                }
            }
            id
        }

        fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
            let mut node = 0;
            loop {
                match &self.nodes[node] {
                    XNode::Leaf { weight } => return *weight,
                    XNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        node = if row[*feature] < *threshold {
                            *left
                        } else {
                            *right
                        };
                    }
                }
            }
        }

        fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
            Array1::from_shape_fn(x.nrows(), |i| self.predict_row(x.row(i)))
        }
    }

    fn score(g: f64, h: f64) -> f64 {
        g * g / (h + L2_LAMBDA)
    }

    fn best_gain_split(
        x: ArrayView2<f64>,
        gradient: &Array1<f64>,
        hessian: &Array1<f64>,
        indices: &[usize],
        g_total: f64,
        h_total: f64,
    ) -> Option<(usize, f64, f64)> {
        let mut best: Option<(usize, f64, f64)> = None;
        let mut ordered: Vec<(f64, usize)> = Vec::with_capacity(indices.len());
        for feature in 0..x.ncols() {
            ordered.clear();
            ordered.extend(indices.iter().map(|&i| (x[[i, feature]], i)));
            ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            let mut g_left = 0.0;
            let mut h_left = 0.0;
            for j in 0..ordered.len() - 1 {
                let (value, i) = ordered[j];
                g_left += gradient[i];
                h_left += hessian[i];
                let next_value = ordered[j + 1].0;
                if next_value <= value {
                    continue;
                }
                if h_left < MIN_CHILD_WEIGHT || h_total - h_left < MIN_CHILD_WEIGHT {
                    continue;
                }
                let gain = 0.5
                    * (score(g_left, h_left)
                        + score(g_total - g_left, h_total - h_left)
                        - score(g_total, h_total));
                if gain > MIN_GAIN && best.map_or(true, |(_, _, g)| gain > g) {
                    best = Some((feature, (value + next_value) / 2.0, gain));
                }
            }
        }
        best
    }

    #[derive(Debug, Clone)]
    pub struct ExtremeBoosting {
        trees: Vec<XTree>,
        importance: Array1<f64>,
    }

    impl ExtremeBoosting {
        pub fn fit(
            x: ArrayView2<f64>,
            y: ArrayView1<f64>,
            sample_weights: ArrayView1<f64>,
        ) -> Result<Self, ModelError> {
            let n = x.nrows();
            if n == 0 {
                return Err(ModelError::EmptyTrainingSet);
            }

            let mut raw: Array1<f64> = Array1::zeros(n);
            let mut trees = Vec::with_capacity(N_STAGES);
            for _ in 0..N_STAGES {
                let probability = raw.mapv(sigmoid);
                let gradient = Array1::from_shape_fn(n, |i| {
                    sample_weights[i] * (probability[i] - y[i])
                });
                let hessian = Array1::from_shape_fn(n, |i| {
                    (sample_weights[i] * probability[i] * (1.0 - probability[i]))
                        .max(HESSIAN_FLOOR)
                });
                let tree = XTree::fit(x, &gradient, &hessian);
                raw += &(tree.predict(x) * LEARNING_RATE);
                trees.push(tree);
            }

            let mut importance = Array1::zeros(x.ncols());
            for tree in &trees {
                importance += &tree.gain;
            }
            let total = importance.sum();
            if total > 0.0 {
                importance.mapv_inplace(|v| v / total);
            }
            Ok(ExtremeBoosting { trees, importance })
        }

        fn raw_scores(&self, x: ArrayView2<f64>) -> Array1<f64> {
            let mut raw = Array1::zeros(x.nrows());
            for tree in &self.trees {
                raw += &(tree.predict(x) * LEARNING_RATE);
            }
            raw
        }
    }

    impl Classifier for ExtremeBoosting {
        fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
            self.predict_proba(x)
                .mapv(|p| if p >= 0.5 { 1.0 } else { 0.0 })
        }

        fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
            self.raw_scores(x).mapv(sigmoid)
        }

        fn feature_importance(&self) -> Option<Array1<f64>> {
            Some(self.importance.clone())
        }
    }
}
