// analysis/models/tree.rs

//! # Weighted CART Trees
//!
//! The single tree builder behind the forest and boosting families. Splits
//! minimize weighted Gini impurity (classification, binary 0/1 targets) or
//! weighted variance (regression and residual fitting), with the usual depth,
//! minimum-split, and minimum-leaf controls. Thresholds sit at midpoints
//! between distinct sorted values. Optional per-split feature subsampling
//! drives forest decorrelation; the caller owns the generator so ensembles
//! stay deterministic.
//!
//! Leaf values are weighted target means, which doubles as the positive-class
//! probability for Gini trees. The booster rewrites leaf values after
//! fitting, so leaves are addressable through [`DecisionTree::leaf_of`].

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;

const MIN_IMPROVEMENT: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitCriterion {
    Gini,
    Variance,
}

#[derive(Debug, Clone)]
pub struct TreeParams {
    pub criterion: SplitCriterion,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features sampled per split; `None` searches all of them.
    pub max_features: Option<usize>,
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    importance: Array1<f64>,
}

impl DecisionTree {
    pub fn fit(
        x: ArrayView2<f64>,
        y: ArrayView1<f64>,
        weights: ArrayView1<f64>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut builder = internal::Builder {
            x,
            y,
            weights,
            params,
            rng,
            nodes: Vec::new(),
            importance: Array1::zeros(x.ncols()),
            total_weight: weights.sum(),
        };
        let all_indices: Vec<usize> = (0..x.nrows()).collect();
        builder.build(all_indices, 0);

        let mut importance = builder.importance;
        let total: f64 = importance.sum();
        if total > 0.0 {
            importance.mapv_inplace(|v| v / total);
        }
        DecisionTree {
            nodes: builder.nodes,
            importance,
        }
    }

    /// Index of the leaf a row falls into.
    pub fn leaf_of(&self, row: ArrayView1<f64>) -> usize {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { .. } => return node,
                Node::Split {
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

    pub fn predict_value(&self, row: ArrayView1<f64>) -> f64 {
        match &self.nodes[self.leaf_of(row)] {
            Node::Leaf { value } => *value,
            Node::Split { .. } => 0.0,
        }
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        Array1::from_shape_fn(x.nrows(), |i| self.predict_value(x.row(i)))
    }

    /// Overwrites one leaf's value; the booster installs Newton steps here.
    pub fn set_leaf_value(&mut self, leaf: usize, value: f64) {
        if let Node::Leaf { value: stored } = &mut self.nodes[leaf] {
            *stored = value;
        }
    }

    /// Normalized impurity-decrease importance, summing to 1 when the tree
    /// split at all.
    pub fn importance(&self) -> &Array1<f64> {
        &self.importance
    }
}

mod internal {
    use super::*;

    pub(super) struct Builder<'x, 'y, 'w, 'p, 'r> {
        pub x: ArrayView2<'x, f64>,
        pub y: ArrayView1<'y, f64>,
        pub weights: ArrayView1<'w, f64>,
        pub params: &'p TreeParams,
        pub rng: &'r mut StdRng,
        pub nodes: Vec<Node>,
        pub importance: Array1<f64>,
        pub total_weight: f64,
    }

    struct BestSplit {
        feature: usize,
        threshold: f64,
        improvement: f64,
        left: Vec<usize>,
        right: Vec<usize>,
    }

    impl Builder<'_, '_, '_, '_, '_> {
        pub(super) fn build(&mut self, indices: Vec<usize>, depth: usize) -> usize {
            let id = self.nodes.len();
            self.nodes.push(Node::Leaf { value: 0.0 });

            let (node_weight, value, impurity) = self.node_stats(&indices);
            let must_stop = depth >= self.params.max_depth
                || indices.len() < self.params.min_samples_split
                || impurity <= MIN_IMPROVEMENT;

            let split = if must_stop {
                None
            } else {
                self.best_split(&indices, impurity)
            };

            match split {
                None => {
                    self.nodes[id] = Node::Leaf { value };
                }
                Some(best) => {
                    self.importance[best.feature] +=
                        node_weight / self.total_weight * best.improvement;
                    let left = self.build(best.left, depth + 1);
                    let right = self.build(best.right, depth + 1);
                    self.nodes[id] = Node::Split {
                        feature: best.feature,
                        threshold: best.threshold,
                        left,
                        right,
                    };
                }
            }
            id
        }

        /// Weighted sum, mean, and impurity of one node.
        fn node_stats(&self, indices: &[usize]) -> (f64, f64, f64) {
            let mut w_sum = 0.0;
            let mut wy_sum = 0.0;
            let mut wy2_sum = 0.0;
            for &i in indices {
                let w = self.weights[i];
                let y = self.y[i];
                w_sum += w;
                wy_sum += w * y;
                wy2_sum += w * y * y;
            }
            if w_sum <= 0.0 {
                return (0.0, 0.0, 0.0);
            }
            let mean = wy_sum / w_sum;
            let impurity = match self.params.criterion {
                SplitCriterion::Gini => 2.0 * mean * (1.0 - mean),
                SplitCriterion::Variance => (wy2_sum / w_sum - mean * mean).max(0.0),
            };
            (w_sum, mean, impurity)
        }

        fn candidate_features(&mut self) -> Vec<usize> {
            let p = self.x.ncols();
            match self.params.max_features {
                Some(m) if m < p => rand::seq::index::sample(self.rng, p, m).into_vec(),
                _ => (0..p).collect(),
            }
        }

        fn best_split(&mut self, indices: &[usize], node_impurity: f64) -> Option<BestSplit> {
            if indices.len() < 2 {
                return None;
            }
            let features = self.candidate_features();
            let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, score)

            let mut ordered: Vec<(f64, usize)> = Vec::with_capacity(indices.len());
            for feature in features {
                ordered.clear();
                ordered.extend(indices.iter().map(|&i| (self.x[[i, feature]], i)));
                ordered.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

                let mut w_left = 0.0;
                let mut wy_left = 0.0;
                let mut wy2_left = 0.0;
                let (w_total, wy_total, wy2_total) = {
                    let mut acc = (0.0, 0.0, 0.0);
                    for &(_, i) in &ordered {
                        let w = self.weights[i];
                        let y = self.y[i];
                        acc.0 += w;
                        acc.1 += w * y;
                        acc.2 += w * y * y;
                    }
                    acc
                };

                for j in 0..ordered.len() - 1 {
                    let (value, i) = ordered[j];
                    let w = self.weights[i];
                    let y = self.y[i];
                    w_left += w;
                    wy_left += w * y;
                    wy2_left += w * y * y;

                    let next_value = ordered[j + 1].0;
                    if next_value <= value {
                        continue;
                    }
                    let n_left = j + 1;
                    let n_right = ordered.len() - n_left;
                    if n_left < self.params.min_samples_leaf
                        || n_right < self.params.min_samples_leaf
                    {
                        continue;
                    }

                    let w_right = w_total - w_left;
                    if w_left <= 0.0 || w_right <= 0.0 {
                        continue;
                    }
                    let impurity_left =
                        impurity_from(self.params.criterion, w_left, wy_left, wy2_left);
                    let impurity_right = impurity_from(
                        self.params.criterion,
                        w_right,
                        wy_total - wy_left,
                        wy2_total - wy2_left,
                    );
                    let score = (w_left * impurity_left + w_right * impurity_right) / w_total;
                    if best.map_or(true, |(_, _, s)| score < s) {
                        best = Some((feature, (value + next_value) / 2.0, score));
                    }
                }
            }

            let (feature, threshold, score) = best?;
            let improvement = node_impurity - score;
            if improvement <= MIN_IMPROVEMENT {
                return None;
            }

            let mut left = Vec::new();
            let mut right = Vec::new();
            for &i in indices {
                if self.x[[i, feature]] < threshold {
                    left.push(i);
                } else {
                    right.push(i);
                }
            }
            Some(BestSplit {
                feature,
                threshold,
                improvement,
                left,
                right,
            })
        }
    }

    fn impurity_from(criterion: SplitCriterion, w: f64, wy: f64, wy2: f64) -> f64 {
        let mean = wy / w;
        match criterion {
            SplitCriterion::Gini => 2.0 * mean * (1.0 - mean),
            SplitCriterion::Variance => (wy2 / w - mean * mean).max(0.0),
        }
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1, Array2};
    use rand::SeedableRng;

    fn params(criterion: SplitCriterion) -> TreeParams {
        TreeParams {
            criterion,
            max_depth: 8,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(0)
    }

    #[test]
    fn variance_tree_learns_a_threshold_rule() {
        let n = 40;
        let x = Array2::from_shape_fn((n, 1), |(i, _)| i as f64 - 20.0);
        let y = Array1::from_shape_fn(n, |i| if i >= 20 { 1.0 } else { 0.0 });
        let w = Array1::ones(n);
        let tree = DecisionTree::fit(
            x.view(),
            y.view(),
            w.view(),
            &params(SplitCriterion::Variance),
            &mut rng(),
        );
        let predicted = tree.predict(x.view());
        for (pred, truth) in predicted.iter().zip(y.iter()) {
            assert_abs_diff_eq!(pred, truth, epsilon = 1e-12);
        }
    }

    #[test]
    fn gini_tree_leaf_values_are_class_probabilities() {
        // Left half pure negative, right half 3:1 positive.
        let x = array![[0.0], [1.0], [2.0], [3.0], [10.0], [11.0], [12.0], [13.0]];
        let y = array![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0];
        let w = Array1::ones(8);
        let mut p = params(SplitCriterion::Gini);
        p.max_depth = 1;
        let tree = DecisionTree::fit(x.view(), y.view(), w.view(), &p, &mut rng());
        assert_abs_diff_eq!(tree.predict_value(array![1.0].view()), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(tree.predict_value(array![11.0].view()), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn zero_depth_yields_the_weighted_mean() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![0.0, 0.0, 1.0];
        let w = array![1.0, 1.0, 2.0];
        let mut p = params(SplitCriterion::Variance);
        p.max_depth = 0;
        let tree = DecisionTree::fit(x.view(), y.view(), w.view(), &p, &mut rng());
        assert_abs_diff_eq!(tree.predict_value(array![5.0].view()), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn min_samples_split_stops_growth() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let w = Array1::ones(4);
        let mut p = params(SplitCriterion::Gini);
        p.min_samples_split = 10;
        let tree = DecisionTree::fit(x.view(), y.view(), w.view(), &p, &mut rng());
        assert_abs_diff_eq!(tree.predict_value(array![0.0].view()), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn importance_lands_on_the_informative_feature() {
        let n = 60;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                i as f64
            } else {
                (i % 3) as f64 * 1e-9
            }
        });
        let y = Array1::from_shape_fn(n, |i| if i >= 30 { 1.0 } else { 0.0 });
        let w = Array1::ones(n);
        let tree = DecisionTree::fit(
            x.view(),
            y.view(),
            w.view(),
            &params(SplitCriterion::Gini),
            &mut rng(),
        );
        let importance = tree.importance();
        assert!(importance[0] > 0.99);
        assert_abs_diff_eq!(importance.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn leaf_rewrite_changes_predictions() {
        let x = array![[0.0], [10.0]];
        let y = array![0.0, 1.0];
        let w = Array1::ones(2);
        let mut tree = DecisionTree::fit(
            x.view(),
            y.view(),
            w.view(),
            &params(SplitCriterion::Variance),
            &mut rng(),
        );
        let leaf = tree.leaf_of(array![10.0].view());
        tree.set_leaf_value(leaf, 7.5);
        assert_abs_diff_eq!(tree.predict_value(array![10.0].view()), 7.5, epsilon = 1e-12);
        assert_abs_diff_eq!(tree.predict_value(array![0.0].view()), 0.0, epsilon = 1e-12);
    }
}
