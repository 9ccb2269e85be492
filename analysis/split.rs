// analysis/split.rs

//! # Split and Fold Plans
//!
//! Deterministic index plans for the harness: one shared train/test split per
//! task (shuffled for regression, stratified for classification) and the
//! cross-validation fold plans (stratified round-robin for classification,
//! consecutive blocks for regression). Everything is a pure function of the
//! sample size, the labels, and a `u64` seed; no global RNG state.

use ndarray::ArrayView1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::BTreeMap;

/// Index partition shared by every variant of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl TrainTestSplit {
    pub fn n_train(&self) -> usize {
        self.train.len()
    }

    pub fn n_test(&self) -> usize {
        self.test.len()
    }
}

/// Seeded shuffled split. The test partition takes `ceil(n * fraction)`
/// records, clamped so both sides stay non-empty.
pub fn shuffled_split(n: usize, test_fraction: f64, seed: u64) -> TrainTestSplit {
    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let n_test = ((n as f64 * test_fraction).ceil() as usize).clamp(1, n.saturating_sub(1));
    let mut test: Vec<usize> = indices[..n_test].to_vec();
    let mut train: Vec<usize> = indices[n_test..].to_vec();
    train.sort_unstable();
    test.sort_unstable();
    TrainTestSplit { train, test }
}

/// Seeded stratified split: each class contributes its own share of test
/// records (at least one once the class has two members), so class
/// proportions survive the partition. Singleton classes stay in training.
pub fn stratified_split(labels: ArrayView1<f64>, test_fraction: f64, seed: u64) -> TrainTestSplit {
    let mut rng = StdRng::seed_from_u64(seed);
    let by_class = group_by_class(labels);

    let mut train = Vec::new();
    let mut test = Vec::new();
    for (_, mut members) in by_class {
        members.shuffle(&mut rng);
        let size = members.len();
        if size < 2 {
            train.extend(members);
            continue;
        }
        let n_test = ((size as f64 * test_fraction).round() as usize).clamp(1, size - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    TrainTestSplit { train, test }
}

/// Stratified fold plan: within each class, members are dealt round-robin
/// across the `k` folds in index order. Returns the test indices per fold,
/// sorted; folds partition `0..n`.
pub fn stratified_folds(labels: ArrayView1<f64>, k: usize) -> Vec<Vec<usize>> {
    let by_class = group_by_class(labels);
    let mut folds: Vec<Vec<usize>> = vec![Vec::new(); k];
    for (_, members) in by_class {
        for (i, idx) in members.into_iter().enumerate() {
            folds[i % k].push(idx);
        }
    }
    for fold in &mut folds {
        fold.sort_unstable();
    }
    folds
}

/// Consecutive-block fold plan: the first `n % k` folds take one extra
/// record, exactly tiling `0..n`.
pub fn consecutive_folds(n: usize, k: usize) -> Vec<Vec<usize>> {
    let base = n / k;
    let remainder = n % k;
    let mut folds = Vec::with_capacity(k);
    let mut start = 0;
    for i in 0..k {
        let size = base + usize::from(i < remainder);
        folds.push((start..start + size).collect());
        start += size;
    }
    folds
}

/// Complement of one fold: the training indices for that round.
pub fn fold_complement(n: usize, fold: &[usize]) -> Vec<usize> {
    let mut in_fold = vec![false; n];
    for &idx in fold {
        in_fold[idx] = true;
    }
    (0..n).filter(|&i| !in_fold[i]).collect()
}

/// Groups record indices by integer class value, keyed in ascending class
/// order for deterministic iteration.
fn group_by_class(labels: ArrayView1<f64>) -> BTreeMap<i64, Vec<usize>> {
    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        by_class.entry(label as i64).or_default().push(idx);
    }
    by_class
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array1;

    fn binary_labels(n: usize, positives: usize) -> Array1<f64> {
        Array1::from_shape_fn(n, |i| if i < positives { 1.0 } else { 0.0 })
    }

    #[test]
    fn shuffled_split_is_deterministic_per_seed() {
        let a = shuffled_split(100, 0.2, 42);
        let b = shuffled_split(100, 0.2, 42);
        let c = shuffled_split(100, 0.2, 43);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.n_test(), 20);
        assert_eq!(a.n_train(), 80);
    }

    #[test]
    fn shuffled_split_partitions_all_indices() {
        let split = shuffled_split(37, 0.2, 7);
        let mut all: Vec<usize> = split.train.iter().chain(split.test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn stratified_split_preserves_class_shares() {
        let labels = binary_labels(100, 25);
        let split = stratified_split(labels.view(), 0.2, 42);
        let test_positives = split.test.iter().filter(|&&i| labels[i] == 1.0).count();
        let train_positives = split.train.iter().filter(|&&i| labels[i] == 1.0).count();
        assert_eq!(test_positives, 5);
        assert_eq!(train_positives, 20);
        assert_eq!(split.n_test(), 20);
    }

    #[test]
    fn stratified_split_keeps_singleton_class_in_training() {
        let labels = binary_labels(21, 1);
        let split = stratified_split(labels.view(), 0.2, 42);
        assert!(split.train.iter().any(|&i| labels[i] == 1.0));
        assert!(split.test.iter().all(|&i| labels[i] == 0.0));
    }

    #[test]
    fn stratified_split_gives_small_classes_one_test_record() {
        let labels = binary_labels(50, 2);
        let split = stratified_split(labels.view(), 0.2, 42);
        let test_positives = split.test.iter().filter(|&&i| labels[i] == 1.0).count();
        assert_eq!(test_positives, 1);
    }

    #[test]
    fn stratified_folds_partition_and_balance_classes() {
        let labels = binary_labels(50, 20);
        let folds = stratified_folds(labels.view(), 5);
        assert_eq!(folds.len(), 5);

        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());

        for fold in &folds {
            let positives = fold.iter().filter(|&&i| labels[i] == 1.0).count();
            assert_eq!(positives, 4);
            assert_eq!(fold.len(), 10);
        }
    }

    #[test]
    fn consecutive_folds_tile_the_range() {
        let folds = consecutive_folds(23, 5);
        let sizes: Vec<usize> = folds.iter().map(|f| f.len()).collect();
        assert_eq!(sizes, vec![5, 5, 5, 4, 4]);
        let mut all: Vec<usize> = folds.iter().flatten().copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..23).collect::<Vec<_>>());
    }

    #[test]
    fn fold_complement_is_exact() {
        let folds = consecutive_folds(10, 3);
        let train = fold_complement(10, &folds[1]);
        assert_eq!(folds[1], vec![4, 5, 6]);
        assert_eq!(train, vec![0, 1, 2, 3, 7, 8, 9]);
    }
}
