// analysis/metrics.rs

//! # Evaluation Metric Kernels
//!
//! Pure functions over prediction/truth arrays: classification metrics
//! (accuracy, F1, AUC-ROC), regression metrics (R², RMSE, MAE), the
//! fold-score summary used for cross-validation, and the interpolated
//! quantile shared by label derivation and imputation.
//!
//! AUC-ROC is computed as the Mann-Whitney rank statistic with average ranks
//! for tied scores, and is `None` whenever the truth vector holds a single
//! class (the curve is undefined there; callers surface a diagnostic rather
//! than a fabricated number).

use ndarray::ArrayView1;

/// Fraction of exactly matching predictions.
pub fn accuracy(truth: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let n = truth.len();
    if n == 0 {
        return 0.0;
    }
    let hits = truth
        .iter()
        .zip(predicted.iter())
        .filter(|(t, p)| t == p)
        .count();
    hits as f64 / n as f64
}

/// F1 score for the positive class (label `1.0`). Returns 0 when precision
/// and recall are both undefined or zero.
pub fn f1_binary(truth: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let mut tp = 0.0;
    let mut fp = 0.0;
    let mut fne = 0.0;
    for (&t, &p) in truth.iter().zip(predicted.iter()) {
        let t_pos = t == 1.0;
        let p_pos = p == 1.0;
        match (t_pos, p_pos) {
            (true, true) => tp += 1.0,
            (false, true) => fp += 1.0,
            (true, false) => fne += 1.0,
            (false, false) => {}
        }
    }
    let denominator = 2.0 * tp + fp + fne;
    if denominator == 0.0 {
        return 0.0;
    }
    2.0 * tp / denominator
}

/// Area under the ROC curve via the rank statistic, `None` when the truth
/// vector is single-class.
pub fn roc_auc(truth: ArrayView1<f64>, score: ArrayView1<f64>) -> Option<f64> {
    let n = truth.len();
    let n_pos = truth.iter().filter(|&&t| t == 1.0).count();
    let n_neg = n - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        score[a]
            .partial_cmp(&score[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // Average ranks across runs of tied scores, then sum the positive ranks.
    let mut rank_sum_pos = 0.0;
    let mut i = 0;
    while i < n {
        let mut j = i;
        while j + 1 < n && score[order[j + 1]] == score[order[i]] {
            j += 1;
        }
        let average_rank = (i + j + 2) as f64 / 2.0; // 1-based ranks
        for &idx in &order[i..=j] {
            if truth[idx] == 1.0 {
                rank_sum_pos += average_rank;
            }
        }
        i = j + 1;
    }

    let u = rank_sum_pos - (n_pos * (n_pos + 1)) as f64 / 2.0;
    Some(u / (n_pos as f64 * n_neg as f64))
}

/// Coefficient of determination. A constant truth vector yields 1 for a
/// perfect fit and 0 otherwise.
pub fn r2(truth: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let mean = truth.mean().unwrap_or(0.0);
    let ss_res: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    let ss_tot: f64 = truth.iter().map(|t| (t - mean) * (t - mean)).sum();
    if ss_tot == 0.0 {
        return if ss_res == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Root-mean-squared error.
pub fn rmse(truth: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let n = truth.len();
    if n == 0 {
        return 0.0;
    }
    let ss: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p) * (t - p))
        .sum();
    (ss / n as f64).sqrt()
}

/// Mean absolute error.
pub fn mae(truth: ArrayView1<f64>, predicted: ArrayView1<f64>) -> f64 {
    let n = truth.len();
    if n == 0 {
        return 0.0;
    }
    let total: f64 = truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p).abs())
        .sum();
    total / n as f64
}

/// Mean and population standard deviation of per-fold scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoldSummary {
    pub mean: f64,
    pub std: f64,
}

pub fn summarize_folds(scores: &[f64]) -> FoldSummary {
    if scores.is_empty() {
        return FoldSummary {
            mean: f64::NAN,
            std: f64::NAN,
        };
    }
    let n = scores.len() as f64;
    let mean = scores.iter().sum::<f64>() / n;
    let variance = scores.iter().map(|s| (s - mean) * (s - mean)).sum::<f64>() / n;
    FoldSummary {
        mean,
        std: variance.sqrt(),
    }
}

/// Quantile with linear interpolation between order statistics (rank
/// position `(n - 1) * q`). Input need not be sorted; `q` in [0, 1].
pub(crate) fn interpolated_quantile(values: &[f64], q: f64) -> f64 {
    debug_assert!(!values.is_empty());
    debug_assert!((0.0..=1.0).contains(&q));
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let position = (sorted.len() - 1) as f64 * q;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = position - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}
