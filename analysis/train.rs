// analysis/train.rs

//! # Training and Evaluation Harness
//!
//! Drives every model variant of one task through an identical protocol: a
//! single seeded train/test split shared by all variants (stratified for
//! classification), one fit per variant, a fixed metric bundle on the held
//! out partition, and k-fold cross-validation over the full matrix. Because
//! the split is drawn once per task, metric differences between variants
//! reflect the models, never the partition.
//!
//! Variant availability is settled before anything is fit: the capability
//! probe answers for optional variants, and unavailable ones are recorded as
//! skipped. A fit failure likewise records the variant's absence without
//! disturbing the others; only misconfiguration (wrong task, empty request,
//! shape mismatch) aborts.

use crate::config::AnalysisConfig;
use crate::diagnostics::Diagnostic;
use crate::features::FeatureMatrix;
use crate::labels::LabelSet;
use crate::metrics::{self, FoldSummary};
use crate::models::{
    fit_classifier, fit_regressor, Availability, CapabilityProbe, ModelError, ModelVariant,
    TaskKind, Weighting,
};
use crate::split::{self, TrainTestSplit};
use itertools::Itertools;
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use std::collections::BTreeMap;
use thiserror::Error;

/// Held-out metrics for one fitted variant.
#[derive(Debug, Clone, Copy)]
pub enum MetricBundle {
    Classification {
        accuracy: f64,
        f1: f64,
        /// `None` when the test partition held a single class.
        auc_roc: Option<f64>,
    },
    Regression {
        r2: f64,
        rmse: f64,
        mae: f64,
    },
}

/// Everything the harness learned about one variant.
#[derive(Debug, Clone)]
pub struct ModelResult {
    pub variant: ModelVariant,
    /// Predictions on the shared test partition, in test-index order.
    pub predictions: Array1<f64>,
    /// Positive-class probabilities on the test partition; classification
    /// only.
    pub probabilities: Option<Array1<f64>>,
    pub metrics: MetricBundle,
    /// Mean/std of the fold scores (F1 for classification, R² for
    /// regression) over the full matrix.
    pub cross_validation: FoldSummary,
    /// `(feature, importance)` sorted descending; `None` for families
    /// without a native importance notion.
    pub importance: Option<Vec<(String, f64)>>,
}

/// The outcome of one task: per-variant results keyed by identity, the split
/// they all shared, and the recoverable conditions met along the way.
#[derive(Debug, Clone)]
pub struct TaskEvaluation {
    pub task: TaskKind,
    pub split: TrainTestSplit,
    pub results: BTreeMap<ModelVariant, ModelResult>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Error, Debug)]
pub enum TrainError {
    #[error("No variants were requested for {0:?}; nothing to evaluate.")]
    NoVariants(TaskKind),
    #[error(
        "Variant '{variant}' belongs to {actual:?} and cannot be evaluated under {requested:?}."
    )]
    TaskMismatch {
        variant: &'static str,
        actual: TaskKind,
        requested: TaskKind,
    },
    #[error("Feature matrix has {matrix} rows but the label vector has {labels}.")]
    LengthMismatch { matrix: usize, labels: usize },
}

/// Evaluates every requested variant of `task` against one shared split.
pub fn evaluate(
    matrix: &FeatureMatrix,
    labels: &LabelSet,
    task: TaskKind,
    variants: &[ModelVariant],
    probe: &dyn CapabilityProbe,
    config: &AnalysisConfig,
) -> Result<TaskEvaluation, TrainError> {
    if variants.is_empty() {
        return Err(TrainError::NoVariants(task));
    }
    for variant in variants {
        if variant.task() != task {
            return Err(TrainError::TaskMismatch {
                variant: variant.name(),
                actual: variant.task(),
                requested: task,
            });
        }
    }

    let target = match task {
        TaskKind::Classification => &labels.binary,
        TaskKind::Regression => &labels.continuous,
    };
    if matrix.n_samples() != target.len() {
        return Err(TrainError::LengthMismatch {
            matrix: matrix.n_samples(),
            labels: target.len(),
        });
    }

    // One split per task; every variant below reuses it untouched.
    let split = match task {
        TaskKind::Classification => {
            split::stratified_split(target.view(), config.test_fraction, config.split_seed)
        }
        TaskKind::Regression => {
            split::shuffled_split(target.len(), config.test_fraction, config.split_seed)
        }
    };
    let folds = match task {
        TaskKind::Classification => split::stratified_folds(target.view(), config.cv_folds),
        TaskKind::Regression => split::consecutive_folds(target.len(), config.cv_folds),
    };
    log::info!(
        "{task:?}: {} train / {} test records, {} fold(s), {} variant(s) requested",
        split.n_train(),
        split.n_test(),
        folds.len(),
        variants.len()
    );

    let x = &matrix.standardized;
    let x_train = x.select(Axis(0), &split.train);
    let x_test = x.select(Axis(0), &split.test);
    let y_train = target.select(Axis(0), &split.train);
    let y_test = target.select(Axis(0), &split.test);

    let mut results = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for &variant in variants {
        if let Some(capability) = variant.required_capability() {
            if probe.probe(capability) == Availability::Missing {
                log::info!("variant '{variant}' skipped: capability '{capability}' not present");
                diagnostics.push(Diagnostic::VariantSkipped {
                    variant: variant.name().to_string(),
                    requires: capability.to_string(),
                });
                continue;
            }
        }

        let fitted = match task {
            TaskKind::Classification => internal::evaluate_classifier(
                variant,
                x_train.view(),
                y_train.view(),
                x_test.view(),
                y_test.view(),
                x.view(),
                target.view(),
                &folds,
                &matrix.feature_names,
                config.split_seed,
            ),
            TaskKind::Regression => internal::evaluate_regressor(
                variant,
                x_train.view(),
                y_train.view(),
                x_test.view(),
                y_test.view(),
                x.view(),
                target.view(),
                &folds,
                &matrix.feature_names,
                config.split_seed,
            ),
        };

        match fitted {
            Ok(result) => {
                if let MetricBundle::Classification { auc_roc: None, .. } = result.metrics {
                    diagnostics.push(Diagnostic::AucUndefined {
                        variant: variant.name().to_string(),
                    });
                }
                results.insert(variant, result);
            }
            Err(error) => {
                log::warn!("variant '{variant}' failed to fit: {error}");
                diagnostics.push(Diagnostic::VariantFailed {
                    variant: variant.name().to_string(),
                    reason: error.to_string(),
                });
            }
        }
    }

    Ok(TaskEvaluation {
        task,
        split,
        results,
        diagnostics,
    })
}

mod internal {
    use super::*;

    /// Per-class reweighting computed on the training labels only.
    pub(super) fn sample_weights_for(weighting: Weighting, y: ArrayView1<f64>) -> Array1<f64> {
        let n = y.len() as f64;
        let n_pos = y.iter().filter(|&&v| v == 1.0).count() as f64;
        let n_neg = n - n_pos;
        match weighting {
            Weighting::Uniform => Array1::ones(y.len()),
            Weighting::Balanced => {
                if n_pos == 0.0 || n_neg == 0.0 {
                    return Array1::ones(y.len());
                }
                let w_pos = n / (2.0 * n_pos);
                let w_neg = n / (2.0 * n_neg);
                y.mapv(|v| if v == 1.0 { w_pos } else { w_neg })
            }
            Weighting::PositiveRescale => {
                if n_pos == 0.0 {
                    return Array1::ones(y.len());
                }
                let ratio = n_neg / n_pos;
                y.mapv(|v| if v == 1.0 { ratio } else { 1.0 })
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn evaluate_classifier(
        variant: ModelVariant,
        x_train: ArrayView2<f64>,
        y_train: ArrayView1<f64>,
        x_test: ArrayView2<f64>,
        y_test: ArrayView1<f64>,
        x_full: ArrayView2<f64>,
        y_full: ArrayView1<f64>,
        folds: &[Vec<usize>],
        feature_names: &[String],
        seed: u64,
    ) -> Result<ModelResult, ModelError> {
        let weights = sample_weights_for(variant.weighting(), y_train);
        let model = fit_classifier(variant, x_train, y_train, weights.view(), seed)?;

        let predictions = model.predict(x_test);
        let probabilities = model.predict_proba(x_test);
        let metrics = MetricBundle::Classification {
            accuracy: metrics::accuracy(y_test, predictions.view()),
            f1: metrics::f1_binary(y_test, predictions.view()),
            auc_roc: metrics::roc_auc(y_test, probabilities.view()),
        };

        let mut fold_scores = Vec::with_capacity(folds.len());
        for fold in folds {
            let train_idx = split::fold_complement(y_full.len(), fold);
            let xf_train = x_full.select(Axis(0), &train_idx);
            let yf_train = y_full.select(Axis(0), &train_idx);
            let wf = sample_weights_for(variant.weighting(), yf_train.view());
            match fit_classifier(variant, xf_train.view(), yf_train.view(), wf.view(), seed) {
                Ok(fold_model) => {
                    let xf_test = x_full.select(Axis(0), fold);
                    let yf_test = y_full.select(Axis(0), fold);
                    let fold_pred = fold_model.predict(xf_test.view());
                    fold_scores.push(metrics::f1_binary(yf_test.view(), fold_pred.view()));
                }
                Err(error) => {
                    log::warn!("variant '{variant}' failed on one fold: {error}");
                }
            }
        }

        Ok(ModelResult {
            variant,
            predictions,
            probabilities: Some(probabilities),
            metrics,
            cross_validation: metrics::summarize_folds(&fold_scores),
            importance: ranked_importance(model.feature_importance(), feature_names),
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn evaluate_regressor(
        variant: ModelVariant,
        x_train: ArrayView2<f64>,
        y_train: ArrayView1<f64>,
        x_test: ArrayView2<f64>,
        y_test: ArrayView1<f64>,
        x_full: ArrayView2<f64>,
        y_full: ArrayView1<f64>,
        folds: &[Vec<usize>],
        feature_names: &[String],
        seed: u64,
    ) -> Result<ModelResult, ModelError> {
        let model = fit_regressor(variant, x_train, y_train, seed)?;

        let predictions = model.predict(x_test);
        let metrics = MetricBundle::Regression {
            r2: metrics::r2(y_test, predictions.view()),
            rmse: metrics::rmse(y_test, predictions.view()),
            mae: metrics::mae(y_test, predictions.view()),
        };

        let mut fold_scores = Vec::with_capacity(folds.len());
        for fold in folds {
            let train_idx = split::fold_complement(y_full.len(), fold);
            let xf_train = x_full.select(Axis(0), &train_idx);
            let yf_train = y_full.select(Axis(0), &train_idx);
            match fit_regressor(variant, xf_train.view(), yf_train.view(), seed) {
                Ok(fold_model) => {
                    let xf_test = x_full.select(Axis(0), fold);
                    let yf_test = y_full.select(Axis(0), fold);
                    let fold_pred = fold_model.predict(xf_test.view());
                    fold_scores.push(metrics::r2(yf_test.view(), fold_pred.view()));
                }
                Err(error) => {
                    log::warn!("variant '{variant}' failed on one fold: {error}");
                }
            }
        }

        Ok(ModelResult {
            variant,
            predictions,
            probabilities: None,
            metrics,
            cross_validation: metrics::summarize_folds(&fold_scores),
            importance: ranked_importance(model.feature_importance(), feature_names),
        })
    }

    fn ranked_importance(
        importance: Option<Array1<f64>>,
        feature_names: &[String],
    ) -> Option<Vec<(String, f64)>> {
        importance.map(|values| {
            feature_names
                .iter()
                .cloned()
                .zip(values.iter().copied())
                .sorted_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal))
                .collect()
        })
    }
}
