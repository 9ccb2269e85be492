// analysis/models/mod.rs

//! # Estimator Catalog
//!
//! The closed set of model variants the harness can train, the capability
//! traits they implement, and the dispatcher that turns a [`ModelVariant`]
//! into a fitted estimator. The harness works exclusively through
//! [`Classifier`] and [`Regressor`] trait objects; no concrete estimator type
//! crosses the module boundary.
//!
//! One variant (`ExtremeBoostingClassifier`) stands behind a compile-time
//! capability. Whether it exists in a given build is answered by a
//! [`CapabilityProbe`] *before* the harness assembles its attempt list, so no
//! error-driven control flow decides which variants run.

pub mod boost;
pub mod forest;
pub mod linear;
pub mod tree;

use crate::linalg::LinalgError;
use ndarray::{Array1, ArrayView1, ArrayView2};
use thiserror::Error;

pub(crate) fn sigmoid(eta: f64) -> f64 {
    1.0 / (1.0 + (-eta).exp())
}

/// Every model family the pipeline knows. Closed by design: adding a variant
/// means adding an estimator and a dispatch arm, not reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ModelVariant {
    LogisticRegression,
    RandomForestClassifier,
    GradientBoostingClassifier,
    ExtremeBoostingClassifier,
    RidgeRegression,
    RandomForestRegressor,
}

/// Which label a variant trains against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Classification,
    Regression,
}

/// How a classification variant compensates class imbalance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    /// Per-class weights `n / (k * n_c)`.
    Balanced,
    /// No reweighting.
    Uniform,
    /// Positive instances weighted by `n_neg / n_pos`.
    PositiveRescale,
}

impl ModelVariant {
    pub fn name(&self) -> &'static str {
        match self {
            ModelVariant::LogisticRegression => "logistic_regression",
            ModelVariant::RandomForestClassifier => "random_forest_classifier",
            ModelVariant::GradientBoostingClassifier => "gradient_boosting_classifier",
            ModelVariant::ExtremeBoostingClassifier => "extreme_boosting_classifier",
            ModelVariant::RidgeRegression => "ridge_regression",
            ModelVariant::RandomForestRegressor => "random_forest_regressor",
        }
    }

    pub fn task(&self) -> TaskKind {
        match self {
            ModelVariant::LogisticRegression
            | ModelVariant::RandomForestClassifier
            | ModelVariant::GradientBoostingClassifier
            | ModelVariant::ExtremeBoostingClassifier => TaskKind::Classification,
            ModelVariant::RidgeRegression | ModelVariant::RandomForestRegressor => {
                TaskKind::Regression
            }
        }
    }

    /// The optional capability a variant needs, if any.
    pub fn required_capability(&self) -> Option<&'static str> {
        match self {
            ModelVariant::ExtremeBoostingClassifier => Some("extreme-boost"),
            _ => None,
        }
    }

    pub fn weighting(&self) -> Weighting {
        match self {
            ModelVariant::LogisticRegression | ModelVariant::RandomForestClassifier => {
                Weighting::Balanced
            }
            ModelVariant::GradientBoostingClassifier => Weighting::Uniform,
            ModelVariant::ExtremeBoostingClassifier => Weighting::PositiveRescale,
            // Regression variants never reweight.
            ModelVariant::RidgeRegression | ModelVariant::RandomForestRegressor => {
                Weighting::Uniform
            }
        }
    }

    /// The default classification attempt list, in comparison order.
    pub fn classification_defaults() -> Vec<ModelVariant> {
        vec![
            ModelVariant::LogisticRegression,
            ModelVariant::RandomForestClassifier,
            ModelVariant::GradientBoostingClassifier,
            ModelVariant::ExtremeBoostingClassifier,
        ]
    }

    /// The default regression attempt list.
    pub fn regression_defaults() -> Vec<ModelVariant> {
        vec![
            ModelVariant::RidgeRegression,
            ModelVariant::RandomForestRegressor,
        ]
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether an optional capability is compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Present,
    Missing,
}

/// Answers capability questions before the harness builds its attempt list.
pub trait CapabilityProbe {
    fn probe(&self, capability: &str) -> Availability;
}

/// The production probe, backed by compile-time feature flags.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinProbe;

impl CapabilityProbe for BuiltinProbe {
    fn probe(&self, capability: &str) -> Availability {
        match capability {
            "extreme-boost" => {
                if cfg!(feature = "extreme-boost") {
                    Availability::Present
                } else {
                    Availability::Missing
                }
            }
            _ => Availability::Missing,
        }
    }
}

/// Errors raised while fitting a single estimator. The harness records these
/// as that variant's absence; they never abort the task.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Cannot fit a model on an empty training partition.")]
    EmptyTrainingSet,
    #[error("Linear algebra failure while fitting: {0}")]
    Linalg(#[from] LinalgError),
    #[error("Variant '{0}' was requested but its backing capability is not compiled in.")]
    CapabilityMissing(&'static str),
    #[error("Variant '{variant}' is a {actual} model and cannot be fit as {requested}.")]
    WrongTask {
        variant: &'static str,
        actual: &'static str,
        requested: &'static str,
    },
}

/// A fitted classification estimator. Probabilities are for the positive
/// class; `feature_importance` is `None` for families without a native
/// importance notion.
pub trait Classifier: Send + Sync {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64>;
    fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64>;
    fn feature_importance(&self) -> Option<Array1<f64>>;
}

/// A fitted regression estimator.
pub trait Regressor: Send + Sync {
    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64>;
    fn feature_importance(&self) -> Option<Array1<f64>>;
}

/// Fits a classification variant on the given partition. `seed` drives every
/// stochastic element (bootstraps, feature subsampling) so repeated fits are
/// identical.
pub fn fit_classifier(
    variant: ModelVariant,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    sample_weights: ArrayView1<f64>,
    seed: u64,
) -> Result<Box<dyn Classifier>, ModelError> {
    if x.nrows() == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    match variant {
        ModelVariant::LogisticRegression => Ok(Box::new(linear::LogisticModel::fit(
            x,
            y,
            sample_weights,
        )?)),
        ModelVariant::RandomForestClassifier => Ok(Box::new(forest::ForestClassifier::fit(
            x,
            y,
            sample_weights,
            seed,
        )?)),
        ModelVariant::GradientBoostingClassifier => Ok(Box::new(boost::GradientBoosting::fit(
            x,
            y,
            sample_weights,
        )?)),
        ModelVariant::ExtremeBoostingClassifier => {
            #[cfg(feature = "extreme-boost")]
            {
                Ok(Box::new(boost::ExtremeBoosting::fit(x, y, sample_weights)?))
            }
            #[cfg(not(feature = "extreme-boost"))]
            {
                Err(ModelError::CapabilityMissing("extreme-boost"))
            }
        }
        ModelVariant::RidgeRegression | ModelVariant::RandomForestRegressor => {
            Err(ModelError::WrongTask {
                variant: variant.name(),
                actual: "regression",
                requested: "classification",
            })
        }
    }
}

/// Fits a regression variant on the given partition.
pub fn fit_regressor(
    variant: ModelVariant,
    x: ArrayView2<f64>,
    y: ArrayView1<f64>,
    seed: u64,
) -> Result<Box<dyn Regressor>, ModelError> {
    if x.nrows() == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    match variant {
        ModelVariant::RidgeRegression => Ok(Box::new(linear::RidgeModel::fit(x, y)?)),
        ModelVariant::RandomForestRegressor => {
            Ok(Box::new(forest::ForestRegressor::fit(x, y, seed)?))
        }
        ModelVariant::LogisticRegression
        | ModelVariant::RandomForestClassifier
        | ModelVariant::GradientBoostingClassifier
        | ModelVariant::ExtremeBoostingClassifier => Err(ModelError::WrongTask {
            variant: variant.name(),
            actual: "classification",
            requested: "regression",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_tasks_partition_the_catalog() {
        for variant in ModelVariant::classification_defaults() {
            assert_eq!(variant.task(), TaskKind::Classification);
        }
        for variant in ModelVariant::regression_defaults() {
            assert_eq!(variant.task(), TaskKind::Regression);
        }
    }

    #[test]
    fn only_the_gated_variant_requires_a_capability() {
        for variant in ModelVariant::classification_defaults()
            .into_iter()
            .chain(ModelVariant::regression_defaults())
        {
            let expects = variant == ModelVariant::ExtremeBoostingClassifier;
            assert_eq!(variant.required_capability().is_some(), expects);
        }
    }

    #[test]
    fn builtin_probe_tracks_the_compiled_feature() {
        let availability = BuiltinProbe.probe("extreme-boost");
        if cfg!(feature = "extreme-boost") {
            assert_eq!(availability, Availability::Present);
        } else {
            assert_eq!(availability, Availability::Missing);
        }
        assert_eq!(BuiltinProbe.probe("unknown"), Availability::Missing);
    }
}
