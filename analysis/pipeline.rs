// analysis/pipeline.rs

//! # End-to-End Orchestration
//!
//! Runs the whole study in one pass over an already-loaded survey frame:
//! feature preparation, label derivation, the classification and regression
//! harnesses, and respondent segmentation. Stages communicate through plain
//! values; nothing here mutates the frame or the configuration, so a second
//! `run` over the same inputs reproduces the first bit for bit.
//!
//! Recoverable conditions from every stage are pooled on the report in stage
//! order. Anything that would make the remaining stages meaningless, such as
//! a missing outcome column or a feature set that resolves to nothing, stops
//! the run with a `PipelineError` instead.

use crate::cluster::{self, ClusterError, ClusterOutcome};
use crate::config::{AnalysisConfig, ConfigError};
use crate::data::SurveyFrame;
use crate::diagnostics::Diagnostic;
use crate::features::{self, FeatureError, FeatureMatrix, FeatureSpec};
use crate::labels::{self, LabelError, LabelSet};
use crate::models::{BuiltinProbe, CapabilityProbe, ModelVariant, TaskKind};
use crate::train::{self, TaskEvaluation, TrainError};
use ndarray::Array1;
use thiserror::Error;

/// Everything one run produced, ready for the report writer.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    /// Respondent identifiers in frame row order.
    pub record_ids: Vec<String>,
    /// Name of the outcome column the run analyzed.
    pub outcome_column: String,
    /// Raw outcome values in frame row order.
    pub outcome: Array1<f64>,
    pub labels: LabelSet,
    pub features: FeatureMatrix,
    pub classification: TaskEvaluation,
    pub regression: TaskEvaluation,
    pub clusters: ClusterOutcome,
    /// Conditions met while preparing features and labels.
    pub preparation: Vec<Diagnostic>,
}

impl AnalysisReport {
    /// Every recoverable condition from every stage, in stage order.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.preparation
            .iter()
            .chain(self.classification.diagnostics.iter())
            .chain(self.regression.diagnostics.iter())
            .chain(self.clusters.diagnostics.iter())
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration is invalid: {0}")]
    Config(#[from] ConfigError),
    #[error("Feature preparation failed: {0}")]
    Feature(#[from] FeatureError),
    #[error("Label derivation failed: {0}")]
    Label(#[from] LabelError),
    #[error("Model evaluation failed: {0}")]
    Train(#[from] TrainError),
    #[error("Segmentation failed: {0}")]
    Cluster(#[from] ClusterError),
    #[error(
        "Outcome column '{0}' was not found in the loaded survey frame. \
         It must be present and fully numeric for labels to be derived."
    )]
    MissingOutcome(String),
}

/// Runs the full analysis with the compiled-in capability probe.
pub fn run(frame: &SurveyFrame, config: &AnalysisConfig) -> Result<AnalysisReport, PipelineError> {
    run_with_probe(frame, config, &BuiltinProbe)
}

/// Runs the full analysis, answering optional-variant availability through
/// the supplied probe.
pub fn run_with_probe(
    frame: &SurveyFrame,
    config: &AnalysisConfig,
    probe: &dyn CapabilityProbe,
) -> Result<AnalysisReport, PipelineError> {
    config.validate()?;

    let spec = FeatureSpec::from_config(config);
    let (matrix, mut preparation) = features::build(frame, &spec)?;
    log::info!(
        "prepared {} features over {} records ({} cell(s) imputed)",
        matrix.n_features(),
        matrix.n_samples(),
        matrix.imputed_cells
    );

    let outcome = frame
        .column(&config.outcome_column)
        .ok_or_else(|| PipelineError::MissingOutcome(config.outcome_column.clone()))?;
    let (labels, label_diagnostics) = labels::derive(outcome.view())?;
    preparation.extend(label_diagnostics);
    log::info!(
        "outcome thresholds: high >= {:.4}, low <= {:.4}",
        labels.high_threshold,
        labels.low_threshold
    );

    let classification = train::evaluate(
        &matrix,
        &labels,
        TaskKind::Classification,
        &ModelVariant::classification_defaults(),
        probe,
        config,
    )?;
    let regression = train::evaluate(
        &matrix,
        &labels,
        TaskKind::Regression,
        &ModelVariant::regression_defaults(),
        probe,
        config,
    )?;
    let clusters = cluster::segment(&matrix, outcome.view(), config)?;
    log::info!(
        "analysis complete: {} classifier(s), {} regressor(s), {} cluster(s)",
        classification.results.len(),
        regression.results.len(),
        clusters.selection.chosen_k
    );

    Ok(AnalysisReport {
        record_ids: frame.record_ids().to_vec(),
        outcome_column: config.outcome_column.clone(),
        outcome: outcome.clone(),
        labels,
        features: matrix,
        classification,
        regression,
        clusters,
        preparation,
    })
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Availability;
    use ndarray::Array1;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    struct DenyAll;
    impl CapabilityProbe for DenyAll {
        fn probe(&self, _capability: &str) -> Availability {
            Availability::Missing
        }
    }

    /// A compact frame with every required column, one prefix family, and an
    /// outcome driven by two of the features.
    fn sample_frame(n: usize) -> SurveyFrame {
        let mut rng = StdRng::seed_from_u64(11);
        let required = [
            "q1", "q2", "q3", "q4", "q7", "q28_1", "q28_2", "q28_3", "q28_5", "q29_1", "q29_2",
            "q29_3", "q29_4", "q27_1",
        ];
        let mut named: Vec<(String, Array1<f64>)> = Vec::new();
        let mut driver_a = Array1::zeros(n);
        let mut driver_b = Array1::zeros(n);
        for (c, name) in required.iter().enumerate() {
            let column = Array1::from_shape_fn(n, |_| rng.gen_range(1.0..5.0));
            if c == 0 {
                driver_a = column.clone();
            }
            if c == 1 {
                driver_b = column.clone();
            }
            named.push((name.to_string(), column));
        }
        named.push((
            "q9_1".to_string(),
            Array1::from_shape_fn(n, |_| rng.gen_range(0.0..1.0)),
        ));
        named.push((
            "q9_90".to_string(),
            Array1::from_shape_fn(n, |_| rng.gen_range(0.0..1.0)),
        ));
        let outcome =
            Array1::from_shape_fn(n, |i| 20.0 * driver_a[i] + 5.0 * driver_b[i] + (i % 3) as f64);
        named.push(("total_score".to_string(), outcome));
        let ids = (0..n).map(|i| format!("R{i:03}")).collect();
        SurveyFrame::from_columns(named, Some(ids)).unwrap()
    }

    fn small_config() -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.cluster_k_min = 2;
        config.cluster_k_max = 4;
        config.chosen_clusters = 3;
        config.cluster_restarts = 3;
        config.profile_features = vec!["q2".to_string(), "q1".to_string(), "q7".to_string()];
        config
    }

    #[test]
    fn full_run_produces_consistent_shapes() {
        let frame = sample_frame(90);
        let report = run(&frame, &small_config()).unwrap();

        assert_eq!(report.record_ids.len(), 90);
        assert_eq!(report.outcome.len(), 90);
        assert_eq!(report.features.n_samples(), 90);
        // q9_90 is suppressed, so the family contributes a single column.
        assert_eq!(report.features.n_features(), 15);
        assert!(!report.classification.results.is_empty());
        assert!(!report.regression.results.is_empty());
        assert_eq!(report.clusters.assignment.assignments.len(), 90);
        assert_eq!(report.clusters.selection.chosen_k, 3);
    }

    #[test]
    fn runs_are_reproducible() {
        let frame = sample_frame(80);
        let config = small_config();
        let a = run(&frame, &config).unwrap();
        let b = run(&frame, &config).unwrap();
        assert_eq!(a.labels.high_threshold, b.labels.high_threshold);
        assert_eq!(a.classification.split, b.classification.split);
        assert_eq!(
            a.clusters.assignment.assignments,
            b.clusters.assignment.assignments
        );
    }

    #[test]
    fn missing_outcome_column_stops_the_run() {
        let n = 40;
        let named = vec![
            (
                "q1".to_string(),
                Array1::from_shape_fn(n, |i| i as f64 % 5.0),
            ),
            (
                "q2".to_string(),
                Array1::from_shape_fn(n, |i| i as f64 % 3.0),
            ),
        ];
        let ids = (0..n).map(|i| i.to_string()).collect();
        let frame = SurveyFrame::from_columns(named, Some(ids)).unwrap();
        let mut config = small_config();
        config.required_features = vec!["q1".to_string(), "q2".to_string()];
        config.outcome_column = "absent".to_string();
        let err = run(&frame, &config).unwrap_err();
        assert!(matches!(err, PipelineError::MissingOutcome(name) if name == "absent"));
    }

    #[test]
    fn probe_denial_surfaces_as_a_skip_diagnostic() {
        let frame = sample_frame(80);
        let report = run_with_probe(&frame, &small_config(), &DenyAll).unwrap();
        let skipped: Vec<_> = report
            .diagnostics()
            .filter(|d| matches!(d, Diagnostic::VariantSkipped { .. }))
            .collect();
        assert_eq!(skipped.len(), 1);
        assert!(!report
            .classification
            .results
            .contains_key(&ModelVariant::ExtremeBoostingClassifier));
    }
}
