// analysis/report.rs

//! # Result Aggregation
//!
//! Flattens an [`AnalysisReport`] into five tables and writes them as CSV.
//! No statistics are computed here; the tables restate what the harnesses and
//! the segmentation already produced, one fact per cell, so downstream
//! consumers never need the in-memory structures.
//!
//! Variants that never produced metrics still appear in the comparison
//! tables: a `status` column distinguishes fitted rows (`ok`) from variants
//! skipped for a missing capability (`skipped`) and variants whose fit
//! failed (`failed`). Their metric cells stay empty.

use crate::diagnostics::Diagnostic;
use crate::pipeline::AnalysisReport;
use crate::train::{MetricBundle, TaskEvaluation};
use polars::prelude::{CsvWriter, DataFrame, NamedFrom, PolarsError, SerWriter, Series};
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CLASSIFICATION_TABLE: &str = "classification_comparison.csv";
pub const REGRESSION_TABLE: &str = "regression_comparison.csv";
pub const IMPORTANCE_TABLE: &str = "feature_importance.csv";
pub const ASSIGNMENTS_TABLE: &str = "clustering_results.csv";
pub const CLUSTER_SUMMARY_TABLE: &str = "cluster_summary.csv";

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Error from the underlying Polars library: {0}")]
    Polars(#[from] PolarsError),
    #[error("Failed to write report file: {0}")]
    Io(#[from] std::io::Error),
}

/// The five report tables, in memory.
#[derive(Debug, Clone)]
pub struct ReportTables {
    pub classification: DataFrame,
    pub regression: DataFrame,
    pub importance: DataFrame,
    pub assignments: DataFrame,
    pub cluster_summary: DataFrame,
}

/// Builds all five tables from one finished run.
pub fn tables(report: &AnalysisReport) -> Result<ReportTables, ReportError> {
    Ok(ReportTables {
        classification: internal::classification_table(&report.classification)?,
        regression: internal::regression_table(&report.regression)?,
        importance: internal::importance_table(&report.classification, &report.regression)?,
        assignments: internal::assignments_table(report)?,
        cluster_summary: internal::cluster_summary_table(report)?,
    })
}

/// Builds the tables and writes them under `out_dir`, creating it if needed.
/// Returns the written paths in table order.
pub fn write_all(report: &AnalysisReport, out_dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
    let built = tables(report)?;
    write_tables(built, out_dir)
}

/// Writes already-built tables under `out_dir`.
pub fn write_tables(built: ReportTables, out_dir: &Path) -> Result<Vec<PathBuf>, ReportError> {
    std::fs::create_dir_all(out_dir)?;
    let named = [
        (CLASSIFICATION_TABLE, built.classification),
        (REGRESSION_TABLE, built.regression),
        (IMPORTANCE_TABLE, built.importance),
        (ASSIGNMENTS_TABLE, built.assignments),
        (CLUSTER_SUMMARY_TABLE, built.cluster_summary),
    ];
    let mut written = Vec::with_capacity(named.len());
    for (name, mut frame) in named {
        let path = out_dir.join(name);
        let file = File::create(&path)?;
        CsvWriter::new(file).finish(&mut frame)?;
        log::info!("wrote {} ({} rows)", path.display(), frame.height());
        written.push(path);
    }
    Ok(written)
}

mod internal {
    use super::*;

    /// Status strings for the comparison tables.
    const STATUS_OK: &str = "ok";
    const STATUS_SKIPPED: &str = "skipped";
    const STATUS_FAILED: &str = "failed";

    pub(super) fn classification_table(
        evaluation: &TaskEvaluation,
    ) -> Result<DataFrame, ReportError> {
        let mut model = Vec::new();
        let mut accuracy: Vec<Option<f64>> = Vec::new();
        let mut f1: Vec<Option<f64>> = Vec::new();
        let mut auc: Vec<Option<f64>> = Vec::new();
        let mut cv_mean: Vec<Option<f64>> = Vec::new();
        let mut cv_std: Vec<Option<f64>> = Vec::new();
        let mut status = Vec::new();

        for (variant, result) in &evaluation.results {
            let MetricBundle::Classification {
                accuracy: acc,
                f1: f,
                auc_roc,
            } = result.metrics
            else {
                continue;
            };
            model.push(variant.name().to_string());
            accuracy.push(Some(acc));
            f1.push(Some(f));
            auc.push(auc_roc);
            cv_mean.push(Some(result.cross_validation.mean));
            cv_std.push(Some(result.cross_validation.std));
            status.push(STATUS_OK.to_string());
        }
        append_absent_variants(
            evaluation,
            &mut model,
            &mut status,
            &mut [&mut accuracy, &mut f1, &mut auc, &mut cv_mean, &mut cv_std],
        );

        let frame = DataFrame::new(vec![
            Series::new("model".into(), model).into(),
            Series::new("accuracy".into(), accuracy).into(),
            Series::new("f1_score".into(), f1).into(),
            Series::new("auc_roc".into(), auc).into(),
            Series::new("cv_f1_mean".into(), cv_mean).into(),
            Series::new("cv_f1_std".into(), cv_std).into(),
            Series::new("status".into(), status).into(),
        ])?;
        Ok(frame)
    }

    pub(super) fn regression_table(evaluation: &TaskEvaluation) -> Result<DataFrame, ReportError> {
        let mut model = Vec::new();
        let mut r2: Vec<Option<f64>> = Vec::new();
        let mut rmse: Vec<Option<f64>> = Vec::new();
        let mut mae: Vec<Option<f64>> = Vec::new();
        let mut cv_mean: Vec<Option<f64>> = Vec::new();
        let mut cv_std: Vec<Option<f64>> = Vec::new();
        let mut status = Vec::new();

        for (variant, result) in &evaluation.results {
            let MetricBundle::Regression {
                r2: r,
                rmse: rm,
                mae: ma,
            } = result.metrics
            else {
                continue;
            };
            model.push(variant.name().to_string());
            r2.push(Some(r));
            rmse.push(Some(rm));
            mae.push(Some(ma));
            cv_mean.push(Some(result.cross_validation.mean));
            cv_std.push(Some(result.cross_validation.std));
            status.push(STATUS_OK.to_string());
        }
        append_absent_variants(
            evaluation,
            &mut model,
            &mut status,
            &mut [&mut r2, &mut rmse, &mut mae, &mut cv_mean, &mut cv_std],
        );

        let frame = DataFrame::new(vec![
            Series::new("model".into(), model).into(),
            Series::new("r2".into(), r2).into(),
            Series::new("rmse".into(), rmse).into(),
            Series::new("mae".into(), mae).into(),
            Series::new("cv_r2_mean".into(), cv_mean).into(),
            Series::new("cv_r2_std".into(), cv_std).into(),
            Series::new("status".into(), status).into(),
        ])?;
        Ok(frame)
    }

    /// Adds one all-null row per variant the harness skipped or failed.
    fn append_absent_variants(
        evaluation: &TaskEvaluation,
        model: &mut Vec<String>,
        status: &mut Vec<String>,
        metric_columns: &mut [&mut Vec<Option<f64>>],
    ) {
        for diagnostic in &evaluation.diagnostics {
            let (variant, label) = match diagnostic {
                Diagnostic::VariantSkipped { variant, .. } => (variant, STATUS_SKIPPED),
                Diagnostic::VariantFailed { variant, .. } => (variant, STATUS_FAILED),
                _ => continue,
            };
            model.push(variant.clone());
            status.push(label.to_string());
            for column in metric_columns.iter_mut() {
                column.push(None);
            }
        }
    }

    pub(super) fn importance_table(
        classification: &TaskEvaluation,
        regression: &TaskEvaluation,
    ) -> Result<DataFrame, ReportError> {
        let mut model = Vec::new();
        let mut feature = Vec::new();
        let mut importance = Vec::new();
        let mut rank: Vec<i64> = Vec::new();

        for evaluation in [classification, regression] {
            for (variant, result) in &evaluation.results {
                let Some(ranking) = &result.importance else {
                    continue;
                };
                for (position, (name, value)) in ranking.iter().enumerate() {
                    model.push(variant.name().to_string());
                    feature.push(name.clone());
                    importance.push(*value);
                    rank.push(position as i64 + 1);
                }
            }
        }

        let frame = DataFrame::new(vec![
            Series::new("model".into(), model).into(),
            Series::new("feature".into(), feature).into(),
            Series::new("importance".into(), importance).into(),
            Series::new("rank".into(), rank).into(),
        ])?;
        Ok(frame)
    }

    pub(super) fn assignments_table(report: &AnalysisReport) -> Result<DataFrame, ReportError> {
        let clusters: Vec<i64> = report
            .clusters
            .assignment
            .assignments
            .iter()
            .map(|&c| c as i64)
            .collect();
        let outcome: Vec<f64> = report.outcome.to_vec();
        let high_risk: Vec<i64> = report.labels.binary.iter().map(|&b| b as i64).collect();

        let frame = DataFrame::new(vec![
            Series::new("record_id".into(), report.record_ids.clone()).into(),
            Series::new("cluster".into(), clusters).into(),
            Series::new(report.outcome_column.as_str().into(), outcome).into(),
            Series::new("high_risk".into(), high_risk).into(),
        ])?;
        Ok(frame)
    }

    pub(super) fn cluster_summary_table(report: &AnalysisReport) -> Result<DataFrame, ReportError> {
        let profiles = &report.clusters.profiles;
        let mut columns = vec![
            Series::new(
                "cluster".into(),
                profiles.iter().map(|p| p.cluster as i64).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "size".into(),
                profiles.iter().map(|p| p.size as i64).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "share".into(),
                profiles.iter().map(|p| p.share).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "outcome_mean".into(),
                profiles.iter().map(|p| p.outcome_mean).collect::<Vec<_>>(),
            )
            .into(),
            Series::new(
                "outcome_std".into(),
                profiles.iter().map(|p| p.outcome_std).collect::<Vec<_>>(),
            )
            .into(),
        ];

        // Every profile carries the same feature list in the same order.
        let feature_names: Vec<String> = profiles
            .first()
            .map(|p| p.feature_means.iter().map(|(name, _)| name.clone()).collect())
            .unwrap_or_default();
        for (index, name) in feature_names.iter().enumerate() {
            let values: Vec<f64> = profiles.iter().map(|p| p.feature_means[index].1).collect();
            columns.push(Series::new(format!("mean_{name}").into(), values).into());
        }

        let frame = DataFrame::new(columns)?;
        Ok(frame)
    }
}
