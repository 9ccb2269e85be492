// analysis/features.rs

//! # Leakage-Safe Feature Construction
//!
//! Builds the numeric feature matrix the models and the clustering consume.
//! The hard rule enforced here: no column that participated in computing the
//! outcome may enter the matrix, whether named directly or scooped up by a
//! prefix family. Missing values are imputed with the column's own median,
//! computed over the observed cells of the matrix itself, never from the
//! outcome.
//!
//! The matrix carries two aligned views of the data: standardized values for
//! model fitting and clustering, and raw imputed values so cluster profiles
//! can be reported in original units. Standardization is deliberately fit on
//! the full sample before any split.

use crate::config::AnalysisConfig;
use crate::data::SurveyFrame;
use crate::diagnostics::Diagnostic;
use crate::metrics::interpolated_quantile;
use ndarray::{Array1, Array2};
use std::collections::HashSet;
use thiserror::Error;

/// Which columns become features, and which are banned.
#[derive(Debug, Clone)]
pub struct FeatureSpec {
    /// Columns that must exist; their absence is a configuration error.
    pub required: Vec<String>,
    /// Prefixes expanded against the schema (multi-answer question blocks).
    pub prefix_families: Vec<String>,
    /// Suffixes pruned from family expansion (free-text "other" markers).
    pub suppressed_suffixes: Vec<String>,
    /// The exact inputs of the outcome computation; never eligible.
    pub excluded: Vec<String>,
    /// The outcome column itself; never eligible.
    pub outcome: String,
}

impl FeatureSpec {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        FeatureSpec {
            required: config.required_features.clone(),
            prefix_families: config.prefix_families.clone(),
            suppressed_suffixes: config.suppressed_suffixes.clone(),
            excluded: config.excluded_columns.clone(),
            outcome: config.outcome_column.clone(),
        }
    }
}

/// The shared, immutable matrix both the harness and the cluster selector
/// read. Rows align with the records of the source frame.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    pub feature_names: Vec<String>,
    /// Zero-mean, unit-variance values; what models and clustering see.
    pub standardized: Array2<f64>,
    /// Imputed but unscaled values; what profile reports see.
    pub raw: Array2<f64>,
    /// Per-column means removed during scaling.
    pub means: Array1<f64>,
    /// Per-column divisors applied during scaling (1.0 for constant columns).
    pub scales: Array1<f64>,
    /// Number of cells filled by median imputation.
    pub imputed_cells: usize,
}

impl FeatureMatrix {
    pub fn n_samples(&self) -> usize {
        self.standardized.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.standardized.ncols()
    }

    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|f| f == name)
    }
}

/// Fatal feature-construction failures (configuration errors).
#[derive(Error, Debug)]
pub enum FeatureError {
    #[error(
        "The required feature column '{0}' was not found among the numeric columns of the input. \
         Please check spelling and case, and that the column holds numeric data."
    )]
    MissingColumn(String),
    #[error(
        "The column '{0}' is an input of the outcome computation and cannot be requested as a \
         feature; using it would leak the target."
    )]
    ExcludedColumnRequested(String),
    #[error("No usable feature columns remain after resolution; cannot build a feature matrix.")]
    NoUsableColumns,
}

/// Builds the feature matrix. Recoverable column problems (a fully missing
/// column, a zero-variance column) are dropped or flagged through the
/// returned diagnostics; only schema-level problems are errors.
pub fn build(
    frame: &SurveyFrame,
    spec: &FeatureSpec,
) -> Result<(FeatureMatrix, Vec<Diagnostic>), FeatureError> {
    let resolved = internal::resolve_columns(frame, spec)?;
    let n = frame.n_rows();
    let mut diagnostics = Vec::new();

    let mut kept_names = Vec::with_capacity(resolved.len());
    let mut raw_columns: Vec<Array1<f64>> = Vec::with_capacity(resolved.len());
    let mut imputed_cells = 0usize;

    for name in resolved {
        let column = frame
            .column(&name)
            .ok_or_else(|| FeatureError::MissingColumn(name.clone()))?;
        let observed: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
        if observed.is_empty() {
            log::warn!("feature column '{name}' has no observed values; dropping it");
            diagnostics.push(Diagnostic::EmptyColumn {
                column: name.clone(),
            });
            continue;
        }
        let missing = n - observed.len();
        imputed_cells += missing;
        let median = interpolated_quantile(&observed, 0.5);
        let filled = column.mapv(|v| if v.is_finite() { v } else { median });
        kept_names.push(name);
        raw_columns.push(filled);
    }

    if kept_names.is_empty() {
        return Err(FeatureError::NoUsableColumns);
    }

    let p = kept_names.len();
    let mut raw = Array2::zeros((n, p));
    for (j, column) in raw_columns.iter().enumerate() {
        raw.column_mut(j).assign(column);
    }

    let mut means = Array1::zeros(p);
    let mut scales = Array1::ones(p);
    let mut standardized = raw.clone();
    for j in 0..p {
        let column = raw.column(j);
        let mean = column.mean().unwrap_or(0.0);
        let variance = column.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
        let std = variance.sqrt();
        means[j] = mean;
        if std > f64::EPSILON {
            scales[j] = std;
        } else {
            log::warn!(
                "feature column '{}' has zero variance; centering only",
                kept_names[j]
            );
            diagnostics.push(Diagnostic::ConstantColumn {
                column: kept_names[j].clone(),
            });
        }
        let scale = scales[j];
        standardized
            .column_mut(j)
            .mapv_inplace(|v| (v - mean) / scale);
    }

    log::info!(
        "Feature matrix built: {} records x {} features, {} imputed cells",
        n,
        p,
        imputed_cells
    );

    Ok((
        FeatureMatrix {
            feature_names: kept_names,
            standardized,
            raw,
            means,
            scales,
            imputed_cells,
        },
        diagnostics,
    ))
}

mod internal {
    use super::*;

    /// Resolves the ordered feature-column list: required columns first, then
    /// prefix-family matches in schema order, with outcome ingredients and
    /// suppressed suffixes filtered out.
    pub(super) fn resolve_columns(
        frame: &SurveyFrame,
        spec: &FeatureSpec,
    ) -> Result<Vec<String>, FeatureError> {
        let excluded: HashSet<&str> = spec.excluded.iter().map(|s| s.as_str()).collect();
        let mut seen: HashSet<String> = HashSet::new();
        let mut resolved = Vec::new();

        for name in &spec.required {
            if excluded.contains(name.as_str()) || *name == spec.outcome {
                return Err(FeatureError::ExcludedColumnRequested(name.clone()));
            }
            if !frame.has_column(name) {
                return Err(FeatureError::MissingColumn(name.clone()));
            }
            if seen.insert(name.clone()) {
                resolved.push(name.clone());
            }
        }

        for prefix in &spec.prefix_families {
            for name in frame.column_names() {
                if !name.starts_with(prefix.as_str()) {
                    continue;
                }
                if spec
                    .suppressed_suffixes
                    .iter()
                    .any(|suffix| name.ends_with(suffix.as_str()))
                {
                    continue;
                }
                if excluded.contains(name.as_str()) || *name == spec.outcome {
                    continue;
                }
                if seen.insert(name.clone()) {
                    resolved.push(name.clone());
                }
            }
        }

        Ok(resolved)
    }
}
