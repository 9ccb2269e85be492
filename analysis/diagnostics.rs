// analysis/diagnostics.rs

//! Structured diagnostics emitted by the pipeline stages.
//!
//! Every recoverable condition (a dropped column, a degenerate label
//! threshold, a skipped model variant) is recorded as a [`Diagnostic`] value
//! on the final report instead of being narrated to stdout. Fatal conditions
//! use the per-module error enums and never appear here.

use serde::Serialize;

/// A recoverable, reportable event observed during one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    /// A feature column existed in the schema but held no observed values;
    /// it was dropped from the matrix.
    EmptyColumn { column: String },
    /// A feature column had zero variance after imputation and was carried
    /// through unscaled.
    ConstantColumn { column: String },
    /// P25 and P75 of the outcome coincide; the ordinal label collapses to
    /// two effective buckets.
    DegenerateThresholds { threshold: f64 },
    /// An ordinal bucket received no records.
    EmptyBucket { bucket: u8 },
    /// Silhouette scoring failed for one candidate cluster count; that
    /// candidate was excluded from best-k selection.
    SilhouetteFailed { k: usize, reason: String },
    /// An optional model variant was requested but its backing capability is
    /// not compiled in.
    VariantSkipped { variant: String, requires: String },
    /// A model variant failed to fit; its result is absent while all other
    /// variants proceed.
    VariantFailed { variant: String, reason: String },
    /// AUC-ROC was undefined because the test partition held one class.
    AucUndefined { variant: String },
}

impl Diagnostic {
    /// Short tag used in log lines and report rows.
    pub fn kind(&self) -> &'static str {
        match self {
            Diagnostic::EmptyColumn { .. } => "empty_column",
            Diagnostic::ConstantColumn { .. } => "constant_column",
            Diagnostic::DegenerateThresholds { .. } => "degenerate_thresholds",
            Diagnostic::EmptyBucket { .. } => "empty_bucket",
            Diagnostic::SilhouetteFailed { .. } => "silhouette_failed",
            Diagnostic::VariantSkipped { .. } => "variant_skipped",
            Diagnostic::VariantFailed { .. } => "variant_failed",
            Diagnostic::AucUndefined { .. } => "auc_undefined",
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Diagnostic::EmptyColumn { column } => {
                write!(f, "column '{column}' has no observed values and was dropped")
            }
            Diagnostic::ConstantColumn { column } => {
                write!(f, "column '{column}' has zero variance and was left unscaled")
            }
            Diagnostic::DegenerateThresholds { threshold } => write!(
                f,
                "P25 and P75 of the outcome coincide at {threshold}; ordinal label has two effective buckets"
            ),
            Diagnostic::EmptyBucket { bucket } => {
                write!(f, "ordinal bucket {bucket} received no records")
            }
            Diagnostic::SilhouetteFailed { k, reason } => {
                write!(f, "silhouette failed for k={k}: {reason}")
            }
            Diagnostic::VariantSkipped { variant, requires } => {
                write!(f, "variant '{variant}' skipped: requires capability '{requires}'")
            }
            Diagnostic::VariantFailed { variant, reason } => {
                write!(f, "variant '{variant}' failed to fit: {reason}")
            }
            Diagnostic::AucUndefined { variant } => write!(
                f,
                "AUC-ROC undefined for variant '{variant}': test partition holds a single class"
            ),
        }
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_variant_and_fields() {
        let diagnostic = Diagnostic::VariantSkipped {
            variant: "extreme_boosting_classifier".to_string(),
            requires: "extreme-boost".to_string(),
        };
        let value = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(
            value["VariantSkipped"]["variant"],
            "extreme_boosting_classifier"
        );
        assert_eq!(value["VariantSkipped"]["requires"], "extreme-boost");
    }

    #[test]
    fn kind_tags_are_stable_snake_case() {
        let samples = [
            (
                Diagnostic::EmptyColumn {
                    column: "q9_1".to_string(),
                },
                "empty_column",
            ),
            (
                Diagnostic::DegenerateThresholds { threshold: 3.0 },
                "degenerate_thresholds",
            ),
            (
                Diagnostic::SilhouetteFailed {
                    k: 4,
                    reason: "one cluster".to_string(),
                },
                "silhouette_failed",
            ),
        ];
        for (diagnostic, expected) in samples {
            assert_eq!(diagnostic.kind(), expected);
        }
    }

    #[test]
    fn display_names_the_offending_column() {
        let diagnostic = Diagnostic::EmptyColumn {
            column: "q10_3".to_string(),
        };
        assert!(diagnostic.to_string().contains("q10_3"));
    }
}
