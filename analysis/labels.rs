// analysis/labels.rs

//! # Risk Label Derivation
//!
//! Turns the continuous outcome into the three co-derived label views the
//! rest of the pipeline consumes: the outcome itself, a binary high-risk
//! flag, and a three-level ordinal bucket. Both thresholds come from
//! interpolated percentiles of the *full* sample, computed once before any
//! split, so every model sees labels cut at identical points.

use crate::diagnostics::Diagnostic;
use crate::metrics::interpolated_quantile;
use ndarray::{Array1, ArrayView1};
use thiserror::Error;

/// Three views of one outcome, plus the thresholds that produced them.
#[derive(Debug, Clone)]
pub struct LabelSet {
    /// The outcome, unchanged.
    pub continuous: Array1<f64>,
    /// 1 where the outcome reaches the 75th percentile, else 0.
    pub binary: Array1<f64>,
    /// 0 below/at the 25th percentile, 2 at/above the 75th, 1 between.
    pub ordinal: Array1<u8>,
    pub high_threshold: f64,
    pub low_threshold: f64,
}

#[derive(Error, Debug)]
pub enum LabelError {
    #[error("Cannot derive labels from an empty outcome vector.")]
    EmptyOutcome,
    #[error(
        "The outcome vector contains non-finite values; labels would be meaningless. The loader \
         should have rejected this input."
    )]
    NonFiniteOutcome,
}

/// Derives all three label views. The low bucket wins ties when the two
/// thresholds coincide, so a degenerate outcome still yields a total
/// labeling; the collapse is surfaced as a diagnostic.
pub fn derive(outcome: ArrayView1<f64>) -> Result<(LabelSet, Vec<Diagnostic>), LabelError> {
    if outcome.is_empty() {
        return Err(LabelError::EmptyOutcome);
    }
    if outcome.iter().any(|v| !v.is_finite()) {
        return Err(LabelError::NonFiniteOutcome);
    }

    let values = outcome.to_vec();
    let high_threshold = interpolated_quantile(&values, 0.75);
    let low_threshold = interpolated_quantile(&values, 0.25);

    let binary = outcome.mapv(|v| if v >= high_threshold { 1.0 } else { 0.0 });
    let ordinal = outcome.mapv(|v| {
        if v <= low_threshold {
            0u8
        } else if v >= high_threshold {
            2u8
        } else {
            1u8
        }
    });

    let mut diagnostics = Vec::new();
    if high_threshold == low_threshold {
        log::warn!(
            "outcome P25 and P75 coincide at {high_threshold}; ordinal label collapses to two buckets"
        );
        diagnostics.push(Diagnostic::DegenerateThresholds {
            threshold: high_threshold,
        });
    } else {
        for bucket in 0u8..3 {
            if !ordinal.iter().any(|&b| b == bucket) {
                log::warn!("ordinal bucket {bucket} received no records");
                diagnostics.push(Diagnostic::EmptyBucket { bucket });
            }
        }
    }

    log::info!(
        "Labels derived: low threshold {:.3}, high threshold {:.3}, {} of {} records high-risk",
        low_threshold,
        high_threshold,
        binary.iter().filter(|&&b| b == 1.0).count(),
        binary.len()
    );

    Ok((
        LabelSet {
            continuous: outcome.to_owned(),
            binary,
            ordinal,
            high_threshold,
            low_threshold,
        },
        diagnostics,
    ))
}
