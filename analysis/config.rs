// analysis/config.rs

//! # Analysis Configuration
//!
//! One [`AnalysisConfig`] value drives a whole run: the survey schema (which
//! columns feed the features, which computed the outcome and are therefore
//! banned from the matrix), split and cross-validation controls, and the
//! clustering scan. Defaults reproduce the reference survey analysis; a TOML
//! file can override any subset of fields.
//!
//! Validation failures here are configuration errors in the sense of the
//! error-handling design: they abort the run before any model is trained.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use thiserror::Error;

/// Errors raised while reading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading configuration: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Configuration file is not valid TOML: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("test_fraction must lie strictly between 0 and 1, got {0}")]
    InvalidTestFraction(f64),
    #[error("cv_folds must be at least 2, got {0}")]
    InvalidFolds(usize),
    #[error("cluster scan range [{min}, {max}] is empty or starts below 2")]
    InvalidClusterRange { min: usize, max: usize },
    #[error("chosen_clusters must be at least 2, got {0}")]
    InvalidChosenClusters(usize),
    #[error("cluster_restarts must be at least 1, got {0}")]
    InvalidRestarts(usize),
    #[error(
        "column '{0}' appears in both the feature schema and the excluded outcome inputs; \
         a column cannot be a feature and an outcome ingredient at once"
    )]
    FeatureOutcomeOverlap(String),
    #[error("the outcome column '{0}' is listed as a feature; this would leak the target")]
    OutcomeListedAsFeature(String),
}

/// Complete configuration for one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Column holding the precomputed continuous outcome.
    pub outcome_column: String,
    /// Optional identifier column carried into the per-record cluster table.
    pub id_column: Option<String>,
    /// Single columns that must exist in the input schema.
    pub required_features: Vec<String>,
    /// Column-name prefixes expanded against the schema (multi-answer blocks).
    pub prefix_families: Vec<String>,
    /// Suffixes pruned from prefix-family expansion (free-text markers).
    pub suppressed_suffixes: Vec<String>,
    /// The exact set of columns used to compute the outcome; never features.
    pub excluded_columns: Vec<String>,
    /// Features summarized per cluster, in raw units.
    pub profile_features: Vec<String>,
    /// Seed for the shared train/test split and fold plans.
    pub split_seed: u64,
    /// Fraction of records held out for testing.
    pub test_fraction: f64,
    /// Folds for cross-validation over the full matrix.
    pub cv_folds: usize,
    /// Inclusive lower bound of the cluster-count scan.
    pub cluster_k_min: usize,
    /// Inclusive upper bound of the cluster-count scan.
    pub cluster_k_max: usize,
    /// Seeded restarts per candidate cluster count.
    pub cluster_restarts: usize,
    /// Cluster count used for the final fit, independent of the scan winner.
    pub chosen_clusters: usize,
    /// Seed for clustering restarts.
    pub cluster_seed: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            outcome_column: "total_score".to_string(),
            id_column: None,
            required_features: [
                "q1", "q2", "q3", "q4", "q7", "q28_1", "q28_2", "q28_3", "q28_5", "q29_1",
                "q29_2", "q29_3", "q29_4", "q27_1",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            prefix_families: vec!["q9_".to_string(), "q10_".to_string(), "q11_".to_string()],
            suppressed_suffixes: vec!["_90".to_string()],
            excluded_columns: ["q17", "q19", "q22", "q23", "q25", "q26"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            profile_features: vec!["q2".to_string(), "q1".to_string(), "q7".to_string()],
            split_seed: 42,
            test_fraction: 0.2,
            cv_folds: 5,
            cluster_k_min: 2,
            cluster_k_max: 10,
            cluster_restarts: 10,
            chosen_clusters: 5,
            cluster_seed: 42,
        }
    }
}

impl AnalysisConfig {
    /// Reads a TOML configuration file; absent fields fall back to defaults.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: AnalysisConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every run-aborting constraint on the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(ConfigError::InvalidTestFraction(self.test_fraction));
        }
        if self.cv_folds < 2 {
            return Err(ConfigError::InvalidFolds(self.cv_folds));
        }
        if self.cluster_k_min < 2 || self.cluster_k_max < self.cluster_k_min {
            return Err(ConfigError::InvalidClusterRange {
                min: self.cluster_k_min,
                max: self.cluster_k_max,
            });
        }
        if self.chosen_clusters < 2 {
            return Err(ConfigError::InvalidChosenClusters(self.chosen_clusters));
        }
        if self.cluster_restarts == 0 {
            return Err(ConfigError::InvalidRestarts(self.cluster_restarts));
        }

        let excluded: HashSet<&str> = self.excluded_columns.iter().map(|s| s.as_str()).collect();
        for feature in &self.required_features {
            if excluded.contains(feature.as_str()) {
                return Err(ConfigError::FeatureOutcomeOverlap(feature.clone()));
            }
            if *feature == self.outcome_column {
                return Err(ConfigError::OutcomeListedAsFeature(feature.clone()));
            }
        }
        Ok(())
    }
}
