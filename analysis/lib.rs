#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

//! # riskfold
//!
//! Batch analysis of behavioral-risk survey data: leakage-safe feature
//! construction, percentile-derived risk labels, a uniform training and
//! evaluation harness over several model families, cluster-count selection
//! with per-cluster profiling, and flat summary tables for reporting.
//!
//! The typical entry point is [`pipeline::run`], which threads an immutable
//! context through every stage and returns an [`pipeline::AnalysisReport`].

pub mod cluster;
pub mod config;
pub mod data;
pub mod diagnostics;
pub mod features;
pub mod labels;
pub mod linalg;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod split;
pub mod train;
