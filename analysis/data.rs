// analysis/data.rs

//! # Survey Table Loading and Validation
//!
//! Entry point for user-provided survey exports. Reads a CSV or TSV file,
//! validates the outcome column against a strict contract, and converts every
//! numeric column into the `ndarray` structures the analysis core consumes.
//!
//! - Lenient on features: survey exports carry free-text columns; anything
//!   that cannot be coerced to numeric is skipped here and, if the schema
//!   later requires it, reported as an absent feature column.
//! - Strict on the outcome: the outcome column must exist, be numeric, and be
//!   complete. Missing feature *values* become NaN and are imputed
//!   downstream; a missing outcome value has no principled fill.
//! - User-centric errors: the `DataError` enum names the offending column and
//!   the expected versus found types.

use ndarray::Array1;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A validated, numeric view of one survey export.
#[derive(Debug, Clone)]
pub struct SurveyFrame {
    columns: Vec<String>,
    values: Vec<Array1<f64>>,
    record_ids: Vec<String>,
    n_rows: usize,
}

impl SurveyFrame {
    /// Builds a frame directly from named columns. Columns must share one
    /// length; intended for tests and synthetic data.
    pub fn from_columns(
        named: Vec<(String, Array1<f64>)>,
        record_ids: Option<Vec<String>>,
    ) -> Result<Self, DataError> {
        let n_rows = named.first().map(|(_, v)| v.len()).unwrap_or(0);
        if named.iter().any(|(_, v)| v.len() != n_rows) {
            return Err(DataError::RaggedColumns);
        }
        let (columns, values): (Vec<_>, Vec<_>) = named.into_iter().unzip();
        let record_ids =
            record_ids.unwrap_or_else(|| (1..=n_rows).map(|i| i.to_string()).collect());
        Ok(SurveyFrame {
            columns,
            values,
            record_ids,
            n_rows,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    /// Looks a column up by exact name.
    pub fn column(&self, name: &str) -> Option<&Array1<f64>> {
        self.columns
            .iter()
            .position(|c| c == name)
            .map(|i| &self.values[i])
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Identifier per record, from the id column when present, otherwise
    /// sequential 1-based indices.
    pub fn record_ids(&self) -> &[String] {
        &self.record_ids
    }
}

/// A comprehensive error type for all loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error(
        "The required column '{0}' was not found in the input file. Please check spelling and case."
    )]
    ColumnNotFound(String),
    #[error(
        "The required column '{column_name}' could not be converted to the expected type \
         '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the outcome column '{0}'. The outcome must be \
         complete; feature columns may have gaps, the outcome may not."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in the outcome column '{0}'. The outcome \
         must be finite."
    )]
    NonFiniteValuesFound(String),
    #[error(
        "Input file contains only {found} data rows, but at least {required} are required for a \
         stable analysis."
    )]
    InsufficientRows { found: usize, required: usize },
    #[error("Columns passed to SurveyFrame::from_columns have differing lengths.")]
    RaggedColumns,
}

/// Loads a survey table, validating the outcome column strictly and coercing
/// every other numeric column with nulls mapped to NaN.
pub fn load_survey(
    path: &str,
    outcome_column: &str,
    id_column: Option<&str>,
) -> Result<SurveyFrame, DataError> {
    internal::load_frame(path, outcome_column, id_column)
}

/// Internal module for the shared loading logic.
mod internal {
    use super::*;

    const MINIMUM_ROWS: usize = 20;

    pub(super) fn load_frame(
        path: &str,
        outcome_column: &str,
        id_column: Option<&str>,
    ) -> Result<SurveyFrame, DataError> {
        let separator = if Path::new(path)
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("tsv") || e.eq_ignore_ascii_case("tab"))
        {
            b'\t'
        } else {
            b','
        };

        log::info!("Loading survey table from '{path}'");
        let df = CsvReader::new(File::open(Path::new(path))?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_parse_options(CsvParseOptions::default().with_separator(separator)),
            )
            .finish()?;

        if df.height() < MINIMUM_ROWS {
            return Err(DataError::InsufficientRows {
                found: df.height(),
                required: MINIMUM_ROWS,
            });
        }

        let header: Vec<String> = df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();
        if !header.iter().any(|c| c == outcome_column) {
            return Err(DataError::ColumnNotFound(outcome_column.to_string()));
        }

        // The outcome is held to the strict contract before anything else.
        let outcome = extract_complete_column(&df, outcome_column)?;

        let record_ids = build_record_ids(&df, id_column, df.height())?;

        let mut columns = Vec::with_capacity(header.len());
        let mut values = Vec::with_capacity(header.len());
        columns.push(outcome_column.to_string());
        values.push(outcome);
        for name in &header {
            if name == outcome_column || Some(name.as_str()) == id_column {
                continue;
            }
            match coerce_lenient(&df, name)? {
                Some(column) => {
                    columns.push(name.clone());
                    values.push(column);
                }
                None => {
                    log::debug!("column '{name}' is not numeric; skipped");
                }
            }
        }

        log::info!(
            "Loaded {} records with {} numeric columns ({} columns in file)",
            df.height(),
            columns.len(),
            header.len()
        );

        Ok(SurveyFrame {
            columns,
            values,
            record_ids,
            n_rows: df.height(),
        })
    }

    /// Strict extraction: numeric, no nulls, all finite.
    fn extract_complete_column(df: &DataFrame, name: &str) -> Result<Array1<f64>, DataError> {
        let series = df.column(name)?;
        if series.null_count() > 0 {
            return Err(DataError::MissingValuesFound(name.to_string()));
        }
        let casted = match series.cast(&DataType::Float64) {
            Ok(casted) => casted,
            Err(_) => {
                return Err(DataError::ColumnWrongType {
                    column_name: name.to_string(),
                    expected_type: "f64 (numeric)",
                    found_type: format!("{:?}", series.dtype()),
                });
            }
        };
        if casted.null_count() > 0 {
            return Err(DataError::ColumnWrongType {
                column_name: name.to_string(),
                expected_type: "f64 (numeric)",
                found_type: format!("{:?}", series.dtype()),
            });
        }
        let chunked = casted.f64()?.rechunk();
        let mut out = Vec::with_capacity(df.height());
        out.extend(chunked.into_no_null_iter());
        if out.iter().any(|v| !v.is_finite()) {
            return Err(DataError::NonFiniteValuesFound(name.to_string()));
        }
        Ok(Array1::from_vec(out))
    }

    /// Lenient extraction: nulls become NaN; a column that cannot be cast at
    /// all yields `None` so the caller can skip it.
    fn coerce_lenient(df: &DataFrame, name: &str) -> Result<Option<Array1<f64>>, DataError> {
        let series = df.column(name)?;
        let casted = match series.cast(&DataType::Float64) {
            Ok(casted) => casted,
            Err(_) => return Ok(None),
        };
        // A string column casts "successfully" by turning every cell null;
        // treat a column that lost values in the cast as non-numeric.
        if casted.null_count() > series.null_count() {
            return Ok(None);
        }
        let chunked = casted.f64()?.rechunk();
        let out: Vec<f64> = chunked
            .into_iter()
            .map(|opt| opt.unwrap_or(f64::NAN))
            .collect();
        Ok(Some(Array1::from_vec(out)))
    }

    fn build_record_ids(
        df: &DataFrame,
        id_column: Option<&str>,
        n: usize,
    ) -> Result<Vec<String>, DataError> {
        let Some(id_name) = id_column else {
            return Ok((1..=n).map(|i| i.to_string()).collect());
        };
        if !df.get_column_names().iter().any(|c| c == &id_name) {
            return Err(DataError::ColumnNotFound(id_name.to_string()));
        }
        let series = df.column(id_name)?;
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let value = series.get(i).unwrap_or(polars::prelude::AnyValue::Null);
            ids.push(match value {
                polars::prelude::AnyValue::Null => (i + 1).to_string(),
                _ => {
                    let text = value.to_string();
                    let trimmed = text.trim_matches('"');
                    if trimmed.is_empty() {
                        (i + 1).to_string()
                    } else {
                        trimmed.to_string()
                    }
                }
            });
        }
        Ok(ids)
    }
}
