//! # Input Loading and Feature Coercion
//!
//! This module is the exclusive entry point for raw patient encounter data.
//! It reads CSV files into a polars `DataFrame` and normalizes the frame into
//! the typed shape every downstream step assumes: the free-text description
//! column is dropped wherever it appears, and the diagnosis/demographic
//! columns are forced to string dtype so that integer-coded diagnosis values
//! (`250`) and their string spellings (`"250"`) land on the same category.
//!
//! Coercion mutates the frame in place. Callers that still need the raw
//! representation must pass a clone.

use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// Free-text column that is never a feature. Dropped silently when present.
pub const DROPPED_TEXT_COLUMN: &str = "diag_1_desc";

/// Columns forced to string dtype regardless of how the CSV reader typed them.
/// Diagnosis codes are numeric-looking but categorical.
pub const FORCED_CATEGORICAL: [&str; 4] = ["race", "diag_1", "diag_2", "diag_3"];

/// A comprehensive error type for input loading and coercion failures.
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
        "The column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error(
        "Missing or null values were found in the label column '{0}'. Training requires a label for every row."
    )]
    MissingLabels(String),
}

/// Reads a CSV file into a `DataFrame`. No coercion is applied here.
pub fn read_csv(path: &Path) -> Result<DataFrame, DataError> {
    let df = CsvReader::new(File::open(path)?)
        .with_options(CsvReadOptions::default().with_has_header(true))
        .finish()?;
    log::debug!(
        "Loaded {} rows x {} columns from '{}'",
        df.height(),
        df.width(),
        path.display()
    );
    Ok(df)
}

/// Returns true if the frame carries a column with the given name.
pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|c| c.as_str() == name)
}

/// Normalizes a raw frame into the fixed typed shape the pipeline expects.
///
/// Drops [`DROPPED_TEXT_COLUMN`] if present (absence is not an error) and
/// casts each of [`FORCED_CATEGORICAL`] to string dtype when the column
/// exists. A coercion target absent from the frame is skipped; the fitted
/// transform downstream degrades that column to an all-zero block instead.
///
/// The frame is mutated in place.
pub fn coerce_features(df: &mut DataFrame) -> Result<(), DataError> {
    if has_column(df, DROPPED_TEXT_COLUMN) {
        let _ = df.drop_in_place(DROPPED_TEXT_COLUMN)?;
    }

    for name in FORCED_CATEGORICAL {
        if !has_column(df, name) {
            log::debug!("Coercion target '{name}' absent from input; skipping");
            continue;
        }
        let column = df.column(name)?;
        let found_type = format!("{:?}", column.dtype());
        let casted = column
            .cast(&DataType::String)
            .map_err(|_| DataError::ColumnWrongType {
                column_name: name.to_string(),
                expected_type: "str (categorical)",
                found_type,
            })?;
        df.with_column(casted)?;
    }
    Ok(())
}

/// Removes the label column from a training frame and returns its values.
///
/// Labels are read as strings whatever their source dtype, so boolean and
/// string targets behave identically. Null labels are a hard error.
pub fn split_target(df: &mut DataFrame, target: &str) -> Result<Vec<String>, DataError> {
    if !has_column(df, target) {
        return Err(DataError::ColumnNotFound(target.to_string()));
    }
    let column = df.drop_in_place(target)?;
    if column.null_count() > 0 {
        return Err(DataError::MissingLabels(target.to_string()));
    }
    let casted = column
        .cast(&DataType::String)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: target.to_string(),
            expected_type: "str (label)",
            found_type: format!("{:?}", column.dtype()),
        })?;
    let labels: Vec<String> = casted
        .str()?
        .into_no_null_iter()
        .map(|s| s.to_string())
        .collect();
    Ok(labels)
}
