//! # Legacy Post-Processing
//!
//! Blends the model's probabilities with a deterministic legacy risk formula.
//! The formula runs on the *original* raw input file captured at read time,
//! never the coerced or transformed intermediate — the one required deviation
//! from strict pipelining. Each row evaluates
//! `sigmoid(0.59 + 0.55*number_inpatient + 0.36*number_outpatient)`; a null
//! count fills as 0 before evaluation, and any evaluation failure (absent
//! column, non-numeric cell) substitutes a fixed fallback instead of erroring.
//! The scoring path must keep returning a valid table on dirty data.

use crate::boost::sigmoid;
use crate::data;
use crate::score::{Predictions, ScoreError};
use polars::prelude::*;
use std::path::Path;

const LEGACY_INTERCEPT: f64 = 0.59;
const LEGACY_INPATIENT_WEIGHT: f64 = 0.55;
const LEGACY_OUTPATIENT_WEIGHT: f64 = 0.36;

/// Substituted for a row whose legacy formula cannot be evaluated.
pub const LEGACY_FALLBACK_SCORE: f64 = 0.38;

/// Reads a raw count column cell-wise. `None` means the column is absent and
/// the formula fails for every row. Within a present column, a cell that was
/// null in the raw file fills as 0.0 while a non-numeric cell is a per-row
/// failure (`None`).
fn numeric_cells(df: &DataFrame, name: &str) -> Option<Vec<Option<f64>>> {
    if !data::has_column(df, name) {
        log::debug!("Legacy input lacks '{name}'; falling back to {LEGACY_FALLBACK_SCORE}");
        return None;
    }
    let raw = df.column(name).ok()?;
    let casted = raw.cast(&DataType::Float64).ok()?;
    let chunked = casted.f64().ok()?.rechunk();

    let cells = (0..df.height())
        .map(|i| match chunked.get(i) {
            // A literal NaN token parses as Float64 NaN, not null; it is the
            // raw file's missing-value representation and fills as 0 too.
            Some(v) if v.is_nan() => Some(0.0),
            Some(v) => Some(v),
            None => {
                let raw_null = matches!(raw.get(i), Ok(AnyValue::Null));
                if raw_null { Some(0.0) } else { None }
            }
        })
        .collect();
    Some(cells)
}

/// Evaluates the legacy formula for every row of a raw frame.
pub fn legacy_scores(df: &DataFrame) -> Vec<f64> {
    let inpatient = numeric_cells(df, "number_inpatient");
    let outpatient = numeric_cells(df, "number_outpatient");

    (0..df.height())
        .map(|i| match (&inpatient, &outpatient) {
            (Some(inp), Some(out)) => match (inp[i], out[i]) {
                (Some(a), Some(b)) => sigmoid(
                    LEGACY_INTERCEPT + LEGACY_INPATIENT_WEIGHT * a + LEGACY_OUTPATIENT_WEIGHT * b,
                ),
                _ => LEGACY_FALLBACK_SCORE,
            },
            _ => LEGACY_FALLBACK_SCORE,
        })
        .collect()
}

/// Averages each model `True` probability with its legacy counterpart and
/// rebalances `False` so the row still sums to 1. The legacy column itself is
/// never part of the resulting table.
fn apply_blend(predictions: &mut Predictions, legacy: &[f64]) {
    for i in 0..predictions.len() {
        let blended = (predictions.p_true[i] + legacy[i]) / 2.0;
        predictions.p_true[i] = blended;
        predictions.p_false[i] = 1.0 - blended;
    }
}

/// Re-reads the raw input at `source` and blends its legacy scores into the
/// prediction table in place.
///
/// A row-count mismatch between the re-read file and the table is a hard
/// error; everything else degrades per row.
pub fn blend_with_legacy(predictions: &mut Predictions, source: &Path) -> Result<(), ScoreError> {
    let raw = data::read_csv(source)?;
    if raw.height() != predictions.len() {
        return Err(ScoreError::ShapeMismatch {
            legacy: raw.height(),
            predictions: predictions.len(),
        });
    }
    let legacy = legacy_scores(&raw);
    apply_blend(predictions, &legacy);
    Ok(())
}
