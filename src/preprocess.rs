//! # Preprocessing Transform
//!
//! Fit/apply preprocessing for the scoring pipeline. `fit` partitions the
//! coerced frame's columns by dtype — integer columns are numeric features,
//! everything else is categorical — and captures every statistic prediction
//! will ever need: per numeric column a median (imputation) and mean/scale
//! (standardization), per categorical column the sorted vocabulary of
//! observed categories after the `"missing"` fill.
//!
//! The fitted state is the single immutable transform. `transform` replays it
//! verbatim on new data: the partition learned at fit time governs, never the
//! live dtypes of the incoming frame. Unknown categories encode to all-zero
//! indicator rows and columns absent at transform time degrade locally, so the
//! apply path is infallible by construction.

use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fill value for absent categorical cells, learned into the vocabulary.
pub const MISSING_CATEGORY: &str = "missing";

/// Learned state for one numeric feature column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub name: String,
    /// Median of the non-null fit-time values; imputed for null/uncastable cells.
    pub median: f64,
    /// Mean of the imputed fit-time column.
    pub mean: f64,
    /// Standard deviation of the imputed fit-time column, with a degenerate
    /// zero-variance column collapsed to 1.0 so scaling becomes a no-op.
    pub scale: f64,
}

/// Learned state for one categorical feature column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    pub name: String,
    /// Observed categories in sorted order; one output indicator column each.
    pub categories: Vec<String>,
}

/// The complete fitted preprocessing transform.
///
/// Column layout of the output matrix is fixed at fit time: the numeric block
/// in partition order, then one indicator block per categorical column in
/// partition order with categories in vocabulary order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    pub numeric: Vec<NumericColumn>,
    pub categorical: Vec<CategoricalColumn>,
}

fn is_integer_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Median of the non-null values; 0.0 for an all-null column so the fitted
/// state stays finite.
fn median(values: &mut Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        (values[mid - 1] + values[mid]) / 2.0
    }
}

fn fit_numeric(column: &Column) -> Result<NumericColumn, PolarsError> {
    let name = column.name().to_string();
    let casted = column.cast(&DataType::Float64)?;
    let chunked = casted.f64()?.rechunk();

    let mut observed: Vec<f64> = chunked.iter().flatten().collect();
    let median = median(&mut observed);

    // Scaling statistics are learned on the imputed column, matching the
    // impute-then-scale order of the transform itself.
    let imputed: Vec<f64> = chunked.iter().map(|v| v.unwrap_or(median)).collect();
    let n = imputed.len().max(1) as f64;
    let mean = imputed.iter().sum::<f64>() / n;
    let variance = imputed.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    let std = variance.sqrt();
    let scale = if std > 0.0 && std.is_finite() {
        std
    } else {
        log::warn!("Numeric feature '{name}' has zero variance at fit time; scaling is a no-op");
        1.0
    };

    Ok(NumericColumn {
        name,
        median,
        mean,
        scale,
    })
}

fn fit_categorical(column: &Column) -> Result<CategoricalColumn, PolarsError> {
    let name = column.name().to_string();
    let casted = column.cast(&DataType::String)?;
    let chunked = casted.str()?.rechunk();

    let mut vocabulary = BTreeSet::new();
    for value in chunked.iter() {
        vocabulary.insert(value.unwrap_or(MISSING_CATEGORY).to_string());
    }

    Ok(CategoricalColumn {
        name,
        categories: vocabulary.into_iter().collect(),
    })
}

impl FittedPreprocessor {
    /// Learns the transform from a coerced training frame.
    ///
    /// The column partition is taken from the frame's current dtypes and
    /// frozen into the returned state; later integer columns that were not
    /// part of training are simply ignored by `transform`.
    pub fn fit(df: &DataFrame) -> Result<Self, PolarsError> {
        let mut numeric = Vec::new();
        let mut categorical = Vec::new();
        for column in df.get_columns() {
            if is_integer_dtype(column.dtype()) {
                numeric.push(fit_numeric(column)?);
            } else {
                categorical.push(fit_categorical(column)?);
            }
        }
        log::info!(
            "Fitted preprocessor: {} numeric features, {} categorical features, {} output columns",
            numeric.len(),
            categorical.len(),
            numeric.len()
                + categorical
                    .iter()
                    .map(|c| c.categories.len())
                    .sum::<usize>()
        );
        Ok(Self {
            numeric,
            categorical,
        })
    }

    /// Number of columns in the output matrix, fixed by the fit-time vocabulary.
    pub fn width(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|c| c.categories.len())
                .sum::<usize>()
    }

    /// Replays the learned transform on new data.
    ///
    /// Infallible by design: null or uncastable numeric cells impute the
    /// learned median, unknown categories encode to all-zero indicator rows,
    /// and a column missing from the frame degrades locally (median
    /// everywhere for numeric, all-zero block for categorical).
    pub fn transform(&self, df: &DataFrame) -> Array2<f64> {
        let rows = df.height();
        let mut out = Array2::<f64>::zeros((rows, self.width()));

        for (offset, feature) in self.numeric.iter().enumerate() {
            let values = df
                .column(&feature.name)
                .ok()
                .and_then(|c| c.cast(&DataType::Float64).ok());
            match values.as_ref().and_then(|c| c.f64().ok()) {
                Some(chunked) => {
                    for (row, value) in chunked.iter().enumerate() {
                        let v = value.unwrap_or(feature.median);
                        out[[row, offset]] = (v - feature.mean) / feature.scale;
                    }
                }
                None => {
                    log::debug!(
                        "Numeric feature '{}' absent at transform time; imputing median",
                        feature.name
                    );
                    let fill = (feature.median - feature.mean) / feature.scale;
                    out.column_mut(offset).fill(fill);
                }
            }
        }

        let mut offset = self.numeric.len();
        for feature in &self.categorical {
            let values = df
                .column(&feature.name)
                .ok()
                .and_then(|c| c.cast(&DataType::String).ok());
            match values.as_ref().and_then(|c| c.str().ok()) {
                Some(chunked) => {
                    for (row, value) in chunked.iter().enumerate() {
                        let v = value.unwrap_or(MISSING_CATEGORY);
                        // Vocabulary is sorted, so unknowns fall out of the
                        // search and the row stays all-zero for this block.
                        if let Ok(pos) = feature.categories.binary_search_by(|c| c.as_str().cmp(v)) {
                            out[[row, offset + pos]] = 1.0;
                        }
                    }
                }
                None => {
                    log::debug!(
                        "Categorical feature '{}' absent at transform time; encoding all-zero",
                        feature.name
                    );
                }
            }
            offset += feature.categories.len();
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn training_frame() -> DataFrame {
        df!(
            "number_inpatient" => &[Some(1i64), Some(2), Some(3), None],
            "race" => &[Some("Caucasian"), Some("Asian"), None, Some("Caucasian")],
        )
        .unwrap()
    }

    #[test]
    fn fit_learns_median_mean_scale_and_vocabulary() {
        let fitted = FittedPreprocessor::fit(&training_frame()).unwrap();

        assert_eq!(fitted.numeric.len(), 1);
        let num = &fitted.numeric[0];
        assert_abs_diff_eq!(num.median, 2.0);
        // Imputed column is [1, 2, 3, 2]: mean 2, population std sqrt(0.5).
        assert_abs_diff_eq!(num.mean, 2.0);
        assert_abs_diff_eq!(num.scale, 0.5f64.sqrt(), epsilon = 1e-12);

        assert_eq!(fitted.categorical.len(), 1);
        assert_eq!(
            fitted.categorical[0].categories,
            vec!["Asian", "Caucasian", "missing"]
        );
        assert_eq!(fitted.width(), 4);
    }

    #[test]
    fn transform_is_bit_identical_across_calls() {
        let df = training_frame();
        let fitted = FittedPreprocessor::fit(&df).unwrap();
        let first = fitted.transform(&df);
        let second = fitted.transform(&df);
        assert_eq!(first, second);
        assert_eq!(first.nrows(), 4);
        assert_eq!(first.ncols(), 4);
    }

    #[test]
    fn transform_orders_numeric_block_before_indicator_block() {
        let df = training_frame();
        let fitted = FittedPreprocessor::fit(&df).unwrap();
        let matrix = fitted.transform(&df);

        // Row 0: value 1 standardized, then one-hot for "Caucasian".
        assert_abs_diff_eq!(matrix[[0, 0]], (1.0 - 2.0) / 0.5f64.sqrt(), epsilon = 1e-12);
        assert_eq!(matrix[[0, 1]], 0.0); // Asian
        assert_eq!(matrix[[0, 2]], 1.0); // Caucasian
        assert_eq!(matrix[[0, 3]], 0.0); // missing

        // Row 2 had a null race: the learned "missing" fill carries the bit.
        assert_eq!(matrix[[2, 3]], 1.0);
        // Row 3 had a null count: imputed median standardizes to 0.
        assert_abs_diff_eq!(matrix[[3, 0]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn unseen_category_encodes_all_zero_without_error() {
        let fitted = FittedPreprocessor::fit(&training_frame()).unwrap();
        let unseen = df!(
            "number_inpatient" => &[2i64],
            "race" => &["Martian"],
        )
        .unwrap();
        let matrix = fitted.transform(&unseen);
        assert_eq!(matrix[[0, 1]], 0.0);
        assert_eq!(matrix[[0, 2]], 0.0);
        assert_eq!(matrix[[0, 3]], 0.0);
        // Numeric block is unaffected by the unknown category.
        assert_abs_diff_eq!(matrix[[0, 0]], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn missing_columns_at_transform_degrade_locally() {
        let fitted = FittedPreprocessor::fit(&training_frame()).unwrap();
        let sparse = df!("unrelated" => &[9i64, 9]).unwrap();
        let matrix = fitted.transform(&sparse);

        assert_eq!(matrix.nrows(), 2);
        assert_eq!(matrix.ncols(), 4);
        // Missing numeric column imputes the median for every row.
        assert_abs_diff_eq!(matrix[[0, 0]], 0.0, epsilon = 1e-12);
        // Missing categorical column is an all-zero block.
        assert_eq!(matrix[[0, 2]], 0.0);
        assert_eq!(matrix[[1, 3]], 0.0);
    }

    #[test]
    fn zero_variance_numeric_column_scales_as_a_no_op() {
        let df = df!("num_lab_procedures" => &[7i64, 7, 7]).unwrap();
        let fitted = FittedPreprocessor::fit(&df).unwrap();
        assert_abs_diff_eq!(fitted.numeric[0].scale, 1.0);
        let matrix = fitted.transform(&df);
        assert_abs_diff_eq!(matrix[[0, 0]], 0.0);
    }

    #[test]
    fn later_integer_columns_outside_the_partition_are_ignored() {
        let fitted = FittedPreprocessor::fit(&training_frame()).unwrap();
        let widened = df!(
            "number_inpatient" => &[2i64],
            "race" => &["Asian"],
            "brand_new_counter" => &[99i64],
        )
        .unwrap();
        let matrix = fitted.transform(&widened);
        assert_eq!(matrix.ncols(), fitted.width());
    }
}
