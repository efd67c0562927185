//! # Scorer
//!
//! Applies a restored preprocessing transform and classifier to raw data and
//! produces the two-column prediction table. The scorer is read-only with
//! respect to the artifacts it holds; every call clones the incoming frame
//! before coercion so the caller's view of the raw data survives.

use crate::artifact::{self, ArtifactError};
use crate::boost::{GbdtClassifier, PredictError};
use crate::data::{self, DataError};
use crate::preprocess::FittedPreprocessor;
use ndarray::Array1;
use polars::prelude::DataFrame;
use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Custom error type for the scoring path.
///
/// Everything here is a hard failure. Dirty-data conditions (unknown
/// categories, missing columns, malformed legacy fields) never reach this
/// enum; they degrade inside the transform and the legacy formula instead.
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Predict(#[from] PredictError),
    #[error(
        "The raw input re-read for legacy scoring has {legacy} rows, but the prediction table has {predictions}."
    )]
    ShapeMismatch { legacy: usize, predictions: usize },
    #[error("Failed to write the prediction table: {0}")]
    CsvError(#[from] csv::Error),
}

/// The prediction table: per row a `True` and a `False` probability,
/// row-aligned with the scored input, each in [0, 1], summing to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    pub p_true: Array1<f64>,
    pub p_false: Array1<f64>,
}

impl Predictions {
    pub fn len(&self) -> usize {
        self.p_true.len()
    }

    pub fn is_empty(&self) -> bool {
        self.p_true.is_empty()
    }

    /// Writes the table as CSV with a `True,False` header.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ScoreError> {
        let mut out = csv::Writer::from_writer(writer);
        out.write_record(["True", "False"])?;
        for i in 0..self.len() {
            out.write_record([self.p_true[i].to_string(), self.p_false[i].to_string()])?;
        }
        out.flush().map_err(csv::Error::from)?;
        Ok(())
    }
}

/// A restored model ready to score raw frames.
#[derive(Debug, Clone)]
pub struct Scorer {
    preprocessor: FittedPreprocessor,
    classifier: GbdtClassifier,
}

impl Scorer {
    pub fn new(preprocessor: FittedPreprocessor, classifier: GbdtClassifier) -> Self {
        Self {
            preprocessor,
            classifier,
        }
    }

    /// Restores both artifacts from a base directory.
    pub fn from_dir(dir: &Path) -> Result<Self, ArtifactError> {
        let (preprocessor, classifier) = artifact::load(dir)?;
        Ok(Self::new(preprocessor, classifier))
    }

    /// Coerce, transform, predict. Column 0 of the classifier output (the
    /// first-encountered training class) becomes `True`, column 1 `False`.
    pub fn predict(&self, raw: &DataFrame) -> Result<Predictions, ScoreError> {
        let mut frame = raw.clone();
        data::coerce_features(&mut frame)?;
        let matrix = self.preprocessor.transform(&frame);
        let proba = self.classifier.predict_proba(&matrix)?;
        Ok(Predictions {
            p_true: proba.column(0).to_owned(),
            p_false: proba.column(1).to_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use polars::prelude::*;

    fn fitted_scorer() -> Scorer {
        let mut train = df!(
            "number_inpatient" => &(0..12).map(|i| (i / 6) as i64 * 3).collect::<Vec<_>>(),
            "race" => &(0..12).map(|i| if i < 6 { "Caucasian" } else { "Asian" }).collect::<Vec<_>>(),
            "diag_1" => &(0..12).map(|i| if i < 6 { 250i64 } else { 401 }).collect::<Vec<_>>(),
        )
        .unwrap();
        data::coerce_features(&mut train).unwrap();
        let preprocessor = FittedPreprocessor::fit(&train).unwrap();
        let matrix = preprocessor.transform(&train);
        let labels: Vec<String> = (0..12)
            .map(|i| if i < 6 { "False" } else { "True" }.to_string())
            .collect();
        let classifier = GbdtClassifier::fit(&matrix, &labels).unwrap();
        Scorer::new(preprocessor, classifier)
    }

    #[test]
    fn prediction_rows_align_and_sum_to_one() {
        let scorer = fitted_scorer();
        let raw = df!(
            "number_inpatient" => &[0i64, 3],
            "race" => &["Caucasian", "Asian"],
            "diag_1" => &[250i64, 401],
        )
        .unwrap();
        let predictions = scorer.predict(&raw).unwrap();
        assert_eq!(predictions.len(), 2);
        for i in 0..predictions.len() {
            assert_abs_diff_eq!(
                predictions.p_true[i] + predictions.p_false[i],
                1.0,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn predict_does_not_mutate_the_callers_frame() {
        let scorer = fitted_scorer();
        let raw = df!(
            "number_inpatient" => &[1i64],
            "race" => &["Asian"],
            "diag_1" => &[250i64],
            "diag_1_desc" => &["Diabetes mellitus"],
        )
        .unwrap();
        let before = raw.clone();
        scorer.predict(&raw).unwrap();
        assert!(raw.equals(&before));
        assert!(data::has_column(&raw, "diag_1_desc"));
    }

    #[test]
    fn scoring_dirty_rows_never_errors() {
        let scorer = fitted_scorer();
        // Unknown category, missing diag_1 column, null count.
        let raw = df!(
            "number_inpatient" => &[Some(2i64), None],
            "race" => &["Martian", "Asian"],
        )
        .unwrap();
        let predictions = scorer.predict(&raw).unwrap();
        assert_eq!(predictions.len(), 2);
        for i in 0..2 {
            assert!(predictions.p_true[i] > 0.0 && predictions.p_true[i] < 1.0);
        }
    }

    #[test]
    fn write_csv_emits_the_two_column_table() {
        let predictions = Predictions {
            p_true: ndarray::array![0.5, 0.25],
            p_false: ndarray::array![0.5, 0.75],
        };
        let mut buffer = Vec::new();
        predictions.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(text, "True,False\n0.5,0.5\n0.25,0.75\n");
    }
}
