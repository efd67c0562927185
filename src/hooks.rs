//! # Hosting-Runtime Hooks
//!
//! The interface the hosting runtime drives: `init` records the artifact
//! directory for the lifetime of the loaded model, `read_input` loads a raw
//! batch, `fit` trains and persists, and `score` runs the full per-call state
//! machine `RAW_READ -> COERCE -> TRANSFORM -> PREDICT -> LEGACY_COMPUTE ->
//! BLEND -> OUTPUT`.
//!
//! The raw input source travels inside [`InputBatch`] rather than any
//! process-wide slot, so concurrent score calls each resolve their own source
//! for the legacy blend.

use crate::artifact::{self, ArtifactError};
use crate::blend;
use crate::boost::{GbdtClassifier, TrainError};
use crate::data::{self, DataError};
use crate::preprocess::FittedPreprocessor;
use crate::score::{Predictions, ScoreError, Scorer};
use ndarray::Array1;
use polars::prelude::{DataFrame, PolarsError};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Custom error type for the training hook.
#[derive(Error, Debug)]
pub enum FitError {
    #[error(transparent)]
    Data(#[from] DataError),
    #[error(transparent)]
    Polars(#[from] PolarsError),
    #[error(transparent)]
    Train(#[from] TrainError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// A raw input batch and the source it was read from.
///
/// The source is call-scoped state: the legacy blend re-reads it directly,
/// and two batches scored back to back never interfere.
#[derive(Debug, Clone)]
pub struct InputBatch {
    pub frame: DataFrame,
    pub source: PathBuf,
}

/// Loads a raw CSV batch, dropping the free-text description column at read
/// time, and captures the path for the legacy blend.
pub fn read_input(path: &Path) -> Result<InputBatch, DataError> {
    let mut frame = data::read_csv(path)?;
    if data::has_column(&frame, data::DROPPED_TEXT_COLUMN) {
        let _ = frame.drop_in_place(data::DROPPED_TEXT_COLUMN)?;
    }
    Ok(InputBatch {
        frame,
        source: path.to_path_buf(),
    })
}

/// Trains the preprocessing transform and classifier on `x`/`y` and persists
/// both artifacts into `output_dir`.
///
/// `class_order` and `row_weights` are accepted for interface compatibility
/// and ignored by this core's algorithm; they are a future extension point.
/// The frame is consumed: coercion rewrites it before fitting.
pub fn fit(
    mut x: DataFrame,
    y: &[String],
    output_dir: &Path,
    class_order: Option<&[String]>,
    row_weights: Option<&Array1<f64>>,
) -> Result<(), FitError> {
    if class_order.is_some() {
        log::info!("class_order was provided but is unused by this pipeline");
    }
    if row_weights.is_some() {
        log::info!("row_weights were provided but are unused by this pipeline");
    }

    data::coerce_features(&mut x)?;
    let preprocessor = FittedPreprocessor::fit(&x)?;
    let matrix = preprocessor.transform(&x);
    let classifier = GbdtClassifier::fit(&matrix, y)?;
    artifact::save(&preprocessor, &classifier, output_dir)?;
    Ok(())
}

/// Process-wide model state, set once per loaded model instance.
#[derive(Debug, Clone)]
pub struct ModelContext {
    code_dir: PathBuf,
}

impl ModelContext {
    /// Records the artifact directory for later score calls.
    pub fn init(code_dir: &Path) -> Self {
        Self {
            code_dir: code_dir.to_path_buf(),
        }
    }

    pub fn code_dir(&self) -> &Path {
        &self.code_dir
    }

    /// Scores a batch end to end: restores the artifacts, coerces and
    /// transforms a copy of the frame, predicts, then blends with the legacy
    /// formula computed over the batch's original source file.
    pub fn score(&self, input: &InputBatch) -> Result<Predictions, ScoreError> {
        let scorer = Scorer::from_dir(&self.code_dir)?;
        let mut predictions = scorer.predict(&input.frame)?;
        blend::blend_with_legacy(&mut predictions, &input.source)?;
        Ok(predictions)
    }
}
