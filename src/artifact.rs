//! # Artifact Store
//!
//! Persists the two fitted units — preprocessing transform and classifier —
//! as independent TOML files under fixed names in a base directory, and
//! restores them for scoring. The format is internal to this pipeline: a load
//! assumes the exact layout written by the save that produced it, and there is
//! no versioning or migration.

use crate::boost::GbdtClassifier;
use crate::preprocess::FittedPreprocessor;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Fixed file name of the persisted preprocessing transform.
pub const PREPROCESSING_FILE: &str = "preprocessing.toml";
/// Fixed file name of the persisted classifier.
pub const MODEL_FILE: &str = "model.toml";

/// Custom error type for artifact persistence and restoration.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Artifact '{name}' not found in '{dir}'. Run fit before scoring this directory.")]
    Missing { name: &'static str, dir: PathBuf },
    #[error("Failed to read or write artifact file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML artifact file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize artifact to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

fn write_artifact<T: Serialize>(value: &T, path: &Path) -> Result<(), ArtifactError> {
    let toml_string = toml::to_string_pretty(value)?;
    let mut file = BufWriter::new(fs::File::create(path)?);
    file.write_all(toml_string.as_bytes())?;
    Ok(())
}

fn read_artifact<T: DeserializeOwned>(
    dir: &Path,
    name: &'static str,
) -> Result<T, ArtifactError> {
    let path = dir.join(name);
    if !path.is_file() {
        return Err(ArtifactError::Missing {
            name,
            dir: dir.to_path_buf(),
        });
    }
    let toml_string = fs::read_to_string(&path)?;
    Ok(toml::from_str(&toml_string)?)
}

/// Writes both fitted units into `dir`, creating it if needed.
pub fn save(
    preprocessor: &FittedPreprocessor,
    classifier: &GbdtClassifier,
    dir: &Path,
) -> Result<(), ArtifactError> {
    fs::create_dir_all(dir)?;
    write_artifact(preprocessor, &dir.join(PREPROCESSING_FILE))?;
    write_artifact(classifier, &dir.join(MODEL_FILE))?;
    log::info!(
        "Persisted artifacts '{PREPROCESSING_FILE}' and '{MODEL_FILE}' to '{}'",
        dir.display()
    );
    Ok(())
}

/// Restores both fitted units from `dir`.
///
/// Fails with [`ArtifactError::Missing`] naming the first absent file; both
/// files must exist for a load to succeed.
pub fn load(dir: &Path) -> Result<(FittedPreprocessor, GbdtClassifier), ArtifactError> {
    let preprocessor = read_artifact(dir, PREPROCESSING_FILE)?;
    let classifier = read_artifact(dir, MODEL_FILE)?;
    Ok((preprocessor, classifier))
}
