//! Read/write weights JSON files.
//!
//! A weights file is the portable result of a raking run:
//! - the per-case multipliers, excluded ids and convergence trace
//! - the options and variable order that produced them
//!
//! The schema is defined by `domain::WeightsFile`.

use std::fs::File;
use std::path::Path;

use chrono::Utc;

use crate::domain::{WeightVector, WeightsFile};
use crate::error::AppError;
use crate::rake::RakeOptions;

/// Write a weights JSON file.
pub fn write_weights_json(
    path: &Path,
    weights: &WeightVector,
    variables: &[String],
    options: &RakeOptions,
) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create weights JSON '{}': {e}", path.display())))?;

    let doc = WeightsFile {
        tool: "rake".to_string(),
        generated_at: Utc::now(),
        variables: variables.to_vec(),
        options: *options,
        weights: weights.clone(),
    };

    serde_json::to_writer_pretty(file, &doc)
        .map_err(|e| AppError::new(2, format!("Failed to write weights JSON: {e}")))?;
    Ok(())
}

/// Read and validate a weights JSON file.
pub fn read_weights_json(path: &Path) -> Result<WeightsFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open weights JSON '{}': {e}", path.display())))?;
    let doc: WeightsFile =
        serde_json::from_reader(file).map_err(|e| AppError::new(2, format!("Invalid weights JSON: {e}")))?;
    doc.weights.validate()?;
    Ok(doc)
}
