//! CSV exports.
//!
//! - weighted cases: one row per case, every weighted item and both totals
//! - raw cases: a `SurveyFrame` in the same layout ingest reads back

use std::path::Path;

use crate::domain::{SurveyFrame, WeightedCase};
use crate::error::AppError;

/// Write weighted cases to a CSV file.
pub fn write_weighted_csv(path: &Path, items: &[String], cases: &[WeightedCase]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;

    let mut header = vec!["id".to_string(), "weight".to_string()];
    header.extend(items.iter().map(|name| format!("{name}_w")));
    header.push("unweighted_total".to_string());
    header.push("weighted_total".to_string());
    writer
        .write_record(&header)
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    for c in cases {
        let mut row = Vec::with_capacity(header.len());
        row.push(c.id.clone());
        row.push(format!("{:.10}", c.weight));
        row.extend(c.weighted_items.iter().map(|v| format!("{v:.10}")));
        row.push(c.unweighted_total.to_string());
        row.push(format!("{:.10}", c.weighted_total));
        writer
            .write_record(&row)
            .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV: {e}")))?;
    Ok(())
}

/// Write a frame as a cases CSV (`id`, variables, items). Missing categories
/// are written as empty cells.
pub fn write_cases_csv(path: &Path, frame: &SurveyFrame) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create cases CSV '{}': {e}", path.display())))?;

    let mut header = vec!["id".to_string()];
    header.extend(frame.variables().iter().cloned());
    header.extend(frame.items().iter().cloned());
    writer
        .write_record(&header)
        .map_err(|e| AppError::new(2, format!("Failed to write cases CSV header: {e}")))?;

    for case in frame.cases() {
        let mut row = Vec::with_capacity(header.len());
        row.push(case.id.clone());
        row.extend(case.categories.iter().map(|c| c.clone().unwrap_or_default()));
        row.extend(case.items.iter().map(u32::to_string));
        writer
            .write_record(&row)
            .map_err(|e| AppError::new(2, format!("Failed to write cases CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush cases CSV: {e}")))?;
    Ok(())
}
