//! CSV ingest of survey cases.
//!
//! This module turns a respondent-level CSV into a validated `SurveyFrame`.
//!
//! Design goals:
//! - **Strict schema** for required columns (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **Deterministic behavior** (cases keep file order)
//! - **Separation of concerns**: no raking logic here

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{Case, ItemScale, SurveyFrame};
use crate::error::AppError;

/// Cell values treated as a missing category.
const MISSING_TOKENS: [&str; 4] = ["", "na", "n/a", "."];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub id: Option<String>,
    pub message: String,
}

/// Ingest output: the frame plus row-level bookkeeping.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub frame: SurveyFrame,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
}

/// Load cases from a CSV file.
///
/// `variables` are the raking variable columns; item columns are every other
/// header starting with `items_prefix`, in header order.
pub fn load_cases(path: &Path, variables: &[String], items_prefix: &str, scale: ItemScale) -> Result<IngestedData, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open cases CSV '{}': {e}", path.display())))?;
    read_cases(file, variables, items_prefix, scale)
}

/// Same as [`load_cases`] for any reader.
pub fn read_cases<R: Read>(
    reader: R,
    variables: &[String],
    items_prefix: &str,
    scale: ItemScale,
) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let variables: Vec<String> = variables.iter().map(|v| normalize_header_name(v)).collect();
    ensure_required_columns_exist(&variables, &header_map)?;

    let prefix = normalize_header_name(items_prefix);
    let item_columns = resolve_item_columns(&headers, &variables, &prefix);
    if item_columns.is_empty() {
        return Err(AppError::new(
            2,
            format!("No item columns found (expected headers starting with `{prefix}`)."),
        ));
    }

    let mut cases = Vec::new();
    let mut seen_ids = HashSet::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: 1-based lines and the header row.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    id: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        match parse_row(&record, &header_map, &variables, &item_columns, scale) {
            Ok(case) => {
                if !seen_ids.insert(case.id.clone()) {
                    row_errors.push(RowError {
                        line,
                        id: Some(case.id),
                        message: "Duplicate `id`; keeping the first occurrence.".to_string(),
                    });
                    continue;
                }
                cases.push(case);
            }
            Err((id, message)) => row_errors.push(RowError { line, id, message }),
        }
    }

    let rows_used = cases.len();
    if rows_used == 0 {
        return Err(AppError::new(3, "No valid rows remain after validation."));
    }

    let items = item_columns.iter().map(|(name, _)| name.clone()).collect();
    let frame = SurveyFrame::new(variables, items, scale, cases)?;

    Ok(IngestedData {
        frame,
        row_errors,
        rows_read,
        rows_used,
    })
}

pub(crate) fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

pub(crate) fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports often prefix the first header with a UTF-8 BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn ensure_required_columns_exist(variables: &[String], header_map: &HashMap<String, usize>) -> Result<(), AppError> {
    if !header_map.contains_key("id") {
        return Err(AppError::new(2, "Missing required column: `id`"));
    }
    if variables.is_empty() {
        return Err(AppError::new(2, "At least one raking variable is required."));
    }
    for v in variables {
        if !header_map.contains_key(v) {
            return Err(AppError::new(2, format!("Missing raking variable column: `{v}`")));
        }
    }
    Ok(())
}

fn resolve_item_columns(headers: &StringRecord, variables: &[String], prefix: &str) -> Vec<(String, usize)> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .filter(|(name, _)| name != "id" && !variables.contains(name) && name.starts_with(prefix))
        .collect()
}

fn parse_row(
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
    variables: &[String],
    item_columns: &[(String, usize)],
    scale: ItemScale,
) -> Result<Case, (Option<String>, String)> {
    let id = header_map
        .get("id")
        .and_then(|&idx| record.get(idx))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| (None, "Missing required value: `id`".to_string()))?
        .to_string();

    let categories = variables
        .iter()
        .map(|v| header_map.get(v).and_then(|&idx| record.get(idx)).and_then(parse_category))
        .collect();

    let mut items = Vec::with_capacity(item_columns.len());
    for (name, idx) in item_columns {
        let raw = record.get(*idx).unwrap_or("");
        let value = raw
            .parse::<u32>()
            .map_err(|_| (Some(id.clone()), format!("Invalid `{name}` value '{raw}' (expected an integer code).")))?;
        if !scale.contains(value) {
            return Err((
                Some(id),
                format!("`{name}` = {value} is outside {}..={}.", scale.min, scale.max),
            ));
        }
        items.push(value);
    }

    Ok(Case { id, categories, items })
}

fn parse_category(s: &str) -> Option<String> {
    let s = s.trim();
    if MISSING_TOKENS.iter().any(|t| s.eq_ignore_ascii_case(t)) {
        None
    } else {
        Some(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn reads_cases_items_and_missing_values() {
        let csv = "\u{feff}ID,Gender,Region,q1,q2,note\n\
                   r1,f,north,4,0,x\n\
                   r2,m,NA,1,2,y\n\
                   r3,m,south,3,3,z\n";
        let data = read_cases(csv.as_bytes(), &vars(&["gender", "region"]), "q", ItemScale::default()).unwrap();

        assert_eq!(data.rows_read, 3);
        assert_eq!(data.rows_used, 3);
        assert!(data.row_errors.is_empty());
        assert_eq!(data.frame.items(), &["q1".to_string(), "q2".to_string()]);
        assert_eq!(data.frame.cases()[0].items, vec![4, 0]);
        assert_eq!(data.frame.cases()[1].categories, vec![Some("m".to_string()), None]);
        assert_eq!(data.frame.complete_count(), 2);
    }

    #[test]
    fn bad_rows_are_reported_and_skipped() {
        let csv = "id,gender,q1\n\
                   r1,f,9\n\
                   r2,m,x\n\
                   r3,m,2\n\
                   r3,f,1\n\
                   ,f,1\n";
        let data = read_cases(csv.as_bytes(), &vars(&["gender"]), "q", ItemScale::default()).unwrap();
        assert_eq!(data.rows_read, 5);
        assert_eq!(data.rows_used, 1);
        let lines: Vec<usize> = data.row_errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 3, 5, 6]);
        assert_eq!(data.row_errors[0].id.as_deref(), Some("r1"));
    }

    #[test]
    fn missing_variable_column_is_fatal() {
        let csv = "id,gender,q1\nr1,f,1\n";
        let err = read_cases(csv.as_bytes(), &vars(&["region"]), "q", ItemScale::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn no_item_columns_is_fatal() {
        let csv = "id,gender\nr1,f\n";
        let err = read_cases(csv.as_bytes(), &vars(&["gender"]), "q", ItemScale::default()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
