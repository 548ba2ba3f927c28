//! Census target ingest.
//!
//! Targets are a long-format CSV with one row per variable × category:
//!
//! ```text
//! variable,category,value
//! gender,f,0.51
//! gender,m,0.49
//! ```
//!
//! `value` is a proportion or a count depending on `TargetKind`. Unlike case
//! ingest, any malformed target row is fatal: a half-read margin would rake to
//! the wrong population.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::domain::{CategoryTable, MarginSpec, TargetKind};
use crate::error::AppError;
use crate::io::ingest::{build_header_map, normalize_header_name};

/// One parsed targets row.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetRow {
    pub variable: String,
    pub category: String,
    pub value: f64,
}

pub fn load_targets(path: &Path) -> Result<Vec<TargetRow>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open targets CSV '{}': {e}", path.display())))?;
    read_targets(file)
}

pub fn read_targets<R: Read>(reader: R) -> Result<Vec<TargetRow>, AppError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read targets headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let column = |name: &str| {
        header_map
            .get(name)
            .copied()
            .ok_or_else(|| AppError::new(2, format!("Targets file is missing column: `{name}`")))
    };
    let (var_idx, cat_idx, value_idx) = (column("variable")?, column("category")?, column("value")?);

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let record = result.map_err(|e| AppError::new(2, format!("Targets line {line}: CSV parse error: {e}")))?;
        let field = |i: usize| record.get(i).unwrap_or("");

        let variable = normalize_header_name(field(var_idx));
        let category = field(cat_idx).to_string();
        if variable.is_empty() || category.is_empty() {
            return Err(AppError::new(2, format!("Targets line {line}: empty variable or category.")));
        }
        let value = field(value_idx)
            .parse::<f64>()
            .map_err(|_| AppError::new(2, format!("Targets line {line}: invalid value '{}'.", field(value_idx))))?;

        rows.push(TargetRow {
            variable,
            category,
            value,
        });
    }
    Ok(rows)
}

/// Build one margin per raking variable, in `variables` order.
///
/// Proportions are scaled to `universe`, so their totals always agree with
/// it. Counts are taken as given; the engine checks (or rescales) their
/// totals according to the run's `TotalsPolicy`.
pub fn build_margins(
    rows: &[TargetRow],
    variables: &[String],
    kind: TargetKind,
    universe: f64,
) -> Result<Vec<MarginSpec>, AppError> {
    let mut by_variable: BTreeMap<&str, Vec<(&str, f64)>> = BTreeMap::new();
    for row in rows {
        by_variable
            .entry(row.variable.as_str())
            .or_default()
            .push((row.category.as_str(), row.value));
    }

    let mut margins = Vec::with_capacity(variables.len());
    for variable in variables {
        let variable = normalize_header_name(variable);
        let values = by_variable
            .get(variable.as_str())
            .ok_or_else(|| AppError::new(2, format!("No targets found for raking variable `{variable}`.")))?;

        let table = match kind {
            TargetKind::Proportion => CategoryTable::from_proportions(values.iter().copied(), universe),
            TargetKind::Count => CategoryTable::from_counts(values.iter().copied()),
        }
        .map_err(|e| AppError::new(2, format!("Invalid targets for `{variable}`: {e}")))?;

        let margin = match kind {
            TargetKind::Proportion => MarginSpec::new(variable.as_str(), table, universe),
            TargetKind::Count => MarginSpec::from_table(variable.as_str(), table),
        }?;
        margins.push(margin);
    }
    Ok(margins)
}

/// Write targets rows as a long-format CSV.
pub fn write_targets_csv(path: &Path, rows: &[TargetRow]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::new(2, format!("Failed to create targets CSV '{}': {e}", path.display())))?;
    writer
        .write_record(["variable", "category", "value"])
        .map_err(|e| AppError::new(2, format!("Failed to write targets CSV header: {e}")))?;
    for row in rows {
        let value = row.value.to_string();
        writer
            .write_record([row.variable.as_str(), row.category.as_str(), value.as_str()])
            .map_err(|e| AppError::new(2, format!("Failed to write targets CSV row: {e}")))?;
    }
    writer
        .flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush targets CSV: {e}")))?;
    Ok(())
}
