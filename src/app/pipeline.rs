//! Shared raking pipeline used by the `run` command and tests.
//!
//! Keeping the workflow in one place avoids duplicating it:
//! cases ingest -> targets -> margins -> rake -> weighted items -> diagnostics
//!
//! Callers only decide how to present the outputs.

use tracing::info;

use crate::domain::{MarginSpec, RunConfig, WeightVector, WeightedCase, WeightedSummary};
use crate::error::{AppError, ConfigError};
use crate::io::ingest::{IngestedData, load_cases};
use crate::io::targets::{build_margins, load_targets};
use crate::rake::{MarginComparison, WeightStats, compare_margins, rake, weight_stats};
use crate::weights::{apply_weights, summarize};

/// All computed outputs of a single `rake run`.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub ingest: IngestedData,
    pub margins: Vec<MarginSpec>,
    pub weights: WeightVector,
    pub weighted: Vec<WeightedCase>,
    pub summary: WeightedSummary,
    pub comparisons: Vec<MarginComparison>,
    pub stats: Option<WeightStats>,
}

/// Execute the full raking pipeline and return the computed outputs.
pub fn run_rake(config: &RunConfig) -> Result<RunOutput, AppError> {
    // 1) Cases.
    let ingest = load_cases(
        &config.cases_path,
        &config.variables,
        &config.items_prefix,
        config.item_scale,
    )?;
    let frame = &ingest.frame;
    info!(
        event = "cases_loaded",
        rows_read = ingest.rows_read,
        rows_used = ingest.rows_used,
        rejected = ingest.row_errors.len()
    );

    // 2) Targets, scaled to the cases that can be raked.
    let universe = frame.complete_count();
    if universe == 0 {
        return Err(ConfigError::EmptyUniverse.into());
    }
    let rows = load_targets(&config.targets_path)?;
    let margins = build_margins(&rows, frame.variables(), config.target_kind, universe as f64)?;

    // 3) Weights.
    let weights = rake(frame, &margins, &config.options)?;

    // 4) Weighted items and diagnostics.
    let weighted = apply_weights(frame, &weights)?;
    let summary = summarize(&weighted);
    let comparisons = compare_margins(frame, &margins, &weights)?;
    let stats = weight_stats(&weights);

    Ok(RunOutput {
        ingest,
        margins,
        weights,
        weighted,
        summary,
        comparisons,
        stats,
    })
}
