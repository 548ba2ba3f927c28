//! Formatted terminal output.
//!
//! Formatting lives in one place so:
//! - the raking code stays free of presentation concerns
//! - output changes are localized

use crate::domain::{RunConfig, WeightVector, WeightedSummary};
use crate::io::ingest::IngestedData;
use crate::rake::{MarginComparison, WeightStats};

/// Row errors listed before the summary collapses them into a count.
const MAX_LISTED_ROW_ERRORS: usize = 10;

/// Format the run summary (ingest stats + convergence).
pub fn format_run_summary(ingest: &IngestedData, weights: &WeightVector, config: &RunConfig) -> String {
    let mut out = String::new();

    out.push_str("=== rake - survey raking ===\n");
    out.push_str(&format!("Cases: {}\n", config.cases_path.display()));
    out.push_str(&format!("Targets: {} ({:?})\n", config.targets_path.display(), config.target_kind));
    out.push_str(&format!("Variables: {}\n", config.variables.join(", ")));
    out.push_str(&format!(
        "Rows: read={} | used={} | rejected={}\n",
        ingest.rows_read,
        ingest.rows_used,
        ingest.row_errors.len()
    ));
    for e in ingest.row_errors.iter().take(MAX_LISTED_ROW_ERRORS) {
        let id = e.id.as_deref().unwrap_or("-");
        out.push_str(&format!("  line {} [{}]: {}\n", e.line, truncate(id, 16), e.message));
    }
    if ingest.row_errors.len() > MAX_LISTED_ROW_ERRORS {
        out.push_str(&format!(
            "  ... {} more\n",
            ingest.row_errors.len() - MAX_LISTED_ROW_ERRORS
        ));
    }

    out.push_str(&format!(
        "Universe: N={:.0} | weighted={} | excluded={}\n",
        weights.universe(),
        weights.len(),
        weights.excluded().len()
    ));
    out.push_str(&format!(
        "Converged: passes={} | max deviation={:.3e} (tolerance {:.1e}, missing={:?}, totals={:?})\n",
        weights.passes(),
        weights.max_deviation(),
        config.options.tolerance,
        config.options.missing,
        config.options.totals,
    ));

    out
}

/// Format sample / target / weighted shares for every margin.
pub fn format_margins(comparisons: &[MarginComparison]) -> String {
    let mut out = String::new();
    out.push_str("Margins (sample vs target vs weighted):\n");

    for m in comparisons {
        out.push_str(&format!("{}\n", m.variable));
        out.push_str(
            format!(
                "  {:<16} {:>8} {:>8} {:>12} {:>8} {:>12} {:>8}\n",
                "category", "n", "share", "target", "share", "weighted", "share"
            )
            .trim_end(),
        );
        out.push('\n');
        out.push_str(
            format!(
                "  {:-<16} {:-<8} {:-<8} {:-<12} {:-<8} {:-<12} {:-<8}\n",
                "", "", "", "", "", "", ""
            )
            .trim_end(),
        );
        out.push('\n');
        for r in &m.rows {
            out.push_str(
                format!(
                    "  {:<16} {:>8.0} {:>8} {:>12.3} {:>8} {:>12.3} {:>8}\n",
                    truncate(&r.category, 16),
                    r.sample_count,
                    fmt_pct(r.sample_share),
                    r.target_count,
                    fmt_pct(r.target_share),
                    r.weighted_count,
                    fmt_pct(r.weighted_share),
                )
                .trim_end(),
            );
            out.push('\n');
        }
    }

    out
}

/// Format weight dispersion.
pub fn format_weight_stats(stats: Option<&WeightStats>) -> String {
    let Some(s) = stats else {
        return "Weights: none\n".to_string();
    };
    let mut out = String::new();
    out.push_str(&format!(
        "Weights: n={} | sum={:.3} | min={:.4} | max={:.4} | mean={:.4}\n",
        s.n, s.sum, s.min, s.max, s.mean
    ));
    out.push_str(&format!(
        "- cv={:.4} | design effect={:.4} | effective n={:.1}\n",
        s.cv, s.design_effect, s.effective_n
    ));
    out
}

/// Format per-item means before and after weighting.
pub fn format_item_means(items: &[String], summary: &WeightedSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Item means (n={}, weighted n={:.3}):\n",
        summary.n_cases, summary.weighted_n
    ));
    out.push_str(format!("  {:<16} {:>10} {:>10} {:>10}\n", "item", "raw", "weighted", "shift").trim_end());
    out.push('\n');
    out.push_str(format!("  {:-<16} {:-<10} {:-<10} {:-<10}\n", "", "", "", "").trim_end());
    out.push('\n');

    let rows = items
        .iter()
        .map(String::as_str)
        .zip(summary.item_means_raw.iter().zip(&summary.item_means_weighted))
        .chain(std::iter::once((
            "total",
            (&summary.total_mean_raw, &summary.total_mean_weighted),
        )));
    for (name, (raw, weighted)) in rows {
        out.push_str(
            format!(
                "  {:<16} {:>10.4} {:>10.4} {:>+10.4}\n",
                truncate(name, 16),
                raw,
                weighted,
                weighted - raw
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

fn fmt_pct(share: f64) -> String {
    format!("{:.1}%", share * 100.0)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
