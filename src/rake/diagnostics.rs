//! Post-run diagnostics: margin comparisons and weight dispersion.

use serde::Serialize;

use crate::domain::{MarginSpec, SurveyFrame, WeightVector};
use crate::error::{ConfigError, RakeError};

/// Sample vs target vs weighted figures for one category.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryComparison {
    pub category: String,
    pub sample_count: f64,
    pub sample_share: f64,
    pub target_count: f64,
    pub target_share: f64,
    pub weighted_count: f64,
    pub weighted_share: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginComparison {
    pub variable: String,
    pub rows: Vec<CategoryComparison>,
}

/// Dispersion of the final weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeightStats {
    pub n: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Coefficient of variation (population standard deviation / mean).
    pub cv: f64,
    /// Kish design effect, `n Σw² / (Σw)²`.
    pub design_effect: f64,
    /// Kish effective sample size, `(Σw)² / Σw²`.
    pub effective_n: f64,
}

/// Compare each margin's sample, target and weighted distributions.
///
/// Only cases in the raking universe (a value on every margin variable) that
/// received a weight count.
pub fn compare_margins(
    frame: &SurveyFrame,
    margins: &[MarginSpec],
    weights: &WeightVector,
) -> Result<Vec<MarginComparison>, RakeError> {
    let case_weights: Vec<Option<f64>> = {
        let lookup: std::collections::HashMap<&str, f64> =
            weights.iter().map(|w| (w.id.as_str(), w.weight)).collect();
        frame.cases().iter().map(|c| lookup.get(c.id.as_str()).copied()).collect()
    };

    let columns = margins
        .iter()
        .map(|margin| {
            frame
                .variable_index(margin.variable())
                .ok_or_else(|| ConfigError::UnknownVariable {
                    variable: margin.variable().to_string(),
                })
        })
        .collect::<Result<Vec<usize>, ConfigError>>()?;
    // Unit-weighted incomplete cases carry a weight but were never raked.
    let in_universe: Vec<bool> = frame
        .cases()
        .iter()
        .map(|c| columns.iter().all(|&col| c.categories[col].is_some()))
        .collect();

    let mut out = Vec::with_capacity(margins.len());
    for (margin, &col) in margins.iter().zip(&columns) {
        let mut rows: Vec<CategoryComparison> = margin
            .targets()
            .iter()
            .map(|(category, &target)| CategoryComparison {
                category: category.clone(),
                sample_count: 0.0,
                sample_share: 0.0,
                target_count: target,
                target_share: share(target, margin.total()),
                weighted_count: 0.0,
                weighted_share: 0.0,
            })
            .collect();

        for ((case, w), _) in frame
            .cases()
            .iter()
            .zip(&case_weights)
            .zip(&in_universe)
            .filter(|(_, inside)| **inside)
        {
            let (Some(label), Some(w)) = (case.categories[col].as_deref(), w) else {
                continue;
            };
            if let Some(row) = rows.iter_mut().find(|r| r.category == label) {
                row.sample_count += 1.0;
                row.weighted_count += w;
            }
        }

        let sample_total: f64 = rows.iter().map(|r| r.sample_count).sum();
        let weighted_total: f64 = rows.iter().map(|r| r.weighted_count).sum();
        for row in &mut rows {
            row.sample_share = share(row.sample_count, sample_total);
            row.weighted_share = share(row.weighted_count, weighted_total);
        }

        out.push(MarginComparison {
            variable: margin.variable().to_string(),
            rows,
        });
    }
    Ok(out)
}

/// Summary statistics of a weight vector; `None` when it is empty.
pub fn weight_stats(weights: &WeightVector) -> Option<WeightStats> {
    let values: Vec<f64> = weights.iter().map(|w| w.weight).collect();
    if values.is_empty() {
        return None;
    }
    let n = values.len();
    let sum: f64 = values.iter().sum();
    let sum_sq: f64 = values.iter().map(|w| w * w).sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = sum / n as f64;
    let var = values.iter().map(|w| (w - mean) * (w - mean)).sum::<f64>() / n as f64;
    let cv = if mean > 0.0 { var.sqrt() / mean } else { 0.0 };
    let (design_effect, effective_n) = if sum > 0.0 && sum_sq > 0.0 {
        (n as f64 * sum_sq / (sum * sum), (sum * sum) / sum_sq)
    } else {
        (f64::NAN, 0.0)
    };

    Some(WeightStats {
        n,
        sum,
        min,
        max,
        mean,
        cv,
        design_effect,
        effective_n,
    })
}

fn share(part: f64, total: f64) -> f64 {
    if total > 0.0 { part / total } else { 0.0 }
}
