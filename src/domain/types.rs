//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - used in-memory during raking
//! - exported to JSON/CSV
//! - reloaded later to re-apply saved weights

use std::collections::HashSet;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::rake::RakeOptions;

/// What to do with a case that has no value on one of the raking variables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum MissingPolicy {
    /// Remove the case from the raking universe; it receives no weight and is
    /// listed in [`WeightVector::excluded`].
    #[default]
    Drop,
    /// Remove the case from the raking universe but give it weight 1.0.
    UnitWeight,
}

/// How margin totals that disagree with the universe size are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TotalsPolicy {
    /// A mismatch is a configuration error.
    #[default]
    Strict,
    /// Scale mismatched margins to the universe size (logged).
    Rescale,
}

/// How the `value` column of a targets file is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Census shares summing to 1 per variable, scaled to the sample size.
    #[default]
    Proportion,
    /// Absolute target counts.
    Count,
}

/// Inclusive range of valid raw item codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemScale {
    pub min: u32,
    pub max: u32,
}

impl Default for ItemScale {
    fn default() -> Self {
        Self { min: 0, max: 4 }
    }
}

impl ItemScale {
    pub fn new(min: u32, max: u32) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidItemScale { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn contains(&self, value: u32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// One sampled respondent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: String,
    /// One entry per frame variable, `None` when the value is missing.
    pub categories: Vec<Option<String>>,
    /// Raw item scores, one per frame item.
    pub items: Vec<u32>,
}

impl Case {
    pub fn unweighted_total(&self) -> u64 {
        self.items.iter().map(|&v| u64::from(v)).sum()
    }
}

/// A validated collection of cases sharing one variable and item layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SurveyFrame {
    variables: Vec<String>,
    items: Vec<String>,
    scale: ItemScale,
    cases: Vec<Case>,
}

impl SurveyFrame {
    /// Build a frame, checking arity, item ranges and id uniqueness.
    pub fn new(
        variables: Vec<String>,
        items: Vec<String>,
        scale: ItemScale,
        cases: Vec<Case>,
    ) -> Result<Self, ConfigError> {
        let scale = ItemScale::new(scale.min, scale.max)?;

        let mut seen_vars = HashSet::new();
        for v in &variables {
            if !seen_vars.insert(v.as_str()) {
                return Err(ConfigError::DuplicateVariable { variable: v.clone() });
            }
        }

        let mut seen_ids = HashSet::with_capacity(cases.len());
        for case in &cases {
            if !seen_ids.insert(case.id.as_str()) {
                return Err(ConfigError::DuplicateCase { id: case.id.clone() });
            }
            if case.categories.len() != variables.len() {
                return Err(ConfigError::CategoryArity {
                    case_id: case.id.clone(),
                    expected: variables.len(),
                    actual: case.categories.len(),
                });
            }
            if case.items.len() != items.len() {
                return Err(ConfigError::ItemArity {
                    case_id: case.id.clone(),
                    expected: items.len(),
                    actual: case.items.len(),
                });
            }
            if let Some((index, &value)) = case.items.iter().enumerate().find(|(_, v)| !scale.contains(**v)) {
                return Err(ConfigError::ItemOutOfRange {
                    case_id: case.id.clone(),
                    index,
                    value,
                    min: scale.min,
                    max: scale.max,
                });
            }
        }

        Ok(Self {
            variables,
            items,
            scale,
            cases,
        })
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn scale(&self) -> ItemScale {
        self.scale
    }

    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub fn variable_index(&self, variable: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == variable)
    }

    /// Number of cases with a value on every frame variable.
    pub fn complete_count(&self) -> usize {
        self.cases
            .iter()
            .filter(|c| c.categories.iter().all(Option::is_some))
            .count()
    }

    /// Observed (non-missing) values of `variable`, in case order.
    pub fn observed<'a>(&'a self, variable: &str) -> Option<impl Iterator<Item = &'a str> + 'a> {
        let idx = self.variable_index(variable)?;
        Some(self.cases.iter().filter_map(move |c| c.categories[idx].as_deref()))
    }
}

/// Final raking multiplier of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseWeight {
    pub id: String,
    pub weight: f64,
}

/// Result of a raking run: one multiplier per case in the universe.
///
/// Weights are raking multipliers: a case from an under-represented category
/// weighs more than 1, an over-represented one less than 1. They sum to the
/// universe size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightVector {
    weights: Vec<CaseWeight>,
    excluded: Vec<String>,
    universe: f64,
    passes: usize,
    max_deviation: f64,
    trace: Vec<f64>,
}

impl WeightVector {
    pub(crate) fn new(
        weights: Vec<CaseWeight>,
        excluded: Vec<String>,
        universe: f64,
        passes: usize,
        max_deviation: f64,
        trace: Vec<f64>,
    ) -> Self {
        Self {
            weights,
            excluded,
            universe,
            passes,
            max_deviation,
            trace,
        }
    }

    /// Weight of case `id`, `None` if the case was excluded or is unknown.
    ///
    /// This is a linear scan; for one lookup per case, index `iter()` once
    /// instead (as `apply_weights` does).
    pub fn get(&self, id: &str) -> Option<f64> {
        self.weights.iter().find(|w| w.id == id).map(|w| w.weight)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaseWeight> {
        self.weights.iter()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Ids that received no weight (missing values under `MissingPolicy::Drop`).
    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Number of cases the margins were raked over (N).
    ///
    /// Cases given weight 1.0 under `MissingPolicy::UnitWeight` are not part
    /// of it, so `total()` exceeds `universe()` by their count.
    pub fn universe(&self) -> f64 {
        self.universe
    }

    /// Number of full passes the engine ran.
    pub fn passes(&self) -> usize {
        self.passes
    }

    /// Largest relative margin deviation after the final pass.
    pub fn max_deviation(&self) -> f64 {
        self.max_deviation
    }

    /// Largest relative margin deviation after each pass.
    pub fn trace(&self) -> &[f64] {
        &self.trace
    }

    /// Sum of all weights (the weighted case count).
    pub fn total(&self) -> f64 {
        self.weights.iter().map(|w| w.weight).sum()
    }

    /// Check a deserialized vector for invalid weights or duplicate ids.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::with_capacity(self.weights.len());
        for w in &self.weights {
            if !(w.weight.is_finite() && w.weight >= 0.0) {
                return Err(ConfigError::InvalidWeight {
                    case_id: w.id.clone(),
                    weight: w.weight,
                });
            }
            if !seen.insert(w.id.as_str()) {
                return Err(ConfigError::DuplicateCase { id: w.id.clone() });
            }
        }
        Ok(())
    }
}

/// A case combined with its weight; derived and read-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedCase {
    pub id: String,
    pub weight: f64,
    pub raw_items: Vec<u32>,
    pub weighted_items: Vec<f64>,
    pub unweighted_total: u64,
    pub weighted_total: f64,
}

/// Aggregate scores over a set of weighted cases.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedSummary {
    pub n_cases: usize,
    /// Sum of weights.
    pub weighted_n: f64,
    pub item_means_raw: Vec<f64>,
    pub item_means_weighted: Vec<f64>,
    pub total_mean_raw: f64,
    pub total_mean_weighted: f64,
}

/// A saved weights file (JSON).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightsFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub variables: Vec<String>,
    pub options: RakeOptions,
    pub weights: WeightVector,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub cases_path: PathBuf,
    pub targets_path: PathBuf,
    /// Raking variables, in raking order.
    pub variables: Vec<String>,
    /// Item columns are the headers starting with this prefix.
    pub items_prefix: String,
    pub item_scale: ItemScale,
    pub target_kind: TargetKind,
    pub options: RakeOptions,

    pub export_cases: Option<PathBuf>,
    pub export_weights: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(id: &str, cats: &[Option<&str>], items: &[u32]) -> Case {
        Case {
            id: id.to_string(),
            categories: cats.iter().map(|c| c.map(str::to_string)).collect(),
            items: items.to_vec(),
        }
    }

    fn names(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn frame_accepts_well_formed_cases() {
        let frame = SurveyFrame::new(
            names(&["gender", "region"]),
            names(&["q1", "q2"]),
            ItemScale::default(),
            vec![
                case("1", &[Some("f"), Some("north")], &[0, 4]),
                case("2", &[Some("m"), None], &[2, 3]),
            ],
        )
        .unwrap();
        assert_eq!(frame.len(), 2);
        assert_eq!(frame.variable_index("region"), Some(1));
        let regions: Vec<&str> = frame.observed("region").unwrap().collect();
        assert_eq!(regions, vec!["north"]);
        assert_eq!(frame.cases()[1].unweighted_total(), 5);
    }

    #[test]
    fn frame_rejects_duplicates_and_bad_items() {
        let dup = SurveyFrame::new(
            names(&["gender"]),
            names(&["q1"]),
            ItemScale::default(),
            vec![case("1", &[Some("f")], &[1]), case("1", &[Some("m")], &[2])],
        );
        assert_eq!(dup.unwrap_err(), ConfigError::DuplicateCase { id: "1".to_string() });

        let range = SurveyFrame::new(
            names(&["gender"]),
            names(&["q1"]),
            ItemScale::default(),
            vec![case("1", &[Some("f")], &[7])],
        );
        assert!(matches!(range.unwrap_err(), ConfigError::ItemOutOfRange { value: 7, .. }));

        let arity = SurveyFrame::new(
            names(&["gender", "region"]),
            names(&["q1"]),
            ItemScale::default(),
            vec![case("1", &[Some("f")], &[1])],
        );
        assert!(matches!(arity.unwrap_err(), ConfigError::CategoryArity { .. }));
    }

    #[test]
    fn weight_vector_validation() {
        let ok = WeightVector::new(
            vec![
                CaseWeight { id: "a".to_string(), weight: 1.5 },
                CaseWeight { id: "b".to_string(), weight: 0.5 },
            ],
            vec![],
            2.0,
            1,
            0.0,
            vec![0.0],
        );
        assert!(ok.validate().is_ok());
        assert_eq!(ok.get("a"), Some(1.5));
        assert!((ok.total() - 2.0).abs() < 1e-12);

        let bad = WeightVector::new(
            vec![CaseWeight { id: "a".to_string(), weight: -1.0 }],
            vec![],
            1.0,
            1,
            0.0,
            vec![],
        );
        assert!(matches!(bad.validate().unwrap_err(), ConfigError::InvalidWeight { .. }));
    }
}
