//! `CategoryTable`: the distribution of one categorical variable.
//!
//! A table holds either observed counts (tallied from sample cases) or target
//! counts (census proportions scaled to a universe size). Categories are kept
//! in a `BTreeMap` so iteration order is stable across runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Allowed drift of a proportion vector's sum away from 1.
pub const PROPORTION_TOLERANCE: f64 = 1e-6;

/// Whether the counts were observed in the sample or supplied as a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableKind {
    Observed,
    Target,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTable {
    kind: TableKind,
    counts: BTreeMap<String, f64>,
    total: f64,
}

impl CategoryTable {
    /// Tally observed labels into counts.
    pub fn from_observations<I, S>(labels: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut counts: BTreeMap<String, f64> = BTreeMap::new();
        for label in labels {
            *counts.entry(label.as_ref().to_string()).or_insert(0.0) += 1.0;
        }
        if counts.is_empty() {
            return Err(ConfigError::EmptyTable);
        }
        let total = counts.values().sum();
        Ok(Self {
            kind: TableKind::Observed,
            counts,
            total,
        })
    }

    /// Target counts supplied directly.
    pub fn from_counts<I, S>(counts: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let counts = collect_non_negative(counts)?;
        let total = counts.values().sum();
        Ok(Self {
            kind: TableKind::Target,
            counts,
            total,
        })
    }

    /// Target proportions scaled to `total` cases.
    ///
    /// Proportions must be non-negative and sum to 1 within
    /// [`PROPORTION_TOLERANCE`]. They are divided by their actual sum, so the
    /// table total is `total` even when the shares drift from 1.
    pub fn from_proportions<I, S>(proportions: I, total: f64) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        if !(total.is_finite() && total > 0.0) {
            return Err(ConfigError::InvalidTotal { total });
        }
        let proportions = collect_non_negative(proportions)?;
        let sum: f64 = proportions.values().sum();
        if (sum - 1.0).abs() > PROPORTION_TOLERANCE {
            return Err(ConfigError::ProportionSum {
                sum,
                tolerance: PROPORTION_TOLERANCE,
            });
        }
        let counts: BTreeMap<String, f64> = proportions
            .into_iter()
            .map(|(category, p)| (category, p / sum * total))
            .collect();
        let total = counts.values().sum();
        Ok(Self {
            kind: TableKind::Target,
            counts,
            total,
        })
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn contains(&self, category: &str) -> bool {
        self.counts.contains_key(category)
    }

    /// Count for `category`, `None` if the category is not part of the table.
    pub fn get(&self, category: &str) -> Option<f64> {
        self.counts.get(category).copied()
    }

    /// Share of the total held by `category`.
    pub fn proportion(&self, category: &str) -> Option<f64> {
        let count = self.get(category)?;
        if self.total > 0.0 {
            Some(count / self.total)
        } else {
            Some(0.0)
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub(crate) fn counts(&self) -> &BTreeMap<String, f64> {
        &self.counts
    }

    /// Copy of this table with every count multiplied by `factor`.
    pub(crate) fn scaled(&self, factor: f64) -> Self {
        let counts: BTreeMap<String, f64> = self
            .counts
            .iter()
            .map(|(k, v)| (k.clone(), v * factor))
            .collect();
        let total = counts.values().sum();
        Self {
            kind: self.kind,
            counts,
            total,
        }
    }
}

fn collect_non_negative<I, S>(values: I) -> Result<BTreeMap<String, f64>, ConfigError>
where
    I: IntoIterator<Item = (S, f64)>,
    S: Into<String>,
{
    let mut out = BTreeMap::new();
    for (category, value) in values {
        let category = category.into();
        if !(value.is_finite() && value >= 0.0) {
            return Err(ConfigError::InvalidValue { category, value });
        }
        *out.entry(category).or_insert(0.0) += value;
    }
    if out.is_empty() {
        return Err(ConfigError::EmptyTable);
    }
    Ok(out)
}
