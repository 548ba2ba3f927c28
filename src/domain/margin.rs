//! `MarginSpec`: a raking variable bound to its census target counts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::table::CategoryTable;
use crate::error::ConfigError;

/// Relative tolerance used when comparing a margin total to the universe size.
pub const TOTAL_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarginSpec {
    variable: String,
    targets: CategoryTable,
}

impl MarginSpec {
    /// Bind `variable` to `targets`, requiring the targets to describe a
    /// universe of `expected_total` cases.
    pub fn new(
        variable: impl Into<String>,
        targets: CategoryTable,
        expected_total: f64,
    ) -> Result<Self, ConfigError> {
        let spec = Self::from_table(variable, targets)?;
        if !totals_match(spec.total(), expected_total) {
            return Err(ConfigError::TotalMismatch {
                variable: spec.variable,
                expected: expected_total,
                actual: spec.targets.total(),
            });
        }
        Ok(spec)
    }

    /// Bind without checking the total; the engine checks it against the
    /// universe size of the run.
    pub fn from_table(variable: impl Into<String>, targets: CategoryTable) -> Result<Self, ConfigError> {
        let variable = variable.into();
        if variable.trim().is_empty() {
            return Err(ConfigError::EmptyVariable);
        }
        Ok(Self { variable, targets })
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    pub fn total(&self) -> f64 {
        self.targets.total()
    }

    pub fn table(&self) -> &CategoryTable {
        &self.targets
    }

    /// Target count for `category`; `None` when the margin does not define it.
    pub fn target(&self, category: &str) -> Option<f64> {
        self.targets.get(category)
    }

    pub fn targets(&self) -> &BTreeMap<String, f64> {
        self.targets.counts()
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.targets.categories()
    }

    /// Copy of this margin with targets scaled proportionally to `total`.
    pub fn rescaled(&self, total: f64) -> Result<Self, ConfigError> {
        if !(total.is_finite() && total > 0.0) {
            return Err(ConfigError::InvalidTotal { total });
        }
        let current = self.total();
        if !(current.is_finite() && current > 0.0) {
            return Err(ConfigError::InvalidTotal { total: current });
        }
        Ok(Self {
            variable: self.variable.clone(),
            targets: self.targets.scaled(total / current),
        })
    }
}

/// Convenience wrapper matching the library's functional entry points.
pub fn build_margin_spec(
    variable: impl Into<String>,
    targets: CategoryTable,
    expected_total: f64,
) -> Result<MarginSpec, ConfigError> {
    MarginSpec::new(variable, targets, expected_total)
}

pub(crate) fn totals_match(actual: f64, expected: f64) -> bool {
    (actual - expected).abs() <= TOTAL_TOLERANCE * expected.abs().max(1.0)
}
