//! Iterative proportional fitting (raking).
//!
//! Given a survey frame and an ordered list of census margins, the engine
//! finds one multiplier per cell such that, for every margin variable, the
//! weighted count of each category equals its target:
//!
//! ```text
//! for pass in 1..=max_iterations:
//!     for margin in margins (in the order supplied):
//!         w_c *= target[k] / Σ_{c' in k} n_c' w_c'     (k = category of cell c)
//!     stop when max |weighted - target| / target <= tolerance
//! ```
//!
//! The returned weight of a case is the cumulative product of every factor
//! applied to its cell. A category with fewer sample cases than its target
//! ends up above 1 and an over-sampled category below 1; the weights sum to
//! the universe size N.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::margin::totals_match;
use crate::domain::{CaseWeight, MarginSpec, MissingPolicy, SurveyFrame, TotalsPolicy, WeightVector};
use crate::error::{ConfigError, RakeError};
use crate::rake::cells::{CellTable, EncodedMargin};
use crate::rake::tally::weighted_counts;

pub const DEFAULT_TOLERANCE: f64 = 1e-7;
pub const DEFAULT_MAX_ITERATIONS: usize = 50;

/// Options that control a single raking run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RakeOptions {
    /// Maximum relative margin deviation accepted as converged.
    pub tolerance: f64,
    /// Maximum number of full passes over all margins.
    pub max_iterations: usize,
    pub missing: MissingPolicy,
    pub totals: TotalsPolicy,
}

impl Default for RakeOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            missing: MissingPolicy::default(),
            totals: TotalsPolicy::default(),
        }
    }
}

impl RakeOptions {
    fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(ConfigError::InvalidTolerance {
                tolerance: self.tolerance,
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidIterations);
        }
        Ok(())
    }
}

/// Everything resolved before the first pass.
#[derive(Debug)]
struct RakePlan {
    margins: Vec<EncodedMargin>,
    cells: CellTable,
    universe: f64,
}

/// Worst margin cell after a pass.
#[derive(Debug, Clone, Copy)]
struct Deviation {
    margin: usize,
    category: usize,
    value: f64,
}

/// Rake `frame` to `margins`.
pub fn rake(frame: &SurveyFrame, margins: &[MarginSpec], options: &RakeOptions) -> Result<WeightVector, RakeError> {
    let never = AtomicBool::new(false);
    rake_with_cancel(frame, margins, options, &never)
}

/// Rake `frame` to `margins`, checking `cancel` between passes.
///
/// Cancellation never interrupts a pass; when observed it returns
/// [`RakeError::Cancelled`] and no weights.
pub fn rake_with_cancel(
    frame: &SurveyFrame,
    margins: &[MarginSpec],
    options: &RakeOptions,
    cancel: &AtomicBool,
) -> Result<WeightVector, RakeError> {
    options.validate()?;
    let plan = prepare(frame, margins, options)?;
    check_zero_cells(&plan)?;

    info!(
        event = "rake_start",
        cases = frame.len(),
        universe = plan.universe,
        cells = plan.cells.len(),
        margins = plan.margins.len(),
    );

    let mut weights = vec![1.0; plan.cells.len()];
    let mut trace = Vec::with_capacity(options.max_iterations);
    let mut worst = None;

    for pass in 0..options.max_iterations {
        if cancel.load(Ordering::Relaxed) {
            info!(event = "rake_cancelled", passes = pass);
            return Err(RakeError::Cancelled { passes: pass });
        }

        for (m, margin) in plan.margins.iter().enumerate() {
            adjust_margin(&plan.cells, &mut weights, m, margin)?;
        }

        let dev = worst_deviation(&plan, &weights);
        trace.push(dev.value);
        debug!(
            pass = pass + 1,
            max_deviation = dev.value,
            variable = %plan.margins[dev.margin].variable,
            category = %plan.margins[dev.margin].categories[dev.category],
        );

        if dev.value <= options.tolerance {
            info!(event = "rake_converged", passes = pass + 1, max_deviation = dev.value);
            return Ok(expand(frame, &plan, &weights, options.missing, pass + 1, dev.value, trace));
        }
        worst = Some(dev);
    }

    // max_iterations >= 1, so at least one pass recorded a deviation.
    let dev = worst.unwrap_or(Deviation {
        margin: 0,
        category: 0,
        value: f64::INFINITY,
    });
    Err(RakeError::Convergence {
        iterations: options.max_iterations,
        variable: plan.margins[dev.margin].variable.clone(),
        category: plan.margins[dev.margin].categories[dev.category].clone(),
        deviation: dev.value,
        tolerance: options.tolerance,
    })
}

fn prepare(frame: &SurveyFrame, margins: &[MarginSpec], options: &RakeOptions) -> Result<RakePlan, ConfigError> {
    if margins.is_empty() {
        return Err(ConfigError::NoMargins);
    }
    if frame.is_empty() {
        return Err(ConfigError::NoCases);
    }

    let mut encoded: Vec<EncodedMargin> = Vec::with_capacity(margins.len());
    for margin in margins {
        if encoded.iter().any(|e| e.variable == margin.variable()) {
            return Err(ConfigError::DuplicateVariable {
                variable: margin.variable().to_string(),
            });
        }
        encoded.push(EncodedMargin::encode(frame, margin)?);
    }

    let cells = CellTable::build(frame, &encoded)?;
    let universe = cells.universe();
    if universe <= 0.0 {
        return Err(ConfigError::EmptyUniverse);
    }

    let incomplete = frame.len() - universe as usize;
    if incomplete > 0 {
        warn!(
            cases = incomplete,
            policy = ?options.missing,
            "cases with a missing raking variable are outside the raking universe"
        );
    }

    for margin in &mut encoded {
        let total = margin.total();
        if totals_match(total, universe) {
            // Accepted drift is removed so every margin sums to exactly N.
            if total != universe {
                margin.scale_targets(universe / total);
            }
            continue;
        }
        match options.totals {
            TotalsPolicy::Strict => {
                return Err(ConfigError::TotalMismatch {
                    variable: margin.variable.clone(),
                    expected: universe,
                    actual: total,
                });
            }
            TotalsPolicy::Rescale => {
                if !(total.is_finite() && total > 0.0) {
                    return Err(ConfigError::InvalidTotal { total });
                }
                warn!(
                    variable = %margin.variable,
                    declared_total = total,
                    universe,
                    "rescaling margin targets to the raking universe"
                );
                margin.scale_targets(universe / total);
            }
        }
    }

    Ok(RakePlan {
        margins: encoded,
        cells,
        universe,
    })
}

/// A category with census mass but no sample cases can never be matched.
fn check_zero_cells(plan: &RakePlan) -> Result<(), RakeError> {
    let ones = vec![1.0; plan.cells.len()];
    for (m, margin) in plan.margins.iter().enumerate() {
        let counts = weighted_counts(&plan.cells, &ones, m, margin.categories.len());
        if let Some(k) = (0..counts.len()).find(|&k| counts[k] <= 0.0 && margin.targets[k] > 0.0) {
            return Err(zero_cell(margin, k));
        }
    }
    Ok(())
}

fn adjust_margin(cells: &CellTable, weights: &mut [f64], m: usize, margin: &EncodedMargin) -> Result<(), RakeError> {
    let current = weighted_counts(cells, weights, m, margin.categories.len());

    let mut factors = Vec::with_capacity(current.len());
    for (k, (&have, &want)) in current.iter().zip(&margin.targets).enumerate() {
        let factor = if want <= 0.0 {
            0.0
        } else if have > 0.0 {
            want / have
        } else {
            return Err(zero_cell(margin, k));
        };
        factors.push(factor);
    }

    for (cell, w) in weights.iter_mut().enumerate() {
        *w *= factors[cells.code(cell, m)];
    }
    Ok(())
}

fn worst_deviation(plan: &RakePlan, weights: &[f64]) -> Deviation {
    let mut worst = Deviation {
        margin: 0,
        category: 0,
        value: 0.0,
    };
    for (m, margin) in plan.margins.iter().enumerate() {
        let current = weighted_counts(&plan.cells, weights, m, margin.categories.len());
        for (k, (&have, &want)) in current.iter().zip(&margin.targets).enumerate() {
            let value = relative_deviation(have, want);
            // NaN compares false everywhere; treat it as the worst possible.
            let value = if value.is_nan() { f64::INFINITY } else { value };
            if value > worst.value {
                worst = Deviation {
                    margin: m,
                    category: k,
                    value,
                };
            }
        }
    }
    worst
}

/// `|have - want| / want`, or the absolute deviation when the target is zero.
pub(crate) fn relative_deviation(have: f64, want: f64) -> f64 {
    if want > 0.0 {
        (have - want).abs() / want
    } else {
        have.abs()
    }
}

fn expand(
    frame: &SurveyFrame,
    plan: &RakePlan,
    cell_weights: &[f64],
    missing: MissingPolicy,
    passes: usize,
    max_deviation: f64,
    trace: Vec<f64>,
) -> WeightVector {
    let mut weights = Vec::with_capacity(frame.len());
    let mut excluded = Vec::new();
    for (i, case) in frame.cases().iter().enumerate() {
        match (plan.cells.case_cell(i), missing) {
            (Some(cell), _) => weights.push(CaseWeight {
                id: case.id.clone(),
                weight: cell_weights[cell],
            }),
            (None, MissingPolicy::UnitWeight) => weights.push(CaseWeight {
                id: case.id.clone(),
                weight: 1.0,
            }),
            (None, MissingPolicy::Drop) => excluded.push(case.id.clone()),
        }
    }
    WeightVector::new(weights, excluded, plan.universe, passes, max_deviation, trace)
}

fn zero_cell(margin: &EncodedMargin, k: usize) -> RakeError {
    RakeError::ZeroCell {
        variable: margin.variable.clone(),
        category: margin.categories[k].clone(),
        target: margin.targets[k],
    }
}
